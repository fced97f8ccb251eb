use std::sync::Arc;

use agg_core::builder::{generate_aggregate, monomer_pool};
use agg_core::config::{BuilderConfig, RimeConfig};
use agg_core::generator::{CrystalGenerator, CrystalShape, SizeDistribution};
use agg_core::grid::cmp_rows;
use agg_core::types::RIME_IDENT;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const GRID_RES: f64 = 0.02e-3;

fn plate_generator() -> Arc<CrystalGenerator> {
    Arc::new(CrystalGenerator::monodisperse(CrystalShape::plate(), 0.3e-3, GRID_RES).unwrap())
}

#[test]
fn build_then_grid() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let pool = monomer_pool(plate_generator(), 5, &mut rng);
    let total: usize = pool.iter().map(|a| a.len()).sum();

    let agg = generate_aggregate(pool, &BuilderConfig::default(), &mut rng).unwrap();
    assert_eq!(agg.monomer_number(), 5);
    assert_eq!(agg.len(), total);
    assert_eq!(agg.id_tree().leaf_count(), 5);

    let [_, _, [z0, z1]] = agg.extent();
    assert!((z1 - z0).is_finite() && z1 - z0 > 0.0);

    let rows = agg.grid(None, &mut rng).unwrap();
    assert_eq!(rows.len(), agg.len());
    assert!(rows.windows(2).all(|w| cmp_rows(&w[0], &w[1]).is_lt()));
}

#[test]
fn rimed_aggregate_keeps_monomer_elements() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let generator = Arc::new(
        CrystalGenerator::new(
            CrystalShape::column(),
            SizeDistribution::Exponential {
                scale: 0.2e-3,
                min_size: 0.1e-3,
                max_size: 0.3e-3,
            },
            GRID_RES,
        )
        .unwrap(),
    );
    let pool = monomer_pool(generator, 3, &mut rng);
    let mut agg = generate_aggregate(pool, &BuilderConfig::default(), &mut rng).unwrap();
    let before = agg.len();

    let cfg = RimeConfig {
        compact_dist: 0.5,
        ..RimeConfig::default()
    };
    agg.add_rime_particles(40, &cfg, &mut rng).unwrap();
    assert_eq!(agg.len(), before + 40);
    assert_eq!(agg.ids().iter().filter(|&&id| id == RIME_IDENT).count(), 40);
    assert!(agg.aspect_ratio().is_finite());

    let rows = agg.grid(None, &mut rng).unwrap();
    assert_eq!(rows.len(), before + 40);
}
