//! The `build` pipeline: monomers, pairwise build, rime, lattice snapping
//! and output files.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agg_core::builder::{generate_aggregate, monomer_pool};
use agg_core::config::{BuilderConfig, MonomerConfig, RimeConfig};
use agg_core::generator::{CrystalShape, SizeDistribution};
use agg_core::types::{Extent, LatticePoint};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::{BuildArgs, Psd, Shape};

/// Summary written next to the lattice rows.
#[derive(Serialize, Debug)]
struct BuildMeta {
    crystal: &'static str,
    monomer: MonomerConfig,
    monomers: usize,
    rime: usize,
    elements: usize,
    grid_res: f64,
    seed: u64,
    aspect_ratio: f64,
    extent: Extent,
    merge_depth: usize,
    builder: BuilderConfig,
    rime_config: RimeConfig,
}

pub fn crystal_shape(shape: Shape, aspect: Option<f64>) -> CrystalShape {
    match (shape, aspect) {
        (Shape::Plate, None) => CrystalShape::plate(),
        (Shape::Column, None) => CrystalShape::column(),
        (Shape::Plate | Shape::Column, Some(aspect)) => CrystalShape::HexPrism { aspect },
        (Shape::Spheroid, aspect) => CrystalShape::Spheroid {
            aspect: aspect.unwrap_or(0.6),
        },
    }
}

fn size_distribution(args: &BuildArgs) -> SizeDistribution {
    match args.psd {
        Psd::Mono => SizeDistribution::Monodisperse { size: args.size },
        Psd::Exp => SizeDistribution::Exponential {
            scale: args.size,
            min_size: args.min_size,
            max_size: args.max_size,
        },
    }
}

/// `<output>.meta.json`
pub fn meta_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".meta.json");
    PathBuf::from(name)
}

/// Writes one `x y z` line per lattice row.
pub fn write_rows<W: Write>(mut w: W, rows: &[LatticePoint]) -> std::io::Result<()> {
    for [x, y, z] in rows {
        writeln!(w, "{x} {y} {z}")?;
    }
    w.flush()
}

pub fn build(args: &BuildArgs) -> Result<()> {
    let monomer = MonomerConfig {
        shape: crystal_shape(args.shape, args.aspect),
        sizes: size_distribution(args),
        grid_res: args.grid_res,
    };
    let generator = monomer.generator().context("invalid monomer parameters")?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let builder = BuilderConfig {
        align: !args.no_align,
        ..BuilderConfig::default()
    };
    let pool = monomer_pool(Arc::new(generator), args.monomers, &mut rng);
    let mut agg =
        generate_aggregate(pool, &builder, &mut rng).context("failed to build aggregate")?;

    let rime_config = RimeConfig {
        compact_dist: args.compact_dist,
        ..RimeConfig::default()
    };
    agg.add_rime_particles(args.rime, &rime_config, &mut rng)
        .context("failed to deposit rime")?;

    let rows = agg.grid(None, &mut rng).context("failed to snap to lattice")?;

    let f = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    write_rows(BufWriter::new(f), &rows)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    let meta = BuildMeta {
        crystal: monomer.shape.name(),
        monomer,
        monomers: agg.monomer_number(),
        rime: args.rime,
        elements: rows.len(),
        grid_res: agg.grid_res(),
        seed: args.seed,
        aspect_ratio: agg.aspect_ratio(),
        extent: agg.extent(),
        merge_depth: agg.id_tree().depth(),
        builder,
        rime_config,
    };
    let meta_file = meta_path(&args.output);
    let f = File::create(&meta_file)
        .with_context(|| format!("failed to create {}", meta_file.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(f), &meta).context("failed to write metadata")?;

    info!(
        elements = rows.len(),
        monomers = meta.monomers,
        output = %args.output.display(),
        "wrote aggregate"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_path_appends_suffix() {
        assert_eq!(
            meta_path(Path::new("out/agg.txt")),
            PathBuf::from("out/agg.txt.meta.json")
        );
    }

    #[test]
    fn rows_are_space_separated() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[[0, -1, 2], [3, 4, 5]]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "0 -1 2\n3 4 5\n");
    }

    #[test]
    fn aspect_override_keeps_shape_family() {
        assert_eq!(
            crystal_shape(Shape::Column, Some(3.0)),
            CrystalShape::HexPrism { aspect: 3.0 }
        );
        assert_eq!(crystal_shape(Shape::Plate, None), CrystalShape::plate());
        assert_eq!(
            crystal_shape(Shape::Spheroid, None),
            CrystalShape::Spheroid { aspect: 0.6 }
        );
    }
}
