//! Monomer merging: attach an incoming cloud beneath an aggregate.
//!
//! The incoming cloud gets a random horizontal offset and is then raised
//! from below until its first sphere touches a sphere of the aggregate:
//!
//! 1. Restrict both clouds to the window where their footprints overlap
//!    (widened by one element).
//! 2. Optionally keep only the extreme element per horizontal bin
//!    ([`CollisionStrategy::Binned`]).
//! 3. For every incoming/aggregate pair closer than `grid_res` in the plane,
//!    compute the vertical shift that makes the two spheres touch, and take
//!    the minimum over all pairs.
//!
//! Elements deep inside either cloud can be excluded from the search (see
//! [`intersection_mask`]), which allows controlled interpenetration.

use std::collections::BTreeMap;

use glam::DVec3;
use rand::Rng;
use tracing::{debug, trace};

use crate::aggregate::{Aggregate, extent_of};
use crate::config::{CollisionStrategy, MergeConfig};
use crate::error::{AggError, Result};
use crate::history::{CrystalTree, MergeTree};
use crate::index::Index2D;
use crate::rotator::UniformRotator;
use crate::types::{ElemId, UNKNOWN_BRANCH};

/// A cloud about to be merged, with its provenance.
#[derive(Debug, Clone)]
pub struct Particle {
    pub points: Vec<DVec3>,
    pub ids: Vec<ElemId>,
    /// Monomers contained in this particle.
    pub monomers: usize,
    pub branch: MergeTree,
    pub mono_type: CrystalTree,
}

impl Particle {
    /// A single monomer with no recorded history.
    pub fn new(points: Vec<DVec3>, ident: ElemId) -> Self {
        Self {
            ids: vec![ident; points.len()],
            points,
            monomers: 1,
            branch: MergeTree::leaf(UNKNOWN_BRANCH),
            mono_type: CrystalTree::leaf(None),
        }
    }

    /// Records the crystal type of a single-monomer particle.
    pub fn with_crystal(mut self, crystal: &str) -> Self {
        self.mono_type = CrystalTree::leaf(Some(crystal.to_string()));
        self
    }

    /// Consumes an aggregate, keeping its identifiers, monomer count and
    /// merge history.
    pub fn from_aggregate(agg: Aggregate) -> Self {
        Self {
            points: agg.points,
            ids: agg.ids,
            monomers: agg.monomer_number,
            branch: agg.id_tree,
            mono_type: agg.mono_type,
        }
    }
}

/// Marks the elements of `points` that take part in the intersection test.
///
/// With `d` the distance of each element from the cloud's centroid, an
/// element is kept if it lies within the inner `mass_fraction` percent of
/// `d`, or if it is at least `pen_depth` inside the outermost element.
/// `mass_fraction >= 100` keeps everything.
pub fn intersection_mask(points: &[DVec3], pen_depth: f64, mass_fraction: f64) -> Vec<bool> {
    if mass_fraction >= 100.0 || points.is_empty() {
        return vec![true; points.len()];
    }
    let center = points.iter().copied().sum::<DVec3>() / points.len() as f64;
    let dist: Vec<f64> = points.iter().map(|p| p.distance(center)).collect();

    let mut sorted = dist.clone();
    sorted.sort_by(f64::total_cmp);
    let k = ((sorted.len() as f64 * mass_fraction / 100.0) as usize).min(sorted.len() - 1);
    let mf_limit = sorted[k];
    let pd_limit = sorted[sorted.len() - 1] - pen_depth;

    dist.iter().map(|&d| d <= mf_limit || d <= pd_limit).collect()
}

/// Smallest vertical shift that puts `elem` just below one of `candidates`.
///
/// Only candidates closer than `sqrt(grid_res_sqr)` in the horizontal plane
/// can touch; with none, the result is infinite.
pub fn min_z_separation<'a, I>(candidates: I, elem: DVec3, grid_res_sqr: f64) -> f64
where
    I: IntoIterator<Item = &'a DVec3>,
{
    candidates
        .into_iter()
        .filter_map(|q| {
            let dx = q.x - elem.x;
            let dy = q.y - elem.y;
            let sep_sqr = dx * dx + dy * dy;
            (sep_sqr < grid_res_sqr).then(|| q.z - elem.z - (grid_res_sqr - sep_sqr).sqrt())
        })
        .fold(f64::INFINITY, f64::min)
}

/// Minimum over `moving` of [`min_z_separation`] against `fixed`.
fn min_contact_shift(fixed: &[DVec3], moving: &[DVec3], grid_res: f64) -> f64 {
    let mut index: Index2D<DVec3> = Index2D::new(grid_res);
    index.extend(fixed.iter().map(|q| ([q.x, q.y], *q)));
    let r2 = grid_res * grid_res;
    moving
        .iter()
        .map(|p| min_z_separation(index.items_near([p.x, p.y], grid_res), *p, r2))
        .fold(f64::INFINITY, f64::min)
}

/// Keeps one element per horizontal bin of side `bin_size`: the highest one
/// if `highest`, otherwise the lowest.
pub fn extreme_per_bin(points: &[DVec3], bin_size: f64, highest: bool) -> Vec<DVec3> {
    if points.is_empty() {
        return Vec::new();
    }
    let x0 = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let y0 = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let mut bins: BTreeMap<(i64, i64), DVec3> = BTreeMap::new();
    for p in points {
        let key = (
            ((p.x - x0) / bin_size).floor() as i64,
            ((p.y - y0) / bin_size).floor() as i64,
        );
        bins.entry(key)
            .and_modify(|best| {
                if (highest && p.z > best.z) || (!highest && p.z < best.z) {
                    *best = *p;
                }
            })
            .or_insert(*p);
    }
    bins.into_values().collect()
}

/// Horizontal window `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug)]
struct Window {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
}

impl Window {
    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    #[inline]
    fn contains(&self, p: DVec3) -> bool {
        p.x >= self.x0 && p.x < self.x1 && p.y >= self.y0 && p.y < self.y1
    }
}

impl Aggregate {
    /// Merges `particle` into this aggregate, attaching it from below at a
    /// random horizontal position.
    ///
    /// With `particle == None` a fresh monomer is drawn from the aggregate's
    /// generator.
    ///
    /// Returns `Ok(true)` if the particle was attached. With
    /// `required == false` a single random position is tried and `Ok(false)`
    /// reports that it admitted no contact. With `required == true` the
    /// search is repeated until a site is found, without any retry limit:
    /// the caller must make sure a site exists.
    pub fn add_particle(
        &mut self,
        particle: Option<Particle>,
        required: bool,
        cfg: &MergeConfig,
        rng: &mut impl Rng,
    ) -> Result<bool> {
        cfg.validate()?;
        let particle = match particle {
            Some(p) => p,
            None => {
                let generator = self
                    .generator
                    .clone()
                    .ok_or_else(|| AggError::Config("aggregate has no monomer generator".into()))?;
                Particle::new(generator.generate(rng), self.monomer_number as ElemId)
                    .with_crystal(generator.crystal())
            }
        };
        if particle.points.len() != particle.ids.len() {
            return Err(AggError::Config(format!(
                "particle has {} elements but {} identifiers",
                particle.points.len(),
                particle.ids.len()
            )));
        }
        if particle.points.is_empty() || self.points.is_empty() {
            return Err(AggError::EmptyCloud);
        }

        let grid_res = self.grid_res;
        let mf = cfg.pen_depth_by_mass_fraction;

        let p_mask = intersection_mask(&particle.points, cfg.pen_depth, mf);
        let p_masked: Vec<DVec3> = particle
            .points
            .iter()
            .zip(&p_mask)
            .filter_map(|(p, &keep)| keep.then_some(*p))
            .collect();
        let p_ext = extent_of(&p_masked);

        let a_mask = intersection_mask(&self.points, cfg.pen_depth, mf);
        let a_ext = self.extent;

        // Offsets for which the footprints can overlap.
        let x0 = a_ext[0][0] - p_ext[0][1];
        let x1 = a_ext[0][1] - p_ext[0][0];
        let y0 = a_ext[1][0] - p_ext[1][1];
        let y1 = a_ext[1][1] - p_ext[1][0];

        let mut attempts = 0usize;
        let site = loop {
            attempts += 1;
            let x_shift = x0 + rng.random::<f64>() * (x1 - x0);
            let y_shift = y0 + rng.random::<f64>() * (y1 - y0);

            let window = Window {
                x0: (p_ext[0][0] + x_shift).max(a_ext[0][0]) - grid_res,
                x1: (p_ext[0][1] + x_shift).min(a_ext[0][1]) + grid_res,
                y0: (p_ext[1][0] + y_shift).max(a_ext[1][0]) - grid_res,
                y1: (p_ext[1][1] + y_shift).min(a_ext[1][1]) + grid_res,
            };
            if window.is_empty() {
                trace!(attempts, "footprints do not overlap");
                if required {
                    continue;
                }
                break None;
            }

            let fixed: Vec<DVec3> = self
                .points
                .iter()
                .zip(&a_mask)
                .filter_map(|(q, &keep)| (keep && window.contains(*q)).then_some(*q))
                .collect();
            if fixed.is_empty() {
                trace!(attempts, "no aggregate elements under the window");
                if required {
                    continue;
                }
                break None;
            }

            let offset = DVec3::new(x_shift, y_shift, 0.0);
            let moving: Vec<DVec3> = p_masked
                .iter()
                .map(|p| *p + offset)
                .filter(|p| window.contains(*p))
                .collect();

            let (fixed, moving) = match cfg.strategy {
                CollisionStrategy::Exact => (fixed, moving),
                CollisionStrategy::Binned { factor } => (
                    extreme_per_bin(&fixed, grid_res * factor, false),
                    extreme_per_bin(&moving, grid_res * factor, true),
                ),
            };

            let z_shift = min_contact_shift(&fixed, &moving, grid_res);
            if z_shift.is_finite() {
                break Some(DVec3::new(x_shift, y_shift, z_shift));
            }
            trace!(attempts, "no contact at this offset");
            if !required {
                break None;
            }
        };

        let Some(mut shift) = site else {
            debug!(attempts, "no merge site found");
            return Ok(false);
        };
        if mf >= 100.0 {
            shift.z += cfg.pen_depth;
        }
        debug!(attempts, ?shift, elements = particle.points.len(), "merged particle");

        let moved: Vec<DVec3> = particle.points.iter().map(|p| *p + shift).collect();
        self.add_elements_with_ids(&moved, &particle.ids, true);
        self.monomer_number += particle.monomers;
        self.id_tree.push_branch(particle.branch);
        self.mono_type.push_branch(particle.mono_type);
        Ok(true)
    }

    /// Consumes `other`, rotating it uniformly at random and merging it into
    /// this aggregate with `required == true`.
    pub fn merge_aggregate(
        &mut self,
        mut other: Aggregate,
        cfg: &MergeConfig,
        rng: &mut impl Rng,
    ) -> Result<()> {
        other.rotate(&UniformRotator, rng);
        self.add_particle(Some(Particle::from_aggregate(other)), true, cfg, rng)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{CrystalGenerator, CrystalShape, MonomerGenerator};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn exact() -> MergeConfig {
        MergeConfig {
            strategy: CollisionStrategy::Exact,
            ..MergeConfig::default()
        }
    }

    fn assert_no_overlap(agg: &Aggregate, a: ElemId, b: ElemId) {
        let r2 = agg.grid_res() * agg.grid_res();
        let pts = agg.points();
        let ids = agg.ids();
        for i in 0..pts.len() {
            if ids[i] != a {
                continue;
            }
            for j in 0..pts.len() {
                if ids[j] == b {
                    let d2 = pts[i].distance_squared(pts[j]);
                    assert!(d2 >= r2 * (1.0 - 1e-9), "elements {i} and {j} overlap: d2={d2}");
                }
            }
        }
    }

    #[test]
    fn full_mass_fraction_keeps_everything() {
        let pts = vec![DVec3::ZERO, DVec3::X, DVec3::new(5.0, 0.0, 0.0)];
        assert_eq!(intersection_mask(&pts, 100.0, 100.0), vec![true; 3]);
    }

    #[test]
    fn mask_excludes_far_points_only_when_both_criteria_fail() {
        let pts: Vec<DVec3> = (-5..=5).map(|i| DVec3::new(i as f64, 0.0, 0.0)).collect();
        // Inner 50 % by mass fraction; pen_depth too large to help.
        let mask = intersection_mask(&pts, 100.0, 50.0);
        assert!(mask[5]);
        assert!(!mask[0] && !mask[10]);

        // Zero pen_depth keeps everything through the depth criterion.
        let mask = intersection_mask(&pts, 0.0, 50.0);
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn min_z_separation_rests_below() {
        let above = [DVec3::new(0.0, 0.0, 3.0)];
        assert_relative_eq!(min_z_separation(&above, DVec3::ZERO, 1.0), 2.0);
        let far = [DVec3::new(2.0, 0.0, 3.0)];
        assert!(min_z_separation(&far, DVec3::ZERO, 1.0).is_infinite());
        assert!(min_z_separation(&[], DVec3::ZERO, 1.0).is_infinite());
    }

    #[test]
    fn extreme_per_bin_keeps_one_per_column() {
        let pts = vec![
            DVec3::new(0.1, 0.1, 0.0),
            DVec3::new(0.2, 0.1, 5.0),
            DVec3::new(3.0, 0.1, 1.0),
        ];
        let high = extreme_per_bin(&pts, 1.0, true);
        assert_eq!(high.len(), 2);
        assert!(high.contains(&DVec3::new(0.2, 0.1, 5.0)));
        let low = extreme_per_bin(&pts, 1.0, false);
        assert!(low.contains(&DVec3::new(0.1, 0.1, 0.0)));
    }

    #[test]
    fn single_spheres_touch_vertically() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut agg = Aggregate::from_points(vec![DVec3::ZERO], 1.0, 0).unwrap();
        let merged = agg
            .add_particle(Some(Particle::new(vec![DVec3::ZERO], 1)), true, &exact(), &mut rng)
            .unwrap();
        assert!(merged);
        let pts = agg.points();
        assert_relative_eq!(pts[0].distance(pts[1]), 1.0, epsilon = 1e-12);
        assert!(pts[1].z < pts[0].z);
        assert_eq!(agg.monomer_number(), 2);
        assert_eq!(agg.id_tree().leaves(), vec![0, UNKNOWN_BRANCH]);
    }

    #[test]
    fn optional_merge_can_fail_without_error() {
        let mut outcomes = Vec::new();
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut agg = Aggregate::from_points(
                vec![DVec3::new(-10.0, 0.0, 0.0), DVec3::new(10.0, 0.0, 0.0)],
                1.0,
                0,
            )
            .unwrap();
            let ok = agg
                .add_particle(Some(Particle::new(vec![DVec3::ZERO], 1)), false, &exact(), &mut rng)
                .unwrap();
            assert_eq!(agg.len(), if ok { 3 } else { 2 });
            outcomes.push(ok);
        }
        assert!(outcomes.contains(&false));
        assert!(outcomes.contains(&true));
    }

    #[test]
    fn exact_merge_leaves_no_overlap() {
        for seed in 0..5 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let g = CrystalGenerator::monodisperse(CrystalShape::plate(), 12.0, 1.0).unwrap();
            let mut agg = Aggregate::from_points(g.generate(&mut rng), 1.0, 0).unwrap();
            let particle = Particle::new(g.generate(&mut rng), 1);
            assert!(agg.add_particle(Some(particle), true, &exact(), &mut rng).unwrap());
            assert_no_overlap(&agg, 0, 1);
        }
    }

    #[test]
    fn required_merge_from_generator_succeeds() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let g = CrystalGenerator::monodisperse(CrystalShape::Spheroid { aspect: 0.6 }, 8.0, 1.0)
            .unwrap();
        let mut agg = Aggregate::new(Arc::new(g), &mut rng, 0);
        for n in 2..=4 {
            assert!(agg
                .add_particle(None, true, &MergeConfig::default(), &mut rng)
                .unwrap());
            assert_eq!(agg.monomer_number(), n);
        }
        assert_eq!(agg.id_tree().leaf_count(), 4);
    }

    #[test]
    fn add_particle_without_generator_is_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut agg = Aggregate::from_points(vec![DVec3::ZERO], 1.0, 0).unwrap();
        assert!(agg.add_particle(None, false, &exact(), &mut rng).is_err());
    }

    #[test]
    fn bad_mass_fraction_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut agg = Aggregate::from_points(vec![DVec3::ZERO], 1.0, 0).unwrap();
        for mf in [1.0, 0.5, 100.5] {
            let cfg = MergeConfig {
                pen_depth_by_mass_fraction: mf,
                ..exact()
            };
            let res = agg.add_particle(Some(Particle::new(vec![DVec3::ZERO], 1)), true, &cfg, &mut rng);
            assert_eq!(res, Err(AggError::MassFraction(mf)));
        }
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn merge_aggregate_sums_monomers_and_keeps_ids() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let g: Arc<dyn MonomerGenerator> =
            Arc::new(CrystalGenerator::monodisperse(CrystalShape::plate(), 10.0, 1.0).unwrap());
        let mut a = Aggregate::new(g.clone(), &mut rng, 0);
        let mut b = Aggregate::new(g.clone(), &mut rng, 1);
        b.add_particle(None, true, &MergeConfig::default(), &mut rng).unwrap();
        let b_len = b.len();
        let a_len = a.len();

        a.merge_aggregate(b, &MergeConfig::default(), &mut rng).unwrap();
        assert_eq!(a.monomer_number(), 3);
        assert_eq!(a.len(), a_len + b_len);
        assert!(a.ids().contains(&1));
        assert_eq!(a.id_tree().leaf_count(), 3);
    }

    fn single_sphere_distance(pen_depth: f64, mass_fraction: f64) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut agg = Aggregate::from_points(vec![DVec3::ZERO], 1.0, 0).unwrap();
        let cfg = MergeConfig {
            pen_depth,
            pen_depth_by_mass_fraction: mass_fraction,
            ..exact()
        };
        assert!(agg
            .add_particle(Some(Particle::new(vec![DVec3::ZERO], 1)), true, &cfg, &mut rng)
            .unwrap());
        let pts = agg.points();
        pts[0].distance(pts[1])
    }

    #[test]
    fn pen_depth_shift_applies_without_mass_fraction_filter() {
        assert_relative_eq!(single_sphere_distance(0.3, 100.0), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn mass_fraction_filter_drops_pen_depth_shift() {
        assert_relative_eq!(single_sphere_distance(0.3, 50.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn only_masked_out_elements_may_overlap() {
        let cfg = MergeConfig {
            pen_depth: 100.0,
            pen_depth_by_mass_fraction: 50.0,
            ..exact()
        };
        let g = CrystalGenerator::monodisperse(CrystalShape::plate(), 12.0, 1.0).unwrap();
        for seed in 0..5 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut agg = Aggregate::from_points(g.generate(&mut rng), 1.0, 0).unwrap();
            let incoming = g.generate(&mut rng);
            let a_mask = intersection_mask(agg.points(), cfg.pen_depth, cfg.pen_depth_by_mass_fraction);
            let p_mask = intersection_mask(&incoming, cfg.pen_depth, cfg.pen_depth_by_mass_fraction);
            let n_a = agg.len();

            assert!(agg
                .add_particle(Some(Particle::new(incoming, 1)), true, &cfg, &mut rng)
                .unwrap());
            let pts = agg.points();
            for (i, &a_kept) in a_mask.iter().enumerate() {
                for (j, &p_kept) in p_mask.iter().enumerate() {
                    let d2 = pts[i].distance_squared(pts[n_a + j]);
                    if d2 < 1.0 - 1e-9 {
                        assert!(
                            !a_kept || !p_kept,
                            "seed {seed}: intersecting elements {i} and {j} overlap (d2={d2})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn mismatched_particle_ids_are_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut agg = Aggregate::from_points(vec![DVec3::ZERO], 1.0, 0).unwrap();
        let mut particle = Particle::new(vec![DVec3::ZERO, DVec3::X], 1);
        particle.ids.pop();
        let res = agg.add_particle(Some(particle), true, &exact(), &mut rng);
        assert!(matches!(res, Err(AggError::Config(_))));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn crystal_types_follow_merges() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let g: Arc<dyn MonomerGenerator> =
            Arc::new(CrystalGenerator::monodisperse(CrystalShape::column(), 6.0, 1.0).unwrap());
        let mut agg = Aggregate::new(g, &mut rng, 0);
        agg.add_particle(None, true, &MergeConfig::default(), &mut rng)
            .unwrap();
        agg.add_particle(Some(Particle::new(vec![DVec3::ZERO], 9)), true, &MergeConfig::default(), &mut rng)
            .unwrap();

        let column = Some("column".to_string());
        assert_eq!(agg.mono_type().leaves(), vec![column.clone(), column, None]);
    }
}
