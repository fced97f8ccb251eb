//! Rime deposition: single spheres settling onto an aggregate's surface.
//!
//! Each sphere enters at a random horizontal position inside the
//! aggregate's footprint. The elements under that position are sorted by
//! height and the sphere is tried against each of them, starting from the
//! deepest one allowed by the penetration depth and working back toward the
//! surface. The first contact height that does not overlap any third sphere
//! wins; the lower contact of the bottom-most element is always accepted.

use glam::DVec3;
use rand::Rng;
use tracing::{debug, trace};

use crate::aggregate::Aggregate;
use crate::compact::compact_rime;
use crate::config::RimeConfig;
use crate::error::{AggError, Result};
use crate::index::{Index2D, Index3D};
use crate::types::RIME_IDENT;

#[inline]
fn spheres_overlap(a: DVec3, b: DVec3, r_sqr: f64) -> bool {
    a.distance_squared(b) < r_sqr
}

/// Finds a contact height at `(xs, ys)` against `near`, sorted by `z`.
///
/// Only the first `last` elements (those within the penetration depth of
/// the bottom-most one) are tried as supports; all of `near` is checked for
/// overlap.
fn find_site(near: &[DVec3], z: &[f64], last: usize, xs: f64, ys: f64, grid_res: f64) -> Option<f64> {
    let r_sqr = grid_res * grid_res;
    for i in (0..last).rev() {
        let support = near[i];
        let d_sqr = (support.x - xs).powi(2) + (support.y - ys).powi(2);
        let dz = (r_sqr - d_sqr).max(0.0).sqrt();
        let z_upper = support.z + dz;
        let z_lower = support.z - dz;

        for zc in [z_upper, z_lower] {
            if i == 0 && zc == z_lower {
                return Some(zc);
            }
            let j0 = z.partition_point(|&v| v < zc - grid_res);
            let j1 = z.partition_point(|&v| v < zc + grid_res);
            let site = DVec3::new(xs, ys, zc);
            let blocked = (j0..j1).any(|j| j != i && spheres_overlap(near[j], site, r_sqr));
            if !blocked {
                return Some(zc);
            }
        }
    }
    None
}

/// Neighbour lookup that either scans linearly or uses bucket indices.
struct Neighbourhood {
    grid_res: f64,
    planar: Option<Index2D<DVec3>>,
    spatial: Option<Index3D<DVec3>>,
}

impl Neighbourhood {
    fn new(points: &[DVec3], grid_res: f64, indexed: bool, spatial: bool) -> Self {
        let planar = indexed.then(|| {
            let mut idx = Index2D::new(grid_res);
            idx.extend(points.iter().map(|p| ([p.x, p.y], *p)));
            idx
        });
        let spatial = (indexed && spatial).then(|| {
            let mut idx = Index3D::new(grid_res);
            idx.extend(points.iter().map(|p| (p.to_array(), *p)));
            idx
        });
        Self {
            grid_res,
            planar,
            spatial,
        }
    }

    fn insert(&mut self, p: DVec3) {
        if let Some(idx) = self.planar.as_mut() {
            idx.insert([p.x, p.y], p);
        }
        if let Some(idx) = self.spatial.as_mut() {
            idx.insert(p.to_array(), p);
        }
    }

    /// Elements closer than `grid_res` to `(x, y)` in the horizontal plane.
    fn planar_near(&self, existing: &[DVec3], added: &[DVec3], x: f64, y: f64) -> Vec<DVec3> {
        let r_sqr = self.grid_res * self.grid_res;
        let close = |p: &&DVec3| (p.x - x).powi(2) + (p.y - y).powi(2) < r_sqr;
        match &self.planar {
            Some(idx) => idx.items_near([x, y], self.grid_res).filter(close).copied().collect(),
            None => existing.iter().chain(added).filter(close).copied().collect(),
        }
    }

    /// Elements closer than `2 * grid_res` to `p`.
    fn spatial_near(&self, existing: &[DVec3], added: &[DVec3], p: DVec3) -> Vec<DVec3> {
        let radius = 2.0 * self.grid_res;
        let close = |q: &&DVec3| q.distance_squared(p) < radius * radius;
        match &self.spatial {
            Some(idx) => idx.items_near(p.to_array(), radius).filter(close).copied().collect(),
            None => existing.iter().chain(added).filter(close).copied().collect(),
        }
    }
}

impl Aggregate {
    /// Deposits `n` rime spheres onto the aggregate.
    ///
    /// Sites are searched one sphere at a time; a sphere placed earlier in
    /// the batch can support later ones. A horizontal position that admits
    /// no site is redrawn without limit. All spheres are appended at the end
    /// with the identifier [`RIME_IDENT`]. `n == 0` leaves the aggregate
    /// untouched.
    pub fn add_rime_particles(&mut self, n: usize, cfg: &RimeConfig, rng: &mut impl Rng) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if self.points.is_empty() {
            return Err(AggError::EmptyCloud);
        }
        if !(cfg.pen_depth >= 0.0) {
            return Err(AggError::Config(format!(
                "rime pen_depth must be non-negative (got {})",
                cfg.pen_depth
            )));
        }

        let grid_res = self.grid_res;
        let [[x0, x1], [y0, y1], _] = self.extent;
        let compact = cfg.compact_dist > 0.0;
        let mut hood = Neighbourhood::new(&self.points, grid_res, n > 1, compact);

        let mut added: Vec<DVec3> = Vec::with_capacity(n);
        let mut redraws = 0usize;
        while added.len() < n {
            let xs = x0 + rng.random::<f64>() * (x1 - x0);
            let ys = y0 + rng.random::<f64>() * (y1 - y0);

            let mut near = hood.planar_near(&self.points, &added, xs, ys);
            if near.is_empty() {
                redraws += 1;
                continue;
            }
            near.sort_by(|a, b| a.z.total_cmp(&b.z));
            let z: Vec<f64> = near.iter().map(|p| p.z).collect();
            let last = z.partition_point(|&v| v < z[0] + cfg.pen_depth).max(1);

            let Some(zc) = find_site(&near, &z, last, xs, ys, grid_res) else {
                redraws += 1;
                trace!(xs, ys, "no rime site");
                continue;
            };

            let mut site = DVec3::new(xs, ys, zc);
            if compact {
                let around = hood.spatial_near(&self.points, &added, site);
                if !around.is_empty() {
                    site = compact_rime(site, &around, grid_res, cfg.compact_dist, &cfg.compact);
                }
            }

            for (axis, v) in site.to_array().into_iter().enumerate() {
                self.extent[axis][0] = self.extent[axis][0].min(v);
                self.extent[axis][1] = self.extent[axis][1].max(v);
            }
            hood.insert(site);
            added.push(site);
        }

        debug!(n, redraws, "deposited rime");
        self.add_elements(&added, RIME_IDENT, true);
        Ok(())
    }
}
