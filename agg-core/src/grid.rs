//! Lattice snapping of a point cloud.
//!
//! Every element is rounded to the nearest lattice cell, with ties going to
//! the even cell. Elements that land on an already occupied cell are moved to
//! the nearest free cell, searched outward in cube shells, so the element
//! count never changes.

use std::cmp::Ordering;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::error::{AggError, Result};
use crate::types::LatticePoint;

/// Lexicographic order on lattice rows: x, then y, then z.
#[inline]
pub fn cmp_rows(a: &LatticePoint, b: &LatticePoint) -> Ordering {
    (a[0], a[1], a[2]).cmp(&(b[0], b[1], b[2]))
}

/// Whether `row` occurs in `sorted`, which must be ordered by [`cmp_rows`].
pub fn row_is_in_sorted(sorted: &[LatticePoint], row: &LatticePoint) -> bool {
    sorted.binary_search_by(|r| cmp_rows(r, row)).is_ok()
}

/// Inserts `row` into `sorted` unless already present.
///
/// ### Returns
/// `true` if the row was inserted.
pub fn insert_sorted(sorted: &mut Vec<LatticePoint>, row: LatticePoint) -> bool {
    match sorted.binary_search_by(|r| cmp_rows(r, &row)) {
        Ok(_) => false,
        Err(pos) => {
            sorted.insert(pos, row);
            true
        }
    }
}

/// Offsets on the surface of the cube of Chebyshev radius `r`.
///
/// Columns `(dx, dy)` on the rim of the square take every `dz` in
/// `[-r, r]`; interior columns only take `dz = ±r`.
pub fn outer_layer_of_cube(r: i64) -> impl Iterator<Item = LatticePoint> {
    (-r..=r).flat_map(move |dx| {
        (-r..=r).flat_map(move |dy| {
            let rim = dx.abs() == r || dy.abs() == r;
            (-r..=r)
                .filter(move |dz| rim || dz.abs() == r)
                .map(move |dz| [dx, dy, dz])
        })
    })
}

/// All nonzero lattice offsets, shell by shell in increasing Chebyshev
/// distance. Never ends.
pub fn neighbors_by_distance() -> impl Iterator<Item = LatticePoint> {
    (1..).flat_map(outer_layer_of_cube)
}

impl Aggregate {
    /// Snaps the cloud onto a lattice of spacing `res` (default `grid_res`).
    ///
    /// Colliding elements are relocated in random order to the nearest free
    /// cell. The result holds one distinct row per element, sorted by
    /// [`cmp_rows`]. The aggregate itself is not modified.
    pub fn grid(&self, res: Option<f64>, rng: &mut impl Rng) -> Result<Vec<LatticePoint>> {
        let res = res.unwrap_or(self.grid_res);
        if !(res > 0.0) {
            return Err(AggError::Config(format!(
                "lattice resolution must be positive (got {res})"
            )));
        }

        let mut rows: Vec<LatticePoint> = self
            .points
            .iter()
            .map(|p| {
                let c = *p / res;
                [
                    c.x.round_ties_even() as i64,
                    c.y.round_ties_even() as i64,
                    c.z.round_ties_even() as i64,
                ]
            })
            .collect();
        rows.sort_unstable_by(cmp_rows);

        let mut occupied: Vec<LatticePoint> = Vec::with_capacity(rows.len());
        let mut duplicates = Vec::new();
        for row in rows {
            if occupied.last() == Some(&row) {
                duplicates.push(row);
            } else {
                occupied.push(row);
            }
        }
        duplicates.shuffle(rng);

        let n_dup = duplicates.len();
        for row in duplicates {
            for [dx, dy, dz] in neighbors_by_distance() {
                if insert_sorted(&mut occupied, [row[0] + dx, row[1] + dy, row[2] + dz]) {
                    break;
                }
            }
        }

        debug!(elements = occupied.len(), relocated = n_dup, "snapped to lattice");
        Ok(occupied)
    }
}
