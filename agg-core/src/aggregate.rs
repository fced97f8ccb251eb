//! The aggregate entity: a cloud of equal spheres plus its bookkeeping.
//!
//! An [`Aggregate`] owns
//! - the element coordinates and one identifier per element,
//! - the element size `grid_res` (sphere diameter and lattice spacing),
//! - the axis-aligned extent, recomputed after every mutation,
//! - the monomer counter and the merge-history tree.
//!
//! Placement algorithms live in sibling modules and extend `Aggregate`
//! with their own `impl` blocks: [`crate::merge`] (monomer merging),
//! [`crate::rime`] (rime deposition) and [`crate::grid`] (lattice export).

use std::sync::Arc;

use glam::{DMat3, DVec3};
use nalgebra::{Matrix3, SymmetricEigen};
use rand::{Rng, RngCore};
use tracing::warn;

use crate::error::{AggError, Result};
use crate::generator::MonomerGenerator;
use crate::history::{CrystalTree, MergeTree};
use crate::rotator::{Rotator, rotation_matrix};
use crate::types::{ElemId, Extent};

/// Default removal tolerance of [`Aggregate::remove_elements`], in units of
/// `grid_res²`.
pub const DEFAULT_REMOVE_TOLERANCE: f64 = 0.001;

/// A 3-D aggregate snowflake model made of equal spherical volume elements.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub(crate) points: Vec<DVec3>,
    pub(crate) ids: Vec<ElemId>,
    pub(crate) grid_res: f64,
    pub(crate) extent: Extent,
    pub(crate) monomer_number: usize,
    pub(crate) id_tree: MergeTree,
    pub(crate) mono_type: CrystalTree,
    pub(crate) generator: Option<Arc<dyn MonomerGenerator>>,
}

/// Occupancy raster produced by [`Aggregate::project`].
///
/// Cell `(i, j)` is the `i`-th step along the first projected dimension and
/// the `j`-th along the second, both in units of `grid_res`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub rows: usize,
    pub cols: usize,
    cells: Vec<bool>,
}

impl Projection {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> bool {
        self.cells[i * self.cols + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize) {
        self.cells[i * self.cols + j] = true;
    }

    /// Number of occupied cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Inclusive span of occupied rows and columns, or `None` if empty.
    fn occupied_span(&self) -> Option<(usize, usize)> {
        let rows: Vec<usize> = (0..self.rows)
            .filter(|&i| (0..self.cols).any(|j| self.get(i, j)))
            .collect();
        let cols: Vec<usize> = (0..self.cols)
            .filter(|&j| (0..self.rows).any(|i| self.get(i, j)))
            .collect();
        match (rows.first(), rows.last(), cols.first(), cols.last()) {
            (Some(r0), Some(r1), Some(c0), Some(c1)) => Some((r1 - r0 + 1, c1 - c0 + 1)),
            _ => None,
        }
    }
}

impl Aggregate {
    /// Seeds a new aggregate with one cloud from `generator`.
    pub fn new(generator: Arc<dyn MonomerGenerator>, rng: &mut dyn RngCore, ident: ElemId) -> Self {
        let points = generator.generate(rng);
        let mut agg = Self {
            ids: vec![ident; points.len()],
            points,
            grid_res: generator.grid_res(),
            extent: [[0.0; 2]; 3],
            monomer_number: 1,
            id_tree: MergeTree::leaf(ident),
            mono_type: CrystalTree::leaf(Some(generator.crystal().to_string())),
            generator: Some(generator),
        };
        agg.update_extent();
        agg
    }

    /// Seeds a new aggregate from an explicit cloud.
    pub fn from_points(points: Vec<DVec3>, grid_res: f64, ident: ElemId) -> Result<Self> {
        if !(grid_res > 0.0) {
            return Err(AggError::Config(format!(
                "grid_res must be positive (got {grid_res})"
            )));
        }
        let mut agg = Self {
            ids: vec![ident; points.len()],
            points,
            grid_res,
            extent: [[0.0; 2]; 3],
            monomer_number: 1,
            id_tree: MergeTree::leaf(ident),
            mono_type: CrystalTree::leaf(None),
            generator: None,
        };
        agg.update_extent();
        Ok(agg)
    }

    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    pub fn ids(&self) -> &[ElemId] {
        &self.ids
    }

    pub fn grid_res(&self) -> f64 {
        self.grid_res
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn monomer_number(&self) -> usize {
        self.monomer_number
    }

    pub fn id_tree(&self) -> &MergeTree {
        &self.id_tree
    }

    /// Crystal types of the merged monomers, in the shape of
    /// [`Aggregate::id_tree`].
    pub fn mono_type(&self) -> &CrystalTree {
        &self.mono_type
    }

    pub fn generator(&self) -> Option<&Arc<dyn MonomerGenerator>> {
        self.generator.as_ref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn centroid(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        self.points.iter().copied().sum::<DVec3>() / self.points.len() as f64
    }

    /// Appends elements, all tagged with `ident`.
    ///
    /// With `update == false` the frame is not recentered; call
    /// [`Aggregate::update_coordinates`] once a batch of edits is done.
    pub fn add_elements(&mut self, added: &[DVec3], ident: ElemId, update: bool) {
        self.points.extend_from_slice(added);
        self.ids.extend(std::iter::repeat_n(ident, added.len()));
        if update {
            self.update_coordinates();
        }
    }

    /// Appends elements with one identifier each.
    ///
    /// ### Panics
    /// Panics if `added` and `ids` differ in length.
    pub fn add_elements_with_ids(&mut self, added: &[DVec3], ids: &[ElemId], update: bool) {
        assert_eq!(added.len(), ids.len());
        self.points.extend_from_slice(added);
        self.ids.extend_from_slice(ids);
        if update {
            self.update_coordinates();
        }
    }

    /// Drops every element whose squared distance from one of `removed` is
    /// below `tolerance * grid_res²`.
    pub fn remove_elements(&mut self, removed: &[DVec3], tolerance: f64, update: bool) {
        let limit = self.grid_res * self.grid_res * tolerance;
        let keep: Vec<bool> = self
            .points
            .iter()
            .map(|p| removed.iter().all(|r| p.distance_squared(*r) >= limit))
            .collect();
        let mut k = keep.iter();
        self.points.retain(|_| *k.next().unwrap_or(&true));
        let mut k = keep.iter();
        self.ids.retain(|_| *k.next().unwrap_or(&true));
        if update {
            self.update_coordinates();
        }
    }

    /// Recomputes the extent from scratch.
    ///
    /// An empty cloud has the degenerate extent `[[0, 0], [0, 0], [0, 0]]`.
    pub fn update_extent(&mut self) {
        self.extent = extent_of(&self.points);
    }

    /// Moves the centroid to the origin, then updates the extent.
    pub fn update_coordinates(&mut self) {
        let c = self.centroid();
        for p in &mut self.points {
            *p -= c;
        }
        self.update_extent();
    }

    /// Rasterizes the aggregate onto a 2-D grid of spacing `grid_res`.
    ///
    /// `axis` 0 projects onto (y, z), 1 onto (x, z) and 2 onto (x, y).
    /// With a `direction` of Euler angles `(alpha, beta)` the aggregate is
    /// viewed through that rotation and projected along axis 0 instead; the
    /// aggregate itself is left untouched, and `axis` is ignored.
    pub fn project(&self, axis: usize, direction: Option<(f64, f64)>) -> Result<Projection> {
        if direction.is_none() && axis > 2 {
            return Err(AggError::InvalidAxis(axis));
        }
        if self.points.is_empty() {
            return Err(AggError::EmptyCloud);
        }

        let (axis, view) = match direction {
            Some((alpha, beta)) => (0, rotation_matrix(alpha, beta, 0.0).transpose()),
            None => (axis, DMat3::IDENTITY),
        };
        let (a, b) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };

        let plane: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|p| {
                let q = view * *p;
                (q[a], q[b])
            })
            .collect();
        let u0 = plane.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let v0 = plane.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);

        let cells: Vec<(usize, usize)> = plane
            .iter()
            .map(|&(u, v)| {
                (
                    ((u - u0) / self.grid_res).round_ties_even() as usize,
                    ((v - v0) / self.grid_res).round_ties_even() as usize,
                )
            })
            .collect();
        let rows = cells.iter().map(|c| c.0).max().unwrap_or(0) + 1;
        let cols = cells.iter().map(|c| c.1).max().unwrap_or(0) + 1;

        let mut proj = Projection::new(rows, cols);
        for (i, j) in cells {
            proj.set(i, j);
        }
        Ok(proj)
    }

    /// Occupied projection area.
    pub fn projected_area(&self, axis: usize, direction: Option<(f64, f64)>) -> Result<f64> {
        let proj = self.project(axis, direction)?;
        Ok(proj.count() as f64 * self.grid_res * self.grid_res)
    }

    /// Ratio of the occupied span along the first projected dimension to the
    /// span along the second.
    pub fn projected_aspect_ratio(&self, axis: usize, direction: Option<(f64, f64)>) -> Result<f64> {
        let proj = self.project(axis, direction)?;
        let (rows, cols) = proj.occupied_span().ok_or(AggError::EmptyCloud)?;
        Ok(rows as f64 / cols as f64)
    }

    /// Principal axes, one per column, in descending order of length.
    ///
    /// The length of each axis is the standard deviation of the cloud along
    /// it. The covariance is regularized by `grid_res²/12` on the diagonal
    /// (the variance of a single element). If the eigen-decomposition fails
    /// the result is the zero matrix.
    pub fn principal_axes(&self) -> DMat3 {
        if self.points.is_empty() {
            warn!("principal axes of an empty aggregate");
            return DMat3::ZERO;
        }
        let c = self.centroid();
        let n = self.points.len() as f64;
        let mut cov = Matrix3::<f64>::zeros();
        for p in &self.points {
            let d = *p - c;
            let v = nalgebra::Vector3::new(d.x, d.y, d.z);
            cov += v * v.transpose();
        }
        cov /= n;
        cov += Matrix3::identity() * (self.grid_res * self.grid_res / 12.0);

        if cov.iter().any(|x| !x.is_finite()) {
            warn!("non-finite covariance, principal axes set to zero");
            return DMat3::ZERO;
        }
        let eig = match SymmetricEigen::try_new(cov, f64::EPSILON, 1000) {
            Some(eig) => eig,
            None => {
                warn!("eigen-decomposition did not converge, principal axes set to zero");
                return DMat3::ZERO;
            }
        };

        let mut order = [0usize, 1, 2];
        order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));
        let cols = order.map(|k| {
            let v = eig.eigenvectors.column(k);
            DVec3::new(v[0], v[1], v[2]) * eig.eigenvalues[k].max(0.0).sqrt()
        });
        DMat3::from_cols(cols[0], cols[1], cols[2])
    }

    /// Height over width from the principal axes.
    pub fn aspect_ratio(&self) -> f64 {
        let pa = self.principal_axes();
        let width = (0.5 * (pa.x_axis.length_squared() + pa.y_axis.length_squared())).sqrt();
        pa.z_axis.length() / width
    }

    /// Rotates the aggregate into its principal-axis frame: the longest axis
    /// along x, the shortest along z.
    pub fn align(&mut self) {
        let pa = self.principal_axes();
        let lens = [pa.x_axis.length(), pa.y_axis.length(), pa.z_axis.length()];
        if lens.iter().any(|&l| !(l > 0.0)) {
            warn!("degenerate principal axes, alignment skipped");
            return;
        }
        let mut frame = DMat3::from_cols(
            pa.x_axis / lens[0],
            pa.y_axis / lens[1],
            pa.z_axis / lens[2],
        );
        // Keep a proper rotation; a reflection would mirror the aggregate.
        if frame.determinant() < 0.0 {
            frame.z_axis = -frame.z_axis;
        }
        let to_frame = frame.transpose();
        for p in &mut self.points {
            *p = to_frame * *p;
        }
        self.update_extent();
    }

    /// Recenters, then applies `rotator`.
    pub fn rotate<R: Rotator>(&mut self, rotator: &R, rng: &mut impl Rng) {
        let c = self.centroid();
        for p in &mut self.points {
            *p -= c;
        }
        rotator.rotate(&mut self.points, rng);
        self.update_extent();
    }
}

/// Per-axis min/max of `points`; all zeros when empty.
pub(crate) fn extent_of(points: &[DVec3]) -> Extent {
    if points.is_empty() {
        return [[0.0; 2]; 3];
    }
    let mut lo = DVec3::splat(f64::INFINITY);
    let mut hi = DVec3::splat(f64::NEG_INFINITY);
    for p in points {
        lo = lo.min(*p);
        hi = hi.max(*p);
    }
    [[lo.x, hi.x], [lo.y, hi.y], [lo.z, hi.z]]
}
