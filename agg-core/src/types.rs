/// Identifier attached to every volume element of an
/// [`crate::aggregate::Aggregate`].
///
/// Marks which monomer (or rime deposit) an element came from. Only used
/// for traceability, never for geometry.
pub type ElemId = i32;

/// Identifier given to every sphere placed by
/// [`crate::aggregate::Aggregate::add_rime_particles`].
pub const RIME_IDENT: ElemId = -1;

/// History branch recorded when a merged particle has no known history of
/// its own (e.g. it was freshly produced by the generator).
pub const UNKNOWN_BRANCH: ElemId = -9999;

/// Axis-aligned bounding extent `[[xmin, xmax], [ymin, ymax], [zmin, zmax]]`.
pub type Extent = [[f64; 2]; 3];

/// Integer lattice coordinate produced by [`crate::aggregate::Aggregate::grid`].
pub type LatticePoint = [i64; 3];
