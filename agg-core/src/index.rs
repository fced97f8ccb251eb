//! Bucketed neighbour lookup over 2-D and 3-D point sets.
//!
//! Space is partitioned into cubic (or square) cells of side `elem_size`.
//! Every payload is stored in the cell its key falls into. A query walks all
//! cells overlapping the axis-aligned box `[query - radius, query + radius]`,
//! so the result is a superset of the exact-radius match: callers always
//! post-filter by true squared distance.

use rustc_hash::FxHashMap;

/// Uniform bucket grid keyed by `D` real coordinates.
#[derive(Debug, Clone)]
pub struct SpatialIndex<const D: usize, T> {
    elem_size: f64,
    inv_elem_size: f64,
    cells: FxHashMap<[i64; D], Vec<T>>,
    len: usize,
}

/// Index over the horizontal `(x, y)` plane.
pub type Index2D<T> = SpatialIndex<2, T>;
/// Index over `(x, y, z)`.
pub type Index3D<T> = SpatialIndex<3, T>;

impl<const D: usize, T> SpatialIndex<D, T> {
    /// Creates an empty index with cells of side `elem_size`.
    pub fn new(elem_size: f64) -> Self {
        debug_assert!(elem_size > 0.0, "elem_size must be positive");
        Self {
            elem_size,
            inv_elem_size: 1.0 / elem_size,
            cells: FxHashMap::default(),
            len: 0,
        }
    }

    pub fn elem_size(&self) -> f64 {
        self.elem_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn cell_of(&self, key: [f64; D]) -> [i64; D] {
        std::array::from_fn(|k| (key[k] * self.inv_elem_size).floor() as i64)
    }

    /// Stores `payload` in the cell containing `key`.
    pub fn insert(&mut self, key: [f64; D], payload: T) {
        let cell = self.cell_of(key);
        self.cells.entry(cell).or_default().push(payload);
        self.len += 1;
    }

    /// Stores every `(key, payload)` pair.
    pub fn extend<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = ([f64; D], T)>,
    {
        for (key, payload) in items {
            self.insert(key, payload);
        }
    }

    /// Lazily yields every payload stored in a cell that overlaps the box of
    /// half-width `radius` around `query`.
    pub fn items_near(&self, query: [f64; D], radius: f64) -> impl Iterator<Item = &T> + '_ {
        let lo = self.cell_of(std::array::from_fn(|k| query[k] - radius));
        let hi = self.cell_of(std::array::from_fn(|k| query[k] + radius));
        CellBox::new(lo, hi)
            .filter_map(move |cell| self.cells.get(&cell))
            .flat_map(|bucket| bucket.iter())
    }
}

/// Odometer over all integer cells in `[lo, hi]` (inclusive, per axis).
struct CellBox<const D: usize> {
    lo: [i64; D],
    hi: [i64; D],
    next: Option<[i64; D]>,
}

impl<const D: usize> CellBox<D> {
    fn new(lo: [i64; D], hi: [i64; D]) -> Self {
        let empty = (0..D).any(|k| lo[k] > hi[k]);
        Self {
            lo,
            hi,
            next: if empty { None } else { Some(lo) },
        }
    }
}

impl<const D: usize> Iterator for CellBox<D> {
    type Item = [i64; D];

    fn next(&mut self) -> Option<[i64; D]> {
        let current = self.next?;
        let mut cell = current;
        self.next = None;
        for k in 0..D {
            if cell[k] < self.hi[k] {
                cell[k] += 1;
                self.next = Some(cell);
                break;
            }
            cell[k] = self.lo[k];
        }
        Some(current)
    }
}
