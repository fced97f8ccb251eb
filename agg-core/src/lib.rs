//! Core geometry library for building 3-D snow aggregates out of ice
//! crystal monomers and rime spheres.
//!
//! Main components:
//! - [`aggregate`] - the aggregate point cloud, projections and principal axes.
//! - [`merge`] - attaching one particle to an aggregate from below.
//! - [`builder`] - pairwise random build of one aggregate from a pool.
//! - [`rime`] - single-sphere rime deposition.
//! - [`compact`] - relaxation of freshly deposited rime.
//! - [`grid`] - snapping a cloud onto an integer lattice.
//! - [`index`] - bucketed neighbour lookup.
//! - [`generator`] and [`rotator`] - monomer sources and random orientations.
//! - [`history`] - merge-order record.
//! - [`config`], [`error`], [`types`] - parameters, errors and shared aliases.

pub mod aggregate;
pub mod builder;
pub mod compact;
pub mod config;
pub mod error;
pub mod generator;
pub mod grid;
pub mod history;
pub mod index;
pub mod merge;
pub mod rime;
pub mod rotator;
pub mod types;

pub use aggregate::Aggregate;
pub use error::{AggError, Result};
