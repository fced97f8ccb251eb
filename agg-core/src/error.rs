use thiserror::Error;

/// Errors reported by aggregate operations.
///
/// Failing to find a merge site with `required == false` is *not* an error;
/// it is reported as `Ok(false)` by
/// [`crate::aggregate::Aggregate::add_particle`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggError {
    /// Projection axis outside `0..=2`.
    #[error("projection axis must be 0, 1 or 2 (got {0})")]
    InvalidAxis(usize),

    /// `pen_depth_by_mass_fraction` outside `(1, 100]`.
    #[error("pen_depth_by_mass_fraction={0} has to be in ]1, 100]")]
    MassFraction(f64),

    /// The operation needs at least one volume element.
    #[error("operation requires a non-empty point cloud")]
    EmptyCloud,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AggError>;
