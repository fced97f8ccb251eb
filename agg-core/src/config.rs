use serde::{Deserialize, Serialize};

use crate::error::{AggError, Result};
use crate::generator::{CrystalGenerator, CrystalShape, SizeDistribution};

/// How collision candidates are reduced before the pairwise contact search.
///
/// `Binned` is a performance heuristic: it changes which contact point is
/// found, not just how quickly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CollisionStrategy {
    /// Every candidate pair is tested.
    Exact,
    /// Only the lowest aggregate element and the highest incoming element per
    /// horizontal bin of side `grid_res * factor` take part.
    Binned { factor: f64 },
}

impl Default for CollisionStrategy {
    fn default() -> Self {
        CollisionStrategy::Binned {
            factor: std::f64::consts::FRAC_1_SQRT_2,
        }
    }
}

/// Parameters for [`crate::aggregate::Aggregate::add_particle`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Distance the incoming particle may penetrate into the aggregate.
    pub pen_depth: f64,
    /// Inner percentile (in `]1, 100]`) of distance from the centroid that is
    /// always considered for intersection.
    pub pen_depth_by_mass_fraction: f64,
    pub strategy: CollisionStrategy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            pen_depth: 0.0,
            pen_depth_by_mass_fraction: 100.0,
            strategy: CollisionStrategy::default(),
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<()> {
        let mf = self.pen_depth_by_mass_fraction;
        if !(mf > 1.0 && mf <= 100.0) {
            return Err(AggError::MassFraction(mf));
        }
        if self.pen_depth < 0.0 {
            return Err(AggError::Config(format!(
                "pen_depth must be non-negative (got {})",
                self.pen_depth
            )));
        }
        if let CollisionStrategy::Binned { factor } = self.strategy
            && factor <= 0.0
        {
            return Err(AggError::Config(format!(
                "binned collision factor must be positive (got {factor})"
            )));
        }
        Ok(())
    }
}

/// Parameters for [`crate::builder::generate_aggregate`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Align the survivor to its principal axes after every merge.
    pub align: bool,
    pub pen_depth: f64,
    pub strategy: CollisionStrategy,
    /// Standard deviation (degrees) of the tilt applied after alignment.
    pub tilt_sigma_deg: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            align: true,
            pen_depth: 80e-6,
            strategy: CollisionStrategy::default(),
            tilt_sigma_deg: 40.0,
        }
    }
}

impl BuilderConfig {
    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            pen_depth: self.pen_depth,
            pen_depth_by_mass_fraction: 100.0,
            strategy: self.strategy,
        }
    }
}

/// Parameters for the rime compaction relaxation.
///
/// Distances are in units of `grid_res`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactConfig {
    /// Stop once a step moves the point less than this.
    pub min_move: f64,
    /// Maximum step length.
    pub dr: f64,
    pub max_iters: usize,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            min_move: 0.01,
            dr: 0.1,
            max_iters: 100,
        }
    }
}

/// Parameters for [`crate::aggregate::Aggregate::add_rime_particles`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RimeConfig {
    /// Height above the lowest element under the entry point within which
    /// supporting elements are tried.
    pub pen_depth: f64,
    /// Displacement budget of the compaction step, in `grid_res`.
    /// Zero disables compaction.
    pub compact_dist: f64,
    pub compact: CompactConfig,
}

impl Default for RimeConfig {
    fn default() -> Self {
        Self {
            pen_depth: 120e-6,
            compact_dist: 0.0,
            compact: CompactConfig::default(),
        }
    }
}

/// Monomer source parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonomerConfig {
    pub shape: CrystalShape,
    pub sizes: SizeDistribution,
    pub grid_res: f64,
}

impl Default for MonomerConfig {
    fn default() -> Self {
        Self {
            shape: CrystalShape::plate(),
            sizes: SizeDistribution::Monodisperse { size: 1e-3 },
            grid_res: 40e-6,
        }
    }
}

impl MonomerConfig {
    pub fn generator(&self) -> Result<CrystalGenerator> {
        CrystalGenerator::new(self.shape, self.sizes, self.grid_res)
    }
}
