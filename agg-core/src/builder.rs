//! Pairwise random build of one aggregate from a pool of smaller ones.
//!
//! The pool shrinks by one per accepted merge:
//! 1. [`pair_weights`] scores every pair by how likely the two are to
//!    collide (a cross-section times a fall-speed difference proxy).
//! 2. A pair is drawn uniformly and accepted with its weight.
//! 3. The aggregate with the larger mass/radius ratio survives and the other
//!    is merged into it with [`Aggregate::merge_aggregate`].
//! 4. The survivor is re-oriented before the next round.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::aggregate::Aggregate;
use crate::config::BuilderConfig;
use crate::error::{AggError, Result};
use crate::generator::MonomerGenerator;
use crate::rotator::{HorizontalRotator, PartialAligningRotator, UniformRotator};
use crate::types::ElemId;

/// Collision weights for the current pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PairWeights {
    /// Mass/radius ratio per aggregate.
    pub mass_radius: Vec<f64>,
    /// Row-major `n × n` acceptance probabilities; the diagonal is zero.
    pub weights: Vec<f64>,
}

impl PairWeights {
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.weights[i * self.mass_radius.len() + j]
    }
}

/// Computes the pair weights for `aggs`.
///
/// For each aggregate `r = (xspan + yspan) / 4` and `m_r = sqrt(n / r)`;
/// the weight of `(i, j)` is `(r_i + r_j)² · |m_r_i − m_r_j|`, normalized
/// by the largest weight. When that maximum is zero or not finite every
/// distinct pair gets weight 1.
///
/// ### Parameters
/// - `aggs` - The current pool.
///
/// ### Returns
/// The per-aggregate ratios and the normalized weight matrix.
pub fn pair_weights(aggs: &[Aggregate]) -> PairWeights {
    let n = aggs.len();
    let (radius, mass_radius): (Vec<f64>, Vec<f64>) = aggs
        .iter()
        .map(|a| {
            let [[x0, x1], [y0, y1], _] = a.extent();
            let r = 0.25 * ((x1 - x0) + (y1 - y0));
            (r, (a.len() as f64 / r).sqrt())
        })
        .unzip();

    let mut weights = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                weights[i * n + j] =
                    (radius[i] + radius[j]).powi(2) * (mass_radius[i] - mass_radius[j]).abs();
            }
        }
    }

    let max = weights.iter().copied().fold(0.0, f64::max);
    if max > 0.0 && max.is_finite() {
        for w in &mut weights {
            *w = if w.is_finite() { *w / max } else { 0.0 };
        }
    } else {
        if n > 1 {
            warn!(max, "degenerate collision weights, using uniform pairs");
        }
        for i in 0..n {
            for j in 0..n {
                weights[i * n + j] = if i == j { 0.0 } else { 1.0 };
            }
        }
    }

    PairWeights {
        mass_radius,
        weights,
    }
}

/// Draws an accepted pair `(i, j)`, `i != j`, from a pool of `n >= 2`.
fn draw_pair(w: &PairWeights, rng: &mut impl Rng) -> (usize, usize) {
    let n = w.mass_radius.len();
    loop {
        let i = rng.random_range(0..n);
        let mut j = rng.random_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        if rng.random::<f64>() < w.get(i, j) {
            return (i, j);
        }
    }
}

/// Creates `n` single-monomer aggregates from `generator`, identified
/// `0..n`.
pub fn monomer_pool(
    generator: Arc<dyn MonomerGenerator>,
    n: usize,
    rng: &mut impl Rng,
) -> Vec<Aggregate> {
    (0..n)
        .map(|i| Aggregate::new(Arc::clone(&generator), &mut *rng, i as ElemId))
        .collect()
}

/// Re-orients `agg` after a merge: principal-axis alignment followed by a
/// random tilt, or a uniform rotation when `cfg.align` is off.
fn reorient(agg: &mut Aggregate, cfg: &BuilderConfig, rng: &mut impl Rng) {
    if cfg.align {
        agg.align();
        agg.rotate(&PartialAligningRotator::from_degrees(cfg.tilt_sigma_deg), rng);
    } else {
        agg.rotate(&UniformRotator, rng);
    }
}

/// Builds a single aggregate out of `aggs`.
///
/// Pairs are merged until one aggregate remains. That aggregate is then
/// aligned and tilted (when `cfg.align` is set) and finally spun about the
/// vertical axis.
///
/// ### Parameters
/// - `aggs` - The starting pool; consumed.
/// - `cfg` - Merge penetration, collision strategy and orientation policy.
/// - `rng` - Random source for pair selection, merge sites and rotations.
///
/// ### Returns
/// The final aggregate, or [`AggError::EmptyCloud`] for an empty pool.
pub fn generate_aggregate(
    mut aggs: Vec<Aggregate>,
    cfg: &BuilderConfig,
    rng: &mut impl Rng,
) -> Result<Aggregate> {
    if aggs.is_empty() {
        return Err(AggError::EmptyCloud);
    }
    let merge_cfg = cfg.merge_config();
    merge_cfg.validate()?;
    info!(pool = aggs.len(), "building aggregate");

    while aggs.len() > 1 {
        let weights = pair_weights(&aggs);
        let (i, j) = draw_pair(&weights, rng);
        let (mut survivor, loser) = if weights.mass_radius[i] >= weights.mass_radius[j] {
            (i, j)
        } else {
            (j, i)
        };

        let consumed = aggs.remove(loser);
        if survivor > loser {
            survivor -= 1;
        }
        debug!(
            survivor,
            consumed_monomers = consumed.monomer_number(),
            remaining = aggs.len(),
            "merging pair"
        );

        let agg = &mut aggs[survivor];
        agg.merge_aggregate(consumed, &merge_cfg, rng)?;
        reorient(agg, cfg, rng);
    }

    let Some(mut agg) = aggs.pop() else {
        return Err(AggError::EmptyCloud);
    };
    if cfg.align {
        agg.align();
        agg.rotate(&PartialAligningRotator::from_degrees(cfg.tilt_sigma_deg), rng);
    }
    agg.rotate(&HorizontalRotator, rng);

    info!(
        monomers = agg.monomer_number(),
        elements = agg.len(),
        "aggregate built"
    );
    Ok(agg)
}
