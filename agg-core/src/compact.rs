//! Force relaxation that nudges a freshly placed rime sphere toward a
//! tighter contact with its neighbours.
//!
//! This is a smoothing heuristic, not a constraint solver: the relaxed
//! point is not guaranteed to be free of overlaps.

use glam::DVec3;

use crate::config::CompactConfig;

/// Normalized squared distance below which a neighbour is ignored.
const SINGULAR_R2: f64 = 0.01;

/// Sums the pairwise forces acting on `x` from its neighbours.
///
/// For each neighbour `q`, with `d = q - x` and `rn = |d|² / grid_res²`,
/// the contribution is `d / (|d| · rn)`:
///
/// - added (pull toward `q`) when `rn > 1`, i.e. the spheres do not touch,
/// - subtracted (push away from `q`) when the spheres overlap,
/// - ignored when `rn < 0.01`, to stay clear of the singularity.
///
/// A neighbour at exactly the contact distance is repulsive with unit
/// magnitude, so a symmetric shell of touching neighbours cancels out.
///
/// ### Parameters
/// - `x` - Position being relaxed.
/// - `near` - Neighbouring element centers.
/// - `grid_res` - Element diameter.
///
/// ### Returns
/// The (unscaled) net force.
pub fn net_force(x: DVec3, near: &[DVec3], grid_res: f64) -> DVec3 {
    let contact_sqr = grid_res * grid_res;
    let mut force = DVec3::ZERO;
    for q in near {
        let d = *q - x;
        let r_sqr = d.length_squared();
        let rn = r_sqr / contact_sqr;
        if rn < SINGULAR_R2 {
            continue;
        }
        let fi = d / (r_sqr.sqrt() * rn);
        if rn > 1.0 {
            force += fi;
        } else {
            force -= fi;
        }
    }
    force
}

/// Relaxes `x` against its neighbours `near`.
///
/// Each iteration moves the point by the net force of [`net_force`],
/// scaled by `cfg.dr` and clamped to a step of at most `cfg.dr · grid_res`.
/// Iteration stops after `cfg.max_iters` steps, when a step moves less than
/// `cfg.min_move · grid_res`, or when the total displacement would exceed
/// `max_dist · grid_res`; in the latter case the point is placed on the
/// boundary of that budget.
///
/// ### Parameters
/// - `x` - Starting position.
/// - `near` - Neighbouring element centers (typically within `2 · grid_res`).
/// - `grid_res` - Element diameter.
/// - `max_dist` - Displacement budget in units of `grid_res`; a value
///   `<= 0` returns `x` unchanged.
/// - `cfg` - Step size, stopping threshold and iteration cap.
///
/// ### Returns
/// The relaxed position.
pub fn compact_rime(
    x: DVec3,
    near: &[DVec3],
    grid_res: f64,
    max_dist: f64,
    cfg: &CompactConfig,
) -> DVec3 {
    if max_dist <= 0.0 {
        return x;
    }

    let start = x;
    let budget = max_dist * grid_res;
    let min_move_sqr = (cfg.min_move * grid_res).powi(2);
    let mut x = x;

    for _ in 0..cfg.max_iters {
        let mut step = net_force(x, near, grid_res) * cfg.dr;
        let step_sqr = step.length_squared();
        if step_sqr > cfg.dr * cfg.dr {
            step *= cfg.dr / step_sqr.sqrt();
        }
        step *= grid_res;

        let last = x;
        x += step;

        let dist_sqr = x.distance_squared(start);
        if dist_sqr > budget * budget {
            x = start + (x - start) * (budget / dist_sqr.sqrt());
            break;
        }
        if x.distance_squared(last) < min_move_sqr {
            break;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn shell(radius: f64) -> Vec<DVec3> {
        [DVec3::X, DVec3::NEG_X, DVec3::Y, DVec3::NEG_Y, DVec3::Z, DVec3::NEG_Z]
            .iter()
            .map(|d| *d * radius)
            .collect()
    }

    #[test]
    fn symmetric_shell_at_contact_is_balanced() {
        let grid_res = 0.02e-3;
        let near = shell(grid_res);
        let f = net_force(DVec3::ZERO, &near, grid_res);
        assert_abs_diff_eq!(f.length(), 0.0, epsilon = 1e-9);

        let cfg = CompactConfig::default();
        let x = compact_rime(DVec3::ZERO, &near, grid_res, 1.0, &cfg);
        assert!(x.length() < cfg.min_move * grid_res);
    }

    #[test]
    fn zero_budget_returns_input() {
        let near = [DVec3::new(3.0, 0.0, 0.0)];
        let x = DVec3::new(0.5, 0.5, 0.5);
        assert_eq!(compact_rime(x, &near, 1.0, 0.0, &CompactConfig::default()), x);
    }

    #[test]
    fn distant_neighbour_attracts() {
        let near = [DVec3::new(1.5, 0.0, 0.0)];
        let f = net_force(DVec3::ZERO, &near, 1.0);
        assert!(f.x > 0.0);
        let x = compact_rime(DVec3::ZERO, &near, 1.0, 1.0, &CompactConfig::default());
        assert!(x.x > 0.0);
    }

    #[test]
    fn overlapping_neighbour_repels() {
        let near = [DVec3::new(0.5, 0.0, 0.0)];
        assert!(net_force(DVec3::ZERO, &near, 1.0).x < 0.0);
    }

    #[test]
    fn coincident_neighbour_is_ignored() {
        let near = [DVec3::new(0.01, 0.0, 0.0)];
        assert_eq!(net_force(DVec3::ZERO, &near, 1.0), DVec3::ZERO);
    }

    #[test]
    fn displacement_is_clamped_to_budget() {
        let near = [DVec3::new(1.9, 0.0, 0.0)];
        let cfg = CompactConfig {
            min_move: 0.0,
            dr: 0.5,
            max_iters: 1000,
        };
        let x = compact_rime(DVec3::ZERO, &near, 1.0, 0.3, &cfg);
        assert!(x.length() <= 0.3 + 1e-12);
    }
}
