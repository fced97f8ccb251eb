//! Rotation policies applied to point clouds.
//!
//! All rotators produce a proper rotation matrix; [`Rotator::rotate`]
//! applies it to every point in place. The inverse of a rotation is its
//! transpose.

use std::f64::consts::PI;

use glam::{DMat3, DQuat, DVec3};
use rand::Rng;

/// Rotation from Euler angles: `Rz(alpha) * Rx(beta) * Rz(gamma)`.
pub fn rotation_matrix(alpha: f64, beta: f64, gamma: f64) -> DMat3 {
    DMat3::from_rotation_z(alpha) * DMat3::from_rotation_x(beta) * DMat3::from_rotation_z(gamma)
}

/// Box-Muller normal sample.
pub(crate) fn sample_gaussian(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    // 1 - u keeps the logarithm finite.
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + std_dev * z
}

pub trait Rotator {
    /// Draws (or returns) the rotation to apply.
    fn rotation(&self, rng: &mut impl Rng) -> DMat3;

    /// Rotates `points` in place about the origin.
    fn rotate(&self, points: &mut [DVec3], rng: &mut impl Rng) {
        let m = self.rotation(rng);
        for p in points.iter_mut() {
            *p = m * *p;
        }
    }
}

/// Fixed rotation given by Euler angles (radians).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EulerRotator {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl EulerRotator {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }
}

impl Rotator for EulerRotator {
    fn rotation(&self, _rng: &mut impl Rng) -> DMat3 {
        rotation_matrix(self.alpha, self.beta, self.gamma)
    }
}

/// Rotation drawn uniformly from SO(3).
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformRotator;

impl Rotator for UniformRotator {
    fn rotation(&self, rng: &mut impl Rng) -> DMat3 {
        // Shoemake's uniform random unit quaternion.
        let u1: f64 = rng.random();
        let u2: f64 = rng.random::<f64>() * 2.0 * PI;
        let u3: f64 = rng.random::<f64>() * 2.0 * PI;
        let a = (1.0 - u1).sqrt();
        let b = u1.sqrt();
        let q = DQuat::from_xyzw(a * u2.sin(), a * u2.cos(), b * u3.sin(), b * u3.cos());
        DMat3::from_quat(q.normalize())
    }
}

/// Keeps the z axis close to vertical: random azimuth and spin, with a
/// Gaussian tilt of standard deviation `sigma` (radians).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartialAligningRotator {
    pub sigma: f64,
}

impl PartialAligningRotator {
    pub fn from_degrees(sigma_deg: f64) -> Self {
        Self {
            sigma: sigma_deg.to_radians(),
        }
    }
}

impl Rotator for PartialAligningRotator {
    fn rotation(&self, rng: &mut impl Rng) -> DMat3 {
        let alpha = rng.random::<f64>() * 2.0 * PI;
        let beta = sample_gaussian(rng, 0.0, self.sigma);
        let gamma = rng.random::<f64>() * 2.0 * PI;
        rotation_matrix(alpha, beta, gamma)
    }
}

/// Random rotation about the vertical axis only.
#[derive(Clone, Copy, Debug, Default)]
pub struct HorizontalRotator;

impl Rotator for HorizontalRotator {
    fn rotation(&self, rng: &mut impl Rng) -> DMat3 {
        DMat3::from_rotation_z(rng.random::<f64>() * 2.0 * PI)
    }
}
