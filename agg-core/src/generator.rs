//! Monomer generators: produce fresh point clouds of single ice crystals.
//!
//! Crystal geometry is deliberately simple. A crystal is a solid shape
//! sampled on a cubic lattice of spacing `grid_res`, then rotated.

use glam::DVec3;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{AggError, Result};
use crate::rotator::{Rotator, UniformRotator};

/// Source of monomer point clouds.
pub trait MonomerGenerator: std::fmt::Debug {
    /// Element spacing of the generated clouds.
    fn grid_res(&self) -> f64;

    /// Human-readable crystal type.
    fn crystal(&self) -> &str;

    /// Produces a fresh cloud, centered near the origin.
    fn generate(&self, rng: &mut dyn RngCore) -> Vec<DVec3>;
}

/// Solid crystal shapes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrystalShape {
    /// Hexagonal prism with vertical axis; `aspect` is height / diameter.
    /// Small aspect gives a plate, large aspect a column.
    HexPrism { aspect: f64 },
    /// Oblate or prolate spheroid; `aspect` is polar / equatorial radius.
    Spheroid { aspect: f64 },
}

impl CrystalShape {
    pub fn plate() -> Self {
        CrystalShape::HexPrism { aspect: 0.1 }
    }

    pub fn column() -> Self {
        CrystalShape::HexPrism { aspect: 2.0 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CrystalShape::HexPrism { aspect } if *aspect < 1.0 => "plate",
            CrystalShape::HexPrism { .. } => "column",
            CrystalShape::Spheroid { .. } => "spheroid",
        }
    }

    /// Whether `p` lies inside the shape of maximum dimension `d`.
    fn contains(&self, p: DVec3, d: f64) -> bool {
        match *self {
            CrystalShape::HexPrism { aspect } => {
                let r = 0.5 * d;
                let half_h = 0.5 * d * aspect;
                let s3 = 3f64.sqrt();
                p.z.abs() <= half_h
                    && p.y.abs() <= 0.5 * s3 * r
                    && s3 * p.x.abs() + p.y.abs() <= s3 * r
            }
            CrystalShape::Spheroid { aspect } => {
                let a = 0.5 * d;
                let c = a * aspect;
                (p.x * p.x + p.y * p.y) / (a * a) + (p.z * p.z) / (c * c) <= 1.0
            }
        }
    }

    /// Half-widths of the shape's bounding box.
    fn half_extent(&self, d: f64) -> DVec3 {
        match *self {
            CrystalShape::HexPrism { aspect } => DVec3::new(0.5 * d, 0.5 * d, 0.5 * d * aspect),
            CrystalShape::Spheroid { aspect } => DVec3::new(0.5 * d, 0.5 * d, 0.5 * d * aspect),
        }
    }

    /// Samples the shape on a lattice of spacing `grid_res`.
    ///
    /// Always returns at least one element.
    pub fn sample(&self, d: f64, grid_res: f64) -> Vec<DVec3> {
        let half = self.half_extent(d);
        let n = (half / grid_res).ceil();
        let (nx, ny, nz) = (n.x as i64, n.y as i64, n.z as i64);
        let mut points = Vec::new();
        for i in -nx..=nx {
            for j in -ny..=ny {
                for k in -nz..=nz {
                    let p = DVec3::new(i as f64, j as f64, k as f64) * grid_res;
                    if self.contains(p, d) {
                        points.push(p);
                    }
                }
            }
        }
        if points.is_empty() {
            points.push(DVec3::ZERO);
        }
        points
    }
}

/// Size distribution of monomer maximum dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeDistribution {
    Monodisperse { size: f64 },
    /// Exponential with mean `scale`, truncated to `[min_size, max_size]` by
    /// rejection.
    Exponential {
        scale: f64,
        min_size: f64,
        max_size: f64,
    },
}

impl SizeDistribution {
    pub fn validate(&self) -> Result<()> {
        match *self {
            SizeDistribution::Monodisperse { size } if size > 0.0 => Ok(()),
            SizeDistribution::Monodisperse { size } => Err(AggError::Config(format!(
                "monomer size must be positive (got {size})"
            ))),
            SizeDistribution::Exponential {
                scale,
                min_size,
                max_size,
            } => {
                if scale > 0.0 && min_size >= 0.0 && max_size > min_size {
                    Ok(())
                } else {
                    Err(AggError::Config(format!(
                        "bad exponential size distribution: scale={scale}, range=[{min_size}, {max_size}]"
                    )))
                }
            }
        }
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        match *self {
            SizeDistribution::Monodisperse { size } => size,
            SizeDistribution::Exponential {
                scale,
                min_size,
                max_size,
            } => loop {
                let u: f64 = rng.random();
                let d = -scale * (1.0 - u).ln();
                if (min_size..=max_size).contains(&d) {
                    break d;
                }
            },
        }
    }
}

/// Lattice-sampled crystal generator, uniformly rotated on every call.
#[derive(Clone, Debug)]
pub struct CrystalGenerator {
    shape: CrystalShape,
    sizes: SizeDistribution,
    grid_res: f64,
}

impl CrystalGenerator {
    pub fn new(shape: CrystalShape, sizes: SizeDistribution, grid_res: f64) -> Result<Self> {
        if grid_res <= 0.0 {
            return Err(AggError::Config(format!(
                "grid_res must be positive (got {grid_res})"
            )));
        }
        sizes.validate()?;
        Ok(Self {
            shape,
            sizes,
            grid_res,
        })
    }

    pub fn monodisperse(shape: CrystalShape, size: f64, grid_res: f64) -> Result<Self> {
        Self::new(shape, SizeDistribution::Monodisperse { size }, grid_res)
    }

    pub fn shape(&self) -> CrystalShape {
        self.shape
    }
}

impl MonomerGenerator for CrystalGenerator {
    fn grid_res(&self) -> f64 {
        self.grid_res
    }

    fn crystal(&self) -> &str {
        self.shape.name()
    }

    fn generate(&self, mut rng: &mut dyn RngCore) -> Vec<DVec3> {
        let d = self.sizes.sample(rng);
        let mut points = self.shape.sample(d, self.grid_res);
        UniformRotator.rotate(&mut points, &mut rng);
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn plate_is_flat_and_sized() {
        let grid_res = 1.0;
        let pts = CrystalShape::plate().sample(20.0, grid_res);
        assert!(pts.len() > 100);
        assert!(pts.iter().all(|p| p.z.abs() <= 1.0));
        assert!(pts.iter().all(|p| p.x.abs() <= 10.0 && p.y.abs() <= 10.0));
    }

    #[test]
    fn tiny_crystal_has_one_element() {
        let pts = CrystalShape::Spheroid { aspect: 0.6 }.sample(0.1, 1.0);
        assert_eq!(pts, vec![DVec3::ZERO]);
    }

    #[test]
    fn truncated_exponential_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let psd = SizeDistribution::Exponential {
            scale: 1.0,
            min_size: 0.5,
            max_size: 2.0,
        };
        for _ in 0..200 {
            let d = psd.sample(&mut rng);
            assert!((0.5..=2.0).contains(&d));
        }
    }

    #[test]
    fn generator_rejects_bad_parameters() {
        assert!(CrystalGenerator::monodisperse(CrystalShape::plate(), 1.0, 0.0).is_err());
        assert!(CrystalGenerator::monodisperse(CrystalShape::plate(), -1.0, 0.1).is_err());
    }

    #[test]
    fn generated_cloud_keeps_element_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let g = CrystalGenerator::monodisperse(CrystalShape::column(), 6.0, 1.0).unwrap();
        let n = CrystalShape::column().sample(6.0, 1.0).len();
        assert_eq!(g.generate(&mut rng).len(), n);
        assert_eq!(g.crystal(), "column");
    }
}
