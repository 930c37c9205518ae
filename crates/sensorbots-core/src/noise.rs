//! Noise injection and response-shaping primitives shared by every sensor.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::StandardNormal;

use crate::error::{SensorResult, ensure_finite, ensure_positive};
use crate::geometry::Vector;

/// Samples per side of the spatial filter.
pub const KERNEL_SIDE: usize = 9;
/// Distance between two neighbouring filter samples, in world units (cm).
pub const KERNEL_STEP: f64 = 0.25;

const KERNEL_HALF: usize = KERNEL_SIDE / 2;

/// Logistic response `1 / (1 + e^(-x·s))`.
#[must_use]
pub fn sigm(x: f64, s: f64) -> f64 {
    1.0 / (1.0 + (-x * s).exp())
}

/// The single pseudo-random source threaded through a tick.
///
/// Every draw advances the same stream, so two runs with the same seed and
/// the same evaluation order reproduce identical readings.
#[derive(Debug, Clone)]
pub struct SensorRng {
    inner: SmallRng,
}

impl SensorRng {
    #[must_use]
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Use `seed` when present, otherwise pick one from the thread RNG.
    #[must_use]
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                Self::seed_from_u64(seed)
            }
        }
    }

    /// Uniform value in `[0, range)`. Always consumes one draw.
    pub fn uniform(&mut self, range: f64) -> f64 {
        self.inner.random::<f64>() * range
    }

    /// Gaussian value centred on `mean`.
    ///
    /// A zero standard deviation returns `mean` exactly and leaves the stream untouched.
    pub fn gaussian(&mut self, mean: f64, sd: f64) -> f64 {
        if sd == 0.0 {
            return mean;
        }
        let z: f64 = self.inner.sample(StandardNormal);
        mean + sd * z
    }

    /// Multiplicative factor `base + U(0, amount)`.
    pub fn jitter_factor(&mut self, base: f64, amount: f64) -> f64 {
        base + self.uniform(amount)
    }
}

/// Normalised 9×9 Gaussian footprint used to low-pass a sampled field.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: [[f64; KERNEL_SIDE]; KERNEL_SIDE],
}

impl GaussianKernel {
    /// Precompute weights `exp(-(x²+y²)/(2σ²))` and scale them to unit mass.
    pub fn new(spatial_sd: f64) -> SensorResult<Self> {
        ensure_positive(spatial_sd, "spatial standard deviation must be positive")?;
        ensure_finite(spatial_sd, "spatial standard deviation must be finite")?;
        let var = spatial_sd * spatial_sd;
        let mut weights = [[0.0; KERNEL_SIDE]; KERNEL_SIDE];
        let mut sum = 0.0;
        for (i, row) in weights.iter_mut().enumerate() {
            for (j, weight) in row.iter_mut().enumerate() {
                let offset = Self::offset(i, j);
                *weight = (-offset.norm2() / (2.0 * var)).exp();
                sum += *weight;
            }
        }
        for weight in weights.iter_mut().flatten() {
            *weight /= sum;
        }
        Ok(Self { weights })
    }

    /// Sample offset of cell `(i, j)` relative to the kernel centre.
    #[must_use]
    pub fn offset(i: usize, j: usize) -> Vector {
        Vector::new(
            (i as f64 - KERNEL_HALF as f64) * KERNEL_STEP,
            (j as f64 - KERNEL_HALF as f64) * KERNEL_STEP,
        )
    }

    #[must_use]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights[i][j]
    }

    /// Total kernel mass; 1 up to rounding.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }

    /// Weighted sum of `sample` evaluated at every offset around `center`.
    pub fn convolve(&self, center: Vector, mut sample: impl FnMut(Vector) -> f64) -> f64 {
        let mut acc = 0.0;
        for (i, row) in self.weights.iter().enumerate() {
            for (j, weight) in row.iter().enumerate() {
                acc += weight * sample(center + Self::offset(i, j));
            }
        }
        acc
    }
}
