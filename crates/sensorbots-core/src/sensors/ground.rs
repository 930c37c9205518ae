use crate::config::GroundSensorConfig;
use crate::error::SensorResult;
use crate::geometry::Vector;
use crate::interaction::{LocalInteraction, Owner, StepContext};
use crate::noise::{GaussianKernel, sigm};

/// Downward-facing sensor reading a spatially filtered patch of ground.
///
/// The whole reading is produced in `init`; the sensor has no range and never
/// interacts with other bodies.
#[derive(Debug, Clone)]
pub struct GroundSensor {
    config: GroundSensorConfig,
    kernel: GaussianKernel,
    absolute_position: Vector,
    value: f64,
}

impl GroundSensor {
    pub fn new(config: GroundSensorConfig) -> SensorResult<Self> {
        config.validate()?;
        let kernel = GaussianKernel::new(config.spatial_sd)?;
        Ok(Self {
            config,
            kernel,
            absolute_position: Vector::ZERO,
            value: 0.0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &GroundSensorConfig {
        &self.config
    }

    #[must_use]
    pub fn kernel(&self) -> &GaussianKernel {
        &self.kernel
    }

    /// Last reading, in response units.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// World position the last reading was taken at.
    #[must_use]
    pub fn absolute_position(&self) -> Vector {
        self.absolute_position
    }

    /// Noiseless response to a filtered grey level.
    #[must_use]
    pub fn response(&self, filtered: f64) -> f64 {
        let c = &self.config;
        sigm(filtered - c.c_factor, c.s_factor) * c.m_factor + c.a_factor
    }
}

impl LocalInteraction for GroundSensor {
    fn range(&self) -> f64 {
        0.0
    }

    fn init(&mut self, owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        self.absolute_position = owner.state.pose.to_world(self.config.offset);
        let world = ctx.world;
        let filtered = self
            .kernel
            .convolve(self.absolute_position, |p| world.ground_color(p).to_gray());
        self.value = ctx.rng.gaussian(self.response(filtered), self.config.noise_sd);
    }
}
