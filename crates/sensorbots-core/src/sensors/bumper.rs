//! Virtual bumpers synthesised from a rotating distance sensor.

use crate::config::BumperRingConfig;
use crate::error::{SensorError, SensorResult};
use crate::interaction::{LocalInteraction, Owner, Peer, StepContext};
use crate::noise::SensorRng;
use crate::sensors::camera::CompositeCamera;

/// Three-regime proximity response to a distance measured from the body's edge.
///
/// Linear below 0.5, exponential decay up to 9, background noise `U(0, 20)` beyond;
/// the result is then scaled by `0.97 + U(0, 0.06)`.
pub fn bumper_response(distance: f64, rng: &mut SensorRng) -> f64 {
    let base = if distance < 0.5 {
        -440.0 * distance + 3000.0
    } else if distance <= 9.0 {
        4526.0 * (-0.9994 * distance).exp()
    } else {
        rng.uniform(20.0)
    };
    base * rng.jitter_factor(0.97, 0.06)
}

/// Physical sensor number of logical bumper `n` on a ring of `count` sensors.
#[must_use]
pub fn physical_index(n: usize, count: usize, offset: usize) -> usize {
    (count + offset - n) % count
}

/// Index into a buffer of `buffer_len` rays read by logical bumper `n`.
#[must_use]
pub fn bumper_ray_index(n: usize, count: usize, offset: usize, buffer_len: usize) -> usize {
    physical_index(n, count, offset) * buffer_len / count
}

/// Ring of virtual bumpers read from a full-circle distance camera.
///
/// Readings are produced at `finalize`, in logical order, from the tick's random source.
#[derive(Debug, Clone)]
pub struct RotatingDistanceRing {
    config: BumperRingConfig,
    camera: CompositeCamera,
    bumpers: Vec<f64>,
}

impl RotatingDistanceRing {
    pub fn new(config: BumperRingConfig) -> SensorResult<Self> {
        config.validate()?;
        let camera = CompositeCamera::new(config.camera.clone())?;
        let bumpers = vec![0.0; config.sensor_count];
        Ok(Self {
            config,
            camera,
            bumpers,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BumperRingConfig {
        &self.config
    }

    #[must_use]
    pub fn camera(&self) -> &CompositeCamera {
        &self.camera
    }

    pub fn set_range(&mut self, range: f64) -> SensorResult<()> {
        self.camera.set_range(range)?;
        self.config.camera.range = range;
        Ok(())
    }

    /// Camera ray read by logical bumper `n`.
    pub fn ray_index(&self, n: usize) -> SensorResult<usize> {
        let count = self.config.sensor_count;
        if n >= count {
            return Err(SensorError::RayOutOfRange { index: n, len: count });
        }
        Ok(bumper_ray_index(
            n,
            count,
            self.config.calibration_offset,
            self.camera.pixel_count(),
        ))
    }

    pub fn virtual_bumper(&self, n: usize) -> SensorResult<f64> {
        self.bumpers
            .get(n)
            .copied()
            .ok_or(SensorError::RayOutOfRange {
                index: n,
                len: self.bumpers.len(),
            })
    }

    #[must_use]
    pub fn virtual_bumpers(&self) -> &[f64] {
        &self.bumpers
    }
}

impl LocalInteraction for RotatingDistanceRing {
    fn range(&self) -> f64 {
        self.camera.config().range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        self.camera.begin(&owner.state.pose);
    }

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
        self.camera.draw_body(peer.state);
    }

    fn walls_step(&mut self, _owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        self.camera.draw_walls(ctx.world);
    }

    fn finalize(&mut self, owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        self.camera.end();
        let count = self.config.sensor_count;
        let offset = self.config.calibration_offset;
        let depth = self.camera.depth_buffer();
        for (n, bumper) in self.bumpers.iter_mut().enumerate() {
            let ray = bumper_ray_index(n, count, offset, depth.len());
            let distance = depth[ray].sqrt() - owner.state.radius;
            *bumper = bumper_response(distance, ctx.rng);
        }
    }
}
