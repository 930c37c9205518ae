use crate::config::LandmarkCameraConfig;
use crate::error::{SensorError, SensorResult};
use crate::geometry::Vector;
use crate::interaction::{GlobalInteraction, Owner, StepContext};

/// Whether a ray along `direction` passes between two landmark corners.
///
/// The corner `right` must lie clockwise of the ray and `left` counter-clockwise,
/// which also rejects rays pointing away from the landmark.
#[must_use]
pub fn ray_hits_landmark(direction: Vector, to_right: Vector, to_left: Vector) -> bool {
    direction.cross(to_right) < 0.0 && direction.cross(to_left) > 0.0
}

/// Two-ray camera reporting, per ray, whether a landmark segment is in sight.
///
/// The port ray looks `half_angle` clockwise of the heading and the starboard
/// ray `half_angle` counter-clockwise. No noise is applied.
#[derive(Debug, Clone)]
pub struct BinaryLandmarkCamera {
    config: LandmarkCameraConfig,
    port: bool,
    starboard: bool,
}

impl BinaryLandmarkCamera {
    pub const RAY_COUNT: usize = 2;

    pub fn new(config: LandmarkCameraConfig) -> SensorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            port: false,
            starboard: false,
        })
    }

    #[must_use]
    pub fn port(&self) -> bool {
        self.port
    }

    #[must_use]
    pub fn starboard(&self) -> bool {
        self.starboard
    }

    /// Ray 0 is port, ray 1 is starboard.
    pub fn ray(&self, index: usize) -> SensorResult<bool> {
        match index {
            0 => Ok(self.port),
            1 => Ok(self.starboard),
            _ => Err(SensorError::RayOutOfRange {
                index,
                len: Self::RAY_COUNT,
            }),
        }
    }

    /// Landmark corners for a world of the given extent.
    #[must_use]
    pub fn landmark(&self, extent: Vector) -> [Vector; 2] {
        self.config
            .landmark
            .unwrap_or([extent, Vector::new(0.0, extent.y)])
    }
}

impl GlobalInteraction for BinaryLandmarkCamera {
    fn step(&mut self, owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        let [right, left] = self.landmark(ctx.world.extent());
        let pose = owner.state.pose;
        let to_right = right - pose.position;
        let to_left = left - pose.position;
        let port = Vector::from_angle(pose.heading - self.config.half_angle);
        let starboard = Vector::from_angle(pose.heading + self.config.half_angle);
        self.port = ray_hits_landmark(port, to_right, to_left);
        self.starboard = ray_hits_landmark(starboard, to_right, to_left);
    }
}
