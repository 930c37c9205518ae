//! Differential-drive kinematics, wheel encoders and odometry.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::body::BodyState;
use crate::config::DriveConfig;
use crate::error::SensorResult;
use crate::geometry::{Pose, Vector, normalize_angle};
use crate::noise::SensorRng;

/// How wheel encoders are derived each control step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OdometryModel {
    /// Encoders report the noisy, clamped wheel speeds that were commanded.
    #[default]
    CommandedSpeed,
    /// Encoders are solved from the pose change since the previous control step.
    MeasuredDisplacement,
}

/// Two-wheeled actuator that sets its owner's velocity from wheel speed commands.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialDrive {
    config: DriveConfig,
    left_speed: f64,
    right_speed: f64,
    left_encoder: f64,
    right_encoder: f64,
    left_odometry: f64,
    right_odometry: f64,
    forward_speed: f64,
    angular_speed: f64,
    anchor: Pose,
}

impl DifferentialDrive {
    pub fn new(config: DriveConfig) -> SensorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            left_speed: 0.0,
            right_speed: 0.0,
            left_encoder: 0.0,
            right_encoder: 0.0,
            left_odometry: 0.0,
            right_odometry: 0.0,
            forward_speed: 0.0,
            angular_speed: 0.0,
            anchor: Pose::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Command both wheel speeds, in world units per second.
    pub fn set_speeds(&mut self, left: f64, right: f64) {
        self.left_speed = left;
        self.right_speed = right;
    }

    #[must_use]
    pub fn speeds(&self) -> (f64, f64) {
        (self.left_speed, self.right_speed)
    }

    #[must_use]
    pub fn left_encoder(&self) -> f64 {
        self.left_encoder
    }

    #[must_use]
    pub fn right_encoder(&self) -> f64 {
        self.right_encoder
    }

    #[must_use]
    pub fn left_odometry(&self) -> f64 {
        self.left_odometry
    }

    #[must_use]
    pub fn right_odometry(&self) -> f64 {
        self.right_odometry
    }

    /// Linear speed produced by the last control step.
    #[must_use]
    pub fn forward_speed(&self) -> f64 {
        self.forward_speed
    }

    /// Angular speed produced by the last control step.
    #[must_use]
    pub fn angular_speed(&self) -> f64 {
        self.angular_speed
    }

    /// Zero encoders and odometry and re-anchor the displacement baseline at `pose`.
    ///
    /// Must follow any external move of the owner.
    pub fn reset_encoders(&mut self, pose: Pose) {
        self.left_encoder = 0.0;
        self.right_encoder = 0.0;
        self.left_odometry = 0.0;
        self.right_odometry = 0.0;
        self.anchor = pose;
    }

    /// Commanded speed scaled by `1 ± noise_amount`, then clamped to `±max_speed`.
    fn actual_speed(&self, commanded: f64, rng: &mut SensorRng) -> f64 {
        let noise = self.config.noise_amount;
        let noisy = commanded * rng.jitter_factor(1.0 - noise, 2.0 * noise);
        noisy.clamp(-self.config.max_speed, self.config.max_speed)
    }

    /// Apply wheel commands to `state` and update encoders and odometry.
    pub fn control_step(&mut self, state: &mut BodyState, dt: f64, rng: &mut SensorRng) {
        let left = self.actual_speed(self.left_speed, rng);
        let right = self.actual_speed(self.right_speed, rng);

        self.forward_speed = (left + right) * 0.5;
        self.angular_speed = (right - left) / self.config.distance_between_wheels;
        let half_step_heading = state.pose.heading + self.angular_speed * dt * 0.5;
        state.velocity = Vector::from_angle(half_step_heading) * self.forward_speed;
        state.angular_speed = self.angular_speed;

        let (left_encoder, right_encoder) = match self.config.odometry {
            OdometryModel::CommandedSpeed => (left, right),
            OdometryModel::MeasuredDisplacement => self.measured_encoders(state.pose, dt),
        };
        self.left_encoder = left_encoder;
        self.right_encoder = right_encoder;
        self.left_odometry += left_encoder * dt;
        self.right_odometry += right_encoder * dt;
        self.anchor = state.pose;
    }

    /// Per-wheel speeds that explain the move from the anchor to `pose`.
    fn measured_encoders(&self, pose: Pose, dt: f64) -> (f64, f64) {
        if dt <= 0.0 {
            return (0.0, 0.0);
        }
        let displacement = pose.position - self.anchor.position;
        let mut mean_heading = (pose.heading + self.anchor.heading) * 0.5;
        if (pose.heading - self.anchor.heading).abs() > PI {
            mean_heading += PI;
        }
        // Only the component along the body axis counts; the rest is sideways slip.
        let forward = if displacement.norm2() > 0.0 {
            displacement.norm() * (mean_heading - displacement.angle()).cos()
        } else {
            0.0
        };
        let turn = normalize_angle(pose.heading - self.anchor.heading);
        let half_track = self.config.distance_between_wheels * turn * 0.5;
        ((forward - half_track) / dt, (forward + half_track) / dt)
    }
}
