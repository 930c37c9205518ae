//! Staged sensor and actuator evaluation for simulated 2D robots.
//!
//! Bodies carry local interactions (evaluated against nearby bodies and the walls)
//! and global interactions (evaluated once against the world). An [`Arena`] drives
//! them through `init`, the pairwise `object_step` pass, `walls_step`, `step`,
//! `finalize` and finally drive control and kinematic integration.

use slotmap::new_key_type;

pub mod arena;
pub mod body;
pub mod config;
pub mod drive;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod noise;
pub mod sensors;

new_key_type! {
    /// Stable handle for bodies backed by a generational slot map.
    pub struct BodyId;
}

pub use arena::{Arena, GroundField, StepReport, Surroundings, Tick};
pub use body::{Body, BodyState, Hull, Ports};
pub use config::{
    BumperRingConfig, CameraConfig, CompositeCameraConfig, DriveConfig, GroundSensorConfig,
    InfraredSensorConfig, LandmarkCameraConfig, MicrophoneConfig, RadioConfig, SimConfig,
    SoundSourceConfig,
};
pub use drive::{DifferentialDrive, OdometryModel};
pub use error::{SensorError, SensorResult};
pub use geometry::{Color, Pose, Texture, Vector, normalize_angle};
pub use interaction::{
    GlobalInteraction, InteractionHandle, LocalInteraction, Owner, Peer, StepContext, WallSide,
    WorldQuery,
};
pub use noise::{GaussianKernel, SensorRng, sigm};
