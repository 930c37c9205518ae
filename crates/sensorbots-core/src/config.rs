//! Serializable configuration for the arena and for every sensor and actuator.
//!
//! Each struct carries the defaults of the reference robots and a `validate` method
//! that rejects unusable values once, at construction time.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

use crate::drive::OdometryModel;
use crate::error::{
    SensorError, SensorResult, ensure_finite, ensure_non_negative, ensure_positive,
};
use crate::geometry::{Color, Vector};
use crate::sensors::acoustic::RealisticWrite;

fn ensure_vector(v: Vector, message: &'static str) -> SensorResult<()> {
    ensure_finite(v.x, message)?;
    ensure_finite(v.y, message)
}

fn ensure_color(c: Color, message: &'static str) -> SensorResult<()> {
    ensure_non_negative(c.r, message)?;
    ensure_non_negative(c.g, message)?;
    ensure_non_negative(c.b, message)
}

/// Downward-facing ground sensor parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroundSensorConfig {
    /// Mounting point relative to the body centre, in body coordinates.
    pub offset: Vector,
    /// Centre of the sigmoid, in grey-level units.
    pub c_factor: f64,
    /// Slope of the sigmoid.
    pub s_factor: f64,
    /// Output scale applied after the sigmoid.
    pub m_factor: f64,
    /// Output bias applied after scaling.
    pub a_factor: f64,
    /// Standard deviation of the spatial filter.
    pub spatial_sd: f64,
    /// Standard deviation of the additive output noise.
    pub noise_sd: f64,
}

impl Default for GroundSensorConfig {
    fn default() -> Self {
        Self {
            offset: Vector::new(7.2, 1.15),
            c_factor: 0.44,
            s_factor: 9.0,
            m_factor: 884.0,
            a_factor: 60.0,
            spatial_sd: 0.4,
            noise_sd: 10.0,
        }
    }
}

impl GroundSensorConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_vector(self.offset, "ground sensor offset must be finite")?;
        for factor in [self.c_factor, self.s_factor, self.m_factor, self.a_factor] {
            ensure_finite(factor, "ground sensor response factors must be finite")?;
        }
        ensure_positive(self.spatial_sd, "spatial_sd must be positive")?;
        ensure_finite(self.spatial_sd, "spatial_sd must be finite")?;
        ensure_non_negative(self.noise_sd, "noise_sd must be non-negative and finite")
    }
}

/// Single-field 1-D camera parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Mounting point relative to the body centre.
    pub offset: Vector,
    /// Objects lower than this are invisible to the camera.
    pub height: f64,
    /// Viewing direction relative to the body heading.
    pub angle_offset: f64,
    /// Half of the field of view, in radians.
    pub half_field_of_view: f64,
    /// Number of pixels spread evenly over the field of view, edges included.
    pub pixel_count: usize,
    /// Interaction range.
    pub range: f64,
    pub use_fog: bool,
    pub fog_density: f64,
    /// Components at or below this level are zeroed at finalize.
    pub light_threshold: Color,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            offset: Vector::ZERO,
            height: 0.0,
            angle_offset: 0.0,
            half_field_of_view: PI / 4.0,
            pixel_count: 60,
            range: f64::MAX,
            use_fog: false,
            fog_density: 0.0,
            light_threshold: Color::BLACK,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_vector(self.offset, "camera offset must be finite")?;
        ensure_finite(self.height, "camera height must be finite")?;
        ensure_finite(self.angle_offset, "camera angle offset must be finite")?;
        if !(self.half_field_of_view > 0.0 && self.half_field_of_view <= PI) {
            return Err(SensorError::InvalidConfig(
                "half_field_of_view must be in (0, π]",
            ));
        }
        if self.pixel_count < 2 {
            return Err(SensorError::InvalidConfig(
                "camera needs at least two pixels",
            ));
        }
        ensure_positive(self.range, "camera range must be positive")?;
        ensure_non_negative(self.fog_density, "fog_density must be non-negative")?;
        ensure_color(self.light_threshold, "light_threshold must be non-negative")
    }
}

/// Two half-field cameras fused into a full circle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompositeCameraConfig {
    pub offset: Vector,
    pub height: f64,
    /// Pixels per half; the fused buffer holds twice as many.
    pub half_pixel_count: usize,
    pub range: f64,
    pub use_fog: bool,
    pub fog_density: f64,
    pub light_threshold: Color,
}

impl Default for CompositeCameraConfig {
    fn default() -> Self {
        Self {
            offset: Vector::ZERO,
            height: 0.0,
            half_pixel_count: 90,
            range: f64::MAX,
            use_fog: false,
            fog_density: 0.0,
            light_threshold: Color::BLACK,
        }
    }
}

impl CompositeCameraConfig {
    /// Configuration of the half-camera looking towards `angle_offset`.
    #[must_use]
    pub fn half(&self, angle_offset: f64) -> CameraConfig {
        CameraConfig {
            offset: self.offset,
            height: self.height,
            angle_offset,
            half_field_of_view: PI / 2.0,
            pixel_count: self.half_pixel_count,
            range: self.range,
            use_fog: self.use_fog,
            fog_density: self.fog_density,
            light_threshold: self.light_threshold,
        }
    }

    pub fn validate(&self) -> SensorResult<()> {
        self.half(0.0).validate()
    }
}

/// Virtual bumper ring synthesised from a rotating distance sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BumperRingConfig {
    pub camera: CompositeCameraConfig,
    /// Number of logical bumpers around the body.
    pub sensor_count: usize,
    /// Mounting calibration between logical and physical numbering.
    pub calibration_offset: usize,
}

impl Default for BumperRingConfig {
    fn default() -> Self {
        Self {
            camera: CompositeCameraConfig {
                height: 11.0,
                half_pixel_count: 90,
                ..CompositeCameraConfig::default()
            },
            sensor_count: 24,
            calibration_offset: 12,
        }
    }
}

impl BumperRingConfig {
    pub fn validate(&self) -> SensorResult<()> {
        self.camera.validate()?;
        if self.sensor_count == 0 {
            return Err(SensorError::InvalidConfig("sensor_count must be non-zero"));
        }
        if self.calibration_offset >= self.sensor_count {
            return Err(SensorError::InvalidConfig(
                "calibration_offset must be below sensor_count",
            ));
        }
        if self.camera.half_pixel_count * 2 < self.sensor_count {
            return Err(SensorError::InvalidConfig(
                "bumper ring needs at least one pixel per sensor",
            ));
        }
        Ok(())
    }
}

/// Two-ray binary landmark camera.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandmarkCameraConfig {
    /// Angle between the heading and each ray.
    pub half_angle: f64,
    /// Landmark segment endpoints; the top wall of the world when absent.
    pub landmark: Option<[Vector; 2]>,
}

impl Default for LandmarkCameraConfig {
    fn default() -> Self {
        Self {
            half_angle: PI / 10.0,
            landmark: None,
        }
    }
}

impl LandmarkCameraConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_finite(self.half_angle, "half_angle must be finite")?;
        if let Some([a, b]) = self.landmark {
            ensure_vector(a, "landmark corners must be finite")?;
            ensure_vector(b, "landmark corners must be finite")?;
        }
        Ok(())
    }
}

/// Multi-channel sound emitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoundSourceConfig {
    pub channels: usize,
    /// Advertised emission range; microphones hear within their own range.
    pub range: f64,
    pub realistic_write: RealisticWrite,
}

impl Default for SoundSourceConfig {
    fn default() -> Self {
        Self {
            channels: 25,
            range: 100.0,
            realistic_write: RealisticWrite::default(),
        }
    }
}

impl SoundSourceConfig {
    pub fn validate(&self) -> SensorResult<()> {
        if self.channels == 0 {
            return Err(SensorError::InvalidConfig("channel count must be non-zero"));
        }
        ensure_positive(self.range, "sound range must be positive")?;
        self.realistic_write.validate()
    }
}

/// Multi-channel sound sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MicrophoneConfig {
    /// Mounting point of a single microphone.
    pub offset: Vector,
    /// Distance of each four-way mounting point from the centre, along both axes.
    pub mount_distance: f64,
    pub range: f64,
    pub channels: usize,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            offset: Vector::ZERO,
            mount_distance: 3.0,
            range: 100.0,
            channels: 25,
        }
    }
}

impl MicrophoneConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_vector(self.offset, "microphone offset must be finite")?;
        ensure_non_negative(self.mount_distance, "mount_distance must be non-negative")?;
        ensure_positive(self.range, "microphone range must be positive")?;
        if self.channels == 0 {
            return Err(SensorError::InvalidConfig("channel count must be non-zero"));
        }
        Ok(())
    }
}

/// Multi-ray infrared proximity sensor parameters.
///
/// Defaults describe the front-right sensor of a small two-wheeled robot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InfraredSensorConfig {
    /// Mounting point relative to the body centre.
    pub offset: Vector,
    /// Objects lower than this are not seen.
    pub height: f64,
    /// Sensor axis relative to the body heading.
    pub orientation: f64,
    /// Length of each ray.
    pub range: f64,
    /// Half-angle covered by the rays around the axis.
    pub aperture: f64,
    pub ray_count: usize,
}

impl Default for InfraredSensorConfig {
    fn default() -> Self {
        Self {
            offset: Vector::new(3.0, 0.9),
            height: 2.5,
            orientation: 4.0 * PI / 45.0,
            range: 12.0,
            aperture: 0.0,
            ray_count: 1,
        }
    }
}

impl InfraredSensorConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_vector(self.offset, "infrared offset must be finite")?;
        ensure_finite(self.height, "infrared height must be finite")?;
        ensure_finite(self.orientation, "infrared orientation must be finite")?;
        ensure_positive(self.range, "infrared range must be positive")?;
        ensure_finite(self.range, "infrared range must be finite")?;
        ensure_non_negative(self.aperture, "infrared aperture must be non-negative")?;
        if self.aperture > PI {
            return Err(SensorError::InvalidConfig("infrared aperture must not exceed pi"));
        }
        if self.ray_count == 0 {
            return Err(SensorError::InvalidConfig("ray count must be non-zero"));
        }
        Ok(())
    }
}

/// Pairwise radio link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadioConfig {
    pub range: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self { range: 100.0 }
    }
}

impl RadioConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_positive(self.range, "radio range must be positive")
    }
}

/// Differential-drive actuator parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    pub distance_between_wheels: f64,
    pub max_speed: f64,
    /// Relative motor noise; each wheel is scaled by `1 ± noise_amount`.
    pub noise_amount: f64,
    pub odometry: OdometryModel,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            distance_between_wheels: 15.0,
            max_speed: 30.0,
            noise_amount: 0.02,
            odometry: OdometryModel::default(),
        }
    }
}

impl DriveConfig {
    pub fn validate(&self) -> SensorResult<()> {
        ensure_positive(
            self.distance_between_wheels,
            "distance_between_wheels must be positive",
        )?;
        ensure_finite(
            self.distance_between_wheels,
            "distance_between_wheels must be finite",
        )?;
        ensure_positive(self.max_speed, "max_speed must be positive")?;
        ensure_non_negative(self.noise_amount, "noise_amount must be non-negative")?;
        if self.noise_amount > 1.0 {
            return Err(SensorError::InvalidConfig("noise_amount cannot exceed 1"));
        }
        Ok(())
    }
}

/// Static configuration for an arena and the defaults its components start from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Width of the world in world units (cm).
    pub world_width: f64,
    /// Height of the world in world units (cm).
    pub world_height: f64,
    /// Whether the four boundary walls exist.
    pub walls: bool,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Cell edge of the neighbourhood grid.
    pub index_cell_size: f64,
    /// Ground colour used where no raster covers the world.
    pub ground_color: Color,
    /// Colour of each wall, drawn as a single-texel texture.
    pub wall_color: Color,
    pub ground_sensor: GroundSensorConfig,
    pub composite_camera: CompositeCameraConfig,
    pub bumper_ring: BumperRingConfig,
    pub landmark_camera: LandmarkCameraConfig,
    pub infrared: InfraredSensorConfig,
    pub sound_source: SoundSourceConfig,
    pub microphone: MicrophoneConfig,
    pub radio: RadioConfig,
    pub drive: DriveConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: 200.0,
            world_height: 200.0,
            walls: true,
            rng_seed: None,
            index_cell_size: 50.0,
            ground_color: Color::WHITE,
            wall_color: Color::GRAY,
            ground_sensor: GroundSensorConfig::default(),
            composite_camera: CompositeCameraConfig::default(),
            bumper_ring: BumperRingConfig::default(),
            landmark_camera: LandmarkCameraConfig::default(),
            infrared: InfraredSensorConfig::default(),
            sound_source: SoundSourceConfig::default(),
            microphone: MicrophoneConfig::default(),
            radio: RadioConfig::default(),
            drive: DriveConfig::default(),
        }
    }
}

impl SimConfig {
    /// Validate the arena settings and every component default.
    pub fn validate(&self) -> SensorResult<()> {
        let result = self.validate_inner();
        if let Err(err) = &result {
            warn!(error = %err, "rejecting simulation configuration");
        }
        result
    }

    fn validate_inner(&self) -> SensorResult<()> {
        ensure_positive(self.world_width, "world dimensions must be positive")?;
        ensure_positive(self.world_height, "world dimensions must be positive")?;
        ensure_finite(self.world_width, "world dimensions must be finite")?;
        ensure_finite(self.world_height, "world dimensions must be finite")?;
        ensure_positive(self.index_cell_size, "index_cell_size must be positive")?;
        ensure_finite(self.index_cell_size, "index_cell_size must be finite")?;
        ensure_color(self.ground_color, "ground_color must be non-negative")?;
        ensure_color(self.wall_color, "wall_color must be non-negative")?;
        self.ground_sensor.validate()?;
        self.composite_camera.validate()?;
        self.bumper_ring.validate()?;
        self.landmark_camera.validate()?;
        self.infrared.validate()?;
        self.sound_source.validate()?;
        self.microphone.validate()?;
        self.radio.validate()?;
        self.drive.validate()
    }

    /// Parse a JSON document, reporting the path of the offending field on failure.
    pub fn from_json_str(text: &str) -> SensorResult<Self> {
        let mut de = serde_json::Deserializer::from_str(text);
        let config: Self = serde_path_to_error::deserialize(&mut de).map_err(
            |err: serde_path_to_error::Error<serde_json::Error>| {
                debug!(path = %err.path(), "configuration parse failure");
                SensorError::Parse(format!("{} at {}", err.inner(), err.path()))
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> SensorResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| SensorError::Parse(err.to_string()))
    }
}
