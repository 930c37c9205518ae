use sensorbots_index::IndexError;
use thiserror::Error;

/// Errors raised by sensor construction, accessors and the body registry.
///
/// Sensor evaluation itself never fails; these surface from constructors,
/// configuration loading, bounds-checked accessors and the arena stepper.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    /// A channel index was outside `[0, len)`.
    #[error("channel {index} out of range for {len} channels")]
    ChannelOutOfRange { index: usize, len: usize },
    /// A ray, pixel or logical sensor index was outside `[0, len)`.
    #[error("ray {index} out of range for {len} rays")]
    RayOutOfRange { index: usize, len: usize },
    /// A microphone mounting point index was outside `[0, len)`.
    #[error("mount {index} out of range for {len} mounts")]
    MountOutOfRange { index: usize, len: usize },
    /// The referenced body is not registered.
    #[error("unknown body")]
    UnknownBody,
    /// The referenced interaction handle does not belong to this body.
    #[error("unknown interaction handle {0}")]
    UnknownInteraction(u32),
    /// The interaction exists but is not of the requested concrete type.
    #[error("interaction {handle} is not a {expected}")]
    InteractionTypeMismatch {
        handle: u32,
        expected: &'static str,
    },
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// The neighbourhood index rejected the current body positions.
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type SensorResult<T> = Result<T, SensorError>;

/// Reject ranges that are zero, negative or NaN. Infinity is allowed.
pub(crate) fn ensure_positive(value: f64, message: &'static str) -> SensorResult<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(SensorError::InvalidConfig(message))
    }
}

/// Reject negative or non-finite standard deviations and noise amounts.
pub(crate) fn ensure_non_negative(value: f64, message: &'static str) -> SensorResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SensorError::InvalidConfig(message))
    }
}

pub(crate) fn ensure_finite(value: f64, message: &'static str) -> SensorResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SensorError::InvalidConfig(message))
    }
}
