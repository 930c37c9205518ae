//! Multi-channel sound: emitters carried in a body's ports and microphones that sample them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{MicrophoneConfig, SoundSourceConfig};
use crate::error::{SensorError, SensorResult, ensure_non_negative, ensure_positive};
use crate::geometry::Vector;
use crate::interaction::{LocalInteraction, Owner, Peer, StepContext};
use crate::noise::SensorRng;

/// How a "realistic" write spreads a signal over neighbouring channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RealisticWrite {
    /// Shift the target channel by a rounded Gaussian offset, then write there.
    GaussianJitter { variance: f64 },
    /// Write over channels `c - 2 ..= c + 1`, clipped to the buffer: the full signal
    /// at `c` and `signal / |c - i|` elsewhere. Channel 0 is written when `c <= 2`.
    WindowSmear,
}

impl Default for RealisticWrite {
    fn default() -> Self {
        Self::GaussianJitter { variance: 1.0 }
    }
}

impl RealisticWrite {
    pub fn validate(&self) -> SensorResult<()> {
        match self {
            Self::GaussianJitter { variance } => {
                ensure_non_negative(*variance, "jitter variance must be non-negative")
            }
            Self::WindowSmear => Ok(()),
        }
    }
}

/// Fixed-length array of per-channel intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBuffer {
    values: Vec<f64>,
}

impl ChannelBuffer {
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            values: vec![0.0; channels],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, channel: usize) -> SensorResult<f64> {
        self.values
            .get(channel)
            .copied()
            .ok_or(SensorError::ChannelOutOfRange {
                index: channel,
                len: self.values.len(),
            })
    }

    fn slot(&mut self, channel: usize) -> SensorResult<&mut f64> {
        let len = self.values.len();
        self.values
            .get_mut(channel)
            .ok_or(SensorError::ChannelOutOfRange {
                index: channel,
                len,
            })
    }

    pub fn set(&mut self, channel: usize, value: f64) -> SensorResult<()> {
        *self.slot(channel)? = value;
        Ok(())
    }

    pub fn add(&mut self, channel: usize, value: f64) -> SensorResult<()> {
        *self.slot(channel)? += value;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.values.fill(0.0);
    }

    /// Loudest channel and its value; the lowest index wins ties.
    ///
    /// `None` when no channel rises above zero.
    #[must_use]
    pub fn max(&self) -> Option<(usize, f64)> {
        let mut best = None;
        let mut loudest = 0.0;
        for (channel, &value) in self.values.iter().enumerate() {
            if value > loudest {
                loudest = value;
                best = Some((channel, value));
            }
        }
        best
    }
}

/// Multi-channel emitter attached to a body's ports.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundSource {
    sound: ChannelBuffer,
    range: f64,
    realistic_write: RealisticWrite,
}

impl SoundSource {
    pub fn new(config: &SoundSourceConfig) -> SensorResult<Self> {
        config.validate()?;
        Ok(Self {
            sound: ChannelBuffer::new(config.channels),
            range: config.range,
            realistic_write: config.realistic_write,
        })
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.sound.len()
    }

    #[must_use]
    pub fn channels(&self) -> &[f64] {
        self.sound.values()
    }

    #[must_use]
    pub fn sound(&self) -> &ChannelBuffer {
        &self.sound
    }

    pub fn sound_level(&self, channel: usize) -> SensorResult<f64> {
        self.sound.get(channel)
    }

    /// Exact write to one channel.
    pub fn set_sound(&mut self, channel: usize, signal: f64) -> SensorResult<()> {
        self.sound.set(channel, signal)
    }

    /// Noisy write that may land on, or spread to, neighbouring channels.
    ///
    /// `channel` itself must be valid; the effective channels are clamped to the buffer.
    /// [`RealisticWrite::WindowSmear`] writes channels `channel - 2 ..= channel + 1`
    /// that exist, so channel 0 receives `signal / channel` when `channel` is 1 or 2.
    pub fn realistic_set_sound(
        &mut self,
        channel: usize,
        signal: f64,
        rng: &mut SensorRng,
    ) -> SensorResult<()> {
        let len = self.sound.len();
        if channel >= len {
            return Err(SensorError::ChannelOutOfRange {
                index: channel,
                len,
            });
        }
        match self.realistic_write {
            RealisticWrite::GaussianJitter { variance } => {
                let offset = rng.gaussian(0.0, variance.sqrt()).round();
                let target = (channel as f64 + offset).clamp(0.0, (len - 1) as f64) as usize;
                self.sound.set(target, signal)
            }
            RealisticWrite::WindowSmear => {
                let first = channel.saturating_sub(2);
                let last = (channel + 2).min(len);
                for i in first..last {
                    let value = if i == channel {
                        signal
                    } else {
                        signal / channel.abs_diff(i) as f64
                    };
                    self.sound.set(i, value)?;
                }
                Ok(())
            }
        }
    }

    /// Loudest emitted channel, if any is above zero.
    #[must_use]
    pub fn max_sound(&self) -> Option<(usize, f64)> {
        self.sound.max()
    }

    /// Advertised emission range. Hearing is bounded by each microphone's own range.
    #[must_use]
    pub fn sound_range(&self) -> f64 {
        self.range
    }

    pub fn set_sound_range(&mut self, range: f64) -> SensorResult<()> {
        ensure_positive(range, "sound range must be positive")?;
        self.range = range;
        Ok(())
    }

    #[must_use]
    pub fn realistic_write(&self) -> RealisticWrite {
        self.realistic_write
    }

    pub fn silence(&mut self) {
        self.sound.clear();
    }
}

/// Attenuation applied to each channel: `(signal, distance) -> heard`.
pub type ResponseModel = fn(f64, f64) -> f64;

/// `signal / (1 + d²)`.
#[must_use]
pub fn inverse_square_response(signal: f64, distance: f64) -> f64 {
    signal / (1.0 + distance * distance)
}

/// No attenuation.
#[must_use]
pub fn flat_response(signal: f64, _distance: f64) -> f64 {
    signal
}

/// Add the attenuated sound of `source`, heard from `distance`, into `buffer`.
fn accumulate(
    buffer: &mut ChannelBuffer,
    source: &SoundSource,
    distance: f64,
    response: ResponseModel,
) {
    if source.channel_count() != buffer.len() {
        warn!(
            emitted = source.channel_count(),
            heard = buffer.len(),
            "skipping sound source with mismatched channel count"
        );
        return;
    }
    for (heard, &emitted) in buffer.values.iter_mut().zip(source.channels()) {
        *heard += response(emitted, distance);
    }
}

/// Single microphone summing every audible source each tick.
#[derive(Debug, Clone)]
pub struct Microphone {
    config: MicrophoneConfig,
    response: ResponseModel,
    acquired: ChannelBuffer,
    absolute_position: Vector,
}

impl Microphone {
    pub fn new(config: MicrophoneConfig) -> SensorResult<Self> {
        Self::with_response(config, inverse_square_response)
    }

    pub fn with_response(config: MicrophoneConfig, response: ResponseModel) -> SensorResult<Self> {
        config.validate()?;
        let acquired = ChannelBuffer::new(config.channels);
        Ok(Self {
            config,
            response,
            acquired,
            absolute_position: Vector::ZERO,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MicrophoneConfig {
        &self.config
    }

    #[must_use]
    pub fn acquired_sound(&self) -> &ChannelBuffer {
        &self.acquired
    }

    #[must_use]
    pub fn max_channel(&self) -> Option<(usize, f64)> {
        self.acquired.max()
    }

    #[must_use]
    pub fn absolute_position(&self) -> Vector {
        self.absolute_position
    }
}

impl LocalInteraction for Microphone {
    fn range(&self) -> f64 {
        self.config.range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        self.absolute_position = owner.state.pose.to_world(self.config.offset);
        self.acquired.clear();
    }

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
        let Some(source) = &peer.ports.speaker else {
            return;
        };
        let distance = (peer.state.pose.position - self.absolute_position).norm();
        accumulate(&mut self.acquired, source, distance, self.response);
    }
}

/// Four microphones at `(d, d)`, `(d, -d)`, `(-d, d)` and `(-d, -d)`; a source
/// is only heard by the mount closest to it.
#[derive(Debug, Clone)]
pub struct FourWayMicrophone {
    config: MicrophoneConfig,
    response: ResponseModel,
    mounts: [Vector; 4],
    absolute_mounts: [Vector; 4],
    acquired: [ChannelBuffer; 4],
}

impl FourWayMicrophone {
    pub const MOUNT_COUNT: usize = 4;

    pub fn new(config: MicrophoneConfig) -> SensorResult<Self> {
        Self::with_response(config, inverse_square_response)
    }

    pub fn with_response(config: MicrophoneConfig, response: ResponseModel) -> SensorResult<Self> {
        config.validate()?;
        let d = config.mount_distance;
        let mounts = [
            Vector::new(d, d),
            Vector::new(d, -d),
            Vector::new(-d, d),
            Vector::new(-d, -d),
        ];
        let acquired = std::array::from_fn(|_| ChannelBuffer::new(config.channels));
        Ok(Self {
            config,
            response,
            mounts,
            absolute_mounts: [Vector::ZERO; 4],
            acquired,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MicrophoneConfig {
        &self.config
    }

    /// Mounting points in body coordinates.
    #[must_use]
    pub fn mounts(&self) -> &[Vector; 4] {
        &self.mounts
    }

    fn check_mount(mount: usize) -> SensorResult<()> {
        if mount < Self::MOUNT_COUNT {
            Ok(())
        } else {
            Err(SensorError::MountOutOfRange {
                index: mount,
                len: Self::MOUNT_COUNT,
            })
        }
    }

    pub fn acquired_sound(&self, mount: usize) -> SensorResult<&ChannelBuffer> {
        Self::check_mount(mount)?;
        Ok(&self.acquired[mount])
    }

    pub fn max_channel(&self, mount: usize) -> SensorResult<Option<(usize, f64)>> {
        Ok(self.acquired_sound(mount)?.max())
    }

    pub fn absolute_mount(&self, mount: usize) -> SensorResult<Vector> {
        Self::check_mount(mount)?;
        Ok(self.absolute_mounts[mount])
    }
}

impl LocalInteraction for FourWayMicrophone {
    fn range(&self) -> f64 {
        self.config.range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        let pose = owner.state.pose;
        for (absolute, mount) in self.absolute_mounts.iter_mut().zip(&self.mounts) {
            *absolute = pose.to_world(*mount);
        }
        for buffer in &mut self.acquired {
            buffer.clear();
        }
    }

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
        let Some(source) = &peer.ports.speaker else {
            return;
        };
        let position = peer.state.pose.position;
        let mut nearest = 0;
        let mut nearest_distance = f64::INFINITY;
        for (mount, absolute) in self.absolute_mounts.iter().enumerate() {
            let distance = (position - *absolute).norm();
            if distance < nearest_distance {
                nearest = mount;
                nearest_distance = distance;
            }
        }
        accumulate(
            &mut self.acquired[nearest],
            source,
            nearest_distance,
            self.response,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BodyId;
    use crate::arena::Surroundings;
    use crate::body::{BodyState, Ports};

    fn source(realistic_write: RealisticWrite) -> SoundSource {
        SoundSource::new(&SoundSourceConfig {
            channels: 10,
            range: 50.0,
            realistic_write,
        })
        .expect("source")
    }

    #[test]
    fn max_prefers_the_first_loudest_channel() {
        let mut buffer = ChannelBuffer::new(4);
        for (i, v) in [0.0, 5.0, 5.0, 0.0].into_iter().enumerate() {
            buffer.set(i, v).expect("channel");
        }
        assert_eq!(buffer.max(), Some((1, 5.0)));
        buffer.clear();
        assert_eq!(buffer.max(), None);
        assert_eq!(
            buffer.add(4, 1.0),
            Err(SensorError::ChannelOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn window_smear_spreads_over_the_half_open_window() {
        let mut rng = SensorRng::seed_from_u64(1);
        let mut speaker = source(RealisticWrite::WindowSmear);
        speaker.realistic_set_sound(5, 8.0, &mut rng).expect("write");
        assert_eq!(
            speaker.channels(),
            &[0.0, 0.0, 0.0, 4.0, 8.0, 8.0, 8.0, 0.0, 0.0, 0.0][..]
        );

        // At the low edge the window includes channel 0.
        let mut edge = source(RealisticWrite::WindowSmear);
        edge.realistic_set_sound(1, 6.0, &mut rng).expect("write");
        assert_eq!(&edge.channels()[..4], &[6.0, 6.0, 6.0, 0.0]);
    }

    #[test]
    fn gaussian_jitter_stays_near_the_target_and_inside_the_buffer() {
        let mut rng = SensorRng::seed_from_u64(9);
        let mut hits = [0usize; 10];
        for _ in 0..2_000 {
            let mut speaker = source(RealisticWrite::GaussianJitter { variance: 1.0 });
            speaker.realistic_set_sound(0, 1.0, &mut rng).expect("write");
            let (channel, value) = speaker.max_sound().expect("written");
            assert_eq!(value, 1.0);
            hits[channel] += 1;
        }
        // Negative offsets clamp to channel 0, so it is the most frequent.
        assert!(hits[0] > hits[1] && hits[1] > hits[2]);
        assert!(hits[6..].iter().all(|&h| h == 0));

        let mut exact = source(RealisticWrite::GaussianJitter { variance: 0.0 });
        exact.realistic_set_sound(9, 2.0, &mut rng).expect("write");
        assert_eq!(exact.max_sound(), Some((9, 2.0)));
        assert!(exact.realistic_set_sound(10, 1.0, &mut rng).is_err());
    }

    fn hear<I: LocalInteraction>(
        mic: &mut I,
        listener: &BodyState,
        speakers: &mut [(BodyState, Ports)],
    ) {
        let world = Surroundings::new(Vector::new(500.0, 500.0), false);
        let mut rng = SensorRng::seed_from_u64(0);
        let mut ports = Ports::default();
        let mut owner = Owner {
            id: BodyId::default(),
            state: listener,
            ports: &mut ports,
        };
        let mut ctx = StepContext {
            dt: 0.1,
            rng: &mut rng,
            world: &world,
        };
        mic.init(&mut owner, &mut ctx);
        for (state, speaker_ports) in speakers.iter_mut() {
            let distance = (state.pose.position - listener.pose.position).norm();
            let mut peer = Peer {
                id: BodyId::default(),
                state,
                ports: speaker_ports,
                distance,
            };
            mic.object_step(&mut owner, &mut peer, &mut ctx);
        }
    }

    fn speaker_at(
        position: Vector,
        channel: usize,
        signal: f64,
        channels: usize,
    ) -> (BodyState, Ports) {
        let mut speaker = SoundSource::new(&SoundSourceConfig {
            channels,
            range: 50.0,
            ..SoundSourceConfig::default()
        })
        .expect("source");
        speaker.set_sound(channel, signal).expect("channel");
        let ports = Ports {
            speaker: Some(speaker),
            ..Ports::default()
        };
        (BodyState::at(position, 0.0), ports)
    }

    #[test]
    fn microphone_sums_sources_and_skips_mismatched_ones() {
        let config = MicrophoneConfig {
            channels: 4,
            ..MicrophoneConfig::default()
        };
        let mut mic = Microphone::with_response(config, flat_response).expect("mic");
        let listener = BodyState::at(Vector::new(100.0, 100.0), 0.0);
        let mut speakers = vec![
            speaker_at(Vector::new(110.0, 100.0), 2, 3.0, 4),
            speaker_at(Vector::new(100.0, 130.0), 2, 1.5, 4),
            // Beyond the source's advertised range, still heard.
            speaker_at(Vector::new(100.0, 170.0), 1, 9.0, 4),
            // Mismatched channel count.
            speaker_at(Vector::new(105.0, 100.0), 0, 9.0, 6),
            (BodyState::at(Vector::new(101.0, 100.0), 0.0), Ports::default()),
        ];
        hear(&mut mic, &listener, &mut speakers);
        assert_eq!(mic.acquired_sound().values(), &[0.0, 9.0, 4.5, 0.0][..]);
        assert_eq!(mic.max_channel(), Some((1, 9.0)));

        hear(&mut mic, &listener, &mut []);
        assert_eq!(mic.max_channel(), None);
    }

    #[test]
    fn inverse_square_attenuates_with_distance() {
        assert_eq!(inverse_square_response(10.0, 0.0), 10.0);
        assert_eq!(inverse_square_response(10.0, 3.0), 1.0);
        assert_eq!(flat_response(10.0, 3.0), 10.0);
    }

    #[test]
    fn only_the_nearest_mount_hears_a_source() {
        let config = MicrophoneConfig {
            channels: 3,
            mount_distance: 3.0,
            ..MicrophoneConfig::default()
        };
        let mut mic = FourWayMicrophone::with_response(config, flat_response).expect("mic");
        let listener = BodyState::at(Vector::new(100.0, 100.0), 0.0);
        let mut speakers = vec![
            // Front-left of the listener: mount (d, d).
            speaker_at(Vector::new(120.0, 120.0), 1, 2.0, 3),
            // Rear-right: mount (-d, -d).
            speaker_at(Vector::new(80.0, 80.0), 0, 5.0, 3),
        ];
        hear(&mut mic, &listener, &mut speakers);
        assert_eq!(mic.max_channel(0), Ok(Some((1, 2.0))));
        assert_eq!(mic.max_channel(1), Ok(None));
        assert_eq!(mic.max_channel(2), Ok(None));
        assert_eq!(mic.max_channel(3), Ok(Some((0, 5.0))));
        assert_eq!(mic.absolute_mount(0), Ok(Vector::new(103.0, 103.0)));
        assert_eq!(
            mic.max_channel(4),
            Err(SensorError::MountOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn realistic_write_configs_round_trip_through_json() {
        let text = serde_json::to_string(&RealisticWrite::GaussianJitter { variance: 2.0 })
            .expect("serialize");
        assert_eq!(text, r#"{"kind":"gaussian_jitter","variance":2.0}"#);
        let parsed: RealisticWrite =
            serde_json::from_str(r#"{"kind":"window_smear"}"#).expect("parse");
        assert_eq!(parsed, RealisticWrite::WindowSmear);
        assert!(RealisticWrite::GaussianJitter { variance: -1.0 }.validate().is_err());
    }
}
