//! Engine configuration.
//!
//! Every tunable the engine uses lives here with its default. Hosts build an
//! [`EngineConfig`] (usually `EngineConfig::default()` plus the device sample
//! rate) and hand it to [`AudioEngine::new`](crate::AudioEngine::new).

use thiserror::Error;

/// Master gain used before activation and as the unmute fallback.
pub const DEFAULT_MASTER_GAIN: f32 = 0.7;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0}")]
    SampleRate(f32),
    #[error("block size must be at least one frame")]
    BlockFrames,
    #[error("bus gain {0} is outside [0, 1]")]
    BusGain(f32),
    #[error("loop length must be positive, got {0} s")]
    LoopLength(f64),
    #[error("loop must have 1 or 2 channels, got {0}")]
    LoopChannels(usize),
    #[error("fade and delay times must be non-negative and finite")]
    Timing,
    #[error("sparkle jitter window [{0}, {1}] s is empty or non-positive")]
    Jitter(f64, f64),
}

/// Ambient drone and sparkle settings.
#[derive(Clone, Debug, PartialEq)]
pub struct AmbientConfig {
    /// Length of the pre-rendered loop, seconds.
    pub loop_seconds: f64,
    /// Channels in the pre-rendered loop (1 = mono, 2 = stereo).
    pub loop_channels: usize,
    /// Ambient bus gain reached at the end of the fade-in.
    pub target_gain: f32,
    pub fade_in_seconds: f64,
    pub fade_out_seconds: f64,
    /// Number of sparkle pings baked into the loop.
    pub baked_sparkles: usize,
    /// Delay between playback start and the first live sparkle.
    pub sparkle_initial_delay: f64,
    /// Live sparkle rearm delay is drawn uniformly from `[min, max]`.
    pub sparkle_jitter_min: f64,
    pub sparkle_jitter_max: f64,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            loop_seconds: 16.0,
            loop_channels: 2,
            target_gain: 0.9,
            fade_in_seconds: 3.0,
            fade_out_seconds: 1.0,
            baked_sparkles: 30,
            sparkle_initial_delay: 2.0,
            sparkle_jitter_min: 0.8,
            sparkle_jitter_max: 3.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f32,
    /// Largest slice rendered between timer checks.
    pub block_frames: usize,
    pub master_gain: f32,
    pub ambient_gain: f32,
    pub sfx_gain: f32,
    /// Ramp length used for volume changes on buses that carry audio.
    pub declick_seconds: f64,
    pub ambient: AmbientConfig,
    /// Fixed RNG seed for reproducible sparkle placement; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            block_frames: 128,
            master_gain: DEFAULT_MASTER_GAIN,
            ambient_gain: 0.0,
            sfx_gain: 0.5,
            declick_seconds: 0.015,
            ambient: AmbientConfig::default(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Default config at a given device sample rate.
    pub fn with_sample_rate(sample_rate: f32) -> Self {
        Self { sample_rate, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if self.block_frames == 0 {
            return Err(ConfigError::BlockFrames);
        }
        for g in [self.master_gain, self.ambient_gain, self.sfx_gain, self.ambient.target_gain] {
            if !(0.0..=1.0).contains(&g) {
                return Err(ConfigError::BusGain(g));
            }
        }

        let a = &self.ambient;
        if !(a.loop_seconds.is_finite() && a.loop_seconds > 0.0) {
            return Err(ConfigError::LoopLength(a.loop_seconds));
        }
        if !(1..=2).contains(&a.loop_channels) {
            return Err(ConfigError::LoopChannels(a.loop_channels));
        }
        let times = [
            a.fade_in_seconds,
            a.fade_out_seconds,
            a.sparkle_initial_delay,
            self.declick_seconds,
        ];
        if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigError::Timing);
        }
        if !(a.sparkle_jitter_min > 0.0 && a.sparkle_jitter_max >= a.sparkle_jitter_min) {
            return Err(ConfigError::Jitter(a.sparkle_jitter_min, a.sparkle_jitter_max));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = EngineConfig::with_sample_rate(0.0);
        assert_eq!(cfg.validate(), Err(ConfigError::SampleRate(0.0)));

        let mut cfg = EngineConfig::default();
        cfg.ambient.sparkle_jitter_max = 0.1;
        assert!(matches!(cfg.validate(), Err(ConfigError::Jitter(..))));

        let mut cfg = EngineConfig::default();
        cfg.sfx_gain = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::BusGain(1.5)));
    }
}
