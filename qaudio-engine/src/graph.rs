//! Bus graph core.
//!
//! This module defines the `Generator` trait every sound source implements, the
//! `AudioClock` that timestamps rendered frames, and the `Bus`: a summing and
//! gain point that owns the voices feeding it.
//!
//! Topology (built by [`EngineContext`](crate::context::EngineContext)):
//!
//! ```text
//!   ambient ─┐
//!            ├─► master ─► output
//!   sfx ─────┘
//! ```

use std::fmt;

use qaudio_core::dsp::{mix_in_place, mul_in_place};
use qaudio_core::envelopes::Envelope;

use crate::nodes::{LoopPlayer, Voice};

/// Anything that can render into a stereo block.
pub trait Generator {
    /// Add this generator's output for the block starting at clock time `t0`
    /// into `left`/`right` (equal lengths, one entry per frame).
    fn render_add(&mut self, t0: f64, sr: f32, left: &mut [f32], right: &mut [f32]);

    /// True once nothing more can be heard from this generator at or after `t`.
    fn is_finished(&self, t: f64) -> bool;
}

/// Frame counter for the realtime path; `now()` is seconds since activation.
#[derive(Copy, Clone, Debug)]
pub struct AudioClock {
    frames: u64,
    sr: f64,
}

impl AudioClock {
    #[inline]
    pub fn new(sr: f32) -> Self {
        Self { frames: 0, sr: f64::from(sr.max(1.0)) }
    }

    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn now(&self) -> f64 {
        self.frames as f64 / self.sr
    }

    #[inline]
    pub fn frames(&self) -> u64 { self.frames }

    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.frames += frames as u64;
    }
}

/// The three named buses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BusId {
    Master,
    Ambient,
    Sfx,
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusId::Master => "master",
            BusId::Ambient => "ambient",
            BusId::Sfx => "sfx",
        })
    }
}

/// A summing point with an automated gain.
///
/// `level` is the last gain requested through a setter or a fade (what the
/// volume API reports); `gain` is the automation actually applied per sample.
pub struct Bus {
    id: BusId,
    level: f32,
    gain: Envelope,
    voices: Vec<Voice>,
    looped: Option<LoopPlayer>,
    pub(crate) left: Vec<f32>,
    pub(crate) right: Vec<f32>,
    gains: Vec<f32>,
}

impl Bus {
    pub fn new(id: BusId, level: f32) -> Self {
        Self {
            id,
            level,
            gain: Envelope::constant(level),
            voices: Vec::new(),
            looped: None,
            left: Vec::new(),
            right: Vec::new(),
            gains: Vec::new(),
        }
    }

    #[inline] pub fn level(&self) -> f32 { self.level }

    /// Gain actually applied at clock time `t`.
    #[inline]
    pub fn gain_at(&self, t: f64) -> f32 {
        self.gain.value_at(t)
    }

    /// Set the level. With `ramp` the change glides linearly from the current
    /// value; without it the gain jumps and any pending automation is dropped.
    pub fn set_level(&mut self, level: f32, now: f64, ramp: Option<f64>) {
        self.level = level;
        match ramp {
            Some(secs) if secs > 0.0 => {
                self.gain.hold_at(now);
                self.gain.linear_ramp_to(level, now + secs);
            }
            _ => self.gain = Envelope::constant(level),
        }
    }

    /// Record a requested level without touching the automation in flight.
    pub fn remember_level(&mut self, level: f32) {
        self.level = level;
    }

    /// Linear fade from `from` (or the current value when `None`) to `to` over `secs`.
    pub fn fade(&mut self, from: Option<f32>, to: f32, now: f64, secs: f64) {
        match from {
            Some(v) => {
                self.gain.cancel_from(now);
                self.gain.set_value_at(v, now);
            }
            None => {
                self.gain.hold_at(now);
            }
        }
        self.gain.linear_ramp_to(to, now + secs.max(0.0));
        self.level = to;
    }

    /// True while something is audible through this bus.
    #[inline]
    pub fn has_sources(&self) -> bool {
        !self.voices.is_empty() || self.looped.is_some()
    }

    pub fn add_voice(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    pub fn set_loop(&mut self, player: LoopPlayer) -> Option<LoopPlayer> {
        self.looped.replace(player)
    }

    pub fn take_loop(&mut self) -> Option<LoopPlayer> {
        self.looped.take()
    }

    #[inline] pub fn has_loop(&self) -> bool { self.looped.is_some() }
    #[inline] pub fn voice_count(&self) -> usize { self.voices.len() }

    /// Synthesis nodes alive on this bus (the loop source counts as one).
    pub fn node_count(&self) -> usize {
        self.voices.iter().map(Voice::node_count).sum::<usize>() + usize::from(self.looped.is_some())
    }

    /// Zero the scratch buffers for a block of `frames`.
    pub(crate) fn begin_block(&mut self, frames: usize) {
        for buf in [&mut self.left, &mut self.right, &mut self.gains] {
            buf.clear();
            buf.resize(frames, 0.0);
        }
    }

    /// Render every owned source into the scratch buffers.
    pub(crate) fn render_sources(&mut self, t0: f64, sr: f32) {
        for v in &mut self.voices {
            v.render_add(t0, sr, &mut self.left, &mut self.right);
        }
        if let Some(lp) = &mut self.looped {
            lp.render_add(t0, sr, &mut self.left, &mut self.right);
        }
    }

    /// Sum another bus's post-gain output into this one.
    pub(crate) fn mix_from(&mut self, other: &Bus) {
        mix_in_place(&mut self.left, &other.left, 1.0);
        mix_in_place(&mut self.right, &other.right, 1.0);
    }

    pub(crate) fn apply_gain(&mut self, t0: f64, sr: f32) {
        let dt = 1.0 / f64::from(sr);
        for (i, g) in self.gains.iter_mut().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let t = t0 + i as f64 * dt;
            *g = self.gain.value_at(t);
        }
        mul_in_place(&mut self.left, &self.gains);
        mul_in_place(&mut self.right, &self.gains);
    }

    /// Drop every voice whose stop time has passed and forget spent automation.
    /// Returns how many voices were released.
    pub(crate) fn release_finished(&mut self, t: f64) -> usize {
        let before = self.voices.len();
        self.voices.retain(|v| !v.is_finished(t));
        self.gain.prune_before(t);
        before - self.voices.len()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("voices", &self.voices.len())
            .field("looped", &self.looped.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Source, Wave};

    #[test]
    fn clock_counts_seconds() {
        let mut c = AudioClock::new(48_000.0);
        c.advance(24_000);
        assert!((c.now() - 0.5).abs() < 1e-12);
        assert_eq!(c.frames(), 24_000);
    }

    #[test]
    fn set_level_jump_and_ramp() {
        let mut bus = Bus::new(BusId::Sfx, 0.5);
        bus.set_level(0.2, 1.0, None);
        assert_eq!(bus.gain_at(1.0), 0.2);

        bus.set_level(1.0, 2.0, Some(0.1));
        assert_eq!(bus.level(), 1.0);
        assert!((bus.gain_at(2.05) - 0.6).abs() < 1e-4);
        assert!((bus.gain_at(2.2) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fade_from_current_value() {
        let mut bus = Bus::new(BusId::Ambient, 0.0);
        bus.fade(Some(0.0), 0.9, 0.0, 3.0);
        assert!((bus.gain_at(1.5) - 0.45).abs() < 1e-5);
        bus.fade(None, 0.0, 1.5, 1.0);
        assert!((bus.gain_at(1.5) - 0.45).abs() < 1e-5);
        assert!((bus.gain_at(2.0) - 0.225).abs() < 1e-5);
        assert_eq!(bus.gain_at(2.5), 0.0);
        assert_eq!(bus.level(), 0.0);
    }

    #[test]
    fn remembered_level_leaves_fade_running() {
        let mut bus = Bus::new(BusId::Ambient, 0.9);
        bus.fade(None, 0.0, 0.0, 1.0);
        bus.remember_level(0.8);
        assert_eq!(bus.level(), 0.8);
        assert!((bus.gain_at(0.5) - 0.45).abs() < 1e-5);
        assert_eq!(bus.gain_at(1.0), 0.0);
    }

    #[test]
    fn release_drops_only_finished_voices() {
        let mut bus = Bus::new(BusId::Sfx, 0.5);
        bus.add_voice(Voice::new(Source::osc(Wave::Sine), 48_000.0, 0.0, 0.2));
        bus.add_voice(Voice::new(Source::osc(Wave::Sine), 48_000.0, 0.0, 0.5));
        assert_eq!(bus.release_finished(0.3), 1);
        assert_eq!(bus.voice_count(), 1);
        assert_eq!(bus.node_count(), 2);
    }
}
