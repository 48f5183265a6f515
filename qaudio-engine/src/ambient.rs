//! Ambient session state machine and live sparkle synthesis.
//!
//! ```text
//!   Idle ──start──► Rendering ──render ok──► Playing
//!    ▲                 │  │                     │
//!    │            fail │  └──────stop──────┐    │ stop
//!    │◄────────────────┘                   ▼    ▼
//!    └────────────fade done─────────── FadingOut
//! ```
//!
//! Every `start`/`stop` bumps the generation. A render result is consumed
//! only if its generation is still current *and* the session is still
//! rendering; anything else is a stale result and gets dropped.

use std::fmt;

use qaudio_core::envelopes::Envelope;
use rand::Rng;
use tracing::{debug, info};

use crate::nodes::{Source, Voice, Wave};
use crate::scheduler::{SparkleScheduler, TimerQueue};

/// Live sparkle burst ranges.
const BURSTS: (usize, usize) = (1, 3);
const BURST_SPREAD: f64 = 0.25;
const BURST_FREQ: (f32, f32) = (2400.0, 4800.0);
const BURST_PEAK: (f32, f32) = (0.008, 0.02);
const BURST_ATTACK: f64 = 0.01;
const BURST_DECAY: (f64, f64) = (0.25, 0.7);
const BURST_FLOOR: f32 = 0.0005;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AmbientState {
    Idle,
    Rendering,
    Playing,
    FadingOut,
}

impl fmt::Display for AmbientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AmbientState::Idle => "idle",
            AmbientState::Rendering => "rendering",
            AmbientState::Playing => "playing",
            AmbientState::FadingOut => "fading-out",
        })
    }
}

/// What `begin_stop` hands back to the engine.
#[derive(Debug)]
pub struct StopTicket {
    pub generation: u64,
    pub was_playing: bool,
}

/// The single stateful entity of the engine.
#[derive(Debug)]
pub struct AmbientSession {
    state: AmbientState,
    generation: u64,
    sparkle: Option<SparkleScheduler>,
}

impl Default for AmbientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbientSession {
    pub fn new() -> Self {
        Self { state: AmbientState::Idle, generation: 0, sparkle: None }
    }

    #[inline] pub fn state(&self) -> AmbientState { self.state }
    #[inline] pub fn generation(&self) -> u64 { self.generation }

    /// Idle → Rendering. Returns the generation the render must carry.
    pub fn begin_render(&mut self) -> Option<u64> {
        if self.state != AmbientState::Idle {
            debug!(state = %self.state, "start ignored: ambient not idle");
            return None;
        }
        self.generation += 1;
        self.state = AmbientState::Rendering;
        info!(generation = self.generation, "ambient rendering");
        Some(self.generation)
    }

    /// Whether a render tagged `generation` may still be consumed.
    #[inline]
    pub fn wants_render(&self, generation: u64) -> bool {
        self.state == AmbientState::Rendering && self.generation == generation
    }

    /// Rendering → Playing, only for the current generation.
    pub fn accept_render(&mut self, generation: u64) -> bool {
        if !self.wants_render(generation) {
            return false;
        }
        self.state = AmbientState::Playing;
        info!(generation, "ambient playing");
        true
    }

    /// Rendering → Idle after a failed render of the current generation.
    pub fn render_failed(&mut self, generation: u64) -> bool {
        if !self.wants_render(generation) {
            return false;
        }
        self.state = AmbientState::Idle;
        true
    }

    /// Rendering | Playing → FadingOut. Cancels the live sparkle scheduler.
    pub fn begin_stop(&mut self, timers: &mut TimerQueue) -> Option<StopTicket> {
        let was_playing = match self.state {
            AmbientState::Playing => true,
            AmbientState::Rendering => false,
            AmbientState::Idle | AmbientState::FadingOut => {
                debug!(state = %self.state, "stop ignored");
                return None;
            }
        };
        if let Some(mut s) = self.sparkle.take() {
            s.cancel(timers);
        }
        self.generation += 1;
        self.state = AmbientState::FadingOut;
        info!(generation = self.generation, was_playing, "ambient fading out");
        Some(StopTicket { generation: self.generation, was_playing })
    }

    /// FadingOut → Idle once the fade scheduled for `generation` has run.
    pub fn finish_stop(&mut self, generation: u64) -> bool {
        if self.state != AmbientState::FadingOut || self.generation != generation {
            return false;
        }
        self.state = AmbientState::Idle;
        info!(generation, "ambient idle");
        true
    }

    /// Install the live sparkle scheduler. Only meaningful while playing.
    pub fn arm_sparkle(&mut self, timers: &mut TimerQueue, due: f64) {
        if self.state != AmbientState::Playing {
            return;
        }
        if let Some(mut old) = self.sparkle.take() {
            old.cancel(timers);
        }
        self.sparkle = Some(SparkleScheduler::arm(timers, due));
        debug!(due, "sparkle scheduler armed");
    }

    /// The live scheduler, present only while playing.
    #[inline]
    pub fn sparkle_mut(&mut self) -> Option<&mut SparkleScheduler> {
        match self.state {
            AmbientState::Playing => self.sparkle.as_mut(),
            _ => None,
        }
    }
}

/// One live sparkle firing: 1–3 short sine bursts straight onto the ambient bus.
pub fn sparkle_burst<R: Rng>(rng: &mut R, now: f64, sr: f32) -> Vec<Voice> {
    let count = rng.gen_range(BURSTS.0..=BURSTS.1);
    (0..count)
        .map(|i| {
            let t = if i == 0 { now } else { now + rng.gen_range(0.0..BURST_SPREAD) };
            let freq = rng.gen_range(BURST_FREQ.0..BURST_FREQ.1);
            let peak = rng.gen_range(BURST_PEAK.0..BURST_PEAK.1);
            let decay = rng.gen_range(BURST_DECAY.0..BURST_DECAY.1);

            let mut gain = Envelope::new(0.0);
            gain.set_value_at(0.0, t)
                .linear_ramp_to(peak, t + BURST_ATTACK)
                .exponential_ramp_to(BURST_FLOOR, t + BURST_ATTACK + decay);

            Voice::new(Source::osc(Wave::Sine), sr, t, t + BURST_ATTACK + decay + 0.05)
                .with_freq(Envelope::constant(freq))
                .with_gain(gain)
        })
        .collect()
}
