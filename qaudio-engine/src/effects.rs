//! One-shot interaction effects.
//!
//! Each effect is a fixed automation script over a tiny subgraph. `build`
//! returns the voices; the engine hands them to the sfx bus, which releases
//! each one at the first block boundary past its stop time.

use std::fmt;

use qaudio_core::envelopes::Envelope;
use qaudio_core::filters::SvfMode;

use crate::nodes::{Source, Voice, Wave};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Scene transition: soft filtered up/down sweep.
    Transition,
    /// Particle spawn: short falling chirp.
    ParticleSpawn,
    /// Button press: gentle fixed-pitch ping.
    Ping,
    /// Scene loaded: two ascending notes.
    SceneChime,
    /// Ray hit: soft filtered click.
    Click,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Effect::Transition => "transition",
            Effect::ParticleSpawn => "particle-spawn",
            Effect::Ping => "ping",
            Effect::SceneChime => "scene-chime",
            Effect::Click => "click",
        })
    }
}

/// Longest stop offset of any effect, seconds.
pub const MAX_EFFECT_SECONDS: f64 = 0.7;

/// Build the subgraph for `effect` starting at `now`.
pub fn build(effect: Effect, now: f64, sr: f32) -> Vec<Voice> {
    match effect {
        Effect::Transition => vec![transition(now, sr)],
        Effect::ParticleSpawn => vec![particle_spawn(now, sr)],
        Effect::Ping => vec![ping(now, sr)],
        Effect::SceneChime => scene_chime(now, sr),
        Effect::Click => vec![click(now, sr)],
    }
}

fn transition(now: f64, sr: f32) -> Voice {
    let mut freq = Envelope::new(200.0);
    freq.set_value_at(200.0, now)
        .exponential_ramp_to(800.0, now + 0.3)
        .exponential_ramp_to(400.0, now + 0.6);

    let mut cutoff = Envelope::new(600.0);
    cutoff.set_value_at(600.0, now)
        .linear_ramp_to(2000.0, now + 0.3)
        .linear_ramp_to(300.0, now + 0.6);

    let mut gain = Envelope::new(0.0);
    gain.set_value_at(0.0, now)
        .linear_ramp_to(0.08, now + 0.05)
        .linear_ramp_to(0.06, now + 0.3)
        .linear_ramp_to(0.0, now + 0.6);

    Voice::new(Source::osc(Wave::Sine), sr, now, now + 0.7)
        .with_freq(freq)
        .with_filter(SvfMode::Lowpass, 0.707, cutoff)
        .with_gain(gain)
}

fn particle_spawn(now: f64, sr: f32) -> Voice {
    let mut freq = Envelope::new(880.0);
    freq.set_value_at(880.0, now).exponential_ramp_to(220.0, now + 0.15);

    let mut gain = Envelope::new(0.1);
    gain.set_value_at(0.1, now).exponential_ramp_to(0.001, now + 0.2);

    Voice::new(Source::osc(Wave::Sine), sr, now, now + 0.25)
        .with_freq(freq)
        .with_gain(gain)
}

fn ping(now: f64, sr: f32) -> Voice {
    let mut gain = Envelope::new(0.07);
    gain.set_value_at(0.07, now).exponential_ramp_to(0.001, now + 0.15);

    Voice::new(Source::osc(Wave::Sine), sr, now, now + 0.2)
        .with_freq(Envelope::constant(660.0))
        .with_gain(gain)
}

/// Ascending major third (C5 → E5), 120 ms apart.
fn scene_chime(now: f64, sr: f32) -> Vec<Voice> {
    [523.25_f32, 659.25]
        .iter()
        .enumerate()
        .map(|(i, &hz)| {
            #[allow(clippy::cast_precision_loss)]
            let t = now + i as f64 * 0.12;
            let mut gain = Envelope::new(0.0);
            gain.set_value_at(0.0, t)
                .linear_ramp_to(0.06, t + 0.02)
                .exponential_ramp_to(0.001, t + 0.4);

            Voice::new(Source::osc(Wave::Sine), sr, t, t + 0.45)
                .with_freq(Envelope::constant(hz))
                .with_gain(gain)
        })
        .collect()
}

fn click(now: f64, sr: f32) -> Voice {
    let mut gain = Envelope::new(0.04);
    gain.set_value_at(0.04, now).exponential_ramp_to(0.001, now + 0.05);

    Voice::new(Source::osc(Wave::Square), sr, now, now + 0.06)
        .with_freq(Envelope::constant(1000.0))
        .with_filter(SvfMode::Lowpass, 0.707, Envelope::constant(1500.0))
        .with_gain(gain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Generator;

    const ALL: [Effect; 5] = [
        Effect::Transition,
        Effect::ParticleSpawn,
        Effect::Ping,
        Effect::SceneChime,
        Effect::Click,
    ];

    #[test]
    fn every_effect_stops_within_bound() {
        for fx in ALL {
            let voices = build(fx, 1.0, 48_000.0);
            assert!(!voices.is_empty(), "{fx}");
            for v in &voices {
                assert!(v.stop() > v.start());
                assert!(v.stop() <= 1.0 + MAX_EFFECT_SECONDS + 1e-9, "{fx} stops at {}", v.stop());
            }
        }
    }

    #[test]
    fn chime_notes_are_staggered() {
        let v = build(Effect::SceneChime, 0.0, 48_000.0);
        assert_eq!(v.len(), 2);
        assert!((v[1].start() - v[0].start() - 0.12).abs() < 1e-9);
    }

    #[test]
    fn effects_make_sound_then_silence() {
        let sr = 8_000.0;
        for fx in ALL {
            let mut voices = build(fx, 0.0, sr);
            let mut l = vec![0.0; 8_000];
            let mut r = vec![0.0; 8_000];
            for v in &mut voices {
                v.render_add(0.0, sr, &mut l, &mut r);
            }
            let head = l[..5_600].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
            let tail = l[5_600..].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
            assert!(head > 1e-3, "{fx} silent");
            assert_eq!(tail, 0.0, "{fx} rings past its stop time");
        }
    }
}
