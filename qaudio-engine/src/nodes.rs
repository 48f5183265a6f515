//! Building blocks (nodes) for synthesis subgraphs.
//!
//! Everything here is small and cheap to move; per-sample work never allocates.
//!
//! Contents:
//! - `Wave`, `Osc`     : basic oscillators (Sine/Square/Tri/Saw) with stable phase wrap
//! - `Lfo`             : low-frequency oscillator (same core as `Osc`), for modulation
//! - `NoiseBuffer`     : looping buffer of uniform white noise
//! - `PanLaw`          : constant-power panning helper
//! - `Voice`           : one transient subgraph, source → (filter) → gain, with automation
//! - `LoopPlayer`      : looping playback of a pre-rendered buffer
//!
//! Notes:
//! - Frequency is **Hz**; methods expect the current **sample rate** when stepping.
//! - Automation is evaluated per sample against absolute clock time, so a voice
//!   renders identically in the realtime graph and in an offline render.

use std::sync::Arc;

use qaudio_core::dsp::{fast_sin, TAU};
use qaudio_core::envelopes::Envelope;
use qaudio_core::filters::{Svf, SvfMode};
use rand::Rng;

use crate::error::RenderError;
use crate::graph::Generator;
use crate::render::LoopBuffer;

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Square, Tri, Saw }

#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine   => fast_sin(TAU * phase01),
        Wave::Square => if phase01 < 0.5 { 1.0 } else { -1.0 },
        Wave::Tri    => 4.0 * (phase01 - 0.5).abs() - 1.0,
        Wave::Saw    => 2.0 * phase01 - 1.0,
    }
}

/// Free-running oscillator. Not anti-aliased; fine for drones, chirps and LFO duties.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32,   // [0,1)
    freq:  f32,   // Hz
    wave:  Wave,
}

impl Osc {
    #[inline] pub fn new(freq_hz: f32, wave: Wave) -> Self { Self { phase: 0.0, freq: freq_hz, wave } }
    #[inline] pub fn set_freq(&mut self, hz: f32) { self.freq = hz.max(0.0); }

    /// Sample at the current phase, then advance one sample.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        let s = osc_sample(self.phase, self.wave);
        self.phase = (self.phase + self.freq / sr).fract();
        s
    }
}

/// Low-frequency sine oscillator.
#[derive(Copy, Clone, Debug)]
pub struct Lfo(Osc);
impl Lfo {
    #[inline] pub fn sine(rate_hz: f32) -> Self { Self(Osc::new(rate_hz, Wave::Sine)) }

    /// Next LFO value in **[-1,1]**.
    #[inline] pub fn next_norm(&mut self, sr: f32) -> f32 { self.0.next(sr) }
}

/// Uniform white noise in [-1, 1], looped end to end.
#[derive(Clone, Debug)]
pub struct NoiseBuffer {
    data: Arc<[f32]>,
    pos: usize,
}

impl NoiseBuffer {
    /// Fill `frames` samples from `rng`. Fails instead of aborting when the
    /// allocation cannot be satisfied.
    pub fn generate<R: Rng>(rng: &mut R, frames: usize) -> Result<Self, RenderError> {
        if frames == 0 {
            return Err(RenderError::InvalidSpec("noise buffer needs at least one frame"));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(frames)
            .map_err(|_| RenderError::Allocation { frames })?;
        data.extend((0..frames).map(|_| rng.gen_range(-1.0_f32..=1.0)));
        Ok(Self { data: data.into(), pos: 0 })
    }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    #[inline]
    pub fn next(&mut self) -> f32 {
        let s = self.data[self.pos];
        self.pos += 1;
        if self.pos >= self.data.len() { self.pos = 0; }
        s
    }
}

/// Constant-power panner helper.
#[derive(Copy, Clone, Debug)]
pub struct PanLaw;
impl PanLaw {
    /// Return (left, right) gains given `pan` in [-1..1], where -1 = hard left, +1 = hard right.
    #[inline]
    pub fn gains(pan: f32) -> (f32, f32) {
        let p = (pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * core::f32::consts::PI; // map to [0, π/2]
        (p.cos(), p.sin())
    }
}

/// Sound source at the head of a voice.
#[derive(Clone, Debug)]
pub enum Source {
    Osc(Osc),
    Noise(NoiseBuffer),
}

impl Source {
    #[inline]
    pub fn osc(wave: Wave) -> Self { Source::Osc(Osc::new(0.0, wave)) }

    #[inline]
    fn next(&mut self, freq: f32, sr: f32) -> f32 {
        match self {
            Source::Osc(o) => {
                o.set_freq(freq);
                o.next(sr)
            }
            Source::Noise(n) => n.next(),
        }
    }
}

/// An automated parameter: breakpoint envelope plus optional LFO offset.
#[derive(Clone, Debug)]
pub struct Param {
    env: Envelope,
    lfo: Option<(Lfo, f32)>,
}

impl Param {
    #[inline]
    pub fn new(env: Envelope) -> Self { Self { env, lfo: None } }

    #[inline]
    fn next(&mut self, t: f64, sr: f32) -> f32 {
        let base = self.env.value_at(t);
        match &mut self.lfo {
            Some((lfo, depth)) => base + *depth * lfo.next_norm(sr),
            None => base,
        }
    }

    #[inline]
    fn nodes(&self) -> usize {
        // LFO oscillator plus its depth gain.
        if self.lfo.is_some() { 2 } else { 0 }
    }
}

#[derive(Clone, Debug)]
struct FilterStage {
    svf: Svf,
    mode: SvfMode,
    cutoff: Param,
}

/// One transient synthesis subgraph: source → optional filter → gain → bus.
///
/// A voice is silent outside `[start, stop)` and is dropped by its bus at the
/// first block boundary after `stop`.
#[derive(Clone, Debug)]
pub struct Voice {
    source: Source,
    freq: Param,
    filter: Option<FilterStage>,
    gain: Param,
    pan: (f32, f32),
    sr: f32,
    start: f64,
    stop: f64,
}

impl Voice {
    pub fn new(source: Source, sr: f32, start: f64, stop: f64) -> Self {
        Self {
            source,
            freq: Param::new(Envelope::constant(440.0)),
            filter: None,
            gain: Param::new(Envelope::constant(1.0)),
            pan: (1.0, 1.0),
            sr,
            start,
            stop: stop.max(start),
        }
    }

    pub fn with_freq(mut self, env: Envelope) -> Self {
        self.freq.env = env;
        self
    }

    /// Periodic frequency wobble of `±depth_hz` at `rate_hz`.
    pub fn with_freq_lfo(mut self, rate_hz: f32, depth_hz: f32) -> Self {
        self.freq.lfo = Some((Lfo::sine(rate_hz), depth_hz));
        self
    }

    pub fn with_gain(mut self, env: Envelope) -> Self {
        self.gain.env = env;
        self
    }

    pub fn with_filter(mut self, mode: SvfMode, q: f32, cutoff: Envelope) -> Self {
        let initial = cutoff.value_at(self.start);
        self.filter = Some(FilterStage {
            svf: Svf::new(initial, q, self.sr),
            mode,
            cutoff: Param::new(cutoff),
        });
        self
    }

    /// Periodic cutoff sweep of `±depth_hz` at `rate_hz`. No-op without a filter.
    pub fn with_cutoff_lfo(mut self, rate_hz: f32, depth_hz: f32) -> Self {
        if let Some(f) = &mut self.filter {
            f.cutoff.lfo = Some((Lfo::sine(rate_hz), depth_hz));
        }
        self
    }

    /// Stereo placement via [`PanLaw`]. Unpanned voices feed both channels at unity.
    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = PanLaw::gains(pan);
        self
    }

    #[inline] pub fn start(&self) -> f64 { self.start }
    #[inline] pub fn stop(&self) -> f64 { self.stop }

    /// Synthesis nodes this voice stands for (source, gain, filter, modulators).
    pub fn node_count(&self) -> usize {
        let filter = self.filter.as_ref().map_or(0, |f| 1 + f.cutoff.nodes());
        2 + filter + self.freq.nodes() + self.gain.nodes()
    }

    #[inline]
    fn tick(&mut self, t: f64) -> f32 {
        let sr = self.sr;
        let freq = self.freq.next(t, sr);
        let mut x = self.source.next(freq, sr);
        if let Some(f) = &mut self.filter {
            let cut = f.cutoff.next(t, sr);
            f.svf.set_cutoff_hz(cut.max(10.0));
            x = f.svf.process(x, f.mode);
        }
        x * self.gain.next(t, sr)
    }
}

impl Generator for Voice {
    fn render_add(&mut self, t0: f64, sr: f32, left: &mut [f32], right: &mut [f32]) {
        let dt = 1.0 / f64::from(sr);
        let (gl, gr) = self.pan;
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let t = t0 + i as f64 * dt;
            if t < self.start || t >= self.stop {
                continue;
            }
            let s = self.tick(t);
            *l += s * gl;
            *r += s * gr;
        }
    }

    #[inline]
    fn is_finished(&self, t: f64) -> bool {
        t >= self.stop
    }
}

/// Looping playback of a pre-rendered buffer, starting at frame zero.
#[derive(Clone, Debug)]
pub struct LoopPlayer {
    buffer: Arc<LoopBuffer>,
    pos: usize,
}

impl LoopPlayer {
    pub fn new(buffer: Arc<LoopBuffer>) -> Self {
        Self { buffer, pos: 0 }
    }
}

impl Generator for LoopPlayer {
    fn render_add(&mut self, _t0: f64, _sr: f32, left: &mut [f32], right: &mut [f32]) {
        let frames = self.buffer.frames();
        if frames == 0 {
            return;
        }
        let (src_l, src_r) = self.buffer.channels();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l += src_l[self.pos];
            *r += src_r[self.pos];
            self.pos += 1;
            if self.pos >= frames { self.pos = 0; }
        }
    }

    /// Loops never finish on their own; the ambient session stops them.
    #[inline]
    fn is_finished(&self, _t: f64) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn voice_is_silent_outside_its_window() {
        let sr = 1000.0;
        let mut v = Voice::new(Source::osc(Wave::Square), sr, 0.1, 0.2)
            .with_freq(Envelope::constant(100.0));
        let mut l = vec![0.0; 300];
        let mut r = vec![0.0; 300];
        v.render_add(0.0, sr, &mut l, &mut r);
        assert!(l[..100].iter().all(|s| *s == 0.0));
        assert!(l[100..200].iter().any(|s| s.abs() > 0.5));
        assert!(l[200..].iter().all(|s| *s == 0.0));
        assert!(v.is_finished(0.2));
        assert!(!v.is_finished(0.19));
    }

    #[test]
    fn gain_envelope_shapes_output() {
        let sr = 1000.0;
        let mut gain = Envelope::new(0.0);
        gain.set_value_at(0.5, 0.0).linear_ramp_to(0.0, 0.1);
        let mut v = Voice::new(Source::osc(Wave::Square), sr, 0.0, 0.1)
            .with_freq(Envelope::constant(50.0))
            .with_gain(gain);
        let mut l = vec![0.0; 100];
        let mut r = vec![0.0; 100];
        v.render_add(0.0, sr, &mut l, &mut r);
        assert!((l[0].abs() - 0.5).abs() < 1e-6);
        assert!(l[99].abs() < 0.01);
    }

    #[test]
    fn pan_is_constant_power() {
        for pan in [-1.0, -0.3, 0.0, 0.6, 1.0] {
            let (l, r) = PanLaw::gains(pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn node_count_tracks_topology() {
        let sr = 48_000.0;
        let plain = Voice::new(Source::osc(Wave::Sine), sr, 0.0, 1.0);
        assert_eq!(plain.node_count(), 2);
        let full = Voice::new(Source::osc(Wave::Sine), sr, 0.0, 1.0)
            .with_freq_lfo(0.5, 3.0)
            .with_filter(SvfMode::Lowpass, 0.7, Envelope::constant(400.0))
            .with_cutoff_lfo(0.1, 200.0);
        assert_eq!(full.node_count(), 2 + 3 + 2);
    }

    #[test]
    fn noise_is_bounded_and_loops() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut n = NoiseBuffer::generate(&mut rng, 16).unwrap();
        let first: Vec<f32> = (0..16).map(|_| n.next()).collect();
        let second: Vec<f32> = (0..16).map(|_| n.next()).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(NoiseBuffer::generate(&mut rng, 0).is_err());
    }
}
