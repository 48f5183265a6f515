//! Offline (non-realtime) rendering of the ambient loop.
//!
//! The loop is five layers mixed into a fixed-length buffer:
//!
//! 1. sub-bass drone (55 Hz sine with a slow frequency wobble)
//! 2. fifth-harmony pad (82.5 Hz sine)
//! 3. shimmer (165 Hz sine through a periodically swept low-pass)
//! 4. noise bed (looped white noise through a periodically swept band-pass)
//! 5. baked sparkle (high-passed pings at random times, pitches, levels and pans)
//!
//! Every modulation rate is snapped to a whole number of cycles per loop so the
//! wrap point does not click. The bed is pre-rolled for half a second
//! before frame zero, so the filters and the DC blocker are already settled
//! when the loop starts, just as they are when it ends.
//!
//! Rendering happens off the realtime path behind the [`OfflineRenderer`]
//! trait. A submitted job hands back a [`PendingRender`] tagged with the
//! ambient generation that asked for it; the engine polls it and decides
//! whether the result is still wanted.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use qaudio_core::envelopes::Envelope;
use qaudio_core::filters::{DcBlock, SvfMode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::RenderError;
use crate::graph::Generator;
use crate::nodes::{NoiseBuffer, Source, Voice, Wave};

const SUB_HZ: f32 = 55.0;
const SUB_GAIN: f32 = 0.12;
const SUB_WOBBLE_HZ: f32 = 0.4;
const SUB_WOBBLE_DEPTH: f32 = 3.0;

const PAD_HZ: f32 = SUB_HZ * 1.5;
const PAD_GAIN: f32 = 0.06;

const SHIMMER_HZ: f32 = PAD_HZ * 2.0;
const SHIMMER_GAIN: f32 = 0.03;
const SHIMMER_CUTOFF: f32 = 400.0;
const SHIMMER_SWEEP_DEPTH: f32 = 200.0;
const SHIMMER_SWEEP_HZ: f32 = 0.07;

const NOISE_SECONDS: f64 = 4.0;
const NOISE_GAIN: f32 = 0.015;
const NOISE_CENTER: f32 = 300.0;
const NOISE_Q: f32 = 0.5;
const NOISE_SWEEP_DEPTH: f32 = 150.0;
const NOISE_SWEEP_HZ: f32 = 0.02;

/// Baked sparkle ranges.
const PING_FREQ: (f32, f32) = (1800.0, 4200.0);
const PING_PEAK: (f32, f32) = (0.01, 0.03);
const PING_ATTACK: f64 = 0.005;
const PING_DECAY: (f64, f64) = (0.3, 0.8);
const PING_FLOOR: f32 = 0.0005;
const PING_HIGHPASS: f32 = 1500.0;
const PING_PAN: f32 = 0.8;

const RENDER_BLOCK: usize = 1024;

/// Bed rendered and discarded ahead of frame zero.
const PREROLL_SECONDS: f64 = 0.5;

/// Shape of the loop to render.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopSpec {
    pub sample_rate: f32,
    pub seconds: f64,
    pub channels: usize,
    pub baked_sparkles: usize,
}

impl LoopSpec {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            seconds: cfg.ambient.loop_seconds,
            channels: cfg.ambient.loop_channels,
            baked_sparkles: cfg.ambient.baked_sparkles,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn frames(&self) -> usize {
        (self.seconds * f64::from(self.sample_rate)).round() as usize
    }

    /// Nearest rate that fits a whole number (at least one) of cycles into the loop.
    #[allow(clippy::cast_possible_truncation)]
    pub fn snap_rate(&self, rate_hz: f32) -> f32 {
        let cycles = (f64::from(rate_hz) * self.seconds).round().max(1.0);
        (cycles / self.seconds) as f32
    }
}

/// A rendered loop. Mono loops carry the same samples on both sides.
#[derive(Clone, Debug)]
pub struct LoopBuffer {
    sample_rate: f32,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl LoopBuffer {
    #[inline] pub fn sample_rate(&self) -> f32 { self.sample_rate }
    #[inline] pub fn frames(&self) -> usize { self.left.len() }

    #[inline]
    pub fn channels(&self) -> (&[f32], &[f32]) {
        (&self.left, &self.right)
    }

    pub fn peak(&self) -> f32 {
        self.left.iter().chain(self.right.iter()).fold(0.0_f32, |m, s| m.max(s.abs()))
    }
}

/// One offline render request.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub generation: u64,
    pub spec: LoopSpec,
    pub seed: u64,
}

/// Synthesize the ambient loop for `spec`, drawing every random choice from `seed`.
pub fn render_loop(spec: &LoopSpec, seed: u64) -> Result<LoopBuffer, RenderError> {
    if !(spec.sample_rate.is_finite() && spec.sample_rate > 0.0) {
        return Err(RenderError::InvalidSpec("sample rate must be positive"));
    }
    if !(1..=2).contains(&spec.channels) {
        return Err(RenderError::InvalidSpec("loop must be mono or stereo"));
    }
    let frames = spec.frames();
    if frames == 0 {
        return Err(RenderError::InvalidSpec("loop is shorter than one frame"));
    }

    let sr = spec.sample_rate;
    let dt = 1.0 / f64::from(sr);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let preroll = (PREROLL_SECONDS * f64::from(sr)).round() as usize;
    #[allow(clippy::cast_precision_loss)]
    let bed_start = -(preroll as f64) * dt;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut voices = drone_layers(spec, bed_start, &mut rng)?;
    voices.extend(baked_sparkles(spec, &mut rng));

    let mut left = alloc_zeroed(frames)?;
    let mut right = alloc_zeroed(frames)?;
    let mut dc_l = DcBlock::new(5.0, sr);
    let mut dc_r = DcBlock::new(5.0, sr);

    let mut warm_l = alloc_zeroed(RENDER_BLOCK.min(preroll))?;
    let mut warm_r = alloc_zeroed(RENDER_BLOCK.min(preroll))?;
    let mut offset = 0;
    while offset < preroll {
        let n = (preroll - offset).min(RENDER_BLOCK);
        let (l, r) = (&mut warm_l[..n], &mut warm_r[..n]);
        l.fill(0.0);
        r.fill(0.0);
        #[allow(clippy::cast_precision_loss)]
        let t0 = bed_start + offset as f64 * dt;
        render_block(&mut voices, t0, sr, l, r);
        dc_block(&mut dc_l, l);
        dc_block(&mut dc_r, r);
        offset += n;
    }

    offset = 0;
    while offset < frames {
        let end = (offset + RENDER_BLOCK).min(frames);
        let (l, r) = (&mut left[offset..end], &mut right[offset..end]);
        #[allow(clippy::cast_precision_loss)]
        let t0 = offset as f64 * dt;
        render_block(&mut voices, t0, sr, l, r);
        dc_block(&mut dc_l, l);
        dc_block(&mut dc_r, r);
        offset = end;
    }

    if spec.channels == 1 {
        for (l, r) in left.iter_mut().zip(right.iter()) {
            *l = 0.5 * (*l + *r);
        }
        right.copy_from_slice(&left);
    }

    Ok(LoopBuffer { sample_rate: sr, left, right })
}

fn render_block(voices: &mut [Voice], t0: f64, sr: f32, left: &mut [f32], right: &mut [f32]) {
    #[allow(clippy::cast_precision_loss)]
    let t1 = t0 + left.len() as f64 / f64::from(sr);
    for v in voices {
        if v.start() < t1 && !v.is_finished(t0) {
            v.render_add(t0, sr, left, right);
        }
    }
}

fn dc_block(dc: &mut DcBlock, buf: &mut [f32]) {
    for s in buf {
        *s = dc.process(*s);
    }
}

fn alloc_zeroed(frames: usize) -> Result<Vec<f32>, RenderError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(frames)
        .map_err(|_| RenderError::Allocation { frames })?;
    buf.resize(frames, 0.0);
    Ok(buf)
}

/// Layers 1–4: the continuous bed, running from `start` (at or before zero)
/// to the end of the loop.
fn drone_layers(spec: &LoopSpec, start: f64, rng: &mut StdRng) -> Result<Vec<Voice>, RenderError> {
    let sr = spec.sample_rate;
    let end = spec.seconds;

    let sub = Voice::new(Source::osc(Wave::Sine), sr, start, end)
        .with_freq(Envelope::constant(SUB_HZ))
        .with_freq_lfo(spec.snap_rate(SUB_WOBBLE_HZ), SUB_WOBBLE_DEPTH)
        .with_gain(Envelope::constant(SUB_GAIN));

    let pad = Voice::new(Source::osc(Wave::Sine), sr, start, end)
        .with_freq(Envelope::constant(PAD_HZ))
        .with_gain(Envelope::constant(PAD_GAIN));

    let shimmer = Voice::new(Source::osc(Wave::Sine), sr, start, end)
        .with_freq(Envelope::constant(SHIMMER_HZ))
        .with_filter(SvfMode::Lowpass, 0.707, Envelope::constant(SHIMMER_CUTOFF))
        .with_cutoff_lfo(spec.snap_rate(SHIMMER_SWEEP_HZ), SHIMMER_SWEEP_DEPTH)
        .with_gain(Envelope::constant(SHIMMER_GAIN));

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let noise_frames = (NOISE_SECONDS.min(spec.seconds) * f64::from(sr)).round() as usize;
    let noise = Voice::new(Source::Noise(NoiseBuffer::generate(rng, noise_frames)?), sr, start, end)
        .with_filter(SvfMode::Bandpass, NOISE_Q, Envelope::constant(NOISE_CENTER))
        .with_cutoff_lfo(spec.snap_rate(NOISE_SWEEP_HZ), NOISE_SWEEP_DEPTH)
        .with_gain(Envelope::constant(NOISE_GAIN));

    Ok(vec![sub, pad, shimmer, noise])
}

/// Layer 5: pings scattered uniformly over the loop, each finishing before the wrap.
fn baked_sparkles(spec: &LoopSpec, rng: &mut StdRng) -> Vec<Voice> {
    let sr = spec.sample_rate;
    let latest = (spec.seconds - PING_ATTACK - PING_DECAY.1).max(0.0);
    (0..spec.baked_sparkles)
        .map(|_| {
            let t = if latest > 0.0 { rng.gen_range(0.0..latest) } else { 0.0 };
            let freq = rng.gen_range(PING_FREQ.0..PING_FREQ.1);
            let peak = rng.gen_range(PING_PEAK.0..PING_PEAK.1);
            let decay = rng.gen_range(PING_DECAY.0..PING_DECAY.1);
            let pan = rng.gen_range(-PING_PAN..PING_PAN);

            let mut gain = Envelope::new(0.0);
            gain.set_value_at(0.0, t)
                .linear_ramp_to(peak, t + PING_ATTACK)
                .exponential_ramp_to(PING_FLOOR, t + PING_ATTACK + decay);

            Voice::new(Source::osc(Wave::Sine), sr, t, t + PING_ATTACK + decay)
                .with_freq(Envelope::constant(freq))
                .with_filter(SvfMode::Highpass, 0.707, Envelope::constant(PING_HIGHPASS))
                .with_gain(gain)
                .with_pan(pan)
        })
        .collect()
}

// --------------------------------- Renderers -------------------------------------

/// Sending half of a pending render; whoever computes the loop resolves it.
#[derive(Debug)]
pub struct RenderCompleter {
    tx: Sender<Result<LoopBuffer, RenderError>>,
}

impl RenderCompleter {
    /// Deliver the result. A dropped [`PendingRender`] just means nobody cares anymore.
    pub fn complete(self, result: Result<LoopBuffer, RenderError>) {
        if self.tx.send(result).is_err() {
            debug!("offline render finished after its receiver was dropped");
        }
    }
}

/// Receiving half of an offline render, tagged with the requesting generation.
#[derive(Debug)]
pub struct PendingRender {
    generation: u64,
    rx: Receiver<Result<LoopBuffer, RenderError>>,
}

impl PendingRender {
    /// Linked pair for custom renderers.
    pub fn channel(generation: u64) -> (RenderCompleter, PendingRender) {
        let (tx, rx) = mpsc::channel();
        (RenderCompleter { tx }, PendingRender { generation, rx })
    }

    /// Already-resolved render.
    pub fn ready(generation: u64, result: Result<LoopBuffer, RenderError>) -> Self {
        let (completer, pending) = Self::channel(generation);
        completer.complete(result);
        pending
    }

    #[inline] pub fn generation(&self) -> u64 { self.generation }

    /// Non-blocking check. `None` while the render is still in flight.
    pub fn poll(&mut self) -> Option<Result<LoopBuffer, RenderError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RenderError::WorkerLost)),
        }
    }
}

/// Non-realtime render capability.
pub trait OfflineRenderer: Send {
    /// Start rendering `job` and return immediately.
    fn submit(&mut self, job: RenderJob) -> PendingRender;
}

/// Renders each job on its own short-lived worker thread.
#[derive(Debug, Default)]
pub struct ThreadRenderer;

impl OfflineRenderer for ThreadRenderer {
    fn submit(&mut self, job: RenderJob) -> PendingRender {
        let (completer, pending) = PendingRender::channel(job.generation);
        let generation = job.generation;
        let spawned = thread::Builder::new()
            .name(format!("qaudio-render-{generation}"))
            .spawn(move || {
                let result = render_loop(&job.spec, job.seed);
                completer.complete(result);
            });
        match spawned {
            Ok(_) => pending,
            Err(e) => {
                warn!(generation, "could not spawn offline render worker: {e}");
                PendingRender::ready(generation, Err(RenderError::Spawn(e)))
            }
        }
    }
}

/// Renders synchronously inside `submit`; the result is still only observed on
/// the next poll, so callers see the same `Rendering` window as with a thread.
#[derive(Debug, Default)]
pub struct InlineRenderer;

impl OfflineRenderer for InlineRenderer {
    fn submit(&mut self, job: RenderJob) -> PendingRender {
        PendingRender::ready(job.generation, render_loop(&job.spec, job.seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_spec() -> LoopSpec {
        LoopSpec { sample_rate: 8_000.0, seconds: 2.0, channels: 2, baked_sparkles: 5 }
    }

    #[test]
    fn renders_requested_length() {
        let buf = render_loop(&small_spec(), 1).unwrap();
        assert_eq!(buf.frames(), 16_000);
        assert_eq!(buf.sample_rate(), 8_000.0);
        let p = buf.peak();
        assert!(p > 0.01 && p < 1.0, "peak {p}");
    }

    #[test]
    fn same_seed_same_loop() {
        let a = render_loop(&small_spec(), 42).unwrap();
        let b = render_loop(&small_spec(), 42).unwrap();
        assert_eq!(a.channels(), b.channels());
    }

    #[test]
    fn mono_loop_has_identical_sides() {
        let spec = LoopSpec { channels: 1, ..small_spec() };
        let buf = render_loop(&spec, 3).unwrap();
        let (l, r) = buf.channels();
        assert_eq!(l, r);
    }

    #[test]
    fn loop_wraps_without_a_step() {
        let spec = LoopSpec { baked_sparkles: 0, ..small_spec() };
        let buf = render_loop(&spec, 9).unwrap();
        let (l, r) = buf.channels();
        for side in [l, r] {
            let inner = side.windows(2).fold(0.0_f32, |m, w| m.max((w[1] - w[0]).abs()));
            let wrap = (side[0] - side[side.len() - 1]).abs();
            assert!(wrap <= 1.5 * inner, "wrap {wrap} vs inner {inner}");
        }
    }

    #[test]
    fn rejects_degenerate_specs() {
        let zero = LoopSpec { seconds: 0.0, ..small_spec() };
        assert!(matches!(render_loop(&zero, 0), Err(RenderError::InvalidSpec(_))));
        let surround = LoopSpec { channels: 6, ..small_spec() };
        assert!(matches!(render_loop(&surround, 0), Err(RenderError::InvalidSpec(_))));
    }

    #[test]
    fn snapped_rates_fit_whole_cycles() {
        let spec = LoopSpec { seconds: 16.0, ..small_spec() };
        assert!((spec.snap_rate(0.4) - 0.375).abs() < 1e-6);
        assert!((spec.snap_rate(0.02) - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn pending_render_reports_lost_worker() {
        let (completer, mut pending) = PendingRender::channel(9);
        assert!(pending.poll().is_none());
        drop(completer);
        assert!(matches!(pending.poll(), Some(Err(RenderError::WorkerLost))));
    }

    #[test]
    fn thread_renderer_delivers() {
        let mut r = ThreadRenderer;
        let mut pending = r.submit(RenderJob { generation: 4, spec: small_spec(), seed: 5 });
        assert_eq!(pending.generation(), 4);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(30);
        let result = loop {
            if let Some(res) = pending.poll() {
                break res;
            }
            assert!(std::time::Instant::now() < deadline, "render never completed");
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert_eq!(result.unwrap().frames(), 16_000);
    }
}
