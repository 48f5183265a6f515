//! Filters used by the voices and the loop renderer.
//!
//! - [`DcBlock`] : leaky-integrator high-pass with a very low corner
//! - [`Svf`]     : zero-delay-feedback state-variable filter (Simper's
//!   trapezoidal form) with low/high/band-pass taps
//!
//! The SVF stays stable under per-sample cutoff modulation, which is how every
//! swept filter in the engine (shimmer, noise bed, transition sweep) is driven.

use crate::dsp::{kill_denormals, pole_for, tpt_g};

/// `y[n] = x[n] - x[n-1] + p * y[n-1]` with `p = exp(-2π fc / sr)`.
#[derive(Copy, Clone, Debug)]
pub struct DcBlock {
    pole: f32,
    prev_in: f32,
    prev_out: f32,
}

impl DcBlock {
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        Self { pole: pole_for(cut_hz, sr.max(1.0)), prev_in: 0.0, prev_out: 0.0 }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = kill_denormals(x - self.prev_in + self.pole * self.prev_out);
        self.prev_in = x;
        self.prev_out = y;
        y
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SvfMode {
    Lowpass,
    Highpass,
    Bandpass,
}

/// One sample of every SVF output.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SvfTaps {
    pub low: f32,
    pub band: f32,
    pub high: f32,
}

impl SvfTaps {
    #[inline]
    pub fn pick(self, mode: SvfMode) -> f32 {
        match mode {
            SvfMode::Lowpass => self.low,
            SvfMode::Highpass => self.high,
            SvfMode::Bandpass => self.band,
        }
    }
}

/// State-variable filter. `q` is clamped to a small positive minimum; the
/// cutoff is clamped below Nyquist when the coefficients are computed.
#[derive(Copy, Clone, Debug)]
pub struct Svf {
    sr: f32,
    cutoff: f32,
    q: f32,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    s1: f32,
    s2: f32,
}

impl Svf {
    pub fn new(cutoff_hz: f32, q: f32, sr: f32) -> Self {
        let mut f = Self {
            sr: sr.max(1.0),
            cutoff: cutoff_hz.max(0.0),
            q: q.max(1e-4),
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            s1: 0.0,
            s2: 0.0,
        };
        f.update();
        f
    }

    /// Retune. The coefficients are only recomputed when the value moved.
    #[inline]
    pub fn set_cutoff_hz(&mut self, cutoff_hz: f32) {
        let c = cutoff_hz.max(0.0);
        if c != self.cutoff {
            self.cutoff = c;
            self.update();
        }
    }

    fn update(&mut self) {
        let g = tpt_g(self.cutoff, self.sr);
        self.k = 1.0 / self.q;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    #[inline]
    pub fn tick(&mut self, x: f32) -> SvfTaps {
        let v3 = x - self.s2;
        let band = self.a1 * self.s1 + self.a2 * v3;
        let low = self.s2 + self.a2 * self.s1 + self.a3 * v3;
        self.s1 = kill_denormals(2.0 * band - self.s1);
        self.s2 = kill_denormals(2.0 * low - self.s2);

        let high = x - self.k * band - low;
        SvfTaps { low, band, high }
    }

    #[inline]
    pub fn process(&mut self, x: f32, mode: SvfMode) -> f32 {
        self.tick(x).pick(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn dc_block_settles_to_zero() {
        let mut dc = DcBlock::new(20.0, SR);
        let mut y = 1.0;
        for _ in 0..48_000 {
            y = dc.process(1.0);
        }
        assert!(y.abs() < 1e-2, "y={y}");
    }

    #[test]
    fn lowpass_has_unity_dc_gain() {
        let mut f = Svf::new(1000.0, 0.707, SR);
        let mut y = 0.0;
        for _ in 0..48_000 {
            y = f.process(1.0, SvfMode::Lowpass);
        }
        assert!((y - 1.0).abs() < 1e-3, "lp dc gain {y}");
    }

    #[test]
    fn high_and_band_reject_dc() {
        let mut f = Svf::new(1000.0, 0.5, SR);
        let mut taps = SvfTaps::default();
        for _ in 0..48_000 {
            taps = f.tick(1.0);
        }
        assert!(taps.band.abs() < 1e-3 && taps.high.abs() < 1e-3, "{taps:?}");
    }

    #[test]
    fn stays_bounded_under_hard_sweeps() {
        let mut f = Svf::new(300.0, 0.5, SR);
        let mut peak = 0.0_f32;
        for i in 0..48_000 {
            f.set_cutoff_hz(if i % 64 < 32 { 150.0 } else { 12_000.0 });
            let x = if i % 100 < 50 { 1.0 } else { -1.0 };
            peak = peak.max(f.process(x, SvfMode::Bandpass).abs());
        }
        assert!(peak.is_finite() && peak < 10.0, "peak {peak}");
    }
}
