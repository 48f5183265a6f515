//! Scalar math and block helpers shared by the filters, envelopes and bus graph.
//!
//! The transcendental functions go through one backend picked at compile time:
//! `micromath` when that feature is on, `libm` for `no-std` builds, and the
//! inherent `f32` methods otherwise. `fast-math` swaps the oscillator sine
//! (and the filter prewarp built on it) for a polynomial.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "micromath")] {
        mod backend {
            use micromath::F32Ext as _;
            #[inline] pub fn sin(x: f32) -> f32 { x.sin() }
            #[inline] pub fn tan(x: f32) -> f32 { x.tan() }
            #[inline] pub fn exp(x: f32) -> f32 { x.exp() }
            #[inline] pub fn powf(x: f32, y: f32) -> f32 { x.powf(y) }
        }
    } else if #[cfg(feature = "no-std")] {
        mod backend {
            #[inline] pub fn sin(x: f32) -> f32 { libm::sinf(x) }
            #[inline] pub fn tan(x: f32) -> f32 { libm::tanf(x) }
            #[inline] pub fn exp(x: f32) -> f32 { libm::expf(x) }
            #[inline] pub fn powf(x: f32, y: f32) -> f32 { libm::powf(x, y) }
        }
    } else {
        mod backend {
            #[inline] pub fn sin(x: f32) -> f32 { x.sin() }
            #[inline] pub fn tan(x: f32) -> f32 { x.tan() }
            #[inline] pub fn exp(x: f32) -> f32 { x.exp() }
            #[inline] pub fn powf(x: f32, y: f32) -> f32 { x.powf(y) }
        }
    }
}

pub const TAU: f32 = 2.0 * PI;

/// Magnitudes below this are flushed to zero in feedback paths.
pub const DENORMAL_FLOOR: f32 = 1.0e-20;

/// `x` limited to `[lo, hi]`. NaN maps to `lo` so a bad gain can never reach a bus.
#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x.is_nan() || x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < DENORMAL_FLOOR { 0.0 } else { x }
}

/// Output limiter: anything past full scale is cut flat.
#[inline]
pub fn hard_clip(x: f32) -> f32 {
    clamp(x, -1.0, 1.0)
}

#[inline]
pub fn pow(x: f32, y: f32) -> f32 {
    backend::powf(x, y)
}

/// Sine of `x` radians. Under `fast-math` this is a 5th-order odd polynomial
/// after reduction into `[-π, π]` (abs error around 1e-3).
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let r = x - (x / TAU).round() * TAU;
            let r2 = r * r;
            r * (0.999_979_313_3 + r2 * (-0.166_624_432_0 + r2 * 0.008_308_978_98))
        } else {
            backend::sin(x)
        }
    }
}

/// Pole of a leaky integrator with corner `cut_hz`: `exp(-2π fc / sr)`.
#[inline]
pub fn pole_for(cut_hz: f32, sr: f32) -> f32 {
    let fc = clamp(cut_hz, 0.0, 0.499 * sr);
    backend::exp(-TAU * fc / sr)
}

/// Bilinear prewarp `tan(π fc / sr)` for the state-variable filter. The cutoff
/// is held below Nyquist so a swept cutoff can never blow the filter up.
#[inline]
pub fn tpt_g(cut_hz: f32, sr: f32) -> f32 {
    let w = PI * clamp(cut_hz, 1.0, 0.49 * sr) / sr;
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            fast_sin(w) / fast_sin(w + 0.5 * PI)
        } else {
            backend::tan(w)
        }
    }
}

#[cfg(feature = "simd")]
fn lanes(chunk: &[f32]) -> wide::f32x8 {
    let mut a = [0.0_f32; 8];
    a.copy_from_slice(chunk);
    wide::f32x8::from(a)
}

/// `dst[i] += src[i] * gain`. Slices of different length are left alone.
#[inline]
pub fn mix_in_place(dst: &mut [f32], src: &[f32], gain: f32) {
    if dst.len() != src.len() {
        return;
    }
    cfg_if! {
        if #[cfg(feature = "simd")] {
            let g = wide::f32x8::splat(gain);
            let mut d8 = dst.chunks_exact_mut(8);
            let mut s8 = src.chunks_exact(8);
            for (d, s) in (&mut d8).zip(&mut s8) {
                d.copy_from_slice(&(lanes(d) + lanes(s) * g).to_array());
            }
            for (d, s) in d8.into_remainder().iter_mut().zip(s8.remainder()) {
                *d += *s * gain;
            }
        } else {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s * gain;
            }
        }
    }
}

/// `dst[i] *= gains[i]`, the per-sample bus automation. Slices of different length are left alone.
#[inline]
pub fn mul_in_place(dst: &mut [f32], gains: &[f32]) {
    if dst.len() != gains.len() {
        return;
    }
    cfg_if! {
        if #[cfg(feature = "simd")] {
            let mut d8 = dst.chunks_exact_mut(8);
            let mut g8 = gains.chunks_exact(8);
            for (d, g) in (&mut d8).zip(&mut g8) {
                d.copy_from_slice(&(lanes(d) * lanes(g)).to_array());
            }
            for (d, g) in d8.into_remainder().iter_mut().zip(g8.remainder()) {
                *d *= *g;
            }
        } else {
            for (d, g) in dst.iter_mut().zip(gains) {
                *d *= *g;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_handles_range_and_nan() {
        assert_eq!(clamp(-0.5, 0.0, 1.0), 0.0);
        assert_eq!(clamp(1.5, 0.0, 1.0), 1.0);
        assert_eq!(clamp(0.25, 0.0, 1.0), 0.25);
        assert_eq!(clamp(f32::NAN, 0.0, 1.0), 0.0);
        assert_eq!(hard_clip(-3.0), -1.0);
    }

    #[test]
    fn mix_and_mul_agree_with_scalar() {
        let src = [1.0_f32; 11];
        let mut dst = [0.5_f32; 11];
        mix_in_place(&mut dst, &src, 0.5);
        assert!(dst.iter().all(|v| (v - 1.0).abs() < 1e-6));

        mul_in_place(&mut dst, &[0.5; 11]);
        assert!(dst.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn mismatched_lengths_are_ignored() {
        let mut dst = [1.0_f32; 4];
        mix_in_place(&mut dst, &[1.0; 3], 1.0);
        mul_in_place(&mut dst, &[0.0; 5]);
        assert_eq!(dst, [1.0; 4]);
    }

    #[test]
    fn prewarp_stays_finite_above_nyquist() {
        let g = tpt_g(40_000.0, 48_000.0);
        assert!(g.is_finite() && g > 0.0);
    }

    #[test]
    fn pole_is_inside_unit_circle() {
        let p = pole_for(5.0, 48_000.0);
        assert!(p > 0.99 && p < 1.0);
        assert_eq!(pole_for(0.0, 48_000.0), 1.0);
    }
}
