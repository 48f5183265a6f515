#![cfg_attr(not(feature = "std"), no_std)]
//! qaudio core: allocation-light DSP building blocks for the engine.
//!
//! Features
//! - `std`       : (default) standard library math
//! - `no-std`    : `#![no_std]` + `alloc`, math through `libm`
//! - `micromath` : math through `micromath` instead
//! - `fast-math` : polynomial sine for oscillators and filter prewarp
//! - `simd`      : `wide`-based block mixing
//!
//! Times are `f64` seconds on the engine clock; samples are `f32`.

extern crate alloc;

pub mod dsp;
pub mod envelopes;
pub mod filters;

pub mod prelude {
    pub use crate::dsp::{clamp, fast_sin, hard_clip, mix_in_place, mul_in_place, TAU};
    pub use crate::envelopes::{Breakpoint, Curve, Envelope, EXP_FLOOR};
    pub use crate::filters::{DcBlock, Svf, SvfMode, SvfTaps};
}

#[cfg(test)]
mod smoke {
    use crate::prelude::*;

    #[test]
    fn filtered_ramp_is_finite() {
        let mut env = Envelope::new(0.0);
        env.set_value_at(0.0, 0.0).linear_ramp_to(1.0, 1.0);
        let mut svf = Svf::new(1000.0, 0.707, 48_000.0);
        let y = svf.process(env.value_at(0.5), SvfMode::Lowpass);
        assert!(y.is_finite());
    }
}
