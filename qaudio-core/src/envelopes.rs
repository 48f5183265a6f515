//! Breakpoint automation for gain, frequency and cutoff parameters.
//!
//! An [`Envelope`] is an ordered list of `(time, value, curve)` breakpoints on an
//! external clock (seconds). The curve of a breakpoint describes how the value
//! travels *into* that breakpoint from the one before it:
//!
//! - `Step`        : hold the previous value, jump at the breakpoint time
//! - `Linear`      : straight line from the previous breakpoint
//! - `Exponential` : geometric approach from the previous breakpoint
//!
//! Before the first breakpoint the envelope sits at its initial value; after the
//! last one it holds the last value. A ramp with no breakpoint in front of it
//! holds the initial value until its own time.
//!
//! Exponential segments never target zero: targets are pulled up to
//! [`EXP_FLOOR`] because a geometric approach to zero never arrives.

use alloc::vec::Vec;

use crate::dsp::{lerp, pow};

/// Smallest magnitude an exponential segment may target.
pub const EXP_FLOOR: f32 = 1.0e-4;

/// Segment shape leading into a breakpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Curve {
    Step,
    Linear,
    Exponential,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Breakpoint {
    pub time: f64,
    pub value: f32,
    pub curve: Curve,
}

/// Automation timeline for one parameter.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    initial: f32,
    points: Vec<Breakpoint>,
}

impl Envelope {
    #[inline]
    pub fn new(initial: f32) -> Self {
        Self { initial, points: Vec::new() }
    }

    /// Envelope that never moves.
    #[inline]
    pub fn constant(value: f32) -> Self {
        Self::new(value)
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at(&mut self, value: f32, time: f64) -> &mut Self {
        self.insert(Breakpoint { time, value, curve: Curve::Step })
    }

    /// Linear ramp from the previous breakpoint to `value`, arriving at `end`.
    pub fn linear_ramp_to(&mut self, value: f32, end: f64) -> &mut Self {
        self.insert(Breakpoint { time: end, value, curve: Curve::Linear })
    }

    /// Exponential ramp from the previous breakpoint to `value`, arriving at `end`.
    /// Targets smaller than [`EXP_FLOOR`] are raised to it.
    pub fn exponential_ramp_to(&mut self, value: f32, end: f64) -> &mut Self {
        let value = if value.abs() < EXP_FLOOR { EXP_FLOOR } else { value };
        self.insert(Breakpoint { time: end, value, curve: Curve::Exponential })
    }

    /// Drop every breakpoint at or after `time`.
    pub fn cancel_from(&mut self, time: f64) {
        self.points.retain(|p| p.time < time);
    }

    /// Freeze the envelope at whatever value it has at `time`, discarding the future.
    /// Returns the held value.
    pub fn hold_at(&mut self, time: f64) -> f32 {
        let v = self.value_at(time);
        self.cancel_from(time);
        self.set_value_at(v, time);
        v
    }

    /// Forget breakpoints that can no longer influence values at or after `time`.
    pub fn prune_before(&mut self, time: f64) {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx > 1 {
            // The last breakpoint at or before `time` stays as the anchor.
            self.points.drain(..idx - 1);
        }
    }

    #[inline]
    pub fn points(&self) -> &[Breakpoint] {
        &self.points
    }

    /// Evaluate the envelope at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx == self.points.len() {
            return self.points.last().map_or(self.initial, |p| p.value);
        }

        let next = self.points[idx];
        let Some(prev) = idx.checked_sub(1).map(|i| self.points[i]) else {
            return self.initial;
        };

        let span = next.time - prev.time;
        if span <= 0.0 {
            return prev.value;
        }
        #[allow(clippy::cast_possible_truncation)]
        let frac = ((time - prev.time) / span) as f32;

        match next.curve {
            Curve::Step => prev.value,
            Curve::Linear => lerp(prev.value, next.value, frac),
            Curve::Exponential => {
                let same_sign = (prev.value > 0.0 && next.value > 0.0)
                    || (prev.value < 0.0 && next.value < 0.0);
                if same_sign {
                    prev.value * pow(next.value / prev.value, frac)
                } else {
                    prev.value
                }
            }
        }
    }

    fn insert(&mut self, bp: Breakpoint) -> &mut Self {
        // Equal times keep insertion order, so a set followed by a ramp at the same instant works.
        let idx = self.points.partition_point(|p| p.time <= bp.time);
        self.points.insert(idx, bp);
        self
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_initial_until_first_breakpoint() {
        let mut e = Envelope::new(0.25);
        e.set_value_at(1.0, 2.0);
        assert_eq!(e.value_at(0.0), 0.25);
        assert_eq!(e.value_at(1.999), 0.25);
        assert_eq!(e.value_at(2.0), 1.0);
        assert_eq!(e.value_at(10.0), 1.0);
    }

    #[test]
    fn linear_ramp_interpolates() {
        let mut e = Envelope::new(0.0);
        e.set_value_at(0.0, 1.0).linear_ramp_to(0.9, 4.0);
        assert!((e.value_at(2.5) - 0.45).abs() < 1e-5);
        assert!((e.value_at(4.0) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut e = Envelope::new(0.0);
        e.set_value_at(880.0, 0.0).exponential_ramp_to(220.0, 2.0);
        assert!((e.value_at(1.0) - 440.0).abs() < 0.05);
    }

    #[test]
    fn exponential_target_never_zero() {
        let mut e = Envelope::new(0.0);
        e.set_value_at(0.1, 0.0).exponential_ramp_to(0.0, 1.0);
        assert_eq!(e.points()[1].value, EXP_FLOOR);
        let v = e.value_at(0.999);
        assert!(v > 0.0 && v.is_finite());
    }

    #[test]
    fn hold_at_freezes_midway_then_new_ramp() {
        let mut e = Envelope::new(0.0);
        e.set_value_at(0.0, 0.0).linear_ramp_to(1.0, 2.0);
        let held = e.hold_at(1.0);
        assert!((held - 0.5).abs() < 1e-6);
        e.linear_ramp_to(0.0, 2.0);
        assert!((e.value_at(1.5) - 0.25).abs() < 1e-6);
        assert_eq!(e.value_at(3.0), 0.0);
    }

    #[test]
    fn prune_keeps_current_value() {
        let mut e = Envelope::new(0.0);
        e.set_value_at(0.0, 0.0)
            .linear_ramp_to(1.0, 1.0)
            .linear_ramp_to(0.0, 2.0);
        let before = e.value_at(1.5);
        e.prune_before(1.5);
        assert_eq!(e.points().len(), 2);
        assert!((e.value_at(1.5) - before).abs() < 1e-6);
    }
}
