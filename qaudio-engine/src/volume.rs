//! Volume controller: bus gain get/set/clamp and mute with last-value memory.
//!
//! Every operation tolerates a missing context (before activation): setters
//! are no-ops and the master getter reports [`DEFAULT_MASTER_GAIN`].

use qaudio_core::dsp::clamp;
use tracing::debug;

use crate::config::DEFAULT_MASTER_GAIN;
use crate::context::EngineContext;
use crate::graph::BusId;

#[derive(Debug)]
pub struct VolumeController {
    /// Master level saved by the last mute.
    last_volume: Option<f32>,
    declick_seconds: f64,
}

impl VolumeController {
    pub fn new(declick_seconds: f64) -> Self {
        Self { last_volume: None, declick_seconds }
    }

    /// Clamp `v` to [0, 1] and apply it to `bus`. Buses carrying audio glide
    /// over a short de-click ramp; idle ones jump.
    pub fn set_bus_gain(&self, ctx: Option<&mut EngineContext>, bus: BusId, v: f32) {
        let Some(ctx) = ctx else {
            debug!(%bus, "volume change before activation ignored");
            return;
        };
        let level = clamp(v, 0.0, 1.0);
        let ramp = ctx.is_bus_active(bus).then_some(self.declick_seconds);
        let now = ctx.now();
        ctx.bus_mut(bus).set_level(level, now, ramp);
        debug!(%bus, level, "bus gain set");
    }

    /// Clamp and store `v` as the level `bus` reports, leaving its running
    /// automation alone. Used while a fade must run to completion.
    pub fn record_bus_level(&self, ctx: Option<&mut EngineContext>, bus: BusId, v: f32) {
        let Some(ctx) = ctx else {
            return;
        };
        let level = clamp(v, 0.0, 1.0);
        ctx.bus_mut(bus).remember_level(level);
        debug!(%bus, level, "bus level recorded, fade left running");
    }

    pub fn master_gain(&self, ctx: Option<&EngineContext>) -> f32 {
        ctx.map_or(DEFAULT_MASTER_GAIN, |c| c.bus(BusId::Master).level())
    }

    /// Exactly zero master gain. Never muted before activation.
    pub fn is_muted(&self, ctx: Option<&EngineContext>) -> bool {
        ctx.is_some_and(|c| c.bus(BusId::Master).level() == 0.0)
    }

    /// Mute remembering the current master level, or restore the remembered level.
    pub fn toggle_mute(&mut self, ctx: Option<&mut EngineContext>) {
        let Some(ctx) = ctx else {
            return;
        };
        let current = ctx.bus(BusId::Master).level();
        if current > 0.0 {
            self.last_volume = Some(current);
            self.set_bus_gain(Some(ctx), BusId::Master, 0.0);
        } else {
            let restore = self.last_volume.unwrap_or(DEFAULT_MASTER_GAIN);
            self.set_bus_gain(Some(ctx), BusId::Master, restore);
        }
    }
}
