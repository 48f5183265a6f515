//! Engine context: the clock and the three buses, created once on activation.

use std::sync::Arc;

use qaudio_core::dsp::hard_clip;
use tracing::info;

use crate::config::EngineConfig;
use crate::graph::{AudioClock, Bus, BusId};
use crate::nodes::{LoopPlayer, Voice};
use crate::render::LoopBuffer;

#[derive(Debug)]
pub struct EngineContext {
    sample_rate: f32,
    clock: AudioClock,
    master: Bus,
    ambient: Bus,
    sfx: Bus,
}

impl EngineContext {
    /// Build the buses with their configured gains and wire
    /// ambient → master, sfx → master, master → output.
    pub fn new(cfg: &EngineConfig) -> Self {
        let ctx = Self {
            sample_rate: cfg.sample_rate,
            clock: AudioClock::new(cfg.sample_rate),
            master: Bus::new(BusId::Master, cfg.master_gain),
            ambient: Bus::new(BusId::Ambient, cfg.ambient_gain),
            sfx: Bus::new(BusId::Sfx, cfg.sfx_gain),
        };
        info!(
            sample_rate = ctx.sample_rate,
            master = cfg.master_gain,
            ambient = cfg.ambient_gain,
            sfx = cfg.sfx_gain,
            "audio context created"
        );
        ctx
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sample_rate }
    #[inline] pub fn now(&self) -> f64 { self.clock.now() }

    pub fn bus(&self, id: BusId) -> &Bus {
        match id {
            BusId::Master => &self.master,
            BusId::Ambient => &self.ambient,
            BusId::Sfx => &self.sfx,
        }
    }

    pub fn bus_mut(&mut self, id: BusId) -> &mut Bus {
        match id {
            BusId::Master => &mut self.master,
            BusId::Ambient => &mut self.ambient,
            BusId::Sfx => &mut self.sfx,
        }
    }

    /// True while audio flows through `id`. Master carries whatever its inputs carry.
    pub fn is_bus_active(&self, id: BusId) -> bool {
        match id {
            BusId::Master => self.ambient.has_sources() || self.sfx.has_sources(),
            other => self.bus(other).has_sources(),
        }
    }

    pub fn add_voice(&mut self, id: BusId, voice: Voice) {
        self.bus_mut(id).add_voice(voice);
    }

    /// Begin looping `buffer` on the ambient bus from its first frame.
    pub fn start_loop(&mut self, buffer: Arc<LoopBuffer>) {
        self.ambient.set_loop(LoopPlayer::new(buffer));
    }

    /// Stop and release the ambient loop. Returns whether one was playing.
    pub fn stop_loop(&mut self) -> bool {
        self.ambient.take_loop().is_some()
    }

    #[inline] pub fn has_loop(&self) -> bool { self.ambient.has_loop() }

    pub fn live_voices(&self) -> usize {
        self.ambient.voice_count() + self.sfx.voice_count()
    }

    pub fn live_nodes(&self) -> usize {
        self.ambient.node_count() + self.sfx.node_count()
    }

    /// Render one slice into interleaved `out`, advance the clock and release
    /// voices that have finished by the end of the slice.
    ///
    /// Channel 0 gets left, channel 1 right, further channels alternate; mono
    /// output gets the average. Frames that don't fit a whole channel group are zeroed.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;
        let t0 = self.clock.now();
        let sr = self.sample_rate;

        self.ambient.begin_block(frames);
        self.sfx.begin_block(frames);
        self.master.begin_block(frames);

        self.ambient.render_sources(t0, sr);
        self.sfx.render_sources(t0, sr);
        self.ambient.apply_gain(t0, sr);
        self.sfx.apply_gain(t0, sr);

        self.master.mix_from(&self.ambient);
        self.master.mix_from(&self.sfx);
        self.master.apply_gain(t0, sr);

        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let l = hard_clip(self.master.left[i]);
            let r = hard_clip(self.master.right[i]);
            if channels == 1 {
                frame[0] = 0.5 * (l + r);
            } else {
                for (c, s) in frame.iter_mut().enumerate() {
                    *s = if c % 2 == 0 { l } else { r };
                }
            }
        }
        for s in &mut out[frames * channels..] {
            *s = 0.0;
        }

        self.clock.advance(frames);
        let t1 = self.clock.now();
        self.ambient.release_finished(t1);
        self.sfx.release_finished(t1);
        self.master.release_finished(t1);
    }
}
