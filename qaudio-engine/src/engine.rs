//! `AudioEngine`: the owned engine object the content layer talks to.
//!
//! All public operations are synchronous, return immediately and never fail
//! from the caller's point of view. Before [`AudioEngine::init`] every call
//! is a silent no-op (the volume getter reports its default).
//!
//! The host drives time by calling [`AudioEngine::process`] from its output
//! callback (or [`AudioEngine::advance`] when headless). That call is where
//! finished offline renders are picked up, software timers fire, voices are
//! rendered and spent voices are released, so every state transition happens
//! under the same `&mut self` and is atomic with respect to the others.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::ambient::{sparkle_burst, AmbientSession, AmbientState};
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::effects::{self, Effect};
use crate::error::RenderError;
use crate::graph::BusId;
use crate::render::{LoopBuffer, LoopSpec, OfflineRenderer, PendingRender, RenderJob, ThreadRenderer};
use crate::scheduler::{Task, TimerId, TimerQueue};
use crate::sink::OutputSink;
use crate::volume::VolumeController;

pub struct AudioEngine {
    config: EngineConfig,
    context: Option<EngineContext>,
    volume: VolumeController,
    ambient: AmbientSession,
    timers: TimerQueue,
    pending: Vec<PendingRender>,
    renderer: Box<dyn OfflineRenderer>,
    sink: Option<Box<dyn OutputSink>>,
    rng: StdRng,
    sparkle_firings: u64,
    scratch: Vec<f32>,
}

impl AudioEngine {
    /// Engine that renders its ambient loop on a worker thread.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_renderer(config, Box::new(ThreadRenderer))
    }

    /// Engine with a caller-supplied offline renderer. An invalid config is
    /// replaced by the defaults (keeping the requested sample rate if it is usable).
    pub fn with_renderer(config: EngineConfig, renderer: Box<dyn OfflineRenderer>) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("invalid engine config ({e}); falling back to defaults");
                let fallback = EngineConfig::with_sample_rate(config.sample_rate);
                if fallback.validate().is_ok() { fallback } else { EngineConfig::default() }
            }
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            volume: VolumeController::new(config.declick_seconds),
            config,
            context: None,
            ambient: AmbientSession::new(),
            timers: TimerQueue::new(),
            pending: Vec::new(),
            renderer,
            sink: None,
            rng,
            sparkle_firings: 0,
            scratch: Vec::new(),
        }
    }

    /// Attach the realtime device so `resume()` can wake it.
    pub fn attach_sink(&mut self, sink: Box<dyn OutputSink>) {
        self.sink = Some(sink);
    }

    #[inline] pub fn config(&self) -> &EngineConfig { &self.config }

    // ------------------------------- Lifecycle ---------------------------------------

    /// Create the context and buses. Call after the user has activated audio;
    /// repeated calls do nothing.
    pub fn init(&mut self) {
        if self.context.is_some() {
            debug!("init ignored: context already exists");
            return;
        }
        self.context = Some(EngineContext::new(&self.config));
    }

    #[inline] pub fn is_initialized(&self) -> bool { self.context.is_some() }

    /// Wake the output device if it is suspended. No-op before `init`.
    pub fn resume(&mut self) {
        if self.context.is_none() {
            return;
        }
        if let Some(sink) = &mut self.sink {
            if sink.is_suspended() {
                match sink.resume() {
                    Ok(()) => info!("output resumed"),
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }

    // ------------------------------- Ambient -----------------------------------------

    /// Start the ambient bed: kick off the offline loop render and return.
    /// Ignored unless the session is idle.
    pub fn start_ambient(&mut self) {
        if self.context.is_none() {
            debug!("start_ambient before init ignored");
            return;
        }
        let Some(generation) = self.ambient.begin_render() else {
            return;
        };
        let job = RenderJob {
            generation,
            spec: LoopSpec::from_config(&self.config),
            seed: self.rng.gen(),
        };
        self.pending.push(self.renderer.submit(job));
    }

    /// Stop the ambient bed: cancel live sparkles, fade the ambient bus out and
    /// release the loop when the fade ends. Ignored when idle or already fading.
    pub fn stop_ambient(&mut self) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let Some(ticket) = self.ambient.begin_stop(&mut self.timers) else {
            return;
        };
        let now = ctx.now();
        let fade = self.config.ambient.fade_out_seconds;
        ctx.bus_mut(BusId::Ambient).fade(None, 0.0, now, fade);
        self.timers.schedule(now + fade, Task::FadeOutDone { generation: ticket.generation });
    }

    #[inline] pub fn ambient_state(&self) -> AmbientState { self.ambient.state() }
    #[inline] pub fn generation(&self) -> u64 { self.ambient.generation() }

    /// Live sparkle firings since the engine was created.
    #[inline] pub fn sparkle_firings(&self) -> u64 { self.sparkle_firings }

    /// Offline renders submitted but not yet picked up.
    #[inline] pub fn pending_renders(&self) -> usize { self.pending.len() }

    // ------------------------------- Effects -----------------------------------------

    pub fn play(&mut self, effect: Effect) {
        if self.context.is_none() {
            return;
        }
        self.resume();
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let now = ctx.now();
        for voice in effects::build(effect, now, ctx.sample_rate()) {
            ctx.add_voice(BusId::Sfx, voice);
        }
        debug!(%effect, now, "effect started");
    }

    pub fn play_transition(&mut self) { self.play(Effect::Transition); }
    pub fn play_particle_spawn(&mut self) { self.play(Effect::ParticleSpawn); }
    pub fn play_ping(&mut self) { self.play(Effect::Ping); }
    pub fn play_scene_chime(&mut self) { self.play(Effect::SceneChime); }
    pub fn play_click(&mut self) { self.play(Effect::Click); }

    // ------------------------------- Volume ------------------------------------------

    pub fn set_master_volume(&mut self, v: f32) {
        self.volume.set_bus_gain(self.context.as_mut(), BusId::Master, v);
    }

    /// During a fade-out the new level is only recorded; the fade to silence
    /// keeps running so the loop is released at zero gain.
    pub fn set_ambient_volume(&mut self, v: f32) {
        if self.ambient.state() == AmbientState::FadingOut {
            self.volume.record_bus_level(self.context.as_mut(), BusId::Ambient, v);
            return;
        }
        self.volume.set_bus_gain(self.context.as_mut(), BusId::Ambient, v);
    }

    pub fn set_sfx_volume(&mut self, v: f32) {
        self.volume.set_bus_gain(self.context.as_mut(), BusId::Sfx, v);
    }

    pub fn master_volume(&self) -> f32 {
        self.volume.master_gain(self.context.as_ref())
    }

    pub fn is_muted(&self) -> bool {
        self.volume.is_muted(self.context.as_ref())
    }

    pub fn toggle_mute(&mut self) {
        self.volume.toggle_mute(self.context.as_mut());
    }

    /// Last level requested for `bus` (setter or fade target). `None` before `init`.
    pub fn bus_level(&self, bus: BusId) -> Option<f32> {
        self.context.as_ref().map(|c| c.bus(bus).level())
    }

    /// Gain actually applied to `bus` right now, automation included.
    pub fn bus_gain(&self, bus: BusId) -> Option<f32> {
        self.context.as_ref().map(|c| c.bus(bus).gain_at(c.now()))
    }

    // ------------------------------- Rendering ---------------------------------------

    /// Fill interleaved `out` with `channels` channels of audio. Silence before `init`.
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        if self.context.is_none() {
            out.fill(0.0);
            return;
        }
        let slice = self.config.block_frames * channels;
        for chunk in out.chunks_mut(slice) {
            self.deliver_renders();
            self.fire_due_timers();
            if let Some(ctx) = self.context.as_mut() {
                ctx.render(chunk, channels);
            }
        }
        self.deliver_renders();
        self.fire_due_timers();
    }

    /// Render and discard `seconds` of audio.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn advance(&mut self, seconds: f64) {
        if self.context.is_none() || seconds <= 0.0 {
            return;
        }
        let mut frames = (seconds * f64::from(self.config.sample_rate)).round() as usize;
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(self.config.block_frames * 2, 0.0);
        while frames > 0 {
            let n = frames.min(self.config.block_frames);
            self.process(&mut scratch[..n * 2], 2);
            frames -= n;
        }
        self.scratch = scratch;
    }

    /// Clock time in seconds since `init`.
    pub fn now(&self) -> Option<f64> {
        self.context.as_ref().map(EngineContext::now)
    }

    /// Transient voices currently alive (effects and live sparkles).
    pub fn live_voices(&self) -> usize {
        self.context.as_ref().map_or(0, EngineContext::live_voices)
    }

    /// Synthesis nodes currently alive, the ambient loop source included.
    pub fn live_nodes(&self) -> usize {
        self.context.as_ref().map_or(0, EngineContext::live_nodes)
    }

    pub fn is_loop_playing(&self) -> bool {
        self.context.as_ref().is_some_and(EngineContext::has_loop)
    }

    // ------------------------------- Internals ---------------------------------------

    fn deliver_renders(&mut self) {
        let mut i = 0;
        while i < self.pending.len() {
            match self.pending[i].poll() {
                None => i += 1,
                Some(result) => {
                    let generation = self.pending.swap_remove(i).generation();
                    self.consume_render(generation, result);
                }
            }
        }
    }

    /// The one place a render result turns into sound.
    fn consume_render(&mut self, generation: u64, result: Result<LoopBuffer, RenderError>) {
        if !self.ambient.wants_render(generation) {
            debug!(
                generation,
                current = self.ambient.generation(),
                state = %self.ambient.state(),
                "discarding stale ambient render"
            );
            return;
        }
        let buffer = match result {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(generation, "ambient render failed: {e}");
                self.ambient.render_failed(generation);
                return;
            }
        };
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        if !self.ambient.accept_render(generation) {
            return;
        }

        let cfg = &self.config.ambient;
        let now = ctx.now();
        debug!(frames = buffer.frames(), peak = buffer.peak(), "ambient loop ready");
        ctx.start_loop(Arc::new(buffer));
        ctx.bus_mut(BusId::Ambient).fade(Some(0.0), cfg.target_gain, now, cfg.fade_in_seconds);
        self.ambient.arm_sparkle(&mut self.timers, now + cfg.sparkle_initial_delay);
    }

    fn fire_due_timers(&mut self) {
        let Some(now) = self.now() else {
            return;
        };
        while let Some((id, task)) = self.timers.pop_due(now) {
            match task {
                Task::Sparkle => self.fire_sparkle(id, now),
                Task::FadeOutDone { generation } => self.finish_fade_out(generation),
            }
        }
    }

    fn fire_sparkle(&mut self, id: TimerId, now: f64) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let Some(sparkle) = self.ambient.sparkle_mut() else {
            return;
        };
        if !sparkle.owns(id) {
            return;
        }

        for voice in sparkle_burst(&mut self.rng, now, ctx.sample_rate()) {
            ctx.add_voice(BusId::Ambient, voice);
        }
        self.sparkle_firings += 1;

        let cfg = &self.config.ambient;
        let delay = self.rng.gen_range(cfg.sparkle_jitter_min..=cfg.sparkle_jitter_max);
        sparkle.rearm(&mut self.timers, now + delay);
    }

    fn finish_fade_out(&mut self, generation: u64) {
        if !self.ambient.finish_stop(generation) {
            return;
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.stop_loop();
        }
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("initialized", &self.context.is_some())
            .field("ambient", &self.ambient.state())
            .field("generation", &self.ambient.generation())
            .field("pending_renders", &self.pending.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}
