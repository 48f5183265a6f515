//! qaudio engine: a small procedural audio engine for interactive scenes.
//!
//! Crate layout:
//! - [`engine`]    : `AudioEngine`, the facade hosts call into
//! - [`context`]   : clock plus the master / ambient / sfx bus graph
//! - [`graph`]     : `Generator` trait, buses and the audio clock
//! - [`nodes`]     : oscillators, noise, automated params and voices
//! - [`render`]    : offline ambient loop synthesis and renderers
//! - [`ambient`]   : ambient session state machine and live sparkles
//! - [`scheduler`] : software timers driven by the audio clock
//! - [`effects`]   : one-shot interaction sounds
//! - [`volume`]    : bus volume and mute
//! - [`sink`]      : output device capability
//! - [`config`] / [`error`]
//!
//! Nothing here talks to a device. The host owns the output stream and pulls
//! samples with [`AudioEngine::process`]; that call is also where deferred
//! work (render completion, sparkle timers, fade ends) is carried out.

pub mod ambient;
pub mod config;
pub mod context;
pub mod effects;
pub mod engine;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod render;
pub mod scheduler;
pub mod sink;
pub mod volume;

pub use ambient::AmbientState;
pub use config::{AmbientConfig, ConfigError, EngineConfig, DEFAULT_MASTER_GAIN};
pub use effects::Effect;
pub use engine::AudioEngine;
pub use error::{RenderError, SinkError};
pub use graph::{BusId, Generator};
pub use render::{
    render_loop, InlineRenderer, LoopBuffer, LoopSpec, OfflineRenderer, PendingRender,
    RenderCompleter, RenderJob, ThreadRenderer,
};
pub use sink::OutputSink;
