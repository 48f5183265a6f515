//! C ABI wrapper for the qaudio engine.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `QaudioEngine` (heap-allocated; free it with `qaudio_destroy`).
//! - Every function accepts a null handle and does nothing (getters return defaults).
//! - The ambient loop is rendered on a worker thread owned by the engine.
//!
//! Threading
//! - The handle is NOT thread-safe; serialize calls (render callback included)
//!   with a lock on the host side.

use qaudio_engine::{AmbientState, AudioEngine, Effect, EngineConfig, DEFAULT_MASTER_GAIN};

/// Opaque engine handle.
pub struct QaudioEngine {
    inner: AudioEngine,
}

/// Effect ids for `qaudio_play_effect`.
pub const QAUDIO_FX_TRANSITION: u32 = 0;
pub const QAUDIO_FX_PARTICLE_SPAWN: u32 = 1;
pub const QAUDIO_FX_PING: u32 = 2;
pub const QAUDIO_FX_SCENE_CHIME: u32 = 3;
pub const QAUDIO_FX_CLICK: u32 = 4;

fn with_engine<R>(engine: *mut QaudioEngine, default: R, f: impl FnOnce(&mut AudioEngine) -> R) -> R {
    // SAFETY: non-null handles come from `qaudio_create` and the caller serializes access.
    match unsafe { engine.as_mut() } {
        Some(e) => f(&mut e.inner),
        None => default,
    }
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine for a device running at `sample_rate`. The engine is not
/// active until `qaudio_init`. A non-positive rate falls back to 48 kHz.
#[no_mangle]
pub extern "C" fn qaudio_create(sample_rate: f32) -> *mut QaudioEngine {
    let sr = if sample_rate.is_finite() && sample_rate > 0.0 { sample_rate } else { 48_000.0 };
    let inner = AudioEngine::new(EngineConfig::with_sample_rate(sr));
    Box::into_raw(Box::new(QaudioEngine { inner }))
}

/// Destroy an engine previously returned by `qaudio_create`.
///
/// # Safety
/// `engine` must be null or a live handle from `qaudio_create`, not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn qaudio_destroy(engine: *mut QaudioEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// --- Lifecycle -------------------------------------------------------------------

/// Activate audio. Call from the host's first user gesture; repeat calls are ignored.
#[no_mangle]
pub extern "C" fn qaudio_init(engine: *mut QaudioEngine) {
    with_engine(engine, (), AudioEngine::init);
}

#[no_mangle]
pub extern "C" fn qaudio_resume(engine: *mut QaudioEngine) {
    with_engine(engine, (), AudioEngine::resume);
}

#[no_mangle]
pub extern "C" fn qaudio_start_ambient(engine: *mut QaudioEngine) {
    with_engine(engine, (), AudioEngine::start_ambient);
}

#[no_mangle]
pub extern "C" fn qaudio_stop_ambient(engine: *mut QaudioEngine) {
    with_engine(engine, (), AudioEngine::stop_ambient);
}

/// 0 = idle, 1 = rendering, 2 = playing, 3 = fading out.
#[no_mangle]
pub extern "C" fn qaudio_ambient_state(engine: *mut QaudioEngine) -> u32 {
    with_engine(engine, 0, |e| match e.ambient_state() {
        AmbientState::Idle => 0,
        AmbientState::Rendering => 1,
        AmbientState::Playing => 2,
        AmbientState::FadingOut => 3,
    })
}

// --- Effects ---------------------------------------------------------------------

/// Play one of the `QAUDIO_FX_*` effects. Unknown ids are ignored.
#[no_mangle]
pub extern "C" fn qaudio_play_effect(engine: *mut QaudioEngine, effect: u32) {
    let fx = match effect {
        QAUDIO_FX_TRANSITION => Effect::Transition,
        QAUDIO_FX_PARTICLE_SPAWN => Effect::ParticleSpawn,
        QAUDIO_FX_PING => Effect::Ping,
        QAUDIO_FX_SCENE_CHIME => Effect::SceneChime,
        QAUDIO_FX_CLICK => Effect::Click,
        _ => return,
    };
    with_engine(engine, (), |e| e.play(fx));
}

// --- Volume ----------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn qaudio_set_master_volume(engine: *mut QaudioEngine, v: f32) {
    with_engine(engine, (), |e| e.set_master_volume(v));
}

#[no_mangle]
pub extern "C" fn qaudio_set_ambient_volume(engine: *mut QaudioEngine, v: f32) {
    with_engine(engine, (), |e| e.set_ambient_volume(v));
}

#[no_mangle]
pub extern "C" fn qaudio_set_sfx_volume(engine: *mut QaudioEngine, v: f32) {
    with_engine(engine, (), |e| e.set_sfx_volume(v));
}

#[no_mangle]
pub extern "C" fn qaudio_master_volume(engine: *mut QaudioEngine) -> f32 {
    with_engine(engine, DEFAULT_MASTER_GAIN, |e| e.master_volume())
}

#[no_mangle]
pub extern "C" fn qaudio_is_muted(engine: *mut QaudioEngine) -> bool {
    with_engine(engine, false, |e| e.is_muted())
}

#[no_mangle]
pub extern "C" fn qaudio_toggle_mute(engine: *mut QaudioEngine) {
    with_engine(engine, (), AudioEngine::toggle_mute);
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` of interleaved f32 audio with `channels` channels into `out`.
/// Returns the number of frames written (0 on bad arguments).
///
/// # Safety
/// `out` must point to at least `frames * channels` writable floats.
#[no_mangle]
pub unsafe extern "C" fn qaudio_render_interleaved_f32(
    engine: *mut QaudioEngine,
    out: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    if out.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    let len = frames as usize * channels as usize;
    let out = std::slice::from_raw_parts_mut(out, len);
    with_engine(engine, 0, |e| {
        e.process(out, channels as usize);
        frames
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn null_handle_is_harmless() {
        let e: *mut QaudioEngine = ptr::null_mut();
        qaudio_init(e);
        qaudio_play_effect(e, QAUDIO_FX_PING);
        assert_eq!(qaudio_master_volume(e), DEFAULT_MASTER_GAIN);
        assert!(!qaudio_is_muted(e));
        let mut buf = [0.0_f32; 8];
        assert_eq!(unsafe { qaudio_render_interleaved_f32(e, buf.as_mut_ptr(), 4, 2) }, 0);
        unsafe { qaudio_destroy(e) };
    }

    #[test]
    fn create_init_play_render() {
        let e = qaudio_create(8_000.0);
        qaudio_init(e);
        qaudio_set_master_volume(e, 2.0);
        assert_eq!(qaudio_master_volume(e), 1.0);
        qaudio_toggle_mute(e);
        assert!(qaudio_is_muted(e));
        qaudio_toggle_mute(e);

        qaudio_play_effect(e, QAUDIO_FX_CLICK);
        qaudio_play_effect(e, 99);
        let mut buf = vec![0.0_f32; 2 * 256];
        let n = unsafe { qaudio_render_interleaved_f32(e, buf.as_mut_ptr(), 256, 2) };
        assert_eq!(n, 256);
        assert!(buf.iter().any(|s| *s != 0.0));

        qaudio_start_ambient(e);
        assert_eq!(qaudio_ambient_state(e), 1);
        qaudio_stop_ambient(e);
        assert_eq!(qaudio_ambient_state(e), 3);
        unsafe { qaudio_destroy(e) };
    }
}
