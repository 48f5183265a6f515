//! qaudio CLI: plays the engine on a real output device and drives it from stdin.
//!
//! The output stream runs from startup but stays gated (silent) until the
//! first command, the terminal stand-in for a user gesture. That command
//! activates the engine, the same way a host UI would on its first click.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use qaudio_engine::{AudioEngine, EngineConfig, OutputSink, SinkError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct Args {
    list_devices: bool,
    device_name: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    seed: Option<u64>,
    gain: Option<f32>,
}

fn parse_args() -> Args {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--list-devices" { a.list_devices = true; continue; }
        if let Some(rest) = s.strip_prefix("--device=")      { a.device_name = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--sample-rate=") { a.sample_rate = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--channels=")    { a.channels    = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--seed=")        { a.seed        = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--gain=")        { a.gain        = rest.parse().ok();      continue; }
        warn!("unknown arg: {s}");
    }
    a
}

fn list_output_devices() -> Result<(), Box<dyn Error>> {
    let host = cpal::default_host();
    println!("Output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name { return Ok(d); }
        }
        return Err(format!("output device not found: {name}").into());
    }
    host.default_output_device()
        .ok_or_else(|| "no default output device".into())
}

/// Closest supported config to the requested rate/channels; a sample-rate
/// mismatch weighs far more than a channel mismatch.
fn choose_config(
    device: &cpal::Device,
    want_sr: Option<u32>,
    want_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig, Box<dyn Error>> {
    if want_sr.is_none() && want_ch.is_none() {
        return Ok(device.default_output_config()?);
    }

    let score = |r: &cpal::SupportedStreamConfigRange| -> u64 {
        let ch = want_ch.map_or(0, |c| u64::from(r.channels().abs_diff(c)));
        let sr = want_sr.map_or(0, |sr| {
            let (lo, hi) = (r.min_sample_rate().0, r.max_sample_rate().0);
            if (lo..=hi).contains(&sr) { 0 } else { u64::from(lo.abs_diff(sr).min(hi.abs_diff(sr))) }
        });
        sr.saturating_mul(1000) + ch
    };

    let range = device
        .supported_output_configs()?
        .min_by_key(|r| score(r))
        .ok_or("device reports no output configs")?;

    let sr = match want_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(sr))
}

/// Output gate shared between the engine (which may resume it) and the stream callback.
struct GatedSink {
    open: Arc<AtomicBool>,
}

impl OutputSink for GatedSink {
    fn is_suspended(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    engine: Arc<Mutex<AudioEngine>>,
    open: Arc<AtomicBool>,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(cfg.channels);

    // ~1 s peak meter at the device rate
    let meter_interval = cfg.sample_rate.0.max(1) as usize * channels;
    let mut meter_count: usize = 0;
    let mut meter_peak: f32 = 0.0;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            scratch.clear();
            scratch.resize(output.len(), 0.0);
            if open.load(Ordering::Acquire) {
                if let Ok(mut e) = engine.lock() {
                    e.process(&mut scratch, channels);
                }
            }

            for (dst, &s) in output.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(s);
                meter_peak = meter_peak.max(s.abs());
            }
            meter_count += output.len();
            if meter_count >= meter_interval {
                debug!(peak = meter_peak, "meter");
                meter_peak = 0.0;
                meter_count = 0;
            }
        },
        |e| error!("stream error: {e}"),
        None,
    )?;

    Ok(stream)
}

const HELP: &str = "\
commands:
  start | stop                 ambient bed
  transition | spawn | ping | chime | click
  master <v> | ambient <v> | sfx <v>
  mute                         toggle mute
  status
  quit";

/// Apply one stdin command. `pending_gain` holds the `--gain` value until the
/// first command has activated the engine.
fn run_command(engine: &Mutex<AudioEngine>, line: &str, pending_gain: &mut Option<f32>) -> bool {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return true;
    };
    let arg = words.next().and_then(|w| w.parse::<f32>().ok());

    let Ok(mut e) = engine.lock() else {
        error!("engine lock poisoned");
        return false;
    };
    // First interaction doubles as the activation gesture.
    e.init();
    if let Some(g) = pending_gain.take() {
        e.set_master_volume(g);
    }
    e.resume();

    match (cmd, arg) {
        ("quit" | "q" | "exit", _) => return false,
        ("start", _) => e.start_ambient(),
        ("stop", _) => e.stop_ambient(),
        ("transition", _) => e.play_transition(),
        ("spawn", _) => e.play_particle_spawn(),
        ("ping", _) => e.play_ping(),
        ("chime", _) => e.play_scene_chime(),
        ("click", _) => e.play_click(),
        ("mute", _) => e.toggle_mute(),
        ("master", Some(v)) => e.set_master_volume(v),
        ("ambient", Some(v)) => e.set_ambient_volume(v),
        ("sfx", Some(v)) => e.set_sfx_volume(v),
        ("status", _) => println!(
            "ambient={} generation={} master={:.2} muted={} voices={} nodes={}",
            e.ambient_state(),
            e.generation(),
            e.master_volume(),
            e.is_muted(),
            e.live_voices(),
            e.live_nodes(),
        ),
        _ => println!("{HELP}"),
    }
    true
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args();
    if args.list_devices {
        return list_output_devices();
    }

    let device = pick_device(args.device_name.as_deref())?;
    let supported = choose_config(&device, args.sample_rate, args.channels)?;
    let sample_format = supported.sample_format();
    let cfg = supported.config();

    #[allow(clippy::cast_precision_loss)]
    let mut engine_cfg = EngineConfig::with_sample_rate(cfg.sample_rate.0 as f32);
    engine_cfg.seed = args.seed;

    let open = Arc::new(AtomicBool::new(false));
    let mut engine = AudioEngine::new(engine_cfg);
    engine.attach_sink(Box::new(GatedSink { open: Arc::clone(&open) }));
    let engine = Arc::new(Mutex::new(engine));

    info!(device = %device.name()?, ?cfg, ?sample_format, "opening output");

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, Arc::clone(&engine), Arc::clone(&open))?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, Arc::clone(&engine), Arc::clone(&open))?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, Arc::clone(&engine), Arc::clone(&open))?,
        other => return Err(format!("unsupported device sample format: {other:?}").into()),
    };
    stream.play()?;

    let mut pending_gain = args.gain;
    println!("qaudio: type a command (help for a list)");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        if !run_command(&engine, &line?, &mut pending_gain) {
            break;
        }
        io::stdout().flush()?;
    }

    info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Mutex<AudioEngine> {
        Mutex::new(AudioEngine::new(EngineConfig::with_sample_rate(8_000.0)))
    }

    #[test]
    fn gain_flag_waits_for_first_command() {
        let engine = engine();
        let mut pending = Some(0.25);
        assert!(!engine.lock().unwrap().is_initialized());

        assert!(run_command(&engine, "status", &mut pending));
        assert_eq!(pending, None);
        let e = engine.lock().unwrap();
        assert!(e.is_initialized());
        assert_eq!(e.master_volume(), 0.25);
    }

    #[test]
    fn later_commands_keep_their_own_volume() {
        let engine = engine();
        let mut pending = Some(0.25);
        assert!(run_command(&engine, "master 0.6", &mut pending));
        assert_eq!(engine.lock().unwrap().master_volume(), 0.6);
        assert!(run_command(&engine, "ping", &mut pending));
        assert_eq!(engine.lock().unwrap().master_volume(), 0.6);
        assert!(!run_command(&engine, "quit", &mut pending));
    }
}
