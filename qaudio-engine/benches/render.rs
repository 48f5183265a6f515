use criterion::{black_box, criterion_group, criterion_main, Criterion};

use qaudio_engine::{render_loop, AudioEngine, EngineConfig, InlineRenderer, LoopSpec};

fn bench_loop_render(c: &mut Criterion) {
    let spec = LoopSpec { sample_rate: 48_000.0, seconds: 4.0, channels: 2, baked_sparkles: 8 };
    c.bench_function("render_loop 4s stereo", |b| {
        b.iter(|| render_loop(black_box(&spec), 1));
    });
}

fn bench_process(c: &mut Criterion) {
    let mut cfg = EngineConfig::default();
    cfg.seed = Some(3);
    cfg.ambient.loop_seconds = 4.0;
    let mut engine = AudioEngine::with_renderer(cfg, Box::new(InlineRenderer));
    engine.init();
    engine.start_ambient();
    engine.advance(3.0);

    let mut out = vec![0.0_f32; 512 * 2];
    c.bench_function("process 512 frames, ambient + effects", |b| {
        b.iter(|| {
            engine.play_ping();
            engine.process(black_box(&mut out), 2);
        });
    });
}

criterion_group!(benches, bench_loop_render, bench_process);
criterion_main!(benches);
