//! Per-frame cost of the software renderer at 720p.
//! Run: cargo bench
//!
//! Text is skipped unless a system font resolves for the default family.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lyric_studio::analysis::FrequencyAnalyser;
use lyric_studio::font_assets::{font_search_dirs, resolve_font_family};
use lyric_studio::renderer::{FrameInput, FrameRenderer};
use lyric_studio::settings::VisualSettings;
use lyric_studio::subtitle::parse_subtitles;
use lyric_studio::text::LyricPainter;

const LYRICS: &str = "1\n00:00:00,000 --> 00:00:05,000\nNeon lights on the avenue\n\n\
2\n00:00:05,000 --> 00:00:10,000\nEvery beat keeps pulling me through\n";

fn bench_render(c: &mut Criterion) {
    let settings = VisualSettings::default();
    let lines = parse_subtitles(LYRICS);
    let dirs = font_search_dirs(std::path::Path::new(env!("CARGO_MANIFEST_DIR")));
    let painter = resolve_font_family(&settings.font_family, &dirs)
        .or_else(|| resolve_font_family("DejaVu Sans", &dirs))
        .and_then(|path| LyricPainter::from_path(&path).ok());

    let samples = (0..44_100)
        .map(|i| (i as f32 * 0.05).sin() * 0.8)
        .collect::<Vec<_>>();
    let mut analyser = FrequencyAnalyser::new();
    let bins = analyser.analyse_window(&samples, 22_050).to_vec();

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(50);

    let mut renderer = FrameRenderer::new(1280, 720, 7, painter).expect("create renderer");
    group.bench_function("software_720p_active_line", |b| {
        b.iter(|| {
            black_box(renderer.render_frame(&FrameInput {
                time: 5.2,
                lines: &lines,
                settings: &settings,
                spectrum: Some(&bins),
            }))
        });
    });

    group.bench_function("analyser_window", |b| {
        let mut end = 256;
        b.iter(|| {
            end = (end + 1470) % samples.len();
            black_box(analyser.analyse_window(&samples, end)[0])
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
