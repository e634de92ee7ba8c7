//! Benchmarks for the per-frame tracking pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tabletop_tracker::analyzer::HandAnalyzer;
use tabletop_tracker::background::{BackgroundModel, BackgroundStatistics, ThresholdParams};
use tabletop_tracker::config::Config;
use tabletop_tracker::fingertips::{create_detector, DetectorKind, DetectorParams, FrameContext};
use tabletop_tracker::regions::{RegionExtractor, RegionParams};
use tabletop_tracker::segmentation::{ForegroundSegmenter, SegmentationParams};
use tabletop_tracker::sensor::DepthFrame;

const WIDTH: usize = 320;
const HEIGHT: usize = 240;

/// Table at 1000 mm with sensor noise
fn table_frame(frame_id: u64) -> DepthFrame {
    let samples = (0..WIDTH * HEIGHT)
        .map(|_| 1000 + (rand::random::<u16>() % 3))
        .collect();
    DepthFrame::from_raw(frame_id, WIDTH, HEIGHT, samples).unwrap()
}

/// Forearm entering from the bottom edge with four spread fingers
fn hand_frame(frame_id: u64) -> DepthFrame {
    let mut frame = table_frame(frame_id);
    let mut raise = |x0: usize, x1: usize, y0: usize, y1: usize| {
        for y in y0..y1 {
            for x in x0..x1 {
                frame.depth[(y, x)] = 850;
            }
        }
    };
    raise(130, 190, 140, 235);
    for k in 0..4 {
        let x = 132 + k * 16;
        raise(x, x + 9, 90, 140);
    }
    frame
}

fn learned_background() -> BackgroundStatistics {
    let mut model = BackgroundModel::new(WIDTH, HEIGHT, 1300).unwrap();
    for id in 0..40 {
        model.accumulate(&table_frame(id)).unwrap();
    }
    model.finalize(&ThresholdParams::default()).unwrap()
}

fn benchmark_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_stages");
    group.measurement_time(Duration::from_secs(10));

    let background = learned_background();
    let frame = hand_frame(100);
    let segmenter = ForegroundSegmenter::new(SegmentationParams::default()).unwrap();
    let extractor = RegionExtractor::new(WIDTH, HEIGHT, RegionParams::default()).unwrap();

    group.bench_function("background_accumulate", |b| {
        let mut model = BackgroundModel::new(WIDTH, HEIGHT, 1300).unwrap();
        let frame = table_frame(0);
        b.iter(|| model.accumulate(black_box(&frame)).unwrap());
    });

    group.bench_function("segment", |b| {
        b.iter(|| segmenter.segment(black_box(&background), black_box(&frame)).unwrap());
    });

    let segmentation = segmenter.segment(&background, &frame).unwrap();
    group.bench_function("extract", |b| {
        b.iter(|| extractor.extract(black_box(&segmentation.cleaned)).unwrap());
    });

    let silhouettes = extractor.extract(&segmentation.cleaned).unwrap();
    let context = FrameContext {
        frame: &frame,
        segmentation: &segmentation,
    };
    for kind in [DetectorKind::ConvexityDefects, DetectorKind::HullAngle, DetectorKind::Thinning] {
        let detector = create_detector(kind, &DetectorParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("detect", kind), &silhouettes, |b, silhouettes| {
            b.iter(|| {
                for silhouette in silhouettes {
                    black_box(detector.detect(silhouette, &context));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_full_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_frame");
    group.measurement_time(Duration::from_secs(10));

    let mut config = Config::default();
    config.sensor.width = WIDTH;
    config.sensor.height = HEIGHT;
    config.sensor.cx = 160.0;
    config.sensor.cy = 120.0;
    config.background.ignore_frames = 0;
    config.background.init_frames = 20;

    for kind in [DetectorKind::ConvexityDefects, DetectorKind::Thinning] {
        config.fingertips.detector = kind;
        let mut analyzer = HandAnalyzer::new(&config, Box::new(config.camera())).unwrap();
        for id in 0..20 {
            analyzer.process_frame(&table_frame(id)).unwrap();
        }
        let frame = hand_frame(20);
        group.bench_function(BenchmarkId::new("process_frame", kind), |b| {
            b.iter(|| analyzer.process_frame(black_box(&frame)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_stages, benchmark_full_frame);
criterion_main!(benches);
