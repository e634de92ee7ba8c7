//! Benchmarks for fingertip filter performance

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point3;
use tabletop_tracker::filters::{
    double_exponential::DoubleExponentialFilter, kalman::KalmanFilter, FingertipFilter, NoFilter,
};
use tabletop_tracker::forelimb::{FingertipCandidate, Forelimb};

/// Noisy fingertip sweeping across the table, one forelimb per frame
fn fingertip_track(frames: usize, tips_per_frame: usize) -> Vec<Vec<Forelimb>> {
    (0..frames)
        .map(|i| {
            let t = i as f32 * 0.1;
            let tips = (0..tips_per_frame)
                .map(|k| {
                    let x = 320.0 + 150.0 * t.sin() + k as f32 * 25.0 + 2.0 * rand::random::<f32>();
                    let y = 240.0 + 80.0 * t.cos() + 2.0 * rand::random::<f32>();
                    FingertipCandidate::new(Point3::new(x, y, 950.0), 1.0)
                })
                .collect();
            vec![Forelimb::from_fingertips(tips)]
        })
        .collect()
}

fn benchmark_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");
    let track = fingertip_track(100, 1);
    let crowded = fingertip_track(100, 5);

    let filter_configs = vec![
        ("no_filter", Box::new(NoFilter) as Box<dyn FingertipFilter>),
        ("double_exponential", Box::new(DoubleExponentialFilter::default())),
        ("double_exponential_0.5", Box::new(DoubleExponentialFilter::new(0.5, 0.5).unwrap())),
        ("kalman", Box::new(KalmanFilter::default())),
    ];

    for (name, mut filter) in filter_configs {
        group.bench_with_input(BenchmarkId::new("single_update", name), &track[0], |b, forelimbs| {
            b.iter(|| black_box(filter.apply(black_box(forelimbs))));
        });

        group.bench_with_input(BenchmarkId::new("sequence_100", name), &track, |b, frames| {
            b.iter(|| {
                filter.reset();
                for forelimbs in frames {
                    black_box(filter.apply(black_box(forelimbs)));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("five_tips_100", name), &crowded, |b, frames| {
            b.iter(|| {
                filter.reset();
                for forelimbs in frames {
                    black_box(filter.apply(black_box(forelimbs)));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_filter_gaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_gaps");
    // Every fourth frame has no fingertip and resets the filter
    let track: Vec<Vec<Forelimb>> = fingertip_track(100, 1)
        .into_iter()
        .enumerate()
        .map(|(i, forelimbs)| if i % 4 == 3 { Vec::new() } else { forelimbs })
        .collect();

    let filter_configs = vec![
        ("double_exponential", Box::new(DoubleExponentialFilter::default()) as Box<dyn FingertipFilter>),
        ("kalman", Box::new(KalmanFilter::default())),
    ];

    for (name, mut filter) in filter_configs {
        group.bench_function(name, |b| {
            b.iter(|| {
                for forelimbs in &track {
                    black_box(filter.apply(black_box(forelimbs)));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_filters, benchmark_filter_gaps);
criterion_main!(benches);
