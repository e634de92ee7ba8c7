//! Background learning and foreground classification


use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabletop_tracker::background::{BackgroundModel, ThresholdParams};
use tabletop_tracker::sensor::DepthFrame;
use tabletop_tracker::Error;
use test_helpers::{flat_frames, learn_flat_background};

#[test]
fn test_constant_stream_band() {
    let stats = learn_flat_background(10, 10, 1000, 11, &ThresholdParams::with_scales(1.0, 1.0)).unwrap();

    assert_eq!(stats.frame_count(), 11);
    assert!((stats.avg_depth() - 1000.0).abs() < 0.05);
    assert!(stats.avg_diff().abs() < 1e-4);

    // Band is 1000 +/- 0.8 mm everywhere
    for y in 0..10 {
        for x in 0..10 {
            assert!(!stats.is_foreground(x, y, 1000));
            assert!(stats.is_foreground(x, y, 1001));
            assert!(stats.is_foreground(x, y, 999));
        }
    }
}

#[test]
fn test_single_frame_background() {
    let stats = learn_flat_background(4, 3, 700, 1, &ThresholdParams::default()).unwrap();
    assert_eq!(stats.frame_count(), 1);
    assert_eq!(stats.avg_diff(), 0.0);
    assert!((stats.depth_at(3, 2).unwrap() - 700.0).abs() < 0.05);
}

#[test]
fn test_empty_model_cannot_finalize() {
    let model = BackgroundModel::new(4, 4, 1300).unwrap();
    let err = model.finalize(&ThresholdParams::default()).unwrap_err();
    assert!(matches!(err, Error::EmptyBackground));
    assert!(err.is_fatal());
}

#[test]
fn test_frame_size_change_rejected() {
    let mut model = BackgroundModel::new(6, 4, 1300).unwrap();
    for frame in flat_frames(0, 3, 6, 4, 900) {
        model.accumulate(&frame).unwrap();
    }
    let err = model.accumulate(&DepthFrame::filled(3, 4, 6, 900)).unwrap_err();
    assert!(matches!(err, Error::FrameSize { width: 4, height: 6, .. }));
    assert!(!err.is_fatal());
    assert_eq!(model.frame_count(), 3);
}

#[test]
fn test_noisy_background_classification() {
    let (width, height) = (40, 30);
    let mut rng = StdRng::seed_from_u64(7);
    let mut model = BackgroundModel::new(width, height, 1300).unwrap();
    for id in 0..40 {
        let samples = (0..width * height).map(|_| rng.gen_range(995..=1005)).collect();
        model.accumulate(&DepthFrame::from_raw(id, width, height, samples).unwrap()).unwrap();
    }
    let stats = model.finalize(&ThresholdParams::default()).unwrap();

    assert!((stats.avg_depth() - 1000.0).abs() < 1.0);
    assert!(stats.avg_diff() > 0.8);
    assert!(stats.avg_diff() < 10.0);

    let mut floor = DepthFrame::filled(100, width, height, 1000);
    floor.depth[(15, 20)] = 850;
    floor.depth[(0, 0)] = 1200;
    let foreground: Vec<(usize, usize)> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .filter(|&(x, y)| stats.is_foreground(x, y, floor.depth[(y, x)]))
        .collect();
    assert_eq!(foreground, vec![(0, 0), (20, 15)]);
}

#[test]
fn test_band_wider_at_the_edges() {
    let mut model = BackgroundModel::new(64, 48, 1300).unwrap();
    for (id, value) in [1000u16, 1004].iter().cycle().take(10).enumerate() {
        model.accumulate(&DepthFrame::filled(id as u64, 64, 48, *value)).unwrap();
    }
    let stats = model.finalize(&ThresholdParams::default()).unwrap();
    assert!((stats.avg_diff() - 4.0).abs() < 1e-2);

    // 6 x 4 mm in the center column, close to 15 x 4 mm in the corner
    assert!(!stats.is_foreground(32, 24, 1020));
    assert!(stats.is_foreground(32, 24, 1030));
    assert!(!stats.is_foreground(0, 0, 1050));
    assert!(stats.is_foreground(0, 0, 1070));
}
