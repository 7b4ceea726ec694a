mod common;

use common::*;
use image::imageops::{self, FilterType};
use image::DynamicImage;
use rimlevel::detection::segments::{extract_segments, LineSegment, SegmentOptions};
use rimlevel::{DetectionParams, LevelDetector};

#[test]
fn test_angle_just_inside_tolerance_is_level() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    let status = detector.detect(1, &edge_crop(700, 300, 2.4))?;

    assert!(status.has_edge);
    assert!(!status.is_curved);
    assert!(status.is_level, "2.4 deg should pass, measured {}", status.angle_deg);
    assert!((status.angle_deg.abs() - 2.4).abs() < 0.3);
    Ok(())
}

#[test]
fn test_angle_just_outside_tolerance_is_not_level() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    let status = detector.detect(1, &edge_crop(700, 300, 2.6))?;

    assert!(status.has_edge);
    assert!(!status.is_level, "2.6 deg should fail, measured {}", status.angle_deg);
    assert!(status.needs_correction());
    Ok(())
}

#[test]
fn test_negative_tilt_uses_magnitude() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    let status = detector.detect(2, &edge_crop(700, 300, -6.0))?;

    assert!(!status.is_level);
    assert!(status.angle_deg < 0.0);
    Ok(())
}

#[test]
fn test_scale_invariance() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    for angle in [1.0, 6.0] {
        let small = detector.detect(1, &edge_crop(350, 150, angle))?;
        let large = detector.detect(1, &edge_crop(700, 300, angle))?;
        assert!(small.has_edge && large.has_edge);
        assert_eq!(small.is_level, large.is_level, "angle {angle}");
        assert_eq!(large.is_level, angle < 2.5);
    }

    // The same crop resampled to twice its size keeps its verdict either
    // side of the tolerance.
    for angle in [2.4, 2.6] {
        let base = edge_crop(700, 300, angle);
        let upscaled = DynamicImage::ImageLuma8(imageops::resize(&base.to_luma8(), 1400, 600, FilterType::Triangle));
        let base_status = detector.detect(1, &base)?;
        let up_status = detector.detect(1, &upscaled)?;
        assert!(base_status.has_edge && up_status.has_edge, "angle {angle}");
        assert_eq!(base_status.is_level, up_status.is_level, "angle {angle}");
        assert_eq!(up_status.is_level, angle < 2.5, "angle {angle}");
    }
    Ok(())
}

#[test]
fn test_curved_rim_overrides_level_edge() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    let status = detector.detect(3, &curved_rim_crop())?;

    assert!(status.has_edge);
    assert!(status.is_curved);
    assert!(!status.is_level);
    // The longest edge is the flat part of the rim.
    assert!(status.angle_deg.abs() < 2.5);
    Ok(())
}

#[test]
fn test_blank_crop_defaults_to_level() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    let status = detector.detect(4, &blank_crop(700, 300))?;

    assert!(!status.has_edge);
    assert!(status.is_level);
    assert!(!status.needs_correction());
    Ok(())
}

#[test]
fn test_edge_outside_band_is_ignored() -> anyhow::Result<()> {
    let detector = LevelDetector::default();
    // Rim at 80% of the height, below the accepted band.
    let crop = image::DynamicImage::ImageLuma8(tilted_edge(700, 300, 350.0, 240.0, 10.0));
    let status = detector.detect(1, &crop)?;

    assert!(!status.has_edge);
    assert!(status.is_level);
    Ok(())
}

#[test]
fn test_empty_crop_is_an_error() {
    let detector = LevelDetector::default();
    let crop = image::DynamicImage::new_luma8(0, 0);
    assert!(detector.detect(1, &crop).is_err());
}

#[test]
fn test_extract_segments_finds_single_edge() {
    let edges = image::GrayImage::from_fn(200, 100, |_, y| image::Luma([if y == 50 { 255 } else { 0 }]));
    let segments = extract_segments(&edges, &SegmentOptions::default());

    assert!(!segments.is_empty());
    let longest = segments
        .iter()
        .max_by(|a, b| a.length().total_cmp(&b.length()))
        .unwrap();
    assert!(longest.length() > 180.0);
    assert!(longest.angle_deg().abs() < 0.5);
    assert!((longest.y1 - 50.0).abs() < 1.0);
}

#[test]
fn test_extract_segments_splits_on_gap() {
    let edges = image::GrayImage::from_fn(200, 100, |x, y| {
        image::Luma([if y == 50 && !(90..120).contains(&x) { 255 } else { 0 }])
    });
    let segments = extract_segments(&edges, &SegmentOptions::default());

    assert!(segments.len() >= 2);
    assert!(segments.iter().all(|s| s.length() < 100.0));
}

#[test]
fn test_segment_angle_is_direction_independent() {
    let forward = LineSegment::new(0.0, 0.0, 100.0, 10.0);
    let backward = LineSegment::new(100.0, 10.0, 0.0, 0.0);
    assert!((forward.angle_deg() - backward.angle_deg()).abs() < 1e-4);
    assert!(forward.angle_deg() > 5.0);
}

#[test]
fn test_classify_picks_longest_segment() {
    let detector = LevelDetector::default();
    let segments = [
        LineSegment::new(0.0, 100.0, 100.0, 101.0),
        LineSegment::new(0.0, 110.0, 300.0, 130.0),
    ];
    let status = detector.classify(1, &segments, 300);

    assert!(status.has_edge);
    assert!(!status.is_level);
    assert!((status.angle_deg - 3.81).abs() < 0.05);
}

#[test]
fn test_classify_tie_keeps_first_segment() {
    let detector = LevelDetector::default();
    let (sin, cos) = 4f32.to_radians().sin_cos();
    let tilted = LineSegment::new(0.0, 110.0, 300.0 * cos, 110.0 + 300.0 * sin);
    let flat = LineSegment::new(0.0, 100.0, tilted.length(), 100.0);
    assert_eq!(flat.length(), tilted.length());

    let status = detector.classify(1, &[flat, tilted], 300);
    assert!(status.has_edge);
    assert!(status.is_level);
    assert!(status.angle_deg.abs() < 0.01);

    let status = detector.classify(1, &[tilted, flat], 300);
    assert!(status.has_edge);
    assert!(!status.is_level);
    assert!((status.angle_deg - 4.0).abs() < 0.01);
}

#[test]
fn test_classify_single_candidate_is_never_curved() {
    let params = DetectionParams {
        curvature_std_deg: 0.0,
        ..DetectionParams::default()
    };
    let detector = LevelDetector::new(params);
    let status = detector.classify(1, &[LineSegment::new(0.0, 100.0, 300.0, 101.0)], 300);

    assert!(!status.is_curved);
    assert!(status.is_level);
}

#[test]
fn test_classify_rejects_steep_segments() {
    let detector = LevelDetector::default();
    let status = detector.classify(1, &[LineSegment::new(0.0, 70.0, 50.0, 170.0)], 300);
    assert!(!status.has_edge);
}

#[test]
fn test_scaled_params_respect_floor() {
    let params = DetectionParams::default();

    let full = params.scaled_for(700, 300);
    assert_eq!(full.min_line_length, 25);
    assert_eq!(full.vote_threshold, 20);

    let double = params.scaled_for(1400, 600);
    assert_eq!(double.min_line_length, 50);
    assert_eq!(double.vote_threshold, 40);

    let tiny = params.scaled_for(100, 40);
    assert_eq!(tiny.min_line_length, 10);
    assert_eq!(tiny.vote_threshold, 10);
}
