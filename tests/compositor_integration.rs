//! Integration tests for the compositing stages inside chains

mod common;

use common::builders::{solid, TapeBuilder};
use framechain::pipeline::stages::{Inlay, InlayConfig, SbsConfig, SideBySide};
use framechain::processors::SlowDetector;
use framechain::sources::TestPattern;
use framechain::{Graph, Pipeline, Stage, StageContext};
use image::Rgb;
use std::time::Duration;

#[test]
fn test_inlay_thumbnail_geometry() {
    let tape = TapeBuilder::new()
        .image(800, 600, 10)
        .image(800, 600, 200)
        .build();
    let out = Inlay::new(0, 1, 4).call(&StageContext::standalone(), tape);

    assert_eq!(out.len(), 3);
    let composite = out.image(-1).unwrap();
    assert_eq!(composite.dimensions(), (800, 600));
    // 200x150 thumbnail at the origin
    assert_eq!(*composite.get_pixel(0, 0), Rgb([200, 200, 200]));
    assert_eq!(*composite.get_pixel(199, 149), Rgb([200, 200, 200]));
    // two-pixel white frame on the right and bottom
    assert_eq!(*composite.get_pixel(201, 10), Rgb([255, 255, 255]));
    assert_eq!(*composite.get_pixel(10, 151), Rgb([255, 255, 255]));
    // untouched canvas beyond the frame
    assert_eq!(*composite.get_pixel(202, 10), Rgb([10, 10, 10]));
    assert_eq!(*composite.get_pixel(10, 152), Rgb([10, 10, 10]));
}

#[test]
fn test_inlay_with_missing_input_appends_absent() {
    let tape = TapeBuilder::new().image(64, 48, 1).absent().build();
    let out = Inlay::default().call(&StageContext::standalone(), tape);
    assert_eq!(out.len(), 3);
    assert!(out.get(-1).unwrap().is_absent());
}

#[test]
fn test_sbs_panes_are_symmetric() {
    let tape = TapeBuilder::new()
        .image(100, 80, 30)
        .image(100, 80, 220)
        .build();
    let sbs = SideBySide::from_config(SbsConfig {
        first_index: 0,
        second_index: 1,
        factor: 2,
        flip: false,
    });
    let out = sbs.call(&StageContext::standalone(), tape);
    let composite = out.image(-1).unwrap();

    assert_eq!(composite.dimensions(), (50 + 2 + 50, 40));
    assert_eq!(*composite.get_pixel(25, 20), Rgb([30, 30, 30]));
    assert_eq!(*composite.get_pixel(50, 20), Rgb([0, 0, 0]));
    assert_eq!(*composite.get_pixel(77, 20), Rgb([220, 220, 220]));
}

#[test]
fn test_sbs_vertical_stack() {
    let tape = TapeBuilder::new()
        .image(40, 20, 30)
        .image(40, 20, 220)
        .build();
    let out = SideBySide::new(0, 1)
        .with_factor(1)
        .flipped(true)
        .call(&StageContext::standalone(), tape);

    let composite = out.image(-1).unwrap();
    assert_eq!(composite.dimensions(), (40, 20 + 2 + 20));
    assert_eq!(*composite.get_pixel(5, 30), Rgb([220, 220, 220]));
}

#[test]
fn test_sbs_passes_single_side_through() {
    let tape = TapeBuilder::new().text("no image").image(30, 20, 77).build();
    let out = SideBySide::new(0, 1).call(&StageContext::standalone(), tape);
    let passed = out.image(-1).unwrap();
    assert_eq!(passed.dimensions(), (30, 20));
    assert_eq!(*passed.get_pixel(0, 0), Rgb([77, 77, 77]));
}

#[test]
fn test_zero_factor_rejected_at_start() {
    let graph = Graph::new();
    let mut chain = Pipeline::new(&graph);
    chain.add(TestPattern::new(16, 16));
    chain.add(Inlay::from_config(InlayConfig {
        factor: 0,
        ..InlayConfig::default()
    }));

    let err = chain.start(false).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_detector_inlay_chain() {
    let graph = Graph::new();
    let mut chain = Pipeline::new(&graph);
    chain.add(TestPattern::new(160, 120));
    chain.add(SlowDetector::new(Duration::ZERO));
    chain.add(Inlay::new(-3, -2, 4));
    chain.add(SideBySide::new(0, -1));

    let tape = chain.pull();
    // frame, annotated, label, inlay, side-by-side
    assert_eq!(tape.len(), 5);
    assert_eq!(tape.text(2), Some("object: 1"));
    assert_eq!(tape.image(3).unwrap().dimensions(), (160, 120));
    assert_eq!(tape.image(4).unwrap().dimensions(), (80 + 2 + 80, 60));
}

#[test]
fn test_solid_helper_dimensions() {
    assert_eq!(solid(3, 2, 0).dimensions(), (3, 2));
}
