//! End-to-end session behaviour: navigation, buffer reuse and result delivery

mod common;

use common::{patterned, patterned_source, session_with, solid_subject, subject};
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use subject_cutout::{
    pack_rgba, BoundingBox, CallbackSegmenter, CutoutError, FailureReason, ImageSource,
    MockSegmenter, SegmentationResult, SegmentationSession, SessionOutcome, SessionStatus,
    Threshold, TRANSPARENT,
};

#[tokio::test]
async fn test_masking_example_two_by_two() {
    let image = RgbaImage::from_vec(
        2,
        2,
        vec![
            10, 0, 0, 255, // A
            20, 0, 0, 255, // B
            30, 0, 0, 255, // C
            40, 0, 0, 255, // D
        ],
    )
    .unwrap();
    let mock = MockSegmenter::new();
    mock.push_subjects(vec![subject(0, 0, 2, 2, vec![0.8, 0.3, 0.8, 0.8])]);
    let mut session = session_with(&mock);

    session.process(&ImageSource::decoded(image)).await.unwrap();
    assert_eq!(session.threshold(), Threshold::DEFAULT);
    assert_eq!(
        session.masked_image().unwrap().as_slice(),
        &[
            pack_rgba([10, 0, 0, 255]),
            TRANSPARENT,
            pack_rgba([30, 0, 0, 255]),
            pack_rgba([40, 0, 0, 255]),
        ]
    );
    assert_eq!(session.bounding_box(), Some(BoundingBox::new(0, 0, 1, 1)));
}

#[tokio::test]
async fn test_all_below_threshold_has_no_bounds() {
    let mock = MockSegmenter::new();
    mock.push_subjects(vec![subject(0, 0, 2, 2, vec![0.1; 4])]);
    let mut session = session_with(&mock);

    let outcome = session.process(&patterned_source(2, 2)).await.unwrap();
    assert_eq!(outcome, SessionOutcome::SubjectsFound(1));
    assert!(session
        .masked_image()
        .unwrap()
        .as_slice()
        .iter()
        .all(|&pixel| pixel == TRANSPARENT));
    assert_eq!(session.bounding_box(), None);
    assert!(matches!(
        session.export_current(),
        Err(CutoutError::EmptyMask)
    ));
}

#[tokio::test]
async fn test_threshold_clamp_is_idempotent() {
    let ramp: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
    let mock = MockSegmenter::new();
    mock.push_subjects(vec![subject(0, 0, 10, 1, ramp)]);
    let mut session = session_with(&mock);
    session.process(&patterned_source(10, 1)).await.unwrap();

    let mut raised = 0;
    while session.increase_threshold().unwrap() {
        raised += 1;
    }
    assert_eq!(raised, 3);
    assert_eq!(session.threshold(), Threshold::MAX);
    let at_max = session.masked_image().unwrap().as_slice().to_vec();
    let bounds_at_max = session.bounding_box();

    let passes_at_max = session.composite_passes();

    for _ in 0..5 {
        assert!(!session.increase_threshold().unwrap());
        assert_eq!(session.composite_passes(), passes_at_max);
        assert_eq!(session.threshold(), Threshold::MAX);
        assert_eq!(session.masked_image().unwrap().as_slice(), at_max.as_slice());
        assert_eq!(session.bounding_box(), bounds_at_max);
    }

    let mut lowered = 0;
    while session.decrease_threshold().unwrap() {
        lowered += 1;
    }
    assert_eq!(lowered, 8);
    assert_eq!(session.threshold(), Threshold::MIN);
    let passes_at_min = session.composite_passes();
    assert!(!session.decrease_threshold().unwrap());
    assert_eq!(session.composite_passes(), passes_at_min);
    assert_eq!(session.bounding_box(), Some(BoundingBox::new(1, 0, 9, 0)));

    // Mixed sequences never leave the range
    for step in 0..40 {
        if step % 3 == 0 {
            session.decrease_threshold().unwrap();
        } else {
            session.increase_threshold().unwrap();
        }
        let value = session.threshold().value();
        assert!((0.1..=0.9).contains(&value));
    }
}

#[tokio::test]
async fn test_subject_wraparound_reproduces_mask() {
    let mock = MockSegmenter::new();
    mock.push_subjects(vec![
        subject(0, 0, 3, 2, vec![0.9, 0.2, 0.7, 0.61, 0.59, 1.0]),
        solid_subject(2, 1, 2, 2),
        subject(1, 0, 1, 3, vec![0.6, 0.0, 0.6]),
    ]);
    let mut session = session_with(&mock);
    session.process(&patterned_source(4, 3)).await.unwrap();

    let original = session.masked_image().unwrap().as_slice().to_vec();
    let original_bounds = session.bounding_box();
    session.increase_threshold().unwrap();

    for _ in 0..3 {
        assert!(session.next_subject().unwrap());
    }
    assert_eq!(session.subject_index(), 0);
    assert_eq!(session.threshold(), Threshold::DEFAULT);
    assert_eq!(session.masked_image().unwrap().as_slice(), original.as_slice());
    assert_eq!(session.bounding_box(), original_bounds);
}

#[tokio::test]
async fn test_single_subject_does_not_cycle() {
    let mock = MockSegmenter::new();
    mock.push_subjects(vec![solid_subject(0, 0, 2, 2)]);
    let mut session = session_with(&mock);
    session.process(&patterned_source(2, 2)).await.unwrap();
    session.decrease_threshold().unwrap();

    assert!(!session.next_subject().unwrap());
    assert_eq!(session.threshold().steps(), 5);
}

#[tokio::test]
async fn test_buffers_only_grow() {
    let sizes = [(40, 25), (5, 2), (100, 50)];
    let mock = MockSegmenter::new();
    for (width, height) in sizes {
        mock.push_subjects(vec![solid_subject(0, 0, width, height)]);
    }
    let mut session = session_with(&mock);

    let mut largest = 0;
    let (mut last_raw, mut last_output) = (0, 0);
    for (width, height) in sizes {
        session
            .process(&patterned_source(width, height))
            .await
            .unwrap();
        largest = largest.max((width * height) as usize);

        let (raw, output) = (session.raw_capacity(), session.output_capacity());
        assert!(raw >= last_raw && output >= last_output);
        assert!(raw >= largest && output >= largest);
        assert_eq!(
            session.masked_image().unwrap().dimensions(),
            (width, height)
        );
        (last_raw, last_output) = (raw, output);
    }
}

#[tokio::test]
async fn test_smaller_image_reuses_storage_and_masks_correctly() {
    let mock = MockSegmenter::new();
    mock.push_subjects(vec![solid_subject(0, 0, 8, 8)]);
    mock.push_subjects(vec![subject(1, 1, 2, 1, vec![1.0, 0.0])]);
    let mut session = session_with(&mock);

    session.process(&patterned_source(8, 8)).await.unwrap();
    let capacity = session.raw_capacity();

    let small = patterned(3, 3);
    session
        .process(&ImageSource::decoded(small.clone()))
        .await
        .unwrap();
    assert_eq!(session.raw_capacity(), capacity);
    assert_eq!(session.raw_image().width(), 3);

    let masked = session.masked_image().unwrap();
    assert_eq!(masked.as_slice().len(), 2);
    assert_eq!(masked.get(0, 0), Some(pack_rgba(small.get_pixel(1, 1).0)));
    assert_eq!(masked.get(1, 0), Some(TRANSPARENT));
}

#[tokio::test]
async fn test_callback_model_delivers_once() {
    let segmenter = CallbackSegmenter::new("callback-model", |image, completion| {
        let subjects = vec![solid_subject(0, 0, image.width(), image.height())];
        let delivered = completion.complete(Ok(SegmentationResult::new(subjects)));
        assert!(delivered);
    });
    let mut session = SegmentationSession::new(Arc::new(segmenter));

    let outcome = session.process(&patterned_source(3, 2)).await.unwrap();
    assert_eq!(outcome, SessionOutcome::SubjectsFound(1));
    assert_eq!(session.segmenter_name(), "callback-model");
    assert_eq!(session.bounding_box(), Some(BoundingBox::new(0, 0, 2, 1)));
}

#[tokio::test]
async fn test_callback_model_that_never_answers() {
    let segmenter = CallbackSegmenter::new("silent", |_image, completion| drop(completion));
    let mut session = SegmentationSession::new(Arc::new(segmenter));

    let outcome = session.process(&patterned_source(3, 3)).await.unwrap();
    assert!(matches!(
        outcome,
        SessionOutcome::Failed(FailureReason::ModelUnavailable(_))
    ));
    assert!(matches!(session.status(), SessionStatus::Failed(_)));
}

#[tokio::test]
async fn test_two_phase_late_result_is_discarded() {
    let mut session = session_with(&MockSegmenter::new());
    let first_image = RgbaImage::from_pixel(2, 2, Rgba([200, 0, 0, 255]));
    let second_image = RgbaImage::from_pixel(2, 2, Rgba([0, 200, 0, 255]));

    let first = session.begin(&first_image).unwrap();
    assert!(session.abandon());
    let second = session.begin(&second_image).unwrap();

    // The slow answer for the first image arrives after the second request went out
    let late = session.complete(
        first,
        Ok(SegmentationResult::new(vec![solid_subject(0, 0, 2, 2)])),
    );
    assert!(matches!(
        late,
        Err(CutoutError::StaleResult { ticket, current })
            if ticket == first.generation() && current == second.generation()
    ));
    assert!(matches!(
        session.status(),
        SessionStatus::Submitting { generation } if *generation == second.generation()
    ));

    // process() refuses to start while the two-phase request is open
    assert!(matches!(
        session.process(&patterned_source(2, 2)).await,
        Err(CutoutError::SessionBusy { .. })
    ));

    session
        .complete(
            second,
            Ok(SegmentationResult::new(vec![solid_subject(0, 0, 2, 2)])),
        )
        .unwrap();
    assert_eq!(
        session.masked_image().unwrap().get(0, 0),
        Some(pack_rgba([0, 200, 0, 255]))
    );
}
