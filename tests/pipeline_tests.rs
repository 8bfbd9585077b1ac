mod common;

use common::{entries, pipeline_with, FakeTools};
use parody_generator::{PipelineError, Segment, Stage};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const VIDEO_A: &str = "https://www.youtube.com/watch?v=aaaaaaaaaaa";
const VIDEO_B: &str = "https://youtu.be/bbbbbbbbbbb";
const VIDEO_C: &str = "https://www.youtube.com/embed/ccccccccccc";

#[tokio::test]
async fn test_segments_are_merged_in_request_order() {
    let media = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools::default());
    let (pipeline, retention) = pipeline_with(tools.clone(), media.path());

    // Both sources already cached
    let cache_dir = &pipeline.layout().cache_dir;
    std::fs::create_dir_all(cache_dir).unwrap();
    std::fs::write(cache_dir.join("aaaaaaaaaaa.360p.mp4"), "A").unwrap();
    std::fs::write(cache_dir.join("bbbbbbbbbbb.360p.mp4"), "B").unwrap();

    let segments = vec![Segment::new(VIDEO_A, "0", "10"), Segment::new(VIDEO_B, "0:05", "0:15")];
    let output = assert_ok!(pipeline.run(Some("Order Test"), &segments).await);

    assert_eq!(tools.downloads(), 0);
    assert_eq!(tools.merges(), 1);
    assert_eq!(std::fs::read_to_string(&output.artifact_path).unwrap(), "[A@0+10][B@5+10]");
    assert_eq!(output.segments, 2);
    assert_eq!(output.total_duration_secs, 20);
    assert_eq!(output.suggested_name, "Order Test.m4a");
    assert!(output.artifact_path.starts_with(&pipeline.layout().output_dir));

    assert_eq!(entries(&pipeline.layout().output_dir), vec![output.file_name.clone()]);
    assert!(entries(&pipeline.layout().scratch_dir).is_empty());
    assert_eq!(retention.pending(), 1);
}

#[tokio::test]
async fn test_missing_sources_are_downloaded_once_and_reused() {
    let media = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools::default());
    let (pipeline, _retention) = pipeline_with(tools.clone(), media.path());

    let segments = vec![
        Segment::new(VIDEO_A, "0", "5"),
        Segment::new(VIDEO_A, "10", "12"),
        Segment::new(VIDEO_B, "1:00", "1:01"),
    ];
    let output = assert_ok!(pipeline.run(None, &segments).await);

    assert_eq!(tools.downloads(), 2);
    assert_eq!(
        std::fs::read_to_string(&output.artifact_path).unwrap(),
        format!("[video:{a}@0+5][video:{a}@10+2][video:{b}@60+1]", a = VIDEO_A, b = VIDEO_B)
    );
    assert_eq!(output.suggested_name, output.file_name);
    assert_eq!(
        entries(&pipeline.layout().cache_dir),
        vec!["aaaaaaaaaaa.360p.mp4", "bbbbbbbbbbb.360p.mp4"]
    );
}

#[tokio::test]
async fn test_extraction_failure_leaves_nothing_behind() {
    let media = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools::failing_extraction(2));
    let (pipeline, retention) = pipeline_with(tools.clone(), media.path());

    let segments = vec![
        Segment::new(VIDEO_A, "0", "5"),
        Segment::new(VIDEO_B, "0", "5"),
        Segment::new(VIDEO_C, "0", "5"),
    ];
    let err = assert_err!(pipeline.run(Some("broken"), &segments).await);

    assert_eq!(err.stage(), Stage::Extraction);
    assert!(matches!(err, PipelineError::Extraction { index: 2, .. }));
    assert_eq!(
        err.details().as_deref(),
        Some("Output file #0 does not contain any stream")
    );

    assert_eq!(tools.downloads(), 3);
    assert_eq!(tools.extractions(), 2);
    assert_eq!(tools.merges(), 0);
    assert!(entries(&pipeline.layout().output_dir).is_empty());
    assert!(entries(&pipeline.layout().scratch_dir).is_empty());
    assert_eq!(retention.pending(), 0);
}

#[tokio::test]
async fn test_invalid_request_never_reaches_tools() {
    let media = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools::default());
    let (pipeline, _retention) = pipeline_with(tools.clone(), media.path());

    let segments: Vec<Segment> = (0..11).map(|_| Segment::new(VIDEO_A, "0", "5")).collect();
    let err = assert_err!(pipeline.run(None, &segments).await);

    match err {
        PipelineError::Validation(result) => {
            assert!(!result.is_valid);
            assert_eq!(result.global_errors[0].to_string(), "Maximum 10 segments allowed");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(tools.downloads() + tools.extractions() + tools.merges(), 0);
    assert!(!media.path().join("output").exists());
}

#[tokio::test]
async fn test_source_links_cannot_reach_outside_the_cache() {
    let root = tempfile::tempdir().unwrap();
    let outside = root.path().join("out");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::write(outside.join("x.360p.mp4"), "SECRET").unwrap();

    let tools = Arc::new(FakeTools::default());
    let (pipeline, retention) = pipeline_with(tools.clone(), &root.path().join("media"));

    let segments = vec![Segment::new("https://youtu.be/../../out/x", "0", "5")];
    let err = assert_err!(pipeline.run(None, &segments).await);

    match err {
        PipelineError::Validation(result) => {
            assert_eq!(result.per_segment_errors["segment-1"][0].to_string(), "Invalid source URL");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(tools.downloads() + tools.extractions() + tools.merges(), 0);
    assert_eq!(retention.pending(), 0);
}

#[tokio::test]
async fn test_unavailable_tools_fail_prerequisites() {
    let media = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools::unavailable());
    let (pipeline, _retention) = pipeline_with(tools.clone(), media.path());

    let err = assert_err!(pipeline.run(None, &[Segment::new(VIDEO_A, "0", "5")]).await);

    assert_eq!(err.stage(), Stage::Prerequisites);
    assert_eq!(tools.downloads(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_share_one_download() {
    let media = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools::default());
    let (pipeline, retention) = pipeline_with(tools.clone(), media.path());

    let first = [Segment::new(VIDEO_A, "0", "5")];
    let second = [Segment::new(VIDEO_A, "5", "10")];
    let (a, b) = tokio::join!(pipeline.run(None, &first), pipeline.run(None, &second));
    let (a, b) = (assert_ok!(a), assert_ok!(b));

    assert_eq!(tools.downloads(), 1);
    assert_ne!(a.artifact_path, b.artifact_path);
    assert_eq!(
        std::fs::read_to_string(&b.artifact_path).unwrap(),
        format!("[video:{}@5+5]", VIDEO_A)
    );
    assert_eq!(entries(&pipeline.layout().cache_dir), vec!["aaaaaaaaaaa.360p.mp4"]);
    assert_eq!(entries(&pipeline.layout().output_dir).len(), 2);
    assert!(entries(&pipeline.layout().scratch_dir).is_empty());
    assert_eq!(retention.pending(), 2);
}
