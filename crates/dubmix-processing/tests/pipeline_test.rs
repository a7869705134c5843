mod helpers;

use bytes::Bytes;
use dubmix_core::{SourcePair, TrackRole};
use dubmix_processing::{
    DeliveryMode, FetchError, JobControl, MergeFailure, MergeOutcome, MergeRequest, MuxError,
};
use dubmix_storage::Storage;
use helpers::catalog::InMemoryCatalog;
use helpers::engine::{fake_audio, fake_video, FakeEngine};
use helpers::{PipelineBuilder, TestPipeline, OWNER};
use std::time::Duration;
use tokio::sync::mpsc;

fn persisted(outcome: MergeOutcome) -> dubmix_core::CatalogEntry {
    match outcome {
        MergeOutcome::Persisted(entry) => entry,
        MergeOutcome::Delivered(_) => panic!("expected a persisted merge"),
    }
}

#[tokio::test]
async fn test_merge_video_with_shorter_voice_over() {
    let pipeline = TestPipeline::new().await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let entry = persisted(
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair), JobControl::default())
            .await
            .unwrap(),
    );

    assert!(!entry.is_public);
    assert_eq!(entry.owner_id, OWNER);
    assert_eq!(entry.duration_secs, Some(5.0));
    assert!(entry.video_key.starts_with("user_videos/user-1/"));
    assert!(entry.thumbnail_url.is_some());
    assert!(entry.short_url.as_deref().unwrap().ends_with(&entry.short_id));
    assert_eq!(pipeline.catalog.len(), 1);

    let merged = pipeline.storage.read_object(&entry.video_key);
    assert_eq!(String::from_utf8(merged).unwrap(), "merged:5:audio:3");
    assert_eq!(pipeline.scratch_entries(), 0);
}

#[tokio::test]
async fn test_missing_audio_fails_without_catalog_write() {
    let pipeline = TestPipeline::new().await;
    let video_url = pipeline.seed("videos/sample.mp4", fake_video(5.0)).await;
    let pair = SourcePair::new(video_url, "recordings/user-1/missing.webm", OWNER);

    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MergeFailure::Fetch {
            role: TrackRole::Audio,
            source: FetchError::NotFound(_)
        }
    ));
    assert_eq!(err.reason_code(), "FETCH_NOT_FOUND");
    assert_eq!(pipeline.catalog.insert_calls(), 0);
    assert_eq!(pipeline.engine.compose_calls(), 0);
    assert_eq!(pipeline.scratch_entries(), 0);
}

#[tokio::test]
async fn test_mux_timeout_removes_scratch_files() {
    let pipeline = PipelineBuilder::new()
        .engine(FakeEngine {
            compose_error: Some(MuxError::Timeout { after_secs: 300 }),
            ..FakeEngine::default()
        })
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MergeFailure::Mux(MuxError::Timeout { .. })));
    assert_eq!(pipeline.scratch_entries(), 0);
    assert_eq!(pipeline.storage.count_objects("user_videos"), 0);
    assert_eq!(pipeline.catalog.len(), 0);
}

#[tokio::test]
async fn test_thumbnail_publish_failure_keeps_merge() {
    let pipeline = PipelineBuilder::new()
        .failing_uploads_under("user_thumbnails/")
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let entry = persisted(
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair), JobControl::default())
            .await
            .unwrap(),
    );

    assert!(entry.thumbnail_url.is_none());
    assert!(entry.thumbnail_key.is_none());
    assert_eq!(pipeline.catalog.len(), 1);
}

#[tokio::test]
async fn test_thumbnail_extraction_failure_keeps_merge() {
    let pipeline = PipelineBuilder::new()
        .engine(FakeEngine {
            thumbnail_fails: true,
            ..FakeEngine::default()
        })
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let entry = persisted(
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair), JobControl::default())
            .await
            .unwrap(),
    );
    assert!(entry.thumbnail_url.is_none());
}

#[tokio::test]
async fn test_short_video_thumbnail_taken_at_start() {
    let pipeline = TestPipeline::new().await;
    let pair = pipeline
        .seed_pair(fake_video(0.5), fake_audio(3.0))
        .await;

    let entry = persisted(
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair), JobControl::default())
            .await
            .unwrap(),
    );

    assert_eq!(pipeline.engine.thumbnail_offsets(), vec![0.0]);
    let thumb = pipeline
        .storage
        .read_object(entry.thumbnail_key.as_deref().unwrap());
    assert_eq!(thumb, b"png:0");
}

#[tokio::test]
async fn test_zero_byte_video_is_not_found() {
    let pipeline = TestPipeline::new().await;
    let pair = pipeline.seed_pair(Vec::new(), fake_audio(3.0)).await;

    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MergeFailure::Fetch {
            role: TrackRole::Video,
            source: FetchError::NotFound(_)
        }
    ));
    assert_eq!(pipeline.engine.compose_calls(), 0);
    assert_eq!(pipeline.scratch_entries(), 0);
}

#[tokio::test]
async fn test_retrigger_of_consumed_pair_is_rejected() {
    let pipeline = TestPipeline::new().await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let first = persisted(
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair.clone()), JobControl::default())
            .await
            .unwrap(),
    );

    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MergeFailure::AlreadyConsumed { entry_id } if entry_id == first.id));

    // Same objects named by raw key instead of URL.
    let by_key = SourcePair::new("videos/sample.mp4", "recordings/user-1/voice.webm", OWNER);
    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(by_key), JobControl::default())
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "ALREADY_CONSUMED");

    assert_eq!(pipeline.catalog.len(), 1);
    assert_eq!(pipeline.engine.compose_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_trigger_for_same_pair_is_in_flight() {
    let pipeline = PipelineBuilder::new()
        .engine(FakeEngine {
            compose_delay: Some(Duration::from_millis(200)),
            ..FakeEngine::default()
        })
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let (a, b) = tokio::join!(
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair.clone()), JobControl::default()),
        pipeline
            .orchestrator
            .run(MergeRequest::from_pair(pair), JobControl::default()),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(MergeFailure::InFlight))));
    assert_eq!(pipeline.catalog.len(), 1);
}

#[tokio::test]
async fn test_catalog_exhaustion_compensates_uploads() {
    let pipeline = PipelineBuilder::new()
        .catalog(InMemoryCatalog::failing(u32::MAX))
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MergeFailure::Catalog(_)));
    assert!(err.is_retryable());
    assert_eq!(pipeline.catalog.insert_calls(), 3);
    assert_eq!(pipeline.catalog.len(), 0);
    assert!(pipeline.wait_until_empty("user_videos").await);
    assert!(pipeline.wait_until_empty("user_thumbnails").await);
}

#[tokio::test]
async fn test_transient_catalog_failure_is_retried() {
    let pipeline = PipelineBuilder::new()
        .catalog(InMemoryCatalog::failing(2))
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap();

    assert_eq!(pipeline.catalog.insert_calls(), 3);
    assert_eq!(pipeline.catalog.len(), 1);
    assert_eq!(pipeline.storage.count_objects("user_videos"), 1);
}

#[tokio::test]
async fn test_dropped_run_still_records_published_merge() {
    let pipeline = PipelineBuilder::new()
        .catalog(InMemoryCatalog::failing(1))
        .catalog_retry_base(Duration::from_millis(300))
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let run = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default());
    tokio::select! {
        _ = run => panic!("merge finished during the catalog backoff"),
        _ = async {
            while pipeline.catalog.insert_calls() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        } => {}
    }

    for _ in 0..100 {
        if pipeline.catalog.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let entries = pipeline.catalog.entries();
    assert_eq!(entries.len(), 1);
    assert!(pipeline.storage.exists(&entries[0].video_key).await.unwrap());
    assert_eq!(pipeline.storage.count_objects("user_videos"), 1);
    assert_eq!(pipeline.storage.count_objects("user_thumbnails"), 1);
}

#[tokio::test]
async fn test_cancel_during_compose_cleans_up() {
    let pipeline = PipelineBuilder::new()
        .engine(FakeEngine {
            compose_delay: Some(Duration::from_secs(10)),
            ..FakeEngine::default()
        })
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let control = JobControl::default();
    let cancel = control.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = std::time::Instant::now();
    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), control)
        .await
        .unwrap_err();

    assert!(matches!(err, MergeFailure::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pipeline.scratch_entries(), 0);
    assert_eq!(pipeline.storage.count_objects("user_videos"), 0);
    assert_eq!(pipeline.catalog.len(), 0);
}

#[tokio::test]
async fn test_engine_unavailable_is_not_retryable() {
    let pipeline = PipelineBuilder::new()
        .engine(FakeEngine {
            unavailable: true,
            ..FakeEngine::default()
        })
        .build()
        .await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MergeFailure::EngineUnavailable(_)));
    assert!(!err.is_retryable());
    assert_eq!(pipeline.scratch_entries(), 0);
}

#[tokio::test]
async fn test_invalid_sources_rejected_before_fetch() {
    let pipeline = TestPipeline::new().await;

    let no_owner = SourcePair::new("videos/a.mp4", "recordings/a.webm", "  ");
    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(no_owner), JobControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MergeFailure::InvalidInput(_)));

    let foreign = SourcePair::new(
        "https://elsewhere.example/videos/a.mp4",
        "recordings/a.webm",
        OWNER,
    );
    let err = pipeline
        .orchestrator
        .run(MergeRequest::from_pair(foreign), JobControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MergeFailure::InvalidInput(_)));

    let mut inline = MergeRequest::inline(Bytes::from_static(b"v"), Bytes::from_static(b"a"));
    inline.mode = DeliveryMode::Persist;
    inline.owner_id = Some(OWNER.to_string());
    let err = pipeline
        .orchestrator
        .run(inline, JobControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MergeFailure::InvalidInput(_)));

    assert_eq!(pipeline.engine.compose_calls(), 0);
}

#[tokio::test]
async fn test_inline_merge_returns_artifacts_without_storing() {
    let pipeline = TestPipeline::new().await;
    let request = MergeRequest::inline(
        Bytes::from(fake_video(4.0)),
        Bytes::from(fake_audio(6.0)),
    );

    let outcome = pipeline
        .orchestrator
        .run(request, JobControl::default())
        .await
        .unwrap();

    let MergeOutcome::Delivered(artifacts) = outcome else {
        panic!("expected delivered artifacts");
    };
    assert_eq!(&artifacts.video[..], b"merged:4:audio:6");
    assert_eq!(artifacts.thumbnail.as_deref(), Some(&b"png:1"[..]));
    assert_eq!(artifacts.duration_secs, Some(4.0));
    assert_eq!(pipeline.catalog.insert_calls(), 0);
    assert_eq!(pipeline.storage.count_objects("user_videos"), 0);
    assert_eq!(pipeline.scratch_entries(), 0);
}

#[tokio::test]
async fn test_progress_follows_state_order() {
    let pipeline = TestPipeline::new().await;
    let pair = pipeline
        .seed_pair(fake_video(5.0), fake_audio(3.0))
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    pipeline
        .orchestrator
        .run(MergeRequest::from_pair(pair), JobControl::with_progress(tx))
        .await
        .unwrap();

    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        states.push(event.state);
    }
    assert_eq!(
        states,
        vec![
            "fetching",
            "composing",
            "thumbnail_extracting",
            "publishing",
            "recording",
            "done"
        ]
    );
}
