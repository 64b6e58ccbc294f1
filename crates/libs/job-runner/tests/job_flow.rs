//! End-to-end job loop tests
//!
//! These drive whole jobs over synthetic sources and scripted detectors:
//! lifecycle, counter invariants, fan-out behavior, cancellation, time
//! budgets and failure paths.

use std::sync::Arc;
use std::time::Duration;

use headcount_core::{Detector, Error, FrameSource, StaticDetector, SyntheticSource};
use headcount_job_runner::{
    spawn_job, HistoryStore, JobConfig, JobEvent, JobKind, JobManager, JobManagerConfig,
    JobState, RunnerContext, SubscriberError,
};

fn context(detector: Arc<dyn Detector>, history: Arc<HistoryStore>) -> RunnerContext {
    RunnerContext {
        detector,
        history,
        recorder: None,
        output_url: None,
    }
}

fn boxed(source: SyntheticSource) -> Box<dyn FrameSource> {
    Box::new(source)
}

#[tokio::test]
async fn test_video_job_runs_to_done() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::constant(0));

    let job = manager
        .create(JobKind::Video, "empty-hall.mp4", JobConfig::default())
        .await
        .unwrap();
    job.set_media_duration(Some(10.0)).await;

    let source = SyntheticSource::new("empty-hall.mp4", 50);
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history.clone()),
    );
    handle.await.unwrap();

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, JobState::Done);
    assert_eq!(snapshot.max_count, 0);
    assert_eq!(snapshot.frames, 50);

    // A ten-second clip with no detections: one entry, count 0, the
    // probed media duration.
    let entries = history.list().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].count, Some(0));
    assert_eq!(entries[0].duration_seconds, Some(10.0));
    assert_eq!(entries[0].kind, JobKind::Video);
}

#[tokio::test]
async fn test_counter_invariants_across_event_sequence() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::scripted(vec![2, 5, 1, 4, 3]));

    let job = manager
        .create(JobKind::Video, "crowd.mp4", JobConfig::default())
        .await
        .unwrap();
    let mut sub = job.events.subscribe();

    let source = SyntheticSource::new("crowd.mp4", 5);
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history),
    );
    handle.await.unwrap();

    let mut last_max = 0u32;
    loop {
        match sub.next().await.unwrap().unwrap() {
            JobEvent::Frame { count, max_count } => {
                assert!(count <= max_count);
                assert!(max_count >= last_max);
                last_max = max_count;
            }
            JobEvent::Done { max_count, .. } => {
                assert_eq!(max_count, 5);
                break;
            }
            JobEvent::Error { message } => panic!("unexpected error: {}", message),
        }
    }
}

#[tokio::test]
async fn test_late_subscriber_gets_no_backlog() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::scripted((1..=30).collect()));

    let job = manager
        .create(JobKind::Video, "clip.mp4", JobConfig::default())
        .await
        .unwrap();
    let mut early = job.events.subscribe();

    let source = SyntheticSource::new("clip.mp4", 30).with_interval(Duration::from_millis(10));
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history),
    );

    // Wait until at least three events were published, then attach.
    let mut seen = 0u32;
    while seen < 3 {
        if let JobEvent::Frame { count, .. } = early.next().await.unwrap().unwrap() {
            seen = count;
        }
    }
    let mut late = job.events.subscribe();

    match late.next().await.unwrap().unwrap() {
        JobEvent::Frame { count, .. } => assert!(count > 3, "late subscriber saw replayed event {}", count),
        JobEvent::Done { .. } => {}
        JobEvent::Error { message } => panic!("unexpected error: {}", message),
    }

    handle.await.unwrap();
}

#[tokio::test]
async fn test_unread_subscriber_does_not_stall_job() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::constant(1));

    let job = manager
        .create(JobKind::Video, "long.mp4", JobConfig::default())
        .await
        .unwrap();

    // Attach and never read: far more events than the delivery queue
    // holds will be published.
    let mut unread = job.events.subscribe();

    let source = SyntheticSource::new("long.mp4", 600);
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history),
    );

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("job stalled behind an unread subscriber")
        .unwrap();
    assert_eq!(job.state().await, JobState::Done);

    // The abandoned subscriber is dropped with an overflow, not served.
    match unread.next().await {
        Err(SubscriberError::Overflow { missed }) => assert!(missed > 0),
        other => panic!("expected overflow, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancellation_emits_one_terminal_event() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::constant(2));

    let job = manager
        .create(JobKind::Stream, "rtsp://cam/live", JobConfig::default())
        .await
        .unwrap();
    let mut sub = job.events.subscribe();

    let source = SyntheticSource::new("rtsp://cam/live", 100_000)
        .with_interval(Duration::from_millis(5));
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history.clone()),
    );

    // Let a few frames through, then cancel via the manager.
    loop {
        if let JobEvent::Frame { .. } = sub.next().await.unwrap().unwrap() {
            break;
        }
    }
    manager.cancel(&job.id).await.unwrap();
    handle.await.unwrap();

    assert_eq!(job.state().await, JobState::Cancelled);

    // Drain: frames may still be queued, then exactly one terminal event.
    let mut terminals = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(200), sub.next()).await {
            Ok(Ok(Some(event))) => {
                if event.is_terminal() {
                    terminals += 1;
                    assert!(matches!(event, JobEvent::Done { .. }));
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => panic!("subscriber dropped: {}", e),
            Err(_) => break,
        }
    }
    assert_eq!(terminals, 1);
    assert_eq!(history.list().await.len(), 1);
}

#[tokio::test]
async fn test_detector_failure_preserves_partial_counts() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::scripted(vec![1, 3, 2]).failing_after(3));

    let job = manager
        .create(JobKind::Video, "clip.mp4", JobConfig::default())
        .await
        .unwrap();
    let mut sub = job.events.subscribe();

    let source = SyntheticSource::new("clip.mp4", 50);
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history.clone()),
    );
    handle.await.unwrap();

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, JobState::Error);
    assert_eq!(snapshot.frames, 3);
    assert_eq!(snapshot.max_count, 3);

    // Partial counts survive into the history entry.
    let entries = history.list().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].count, Some(3));

    // The last event a consumer sees is the typed error.
    let mut last = None;
    loop {
        match tokio::time::timeout(Duration::from_millis(200), sub.next()).await {
            Ok(Ok(Some(event))) => last = Some(event),
            _ => break,
        }
    }
    match last {
        Some(JobEvent::Error { message }) => assert!(message.contains("scripted failure")),
        other => panic!("expected terminal error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_source_open_failure_is_fast_and_recorded() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::constant(0));

    let job = manager
        .create(JobKind::Stream, "rtsp://unreachable/live", JobConfig::default())
        .await
        .unwrap();
    let mut sub = job.events.subscribe();

    let handle = spawn_job(
        job.clone(),
        async move {
            Err(Error::SourceOpen {
                source_desc: "rtsp://unreachable/live".to_string(),
                reason: "connection refused".to_string(),
            })
        },
        context(detector, history.clone()),
    );

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("open failure must not hang")
        .unwrap();

    assert_eq!(job.state().await, JobState::Error);
    assert_eq!(job.snapshot().await.frames, 0);

    match sub.next().await.unwrap().unwrap() {
        JobEvent::Error { message } => assert!(message.contains("connection refused")),
        other => panic!("expected error event, got {:?}", other),
    }

    // Zero frames processed: the history count is null.
    let entries = history.list().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].count, None);
}

#[tokio::test]
async fn test_stream_time_budget_ends_job() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::constant(1));

    let job = manager
        .create(
            JobKind::Stream,
            "rtsp://cam/live",
            JobConfig {
                max_seconds: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let source = SyntheticSource::new("rtsp://cam/live", 100_000)
        .with_interval(Duration::from_millis(20));
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history.clone()),
    );

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("time budget did not end the job")
        .unwrap();

    let snapshot = job.snapshot().await;
    assert_eq!(snapshot.state, JobState::Done);
    assert!(snapshot.frames > 0);

    let entries = history.list().await;
    assert_eq!(entries.len(), 1);
    // Streams record elapsed wall-clock time.
    assert!(entries[0].duration_seconds.unwrap() >= 1.0);
}

#[tokio::test]
async fn test_two_preview_viewers_attach_at_different_times() {
    let manager = JobManager::new(JobManagerConfig::default());
    let history = Arc::new(HistoryStore::in_memory(100));
    let detector = Arc::new(StaticDetector::constant(1));

    let job = manager
        .create(JobKind::Video, "clip.mp4", JobConfig::default())
        .await
        .unwrap();
    let mut first = job.preview.subscribe();

    let source = SyntheticSource::new("clip.mp4", 40).with_interval(Duration::from_millis(10));
    let handle = spawn_job(
        job.clone(),
        async move { Ok(boxed(source)) },
        context(detector, history),
    );

    let a = first.next().await.expect("first viewer got no frame");

    // Second viewer attaches mid-job and sees only subsequent frames.
    let mut second = job.preview.subscribe();
    let b = second.next().await.expect("second viewer got no frame");
    assert!(b.seq > a.seq, "late viewer saw a frame from before it attached");

    handle.await.unwrap();

    // After the terminal transition both viewers observe the close.
    loop {
        if first.next().await.is_none() {
            break;
        }
    }
    loop {
        if second.next().await.is_none() {
            break;
        }
    }
}

#[tokio::test]
async fn test_history_empty_with_no_finished_jobs() {
    let history = HistoryStore::in_memory(100);
    assert!(history.list().await.is_empty());
}
