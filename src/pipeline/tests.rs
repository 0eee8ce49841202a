use super::test_helpers::{
    FailingReader, RecordingAnalyzer, RecordingNotifier, create_test_pulse, files_under, gzip,
    wait_for_job,
};
use super::*;
use crate::error::PipelineError;
use std::time::Duration;
use tokio::sync::Semaphore;

fn pulse_parts() -> (Arc<RecordingAnalyzer>, Arc<RecordingNotifier>) {
    (
        Arc::new(RecordingAnalyzer::default()),
        Arc::new(RecordingNotifier::default()),
    )
}

#[tokio::test]
async fn test_plain_upload_end_to_end() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer.clone(), notifier.clone()).await;
    let mut events = pulse.subscribe();

    let ack = pulse
        .ingest_bytes("access.log", "u@x.com", b"a\nb\nc\n".to_vec())
        .await
        .unwrap();
    assert_eq!(ack.cache_target, "access.logu@x.com.json");
    assert_eq!(ack.status, Status::Accepted);

    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Complete);
    assert_eq!(job.lines_streamed, 3);
    assert_eq!(job.records_dispatched, 3);
    assert_eq!(analyzer.seen(), vec!["a", "b", "c"]);

    let deliveries = notifier.deliveries();
    assert_eq!(deliveries.len(), 1, "dispatch happens exactly once");
    assert_eq!(deliveries[0].recipient, "u@x.com");
    assert_eq!(deliveries[0].records.len(), 3);

    assert!(files_under(&dir.path().join("temp")).is_empty());
    assert!(files_under(&dir.path().join("cache")).is_empty());

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
    }
    assert_eq!(
        kinds,
        vec!["accepted", "streaming", "dispatching", "complete"]
    );
}

#[tokio::test]
async fn test_gzip_upload_matches_plain_and_removes_both_files() {
    let content = b"first\r\nsecond\n\nfourth";
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer.clone(), notifier.clone()).await;

    let ack = pulse
        .ingest_bytes("big.log.gz", "ops@x.com", gzip(content))
        .await
        .unwrap();
    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Complete, "{:?}", job.error);
    assert!(job.compressed);
    assert_eq!(analyzer.seen(), vec!["first", "second", "", "fourth"]);
    assert_eq!(notifier.deliveries()[0].records.len(), 4);

    let work_dir = dir.path().join("temp").join(format!("job-{}", ack.job_id));
    assert!(!work_dir.join("big.log.gz").exists());
    assert!(!work_dir.join("big.log").exists());
    assert!(files_under(&dir.path().join("temp")).is_empty());
    assert!(!dir.path().join("cache").join("big.log.gzops@x.com.json").exists());
}

#[tokio::test]
async fn test_conflict_while_in_progress_then_resubmission_accepted() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = Arc::new(RecordingAnalyzer::gated(gate.clone()));
    let (pulse, _dir) =
        create_test_pulse(analyzer.clone(), Arc::new(RecordingNotifier::default())).await;

    let first = pulse
        .ingest_bytes("access.log", "u@x.com", b"a\n".to_vec())
        .await
        .unwrap();

    let err = pulse
        .ingest_bytes("access.log", "u@x.com", b"b\n".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Pipeline(PipelineError::ConflictInProgress { ref cache_target })
            if cache_target == "access.logu@x.com.json"
    ));

    // A different recipient derives a different target
    let other = pulse
        .ingest_bytes("access.log", "v@x.com", b"c\n".to_vec())
        .await
        .unwrap();

    gate.add_permits(2);
    assert_eq!(wait_for_job(&pulse, first.job_id).await.status, Status::Complete);
    assert_eq!(wait_for_job(&pulse, other.job_id).await.status, Status::Complete);

    gate.add_permits(1);
    let again = pulse
        .ingest_bytes("access.log", "u@x.com", b"d\n".to_vec())
        .await
        .unwrap();
    assert_eq!(wait_for_job(&pulse, again.job_id).await.status, Status::Complete);
}

#[tokio::test]
async fn test_concurrent_same_target_single_acceptance() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = Arc::new(RecordingAnalyzer::gated(gate.clone()));
    let (pulse, _dir) = create_test_pulse(analyzer, Arc::new(RecordingNotifier::default())).await;

    let attempts = (0..8).map(|_| {
        let pulse = pulse.clone();
        tokio::spawn(async move {
            pulse
                .ingest_bytes("race.log", "u@x.com", b"x\n".to_vec())
                .await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let accepted = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(accepted, 1);
    gate.add_permits(1);
}

#[tokio::test]
async fn test_mid_stream_failure_closes_analyzer_and_cleans_up() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer.clone(), notifier.clone()).await;

    let reservation = pulse.reserve("stream.log", "u@x.com").await.unwrap();
    let target = reservation.cache_target.clone();
    let job = reservation.into_job(JobSource::Upload(Box::new(FailingReader::new(
        b"one\ntwo\n",
    ))));
    let ack = pulse.submit(job);

    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Failed);
    assert_eq!(job.lines_streamed, 2);
    assert!(job.error.unwrap().contains("stream read failed"));
    assert_eq!(analyzer.finished_runs(), 1, "analyzer input was closed");
    assert!(notifier.deliveries().is_empty(), "partial results never dispatched");
    assert!(!pulse.dispatcher.exists_in_progress(&target).await);
    assert!(files_under(&dir.path().join("cache")).is_empty());
    assert!(files_under(&dir.path().join("temp")).is_empty());
}

#[tokio::test]
async fn test_analyzer_failure_mid_stream_removes_files_on_disk() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = Arc::new(RecordingAnalyzer::gated(gate.clone()).fail_after(3));
    let notifier = Arc::new(RecordingNotifier::default());
    let (pulse, dir) = create_test_pulse(analyzer.clone(), notifier.clone()).await;
    let mut events = pulse.subscribe();

    let content: String = (1..=200).map(|n| format!("line {n}\n")).collect();
    let ack = pulse
        .ingest_bytes("huge.log.gz", "u@x.com", gzip(content.as_bytes()))
        .await
        .unwrap();
    let work_dir = dir.path().join("temp").join(format!("job-{}", ack.job_id));
    let cache_file = dir.path().join("cache").join("huge.log.gzu@x.com.json");

    loop {
        if let Ok(Event::Streaming { id }) = events.recv().await
            && id == ack.job_id
        {
            break;
        }
    }
    assert!(work_dir.join("huge.log.gz").exists());
    assert!(work_dir.join("huge.log").exists());
    assert!(cache_file.exists());

    gate.add_permits(1);
    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Failed);
    assert!(job.error.unwrap().contains("rejected line 4"));
    assert_eq!(analyzer.seen().len(), 3);
    assert!(notifier.deliveries().is_empty());
    assert!(!work_dir.exists());
    assert!(!cache_file.exists());
    assert!(!pulse.dispatcher.exists_in_progress("huge.log.gzu@x.com.json").await);
    assert!(files_under(&dir.path().join("temp")).is_empty());
    assert!(files_under(&dir.path().join("cache")).is_empty());
}

#[tokio::test]
async fn test_analyzer_failure_removes_spooled_plain_file() {
    let analyzer = Arc::new(RecordingAnalyzer::default().fail_after(1));
    let notifier = Arc::new(RecordingNotifier::default());
    let (pulse, dir) = create_test_pulse(analyzer, notifier.clone()).await;

    let reservation = pulse.reserve("spooled.log", "u@x.com").await.unwrap();
    let mut spool = pulse.create_spool(&reservation).await.unwrap();
    super::job::write_spool(&mut spool, b"one\ntwo\nthree\n").await.unwrap();
    drop(spool);
    let spool_path = reservation.spool_path();
    let work_dir = reservation.work_dir.clone();
    let cache_file = dir.path().join("cache").join(&reservation.cache_target);
    assert!(spool_path.exists());
    assert!(cache_file.exists());

    let ack = pulse.submit(reservation.into_job(JobSource::File {
        path: spool_path.clone(),
        compressed: false,
    }));
    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Failed);
    assert!(notifier.deliveries().is_empty());
    assert!(!spool_path.exists());
    assert!(!work_dir.exists());
    assert!(!cache_file.exists());
    assert!(files_under(&dir.path().join("temp")).is_empty());
}

#[tokio::test]
async fn test_stale_cleanup_keeps_resubmitted_reservation() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer, notifier).await;

    let first = pulse.reserve("access.log", "u@x.com").await.unwrap();
    let target = first.cache_target.clone();
    pulse
        .dispatcher
        .dispatch_from_cache(
            &target,
            first.lease,
            crate::notifier::DeliveryTarget {
                job_id: first.id,
                recipient: first.recipient.clone(),
                filename: first.filename.clone(),
            },
        )
        .await
        .unwrap();
    assert!(!pulse.dispatcher.exists_in_progress(&target).await);

    // A resubmission takes the target before the first job's cleanup runs
    let second = pulse.reserve("access.log", "u@x.com").await.unwrap();
    assert!(pulse.cleanup(&first, &[]).await.is_empty());

    assert!(pulse.dispatcher.exists_in_progress(&target).await);
    assert!(dir.path().join("cache").join(&target).exists());
    assert!(matches!(
        pulse.reserve("access.log", "u@x.com").await,
        Err(Error::Pipeline(PipelineError::ConflictInProgress { .. }))
    ));

    assert!(pulse.cleanup(&second, &[]).await.is_empty());
    assert!(!pulse.dispatcher.exists_in_progress(&target).await);
}

#[tokio::test]
async fn test_decompression_failure_starts_no_analyzer() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer.clone(), notifier.clone()).await;

    let ack = pulse
        .ingest_bytes("broken.log.gz", "u@x.com", b"not gzip".to_vec())
        .await
        .unwrap();
    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Failed);
    assert!(job.error.unwrap().contains("decompression failed"));
    assert_eq!(analyzer.finished_runs(), 0);
    assert!(notifier.deliveries().is_empty());
    assert!(files_under(&dir.path().join("temp")).is_empty());
    assert!(files_under(&dir.path().join("cache")).is_empty());
}

#[tokio::test]
async fn test_failed_dispatch_still_releases_target() {
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let (pulse, dir) = create_test_pulse(analyzer, Arc::new(RecordingNotifier::failing())).await;

    let ack = pulse
        .ingest_bytes("access.log", "u@x.com", b"a\n".to_vec())
        .await
        .unwrap();
    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Failed);
    assert_eq!(job.records_dispatched, 0);
    assert!(files_under(&dir.path().join("cache")).is_empty());

    // The target is free again
    assert!(
        pulse
            .ingest_bytes("access.log", "u@x.com", b"a\n".to_vec())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_cleanup_leaves_other_jobs_artifacts() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = Arc::new(RecordingAnalyzer::gated(gate.clone()));
    let (pulse, dir) = create_test_pulse(analyzer, Arc::new(RecordingNotifier::default())).await;
    let mut events = pulse.subscribe();

    let held = pulse
        .ingest_bytes("held.log.gz", "u@x.com", gzip(b"x\ny\n"))
        .await
        .unwrap();
    let held_dir = dir.path().join("temp").join(format!("job-{}", held.job_id));

    // Wait until the held job has decompressed and is blocked on the analyzer
    loop {
        if let Ok(Event::Streaming { id }) = events.recv().await
            && id == held.job_id
        {
            break;
        }
    }
    assert!(held_dir.join("held.log").exists());

    let failing = pulse
        .ingest_bytes("other.log.gz", "u@x.com", b"garbage".to_vec())
        .await
        .unwrap();
    assert_eq!(wait_for_job(&pulse, failing.job_id).await.status, Status::Failed);

    assert!(held_dir.join("held.log.gz").exists());
    assert!(held_dir.join("held.log").exists());
    assert!(dir.path().join("cache").join("held.log.gzu@x.com.json").exists());

    gate.add_permits(1);
    assert_eq!(wait_for_job(&pulse, held.job_id).await.status, Status::Complete);
    assert!(!held_dir.exists());
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer, notifier).await;

    let reservation = pulse.reserve("again.log.gz", "u@x.com").await.unwrap();
    let mut spool = pulse.create_spool(&reservation).await.unwrap();
    super::job::write_spool(&mut spool, b"bytes").await.unwrap();
    drop(spool);
    let artifacts = vec![reservation.spool_path(), dir.path().join("never-created")];

    assert!(pulse.cleanup(&reservation, &artifacts).await.is_empty());
    assert!(pulse.cleanup(&reservation, &artifacts).await.is_empty());
    assert!(!reservation.work_dir.exists());
}

#[tokio::test]
async fn test_job_deadline_fails_stalled_job() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = Arc::new(RecordingAnalyzer::gated(gate.clone()));
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = super::test_helpers::test_config(temp_dir.path());
    config.ingest.job_timeout = Some(Duration::from_millis(200));
    std::fs::create_dir_all(&config.ingest.temp_dir).unwrap();
    std::fs::create_dir_all(&config.ingest.cache_dir).unwrap();
    let db = Database::new(&config.persistence.database_path).await.unwrap();
    let pulse = LogPulse::with_components(
        config,
        db,
        analyzer.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    let ack = pulse
        .ingest_bytes("slow.log", "u@x.com", b"a\nb\nc\nd\ne\n".to_vec())
        .await
        .unwrap();
    let job = wait_for_job(&pulse, ack.job_id).await;

    assert_eq!(job.status, Status::Failed);
    assert!(job.error.unwrap().contains("deadline"));
    assert!(files_under(&temp_dir.path().join("cache")).is_empty());

    // The stalled analyzer was aborted, not left waiting on its gate
    tokio::time::timeout(Duration::from_secs(2), async {
        while analyzer.running() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("analyzer task still running after the deadline");

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(analyzer.seen().is_empty(), "aborted analyzer never read a line");
}

#[tokio::test]
async fn test_validation_rejects_before_allocating() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, dir) = create_test_pulse(analyzer, notifier).await;

    for (filename, recipient) in [("access.log", "not-an-email"), ("", "u@x.com")] {
        let err = pulse
            .ingest_bytes(filename, recipient, b"a\n".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::ValidationFailed { .. })
        ));
    }

    assert!(pulse.list_jobs(None, 10, 0).await.unwrap().is_empty());
    assert!(files_under(&dir.path().join("cache")).is_empty());
}

#[tokio::test]
async fn test_upload_path_is_reduced_to_base_name() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, _dir) = create_test_pulse(analyzer, notifier).await;

    let ack = pulse
        .ingest_bytes("C:\\logs\\access.log", "u@x.com", b"a\n".to_vec())
        .await
        .unwrap();

    assert_eq!(ack.cache_target, "access.logu@x.com.json");
    wait_for_job(&pulse, ack.job_id).await;
}

#[tokio::test]
async fn test_shutdown_waits_and_rejects_new_jobs() {
    let (analyzer, notifier) = pulse_parts();
    let (pulse, _dir) = create_test_pulse(analyzer, notifier.clone()).await;

    pulse
        .ingest_bytes("access.log", "u@x.com", b"a\nb\n".to_vec())
        .await
        .unwrap();
    pulse.shutdown().await.unwrap();

    assert_eq!(pulse.active_jobs(), 0);
    assert_eq!(notifier.deliveries().len(), 1, "in-flight job finished first");
    assert!(!pulse.is_accepting());
    assert!(matches!(
        pulse.reserve("access.log", "u@x.com").await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_new_marks_interrupted_jobs_failed() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = super::test_helpers::test_config(temp_dir.path());

    {
        let db = Database::new(&config.persistence.database_path).await.unwrap();
        db.insert_job(&crate::db::NewJob {
            filename: "crashed.log".to_string(),
            recipient: "u@x.com".to_string(),
            cache_target: "crashed.logu@x.com.json".to_string(),
            compressed: false,
        })
        .await
        .unwrap();
        db.close().await;
    }

    let pulse = LogPulse::new(config).await.unwrap();
    let jobs = pulse.list_jobs(None, 10, 0).await.unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, Status::Failed);
    assert!(pulse.get_job(JobId(999)).await.is_err());
}
