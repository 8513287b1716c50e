//! Submission and status polling against a scripted server.
//!
//! Every test runs on tokio's paused clock: sleeps advance virtual time, so
//! the 500 ms poll cadence and the 150 ms reveal delay are exact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client, done_with, entry, failed, request, settle, status, stem, FakeService, Reply};
use stem_modules::config::ClientConfig;
use stem_modules::error::SubmitError;
use stem_modules::job::{Job, JobId, JobMode, JobPhase, JobStatus, JobStatusPoller, Stage, PROCESSING_ERROR_FALLBACK};
use stem_modules::observers::QueueSnapshot;
use stem_modules::session::{Epoch, Session};

const TICK: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Test: stages are mirrored, done lists files, reveal is delayed, polling stops
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn done_lists_files_then_reveals_and_stops_polling() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("j1", "Song")
        .statuses("j1", vec![status("splitting"), status("cleaning"), done_with("120.0", "A minor")])
        .files("j1", Reply::Ok(vec![stem("j1", "vocals.mp3"), stem("j1", "Song[full].mp3")]));
    let client = client(&fake);

    let started = client.submit(request("Song")).await.unwrap();
    assert_eq!(started.job_id, JobId::from("j1"));
    assert_eq!(client.session().snapshot().status(), JobStatus::Downloading);

    settle().await;
    assert_eq!(client.session().snapshot().status(), JobStatus::Splitting);

    tokio::time::sleep(TICK).await;
    let state = client.session().snapshot();
    assert_eq!(state.status(), JobStatus::Cleaning);
    assert_eq!(state.status_text(), "Processing");

    tokio::time::sleep(TICK).await;
    let state = client.session().snapshot();
    assert_eq!(state.status(), JobStatus::Done);
    assert!(!state.busy);
    assert!(!state.show_results, "results must wait for the reveal delay");
    let job = state.job.as_ref().unwrap();
    assert_eq!(job.results().map(<[_]>::len), Some(2));
    let meta = job.meta().unwrap();
    assert_eq!(meta.tempo.as_deref(), Some("120.0"));
    assert_eq!(meta.key.as_deref(), Some("A minor"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let state = client.session().snapshot();
    assert!(state.show_results);
    assert_eq!(state.revealed_results().map(<[_]>::len), Some(2));
    assert_eq!(state.pending_reveal().map(|r| r.files.len()), Some(2));

    tokio::time::sleep(TICK * 4).await;
    assert_eq!(fake.status_calls("j1"), 3);
    assert_eq!(fake.calls().files, 1);
    assert!(!client.is_polling());
}

// ---------------------------------------------------------------------------
// Test: server error message is shown as is, missing message uses the fallback
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn error_status_uses_server_message() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("j1", "Song")
        .statuses("j1", vec![status("downloading"), failed(Some("Download failed: 403"))]);
    let client = client(&fake);

    client.submit(request("Song")).await.unwrap();
    tokio::time::sleep(TICK + Duration::from_millis(10)).await;

    let state = client.session().snapshot();
    assert_eq!(state.status(), JobStatus::Error);
    assert_eq!(state.error(), Some("Download failed: 403"));
    assert!(!state.busy);

    tokio::time::sleep(TICK * 3).await;
    assert_eq!(fake.status_calls("j1"), 2);
}

#[tokio::test(start_paused = true)]
async fn error_status_without_message_uses_fallback() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("j1", "Song").statuses("j1", vec![failed(None)]);
    let client = client(&fake);

    client.submit(request("Song")).await.unwrap();
    settle().await;

    assert_eq!(client.session().snapshot().error(), Some(PROCESSING_ERROR_FALLBACK));
}

// ---------------------------------------------------------------------------
// Test: a new submission silences the previous job's poller
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn new_submission_stops_previous_poller() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("a", "First")
        .start_ok("b", "Second")
        .statuses("a", vec![status("splitting")])
        .statuses("b", vec![status("downloading")]);
    let client = client(&fake);

    client.submit(request("First")).await.unwrap();
    tokio::time::sleep(TICK + Duration::from_millis(10)).await;
    let polls_of_a = fake.status_calls("a");
    assert!(polls_of_a >= 2);

    client.submit(request("Second")).await.unwrap();
    tokio::time::sleep(TICK * 4).await;

    assert_eq!(fake.status_calls("a"), polls_of_a);
    let state = client.session().snapshot();
    assert_eq!(state.job.as_ref().map(|j| j.id.clone()), Some(JobId::from("b")));
    assert_eq!(state.status(), JobStatus::Downloading);
}

fn active(id: &str) -> Job {
    Job {
        id: JobId::from(id),
        track_name: id.to_uppercase(),
        source_url: format!("https://www.youtube.com/watch?v={id}"),
        mode: JobMode::StemSplit,
        output_location: None,
        phase: JobPhase::Active(Stage::Downloading),
    }
}

/// Job `a` is polled and its first status reply is still in flight when job
/// `b` takes over. Returns the (unaborted) poller and `b`'s epoch.
async fn supersede_mid_poll(fake: &Arc<FakeService>, session: &Session) -> (JobStatusPoller<FakeService>, Epoch) {
    let poller = JobStatusPoller::new(Arc::clone(fake), session.clone(), &ClientConfig::default());
    let epoch_a = session.begin_submission();
    session.apply(epoch_a, |s| s.job = Some(active("a")));
    poller.start(epoch_a, JobId::from("a"), "A".into());
    settle().await;
    assert_eq!(fake.status_calls("a"), 1, "reply for a is in flight");

    let epoch_b = session.begin_submission();
    session.apply(epoch_b, |s| s.job = Some(active("b")));
    (poller, epoch_b)
}

fn assert_b_untouched(session: &Session, epoch_b: Epoch) {
    let state = session.snapshot();
    assert_eq!(state.epoch(), epoch_b);
    let job = state.job.as_ref().unwrap();
    assert_eq!(job.id, JobId::from("b"));
    assert_eq!(job.phase, JobPhase::Active(Stage::Downloading));
    assert!(state.busy);
    assert!(!state.show_results);
    assert!(state.error().is_none());
    assert!(state.pending_reveal().is_none());
}

// ---------------------------------------------------------------------------
// Test: an old job's late `done` is dropped once a newer job owns the session
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn late_done_for_old_job_is_discarded() {
    let fake = Arc::new(FakeService::new());
    fake.status_after("a", Duration::from_secs(1), done_with("99", "E"))
        .files("a", Reply::Ok(vec![stem("a", "vocals.mp3")]));
    let session = Session::new();

    let (poller, epoch_b) = supersede_mid_poll(&fake, &session).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_b_untouched(&session, epoch_b);
    assert_eq!(fake.calls().files, 0, "no listing for a superseded job");
    assert!(!poller.is_running());
    assert_eq!(fake.status_calls("a"), 1);
}

// ---------------------------------------------------------------------------
// Test: an old job's late `error` is dropped the same way
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn late_error_for_old_job_is_discarded() {
    let fake = Arc::new(FakeService::new());
    fake.status_after("a", Duration::from_secs(1), failed(Some("Download failed")));
    let session = Session::new();

    let (poller, epoch_b) = supersede_mid_poll(&fake, &session).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_b_untouched(&session, epoch_b);
    assert!(!poller.is_running());
}

// ---------------------------------------------------------------------------
// Test: through the client, a slow `done` for the old job never lands
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn resubmitting_while_old_reply_is_in_flight() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("a", "First")
        .start_ok("b", "Second")
        .status_after("a", Duration::from_secs(1), done_with("99", "E"))
        .files("a", Reply::Ok(vec![stem("a", "vocals.mp3")]))
        .statuses("b", vec![status("splitting")]);
    let client = client(&fake);

    client.submit(request("First")).await.unwrap();
    settle().await;
    client.submit(request("Second")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let state = client.session().snapshot();
    assert_eq!(state.job.as_ref().map(|j| j.id.clone()), Some(JobId::from("b")));
    assert_eq!(state.status(), JobStatus::Splitting);
    assert!(!state.show_results);
    assert!(state.error().is_none());
    assert_eq!(fake.calls().files, 0);
}

// ---------------------------------------------------------------------------
// Test: a slow start response that lands after a newer submission is dropped
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn late_start_response_is_discarded() {
    let fake = Arc::new(FakeService::new());
    fake.start_after(Duration::from_secs(2), "slow", "Slow")
        .start_ok("fast", "Fast")
        .statuses("fast", vec![status("separating")]);
    let client = Arc::new(client(&fake));

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.submit(request("Slow")).await })
    };
    settle().await;
    client.submit(request("Fast")).await.unwrap();

    let late = first.await.unwrap();
    assert!(matches!(late, Err(SubmitError::Superseded)));

    settle().await;
    let state = client.session().snapshot();
    assert_eq!(state.job.as_ref().map(|j| j.id.clone()), Some(JobId::from("fast")));
    assert_eq!(fake.status_calls("slow"), 0);
}

// ---------------------------------------------------------------------------
// Test: reset returns to idle but keeps the queue mirror
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reset_stops_polling_and_keeps_queue_mirror() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("j1", "Song")
        .statuses("j1", vec![status("splitting")])
        .set_queue(Reply::Ok(QueueSnapshot { entries: vec![entry("j2", "Next")], current: Some(entry("j1", "Song")) }));
    let client = client(&fake);

    assert!(client.queue_observer().tick().await);
    client.submit(request("Song")).await.unwrap();
    settle().await;
    let polls = fake.status_calls("j1");

    client.reset();
    tokio::time::sleep(TICK * 3).await;

    let state = client.session().snapshot();
    assert_eq!(state.status(), JobStatus::Idle);
    assert!(!state.busy);
    assert!(state.error().is_none());
    assert_eq!(state.queue.entries.len(), 1);
    assert_eq!(fake.status_calls("j1"), polls);
}

// ---------------------------------------------------------------------------
// Test: failed polls and unknown statuses leave the state alone
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_failures_are_skipped() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("j1", "Song")
        .statuses("j1", vec![status("splitting"), Reply::Fail, status("queued"), Reply::Fail, done_with("90", "D")])
        .files("j1", Reply::Ok(vec![stem("j1", "drums.mp3")]));
    let client = client(&fake);

    client.submit(request("Song")).await.unwrap();
    settle().await;
    for _ in 0..3 {
        tokio::time::sleep(TICK).await;
        let state = client.session().snapshot();
        assert_eq!(state.status(), JobStatus::Splitting);
        assert!(state.error().is_none());
    }

    tokio::time::sleep(TICK + Duration::from_millis(200)).await;
    let state = client.session().snapshot();
    assert_eq!(state.status(), JobStatus::Done);
    assert!(state.show_results);
    assert_eq!(fake.status_calls("j1"), 5);
}

// ---------------------------------------------------------------------------
// Test: a failed listing still finishes the job and reveals (with no stems)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn listing_failure_still_reveals() {
    let fake = Arc::new(FakeService::new());
    fake.start_ok("j1", "Song")
        .statuses("j1", vec![done_with("128", "F# major")])
        .files("j1", Reply::Fail);
    let client = client(&fake);

    client.submit(request("Song")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = client.session().snapshot();
    assert_eq!(state.status(), JobStatus::Done);
    assert!(state.show_results);
    let job = state.job.as_ref().unwrap();
    assert!(matches!(job.phase, JobPhase::Done { files: None, .. }));
    assert!(state.revealed_results().is_none());
    assert!(client.session().take_reveal().is_none(), "nothing to hand over");
}

// ---------------------------------------------------------------------------
// Test: a refused submission records the fixed message and does nothing else
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn refused_submission_records_fixed_message() {
    let fake = Arc::new(FakeService::new());
    fake.start_fails();
    let client = client(&fake);

    let err = client.submit(request("Song")).await.unwrap_err();
    assert!(matches!(err, SubmitError::Rejected(_)));
    assert_eq!(err.to_string(), "Failed to start conversion");

    tokio::time::sleep(TICK * 2).await;
    let state = client.session().snapshot();
    assert!(!state.busy);
    assert!(state.job.is_none());
    assert_eq!(state.error(), Some("Failed to start conversion"));
    assert!(state.accepts_submission());
    assert!(fake.calls().status.is_empty());
}
