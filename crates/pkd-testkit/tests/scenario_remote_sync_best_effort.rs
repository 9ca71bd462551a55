use std::time::{Duration, Instant};

use pkd_engine::{ClaimOutcome, Engine, RemoteError, RemoveSelector, TransitionRequest};
use pkd_schemas::{Assignment, AssignmentState};
use pkd_testkit::{engine, engine_with, order, test_config, worker, StatusBehavior};

async fn claim(engine: &Engine, w: &str) -> Assignment {
    match engine.claim_next(&worker(w)).await {
        Ok(ClaimOutcome::Claimed { assignment, .. }) => assignment,
        other => panic!("expected a claim, got {other:?}"),
    }
}

#[tokio::test]
async fn remote_failure_does_not_block_completion() -> anyhow::Result<()> {
    let (engine, store, source) = engine(vec![order("A", 1, &[])]);
    source
        .set_status_behavior(StatusBehavior::Fail(RemoteError::Unreachable(
            "connection refused".to_string(),
        )))
        .await;

    let a = claim(&engine, "w1").await;
    let done = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Completed))
        .await?;

    assert!(done.archived);
    assert_eq!(done.assignment.state, AssignmentState::Completed);
    assert!(!done.assignment.remote_status_synced);
    assert_eq!(done.assignment.remote_status.as_deref(), Some("completed"));
    assert!(done
        .assignment
        .notes
        .as_deref()
        .unwrap_or_default()
        .contains("not synced"));

    assert_eq!(done.warnings.len(), 1);
    let w = &done.warnings[0];
    assert_eq!(w.order_id, "A");
    assert_eq!(w.status_tag, "completed");
    assert!(w.sync_id.is_some());

    let queued = store.outbox_items().await;
    assert_eq!(queued.len(), 1);
    assert!(!queued[0].1);

    // Platform recovers; the queued sync goes out.
    source.set_status_behavior(StatusBehavior::Accept).await;
    let report = engine.retry_remote_syncs(10).await?;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.synced, 1);
    assert_eq!(report.still_failing, 0);
    assert!(store.outbox_items().await[0].1);

    let calls = source.status_calls().await;
    assert_eq!(
        calls,
        vec![
            ("A".to_string(), "completed".to_string()),
            ("A".to_string(), "completed".to_string()),
        ]
    );

    // The history row records the delivery; state and timestamps are untouched.
    let archived = store.archived(a.assignment_id).await.expect("archived");
    assert!(archived.assignment.remote_status_synced);
    assert_eq!(archived.assignment.state, AssignmentState::Completed);
    assert_eq!(archived.closed_at_utc, done.assignment.completed_at_utc.expect("completed"));

    // Nothing left to do.
    assert_eq!(engine.retry_remote_syncs(10).await?.attempted, 0);
    Ok(())
}

#[tokio::test]
async fn hanging_platform_times_out() -> anyhow::Result<()> {
    let (engine, store, source) = engine(vec![order("A", 1, &[])]);
    source.set_status_behavior(StatusBehavior::Hang).await;

    let a = claim(&engine, "w1").await;
    let started = Instant::now();
    let done = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Completed))
        .await?;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(done.warnings.len(), 1);
    assert!(done.warnings[0].error.contains("timed out"));
    assert_eq!(store.outbox_items().await.len(), 1);

    let report = engine.retry_remote_syncs(10).await?;
    assert_eq!(report.still_failing, 1);
    assert_eq!(store.outbox_items().await[0].0.attempts, 2);
    Ok(())
}

#[tokio::test]
async fn skip_flag_records_tag_without_calling_platform() -> anyhow::Result<()> {
    let (engine, store, source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;

    let done = engine
        .transition(
            a.assignment_id,
            TransitionRequest::by_worker("w1", AssignmentState::Completed).skip_remote_sync(true),
        )
        .await?;
    assert!(done.warnings.is_empty());
    assert!(done.assignment.remote_status_synced);
    assert_eq!(done.assignment.remote_status.as_deref(), Some("completed"));
    assert!(source.status_calls().await.is_empty());
    assert!(store.outbox_items().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn delivered_retry_flips_active_flag_and_stale_tags_are_dropped() -> anyhow::Result<()> {
    let mut cfg = test_config();
    cfg.remote_status.on_waiting = Some("on-hold".to_string());
    cfg.remote_status.on_preparing = Some("processing".to_string());
    cfg.auto_start = false;
    let (engine, _store, source) = engine_with(vec![order("A", 1, &[]), order("B", 2, &[])], cfg);

    // A: park fails, then retry delivers while still parked.
    let a = claim(&engine, "w1").await;
    engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Preparing))
        .await?;
    source
        .set_status_behavior(StatusBehavior::Fail(RemoteError::Rejected("429".to_string())))
        .await;
    let parked = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Waiting))
        .await?;
    assert!(!parked.assignment.remote_status_synced);

    source.set_status_behavior(StatusBehavior::Accept).await;
    let report = engine.retry_remote_syncs(10).await?;
    assert_eq!(report.synced, 1);
    let a_now = engine.get(a.assignment_id).await?;
    assert!(a_now.assignment().remote_status_synced);

    // B: park fails, then resume publishes a newer tag; the old one is dropped.
    let b = claim(&engine, "w2").await;
    engine
        .transition(b.assignment_id, TransitionRequest::by_worker("w2", AssignmentState::Preparing))
        .await?;
    source
        .set_status_behavior(StatusBehavior::Fail(RemoteError::Rejected("429".to_string())))
        .await;
    engine
        .transition(b.assignment_id, TransitionRequest::by_worker("w2", AssignmentState::Waiting))
        .await?;
    source.set_status_behavior(StatusBehavior::Accept).await;
    engine
        .transition(b.assignment_id, TransitionRequest::by_worker("w2", AssignmentState::Preparing))
        .await?;

    let calls_before = source.status_calls().await.len();
    let report = engine.retry_remote_syncs(10).await?;
    assert_eq!(report.superseded, 1);
    assert_eq!(report.synced, 0);
    assert_eq!(source.status_calls().await.len(), calls_before);
    Ok(())
}

#[tokio::test]
async fn disabled_tag_means_no_remote_call() -> anyhow::Result<()> {
    let mut cfg = test_config();
    cfg.remote_status.on_completed = None;
    let (engine, _store, source) = engine_with(vec![order("A", 1, &[])], cfg);

    let a = claim(&engine, "w1").await;
    let done = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Completed))
        .await?;
    assert!(done.assignment.remote_status.is_none());
    assert!(done.assignment.remote_status_synced);
    assert!(source.status_calls().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_transitions_push_only_the_winning_tag() -> anyhow::Result<()> {
    let mut cfg = test_config();
    cfg.remote_status.on_cancelled = Some("cancelled".to_string());
    let (engine, store, source) = engine_with(vec![order("A", 1, &[])], cfg);
    let a = claim(&engine, "w1").await;
    assert_eq!(a.state, AssignmentState::Preparing);

    // Each push takes long enough for the other transition to overlap it.
    source
        .set_status_behavior(StatusBehavior::Delay(Duration::from_millis(50)))
        .await;

    let id = a.assignment_id;
    let (e1, e2) = (engine.clone(), engine.clone());
    let worker_side = tokio::spawn(async move {
        e1.transition(id, TransitionRequest::by_worker("w1", AssignmentState::Completed))
            .await
    });
    let admin_side = tokio::spawn(async move {
        e2.transition(id, TransitionRequest::by_admin(AssignmentState::Cancelled))
            .await
    });
    let results = [worker_side.await?, admin_side.await?];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).expect("one loser");
    assert_eq!(loser.code(), "ASSIGNMENT_ALREADY_CLOSED");

    let archived = store.archived(id).await.expect("archived");
    let final_tag = archived.assignment.remote_status.clone().expect("tag");
    assert_eq!(winners[0].assignment.state, archived.assignment.state);
    assert!(archived.assignment.remote_status_synced);

    // The platform saw exactly one status, the one history records.
    assert_eq!(source.status_calls().await, vec![("A".to_string(), final_tag)]);
    assert!(store.outbox_items().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn retry_drops_tag_superseded_by_archived_status() -> anyhow::Result<()> {
    let mut cfg = test_config();
    cfg.auto_start = false;
    cfg.remote_status.on_preparing = Some("picking".to_string());
    let (engine, store, source) = engine_with(vec![order("A", 1, &[])], cfg);
    let a = claim(&engine, "w1").await;

    source
        .set_status_behavior(StatusBehavior::Fail(RemoteError::Unreachable("down".to_string())))
        .await;
    let started = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Preparing))
        .await?;
    assert_eq!(started.warnings.len(), 1);

    source.set_status_behavior(StatusBehavior::Accept).await;
    let done = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Completed))
        .await?;
    assert!(done.assignment.remote_status_synced);

    let calls_before = source.status_calls().await;
    let report = engine.retry_remote_syncs(10).await?;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.superseded, 1);
    assert_eq!(report.synced, 0);

    // "picking" must not overwrite "completed" on the platform.
    assert_eq!(source.status_calls().await, calls_before);
    assert_eq!(calls_before.last().map(|c| c.1.as_str()), Some("completed"));
    assert!(store.outbox_items().await.iter().all(|(_, done)| *done));

    let archived = store.archived(a.assignment_id).await.expect("archived");
    assert_eq!(archived.assignment.remote_status.as_deref(), Some("completed"));
    assert!(archived.assignment.remote_status_synced);
    Ok(())
}

#[tokio::test]
async fn removing_an_assignment_discards_its_queued_syncs() -> anyhow::Result<()> {
    let mut cfg = test_config();
    cfg.remote_status.on_waiting = Some("on-hold".to_string());
    let (engine, store, source) = engine_with(vec![order("A", 1, &[])], cfg);
    let a = claim(&engine, "w1").await;

    source
        .set_status_behavior(StatusBehavior::Fail(RemoteError::Rejected("503".to_string())))
        .await;
    engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Waiting))
        .await?;
    assert_eq!(store.outbox_items().await.len(), 1);

    let report = engine
        .remove(&RemoveSelector::Assignments(vec![a.assignment_id]))
        .await;
    assert!(report.all_succeeded());
    assert!(store.outbox_items().await.iter().all(|(_, done)| *done));

    source.set_status_behavior(StatusBehavior::Accept).await;
    let calls_before = source.status_calls().await.len();
    assert_eq!(engine.retry_remote_syncs(10).await?.attempted, 0);
    assert_eq!(source.status_calls().await.len(), calls_before);
    Ok(())
}
