use std::time::Duration;

use pkd_engine::{ClaimOutcome, TransitionRequest};
use pkd_schemas::AssignmentState;
use pkd_testkit::{engine, engine_with, order, test_config, worker, StatusBehavior};

#[tokio::test]
async fn claim_auto_starts_once() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[])]);
    let ClaimOutcome::Claimed { assignment, warnings } = engine.claim_next(&worker("w1")).await?
    else {
        panic!("expected a claim");
    };
    assert!(warnings.is_empty());
    assert_eq!(assignment.state, AssignmentState::Preparing);
    let started = assignment.started_at_utc.expect("started");

    // Already started: nothing to do, timestamps untouched.
    assert!(engine.ensure_started(assignment.assignment_id).await?.is_none());
    let stored = engine.get(assignment.assignment_id).await?;
    assert_eq!(stored.assignment().started_at_utc, Some(started));

    // Parking and resuming never re-triggers the auto-start path.
    engine
        .transition(
            assignment.assignment_id,
            TransitionRequest::by_worker("w1", AssignmentState::Waiting),
        )
        .await?;
    assert!(engine.ensure_started(assignment.assignment_id).await?.is_none());
    assert_eq!(
        engine.get(assignment.assignment_id).await?.state(),
        AssignmentState::Waiting
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ensure_started_applies_once() -> anyhow::Result<()> {
    let mut cfg = test_config();
    cfg.auto_start = false;
    cfg.remote_status.on_preparing = Some("processing".to_string());
    let (engine, _store, source) = engine_with(vec![order("A", 1, &[])], cfg);
    // The winner sits inside its push while the others race.
    source
        .set_status_behavior(StatusBehavior::Delay(Duration::from_millis(50)))
        .await;

    let ClaimOutcome::Claimed { assignment, .. } = engine.claim_next(&worker("w1")).await? else {
        panic!("expected a claim");
    };
    assert_eq!(assignment.state, AssignmentState::Assigned);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let id = assignment.assignment_id;
        handles.push(tokio::spawn(async move { engine.ensure_started(id).await }));
    }

    let mut applied = 0;
    for h in handles {
        if h.await??.is_some() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(
        engine.get(assignment.assignment_id).await?.state(),
        AssignmentState::Preparing
    );
    // Only the racer whose write landed talks to the platform.
    assert_eq!(
        source.status_calls().await,
        vec![("A".to_string(), "processing".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn unknown_assignment_is_not_found() {
    let (engine, _store, _source) = engine(vec![]);
    let err = engine.ensure_started(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), "ASSIGNMENT_NOT_FOUND");
}
