use pkd_engine::{ClaimOutcome, Engine, TransitionRequest};
use pkd_schemas::{Assignment, AssignmentState};
use pkd_testkit::{engine, order, worker};

async fn claim(engine: &Engine, w: &str) -> Assignment {
    match engine.claim_next(&worker(w)).await {
        Ok(ClaimOutcome::Claimed { assignment, .. }) => assignment,
        other => panic!("expected a claim, got {other:?}"),
    }
}

#[tokio::test]
async fn first_reassignment_wins_the_free_worker() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[]), order("B", 2, &[])]);
    let a = claim(&engine, "w1").await;
    let b = claim(&engine, "w2").await;

    let report = engine
        .reassign(&[a.assignment_id, b.assignment_id], &worker("w3"))
        .await;
    assert_eq!(report.succeeded, vec![a.assignment_id.to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, b.assignment_id.to_string());
    assert_eq!(report.failed[0].code, "TARGET_WORKER_BUSY");

    let moved = engine.active_for_worker("w3").await?.expect("w3 active");
    assert_eq!(moved.assignment_id, a.assignment_id);
    // State and timestamps are untouched.
    assert_eq!(moved.state, a.state);
    assert_eq!(moved.assigned_at_utc, a.assigned_at_utc);
    assert_eq!(moved.started_at_utc, a.started_at_utc);
    assert_eq!(moved.worker_name, "Worker w3");

    assert!(engine.active_for_worker("w1").await?.is_none());
    assert_eq!(
        engine.active_for_worker("w2").await?.map(|x| x.assignment_id),
        Some(b.assignment_id)
    );
    Ok(())
}

#[tokio::test]
async fn reassign_onto_busy_worker_rejected_and_owner_changes() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[]), order("B", 2, &[])]);
    let a = claim(&engine, "w1").await;
    let _b = claim(&engine, "w2").await;

    let report = engine.reassign(&[a.assignment_id], &worker("w2")).await;
    assert_eq!(report.failed[0].code, "TARGET_WORKER_BUSY");

    // Move it to a free worker; the old owner can no longer transition it.
    assert!(engine.reassign(&[a.assignment_id], &worker("w9")).await.all_succeeded());
    let err = engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Waiting))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_ASSIGNMENT_OWNER");
    engine
        .transition(a.assignment_id, TransitionRequest::by_worker("w9", AssignmentState::Waiting))
        .await?;
    Ok(())
}

#[tokio::test]
async fn closed_assignments_cannot_be_reassigned() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;
    engine
        .transition(a.assignment_id, TransitionRequest::by_admin(AssignmentState::Cancelled))
        .await?;

    let report = engine.reassign(&[a.assignment_id], &worker("w2")).await;
    assert_eq!(report.failed[0].code, "ASSIGNMENT_ALREADY_CLOSED");
    Ok(())
}

#[tokio::test]
async fn reassign_to_current_owner_is_a_noop() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;
    assert!(engine.reassign(&[a.assignment_id], &worker("w1")).await.all_succeeded());
    Ok(())
}
