use pkd_engine::{ClaimOutcome, Engine, RemoveSelector, StoredAssignment, TransitionRequest};
use pkd_schemas::{Assignment, AssignmentState};
use pkd_testkit::{engine, order, worker};
use uuid::Uuid;

async fn claim(engine: &Engine, w: &str) -> Assignment {
    match engine.claim_next(&worker(w)).await {
        Ok(ClaimOutcome::Claimed { assignment, .. }) => assignment,
        other => panic!("expected a claim, got {other:?}"),
    }
}

async fn complete(engine: &Engine, a: &Assignment) -> anyhow::Result<()> {
    engine
        .transition(
            a.assignment_id,
            TransitionRequest::by_worker(&a.worker_id, AssignmentState::Completed),
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn reopen_makes_order_claimable_again() -> anyhow::Result<()> {
    let (engine, store, _source) = engine(vec![order("A", 1, &[])]);
    let first = claim(&engine, "w1").await;
    complete(&engine, &first).await?;

    assert!(matches!(
        engine.claim_next(&worker("w2")).await?,
        ClaimOutcome::NoOrdersAvailable
    ));

    let report = engine.reopen(&[first.assignment_id]).await;
    assert_eq!(report.succeeded, vec![first.assignment_id.to_string()]);

    let second = claim(&engine, "w2").await;
    assert_eq!(second.order_id, "A");
    assert_ne!(second.assignment_id, first.assignment_id);

    // History of the first run is kept.
    assert_eq!(store.history_count().await, 1);
    assert!(matches!(
        engine.get(first.assignment_id).await?,
        StoredAssignment::Archived(_)
    ));

    // Reopening again after the lock moved on is a no-op, not an error.
    assert!(engine.reopen(&[first.assignment_id]).await.all_succeeded());
    assert_eq!(
        engine.get(second.assignment_id).await?.state(),
        AssignmentState::Preparing
    );
    Ok(())
}

#[tokio::test]
async fn reopen_rejects_active_and_unknown() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;
    let ghost = Uuid::new_v4();

    let report = engine.reopen(&[a.assignment_id, ghost]).await;
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].code, "ASSIGNMENT_NOT_ARCHIVED");
    assert_eq!(report.failed[1].code, "ASSIGNMENT_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn removing_completed_assignment_fails_and_changes_nothing() -> anyhow::Result<()> {
    let (engine, store, _source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;
    complete(&engine, &a).await?;
    let before = store.archived(a.assignment_id).await;

    let report = engine
        .remove(&RemoveSelector::Assignments(vec![a.assignment_id]))
        .await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].code, "REMOVAL_PROTECTED");

    let report = engine.remove(&RemoveSelector::Orders(vec!["A".to_string()])).await;
    assert_eq!(report.failed[0].code, "REMOVAL_PROTECTED");

    assert_eq!(store.archived(a.assignment_id).await, before);
    Ok(())
}

#[tokio::test]
async fn remove_by_order_after_reopen_reports_not_found() -> anyhow::Result<()> {
    let (engine, store, _source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;
    complete(&engine, &a).await?;
    assert!(engine.reopen(&[a.assignment_id]).await.all_succeeded());

    // The order no longer resolves to any assignment.
    let report = engine.remove(&RemoveSelector::Orders(vec!["A".to_string()])).await;
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].code, "ASSIGNMENT_NOT_FOUND");

    // By assignment id the archived record is still protected.
    let report = engine
        .remove(&RemoveSelector::Assignments(vec![a.assignment_id]))
        .await;
    assert_eq!(report.failed[0].code, "REMOVAL_PROTECTED");
    assert_eq!(store.history_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn remove_by_order_returns_it_to_the_pool() -> anyhow::Result<()> {
    let (engine, store, _source) = engine(vec![order("A", 1, &[]), order("B", 2, &[])]);
    let a = claim(&engine, "w1").await;
    assert_eq!(a.order_id, "A");

    let report = engine
        .remove(&RemoveSelector::Orders(vec!["A".to_string(), "missing".to_string()]))
        .await;
    assert_eq!(report.succeeded, vec!["A".to_string()]);
    assert_eq!(report.failed[0].key, "missing");
    assert_eq!(report.failed[0].code, "ASSIGNMENT_NOT_FOUND");

    // No history is written for a removal.
    assert_eq!(store.history_count().await, 0);
    assert!(engine.active_for_worker("w1").await?.is_none());

    let again = claim(&engine, "w2").await;
    assert_eq!(again.order_id, "A");
    Ok(())
}

#[tokio::test]
async fn release_cancels_and_records_reason() -> anyhow::Result<()> {
    let (engine, store, _source) = engine(vec![order("A", 1, &[])]);
    let a = claim(&engine, "w1").await;

    let report = engine.release(&[a.assignment_id], "customer called").await;
    assert!(report.all_succeeded());

    let archived = store.archived(a.assignment_id).await.expect("archived");
    assert_eq!(archived.assignment.state, AssignmentState::Cancelled);
    assert!(archived.duration_secs.is_none());
    assert!(archived
        .assignment
        .notes
        .as_deref()
        .unwrap_or_default()
        .contains("released: customer called"));

    // Released again: already closed.
    let report = engine.release(&[a.assignment_id], "twice").await;
    assert_eq!(report.failed[0].code, "ASSIGNMENT_ALREADY_CLOSED");
    Ok(())
}
