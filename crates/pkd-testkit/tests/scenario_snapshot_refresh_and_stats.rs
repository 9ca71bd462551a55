use std::time::Duration;

use pkd_engine::{spawn_snapshot_refresh, ClaimOutcome, TransitionRequest};
use pkd_schemas::AssignmentState;
use pkd_testkit::{engine, order, worker};

#[tokio::test]
async fn refresh_replaces_snapshot_of_active_assignment() -> anyhow::Result<()> {
    let (engine, _store, source) = engine(vec![order("A", 1, &[("X", 1)])]);
    let ClaimOutcome::Claimed { assignment, .. } = engine.claim_next(&worker("w1")).await? else {
        panic!("expected a claim");
    };
    assert_eq!(assignment.quantity_of("X"), 1);

    // Customer added two more units upstream.
    source.upsert_order(order("A", 1, &[("X", 3)])).await;
    let refreshed = engine.refresh_snapshot(assignment.assignment_id).await?;
    assert_eq!(refreshed.quantity_of("X"), 3);
    assert_eq!(refreshed.state, assignment.state);
    assert!(refreshed.order_snapshot.captured_at_utc >= assignment.order_snapshot.captured_at_utc);

    // Pending quantity follows the refreshed snapshot.
    let adj = engine
        .reconcile(&pkd_reconcile::StockCount::new(
            "X",
            10.0,
            0,
            pkd_reconcile::StockMode::Override,
        ))
        .await?;
    assert_eq!(adj.pending, 3);
    Ok(())
}

#[tokio::test]
async fn refresh_all_skips_nothing_and_reports_failures() -> anyhow::Result<()> {
    let (engine, _store, source) = engine(vec![order("A", 1, &[]), order("B", 2, &[])]);
    engine.claim_next(&worker("w1")).await?;
    engine.claim_next(&worker("w2")).await?;

    // B vanished upstream.
    source.set_orders(vec![order("A", 1, &[])]).await;
    let report = engine.refresh_all_active().await?;
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].code, "REMOTE_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn background_refresh_runs_on_its_own_timer() -> anyhow::Result<()> {
    let (engine, _store, source) = engine(vec![order("A", 1, &[("X", 1)])]);
    let ClaimOutcome::Claimed { assignment, .. } = engine.claim_next(&worker("w1")).await? else {
        panic!("expected a claim");
    };
    source.upsert_order(order("A", 1, &[("X", 5)])).await;

    let handle = spawn_snapshot_refresh(engine.clone(), Duration::from_millis(20));
    let mut seen = 0;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        seen = engine.get(assignment.assignment_id).await?.assignment().quantity_of("X");
        if seen == 5 {
            break;
        }
    }
    handle.abort();
    assert_eq!(seen, 5);
    Ok(())
}

#[tokio::test]
async fn stats_count_by_state_and_worker() -> anyhow::Result<()> {
    let (engine, store, _source) = engine(vec![
        order("A", 1, &[]),
        order("B", 2, &[]),
        order("C", 3, &[]),
        order("D", 4, &[]),
    ]);
    store.insert_mark("D", "rush", pkd_testkit::t(9)).await;

    let mut ids = Vec::new();
    for w in ["w1", "w2", "w3"] {
        if let ClaimOutcome::Claimed { assignment, .. } = engine.claim_next(&worker(w)).await? {
            ids.push(assignment);
        }
    }
    // D (priority) went first, then A, B.
    assert_eq!(ids[0].order_id, "D");

    engine
        .transition(ids[0].assignment_id, TransitionRequest::by_worker("w1", AssignmentState::Completed))
        .await?;
    engine
        .transition(ids[1].assignment_id, TransitionRequest::by_worker("w2", AssignmentState::Waiting))
        .await?;
    engine.mark_priority("C", "next up", None).await?;

    let stats = engine.stats().await?;
    assert_eq!(stats.active_by_state.get(&AssignmentState::Preparing), Some(&1));
    assert_eq!(stats.active_by_state.get(&AssignmentState::Waiting), Some(&1));
    assert_eq!(stats.archived_by_state.get(&AssignmentState::Completed), Some(&1));
    assert_eq!(stats.total_active(), 2);
    assert_eq!(stats.active_by_worker.get("w2"), Some(&1));
    assert_eq!(stats.active_by_worker.get("w3"), Some(&1));
    assert!(!stats.active_by_worker.contains_key("w1"));
    assert_eq!(stats.priority_marks, 1);

    let active = engine.list_active().await?;
    assert_eq!(active.len(), 2);
    assert!(active[0].assigned_at_utc <= active[1].assigned_at_utc);
    Ok(())
}
