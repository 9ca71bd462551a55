use std::collections::HashSet;

use pkd_engine::{ClaimOutcome, EngineError};
use pkd_testkit::{engine, order, worker};

/// N workers race for M orders. Every order is claimed at most once and no
/// worker ends up with more than one active assignment.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_double_claim() -> anyhow::Result<()> {
    let orders: Vec<_> = (0..5).map(|i| order(&format!("O{i}"), i, &[("SKU", 1)])).collect();
    let (engine, store, _source) = engine(orders);

    let mut handles = Vec::new();
    for w in 0..12 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.claim_next(&worker(&format!("w{w}"))).await
        }));
    }

    let mut claimed_orders = HashSet::new();
    let mut claimed_workers = HashSet::new();
    let mut empty = 0;
    for h in handles {
        match h.await?? {
            ClaimOutcome::Claimed { assignment, .. } => {
                assert!(claimed_orders.insert(assignment.order_id.clone()), "order claimed twice");
                assert!(claimed_workers.insert(assignment.worker_id.clone()));
            }
            ClaimOutcome::NoOrdersAvailable => empty += 1,
        }
    }

    assert_eq!(claimed_orders.len(), 5);
    assert_eq!(empty, 7);
    assert_eq!(store.active_count().await, 5);

    let active = engine.list_active().await?;
    let per_worker: HashSet<_> = active.iter().map(|a| a.worker_id.clone()).collect();
    assert_eq!(per_worker.len(), active.len());
    Ok(())
}

/// One worker firing several claims at once wins exactly one order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_worker_racing_itself_gets_one_order() -> anyhow::Result<()> {
    let orders: Vec<_> = (0..6).map(|i| order(&format!("O{i}"), i, &[])).collect();
    let (engine, store, _source) = engine(orders);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.claim_next(&worker("solo")).await }));
    }

    let mut won = 0;
    for h in handles {
        match h.await? {
            Ok(ClaimOutcome::Claimed { .. }) => won += 1,
            Ok(ClaimOutcome::NoOrdersAvailable) => panic!("orders were available"),
            Err(EngineError::WorkerAlreadyHasActiveOrder { worker_id, .. }) => {
                assert_eq!(worker_id, "solo");
            }
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(store.active_count().await, 1);
    // Losing inserts left no stray claim locks behind.
    assert_eq!(
        pkd_engine::AssignmentStore::claimed_order_ids(store.as_ref()).await?.len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn second_claim_by_busy_worker_is_rejected() -> anyhow::Result<()> {
    let (engine, _store, _source) = engine(vec![order("A", 1, &[]), order("B", 2, &[])]);

    let ClaimOutcome::Claimed { assignment, .. } = engine.claim_next(&worker("w1")).await? else {
        panic!("expected a claim");
    };

    let err = engine.claim_next(&worker("w1")).await.unwrap_err();
    match err {
        EngineError::WorkerAlreadyHasActiveOrder { assignment_id, .. } => {
            assert_eq!(assignment_id, Some(assignment.assignment_id));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err_code(&engine.claim_next(&worker("w1")).await), "WORKER_ALREADY_HAS_ACTIVE_ORDER");
    Ok(())
}

fn err_code(r: &Result<ClaimOutcome, EngineError>) -> &'static str {
    match r {
        Ok(_) => "OK",
        Err(e) => e.code(),
    }
}
