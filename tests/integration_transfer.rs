//! Transfer engine integration tests
//!
//! Ledger-level properties exercised through the public handler API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;

use wallet_ledger::coordinator::{CoordinatorError, TransactionCoordinator};
use wallet_ledger::domain::{DomainError, OperationContext, OwnerId};
use wallet_ledger::handlers::{TransferCommand, TransferHandler};
use wallet_ledger::ledger_store::{InMemoryLedgerStore, LedgerStore, StoreError, StoreTransaction};
use wallet_ledger::query::BalanceQueryService;
use wallet_ledger::AppError;

mod common;

use common::Fault;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn transfer(
    handler: &TransferHandler,
    from: OwnerId,
    to: OwnerId,
    amount: i64,
) -> Result<i64, AppError> {
    handler
        .execute(
            TransferCommand::new(from, to, amount),
            &OperationContext::new(),
        )
        .await
        .map(|result| result.updated_balance.value())
}

#[tokio::test]
async fn test_end_to_end_transfer() {
    let (store, handler, owners) = common::setup_ledger(&[1000, 200], TIMEOUT).await;

    let updated = transfer(&handler, owners[0], owners[1], 300).await.unwrap();

    assert_eq!(updated, 700);
    assert_eq!(common::balance_of(&store, owners[0]).await, 700);
    assert_eq!(common::balance_of(&store, owners[1]).await, 500);
}

#[tokio::test]
async fn test_conservation_over_sequential_transfers() {
    let (store, handler, owners) = common::setup_ledger(&[500, 300, 200], TIMEOUT).await;

    transfer(&handler, owners[0], owners[1], 120).await.unwrap();
    transfer(&handler, owners[1], owners[2], 400).await.unwrap();
    transfer(&handler, owners[2], owners[0], 50).await.unwrap();
    let _ = transfer(&handler, owners[1], owners[0], 10_000).await;

    assert_eq!(common::total_balance(&store, &owners).await, 1000);
    assert_eq!(common::balance_of(&store, owners[0]).await, 430);
    assert_eq!(common::balance_of(&store, owners[1]).await, 20);
    assert_eq!(common::balance_of(&store, owners[2]).await, 550);
}

#[tokio::test]
async fn test_insufficient_funds_leaves_state_untouched() {
    let (store, handler, owners) = common::setup_ledger(&[100, 40], TIMEOUT).await;

    let result = transfer(&handler, owners[0], owners[1], 150).await;

    assert!(matches!(
        result,
        Err(AppError::Domain(DomainError::InsufficientFunds {
            required: 150,
            available: 100
        }))
    ));
    assert_eq!(common::balance_of(&store, owners[0]).await, 100);
    assert_eq!(common::balance_of(&store, owners[1]).await, 40);
}

#[tokio::test]
async fn test_self_transfer_rejected_for_any_amount() {
    let (store, handler, owners) = common::setup_ledger(&[100], TIMEOUT).await;

    for amount in [i64::MIN, -1, 0, 1, 100, 101, i64::MAX] {
        let result = transfer(&handler, owners[0], owners[0], amount).await;
        assert!(
            matches!(result, Err(AppError::Domain(DomainError::SelfTransfer))),
            "amount {amount} gave {result:?}"
        );
    }
    assert_eq!(common::balance_of(&store, owners[0]).await, 100);
}

#[tokio::test]
async fn test_recipient_not_found() {
    let (store, handler, owners) = common::setup_ledger(&[100], TIMEOUT).await;

    let result = transfer(&handler, owners[0], OwnerId::new(), 10).await;

    assert!(matches!(
        result,
        Err(AppError::Domain(DomainError::RecipientNotFound(_)))
    ));
    assert_eq!(common::balance_of(&store, owners[0]).await, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_double_spend() {
    for _ in 0..20 {
        let (store, handler, owners) = common::setup_ledger(&[1000, 0, 0], TIMEOUT).await;

        let first = {
            let handler = handler.clone();
            let (from, to) = (owners[0], owners[1]);
            tokio::spawn(async move { transfer(&handler, from, to, 700).await })
        };
        let second = {
            let handler = handler.clone();
            let (from, to) = (owners[0], owners[2]);
            tokio::spawn(async move { transfer(&handler, from, to, 700).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let refused = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(AppError::Domain(DomainError::InsufficientFunds { .. }))
                )
            })
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(refused, 1);
        assert_eq!(common::balance_of(&store, owners[0]).await, 300);
        assert_eq!(
            common::balance_of(&store, owners[1]).await + common::balance_of(&store, owners[2]).await,
            700
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_random_concurrent_workload_keeps_invariants() {
    let balances = [500; 10];
    let (store, handler, owners) = common::setup_ledger(&balances, TIMEOUT).await;
    let mut rng = StdRng::seed_from_u64(7);

    // Sample committed state while transfers are in flight.
    let stop = Arc::new(AtomicBool::new(false));
    let sampler = {
        let (store, owners, stop) = (store.clone(), owners.clone(), stop.clone());
        tokio::spawn(async move {
            let query = BalanceQueryService::new(Arc::new(store.clone()));
            let mut samples = 0u32;
            loop {
                for &owner_id in &owners {
                    let balance = query.get_balance(owner_id).await.unwrap();
                    assert!(balance.value() >= 0);
                }
                let snapshot: i64 = store.accounts().await.iter().map(|a| a.balance.value()).sum();
                assert_eq!(snapshot, 5000, "total drifted mid-run");
                samples += 1;

                if stop.load(Ordering::Relaxed) {
                    return samples;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut tasks = JoinSet::new();
    for _ in 0..400 {
        let from = owners[rng.gen_range(0..owners.len())];
        let to = owners[rng.gen_range(0..owners.len())];
        let amount = rng.gen_range(1..=300);
        let handler = handler.clone();
        tasks.spawn(async move { (from == to, transfer(&handler, from, to, amount).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        let (is_self, result) = joined.unwrap();
        match result {
            Ok(updated) => assert!(updated >= 0),
            Err(AppError::Domain(DomainError::InsufficientFunds { .. })) => {}
            Err(AppError::Domain(DomainError::SelfTransfer)) => assert!(is_self),
            Err(e) => panic!("unexpected transfer error: {e:?}"),
        }
    }

    stop.store(true, Ordering::Relaxed);
    let samples = sampler.await.unwrap();
    assert!(samples > 0);

    assert_eq!(common::total_balance(&store, &owners).await, 5000);
    for account in store.accounts().await {
        assert!(account.balance.value() >= 0);
    }
}

#[tokio::test]
async fn test_failure_between_debit_and_credit_rolls_back() {
    let memory = InMemoryLedgerStore::new();
    let owners = common::seed(&memory, &[1000, 200]).await;
    let faulty = common::FaultyStore::new(Arc::new(memory.clone()), Fault::Credit(owners[1]));
    let coordinator = TransactionCoordinator::new(Arc::new(faulty), TIMEOUT);
    let handler = TransferHandler::new(Arc::new(coordinator));

    let result = transfer(&handler, owners[0], owners[1], 300).await;

    assert!(matches!(result, Err(AppError::TransactionFailed(_))));
    assert_eq!(common::balance_of(&memory, owners[0]).await, 1000);
    assert_eq!(common::balance_of(&memory, owners[1]).await, 200);

    // Locks were released by the abort.
    let healthy = TransferHandler::new(Arc::new(TransactionCoordinator::new(
        Arc::new(memory.clone()),
        TIMEOUT,
    )));
    assert_eq!(transfer(&healthy, owners[0], owners[1], 300).await.unwrap(), 700);
}

#[tokio::test]
async fn test_commit_failure_rolls_back() {
    let memory = InMemoryLedgerStore::new();
    let owners = common::seed(&memory, &[1000, 200]).await;
    let faulty = common::FaultyStore::new(Arc::new(memory.clone()), Fault::Commit);
    let coordinator = TransactionCoordinator::new(Arc::new(faulty), TIMEOUT);
    let handler = TransferHandler::new(Arc::new(coordinator));

    let result = transfer(&handler, owners[0], owners[1], 300).await;

    assert!(
        matches!(
            &result,
            Err(AppError::TransactionFailed(CoordinatorError::CommitFailed(StoreError::Backend(_))))
        ),
        "got {result:?}"
    );
    assert_eq!(common::balance_of(&memory, owners[0]).await, 1000);
    assert_eq!(common::balance_of(&memory, owners[1]).await, 200);

    let healthy = TransferHandler::new(Arc::new(TransactionCoordinator::new(
        Arc::new(memory.clone()),
        TIMEOUT,
    )));
    assert_eq!(transfer(&healthy, owners[0], owners[1], 300).await.unwrap(), 700);
}

#[tokio::test]
async fn test_commit_started_before_deadline_is_not_cancelled() {
    let memory = InMemoryLedgerStore::new();
    let owners = common::seed(&memory, &[1000, 200]).await;
    let slow = common::FaultyStore::new(
        Arc::new(memory.clone()),
        Fault::SlowCommit(Duration::from_millis(300)),
    );
    let coordinator = TransactionCoordinator::new(Arc::new(slow), Duration::from_millis(100));
    let handler = TransferHandler::new(Arc::new(coordinator));

    // The commit outlives the deadline, and its result is reported as is.
    assert_eq!(transfer(&handler, owners[0], owners[1], 300).await.unwrap(), 700);
    assert_eq!(common::balance_of(&memory, owners[0]).await, 700);
    assert_eq!(common::balance_of(&memory, owners[1]).await, 500);
}

#[tokio::test]
async fn test_abandoned_transaction_releases_rows_at_deadline() {
    let (store, handler, owners) =
        common::setup_ledger(&[1000, 200], Duration::from_millis(100)).await;
    let coordinator = TransactionCoordinator::new(Arc::new(store.clone()), Duration::from_millis(100));

    let mut abandoned = coordinator.begin().await.unwrap();
    abandoned.enlist(&[owners[0], owners[1]]).await.unwrap();
    abandoned.write(owners[0], -1000).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(transfer(&handler, owners[0], owners[1], 300).await.unwrap(), 700);
    assert!(matches!(
        abandoned.commit().await,
        Err(CoordinatorError::Timeout { .. })
    ));
    assert_eq!(common::balance_of(&store, owners[0]).await, 700);
    assert_eq!(common::balance_of(&store, owners[1]).await, 500);
}

#[tokio::test]
async fn test_lock_wait_past_deadline_times_out() {
    let (store, handler, owners) =
        common::setup_ledger(&[1000, 200], Duration::from_millis(100)).await;

    let mut holder = store.begin(common::far_deadline()).await.unwrap();
    holder.lock(owners[1]).await.unwrap();

    let result = transfer(&handler, owners[0], owners[1], 300).await;
    assert!(matches!(result, Err(AppError::TransactionTimeout(_))));

    holder.rollback().await.unwrap();
    assert_eq!(common::balance_of(&store, owners[0]).await, 1000);
    assert_eq!(common::balance_of(&store, owners[1]).await, 200);

    // The timed-out transaction left nothing locked.
    assert_eq!(transfer(&handler, owners[0], owners[1], 300).await.unwrap(), 700);
}

#[tokio::test]
async fn test_in_flight_writes_are_not_visible_to_queries() {
    let store = InMemoryLedgerStore::new();
    let owners = common::seed(&store, &[1000, 200]).await;
    let store: Arc<dyn LedgerStore> = Arc::new(store);
    let coordinator = TransactionCoordinator::new(store.clone(), TIMEOUT);
    let query = BalanceQueryService::new(store);

    let mut tx = coordinator.begin().await.unwrap();
    tx.enlist(&[owners[0], owners[1]]).await.unwrap();
    tx.write(owners[0], -300).await.unwrap();
    tx.write(owners[1], 300).await.unwrap();

    assert_eq!(query.get_balance(owners[0]).await.unwrap().value(), 1000);
    assert_eq!(query.get_balance(owners[1]).await.unwrap().value(), 200);
    assert_eq!(tx.read(owners[0]).await.unwrap().balance.value(), 700);

    tx.abort().await;
    assert_eq!(query.get_balance(owners[0]).await.unwrap().value(), 1000);
    assert_eq!(query.get_balance(owners[1]).await.unwrap().value(), 200);
}
