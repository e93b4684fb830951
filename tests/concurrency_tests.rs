mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;
use wallet_ledger::error::LedgerError;
use wallet_ledger::models::AccountId;

const ACCOUNTS: [AccountId; 4] = [1, 2, 3, 4];

#[derive(Debug, Clone)]
enum Op {
    Deposit { account: AccountId, cents: i64 },
    Transfer { from: AccountId, to: AccountId, cents: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1..=4i64, 1..5_000i64).prop_map(|(account, cents)| Op::Deposit { account, cents }),
        (1..=4i64, 1..=4i64, 1..20_000i64)
            .prop_filter("distinct accounts", |(from, to, _)| from != to)
            .prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
    ]
}

#[derive(Debug, Default)]
struct Outcome {
    deposited: Decimal,
    committed_deposits: usize,
    committed_transfers: usize,
}

fn run_concurrently(initial_cents: i64, ops: Vec<Op>) -> (wallet_ledger::repositories::InMemoryLedgerStore, Decimal, Outcome) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let seed: Vec<_> = ACCOUNTS
            .iter()
            .map(|id| (*id, Decimal::new(initial_cents, 2)))
            .collect();
        let (store, service) = common::slow_memory_ledger(&seed, Duration::from_micros(200));
        let initial_total = store.total_balance();

        let handles: Vec<_> = ops
            .into_iter()
            .map(|op| {
                let service = service.clone();
                tokio::spawn(async move {
                    let result = match &op {
                        Op::Deposit { account, cents } => service
                            .deposit(*account, Decimal::new(*cents, 2))
                            .await
                            .map(|_| ()),
                        Op::Transfer { from, to, cents } => service
                            .transfer(*from, *to, Decimal::new(*cents, 2))
                            .await
                            .map(|_| ()),
                    };
                    (op, result)
                })
            })
            .collect();

        let mut outcome = Outcome::default();
        for handle in handles {
            let (op, result) = handle.await.unwrap();
            match (op, result) {
                (Op::Deposit { cents, .. }, Ok(())) => {
                    outcome.deposited += Decimal::new(cents, 2);
                    outcome.committed_deposits += 1;
                }
                (Op::Transfer { .. }, Ok(())) => outcome.committed_transfers += 1,
                (Op::Transfer { .. }, Err(LedgerError::InsufficientFunds { .. })) => {}
                (op, Err(e)) => panic!("{op:?} failed unexpectedly: {e}"),
            }
        }

        (store, initial_total, outcome)
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        ..ProptestConfig::default()
    })]

    /// Interleaved deposits and transfers never create or destroy money,
    /// never overdraw, and leave exactly one record per committed write.
    #[test]
    fn concurrent_operations_preserve_ledger_invariants(
        initial_cents in 0..10_000i64,
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let (store, initial_total, outcome) = run_concurrently(initial_cents, ops);

        prop_assert_eq!(store.total_balance(), initial_total + outcome.deposited);

        for id in ACCOUNTS {
            let balance = store.balance_of(id).unwrap();
            prop_assert!(balance >= Decimal::ZERO, "account {} went negative: {}", id, balance);

            let from_history: Decimal = store.records_for(id).iter().map(|r| r.amount).sum();
            prop_assert_eq!(balance, Decimal::new(initial_cents, 2) + from_history);
        }

        prop_assert_eq!(
            store.record_count(),
            outcome.committed_deposits + 2 * outcome.committed_transfers
        );
    }
}
