//! Property-based tests for pool numbering and the receipt state machine
//!
//! The pool properties run against a temporary sled database per case, so
//! the case count is kept small. The state machine properties work on
//! in-memory records and run the default number of cases.

use proptest::prelude::*;
use receipt_tracker::{
    error::ReceiptError,
    pool::{PoolManager, PoolSummary},
    receipt::{Receipt, ReceiptStatus, TimeStamp},
    store::{ReceiptStore, SledReceiptStore},
};
use std::collections::HashSet;
use std::sync::Arc;

// PROPERTY TEST STRATEGIES

#[derive(Debug, Clone)]
enum Action {
    Issue(String),
    MarkUsed(String),
}

/// Strategy to generate issue/redeem attempts, some with blank names
fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        "[A-Za-z ]{0,12}".prop_map(Action::Issue),
        "[A-Za-z ]{0,12}".prop_map(Action::MarkUsed),
    ]
}

fn temporary_store() -> Arc<SledReceiptStore> {
    let db = sled::Config::new().temporary(true).open().unwrap();
    Arc::new(SledReceiptStore::new(Arc::new(db)).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Test that init followed by any number of grows leaves exactly 1..=total,
    /// each number once, each under a distinct id
    #[test]
    fn prop_pool_numbers_are_contiguous(
        size in 1u32..40,
        grows in prop::collection::vec(1i64..20, 0..4),
    ) {
        let store = temporary_store();
        let pool = PoolManager::new(Arc::clone(&store));

        pool.initialize(size).unwrap();
        let mut expected_total = size;
        for count in &grows {
            let added = pool.grow(*count).unwrap();
            prop_assert_eq!(added.first().map(Receipt::number), Some(expected_total + 1));
            expected_total += *count as u32;
        }

        let receipts = store.list().unwrap();
        let numbers: Vec<u32> = receipts.iter().map(Receipt::number).collect();
        prop_assert_eq!(numbers, (1..=expected_total).collect::<Vec<_>>());

        let ids: HashSet<&str> = receipts.iter().map(Receipt::id).collect();
        prop_assert_eq!(ids.len(), receipts.len());
        prop_assert!(receipts.iter().all(|r| r.status() == ReceiptStatus::Unissued));
    }

    /// Test that non-positive growth is refused and leaves the pool alone
    #[test]
    fn prop_non_positive_growth_is_refused(
        size in 1u32..20,
        count in -50i64..=0,
    ) {
        let store = temporary_store();
        let pool = PoolManager::new(Arc::clone(&store));
        pool.initialize(size).unwrap();

        let refused = matches!(pool.grow(count), Err(ReceiptError::InvalidCount(c)) if c == count);
        prop_assert!(refused);
        prop_assert_eq!(store.list().unwrap().len(), size as usize);
    }

    /// Test that a second initialize is refused for any size
    #[test]
    fn prop_initialize_only_once(first in 1u32..20, second in 0u32..20) {
        let store = temporary_store();
        let pool = PoolManager::new(Arc::clone(&store));

        pool.initialize(first).unwrap();
        prop_assert!(pool.initialize(second).is_err());
        prop_assert_eq!(store.list().unwrap().len(), first as usize);
    }
}

proptest! {
    /// Test that any sequence of attempts only ever moves a receipt
    /// Unissued -> Issued -> Used, and that a failed attempt changes nothing
    #[test]
    fn prop_status_only_moves_forward(
        actions in prop::collection::vec(action_strategy(), 1..12),
    ) {
        let mut receipt = Receipt::unissued("receipt_1".to_string(), 1);

        for action in actions {
            let before = receipt.clone();
            let result = match &action {
                Action::Issue(student) => {
                    receipt.issue(student, "XII-A", "Priya", TimeStamp::new())
                }
                Action::MarkUsed(by) => receipt.mark_used(by, TimeStamp::new()),
            };

            match result {
                Ok(()) => prop_assert!(receipt.status() > before.status()),
                Err(_) => prop_assert_eq!(&receipt, &before),
            }
        }
    }

    /// Test that issuance details survive redemption unchanged
    #[test]
    fn prop_issuance_survives_redemption(
        student in "[A-Z][a-z]{1,8} [A-Z][a-z]{1,8}",
        section in "XII-[A-F]",
        redeemer in "[A-Z][a-z]{2,8}",
    ) {
        let mut receipt = Receipt::unissued("receipt_9".to_string(), 9);
        receipt.issue(&student, &section, "Priya", TimeStamp::new()).unwrap();
        let issuance = receipt.issuance().cloned();

        receipt.mark_used(&redeemer, TimeStamp::new()).unwrap();
        prop_assert_eq!(receipt.issuance().cloned(), issuance);

        let summary = PoolSummary::from_receipts(std::slice::from_ref(&receipt));
        prop_assert_eq!(summary.issued, 1);
        prop_assert_eq!(summary.used, 1);
    }
}
