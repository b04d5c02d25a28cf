//! Public name search and autosuggest over a receipt snapshot
use super::error::Result;
use super::name;
use super::receipt::Receipt;
use super::store::{ReceiptStore, SubscriptionId};
use super::utils::extract_receipt_number;
use std::sync::{Arc, PoisonError, RwLock};

pub const SUGGESTION_LIMIT: usize = 5;

/// In-memory projection of the pool, replaced wholesale on every snapshot.
#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    receipts: Vec<Receipt>,
    names: Vec<String>, // distinct by exact string, first-seen order
}

impl SearchIndex {
    pub fn from_snapshot(receipts: &[Receipt]) -> Self {
        let mut index = Self::default();
        index.replace(receipts);
        index
    }

    pub fn replace(&mut self, receipts: &[Receipt]) {
        self.receipts = receipts.to_vec();
        self.names.clear();

        for student in receipts.iter().filter_map(Receipt::student_name) {
            // case-sensitive on purpose: "Asha" and "asha" both stay
            if !student.is_empty() && !self.names.iter().any(|n| n == student) {
                self.names.push(student.to_string());
            }
        }
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Distinct student names in snapshot order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Up to [`SUGGESTION_LIMIT`] names containing `partial`, in snapshot order.
    pub fn suggest(&self, partial: &str) -> Vec<&str> {
        if partial.is_empty() {
            return Vec::new();
        }

        self.names
            .iter()
            .filter(|candidate| name::contains(candidate, partial))
            .take(SUGGESTION_LIMIT)
            .map(String::as_str)
            .collect()
    }

    /// By name: every receipt whose student name contains the query.
    /// By number: the receipt numbered by the first digit run in the query.
    pub fn search(&self, query: &str, by_name: bool) -> Vec<Receipt> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        if by_name {
            return self
                .receipts
                .iter()
                .filter(|receipt| {
                    receipt
                        .student_name()
                        .is_some_and(|student| name::contains(student, query))
                })
                .cloned()
                .collect();
        }

        match extract_receipt_number(query) {
            Some(number) => self
                .receipts
                .iter()
                .filter(|receipt| receipt.number() == number)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// An index kept current by the store's change feed.
    pub fn follow<S: ReceiptStore + ?Sized>(
        store: &S,
    ) -> Result<(Arc<RwLock<SearchIndex>>, SubscriptionId)> {
        let shared = Arc::new(RwLock::new(SearchIndex::default()));

        let target = Arc::clone(&shared);
        let subscription = store.subscribe(Arc::new(move |snapshot: &[Receipt]| {
            target
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .replace(snapshot);
        }))?;

        Ok((shared, subscription))
    }
}
