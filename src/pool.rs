//! Creation and growth of the numbered receipt pool
use super::error::{ReceiptError, Result};
use super::receipt::{Receipt, ReceiptStatus};
use super::store::ReceiptStore;
use std::sync::Arc;
use tracing::info;

pub struct PoolManager<S: ReceiptStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ReceiptStore + ?Sized> PoolManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates receipts `1..=size`, all unissued, in one batch.
    pub fn initialize(&self, size: u32) -> Result<Vec<Receipt>> {
        if size == 0 {
            return Err(ReceiptError::InvalidCount(0));
        }
        if !self.store.is_empty()? {
            return Err(ReceiptError::AlreadyInitialized);
        }

        let numbers: Vec<u32> = (1..=size).collect();
        let created = self.store.create_batch(&numbers)?;
        info!(size, "receipt pool initialized");

        Ok(created)
    }

    /// Appends `count` unissued receipts after the highest number currently stored.
    ///
    /// The maximum is re-read on every call since rows can be added out of band.
    /// Two concurrent calls may still compute the same maximum and collide.
    pub fn grow(&self, count: i64) -> Result<Vec<Receipt>> {
        let count = u32::try_from(count)
            .ok()
            .filter(|c| *c > 0)
            .ok_or(ReceiptError::InvalidCount(count))?;

        let max = self
            .store
            .list()?
            .iter()
            .map(Receipt::number)
            .max()
            .unwrap_or(0);
        let last = max
            .checked_add(count)
            .ok_or(ReceiptError::InvalidCount(i64::from(count)))?;

        let numbers: Vec<u32> = (max + 1..=last).collect();
        let created = self.store.create_batch(&numbers)?;
        info!(from = max + 1, to = last, "receipt pool grown");

        Ok(created)
    }
}

/// Counts shown alongside the admin listing.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct PoolSummary {
    pub total: usize,
    pub issued: usize, // includes used receipts
    pub used: usize,
}

impl PoolSummary {
    pub fn from_receipts(receipts: &[Receipt]) -> Self {
        receipts
            .iter()
            .fold(Self::default(), |mut summary, receipt| {
                summary.total += 1;
                match receipt.status() {
                    ReceiptStatus::Unissued => {}
                    ReceiptStatus::Issued => summary.issued += 1,
                    ReceiptStatus::Used => {
                        summary.issued += 1;
                        summary.used += 1;
                    }
                }
                summary
            })
    }
}
