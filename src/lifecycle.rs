//! Service layer API for issuing and redeeming receipts
use super::error::{ReceiptError, Result};
use super::name;
use super::receipt::{Receipt, TimeStamp};
use super::store::ReceiptStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Recipient details for an issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub student_name: String,
    pub section: String,
    pub issuing_party: String,
}

impl IssueRequest {
    pub fn new(
        student_name: impl Into<String>,
        section: impl Into<String>,
        issuing_party: impl Into<String>,
    ) -> Self {
        Self {
            student_name: student_name.into(),
            section: section.into(),
            issuing_party: issuing_party.into(),
        }
    }
}

/// Whether the caller has already seen and accepted duplicate warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Unconfirmed,
    OverrideDuplicates,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Committed(Receipt),
    /// Nothing was written. Re-run with [`Confirmation::OverrideDuplicates`] to go ahead.
    DuplicateWarning(Vec<Receipt>),
}

/// Issued or used receipts whose student name matches `student_name`.
///
/// Exact normalised equality; the section is not part of the key.
pub fn check_duplicate(student_name: &str, receipts: &[Receipt]) -> Vec<Receipt> {
    receipts
        .iter()
        .filter(|receipt| {
            receipt
                .student_name()
                .is_some_and(|existing| name::matches(existing, student_name))
        })
        .cloned()
        .collect()
}

pub struct ReceiptLifecycle<S: ReceiptStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ReceiptStore + ?Sized> ReceiptLifecycle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // the stored state that beat us, reported as the transition's starting point
    fn lost_race(&self, id: &str, action: &'static str) -> ReceiptError {
        match self.load_receipt(id) {
            Ok(current) => {
                warn!(
                    receipt = current.number(),
                    status = %current.status(),
                    "receipt changed by another issuer before the write"
                );
                ReceiptError::InvalidTransition {
                    number: current.number(),
                    from: current.status(),
                    action,
                }
            }
            Err(err) => err,
        }
    }

    /// Load a receipt from the store
    fn load_receipt(&self, id: &str) -> Result<Receipt> {
        self.store
            .get(id)?
            .ok_or_else(|| ReceiptError::NotFound(id.to_string()))
    }

    /// Advisory duplicate scan against a fresh read of the pool.
    ///
    /// Other issuers' writes may not be visible yet. A failed read is
    /// reported as "no duplicates".
    pub fn find_duplicates(&self, student_name: &str) -> Vec<Receipt> {
        match self.store.list() {
            Ok(receipts) => check_duplicate(student_name, &receipts),
            Err(err) => {
                warn!(error = %err, "duplicate scan failed, assuming no duplicates");
                Vec::new()
            }
        }
    }

    /// Issue with a duplicate check first. Unconfirmed requests that match an
    /// existing name come back as [`IssueOutcome::DuplicateWarning`].
    pub fn issue(
        &self,
        id: &str,
        request: &IssueRequest,
        confirmation: Confirmation,
    ) -> Result<IssueOutcome> {
        let receipt = self.load_receipt(id)?;

        // reject misuse before bothering the issuer with warnings
        receipt.ensure_unissued()?;

        let duplicates = self.find_duplicates(&request.student_name);
        if !duplicates.is_empty() {
            let numbers: Vec<u32> = duplicates.iter().map(Receipt::number).collect();
            match confirmation {
                Confirmation::Unconfirmed => {
                    warn!(
                        receipt = receipt.number(),
                        ?numbers,
                        "student already holds a receipt"
                    );
                    return Ok(IssueOutcome::DuplicateWarning(duplicates));
                }
                Confirmation::OverrideDuplicates => {
                    warn!(
                        receipt = receipt.number(),
                        ?numbers,
                        issuer = %request.issuing_party,
                        "issuing despite duplicate warning"
                    );
                }
            }
        }

        self.commit_issue(id, request).map(IssueOutcome::Committed)
    }

    /// Write the issuance without any duplicate check. Fails with
    /// `InvalidTransition` if another issuer changed the receipt after it was read.
    pub fn commit_issue(&self, id: &str, request: &IssueRequest) -> Result<Receipt> {
        let loaded = self.load_receipt(id)?;
        let mut receipt = loaded.clone();

        receipt.issue(
            &request.student_name,
            &request.section,
            &request.issuing_party,
            TimeStamp::new(),
        )?;
        if !self.store.replace(&loaded, &receipt)? {
            return Err(self.lost_race(id, "issued"));
        }
        info!(
            receipt = receipt.number(),
            issuer = %request.issuing_party,
            "receipt issued"
        );

        Ok(receipt)
    }

    /// Record that an issued receipt has been redeemed.
    pub fn mark_used(&self, id: &str, used_by: &str) -> Result<Receipt> {
        let loaded = self.load_receipt(id)?;
        let mut receipt = loaded.clone();

        receipt.mark_used(used_by, TimeStamp::new())?;
        if !self.store.replace(&loaded, &receipt)? {
            return Err(self.lost_race(id, "marked used"));
        }
        info!(receipt = receipt.number(), used_by, "receipt marked used");

        Ok(receipt)
    }
}
