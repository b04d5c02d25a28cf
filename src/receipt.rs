//! Receipt records and the issuance state machine
use super::error::{ReceiptError, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Calendar date as `DD/MM/YYYY`.
    pub fn format_day(&self) -> String {
        self.0.format("%d/%m/%Y").to_string()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Who received a receipt, and who handed it out.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Issuance {
    #[n(0)]
    pub student_name: String, // stored verbatim, matched normalised
    #[n(1)]
    pub section: String,
    #[n(2)]
    pub issuing_party: String,
    #[n(3)]
    pub issued_at: TimeStamp<Utc>,
}

/// Redemption of an issued receipt.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Usage {
    #[n(0)]
    pub used_by: String,
    #[n(1)]
    pub used_at: TimeStamp<Utc>,
}

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub enum ReceiptState {
    #[n(0)]
    Unissued,
    #[n(1)]
    Issued {
        #[n(0)]
        issuance: Issuance,
    },
    #[n(2)]
    Used {
        #[n(0)]
        issuance: Issuance,
        #[n(1)]
        usage: Usage,
    },
}

/// Payload-free view of [`ReceiptState`] for reporting and errors, ordered along the lifecycle.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum ReceiptStatus {
    Unissued,
    Issued,
    Used,
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReceiptStatus::Unissued => "unissued",
            ReceiptStatus::Issued => "issued",
            ReceiptStatus::Used => "used",
        };
        f.write_str(label)
    }
}

impl ReceiptState {
    pub fn status(&self) -> ReceiptStatus {
        match self {
            ReceiptState::Unissued => ReceiptStatus::Unissued,
            ReceiptState::Issued { .. } => ReceiptStatus::Issued,
            ReceiptState::Used { .. } => ReceiptStatus::Used,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Receipt {
    #[n(0)]
    id: String, // bech32 encoded uuid7, assigned by the store
    #[n(1)]
    number: u32,
    #[n(2)]
    state: ReceiptState,
}

impl Receipt {
    /// A fresh pool entry. Only stores create these.
    pub fn unissued(id: String, number: u32) -> Self {
        Self {
            id,
            number,
            state: ReceiptState::Unissued,
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn number(&self) -> u32 {
        self.number
    }
    pub fn state(&self) -> &ReceiptState {
        &self.state
    }
    pub fn status(&self) -> ReceiptStatus {
        self.state.status()
    }
    /// True for issued and used receipts alike.
    pub fn is_issued(&self) -> bool {
        self.status() != ReceiptStatus::Unissued
    }
    pub fn issuance(&self) -> Option<&Issuance> {
        match &self.state {
            ReceiptState::Unissued => None,
            ReceiptState::Issued { issuance } | ReceiptState::Used { issuance, .. } => {
                Some(issuance)
            }
        }
    }
    pub fn usage(&self) -> Option<&Usage> {
        match &self.state {
            ReceiptState::Used { usage, .. } => Some(usage),
            _ => None,
        }
    }
    pub fn student_name(&self) -> Option<&str> {
        self.issuance().map(|i| i.student_name.as_str())
    }

    /// Errors with `InvalidTransition` unless the receipt can still be issued.
    pub fn ensure_unissued(&self) -> Result<()> {
        match self.state {
            ReceiptState::Unissued => Ok(()),
            _ => Err(self.invalid("issued")),
        }
    }

    /// Unissued -> Issued. Leaves the receipt untouched on error.
    pub fn issue(
        &mut self,
        student_name: &str,
        section: &str,
        issuing_party: &str,
        issued_at: TimeStamp<Utc>,
    ) -> Result<()> {
        self.ensure_unissued()?;
        if student_name.trim().is_empty() {
            return Err(ReceiptError::EmptyField("student name"));
        }
        if section.trim().is_empty() {
            return Err(ReceiptError::EmptyField("section"));
        }
        if issuing_party.trim().is_empty() {
            return Err(ReceiptError::EmptyField("issuing party"));
        }

        self.state = ReceiptState::Issued {
            issuance: Issuance {
                student_name: student_name.to_string(),
                section: section.to_string(),
                issuing_party: issuing_party.to_string(),
                issued_at,
            },
        };
        Ok(())
    }

    /// Issued -> Used. Leaves the receipt untouched on error.
    pub fn mark_used(&mut self, used_by: &str, used_at: TimeStamp<Utc>) -> Result<()> {
        let issuance = match &self.state {
            ReceiptState::Issued { issuance } => issuance.clone(),
            _ => return Err(self.invalid("marked used")),
        };
        if used_by.trim().is_empty() {
            return Err(ReceiptError::EmptyField("used by"));
        }

        self.state = ReceiptState::Used {
            issuance,
            usage: Usage {
                used_by: used_by.to_string(),
                used_at,
            },
        };
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> ReceiptError {
        ReceiptError::InvalidTransition {
            number: self.number,
            from: self.status(),
            action,
        }
    }
}
