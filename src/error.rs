use crate::receipt::ReceiptStatus;

pub type Result<T> = std::result::Result<T, ReceiptError>;

#[derive(thiserror::Error, Debug)]
pub enum ReceiptError {
    #[error("Receipt #{number} cannot be {action} while {from}")]
    InvalidTransition {
        number: u32,
        from: ReceiptStatus,
        action: &'static str,
    },
    #[error("Receipt pool is already initialized")]
    AlreadyInitialized,
    #[error("Receipt count must be positive, got {0}")]
    InvalidCount(i64),
    #[error("No receipt with id {0}")]
    NotFound(String),
    #[error("Failed to deliver receipt to {recipient}")]
    DeliveryFailure {
        recipient: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("Receipt #{0} has not been issued")]
    NotIssued(u32),
    #[error("Invalid secret code")]
    Unauthorized,
    #[error("Failed to stamp receipt template")]
    Render(#[from] lopdf::Error),
    #[error("Unusable receipt template: {0}")]
    Template(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Storage backend failed")]
    Backend(#[from] sled::Error),
    #[error("Failed to encode receipt record")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("Failed to decode receipt record")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to allocate receipt id")]
    Identifier(#[from] anyhow::Error),
}
