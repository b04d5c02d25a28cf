//! Shared-secret gate in front of the admin operations
use super::error::{ReceiptError, Result};
use tracing::{info, warn};

/// Holds only the sha256 hex digest of the secret code.
#[derive(Debug, Clone)]
pub struct AccessGate {
    secret_digest: String,
}

/// Proof of a successful login; names the person issuing receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerSession {
    issuer: String,
}

impl AccessGate {
    pub fn new(secret_digest: impl Into<String>) -> Self {
        Self {
            secret_digest: secret_digest.into().trim().to_lowercase(),
        }
    }

    pub fn from_secret(secret: &str) -> Self {
        Self::new(sha256::digest(secret))
    }

    pub fn login(&self, code: &str, issuer_name: &str) -> Result<IssuerSession> {
        let issuer = issuer_name.trim();
        if issuer.is_empty() {
            return Err(ReceiptError::EmptyField("issuer name"));
        }
        if sha256::digest(code) != self.secret_digest {
            warn!(issuer, "rejected login with wrong secret code");
            return Err(ReceiptError::Unauthorized);
        }

        info!(issuer, "issuer logged in");
        Ok(IssuerSession {
            issuer: issuer.to_string(),
        })
    }
}

impl IssuerSession {
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}
