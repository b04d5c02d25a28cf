//! Environment-driven settings for the tracker and its mailer
use crate::notify::MailerConfig;
use anyhow::Context;
use std::path::PathBuf;

pub const DEFAULT_PREFIX: &str = "YB25";
pub const DEFAULT_POOL_SIZE: u32 = 101;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub db_path: PathBuf,
    pub prefix: String,
    pub pool_size: u32,
    pub template_path: PathBuf,
    pub secret_digest: Option<String>, // sha256 hex of the shared code
    pub mailer: Option<MailerConfig>,  // None when SMTP_HOST is unset
}

impl TrackerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("Failed to read .env file");
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let db_path = var("RECEIPT_DB_PATH").unwrap_or_else(|| "receipts.db".to_string());
        let prefix = var("RECEIPT_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let pool_size = match var("RECEIPT_POOL_SIZE") {
            Some(size) => size
                .trim()
                .parse()
                .with_context(|| format!("RECEIPT_POOL_SIZE is not a valid size: {}", size))?,
            None => DEFAULT_POOL_SIZE,
        };
        let template_path =
            var("RECEIPT_TEMPLATE_PATH").unwrap_or_else(|| "Yearbook Receipts.pdf".to_string());

        let mailer = match var("SMTP_HOST") {
            Some(smtp_host) => {
                let defaults = MailerConfig::default();
                let smtp_port = match var("SMTP_PORT") {
                    Some(port) => port
                        .trim()
                        .parse()
                        .with_context(|| format!("SMTP_PORT is not a valid port: {}", port))?,
                    None => defaults.smtp_port,
                };
                let username = var("SMTP_USERNAME").unwrap_or_default();
                let from = var("MAIL_FROM").unwrap_or_else(|| username.clone());

                Some(MailerConfig {
                    smtp_host,
                    smtp_port,
                    password: var("SMTP_PASSWORD").unwrap_or_default(),
                    username,
                    from,
                    cc: var("MAIL_CC"),
                })
            }
            None => None,
        };

        Ok(Self {
            db_path: db_path.into(),
            prefix,
            pool_size,
            template_path: template_path.into(),
            secret_digest: var("RECEIPT_SECRET_DIGEST"),
            mailer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<TrackerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TrackerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.prefix, "YB25");
        assert_eq!(config.pool_size, 101);
        assert_eq!(config.db_path, PathBuf::from("receipts.db"));
        assert!(config.secret_digest.is_none());
        assert!(config.mailer.is_none());
    }

    #[test]
    fn mail_settings_need_a_host() {
        let config = config_from(&[
            ("SMTP_HOST", "smtp.example.org"),
            ("SMTP_USERNAME", "council@example.org"),
            ("MAIL_CC", "archive@example.org"),
        ])
        .unwrap();

        let mailer = config.mailer.unwrap();
        assert_eq!(mailer.smtp_port, 587);
        assert_eq!(mailer.from, "council@example.org");
        assert_eq!(mailer.cc.as_deref(), Some("archive@example.org"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        assert!(config_from(&[("RECEIPT_POOL_SIZE", "lots")]).is_err());
        assert!(config_from(&[("SMTP_HOST", "h"), ("SMTP_PORT", "99999")]).is_err());
    }
}
