use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use receipt_tracker::access::{AccessGate, IssuerSession};
use receipt_tracker::config::TrackerConfig;
use receipt_tracker::lifecycle::{Confirmation, IssueOutcome, IssueRequest, ReceiptLifecycle};
use receipt_tracker::notify::{ReceiptMailer, ReceiptNotifier};
use receipt_tracker::pool::{PoolManager, PoolSummary};
use receipt_tracker::receipt::Receipt;
use receipt_tracker::render::{PdfTemplateRenderer, ReceiptRenderer};
use receipt_tracker::search::SearchIndex;
use receipt_tracker::store::{ReceiptStore, SledReceiptStore};
use receipt_tracker::utils::format_receipt_id;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "receipt-tracker", about = "Issue and look up numbered yearbook receipts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Login {
    /// Shared council secret code
    #[arg(long, env = "RECEIPT_CODE", hide_env_values = true)]
    code: String,
    /// Your name, recorded on every receipt you issue or redeem
    #[arg(long, env = "RECEIPT_ISSUER")]
    issuer: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the receipt pool (fails if any receipts exist)
    Init {
        #[command(flatten)]
        login: Login,
        #[arg(long)]
        size: Option<u32>,
    },
    /// Append receipts after the current highest number
    Grow {
        #[command(flatten)]
        login: Login,
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },
    /// Show every receipt with totals
    List {
        #[command(flatten)]
        login: Login,
    },
    /// Issue a receipt to a student
    Issue {
        #[command(flatten)]
        login: Login,
        number: u32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        section: String,
        /// Issue even when the name already holds a receipt
        #[arg(long)]
        force: bool,
    },
    /// Record that an issued receipt was redeemed
    MarkUsed {
        #[command(flatten)]
        login: Login,
        number: u32,
    },
    /// Public lookup by student name or receipt number
    Search {
        query: String,
        #[arg(long)]
        by_number: bool,
    },
    /// Name suggestions for a partial name
    Suggest { partial: String },
    /// Write the printable receipt PDF
    Render {
        number: u32,
        #[arg(long)]
        out: PathBuf,
    },
    /// Email the printable receipt
    Email {
        number: u32,
        #[arg(long)]
        to: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = TrackerConfig::from_env()?;
    let store: Arc<dyn ReceiptStore> = Arc::new(
        SledReceiptStore::open(&config.db_path)
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?,
    );

    match cli.command {
        Command::Init { login, size } => {
            authorize(&config, &login)?;
            let size = size.unwrap_or(config.pool_size);
            PoolManager::new(store).initialize(size)?;
            println!("Created receipts 1..={}", size);
        }
        Command::Grow { login, count } => {
            authorize(&config, &login)?;
            let created = PoolManager::new(store).grow(count)?;
            if let (Some(first), Some(last)) = (created.first(), created.last()) {
                println!(
                    "Added {} to {}",
                    format_receipt_id(&config.prefix, first.number()),
                    format_receipt_id(&config.prefix, last.number())
                );
            }
        }
        Command::List { login } => {
            authorize(&config, &login)?;
            let receipts = store.list()?;
            for receipt in &receipts {
                println!("{}", describe(&config.prefix, receipt));
            }
            let summary = PoolSummary::from_receipts(&receipts);
            println!(
                "Total: {} | Issued: {} | Used: {}",
                summary.total, summary.issued, summary.used
            );
        }
        Command::Issue {
            login,
            number,
            name,
            section,
            force,
        } => {
            let session = authorize(&config, &login)?;
            let receipt = by_number(store.as_ref(), number)?;
            let lifecycle = ReceiptLifecycle::new(Arc::clone(&store));
            let request = IssueRequest::new(name, section, session.issuer());
            let confirmation = if force {
                Confirmation::OverrideDuplicates
            } else {
                Confirmation::Unconfirmed
            };

            match lifecycle.issue(receipt.id(), &request, confirmation)? {
                IssueOutcome::Committed(receipt) => {
                    println!("Issued {}", describe(&config.prefix, &receipt));
                }
                IssueOutcome::DuplicateWarning(matches) => {
                    println!("{} already holds:", request.student_name);
                    for existing in &matches {
                        println!("  {}", describe(&config.prefix, existing));
                    }
                    bail!("Nothing issued. Re-run with --force to issue anyway");
                }
            }
        }
        Command::MarkUsed { login, number } => {
            let session = authorize(&config, &login)?;
            let receipt = by_number(store.as_ref(), number)?;
            let receipt = ReceiptLifecycle::new(store).mark_used(receipt.id(), session.issuer())?;
            println!("Marked used {}", describe(&config.prefix, &receipt));
        }
        Command::Search { query, by_number } => {
            let index = SearchIndex::from_snapshot(&store.list()?);
            let found: Vec<Receipt> = index
                .search(&query, !by_number)
                .into_iter()
                .filter(Receipt::is_issued)
                .collect();

            if found.is_empty() {
                println!("No receipt found");
            }
            for receipt in &found {
                println!("{}", describe(&config.prefix, receipt));
            }
        }
        Command::Suggest { partial } => {
            let index = SearchIndex::from_snapshot(&store.list()?);
            for name in index.suggest(&partial) {
                println!("{}", name);
            }
        }
        Command::Render { number, out } => {
            let receipt = by_number(store.as_ref(), number)?;
            let renderer = PdfTemplateRenderer::from_path(&config.template_path)
                .with_context(|| format!("Failed to read {}", config.template_path.display()))?;
            std::fs::write(&out, renderer.render(&receipt)?)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {}", out.display());
        }
        Command::Email { number, to } => {
            let mailer_config = config
                .mailer
                .as_ref()
                .ok_or_else(|| anyhow!("SMTP_HOST is not set, email is disabled"))?;
            let receipt = by_number(store.as_ref(), number)?;
            let renderer = PdfTemplateRenderer::from_path(&config.template_path)
                .with_context(|| format!("Failed to read {}", config.template_path.display()))?;
            ReceiptMailer::smtp(mailer_config, renderer, &config.prefix)?
                .send_receipt(&receipt, &to)?;
            println!("Sent {} to {}", format_receipt_id(&config.prefix, number), to);
        }
    }

    Ok(())
}

fn authorize(config: &TrackerConfig, login: &Login) -> anyhow::Result<IssuerSession> {
    let digest = config
        .secret_digest
        .as_deref()
        .ok_or_else(|| anyhow!("RECEIPT_SECRET_DIGEST is not set, admin commands are disabled"))?;

    Ok(AccessGate::new(digest).login(&login.code, &login.issuer)?)
}

fn by_number(store: &dyn ReceiptStore, number: u32) -> anyhow::Result<Receipt> {
    SearchIndex::from_snapshot(&store.list()?)
        .search(&number.to_string(), false)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No receipt numbered {}", number))
}

fn describe(prefix: &str, receipt: &Receipt) -> String {
    let id = format_receipt_id(prefix, receipt.number());
    let Some(issuance) = receipt.issuance() else {
        return format!("{}  not issued", id);
    };

    let mut line = format!(
        "{}  {} ({})  issued by {} on {}",
        id,
        issuance.student_name,
        issuance.section,
        issuance.issuing_party,
        issuance.issued_at.to_datetime_utc().format("%d/%m/%Y %H:%M")
    );
    if let Some(usage) = receipt.usage() {
        line.push_str(&format!(
            "  | yearbook given by {} at {}",
            usage.used_by,
            usage.used_at.to_datetime_utc().format("%d/%m/%Y %H:%M")
        ));
    }
    line
}
