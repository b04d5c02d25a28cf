//! Emailing rendered receipts to students
use super::error::{ReceiptError, Result};
use super::receipt::Receipt;
use super::render::ReceiptRenderer;
use super::utils::format_receipt_id;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

/// Sends an issued receipt to a destination address.
pub trait ReceiptNotifier {
    fn send_receipt(&self, receipt: &Receipt, recipient: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub cc: Option<String>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            cc: None,
        }
    }
}

/// Composes the receipt message and hands it to a lettre transport. No retries.
pub struct ReceiptMailer<T, R> {
    transport: T,
    renderer: R,
    from: String,
    cc: Option<String>,
    prefix: String,
}

impl<R: ReceiptRenderer> ReceiptMailer<SmtpTransport, R> {
    pub fn smtp(config: &MailerConfig, renderer: R, prefix: &str) -> Result<Self> {
        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|err| delivery_failure(&config.smtp_host, err))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        info!(host = %config.smtp_host, port = config.smtp_port, "smtp mailer ready");

        Ok(Self::new(
            transport,
            renderer,
            config.from.clone(),
            config.cc.clone(),
            prefix,
        ))
    }
}

impl<T, R> ReceiptMailer<T, R>
where
    T: Transport,
    T::Error: std::error::Error + Send + Sync + 'static,
    R: ReceiptRenderer,
{
    pub fn new(transport: T, renderer: R, from: String, cc: Option<String>, prefix: &str) -> Self {
        Self {
            transport,
            renderer,
            from,
            cc,
            prefix: prefix.to_string(),
        }
    }

    pub fn compose(&self, receipt: &Receipt, recipient: &str) -> Result<Message> {
        let issuance = receipt
            .issuance()
            .ok_or(ReceiptError::NotIssued(receipt.number()))?;
        let pdf = self.renderer.render(receipt)?;
        let receipt_id = format_receipt_id(&self.prefix, receipt.number());

        let mut builder = Message::builder()
            .from(self.from.parse::<Mailbox>().map_err(failed_for(recipient))?)
            .to(recipient.parse::<Mailbox>().map_err(failed_for(recipient))?)
            .subject(format!("Your Yearbook Receipt {} Has Been Issued", receipt_id));
        if let Some(cc) = &self.cc {
            builder = builder.cc(cc.parse::<Mailbox>().map_err(failed_for(recipient))?);
        }

        let body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #1e3a8a;">Yearbook Receipt Issued</h2>
  <p>Dear <strong>{name}</strong>,</p>
  <p>Your yearbook receipt has been successfully issued!</p>
  <div style="background-color: #f1f5f9; padding: 15px; border-radius: 8px; margin: 20px 0;">
    <p><strong>Receipt ID:</strong> {id}</p>
    <p><strong>Section:</strong> {section}</p>
    <p><strong>Issue Date:</strong> {date}</p>
  </div>
  <p>Please find your receipt attached to this email as a PDF.</p>
  <p>Keep this receipt safe - you will need to present it when collecting your yearbook.</p>
</div>"#,
            name = escape_html(&issuance.student_name),
            id = receipt_id,
            section = escape_html(&issuance.section),
            date = issuance.issued_at.format_day(),
        );
        let pdf_type = ContentType::parse("application/pdf").map_err(failed_for(recipient))?;

        builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(body))
                    .singlepart(
                        Attachment::new(format!("Receipt-{}.pdf", receipt_id)).body(pdf, pdf_type),
                    ),
            )
            .map_err(failed_for(recipient))
    }
}

impl<T, R> ReceiptNotifier for ReceiptMailer<T, R>
where
    T: Transport,
    T::Error: std::error::Error + Send + Sync + 'static,
    R: ReceiptRenderer,
{
    fn send_receipt(&self, receipt: &Receipt, recipient: &str) -> Result<()> {
        let message = self.compose(receipt, recipient)?;

        self.transport
            .send(&message)
            .map_err(|err| delivery_failure(recipient, err))?;
        info!(receipt = receipt.number(), recipient, "receipt emailed");

        Ok(())
    }
}

fn delivery_failure(
    recipient: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> ReceiptError {
    ReceiptError::DeliveryFailure {
        recipient: recipient.to_string(),
        source: Box::new(err),
    }
}

fn failed_for<E>(recipient: &str) -> impl FnOnce(E) -> ReceiptError + '_
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |err| delivery_failure(recipient, err)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
