//! Quote document rendering and email delivery collaborators.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::info;

use quoteforge_quoting::{Quote, QuoteVersion};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to render quote document: {0}")]
    Render(String),

    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("invalid recipient '{0}'")]
    InvalidRecipient(String),
}

/// Everything a renderer needs to produce the customer-facing document.
#[derive(Debug, Clone, Copy)]
pub struct QuoteDocument<'a> {
    pub quote: &'a Quote,
    pub version: &'a QuoteVersion,
    pub sender_name: &'a str,
}

/// Produces the document attached to an outgoing quote (PDF in production).
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &QuoteDocument<'_>) -> Result<Vec<u8>, DeliveryError>;

    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;
}

/// Renders a plain-text quote sheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl PlainTextRenderer {
    fn write_sheet(document: &QuoteDocument<'_>) -> Result<String, std::fmt::Error> {
        let header = document.quote.header();
        let mut out = String::new();

        writeln!(out, "QUOTATION {}", header.quote_number)?;
        writeln!(out, "Version: {}", document.version.version_number)?;
        writeln!(out, "Valid: {} to {}", header.valid_from, header.valid_until)?;
        writeln!(out)?;
        for item in document.version.items() {
            writeln!(
                out,
                "{:>3}. {} x{} @ {} = {}",
                item.line_no, item.product_name, item.quantity, item.unit_price, item.total_price
            )?;
        }
        writeln!(out)?;
        writeln!(out, "Total: {}", document.version.total())?;
        if let Some(payment) = &header.payment_terms {
            writeln!(out, "Payment: {payment}")?;
        }
        if let Some(delivery) = &header.delivery_terms {
            writeln!(out, "Delivery: {delivery}")?;
        }
        for term in document.version.terms() {
            writeln!(out, "{}. {}: {}", term.sort_order, term.title, term.content)?;
        }
        writeln!(out)?;
        writeln!(out, "{}", document.sender_name)?;
        Ok(out)
    }
}

impl DocumentRenderer for PlainTextRenderer {
    fn render(&self, document: &QuoteDocument<'_>) -> Result<Vec<u8>, DeliveryError> {
        Self::write_sheet(document)
            .map(String::into_bytes)
            .map_err(|e| DeliveryError::Render(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
    pub content_type: String,
}

/// Email transport.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError>;
}

/// Logs instead of sending (dev).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        info!(
            recipient = %email.recipient,
            subject = %email.subject,
            attachment = %email.attachment_name,
            bytes = email.attachment.len(),
            "quote email (not sent: log mailer)"
        );
        Ok(())
    }
}

/// Minimal shape check; the transport does real validation.
pub fn validate_recipient(recipient: &str) -> Result<(), DeliveryError> {
    let trimmed = recipient.trim();
    match trimmed.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !trimmed.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(DeliveryError::InvalidRecipient(recipient.to_string())),
    }
}
