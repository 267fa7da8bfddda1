//! Delivery attempts of an approved quote.

use chrono::{DateTime, Utc};
use quoteforge_core::{QuoteId, QuoteVersionId, SendLogId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Pending,
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SendStatus::Pending => "pending",
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SendStatus::Pending),
            "sent" => Some(SendStatus::Sent),
            "failed" => Some(SendStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSendLog {
    pub id: SendLogId,
    pub quote_id: QuoteId,
    pub version_id: QuoteVersionId,
    pub recipient: String,
    pub subject: String,
    pub status: SendStatus,
    pub error_message: Option<String>,
    pub sent_by: UserId,
    pub attempted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuoteSendLog {
    pub fn pending(
        quote_id: QuoteId,
        version_id: QuoteVersionId,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        sent_by: UserId,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SendLogId::new(),
            quote_id,
            version_id,
            recipient: recipient.into(),
            subject: subject.into(),
            status: SendStatus::Pending,
            error_message: None,
            sent_by,
            attempted_at,
            completed_at: None,
        }
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.status = SendStatus::Sent;
        self.error_message = None;
        self.completed_at = Some(at);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = SendStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> QuoteSendLog {
        QuoteSendLog::pending(
            QuoteId::new(),
            QuoteVersionId::new(),
            "buyer@example.com",
            "Quote Q-20260101-0001",
            UserId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn failure_keeps_the_error_message() {
        let mut l = log();
        assert_eq!(l.status, SendStatus::Pending);
        l.mark_failed("smtp timeout", Utc::now());
        assert_eq!(l.status, SendStatus::Failed);
        assert_eq!(l.error_message.as_deref(), Some("smtp timeout"));
        assert!(l.completed_at.is_some());
    }

    #[test]
    fn success_clears_previous_error() {
        let mut l = log();
        l.error_message = Some("stale".to_string());
        l.mark_sent(Utc::now());
        assert_eq!(l.status, SendStatus::Sent);
        assert!(l.error_message.is_none());
    }
}
