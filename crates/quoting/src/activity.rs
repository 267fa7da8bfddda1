use chrono::{DateTime, Utc};
use quoteforge_core::{ActivityId, QuoteId, QuoteVersionId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Created,
    Updated,
    Submitted,
    Approved,
    Rejected,
    Sent,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Created => "created",
            ActivityKind::Updated => "updated",
            ActivityKind::Submitted => "submitted",
            ActivityKind::Approved => "approved",
            ActivityKind::Rejected => "rejected",
            ActivityKind::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ActivityKind::Created),
            "updated" => Some(ActivityKind::Updated),
            "submitted" => Some(ActivityKind::Submitted),
            "approved" => Some(ActivityKind::Approved),
            "rejected" => Some(ActivityKind::Rejected),
            "sent" => Some(ActivityKind::Sent),
            _ => None,
        }
    }
}

/// Append-only audit entry; one per lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteActivityLog {
    pub id: ActivityId,
    pub quote_id: QuoteId,
    pub version_id: Option<QuoteVersionId>,
    pub kind: ActivityKind,
    pub actor: UserId,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl QuoteActivityLog {
    pub fn new(
        quote_id: QuoteId,
        version_id: Option<QuoteVersionId>,
        kind: ActivityKind,
        actor: UserId,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::new(),
            quote_id,
            version_id,
            kind,
            actor,
            description: description.into(),
            created_at,
        }
    }
}
