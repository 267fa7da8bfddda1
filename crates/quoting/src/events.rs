//! Lifecycle notifications emitted after a quote transition commits.

use chrono::{DateTime, Utc};
use quoteforge_core::{Decimal, QuoteId, UserId};
use quoteforge_events::Event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuoteLifecycleEvent {
    Created {
        quote_id: QuoteId,
        quote_number: String,
        total_amount: Decimal,
        actor: UserId,
        at: DateTime<Utc>,
    },
    Submitted {
        quote_id: QuoteId,
        quote_number: String,
        total_amount: Decimal,
        levels: u32,
        actor: UserId,
        at: DateTime<Utc>,
    },
    Approved {
        quote_id: QuoteId,
        quote_number: String,
        approved_amount: Decimal,
        actor: UserId,
        at: DateTime<Utc>,
    },
    Rejected {
        quote_id: QuoteId,
        quote_number: String,
        actor: UserId,
        notes: Option<String>,
        at: DateTime<Utc>,
    },
    Sent {
        quote_id: QuoteId,
        quote_number: String,
        recipient: String,
        actor: UserId,
        at: DateTime<Utc>,
    },
}

impl QuoteLifecycleEvent {
    pub const AGGREGATE_TYPE: &'static str = "quote";

    pub fn quote_id(&self) -> QuoteId {
        match self {
            QuoteLifecycleEvent::Created { quote_id, .. }
            | QuoteLifecycleEvent::Submitted { quote_id, .. }
            | QuoteLifecycleEvent::Approved { quote_id, .. }
            | QuoteLifecycleEvent::Rejected { quote_id, .. }
            | QuoteLifecycleEvent::Sent { quote_id, .. } => *quote_id,
        }
    }
}

impl Event for QuoteLifecycleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuoteLifecycleEvent::Created { .. } => "quote.created",
            QuoteLifecycleEvent::Submitted { .. } => "quote.submitted",
            QuoteLifecycleEvent::Approved { .. } => "quote.approved",
            QuoteLifecycleEvent::Rejected { .. } => "quote.rejected",
            QuoteLifecycleEvent::Sent { .. } => "quote.sent",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuoteLifecycleEvent::Created { at, .. }
            | QuoteLifecycleEvent::Submitted { at, .. }
            | QuoteLifecycleEvent::Approved { at, .. }
            | QuoteLifecycleEvent::Rejected { at, .. }
            | QuoteLifecycleEvent::Sent { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoteforge_events::EventEnvelope;

    #[test]
    fn event_names_follow_webhook_convention() {
        let quote_id = QuoteId::new();
        let e = QuoteLifecycleEvent::Rejected {
            quote_id,
            quote_number: "Q-20260101-0001".to_string(),
            actor: UserId::new(),
            notes: None,
            at: Utc::now(),
        };
        let env = EventEnvelope::wrap(
            *quote_id.as_uuid(),
            QuoteLifecycleEvent::AGGREGATE_TYPE,
            e.clone(),
        );
        assert_eq!(env.event_type(), "quote.rejected");
        assert_eq!(e.quote_id(), quote_id);
    }
}
