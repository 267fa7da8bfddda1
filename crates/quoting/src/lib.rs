//! Quote aggregate and approval state machine (pure domain).
//!
//! A quote is a versioned document: exactly one [`QuoteVersion`] is current,
//! and its line items determine the quote total. Submission derives a tiered
//! approval chain from that total; recorded decisions drive the quote to
//! `approved` or `rejected`. Every transition yields exactly one
//! [`QuoteActivityLog`] entry. Persistence and numbering are the caller's job.

pub mod activity;
pub mod approval;
pub mod error;
pub mod events;
pub mod quote;
pub mod send_log;
pub mod version;

pub use activity::{ActivityKind, QuoteActivityLog};
pub use approval::{
    ApprovalOrdering, ApprovalPolicy, ApprovalStatus, Approver, ApproverRole, ChainOutcome,
    Decision, QuoteApproval, evaluate_chain,
};
pub use error::QuoteError;
pub use events::QuoteLifecycleEvent;
pub use quote::{
    Created, DecisionOutcome, NewQuote, Quote, QuoteChanges, QuoteHeader, QuoteState, QuoteStatus,
    Revision, Submission,
};
pub use send_log::{QuoteSendLog, SendStatus};
pub use version::{
    ItemInput, PricedItem, QuoteItem, QuoteTerm, QuoteVersion, TermInput, TermTemplate,
};
