use quoteforge_core::{ErrorCategory, QuoteId, QuoteVersionId, UserId};
use thiserror::Error;

use crate::quote::QuoteStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("quote {0} not found")]
    QuoteNotFound(QuoteId),

    #[error("quote version {0} not found")]
    VersionNotFound(QuoteVersionId),

    #[error("quote in status '{status}' cannot be edited")]
    NotEditable { status: QuoteStatus },

    #[error("cannot {action} a quote in status '{status}'")]
    InvalidTransition {
        action: &'static str,
        status: QuoteStatus,
    },

    #[error("user {0} has no pending approval on this quote")]
    NoPendingApprovalForUser(UserId),

    #[error("approval level {level} must wait for lower levels to approve")]
    ApprovalOutOfOrder { level: u32 },

    #[error("invalid line item {line_no}: {reason}")]
    InvalidItem { line_no: u32, reason: String },

    #[error("invalid term: {0}")]
    InvalidTerm(String),

    #[error("validity days must be positive")]
    InvalidValidity,

    #[error("quote invariant violated: {0}")]
    Invariant(String),
}

impl QuoteError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QuoteError::QuoteNotFound(_)
            | QuoteError::VersionNotFound(_)
            | QuoteError::NoPendingApprovalForUser(_) => ErrorCategory::NotFound,
            QuoteError::NotEditable { .. }
            | QuoteError::InvalidTransition { .. }
            | QuoteError::ApprovalOutOfOrder { .. }
            | QuoteError::Invariant(_) => ErrorCategory::Conflict,
            QuoteError::InvalidItem { .. }
            | QuoteError::InvalidTerm(_)
            | QuoteError::InvalidValidity => ErrorCategory::Validation,
        }
    }
}
