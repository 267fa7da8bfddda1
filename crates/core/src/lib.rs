//! `quoteforge-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the costing and
//! quoting modules (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod numbering;

pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorCategory};
pub use id::{
    ActivityId, ApprovalId, CalculationId, CustomerId, EquipmentId, InquiryId, ProcessStepId,
    QuoteId, QuoteItemId, QuoteVersionId, RouteId, SendLogId, TermTemplateId, UserId,
};
pub use money::{Decimal, percent_of, round_money};
pub use numbering::{DocumentKind, DocumentNumber};
