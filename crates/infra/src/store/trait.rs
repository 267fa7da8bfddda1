use chrono::NaiveDate;
use thiserror::Error;

use quoteforge_core::{
    CalculationId, CustomerId, DocumentKind, DocumentNumber, EquipmentId, InquiryId,
    ProcessStepId, QuoteId, QuoteVersionId, RouteId,
};
use quoteforge_costing::{CostCalculation, Equipment, ProcessStep, ProductProcessRoute};
use quoteforge_quoting::{
    ApproverRole, Quote, QuoteActivityLog, QuoteApproval, QuoteSendLog, QuoteStatus,
    QuoteVersion, TermTemplate,
};

/// Store operation error.
///
/// These are **infrastructure** failures (connectivity, constraint violations,
/// undecodable rows). Services surface all of them as one opaque persistence
/// error after the unit of work has been rolled back.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or concurrency constraint rejected the write.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A count does not fit the column it is stored in.
    #[error("value {value} out of range for column {column}")]
    OutOfRange { column: &'static str, value: u32 },

    #[error("store backend error: {0}")]
    Backend(String),

    /// Raised by the in-memory store when a failure was injected.
    #[error("injected failure in {0}")]
    Injected(&'static str),
}

/// Filter for [`QuotingTx::list_quotes`]; empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteFilter {
    pub status: Option<QuoteStatus>,
    pub customer_id: Option<CustomerId>,
    pub inquiry_id: Option<InquiryId>,
}

impl QuoteFilter {
    pub fn matches(&self, quote: &Quote) -> bool {
        self.status.is_none_or(|s| quote.status() == s)
            && self
                .customer_id
                .is_none_or(|c| quote.header().customer_id == c)
            && self
                .inquiry_id
                .is_none_or(|i| quote.header().inquiry_id == Some(i))
    }
}

/// Entry point to the quoting store.
///
/// Every operation of the costing and quoting services runs inside exactly one
/// [`QuotingTx`]: nothing it writes is observable until `commit()`, and a
/// transaction dropped without committing is rolled back.
#[async_trait::async_trait]
pub trait QuotingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn QuotingTx>, StoreError>;
}

/// A unit of work over the quoting store.
#[async_trait::async_trait]
pub trait QuotingTx: Send {
    /// Allocate the next number of the daily sequence for `kind`.
    ///
    /// Sequences are per calendar day, start at 1 and are gap-free among
    /// committed transactions.
    async fn next_document_number(
        &mut self,
        kind: DocumentKind,
        day: NaiveDate,
    ) -> Result<DocumentNumber, StoreError>;

    // Route catalog.

    async fn get_route(&mut self, id: RouteId) -> Result<Option<ProductProcessRoute>, StoreError>;

    /// Routes of a product category (custom routes included), by name.
    async fn list_routes(&mut self, category: &str)
    -> Result<Vec<ProductProcessRoute>, StoreError>;

    async fn insert_route(&mut self, route: &ProductProcessRoute) -> Result<(), StoreError>;

    async fn get_process_step(
        &mut self,
        id: ProcessStepId,
    ) -> Result<Option<ProcessStep>, StoreError>;

    async fn get_equipment(&mut self, id: EquipmentId) -> Result<Option<Equipment>, StoreError>;

    // Cost calculations.

    async fn insert_calculation(&mut self, calc: &CostCalculation) -> Result<(), StoreError>;

    /// Rewrite header and details.
    async fn update_calculation(&mut self, calc: &CostCalculation) -> Result<(), StoreError>;

    async fn get_calculation(
        &mut self,
        id: CalculationId,
    ) -> Result<Option<CostCalculation>, StoreError>;

    /// Whether a quote header or any quote item links to the calculation.
    async fn calculation_is_quoted(&mut self, id: CalculationId) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list_calculations(
        &mut self,
        inquiry_id: Option<InquiryId>,
    ) -> Result<Vec<CostCalculation>, StoreError>;

    // Quotes.

    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), StoreError>;

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError>;

    /// Load a quote, locking it for the rest of the unit of work.
    async fn get_quote(&mut self, id: QuoteId) -> Result<Option<Quote>, StoreError>;

    /// Newest first.
    async fn list_quotes(&mut self, filter: &QuoteFilter) -> Result<Vec<Quote>, StoreError>;

    /// Insert a version with its items and terms.
    async fn insert_version(&mut self, version: &QuoteVersion) -> Result<(), StoreError>;

    /// Rewrite a version's header and replace its items and terms.
    async fn update_version(&mut self, version: &QuoteVersion) -> Result<(), StoreError>;

    async fn get_version(
        &mut self,
        id: QuoteVersionId,
    ) -> Result<Option<QuoteVersion>, StoreError>;

    /// Ascending by version number.
    async fn list_versions(&mut self, quote_id: QuoteId) -> Result<Vec<QuoteVersion>, StoreError>;

    async fn list_term_templates(&mut self) -> Result<Vec<TermTemplate>, StoreError>;

    // Approvals.

    async fn insert_approvals(&mut self, approvals: &[QuoteApproval]) -> Result<(), StoreError>;

    async fn update_approval(&mut self, approval: &QuoteApproval) -> Result<(), StoreError>;

    /// Approval rows of one submission round, by level.
    async fn list_approvals(
        &mut self,
        quote_id: QuoteId,
        round: u32,
    ) -> Result<Vec<QuoteApproval>, StoreError>;

    /// Pending rows for `role` in the live round of quotes awaiting approval.
    async fn pending_approvals(
        &mut self,
        role: ApproverRole,
    ) -> Result<Vec<QuoteApproval>, StoreError>;

    // Audit trail.

    async fn append_activity(&mut self, entry: &QuoteActivityLog) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_activity(&mut self, quote_id: QuoteId)
    -> Result<Vec<QuoteActivityLog>, StoreError>;

    async fn insert_send_log(&mut self, log: &QuoteSendLog) -> Result<(), StoreError>;

    async fn update_send_log(&mut self, log: &QuoteSendLog) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_send_logs(&mut self, quote_id: QuoteId) -> Result<Vec<QuoteSendLog>, StoreError>;

    /// Make every write of this unit of work visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
