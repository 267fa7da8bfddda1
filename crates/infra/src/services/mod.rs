//! Application services: each public operation runs in one unit of work.

pub mod costing;
pub mod quotes;

pub use costing::CostCalculationService;
pub use quotes::{
    CreateQuoteRequest, QuoteDetail, QuoteService, QuoteSettings, SendOutcome, UpdateQuoteRequest,
};
