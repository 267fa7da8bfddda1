//! Infrastructure layer: persistence, collaborators, configuration and the
//! application services of the quoting engine.

pub mod bootstrap;
pub mod config;
pub mod delivery;
pub mod error;
pub mod notifier;
pub mod parameters;
pub mod services;
pub mod store;

mod integration_tests;

pub use bootstrap::{Engine, NotificationBus};
pub use config::{ConfigError, QuotingConfig};
pub use error::{ServiceError, ServiceResult};
pub use services::{
    CostCalculationService, CreateQuoteRequest, QuoteDetail, QuoteService, QuoteSettings,
    SendOutcome, UpdateQuoteRequest,
};
pub use store::{InMemoryQuotingStore, PostgresQuotingStore, QuoteFilter, QuotingStore, StoreError};
