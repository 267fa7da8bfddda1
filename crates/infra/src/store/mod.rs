//! Quoting persistence (unit-of-work abstraction and implementations).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryQuotingStore;
pub use postgres::PostgresQuotingStore;
pub use r#trait::{QuoteFilter, QuotingStore, QuotingTx, StoreError};
