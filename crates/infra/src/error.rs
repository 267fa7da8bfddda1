use thiserror::Error;

use quoteforge_core::ErrorCategory;
use quoteforge_costing::CostingError;
use quoteforge_quoting::QuoteError;

use crate::store::StoreError;

/// Error returned by the application services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Costing(#[from] CostingError),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    /// The unit of work failed and was rolled back. The store detail is kept
    /// for logs only.
    #[error("persistence failure; the operation was rolled back")]
    Persistence(#[from] StoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Costing(e) => e.category(),
            ServiceError::Quote(e) => e.category(),
            ServiceError::Persistence(_) => ErrorCategory::Persistence,
            ServiceError::InvalidRequest(_) => ErrorCategory::Validation,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
