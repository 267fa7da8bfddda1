use quoteforge_core::{
    CalculationId, Decimal, EquipmentId, ErrorCategory, ProcessStepId, RouteId,
};
use thiserror::Error;

use crate::calculation::CalculationStatus;

/// Failures of the cost calculation engine.
///
/// Every variant fails the whole calculation; nothing is partially committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CostingError {
    #[error("quantity must be a positive integer (got {0})")]
    InvalidQuantity(i64),

    #[error("margin percentage must be in [0, 100) (got {0})")]
    InvalidMargin(Decimal),

    #[error("material cost must not be negative (got {0})")]
    NegativeMaterialCost(Decimal),

    #[error("cost parameter '{key}' must not be negative (got {value})")]
    InvalidParameter { key: String, value: Decimal },

    #[error("no process route found for product category '{0}'")]
    NoRouteFound(String),

    #[error("process route {0} not found")]
    RouteNotFound(RouteId),

    #[error("process step {0} not found")]
    ProcessStepNotFound(ProcessStepId),

    #[error("equipment {0} not found")]
    EquipmentNotFound(EquipmentId),

    #[error("route step {sequence} ({step}) requires equipment but none is bound")]
    StepEquipmentMissing { sequence: u32, step: String },

    #[error("invalid process route: {0}")]
    InvalidRoute(String),

    #[error("equipment {id} cannot be costed: {reason}")]
    InvalidEquipment { id: EquipmentId, reason: String },

    #[error("cost calculation {0} not found")]
    CalculationNotFound(CalculationId),

    #[error("cannot {action} a cost calculation in status '{status}'")]
    InvalidTransition {
        action: &'static str,
        status: CalculationStatus,
    },

    /// Quotes carry the figures they were priced with; a new calculation is
    /// needed instead.
    #[error("cost calculation {0} is linked from a quote and cannot be recalculated")]
    CalculationQuoted(CalculationId),
}

impl CostingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CostingError::InvalidQuantity(_)
            | CostingError::InvalidMargin(_)
            | CostingError::NegativeMaterialCost(_)
            | CostingError::InvalidParameter { .. }
            | CostingError::NoRouteFound(_)
            | CostingError::StepEquipmentMissing { .. }
            | CostingError::InvalidRoute(_)
            | CostingError::InvalidEquipment { .. } => ErrorCategory::Validation,
            CostingError::RouteNotFound(_)
            | CostingError::ProcessStepNotFound(_)
            | CostingError::EquipmentNotFound(_)
            | CostingError::CalculationNotFound(_) => ErrorCategory::NotFound,
            CostingError::InvalidTransition { .. } | CostingError::CalculationQuoted(_) => {
                ErrorCategory::Conflict
            }
        }
    }
}
