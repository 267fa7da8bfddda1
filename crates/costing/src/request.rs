//! Caller-facing calculation request.

use quoteforge_core::{Decimal, EquipmentId, InquiryId, ProcessStepId, RouteId};
use serde::{Deserialize, Serialize};

use crate::catalog::ProcessRouteDetail;
use crate::error::CostingError;

/// How the route for a calculation is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteSelection {
    /// An existing catalog route.
    Route { route_id: RouteId },
    /// An inline route; persisted as a non-default custom route.
    Custom(CustomRoute),
    /// The product category's default route, else its first route.
    CategoryDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRoute {
    pub name: Option<String>,
    pub steps: Vec<CustomRouteStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRouteStep {
    pub process_step_id: ProcessStepId,
    pub equipment_id: Option<EquipmentId>,
    pub setup_time_minutes: Option<Decimal>,
    pub cycle_time_seconds: Option<Decimal>,
    /// Defaults to 100 (no loss).
    pub yield_rate: Option<Decimal>,
}

impl CustomRoute {
    /// Route details numbered 1.. in the order given.
    pub fn to_details(&self) -> Vec<ProcessRouteDetail> {
        self.steps
            .iter()
            .zip(1u32..)
            .map(|(step, sequence)| ProcessRouteDetail {
                sequence,
                process_step_id: step.process_step_id,
                equipment_id: step.equipment_id,
                yield_rate: step.yield_rate.unwrap_or(Decimal::ONE_HUNDRED),
                setup_time_minutes: step.setup_time_minutes,
                cycle_time_seconds: step.cycle_time_seconds,
            })
            .collect()
    }
}

/// Input to a pricing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub inquiry_id: Option<InquiryId>,
    pub product_name: String,
    pub product_category: Option<String>,
    pub quantity: i64,
    /// Caller-supplied, not derived.
    pub material_cost: Decimal,
    /// Percentage; the engine default applies when absent.
    pub margin_percentage: Option<Decimal>,
    pub route: RouteSelection,
    pub notes: Option<String>,
}

impl CalculationRequest {
    /// Validate the request shape; returns the quantity as a unit count.
    pub fn validate(&self) -> Result<u32, CostingError> {
        // Stored as a signed 32-bit column.
        let quantity = i32::try_from(self.quantity)
            .ok()
            .filter(|q| *q > 0)
            .and_then(|q| u32::try_from(q).ok())
            .ok_or(CostingError::InvalidQuantity(self.quantity))?;

        if self.material_cost < Decimal::ZERO {
            return Err(CostingError::NegativeMaterialCost(self.material_cost));
        }
        if let Some(margin) = self.margin_percentage {
            if margin < Decimal::ZERO || margin >= Decimal::ONE_HUNDRED {
                return Err(CostingError::InvalidMargin(margin));
            }
        }
        match &self.route {
            RouteSelection::Custom(custom) if custom.steps.is_empty() => {
                return Err(CostingError::InvalidRoute(
                    "custom route has no steps".to_string(),
                ));
            }
            RouteSelection::CategoryDefault if self.category().is_none() => {
                return Err(CostingError::NoRouteFound(String::new()));
            }
            _ => {}
        }

        Ok(quantity)
    }

    /// Trimmed, non-empty product category.
    pub fn category(&self) -> Option<&str> {
        self.product_category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}
