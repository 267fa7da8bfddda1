//! Process route catalog: steps, equipment and routes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use quoteforge_core::{Decimal, Entity, EquipmentId, ProcessStepId, RouteId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::CostingError;

/// A manufacturing operation with its default timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub id: ProcessStepId,
    pub code: String,
    pub name: String,
    pub setup_time_minutes: Decimal,
    pub cycle_time_seconds: Decimal,
    pub labor_headcount: Decimal,
    pub requires_equipment: bool,
    pub default_equipment_id: Option<EquipmentId>,
}

impl Entity for ProcessStep {
    type Id = ProcessStepId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A machine whose depreciation, maintenance and power draw are charged to
/// the steps that run on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub code: String,
    pub name: String,
    pub purchase_cost: Decimal,
    pub depreciation_years: u32,
    pub annual_maintenance_cost: Decimal,
    /// Power draw in kW.
    pub power_consumption: Decimal,
}

impl Entity for Equipment {
    type Id = EquipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Where a route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOrigin {
    /// Shipped with the system.
    System,
    /// Maintained by the company.
    Company,
    /// Created implicitly for a single custom calculation.
    Custom,
}

impl RouteOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteOrigin::System => "system",
            RouteOrigin::Company => "company",
            RouteOrigin::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(RouteOrigin::System),
            "company" => Some(RouteOrigin::Company),
            "custom" => Some(RouteOrigin::Custom),
            _ => None,
        }
    }
}

/// One step of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRouteDetail {
    pub sequence: u32,
    pub process_step_id: ProcessStepId,
    /// Overrides the step's default equipment.
    pub equipment_id: Option<EquipmentId>,
    /// Percentage of output surviving this step, in (0, 100].
    pub yield_rate: Decimal,
    pub setup_time_minutes: Option<Decimal>,
    pub cycle_time_seconds: Option<Decimal>,
}

impl ProcessRouteDetail {
    pub fn new(sequence: u32, process_step_id: ProcessStepId) -> Self {
        Self {
            sequence,
            process_step_id,
            equipment_id: None,
            yield_rate: Decimal::ONE_HUNDRED,
            setup_time_minutes: None,
            cycle_time_seconds: None,
        }
    }
}

/// A named, reusable sequence of process steps for a product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProcessRoute {
    pub id: RouteId,
    pub name: String,
    pub product_category: Option<String>,
    pub origin: RouteOrigin,
    pub is_default: bool,
    pub details: Vec<ProcessRouteDetail>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for ProductProcessRoute {
    type Id = RouteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl ProductProcessRoute {
    /// Build the one-off route persisted for an inline custom calculation.
    pub fn custom(
        name: impl Into<String>,
        product_category: Option<String>,
        details: Vec<ProcessRouteDetail>,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CostingError> {
        let route = Self {
            id: RouteId::new(),
            name: name.into(),
            product_category,
            origin: RouteOrigin::Custom,
            is_default: false,
            details,
            created_by: Some(created_by),
            created_at,
        };
        route.validate()?;
        Ok(route)
    }

    /// Steps in execution order.
    pub fn ordered_details(&self) -> Vec<&ProcessRouteDetail> {
        let mut details: Vec<_> = self.details.iter().collect();
        details.sort_by_key(|d| d.sequence);
        details
    }

    pub fn validate(&self) -> Result<(), CostingError> {
        if self.details.is_empty() {
            return Err(CostingError::InvalidRoute(format!(
                "route '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for detail in &self.details {
            if !seen.insert(detail.sequence) {
                return Err(CostingError::InvalidRoute(format!(
                    "duplicate sequence number {} in route '{}'",
                    detail.sequence, self.name
                )));
            }
            if detail.yield_rate <= Decimal::ZERO || detail.yield_rate > Decimal::ONE_HUNDRED {
                return Err(CostingError::InvalidRoute(format!(
                    "yield rate {} of step {} must be in (0, 100]",
                    detail.yield_rate, detail.sequence
                )));
            }
            let negative_override = [detail.setup_time_minutes, detail.cycle_time_seconds]
                .into_iter()
                .flatten()
                .any(|v| v < Decimal::ZERO);
            if negative_override {
                return Err(CostingError::InvalidRoute(format!(
                    "timing override of step {} must not be negative",
                    detail.sequence
                )));
            }
        }

        Ok(())
    }
}

/// Pick the route a category falls back to when the caller names none.
///
/// A company default wins over a system default; without any default the first
/// route by name is used. Custom one-off routes are never picked implicitly.
pub fn select_route_for_category(
    routes: &[ProductProcessRoute],
) -> Option<&ProductProcessRoute> {
    let mut candidates: Vec<&ProductProcessRoute> = routes
        .iter()
        .filter(|r| r.origin != RouteOrigin::Custom)
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));

    candidates
        .iter()
        .find(|r| r.is_default && r.origin == RouteOrigin::Company)
        .or_else(|| candidates.iter().find(|r| r.is_default))
        .or_else(|| candidates.first())
        .copied()
}
