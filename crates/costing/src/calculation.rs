use chrono::{DateTime, Utc};
use quoteforge_core::{
    CalculationId, Decimal, Entity, EquipmentId, InquiryId, ProcessStepId, RouteId, UserId,
    round_money,
};
use serde::{Deserialize, Serialize};

use crate::engine::CostBreakdown;
use crate::error::CostingError;
use crate::parameters::CostParameters;

/// Cost calculation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationStatus {
    Draft,
    Submitted,
    Approved,
}

impl CalculationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CalculationStatus::Draft => "draft",
            CalculationStatus::Submitted => "submitted",
            CalculationStatus::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CalculationStatus::Draft),
            "submitted" => Some(CalculationStatus::Submitted),
            "approved" => Some(CalculationStatus::Approved),
            _ => None,
        }
    }
}

impl core::fmt::Display for CalculationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Costed route step (one row per route step, in route order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCalculationDetail {
    pub sequence: u32,
    pub process_step_id: ProcessStepId,
    pub process_step_name: String,
    pub equipment_id: Option<EquipmentId>,
    pub setup_time_minutes: Decimal,
    pub cycle_time_seconds: Decimal,
    pub total_time_hours: Decimal,
    pub labor_cost: Decimal,
    pub equipment_cost: Decimal,
    pub electricity_cost: Decimal,
    pub subtotal: Decimal,
    pub yield_rate: Decimal,
    pub yield_loss_cost: Decimal,
}

/// Header fields for a new calculation; the costed figures come from a
/// [`CostBreakdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCalculation {
    pub calculation_number: String,
    pub inquiry_id: Option<InquiryId>,
    pub product_name: String,
    pub product_category: Option<String>,
    pub route_id: RouteId,
    pub quantity: u32,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// One pricing run.
///
/// Derived figures are only ever written from a [`CostBreakdown`]; there is
/// no way to edit them by hand. Approved calculations are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCalculation {
    pub id: CalculationId,
    pub calculation_number: String,
    pub inquiry_id: Option<InquiryId>,
    pub product_name: String,
    pub product_category: Option<String>,
    pub route_id: RouteId,
    pub quantity: u32,
    material_cost: Decimal,
    process_cost: Decimal,
    overhead_cost: Decimal,
    total_cost: Decimal,
    unit_cost: Decimal,
    margin_percentage: Decimal,
    selling_price: Decimal,
    parameters: CostParameters,
    details: Vec<CostCalculationDetail>,
    status: CalculationStatus,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
}

impl Entity for CostCalculation {
    type Id = CalculationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CostCalculation {
    pub fn new(header: NewCalculation, breakdown: CostBreakdown, parameters: CostParameters) -> Self {
        Self {
            id: CalculationId::new(),
            calculation_number: header.calculation_number,
            inquiry_id: header.inquiry_id,
            product_name: header.product_name,
            product_category: header.product_category,
            route_id: header.route_id,
            quantity: header.quantity,
            material_cost: breakdown.material_cost,
            process_cost: breakdown.process_cost,
            overhead_cost: breakdown.overhead_cost,
            total_cost: breakdown.total_cost,
            unit_cost: breakdown.unit_cost,
            margin_percentage: breakdown.margin_percentage,
            selling_price: breakdown.selling_price,
            parameters,
            details: breakdown.details,
            status: CalculationStatus::Draft,
            notes: header.notes,
            created_by: header.created_by,
            created_at: header.created_at,
            updated_at: header.created_at,
            approved_by: None,
            approved_at: None,
        }
    }

    /// Reassemble a stored calculation (store adapters only).
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        header: NewCalculation,
        id: CalculationId,
        breakdown: CostBreakdown,
        parameters: CostParameters,
        status: CalculationStatus,
        updated_at: DateTime<Utc>,
        approved_by: Option<UserId>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut calc = Self::new(header, breakdown, parameters);
        calc.id = id;
        calc.status = status;
        calc.updated_at = updated_at;
        calc.approved_by = approved_by;
        calc.approved_at = approved_at;
        calc
    }

    pub fn material_cost(&self) -> Decimal {
        self.material_cost
    }

    pub fn process_cost(&self) -> Decimal {
        self.process_cost
    }

    pub fn overhead_cost(&self) -> Decimal {
        self.overhead_cost
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn margin_percentage(&self) -> Decimal {
        self.margin_percentage
    }

    pub fn selling_price(&self) -> Decimal {
        self.selling_price
    }

    /// Selling price per unit, rounded as money.
    pub fn unit_selling_price(&self) -> Decimal {
        round_money(self.selling_price / Decimal::from(self.quantity.max(1)))
    }

    pub fn parameters(&self) -> &CostParameters {
        &self.parameters
    }

    pub fn details(&self) -> &[CostCalculationDetail] {
        &self.details
    }

    pub fn status(&self) -> CalculationStatus {
        self.status
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// The costed figures as a breakdown (e.g. to persist or compare runs).
    pub fn breakdown(&self) -> CostBreakdown {
        CostBreakdown {
            details: self.details.clone(),
            material_cost: self.material_cost,
            process_cost: self.process_cost,
            overhead_cost: self.overhead_cost,
            total_cost: self.total_cost,
            unit_cost: self.unit_cost,
            margin_percentage: self.margin_percentage,
            selling_price: self.selling_price,
        }
    }

    /// `draft → submitted`.
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), CostingError> {
        if self.status != CalculationStatus::Draft {
            return Err(CostingError::InvalidTransition {
                action: "submit",
                status: self.status,
            });
        }
        self.status = CalculationStatus::Submitted;
        self.updated_at = at;
        Ok(())
    }

    /// `submitted → approved`; stamps the approver.
    pub fn approve(&mut self, approver: UserId, at: DateTime<Utc>) -> Result<(), CostingError> {
        if self.status != CalculationStatus::Submitted {
            return Err(CostingError::InvalidTransition {
                action: "approve",
                status: self.status,
            });
        }
        self.status = CalculationStatus::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Replace the costed figures with a fresh run (drafts only).
    pub fn recost(
        &mut self,
        breakdown: CostBreakdown,
        parameters: CostParameters,
        at: DateTime<Utc>,
    ) -> Result<(), CostingError> {
        if self.status != CalculationStatus::Draft {
            return Err(CostingError::InvalidTransition {
                action: "recalculate",
                status: self.status,
            });
        }
        self.material_cost = breakdown.material_cost;
        self.process_cost = breakdown.process_cost;
        self.overhead_cost = breakdown.overhead_cost;
        self.total_cost = breakdown.total_cost;
        self.unit_cost = breakdown.unit_cost;
        self.margin_percentage = breakdown.margin_percentage;
        self.selling_price = breakdown.selling_price;
        self.details = breakdown.details;
        self.parameters = parameters;
        self.updated_at = at;
        Ok(())
    }
}
