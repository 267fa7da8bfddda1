//! Per-step costing algorithm and aggregation.
//!
//! Every currency figure is rounded to 2 places where it is computed (not
//! accumulated in full precision and rounded once); stored results depend on
//! this order of rounding.

use quoteforge_core::{Decimal, EquipmentId, percent_of, round_money};
use serde::{Deserialize, Serialize};

use crate::calculation::CostCalculationDetail;
use crate::catalog::{Equipment, ProcessRouteDetail, ProcessStep};
use crate::error::CostingError;
use crate::parameters::CostParameters;

/// Annual operating hours that equipment cost is amortised over.
pub const ANNUAL_OPERATING_HOURS: u32 = 2_000;

/// Margin applied when the caller supplies none.
pub const DEFAULT_MARGIN_PERCENTAGE: u32 = 30;

/// A route step joined with its catalog records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    pub detail: ProcessRouteDetail,
    pub step: ProcessStep,
    pub equipment: Option<Equipment>,
}

impl ResolvedStep {
    /// Which equipment a step runs on: the route override, else the step's
    /// default. Fails when the step needs equipment and neither is set.
    pub fn equipment_for(
        detail: &ProcessRouteDetail,
        step: &ProcessStep,
    ) -> Result<Option<EquipmentId>, CostingError> {
        let equipment = detail.equipment_id.or(step.default_equipment_id);
        if equipment.is_none() && step.requires_equipment {
            return Err(CostingError::StepEquipmentMissing {
                sequence: detail.sequence,
                step: step.name.clone(),
            });
        }
        Ok(equipment)
    }

    pub fn setup_time_minutes(&self) -> Decimal {
        self.detail
            .setup_time_minutes
            .unwrap_or(self.step.setup_time_minutes)
    }

    pub fn cycle_time_seconds(&self) -> Decimal {
        self.detail
            .cycle_time_seconds
            .unwrap_or(self.step.cycle_time_seconds)
    }
}

/// Result of costing a route for a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub details: Vec<CostCalculationDetail>,
    pub material_cost: Decimal,
    pub process_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    pub unit_cost: Decimal,
    pub margin_percentage: Decimal,
    pub selling_price: Decimal,
}

/// Stateless cost calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEngine {
    default_margin: Decimal,
}

impl Default for CostEngine {
    fn default() -> Self {
        Self {
            default_margin: Decimal::from(DEFAULT_MARGIN_PERCENTAGE),
        }
    }
}

impl CostEngine {
    pub fn new(default_margin: Decimal) -> Result<Self, CostingError> {
        check_margin(default_margin)?;
        Ok(Self { default_margin })
    }

    pub fn default_margin(&self) -> Decimal {
        self.default_margin
    }

    /// Cost one step for `quantity` units.
    pub fn cost_step(
        &self,
        resolved: &ResolvedStep,
        quantity: u32,
        params: &CostParameters,
    ) -> Result<CostCalculationDetail, CostingError> {
        let hours_per_year = Decimal::from(ANNUAL_OPERATING_HOURS);
        let setup = resolved.setup_time_minutes();
        let cycle = resolved.cycle_time_seconds();

        let total_time_hours =
            setup / Decimal::from(60) + cycle * Decimal::from(quantity) / Decimal::from(3600);

        let labor_cost =
            round_money(total_time_hours * params.labor_rate * resolved.step.labor_headcount);

        let (equipment_cost, electricity_cost) = match &resolved.equipment {
            Some(eq) => {
                if eq.depreciation_years == 0 {
                    return Err(CostingError::InvalidEquipment {
                        id: eq.id,
                        reason: "depreciation years must be positive".to_string(),
                    });
                }
                let hourly_depreciation =
                    eq.purchase_cost / (Decimal::from(eq.depreciation_years) * hours_per_year);
                let hourly_maintenance = eq.annual_maintenance_cost / hours_per_year;
                (
                    round_money(total_time_hours * (hourly_depreciation + hourly_maintenance)),
                    round_money(total_time_hours * eq.power_consumption * params.electricity_rate),
                )
            }
            None => (Decimal::ZERO, Decimal::ZERO),
        };

        let subtotal = round_money(labor_cost + equipment_cost + electricity_cost);
        let yield_loss_cost =
            percent_of(subtotal, Decimal::ONE_HUNDRED - resolved.detail.yield_rate);

        Ok(CostCalculationDetail {
            sequence: resolved.detail.sequence,
            process_step_id: resolved.step.id,
            process_step_name: resolved.step.name.clone(),
            equipment_id: resolved.equipment.as_ref().map(|e| e.id),
            setup_time_minutes: setup,
            cycle_time_seconds: cycle,
            total_time_hours,
            labor_cost,
            equipment_cost,
            electricity_cost,
            subtotal,
            yield_rate: resolved.detail.yield_rate,
            yield_loss_cost,
        })
    }

    /// Cost a whole route.
    ///
    /// `steps` are costed in route order regardless of the order given.
    pub fn calculate(
        &self,
        steps: &[ResolvedStep],
        quantity: u32,
        material_cost: Decimal,
        margin_percentage: Option<Decimal>,
        params: &CostParameters,
    ) -> Result<CostBreakdown, CostingError> {
        if quantity == 0 {
            return Err(CostingError::InvalidQuantity(0));
        }
        if material_cost < Decimal::ZERO {
            return Err(CostingError::NegativeMaterialCost(material_cost));
        }
        if steps.is_empty() {
            return Err(CostingError::InvalidRoute("route has no steps".to_string()));
        }
        let margin = margin_percentage.unwrap_or(self.default_margin);
        check_margin(margin)?;

        let mut ordered: Vec<&ResolvedStep> = steps.iter().collect();
        ordered.sort_by_key(|s| s.detail.sequence);

        let details = ordered
            .into_iter()
            .map(|s| self.cost_step(s, quantity, params))
            .collect::<Result<Vec<_>, _>>()?;

        let material_cost = round_money(material_cost);
        let process_cost = round_money(
            details
                .iter()
                .map(|d| d.subtotal + d.yield_loss_cost)
                .sum::<Decimal>(),
        );
        let overhead_cost = round_money(process_cost * params.overhead_rate);
        let total_cost = round_money(material_cost + process_cost + overhead_cost);
        let unit_cost = round_money(total_cost / Decimal::from(quantity));
        let selling_price = round_money(
            total_cost / (Decimal::ONE - margin / Decimal::ONE_HUNDRED),
        );

        Ok(CostBreakdown {
            details,
            material_cost,
            process_cost,
            overhead_cost,
            total_cost,
            unit_cost,
            margin_percentage: margin,
            selling_price,
        })
    }
}

fn check_margin(margin: Decimal) -> Result<(), CostingError> {
    if margin < Decimal::ZERO || margin >= Decimal::ONE_HUNDRED {
        return Err(CostingError::InvalidMargin(margin));
    }
    Ok(())
}
