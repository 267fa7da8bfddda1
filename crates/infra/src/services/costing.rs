use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use quoteforge_core::{CalculationId, DocumentKind, InquiryId, RouteId, UserId};
use quoteforge_costing::{
    CalculationRequest, CostCalculation, CostEngine, CostParameters, CostingError,
    NewCalculation, ProductProcessRoute, ResolvedStep, RouteSelection, select_route_for_category,
};

use crate::error::ServiceResult;
use crate::parameters::CostParameterSource;
use crate::store::{QuotingStore, QuotingTx};

/// Prices products against the route catalog and manages the calculation
/// lifecycle.
#[derive(Clone)]
pub struct CostCalculationService {
    store: Arc<dyn QuotingStore>,
    parameters: Arc<dyn CostParameterSource>,
    engine: CostEngine,
}

impl CostCalculationService {
    pub fn new(
        store: Arc<dyn QuotingStore>,
        parameters: Arc<dyn CostParameterSource>,
        engine: CostEngine,
    ) -> Self {
        Self {
            store,
            parameters,
            engine,
        }
    }

    async fn snapshot(&self) -> ServiceResult<CostParameters> {
        let values = self.parameters.lookup().await?;
        Ok(CostParameters::from_lookup(&values)?)
    }

    /// Run a new calculation and persist it (with its custom route, if any).
    #[instrument(
        skip(self, request),
        fields(product = %request.product_name, quantity = request.quantity),
        err
    )]
    pub async fn calculate(
        &self,
        request: CalculationRequest,
        actor: UserId,
    ) -> ServiceResult<CostCalculation> {
        let quantity = request.validate()?;
        let params = self.snapshot().await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let (route, is_new_route) = match &request.route {
            RouteSelection::Route { route_id } => (load_route(&mut *tx, *route_id).await?, false),
            RouteSelection::Custom(custom) => {
                let name = custom
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Custom route: {}", request.product_name));
                let route = ProductProcessRoute::custom(
                    name,
                    request.category().map(str::to_string),
                    custom.to_details(),
                    actor,
                    now,
                )?;
                (route, true)
            }
            RouteSelection::CategoryDefault => {
                let category = request
                    .category()
                    .ok_or_else(|| CostingError::NoRouteFound(String::new()))?;
                let routes = tx.list_routes(category).await?;
                let route = select_route_for_category(&routes)
                    .cloned()
                    .ok_or_else(|| CostingError::NoRouteFound(category.to_string()))?;
                (route, false)
            }
        };
        route.validate()?;

        let steps = resolve_steps(&mut *tx, &route).await?;
        let breakdown = self.engine.calculate(
            &steps,
            quantity,
            request.material_cost,
            request.margin_percentage,
            &params,
        )?;

        if is_new_route {
            tx.insert_route(&route).await?;
        }
        let number = tx
            .next_document_number(DocumentKind::CostCalculation, now.date_naive())
            .await?;
        let calc = CostCalculation::new(
            NewCalculation {
                calculation_number: number.to_string(),
                inquiry_id: request.inquiry_id,
                product_name: request.product_name,
                product_category: request.product_category,
                route_id: route.id,
                quantity,
                notes: request.notes,
                created_by: actor,
                created_at: now,
            },
            breakdown,
            params,
        );
        tx.insert_calculation(&calc).await?;
        tx.commit().await?;

        info!(
            calculation_id = %calc.id,
            calculation_number = %calc.calculation_number,
            total_cost = %calc.total_cost(),
            selling_price = %calc.selling_price(),
            "cost calculation created"
        );
        Ok(calc)
    }

    /// Re-cost a draft against the current parameters and its stored route.
    ///
    /// Refused once a quote links to the calculation.
    #[instrument(skip(self), err)]
    pub async fn recalculate(
        &self,
        id: CalculationId,
        actor: UserId,
    ) -> ServiceResult<CostCalculation> {
        let params = self.snapshot().await?;
        let mut tx = self.store.begin().await?;

        let mut calc = load_calculation(&mut *tx, id).await?;
        if tx.calculation_is_quoted(id).await? {
            return Err(CostingError::CalculationQuoted(id).into());
        }
        let route = load_route(&mut *tx, calc.route_id).await?;
        let steps = resolve_steps(&mut *tx, &route).await?;
        let breakdown = self.engine.calculate(
            &steps,
            calc.quantity,
            calc.material_cost(),
            Some(calc.margin_percentage()),
            &params,
        )?;
        calc.recost(breakdown, params, Utc::now())?;

        tx.update_calculation(&calc).await?;
        tx.commit().await?;

        info!(calculation_id = %calc.id, %actor, total_cost = %calc.total_cost(), "cost calculation recalculated");
        Ok(calc)
    }

    #[instrument(skip(self), err)]
    pub async fn submit_calculation(
        &self,
        id: CalculationId,
        actor: UserId,
    ) -> ServiceResult<CostCalculation> {
        let mut tx = self.store.begin().await?;
        let mut calc = load_calculation(&mut *tx, id).await?;
        calc.submit(Utc::now())?;
        tx.update_calculation(&calc).await?;
        tx.commit().await?;

        info!(calculation_id = %calc.id, %actor, "cost calculation submitted");
        Ok(calc)
    }

    #[instrument(skip(self), err)]
    pub async fn approve_calculation(
        &self,
        id: CalculationId,
        approver: UserId,
    ) -> ServiceResult<CostCalculation> {
        let mut tx = self.store.begin().await?;
        let mut calc = load_calculation(&mut *tx, id).await?;
        calc.approve(approver, Utc::now())?;
        tx.update_calculation(&calc).await?;
        tx.commit().await?;

        info!(calculation_id = %calc.id, %approver, "cost calculation approved");
        Ok(calc)
    }

    pub async fn get_calculation(&self, id: CalculationId) -> ServiceResult<CostCalculation> {
        let mut tx = self.store.begin().await?;
        load_calculation(&mut *tx, id).await
    }

    /// Newest first.
    pub async fn list_calculations(
        &self,
        inquiry_id: Option<InquiryId>,
    ) -> ServiceResult<Vec<CostCalculation>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_calculations(inquiry_id).await?)
    }

    pub async fn get_route(&self, id: RouteId) -> ServiceResult<ProductProcessRoute> {
        let mut tx = self.store.begin().await?;
        load_route(&mut *tx, id).await
    }

    pub async fn list_routes(&self, category: &str) -> ServiceResult<Vec<ProductProcessRoute>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_routes(category.trim()).await?)
    }
}

async fn load_route(tx: &mut dyn QuotingTx, id: RouteId) -> ServiceResult<ProductProcessRoute> {
    Ok(tx.get_route(id).await?.ok_or(CostingError::RouteNotFound(id))?)
}

async fn load_calculation(
    tx: &mut dyn QuotingTx,
    id: CalculationId,
) -> ServiceResult<CostCalculation> {
    Ok(tx
        .get_calculation(id)
        .await?
        .ok_or(CostingError::CalculationNotFound(id))?)
}

/// Join each route step with its process step and effective equipment.
async fn resolve_steps(
    tx: &mut dyn QuotingTx,
    route: &ProductProcessRoute,
) -> ServiceResult<Vec<ResolvedStep>> {
    let mut steps = Vec::with_capacity(route.details.len());
    for detail in route.ordered_details() {
        let step = tx
            .get_process_step(detail.process_step_id)
            .await?
            .ok_or(CostingError::ProcessStepNotFound(detail.process_step_id))?;
        let equipment = match ResolvedStep::equipment_for(detail, &step)? {
            Some(equipment_id) => Some(
                tx.get_equipment(equipment_id)
                    .await?
                    .ok_or(CostingError::EquipmentNotFound(equipment_id))?,
            ),
            None => None,
        };
        steps.push(ResolvedStep {
            detail: detail.clone(),
            step,
            equipment,
        });
    }
    Ok(steps)
}
