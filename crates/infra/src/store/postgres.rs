//! Postgres-backed quoting store.
//!
//! One [`QuotingTx`] is one database transaction; dropping it without
//! `commit()` rolls back (sqlx semantics). The reference schema lives in
//! `sql/schema.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | duplicate number, second current version, duplicate approval level |
//! | Database (foreign key violation) | `23503` | `Backend` | dangling reference |
//! | Database (check constraint violation) | `23514` | `Backend` | value outside a column's domain |
//! | Database (other) / PoolClosed / Other | any | `Backend` | connectivity and everything else |
//!
//! Counts are bound as `INTEGER`; a value above `i32::MAX` fails with
//! `OutOfRange` before any statement is sent.
//!
//! ## Numbering
//!
//! Daily sequences are kept in `document_sequences`; the upsert takes a row
//! lock that serialises concurrent writers of the same `(kind, day)` until
//! their transaction ends, so committed numbers are gap-free.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use quoteforge_core::{
    CalculationId, CustomerId, Decimal, DocumentKind, DocumentNumber, EquipmentId, InquiryId,
    ProcessStepId, QuoteId, QuoteVersionId, RouteId, UserId,
};
use quoteforge_costing::{
    CalculationStatus, CostBreakdown, CostCalculation, CostCalculationDetail, CostParameters,
    Equipment, NewCalculation, ProcessRouteDetail, ProcessStep, ProductProcessRoute, RouteOrigin,
};
use quoteforge_quoting::{
    ActivityKind, ApprovalStatus, ApproverRole, Quote, QuoteActivityLog, QuoteApproval,
    QuoteHeader, QuoteItem, QuoteSendLog, QuoteState, QuoteStatus, QuoteTerm, QuoteVersion,
    SendStatus, TermTemplate,
};

use super::r#trait::{QuoteFilter, QuotingStore, QuotingTx, StoreError};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

/// Postgres implementation of [`QuotingStore`].
#[derive(Debug, Clone)]
pub struct PostgresQuotingStore {
    pool: PgPool,
}

impl PostgresQuotingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create missing tables and seed default cost parameters.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuotingStore for PostgresQuotingStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn QuotingTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresQuotingTx { tx }))
    }
}

pub struct PostgresQuotingTx {
    tx: Transaction<'static, Postgres>,
}

const ROUTE_COLUMNS: &str =
    "id, name, product_category, origin, is_default, created_by, created_at";

const CALCULATION_COLUMNS: &str = r#"
    id, calculation_number, inquiry_id, product_name, product_category, route_id,
    quantity, material_cost, process_cost, overhead_cost, total_cost, unit_cost,
    margin_percentage, selling_price, labor_rate, electricity_rate, overhead_rate,
    status, notes, created_by, created_at, updated_at, approved_by, approved_at
"#;

const QUOTE_COLUMNS: &str = r#"
    id, quote_number, inquiry_id, customer_id, cost_calculation_id, validity_days,
    valid_from, valid_until, payment_terms, delivery_terms, status, total_amount,
    approved_amount, approved_by, approved_at, sent_at, current_version_id,
    current_version_number, approval_round, created_by, created_at, updated_by, updated_at
"#;

const VERSION_COLUMNS: &str =
    "id, quote_id, version_number, is_current, notes, created_by, created_at";

const APPROVAL_COLUMNS: &str = r#"
    id, quote_id, version_id, round_no, level, required_role, status, approver_id,
    notes, decided_at, created_at
"#;

const SEND_LOG_COLUMNS: &str = r#"
    id, quote_id, version_id, recipient, subject, status, error_message, sent_by,
    attempted_at, completed_at
"#;

impl PostgresQuotingTx {
    async fn route_details(&mut self, route_id: Uuid) -> Result<Vec<ProcessRouteDetail>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, process_step_id, equipment_id, yield_rate,
                   setup_time_minutes, cycle_time_seconds
            FROM process_route_details
            WHERE route_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(route_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_route_details", e))?;

        rows.iter()
            .map(|row| {
                let r = RouteDetailRow::from_row(row).map_err(|e| decode_error("route detail", e))?;
                Ok(ProcessRouteDetail {
                    sequence: to_u32("sequence", r.sequence)?,
                    process_step_id: ProcessStepId::from_uuid(r.process_step_id),
                    equipment_id: r.equipment_id.map(EquipmentId::from_uuid),
                    yield_rate: r.yield_rate,
                    setup_time_minutes: r.setup_time_minutes,
                    cycle_time_seconds: r.cycle_time_seconds,
                })
            })
            .collect()
    }

    async fn route_from_row(&mut self, row: RouteRow) -> Result<ProductProcessRoute, StoreError> {
        let details = self.route_details(row.id).await?;
        Ok(ProductProcessRoute {
            id: RouteId::from_uuid(row.id),
            name: row.name,
            product_category: row.product_category,
            origin: RouteOrigin::parse(&row.origin)
                .ok_or_else(|| corrupt("route origin", &row.origin))?,
            is_default: row.is_default,
            details,
            created_by: row.created_by.map(UserId::from_uuid),
            created_at: row.created_at,
        })
    }

    async fn calculation_details(
        &mut self,
        calculation_id: Uuid,
    ) -> Result<Vec<CostCalculationDetail>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, process_step_id, process_step_name, equipment_id,
                   setup_time_minutes, cycle_time_seconds, total_time_hours,
                   labor_cost, equipment_cost, electricity_cost, subtotal,
                   yield_rate, yield_loss_cost
            FROM cost_calculation_details
            WHERE calculation_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(calculation_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_calculation_details", e))?;

        rows.iter()
            .map(|row| {
                let r = CalculationDetailRow::from_row(row)
                    .map_err(|e| decode_error("calculation detail", e))?;
                Ok(CostCalculationDetail {
                    sequence: to_u32("sequence", r.sequence)?,
                    process_step_id: ProcessStepId::from_uuid(r.process_step_id),
                    process_step_name: r.process_step_name,
                    equipment_id: r.equipment_id.map(EquipmentId::from_uuid),
                    setup_time_minutes: r.setup_time_minutes,
                    cycle_time_seconds: r.cycle_time_seconds,
                    total_time_hours: r.total_time_hours,
                    labor_cost: r.labor_cost,
                    equipment_cost: r.equipment_cost,
                    electricity_cost: r.electricity_cost,
                    subtotal: r.subtotal,
                    yield_rate: r.yield_rate,
                    yield_loss_cost: r.yield_loss_cost,
                })
            })
            .collect()
    }

    async fn calculation_from_row(
        &mut self,
        row: CalculationRow,
    ) -> Result<CostCalculation, StoreError> {
        let details = self.calculation_details(row.id).await?;
        let status = CalculationStatus::parse(&row.status)
            .ok_or_else(|| corrupt("calculation status", &row.status))?;

        Ok(CostCalculation::restore(
            NewCalculation {
                calculation_number: row.calculation_number,
                inquiry_id: row.inquiry_id.map(InquiryId::from_uuid),
                product_name: row.product_name,
                product_category: row.product_category,
                route_id: RouteId::from_uuid(row.route_id),
                quantity: to_u32("quantity", row.quantity)?,
                notes: row.notes,
                created_by: UserId::from_uuid(row.created_by),
                created_at: row.created_at,
            },
            CalculationId::from_uuid(row.id),
            CostBreakdown {
                details,
                material_cost: row.material_cost,
                process_cost: row.process_cost,
                overhead_cost: row.overhead_cost,
                total_cost: row.total_cost,
                unit_cost: row.unit_cost,
                margin_percentage: row.margin_percentage,
                selling_price: row.selling_price,
            },
            CostParameters {
                labor_rate: row.labor_rate,
                electricity_rate: row.electricity_rate,
                overhead_rate: row.overhead_rate,
            },
            status,
            row.updated_at,
            row.approved_by.map(UserId::from_uuid),
            row.approved_at,
        ))
    }

    async fn write_calculation_details(&mut self, calc: &CostCalculation) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cost_calculation_details WHERE calculation_id = $1")
            .bind(calc.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_calculation_details", e))?;

        for d in calc.details() {
            sqlx::query(
                r#"
                INSERT INTO cost_calculation_details (
                    calculation_id, sequence, process_step_id, process_step_name,
                    equipment_id, setup_time_minutes, cycle_time_seconds, total_time_hours,
                    labor_cost, equipment_cost, electricity_cost, subtotal,
                    yield_rate, yield_loss_cost
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(calc.id.as_uuid())
            .bind(to_i32("sequence", d.sequence)?)
            .bind(d.process_step_id.as_uuid())
            .bind(&d.process_step_name)
            .bind(d.equipment_id.map(Uuid::from))
            .bind(d.setup_time_minutes)
            .bind(d.cycle_time_seconds)
            .bind(d.total_time_hours)
            .bind(d.labor_cost)
            .bind(d.equipment_cost)
            .bind(d.electricity_cost)
            .bind(d.subtotal)
            .bind(d.yield_rate)
            .bind(d.yield_loss_cost)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_calculation_detail", e))?;
        }
        Ok(())
    }

    async fn version_from_row(&mut self, row: VersionRow) -> Result<QuoteVersion, StoreError> {
        let version_id = QuoteVersionId::from_uuid(row.id);

        let item_rows = sqlx::query(
            r#"
            SELECT id, line_no, product_name, specification, quantity, unit,
                   unit_price, total_price, cost_calculation_id, notes
            FROM quote_items
            WHERE version_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_quote_items", e))?;

        let mut items = Vec::with_capacity(item_rows.len());
        for r in &item_rows {
            let r = ItemRow::from_row(r).map_err(|e| decode_error("quote item", e))?;
            items.push(QuoteItem {
                id: r.id.into(),
                version_id,
                line_no: to_u32("line_no", r.line_no)?,
                product_name: r.product_name,
                specification: r.specification,
                quantity: to_u32("quantity", r.quantity)?,
                unit: r.unit,
                unit_price: r.unit_price,
                total_price: r.total_price,
                cost_calculation_id: r.cost_calculation_id.map(CalculationId::from_uuid),
                notes: r.notes,
            });
        }

        let term_rows = sqlx::query(
            r#"
            SELECT sort_order, title, content, template_id
            FROM quote_terms
            WHERE version_id = $1
            ORDER BY sort_order ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_quote_terms", e))?;

        let mut terms = Vec::with_capacity(term_rows.len());
        for r in &term_rows {
            let sort_order: i32 = r.try_get("sort_order").map_err(|e| decode_error("quote term", e))?;
            let template_id: Option<Uuid> =
                r.try_get("template_id").map_err(|e| decode_error("quote term", e))?;
            terms.push(QuoteTerm {
                version_id,
                sort_order: to_u32("sort_order", sort_order)?,
                title: r.try_get("title").map_err(|e| decode_error("quote term", e))?,
                content: r.try_get("content").map_err(|e| decode_error("quote term", e))?,
                template_id: template_id.map(Into::into),
            });
        }

        let mut header = QuoteVersion::new(
            QuoteId::from_uuid(row.quote_id),
            to_u32("version_number", row.version_number)?,
            row.notes,
            UserId::from_uuid(row.created_by),
            row.created_at,
        );
        header.id = version_id;
        header.is_current = row.is_current;
        Ok(QuoteVersion::restore(header, items, terms))
    }

    async fn write_version_content(&mut self, version: &QuoteVersion) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM quote_items WHERE version_id = $1")
            .bind(version.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_quote_items", e))?;
        sqlx::query("DELETE FROM quote_terms WHERE version_id = $1")
            .bind(version.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_quote_terms", e))?;

        for item in version.items() {
            sqlx::query(
                r#"
                INSERT INTO quote_items (
                    id, version_id, line_no, product_name, specification, quantity,
                    unit, unit_price, total_price, cost_calculation_id, notes
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(version.id.as_uuid())
            .bind(to_i32("line_no", item.line_no)?)
            .bind(&item.product_name)
            .bind(&item.specification)
            .bind(to_i32("quantity", item.quantity)?)
            .bind(&item.unit)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(item.cost_calculation_id.map(Uuid::from))
            .bind(&item.notes)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_quote_item", e))?;
        }

        for term in version.terms() {
            sqlx::query(
                r#"
                INSERT INTO quote_terms (version_id, sort_order, title, content, template_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(version.id.as_uuid())
            .bind(to_i32("sort_order", term.sort_order)?)
            .bind(&term.title)
            .bind(&term.content)
            .bind(term.template_id.map(Uuid::from))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_quote_term", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuotingTx for PostgresQuotingTx {
    #[instrument(skip(self), err)]
    async fn next_document_number(
        &mut self,
        kind: DocumentKind,
        day: NaiveDate,
    ) -> Result<DocumentNumber, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO document_sequences (kind, day, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (kind, day)
            DO UPDATE SET last_value = document_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(kind.prefix())
        .bind(day)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("next_document_number", e))?;

        let last: i32 = row
            .try_get("last_value")
            .map_err(|e| decode_error("document sequence", e))?;
        Ok(DocumentNumber::new(kind, day, to_u32("last_value", last)?))
    }

    async fn get_route(&mut self, id: RouteId) -> Result<Option<ProductProcessRoute>, StoreError> {
        let sql = format!("SELECT {ROUTE_COLUMNS} FROM process_routes WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_route", e))?;

        match row {
            Some(row) => {
                let row = RouteRow::from_row(&row).map_err(|e| decode_error("route", e))?;
                Ok(Some(self.route_from_row(row).await?))
            }
            None => Ok(None),
        }
    }

    async fn list_routes(
        &mut self,
        category: &str,
    ) -> Result<Vec<ProductProcessRoute>, StoreError> {
        let sql = format!(
            "SELECT {ROUTE_COLUMNS} FROM process_routes WHERE product_category = $1 ORDER BY name ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(category)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_routes", e))?;

        let mut routes = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = RouteRow::from_row(row).map_err(|e| decode_error("route", e))?;
            routes.push(self.route_from_row(row).await?);
        }
        Ok(routes)
    }

    #[instrument(skip(self, route), fields(route_id = %route.id), err)]
    async fn insert_route(&mut self, route: &ProductProcessRoute) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO process_routes (
                id, name, product_category, origin, is_default, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(route.id.as_uuid())
        .bind(&route.name)
        .bind(&route.product_category)
        .bind(route.origin.as_str())
        .bind(route.is_default)
        .bind(route.created_by.map(Uuid::from))
        .bind(route.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_route", e))?;

        for d in &route.details {
            sqlx::query(
                r#"
                INSERT INTO process_route_details (
                    route_id, sequence, process_step_id, equipment_id, yield_rate,
                    setup_time_minutes, cycle_time_seconds
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(route.id.as_uuid())
            .bind(to_i32("sequence", d.sequence)?)
            .bind(d.process_step_id.as_uuid())
            .bind(d.equipment_id.map(Uuid::from))
            .bind(d.yield_rate)
            .bind(d.setup_time_minutes)
            .bind(d.cycle_time_seconds)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_route_detail", e))?;
        }
        Ok(())
    }

    async fn get_process_step(
        &mut self,
        id: ProcessStepId,
    ) -> Result<Option<ProcessStep>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, setup_time_minutes, cycle_time_seconds,
                   labor_headcount, requires_equipment, default_equipment_id
            FROM process_steps
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_process_step", e))?;

        row.map(|row| {
            let r = ProcessStepRow::from_row(&row).map_err(|e| decode_error("process step", e))?;
            Ok(r.into())
        })
        .transpose()
    }

    async fn get_equipment(&mut self, id: EquipmentId) -> Result<Option<Equipment>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, purchase_cost, depreciation_years,
                   annual_maintenance_cost, power_consumption
            FROM equipment
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_equipment", e))?;

        row.map(|row| {
            let r = EquipmentRow::from_row(&row).map_err(|e| decode_error("equipment", e))?;
            Ok(Equipment {
                id: EquipmentId::from_uuid(r.id),
                code: r.code,
                name: r.name,
                purchase_cost: r.purchase_cost,
                depreciation_years: to_u32("depreciation_years", r.depreciation_years)?,
                annual_maintenance_cost: r.annual_maintenance_cost,
                power_consumption: r.power_consumption,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, calc), fields(calculation_id = %calc.id), err)]
    async fn insert_calculation(&mut self, calc: &CostCalculation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cost_calculations (
                id, calculation_number, inquiry_id, product_name, product_category, route_id,
                quantity, material_cost, process_cost, overhead_cost, total_cost, unit_cost,
                margin_percentage, selling_price, labor_rate, electricity_rate, overhead_rate,
                status, notes, created_by, created_at, updated_at, approved_by, approved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(calc.id.as_uuid())
        .bind(&calc.calculation_number)
        .bind(calc.inquiry_id.map(Uuid::from))
        .bind(&calc.product_name)
        .bind(&calc.product_category)
        .bind(calc.route_id.as_uuid())
        .bind(to_i32("quantity", calc.quantity)?)
        .bind(calc.material_cost())
        .bind(calc.process_cost())
        .bind(calc.overhead_cost())
        .bind(calc.total_cost())
        .bind(calc.unit_cost())
        .bind(calc.margin_percentage())
        .bind(calc.selling_price())
        .bind(calc.parameters().labor_rate)
        .bind(calc.parameters().electricity_rate)
        .bind(calc.parameters().overhead_rate)
        .bind(calc.status().as_str())
        .bind(&calc.notes)
        .bind(calc.created_by.as_uuid())
        .bind(calc.created_at)
        .bind(calc.updated_at)
        .bind(calc.approved_by().map(Uuid::from))
        .bind(calc.approved_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_calculation", e))?;

        self.write_calculation_details(calc).await
    }

    #[instrument(skip(self, calc), fields(calculation_id = %calc.id), err)]
    async fn update_calculation(&mut self, calc: &CostCalculation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE cost_calculations SET
                material_cost = $2, process_cost = $3, overhead_cost = $4, total_cost = $5,
                unit_cost = $6, margin_percentage = $7, selling_price = $8,
                labor_rate = $9, electricity_rate = $10, overhead_rate = $11,
                status = $12, notes = $13, updated_at = $14, approved_by = $15, approved_at = $16
            WHERE id = $1
            "#,
        )
        .bind(calc.id.as_uuid())
        .bind(calc.material_cost())
        .bind(calc.process_cost())
        .bind(calc.overhead_cost())
        .bind(calc.total_cost())
        .bind(calc.unit_cost())
        .bind(calc.margin_percentage())
        .bind(calc.selling_price())
        .bind(calc.parameters().labor_rate)
        .bind(calc.parameters().electricity_rate)
        .bind(calc.parameters().overhead_rate)
        .bind(calc.status().as_str())
        .bind(&calc.notes)
        .bind(calc.updated_at)
        .bind(calc.approved_by().map(Uuid::from))
        .bind(calc.approved_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_calculation", e))?;

        self.write_calculation_details(calc).await
    }

    async fn get_calculation(
        &mut self,
        id: CalculationId,
    ) -> Result<Option<CostCalculation>, StoreError> {
        let sql = format!("SELECT {CALCULATION_COLUMNS} FROM cost_calculations WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_calculation", e))?;

        match row {
            Some(row) => {
                let row =
                    CalculationRow::from_row(&row).map_err(|e| decode_error("calculation", e))?;
                Ok(Some(self.calculation_from_row(row).await?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn calculation_is_quoted(&mut self, id: CalculationId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM quotes WHERE cost_calculation_id = $1)
                OR EXISTS (SELECT 1 FROM quote_items WHERE cost_calculation_id = $1)
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("calculation_is_quoted", e))
    }

    async fn list_calculations(
        &mut self,
        inquiry_id: Option<InquiryId>,
    ) -> Result<Vec<CostCalculation>, StoreError> {
        let sql = format!(
            r#"
            SELECT {CALCULATION_COLUMNS}
            FROM cost_calculations
            WHERE ($1::uuid IS NULL OR inquiry_id = $1)
            ORDER BY created_at DESC, calculation_number DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(inquiry_id.map(Uuid::from))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_calculations", e))?;

        let mut calcs = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = CalculationRow::from_row(row).map_err(|e| decode_error("calculation", e))?;
            calcs.push(self.calculation_from_row(row).await?);
        }
        Ok(calcs)
    }

    #[instrument(skip(self, quote), fields(quote_id = %quote.header().id), err)]
    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        let h = quote.header();
        let s = quote.state();
        sqlx::query(
            r#"
            INSERT INTO quotes (
                id, quote_number, inquiry_id, customer_id, cost_calculation_id, validity_days,
                valid_from, valid_until, payment_terms, delivery_terms, status, total_amount,
                approved_amount, approved_by, approved_at, sent_at, current_version_id,
                current_version_number, approval_round, created_by, created_at, updated_by,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(h.id.as_uuid())
        .bind(&h.quote_number)
        .bind(h.inquiry_id.map(Uuid::from))
        .bind(h.customer_id.as_uuid())
        .bind(h.cost_calculation_id.map(Uuid::from))
        .bind(to_i32("validity_days", h.validity_days)?)
        .bind(h.valid_from)
        .bind(h.valid_until)
        .bind(&h.payment_terms)
        .bind(&h.delivery_terms)
        .bind(s.status.as_str())
        .bind(s.total_amount)
        .bind(s.approved_amount)
        .bind(s.approved_by.map(Uuid::from))
        .bind(s.approved_at)
        .bind(s.sent_at)
        .bind(s.current_version_id.as_uuid())
        .bind(to_i32("current_version_number", s.current_version_number)?)
        .bind(to_i32("approval_round", s.approval_round)?)
        .bind(h.created_by.as_uuid())
        .bind(h.created_at)
        .bind(s.updated_by.as_uuid())
        .bind(s.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_quote", e))?;
        Ok(())
    }

    #[instrument(skip(self, quote), fields(quote_id = %quote.header().id), err)]
    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        let h = quote.header();
        let s = quote.state();
        sqlx::query(
            r#"
            UPDATE quotes SET
                customer_id = $2, cost_calculation_id = $3, validity_days = $4,
                valid_from = $5, valid_until = $6, payment_terms = $7, delivery_terms = $8,
                status = $9, total_amount = $10, approved_amount = $11, approved_by = $12,
                approved_at = $13, sent_at = $14, current_version_id = $15,
                current_version_number = $16, approval_round = $17, updated_by = $18,
                updated_at = $19
            WHERE id = $1
            "#,
        )
        .bind(h.id.as_uuid())
        .bind(h.customer_id.as_uuid())
        .bind(h.cost_calculation_id.map(Uuid::from))
        .bind(to_i32("validity_days", h.validity_days)?)
        .bind(h.valid_from)
        .bind(h.valid_until)
        .bind(&h.payment_terms)
        .bind(&h.delivery_terms)
        .bind(s.status.as_str())
        .bind(s.total_amount)
        .bind(s.approved_amount)
        .bind(s.approved_by.map(Uuid::from))
        .bind(s.approved_at)
        .bind(s.sent_at)
        .bind(s.current_version_id.as_uuid())
        .bind(to_i32("current_version_number", s.current_version_number)?)
        .bind(to_i32("approval_round", s.approval_round)?)
        .bind(s.updated_by.as_uuid())
        .bind(s.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_quote", e))?;
        Ok(())
    }

    async fn get_quote(&mut self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        let sql = format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_quote", e))?;

        row.map(|row| {
            QuoteRow::from_row(&row)
                .map_err(|e| decode_error("quote", e))?
                .try_into()
        })
        .transpose()
    }

    async fn list_quotes(&mut self, filter: &QuoteFilter) -> Result<Vec<Quote>, StoreError> {
        let sql = format!(
            r#"
            SELECT {QUOTE_COLUMNS}
            FROM quotes
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::uuid IS NULL OR inquiry_id = $3)
            ORDER BY created_at DESC, quote_number DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(QuoteStatus::as_str))
            .bind(filter.customer_id.map(Uuid::from))
            .bind(filter.inquiry_id.map(Uuid::from))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_quotes", e))?;

        rows.iter()
            .map(|row| {
                QuoteRow::from_row(row)
                    .map_err(|e| decode_error("quote", e))?
                    .try_into()
            })
            .collect()
    }

    #[instrument(skip(self, version), fields(version_id = %version.id), err)]
    async fn insert_version(&mut self, version: &QuoteVersion) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO quote_versions (
                id, quote_id, version_number, is_current, notes, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(version.id.as_uuid())
        .bind(version.quote_id.as_uuid())
        .bind(to_i32("version_number", version.version_number)?)
        .bind(version.is_current)
        .bind(&version.notes)
        .bind(version.created_by.as_uuid())
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_version", e))?;

        self.write_version_content(version).await
    }

    #[instrument(skip(self, version), fields(version_id = %version.id), err)]
    async fn update_version(&mut self, version: &QuoteVersion) -> Result<(), StoreError> {
        sqlx::query("UPDATE quote_versions SET is_current = $2, notes = $3 WHERE id = $1")
            .bind(version.id.as_uuid())
            .bind(version.is_current)
            .bind(&version.notes)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_version", e))?;

        self.write_version_content(version).await
    }

    async fn get_version(
        &mut self,
        id: QuoteVersionId,
    ) -> Result<Option<QuoteVersion>, StoreError> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM quote_versions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_version", e))?;

        match row {
            Some(row) => {
                let row = VersionRow::from_row(&row).map_err(|e| decode_error("version", e))?;
                Ok(Some(self.version_from_row(row).await?))
            }
            None => Ok(None),
        }
    }

    async fn list_versions(&mut self, quote_id: QuoteId) -> Result<Vec<QuoteVersion>, StoreError> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM quote_versions WHERE quote_id = $1 ORDER BY version_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(quote_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_versions", e))?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = VersionRow::from_row(row).map_err(|e| decode_error("version", e))?;
            versions.push(self.version_from_row(row).await?);
        }
        Ok(versions)
    }

    async fn list_term_templates(&mut self) -> Result<Vec<TermTemplate>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, content, sort_order, is_active
            FROM quote_term_templates
            ORDER BY sort_order ASC
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_term_templates", e))?;

        rows.iter()
            .map(|row| {
                let sort_order: i32 = row
                    .try_get("sort_order")
                    .map_err(|e| decode_error("term template", e))?;
                let id: Uuid = row.try_get("id").map_err(|e| decode_error("term template", e))?;
                Ok(TermTemplate {
                    id: id.into(),
                    title: row.try_get("title").map_err(|e| decode_error("term template", e))?,
                    content: row
                        .try_get("content")
                        .map_err(|e| decode_error("term template", e))?,
                    sort_order: to_u32("sort_order", sort_order)?,
                    is_active: row
                        .try_get("is_active")
                        .map_err(|e| decode_error("term template", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, approvals), fields(count = approvals.len()), err)]
    async fn insert_approvals(&mut self, approvals: &[QuoteApproval]) -> Result<(), StoreError> {
        for a in approvals {
            sqlx::query(
                r#"
                INSERT INTO quote_approvals (
                    id, quote_id, version_id, round_no, level, required_role, status,
                    approver_id, notes, decided_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(a.id.as_uuid())
            .bind(a.quote_id.as_uuid())
            .bind(a.version_id.as_uuid())
            .bind(to_i32("round_no", a.round)?)
            .bind(to_i32("level", a.level)?)
            .bind(a.required_role.as_str())
            .bind(a.status.as_str())
            .bind(a.approver_id.map(Uuid::from))
            .bind(&a.notes)
            .bind(a.decided_at)
            .bind(a.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_approval", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, approval), fields(approval_id = %approval.id), err)]
    async fn update_approval(&mut self, approval: &QuoteApproval) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE quote_approvals
            SET status = $2, approver_id = $3, notes = $4, decided_at = $5
            WHERE id = $1
            "#,
        )
        .bind(approval.id.as_uuid())
        .bind(approval.status.as_str())
        .bind(approval.approver_id.map(Uuid::from))
        .bind(&approval.notes)
        .bind(approval.decided_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_approval", e))?;
        Ok(())
    }

    async fn list_approvals(
        &mut self,
        quote_id: QuoteId,
        round: u32,
    ) -> Result<Vec<QuoteApproval>, StoreError> {
        let sql = format!(
            r#"
            SELECT {APPROVAL_COLUMNS}
            FROM quote_approvals
            WHERE quote_id = $1 AND round_no = $2
            ORDER BY level ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(quote_id.as_uuid())
            .bind(to_i32("round_no", round)?)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_approvals", e))?;

        rows.iter()
            .map(|row| {
                ApprovalRow::from_row(row)
                    .map_err(|e| decode_error("approval", e))?
                    .try_into()
            })
            .collect()
    }

    async fn pending_approvals(
        &mut self,
        role: ApproverRole,
    ) -> Result<Vec<QuoteApproval>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.quote_id, a.version_id, a.round_no, a.level, a.required_role,
                   a.status, a.approver_id, a.notes, a.decided_at, a.created_at
            FROM quote_approvals a
            JOIN quotes q ON q.id = a.quote_id
            WHERE a.status = 'pending'
              AND a.required_role = $1
              AND q.status = 'pending_approval'
              AND q.approval_round = a.round_no
            ORDER BY a.created_at ASC, a.level ASC
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("pending_approvals", e))?;

        rows.iter()
            .map(|row| {
                ApprovalRow::from_row(row)
                    .map_err(|e| decode_error("approval", e))?
                    .try_into()
            })
            .collect()
    }

    #[instrument(skip(self, entry), fields(quote_id = %entry.quote_id, kind = entry.kind.as_str()), err)]
    async fn append_activity(&mut self, entry: &QuoteActivityLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO quote_activity_logs (
                id, quote_id, version_id, kind, actor, description, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.quote_id.as_uuid())
        .bind(entry.version_id.map(Uuid::from))
        .bind(entry.kind.as_str())
        .bind(entry.actor.as_uuid())
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_activity", e))?;
        Ok(())
    }

    async fn list_activity(
        &mut self,
        quote_id: QuoteId,
    ) -> Result<Vec<QuoteActivityLog>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, quote_id, version_id, kind, actor, description, created_at
            FROM quote_activity_logs
            WHERE quote_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(quote_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_activity", e))?;

        rows.iter()
            .map(|row| {
                ActivityRow::from_row(row)
                    .map_err(|e| decode_error("activity", e))?
                    .try_into()
            })
            .collect()
    }

    #[instrument(skip(self, log), fields(send_log_id = %log.id), err)]
    async fn insert_send_log(&mut self, log: &QuoteSendLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO quote_send_logs (
                id, quote_id, version_id, recipient, subject, status, error_message,
                sent_by, attempted_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(log.quote_id.as_uuid())
        .bind(log.version_id.as_uuid())
        .bind(&log.recipient)
        .bind(&log.subject)
        .bind(log.status.as_str())
        .bind(&log.error_message)
        .bind(log.sent_by.as_uuid())
        .bind(log.attempted_at)
        .bind(log.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_send_log", e))?;
        Ok(())
    }

    #[instrument(skip(self, log), fields(send_log_id = %log.id), err)]
    async fn update_send_log(&mut self, log: &QuoteSendLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE quote_send_logs
            SET status = $2, error_message = $3, completed_at = $4
            WHERE id = $1
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(log.status.as_str())
        .bind(&log.error_message)
        .bind(log.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_send_log", e))?;
        Ok(())
    }

    async fn list_send_logs(&mut self, quote_id: QuoteId) -> Result<Vec<QuoteSendLog>, StoreError> {
        let sql = format!(
            "SELECT {SEND_LOG_COLUMNS} FROM quote_send_logs WHERE quote_id = $1 ORDER BY attempted_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(quote_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_send_logs", e))?;

        rows.iter()
            .map(|row| {
                SendLogRow::from_row(row)
                    .map_err(|e| decode_error("send log", e))?
                    .try_into()
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(format!("failed to decode {what} row: {err}"))
}

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Corrupt(format!("unknown {what} '{value}'"))
}

fn to_u32(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn to_i32(column: &'static str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}

// SQLx row types

#[derive(Debug)]
struct RouteRow {
    id: Uuid,
    name: String,
    product_category: Option<String>,
    origin: String,
    is_default: bool,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RouteRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RouteRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            product_category: row.try_get("product_category")?,
            origin: row.try_get("origin")?,
            is_default: row.try_get("is_default")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct RouteDetailRow {
    sequence: i32,
    process_step_id: Uuid,
    equipment_id: Option<Uuid>,
    yield_rate: Decimal,
    setup_time_minutes: Option<Decimal>,
    cycle_time_seconds: Option<Decimal>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RouteDetailRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RouteDetailRow {
            sequence: row.try_get("sequence")?,
            process_step_id: row.try_get("process_step_id")?,
            equipment_id: row.try_get("equipment_id")?,
            yield_rate: row.try_get("yield_rate")?,
            setup_time_minutes: row.try_get("setup_time_minutes")?,
            cycle_time_seconds: row.try_get("cycle_time_seconds")?,
        })
    }
}

#[derive(Debug)]
struct ProcessStepRow {
    id: Uuid,
    code: String,
    name: String,
    setup_time_minutes: Decimal,
    cycle_time_seconds: Decimal,
    labor_headcount: Decimal,
    requires_equipment: bool,
    default_equipment_id: Option<Uuid>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ProcessStepRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProcessStepRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            setup_time_minutes: row.try_get("setup_time_minutes")?,
            cycle_time_seconds: row.try_get("cycle_time_seconds")?,
            labor_headcount: row.try_get("labor_headcount")?,
            requires_equipment: row.try_get("requires_equipment")?,
            default_equipment_id: row.try_get("default_equipment_id")?,
        })
    }
}

impl From<ProcessStepRow> for ProcessStep {
    fn from(row: ProcessStepRow) -> Self {
        ProcessStep {
            id: ProcessStepId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            setup_time_minutes: row.setup_time_minutes,
            cycle_time_seconds: row.cycle_time_seconds,
            labor_headcount: row.labor_headcount,
            requires_equipment: row.requires_equipment,
            default_equipment_id: row.default_equipment_id.map(EquipmentId::from_uuid),
        }
    }
}

#[derive(Debug)]
struct EquipmentRow {
    id: Uuid,
    code: String,
    name: String,
    purchase_cost: Decimal,
    depreciation_years: i32,
    annual_maintenance_cost: Decimal,
    power_consumption: Decimal,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EquipmentRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(EquipmentRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            purchase_cost: row.try_get("purchase_cost")?,
            depreciation_years: row.try_get("depreciation_years")?,
            annual_maintenance_cost: row.try_get("annual_maintenance_cost")?,
            power_consumption: row.try_get("power_consumption")?,
        })
    }
}

#[derive(Debug)]
struct CalculationRow {
    id: Uuid,
    calculation_number: String,
    inquiry_id: Option<Uuid>,
    product_name: String,
    product_category: Option<String>,
    route_id: Uuid,
    quantity: i32,
    material_cost: Decimal,
    process_cost: Decimal,
    overhead_cost: Decimal,
    total_cost: Decimal,
    unit_cost: Decimal,
    margin_percentage: Decimal,
    selling_price: Decimal,
    labor_rate: Decimal,
    electricity_rate: Decimal,
    overhead_rate: Decimal,
    status: String,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for CalculationRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(CalculationRow {
            id: row.try_get("id")?,
            calculation_number: row.try_get("calculation_number")?,
            inquiry_id: row.try_get("inquiry_id")?,
            product_name: row.try_get("product_name")?,
            product_category: row.try_get("product_category")?,
            route_id: row.try_get("route_id")?,
            quantity: row.try_get("quantity")?,
            material_cost: row.try_get("material_cost")?,
            process_cost: row.try_get("process_cost")?,
            overhead_cost: row.try_get("overhead_cost")?,
            total_cost: row.try_get("total_cost")?,
            unit_cost: row.try_get("unit_cost")?,
            margin_percentage: row.try_get("margin_percentage")?,
            selling_price: row.try_get("selling_price")?,
            labor_rate: row.try_get("labor_rate")?,
            electricity_rate: row.try_get("electricity_rate")?,
            overhead_rate: row.try_get("overhead_rate")?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            approved_by: row.try_get("approved_by")?,
            approved_at: row.try_get("approved_at")?,
        })
    }
}

#[derive(Debug)]
struct CalculationDetailRow {
    sequence: i32,
    process_step_id: Uuid,
    process_step_name: String,
    equipment_id: Option<Uuid>,
    setup_time_minutes: Decimal,
    cycle_time_seconds: Decimal,
    total_time_hours: Decimal,
    labor_cost: Decimal,
    equipment_cost: Decimal,
    electricity_cost: Decimal,
    subtotal: Decimal,
    yield_rate: Decimal,
    yield_loss_cost: Decimal,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for CalculationDetailRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(CalculationDetailRow {
            sequence: row.try_get("sequence")?,
            process_step_id: row.try_get("process_step_id")?,
            process_step_name: row.try_get("process_step_name")?,
            equipment_id: row.try_get("equipment_id")?,
            setup_time_minutes: row.try_get("setup_time_minutes")?,
            cycle_time_seconds: row.try_get("cycle_time_seconds")?,
            total_time_hours: row.try_get("total_time_hours")?,
            labor_cost: row.try_get("labor_cost")?,
            equipment_cost: row.try_get("equipment_cost")?,
            electricity_cost: row.try_get("electricity_cost")?,
            subtotal: row.try_get("subtotal")?,
            yield_rate: row.try_get("yield_rate")?,
            yield_loss_cost: row.try_get("yield_loss_cost")?,
        })
    }
}

#[derive(Debug)]
struct QuoteRow {
    id: Uuid,
    quote_number: String,
    inquiry_id: Option<Uuid>,
    customer_id: Uuid,
    cost_calculation_id: Option<Uuid>,
    validity_days: i32,
    valid_from: NaiveDate,
    valid_until: NaiveDate,
    payment_terms: Option<String>,
    delivery_terms: Option<String>,
    status: String,
    total_amount: Decimal,
    approved_amount: Option<Decimal>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    current_version_id: Uuid,
    current_version_number: i32,
    approval_round: i32,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_by: Uuid,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for QuoteRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(QuoteRow {
            id: row.try_get("id")?,
            quote_number: row.try_get("quote_number")?,
            inquiry_id: row.try_get("inquiry_id")?,
            customer_id: row.try_get("customer_id")?,
            cost_calculation_id: row.try_get("cost_calculation_id")?,
            validity_days: row.try_get("validity_days")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            payment_terms: row.try_get("payment_terms")?,
            delivery_terms: row.try_get("delivery_terms")?,
            status: row.try_get("status")?,
            total_amount: row.try_get("total_amount")?,
            approved_amount: row.try_get("approved_amount")?,
            approved_by: row.try_get("approved_by")?,
            approved_at: row.try_get("approved_at")?,
            sent_at: row.try_get("sent_at")?,
            current_version_id: row.try_get("current_version_id")?,
            current_version_number: row.try_get("current_version_number")?,
            approval_round: row.try_get("approval_round")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_by: row.try_get("updated_by")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<QuoteRow> for Quote {
    type Error = StoreError;

    fn try_from(row: QuoteRow) -> Result<Self, Self::Error> {
        let status =
            QuoteStatus::parse(&row.status).ok_or_else(|| corrupt("quote status", &row.status))?;
        Ok(Quote::restore(
            QuoteHeader {
                id: QuoteId::from_uuid(row.id),
                quote_number: row.quote_number,
                inquiry_id: row.inquiry_id.map(InquiryId::from_uuid),
                customer_id: CustomerId::from_uuid(row.customer_id),
                cost_calculation_id: row.cost_calculation_id.map(CalculationId::from_uuid),
                validity_days: to_u32("validity_days", row.validity_days)?,
                valid_from: row.valid_from,
                valid_until: row.valid_until,
                payment_terms: row.payment_terms,
                delivery_terms: row.delivery_terms,
                created_by: UserId::from_uuid(row.created_by),
                created_at: row.created_at,
            },
            QuoteState {
                status,
                total_amount: row.total_amount,
                approved_amount: row.approved_amount,
                approved_by: row.approved_by.map(UserId::from_uuid),
                approved_at: row.approved_at,
                sent_at: row.sent_at,
                current_version_id: QuoteVersionId::from_uuid(row.current_version_id),
                current_version_number: to_u32(
                    "current_version_number",
                    row.current_version_number,
                )?,
                approval_round: to_u32("approval_round", row.approval_round)?,
                updated_by: UserId::from_uuid(row.updated_by),
                updated_at: row.updated_at,
            },
        ))
    }
}

#[derive(Debug)]
struct VersionRow {
    id: Uuid,
    quote_id: Uuid,
    version_number: i32,
    is_current: bool,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for VersionRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(VersionRow {
            id: row.try_get("id")?,
            quote_id: row.try_get("quote_id")?,
            version_number: row.try_get("version_number")?,
            is_current: row.try_get("is_current")?,
            notes: row.try_get("notes")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    line_no: i32,
    product_name: String,
    specification: Option<String>,
    quantity: i32,
    unit: Option<String>,
    unit_price: Decimal,
    total_price: Decimal,
    cost_calculation_id: Option<Uuid>,
    notes: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ItemRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            line_no: row.try_get("line_no")?,
            product_name: row.try_get("product_name")?,
            specification: row.try_get("specification")?,
            quantity: row.try_get("quantity")?,
            unit: row.try_get("unit")?,
            unit_price: row.try_get("unit_price")?,
            total_price: row.try_get("total_price")?,
            cost_calculation_id: row.try_get("cost_calculation_id")?,
            notes: row.try_get("notes")?,
        })
    }
}

#[derive(Debug)]
struct ApprovalRow {
    id: Uuid,
    quote_id: Uuid,
    version_id: Uuid,
    round_no: i32,
    level: i32,
    required_role: String,
    status: String,
    approver_id: Option<Uuid>,
    notes: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ApprovalRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ApprovalRow {
            id: row.try_get("id")?,
            quote_id: row.try_get("quote_id")?,
            version_id: row.try_get("version_id")?,
            round_no: row.try_get("round_no")?,
            level: row.try_get("level")?,
            required_role: row.try_get("required_role")?,
            status: row.try_get("status")?,
            approver_id: row.try_get("approver_id")?,
            notes: row.try_get("notes")?,
            decided_at: row.try_get("decided_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ApprovalRow> for QuoteApproval {
    type Error = StoreError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        Ok(QuoteApproval {
            id: row.id.into(),
            quote_id: QuoteId::from_uuid(row.quote_id),
            version_id: QuoteVersionId::from_uuid(row.version_id),
            round: to_u32("round_no", row.round_no)?,
            level: to_u32("level", row.level)?,
            required_role: ApproverRole::parse(&row.required_role)
                .ok_or_else(|| corrupt("approver role", &row.required_role))?,
            status: ApprovalStatus::parse(&row.status)
                .ok_or_else(|| corrupt("approval status", &row.status))?,
            approver_id: row.approver_id.map(UserId::from_uuid),
            notes: row.notes,
            decided_at: row.decided_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct ActivityRow {
    id: Uuid,
    quote_id: Uuid,
    version_id: Option<Uuid>,
    kind: String,
    actor: Uuid,
    description: String,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ActivityRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ActivityRow {
            id: row.try_get("id")?,
            quote_id: row.try_get("quote_id")?,
            version_id: row.try_get("version_id")?,
            kind: row.try_get("kind")?,
            actor: row.try_get("actor")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ActivityRow> for QuoteActivityLog {
    type Error = StoreError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(QuoteActivityLog {
            id: row.id.into(),
            quote_id: QuoteId::from_uuid(row.quote_id),
            version_id: row.version_id.map(QuoteVersionId::from_uuid),
            kind: ActivityKind::parse(&row.kind)
                .ok_or_else(|| corrupt("activity kind", &row.kind))?,
            actor: UserId::from_uuid(row.actor),
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct SendLogRow {
    id: Uuid,
    quote_id: Uuid,
    version_id: Uuid,
    recipient: String,
    subject: String,
    status: String,
    error_message: Option<String>,
    sent_by: Uuid,
    attempted_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SendLogRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(SendLogRow {
            id: row.try_get("id")?,
            quote_id: row.try_get("quote_id")?,
            version_id: row.try_get("version_id")?,
            recipient: row.try_get("recipient")?,
            subject: row.try_get("subject")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            sent_by: row.try_get("sent_by")?,
            attempted_at: row.try_get("attempted_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl TryFrom<SendLogRow> for QuoteSendLog {
    type Error = StoreError;

    fn try_from(row: SendLogRow) -> Result<Self, Self::Error> {
        Ok(QuoteSendLog {
            id: row.id.into(),
            quote_id: QuoteId::from_uuid(row.quote_id),
            version_id: QuoteVersionId::from_uuid(row.version_id),
            recipient: row.recipient,
            subject: row.subject,
            status: SendStatus::parse(&row.status)
                .ok_or_else(|| corrupt("send status", &row.status))?,
            error_message: row.error_message,
            sent_by: UserId::from_uuid(row.sent_by),
            attempted_at: row.attempted_at,
            completed_at: row.completed_at,
        })
    }
}
