//! In-memory quoting store for tests/dev.
//!
//! A transaction locks the whole store and works on a private copy of it;
//! `commit()` swaps the copy in. This gives serialisable isolation and makes
//! rollback a matter of dropping the copy.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use quoteforge_core::{
    ApprovalId, CalculationId, DocumentKind, DocumentNumber, EquipmentId, InquiryId,
    ProcessStepId, QuoteId, QuoteVersionId, RouteId, SendLogId,
};
use quoteforge_costing::{CostCalculation, Equipment, ProcessStep, ProductProcessRoute};
use quoteforge_quoting::{
    ApproverRole, Quote, QuoteActivityLog, QuoteApproval, QuoteSendLog, QuoteStatus,
    QuoteVersion, TermTemplate,
};

use super::r#trait::{QuoteFilter, QuotingStore, QuotingTx, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    sequences: HashMap<(DocumentKind, NaiveDate), u32>,
    steps: HashMap<ProcessStepId, ProcessStep>,
    equipment: HashMap<EquipmentId, Equipment>,
    routes: HashMap<RouteId, ProductProcessRoute>,
    calculations: HashMap<CalculationId, CostCalculation>,
    calculation_numbers: HashSet<String>,
    quotes: HashMap<QuoteId, Quote>,
    quote_numbers: HashSet<String>,
    versions: HashMap<QuoteVersionId, QuoteVersion>,
    templates: Vec<TermTemplate>,
    approvals: HashMap<ApprovalId, QuoteApproval>,
    activity: Vec<QuoteActivityLog>,
    send_logs: HashMap<SendLogId, QuoteSendLog>,
}

/// In-memory implementation of [`QuotingStore`].
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuotingStore {
    state: Arc<AsyncMutex<State>>,
    fail_on: Arc<Mutex<HashSet<&'static str>>>,
}

impl InMemoryQuotingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of the named transaction operation (e.g.
    /// `"insert_approvals"`, `"commit"`) fail with [`StoreError::Injected`].
    pub fn inject_failure(&self, operation: &'static str) {
        if let Ok(mut ops) = self.fail_on.lock() {
            ops.insert(operation);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut ops) = self.fail_on.lock() {
            ops.clear();
        }
    }

    // Catalog seeding (the catalog is maintained outside the quoting engine).

    pub async fn add_process_step(&self, step: ProcessStep) {
        self.state.lock().await.steps.insert(step.id, step);
    }

    pub async fn add_equipment(&self, equipment: Equipment) {
        self.state
            .lock()
            .await
            .equipment
            .insert(equipment.id, equipment);
    }

    pub async fn add_route(&self, route: ProductProcessRoute) {
        self.state.lock().await.routes.insert(route.id, route);
    }

    pub async fn add_term_template(&self, template: TermTemplate) {
        self.state.lock().await.templates.push(template);
    }
}

#[async_trait::async_trait]
impl QuotingStore for InMemoryQuotingStore {
    async fn begin(&self) -> Result<Box<dyn QuotingTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryQuotingTx {
            guard,
            working,
            fail_on: Arc::clone(&self.fail_on),
        }))
    }
}

/// Unit of work over [`InMemoryQuotingStore`]; holds the store lock until it
/// is committed or dropped.
pub struct InMemoryQuotingTx {
    guard: OwnedMutexGuard<State>,
    working: State,
    fail_on: Arc<Mutex<HashSet<&'static str>>>,
}

impl InMemoryQuotingTx {
    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        let injected = self
            .fail_on
            .lock()
            .map(|ops| ops.contains(operation))
            .unwrap_or(false);
        if injected {
            Err(StoreError::Injected(operation))
        } else {
            Ok(())
        }
    }
}

fn newest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait::async_trait]
impl QuotingTx for InMemoryQuotingTx {
    async fn next_document_number(
        &mut self,
        kind: DocumentKind,
        day: NaiveDate,
    ) -> Result<DocumentNumber, StoreError> {
        self.check("next_document_number")?;
        let seq = self.working.sequences.entry((kind, day)).or_insert(0);
        *seq += 1;
        Ok(DocumentNumber::new(kind, day, *seq))
    }

    async fn get_route(&mut self, id: RouteId) -> Result<Option<ProductProcessRoute>, StoreError> {
        Ok(self.working.routes.get(&id).cloned())
    }

    async fn list_routes(
        &mut self,
        category: &str,
    ) -> Result<Vec<ProductProcessRoute>, StoreError> {
        let mut routes: Vec<ProductProcessRoute> = self
            .working
            .routes
            .values()
            .filter(|r| r.product_category.as_deref() == Some(category))
            .cloned()
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(routes)
    }

    async fn insert_route(&mut self, route: &ProductProcessRoute) -> Result<(), StoreError> {
        self.check("insert_route")?;
        if self.working.routes.contains_key(&route.id) {
            return Err(StoreError::Conflict(format!("route {} exists", route.id)));
        }
        self.working.routes.insert(route.id, route.clone());
        Ok(())
    }

    async fn get_process_step(
        &mut self,
        id: ProcessStepId,
    ) -> Result<Option<ProcessStep>, StoreError> {
        Ok(self.working.steps.get(&id).cloned())
    }

    async fn get_equipment(&mut self, id: EquipmentId) -> Result<Option<Equipment>, StoreError> {
        Ok(self.working.equipment.get(&id).cloned())
    }

    async fn insert_calculation(&mut self, calc: &CostCalculation) -> Result<(), StoreError> {
        self.check("insert_calculation")?;
        if !self
            .working
            .calculation_numbers
            .insert(calc.calculation_number.clone())
        {
            return Err(StoreError::Conflict(format!(
                "calculation number {} exists",
                calc.calculation_number
            )));
        }
        self.working.calculations.insert(calc.id, calc.clone());
        Ok(())
    }

    async fn update_calculation(&mut self, calc: &CostCalculation) -> Result<(), StoreError> {
        self.check("update_calculation")?;
        match self.working.calculations.get_mut(&calc.id) {
            Some(existing) => {
                *existing = calc.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "calculation {} does not exist",
                calc.id
            ))),
        }
    }

    async fn get_calculation(
        &mut self,
        id: CalculationId,
    ) -> Result<Option<CostCalculation>, StoreError> {
        Ok(self.working.calculations.get(&id).cloned())
    }

    async fn calculation_is_quoted(&mut self, id: CalculationId) -> Result<bool, StoreError> {
        let linked = Some(id);
        Ok(self
            .working
            .quotes
            .values()
            .any(|q| q.header().cost_calculation_id == linked)
            || self
                .working
                .versions
                .values()
                .flat_map(|v| v.items())
                .any(|i| i.cost_calculation_id == linked))
    }

    async fn list_calculations(
        &mut self,
        inquiry_id: Option<InquiryId>,
    ) -> Result<Vec<CostCalculation>, StoreError> {
        let calcs = self
            .working
            .calculations
            .values()
            .filter(|c| inquiry_id.is_none_or(|i| c.inquiry_id == Some(i)))
            .cloned()
            .collect();
        Ok(newest_first(calcs, |c| (c.created_at, c.calculation_number.clone())))
    }

    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        self.check("insert_quote")?;
        if !self
            .working
            .quote_numbers
            .insert(quote.quote_number().to_string())
        {
            return Err(StoreError::Conflict(format!(
                "quote number {} exists",
                quote.quote_number()
            )));
        }
        self.working.quotes.insert(quote.header().id, quote.clone());
        Ok(())
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        self.check("update_quote")?;
        match self.working.quotes.get_mut(&quote.header().id) {
            Some(existing) => {
                *existing = quote.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "quote {} does not exist",
                quote.header().id
            ))),
        }
    }

    async fn get_quote(&mut self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.working.quotes.get(&id).cloned())
    }

    async fn list_quotes(&mut self, filter: &QuoteFilter) -> Result<Vec<Quote>, StoreError> {
        let quotes = self
            .working
            .quotes
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        Ok(newest_first(quotes, |q| {
            (q.header().created_at, q.quote_number().to_string())
        }))
    }

    async fn insert_version(&mut self, version: &QuoteVersion) -> Result<(), StoreError> {
        self.check("insert_version")?;
        let clash = self.working.versions.values().any(|v| {
            v.quote_id == version.quote_id
                && (v.version_number == version.version_number
                    || (v.is_current && version.is_current))
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "version {} of quote {} clashes with an existing version",
                version.version_number, version.quote_id
            )));
        }
        self.working.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn update_version(&mut self, version: &QuoteVersion) -> Result<(), StoreError> {
        self.check("update_version")?;
        match self.working.versions.get_mut(&version.id) {
            Some(existing) => {
                *existing = version.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "version {} does not exist",
                version.id
            ))),
        }
    }

    async fn get_version(
        &mut self,
        id: QuoteVersionId,
    ) -> Result<Option<QuoteVersion>, StoreError> {
        Ok(self.working.versions.get(&id).cloned())
    }

    async fn list_versions(&mut self, quote_id: QuoteId) -> Result<Vec<QuoteVersion>, StoreError> {
        let mut versions: Vec<QuoteVersion> = self
            .working
            .versions
            .values()
            .filter(|v| v.quote_id == quote_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn list_term_templates(&mut self) -> Result<Vec<TermTemplate>, StoreError> {
        Ok(self.working.templates.clone())
    }

    async fn insert_approvals(&mut self, approvals: &[QuoteApproval]) -> Result<(), StoreError> {
        self.check("insert_approvals")?;
        for approval in approvals {
            let clash = self.working.approvals.values().any(|a| {
                a.quote_id == approval.quote_id
                    && a.round == approval.round
                    && a.level == approval.level
            });
            if clash {
                return Err(StoreError::Conflict(format!(
                    "approval level {} of round {} exists",
                    approval.level, approval.round
                )));
            }
            self.working.approvals.insert(approval.id, approval.clone());
        }
        Ok(())
    }

    async fn update_approval(&mut self, approval: &QuoteApproval) -> Result<(), StoreError> {
        self.check("update_approval")?;
        match self.working.approvals.get_mut(&approval.id) {
            Some(existing) => {
                *existing = approval.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "approval {} does not exist",
                approval.id
            ))),
        }
    }

    async fn list_approvals(
        &mut self,
        quote_id: QuoteId,
        round: u32,
    ) -> Result<Vec<QuoteApproval>, StoreError> {
        let mut rows: Vec<QuoteApproval> = self
            .working
            .approvals
            .values()
            .filter(|a| a.quote_id == quote_id && a.round == round)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.level);
        Ok(rows)
    }

    async fn pending_approvals(
        &mut self,
        role: ApproverRole,
    ) -> Result<Vec<QuoteApproval>, StoreError> {
        let quotes = &self.working.quotes;
        let mut rows: Vec<QuoteApproval> = self
            .working
            .approvals
            .values()
            .filter(|a| a.is_pending() && a.required_role == role)
            .filter(|a| {
                quotes.get(&a.quote_id).is_some_and(|q| {
                    q.status() == QuoteStatus::PendingApproval && q.approval_round() == a.round
                })
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.created_at, a.level));
        Ok(rows)
    }

    async fn append_activity(&mut self, entry: &QuoteActivityLog) -> Result<(), StoreError> {
        self.check("append_activity")?;
        self.working.activity.push(entry.clone());
        Ok(())
    }

    async fn list_activity(
        &mut self,
        quote_id: QuoteId,
    ) -> Result<Vec<QuoteActivityLog>, StoreError> {
        Ok(self
            .working
            .activity
            .iter()
            .filter(|e| e.quote_id == quote_id)
            .cloned()
            .collect())
    }

    async fn insert_send_log(&mut self, log: &QuoteSendLog) -> Result<(), StoreError> {
        self.check("insert_send_log")?;
        self.working.send_logs.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_send_log(&mut self, log: &QuoteSendLog) -> Result<(), StoreError> {
        self.check("update_send_log")?;
        match self.working.send_logs.get_mut(&log.id) {
            Some(existing) => {
                *existing = log.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "send log {} does not exist",
                log.id
            ))),
        }
    }

    async fn list_send_logs(&mut self, quote_id: QuoteId) -> Result<Vec<QuoteSendLog>, StoreError> {
        let mut logs: Vec<QuoteSendLog> = self
            .working
            .send_logs
            .values()
            .filter(|l| l.quote_id == quote_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.attempted_at);
        Ok(logs)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.check("commit")?;
        let InMemoryQuotingTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
