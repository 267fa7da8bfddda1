use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use quoteforge_core::{
    CalculationId, CustomerId, Decimal, DocumentKind, InquiryId, QuoteId, UserId,
};
use quoteforge_costing::CostingError;
use quoteforge_quoting::{
    ApprovalOrdering, ApprovalPolicy, Approver, ApproverRole, ChainOutcome, Decision, ItemInput,
    NewQuote, PricedItem, Quote, QuoteActivityLog, QuoteApproval, QuoteChanges, QuoteError,
    QuoteLifecycleEvent, QuoteSendLog, QuoteStatus, QuoteVersion, TermInput,
};

use crate::config::QuotingConfig;
use crate::delivery::{
    DeliveryError, DocumentRenderer, Mailer, OutgoingEmail, QuoteDocument, validate_recipient,
};
use crate::error::{ServiceError, ServiceResult};
use crate::notifier::Notifier;
use crate::store::{QuoteFilter, QuotingStore, QuotingTx};

/// Policy knobs of the quote workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSettings {
    pub default_validity_days: i64,
    pub approval_policy: ApprovalPolicy,
    pub approval_ordering: ApprovalOrdering,
    pub sender_name: String,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self::from(&QuotingConfig::default())
    }
}

impl From<&QuotingConfig> for QuoteSettings {
    fn from(config: &QuotingConfig) -> Self {
        Self {
            default_validity_days: config.default_validity_days,
            approval_policy: config.approval_policy,
            approval_ordering: config.approval_ordering,
            sender_name: config.sender_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuoteRequest {
    pub inquiry_id: Option<InquiryId>,
    pub customer_id: CustomerId,
    pub cost_calculation_id: Option<CalculationId>,
    /// Falls back to the configured default.
    pub validity_days: Option<i64>,
    pub payment_terms: Option<String>,
    pub delivery_terms: Option<String>,
    pub items: Vec<ItemInput>,
    /// Explicit clauses; take precedence over templates.
    pub terms: Option<Vec<TermInput>>,
    #[serde(default)]
    pub use_default_terms: bool,
    pub version_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateQuoteRequest {
    pub customer_id: Option<CustomerId>,
    pub cost_calculation_id: Option<CalculationId>,
    pub validity_days: Option<i64>,
    pub payment_terms: Option<String>,
    pub delivery_terms: Option<String>,
    /// Replaces every line item when present.
    pub items: Option<Vec<ItemInput>>,
    /// Replaces every term when present.
    pub terms: Option<Vec<TermInput>>,
    /// Cut a new version instead of editing the current one.
    pub new_version: bool,
    pub version_notes: Option<String>,
}

/// A quote with its current version and the approval rows of its latest
/// submission round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteDetail {
    pub quote: Quote,
    pub version: QuoteVersion,
    pub approvals: Vec<QuoteApproval>,
}

/// Result of a delivery attempt. A failed delivery is not an error: the quote
/// stays approved and may be sent again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    Sent { quote: Quote, log: QuoteSendLog },
    Failed { log: QuoteSendLog },
}

impl SendOutcome {
    pub fn log(&self) -> &QuoteSendLog {
        match self {
            SendOutcome::Sent { log, .. } | SendOutcome::Failed { log } => log,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Quote lifecycle: create, revise, submit, decide, send, and reads.
///
/// Every mutation runs in one unit of work. Lifecycle notifications are
/// handed to the notifier only after the unit of work committed.
#[derive(Clone)]
pub struct QuoteService {
    store: Arc<dyn QuotingStore>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<dyn DocumentRenderer>,
    mailer: Arc<dyn Mailer>,
    settings: QuoteSettings,
}

impl QuoteService {
    pub fn new(
        store: Arc<dyn QuotingStore>,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn DocumentRenderer>,
        mailer: Arc<dyn Mailer>,
        settings: QuoteSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            renderer,
            mailer,
            settings,
        }
    }

    pub fn settings(&self) -> &QuoteSettings {
        &self.settings
    }

    #[instrument(skip(self, request), fields(customer_id = %request.customer_id), err)]
    pub async fn create_quote(
        &self,
        request: CreateQuoteRequest,
        actor: UserId,
    ) -> ServiceResult<QuoteDetail> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        if let Some(calculation_id) = request.cost_calculation_id {
            ensure_calculation(&mut *tx, calculation_id).await?;
        }
        let items = price_items(&mut *tx, request.items).await?;
        let templates = if request.terms.is_none() && request.use_default_terms {
            tx.list_term_templates().await?
        } else {
            Vec::new()
        };

        let number = tx
            .next_document_number(DocumentKind::Quote, now.date_naive())
            .await?;
        let created = Quote::create(
            NewQuote {
                quote_number: number.to_string(),
                inquiry_id: request.inquiry_id,
                customer_id: request.customer_id,
                cost_calculation_id: request.cost_calculation_id,
                validity_days: request
                    .validity_days
                    .unwrap_or(self.settings.default_validity_days),
                payment_terms: request.payment_terms,
                delivery_terms: request.delivery_terms,
                items,
                terms: request.terms,
                use_default_terms: request.use_default_terms,
                version_notes: request.version_notes,
                created_by: actor,
                created_at: now,
            },
            &templates,
        )?;

        tx.insert_quote(&created.quote).await?;
        tx.insert_version(&created.version).await?;
        tx.append_activity(&created.activity).await?;
        tx.commit().await?;

        let quote = created.quote;
        info!(
            quote_id = %quote.header().id,
            quote_number = %quote.quote_number(),
            total_amount = %quote.total_amount(),
            "quote created"
        );
        self.notifier.notify(QuoteLifecycleEvent::Created {
            quote_id: quote.header().id,
            quote_number: quote.quote_number().to_string(),
            total_amount: quote.total_amount(),
            actor,
            at: now,
        });

        Ok(QuoteDetail {
            quote,
            version: created.version,
            approvals: Vec::new(),
        })
    }

    /// Edit a draft or rejected quote, in place or as a new version.
    #[instrument(skip(self, request), fields(new_version = request.new_version), err)]
    pub async fn update_quote(
        &self,
        id: QuoteId,
        request: UpdateQuoteRequest,
        actor: UserId,
    ) -> ServiceResult<QuoteDetail> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut quote = load_quote(&mut *tx, id).await?;
        quote.ensure_editable()?;
        let current = load_current_version(&mut *tx, &quote).await?;

        if let Some(calculation_id) = request.cost_calculation_id {
            ensure_calculation(&mut *tx, calculation_id).await?;
        }
        let items = match request.items {
            Some(items) => Some(price_items(&mut *tx, items).await?),
            None => None,
        };

        let revision = quote.revise(
            current,
            QuoteChanges {
                customer_id: request.customer_id,
                cost_calculation_id: request.cost_calculation_id,
                validity_days: request.validity_days,
                payment_terms: request.payment_terms,
                delivery_terms: request.delivery_terms,
                items,
                terms: request.terms,
                new_version: request.new_version,
                version_notes: request.version_notes,
            },
            actor,
            now,
        )?;

        // The superseded version must lose its current flag before the new
        // one is inserted.
        match &revision.superseded {
            Some(prior) => {
                tx.update_version(prior).await?;
                tx.insert_version(&revision.version).await?;
            }
            None => tx.update_version(&revision.version).await?,
        }
        tx.update_quote(&quote).await?;
        tx.append_activity(&revision.activity).await?;
        let approvals = tx.list_approvals(id, quote.approval_round()).await?;
        tx.commit().await?;

        info!(
            quote_id = %id,
            version = revision.version.version_number,
            total_amount = %quote.total_amount(),
            "quote updated"
        );
        Ok(QuoteDetail {
            quote,
            version: revision.version,
            approvals,
        })
    }

    /// Open a new approval round sized by the current total.
    #[instrument(skip(self), err)]
    pub async fn submit_quote(&self, id: QuoteId, actor: UserId) -> ServiceResult<QuoteDetail> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut quote = load_quote(&mut *tx, id).await?;
        let current = load_current_version(&mut *tx, &quote).await?;
        let submission = quote.submit(&current, &self.settings.approval_policy, actor, now)?;

        tx.update_quote(&quote).await?;
        tx.insert_approvals(&submission.approvals).await?;
        tx.append_activity(&submission.activity).await?;
        tx.commit().await?;

        let levels = submission.approvals.len() as u32;
        info!(
            quote_id = %id,
            round = quote.approval_round(),
            levels,
            total_amount = %quote.total_amount(),
            "quote submitted for approval"
        );
        self.notifier.notify(QuoteLifecycleEvent::Submitted {
            quote_id: id,
            quote_number: quote.quote_number().to_string(),
            total_amount: quote.total_amount(),
            levels,
            actor,
            at: now,
        });

        Ok(QuoteDetail {
            quote,
            version: current,
            approvals: submission.approvals,
        })
    }

    pub async fn approve_quote(
        &self,
        id: QuoteId,
        approver: &Approver,
        notes: Option<String>,
    ) -> ServiceResult<QuoteDetail> {
        self.decide(id, approver, Decision::Approve, notes).await
    }

    pub async fn reject_quote(
        &self,
        id: QuoteId,
        approver: &Approver,
        notes: Option<String>,
    ) -> ServiceResult<QuoteDetail> {
        self.decide(id, approver, Decision::Reject, notes).await
    }

    /// Record an approver's decision on the live round.
    #[instrument(skip(self, approver, notes), fields(approver = %approver.user_id), err)]
    pub async fn decide(
        &self,
        id: QuoteId,
        approver: &Approver,
        decision: Decision,
        notes: Option<String>,
    ) -> ServiceResult<QuoteDetail> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut quote = load_quote(&mut *tx, id).await?;
        let mut round = tx.list_approvals(id, quote.approval_round()).await?;
        let outcome = quote.record_decision(
            &mut round,
            approver,
            decision,
            notes.clone(),
            self.settings.approval_ordering,
            now,
        )?;

        tx.update_approval(&outcome.approval).await?;
        tx.update_quote(&quote).await?;
        tx.append_activity(&outcome.activity).await?;
        let version = load_current_version(&mut *tx, &quote).await?;
        tx.commit().await?;

        info!(
            quote_id = %id,
            level = outcome.approval.level,
            role = %outcome.approval.required_role,
            decision = ?decision,
            status = %quote.status(),
            "approval recorded"
        );
        match outcome.chain {
            ChainOutcome::Approved => self.notifier.notify(QuoteLifecycleEvent::Approved {
                quote_id: id,
                quote_number: quote.quote_number().to_string(),
                approved_amount: quote.approved_amount().unwrap_or(quote.total_amount()),
                actor: approver.user_id,
                at: now,
            }),
            ChainOutcome::Rejected => self.notifier.notify(QuoteLifecycleEvent::Rejected {
                quote_id: id,
                quote_number: quote.quote_number().to_string(),
                actor: approver.user_id,
                notes,
                at: now,
            }),
            ChainOutcome::Pending => {}
        }

        Ok(QuoteDetail {
            quote,
            version,
            approvals: round,
        })
    }

    /// Render and mail an approved quote.
    ///
    /// The attempt is recorded before the mail goes out; a transport failure
    /// is recorded on the send log and returned as [`SendOutcome::Failed`].
    /// Every log started here ends `sent` or `failed`, also when a concurrent
    /// send has already moved the quote to `sent`.
    #[instrument(skip(self), err)]
    pub async fn send_quote(
        &self,
        id: QuoteId,
        recipient: &str,
        actor: UserId,
    ) -> ServiceResult<SendOutcome> {
        validate_recipient(recipient).map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        let recipient = recipient.trim();

        let mut tx = self.store.begin().await?;
        let quote = load_quote(&mut *tx, id).await?;
        quote.ensure_sendable()?;
        let version = load_current_version(&mut *tx, &quote).await?;
        let mut log = QuoteSendLog::pending(
            id,
            version.id,
            recipient,
            format!("Quotation {}", quote.quote_number()),
            actor,
            Utc::now(),
        );
        tx.insert_send_log(&log).await?;
        tx.commit().await?;

        let delivery = self.deliver(&quote, &version, &log).await;

        let completed_at = Utc::now();
        let mut tx = self.store.begin().await?;
        match delivery {
            Ok(()) => {
                let mut quote = load_quote(&mut *tx, id).await?;
                log.mark_sent(completed_at);
                tx.update_send_log(&log).await?;

                // A concurrent send already moved the quote on; only the log changes.
                if quote.status() != QuoteStatus::Approved {
                    tx.commit().await?;
                    info!(
                        quote_id = %id,
                        %recipient,
                        status = quote.status().as_str(),
                        "quote delivered after status already settled"
                    );
                    return Ok(SendOutcome::Sent { quote, log });
                }

                let activity = quote.mark_sent(recipient, actor, completed_at)?;
                tx.update_quote(&quote).await?;
                tx.append_activity(&activity).await?;
                tx.commit().await?;

                info!(quote_id = %id, %recipient, "quote sent");
                self.notifier.notify(QuoteLifecycleEvent::Sent {
                    quote_id: id,
                    quote_number: quote.quote_number().to_string(),
                    recipient: recipient.to_string(),
                    actor,
                    at: completed_at,
                });
                Ok(SendOutcome::Sent { quote, log })
            }
            Err(err) => {
                warn!(quote_id = %id, %recipient, error = %err, "quote delivery failed");
                log.mark_failed(err.to_string(), completed_at);
                tx.update_send_log(&log).await?;
                tx.commit().await?;
                Ok(SendOutcome::Failed { log })
            }
        }
    }

    async fn deliver(
        &self,
        quote: &Quote,
        version: &QuoteVersion,
        log: &QuoteSendLog,
    ) -> Result<(), DeliveryError> {
        let attachment = self.renderer.render(&QuoteDocument {
            quote,
            version,
            sender_name: &self.settings.sender_name,
        })?;
        let header = quote.header();
        let body = format!(
            "Dear customer,\n\nplease find attached our quotation {} (version {}), \
             valid until {}.\n\nTotal amount: {}\n\nKind regards,\n{}\n",
            header.quote_number,
            version.version_number,
            header.valid_until,
            version.total(),
            self.settings.sender_name
        );
        let email = OutgoingEmail {
            recipient: log.recipient.clone(),
            subject: log.subject.clone(),
            body,
            attachment_name: format!(
                "{}-v{}.{}",
                header.quote_number,
                version.version_number,
                self.renderer.file_extension()
            ),
            attachment,
            content_type: self.renderer.content_type().to_string(),
        };
        self.mailer.send(&email).await
    }

    pub async fn get_quote(&self, id: QuoteId) -> ServiceResult<QuoteDetail> {
        let mut tx = self.store.begin().await?;
        let quote = load_quote(&mut *tx, id).await?;
        let version = load_current_version(&mut *tx, &quote).await?;
        let approvals = tx.list_approvals(id, quote.approval_round()).await?;
        Ok(QuoteDetail {
            quote,
            version,
            approvals,
        })
    }

    /// Newest first.
    pub async fn list_quotes(&self, filter: &QuoteFilter) -> ServiceResult<Vec<Quote>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_quotes(filter).await?)
    }

    pub async fn list_versions(&self, id: QuoteId) -> ServiceResult<Vec<QuoteVersion>> {
        let mut tx = self.store.begin().await?;
        load_quote(&mut *tx, id).await?;
        Ok(tx.list_versions(id).await?)
    }

    /// Audit trail, oldest first.
    pub async fn activity(&self, id: QuoteId) -> ServiceResult<Vec<QuoteActivityLog>> {
        let mut tx = self.store.begin().await?;
        load_quote(&mut *tx, id).await?;
        Ok(tx.list_activity(id).await?)
    }

    pub async fn send_logs(&self, id: QuoteId) -> ServiceResult<Vec<QuoteSendLog>> {
        let mut tx = self.store.begin().await?;
        load_quote(&mut *tx, id).await?;
        Ok(tx.list_send_logs(id).await?)
    }

    /// Approval rows waiting on `role` in live rounds.
    pub async fn pending_approvals(&self, role: ApproverRole) -> ServiceResult<Vec<QuoteApproval>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.pending_approvals(role).await?)
    }
}

async fn load_quote(tx: &mut dyn QuotingTx, id: QuoteId) -> ServiceResult<Quote> {
    Ok(tx.get_quote(id).await?.ok_or(QuoteError::QuoteNotFound(id))?)
}

async fn load_current_version(tx: &mut dyn QuotingTx, quote: &Quote) -> ServiceResult<QuoteVersion> {
    let version_id = quote.current_version_id();
    Ok(tx
        .get_version(version_id)
        .await?
        .ok_or(QuoteError::VersionNotFound(version_id))?)
}

async fn ensure_calculation(tx: &mut dyn QuotingTx, id: CalculationId) -> ServiceResult<()> {
    tx.get_calculation(id)
        .await?
        .ok_or(CostingError::CalculationNotFound(id))?;
    Ok(())
}

/// Settle unit prices, falling back to each linked calculation's per-unit
/// selling price.
async fn price_items(
    tx: &mut dyn QuotingTx,
    items: Vec<ItemInput>,
) -> ServiceResult<Vec<PricedItem>> {
    let mut priced = Vec::with_capacity(items.len());
    for (item, line_no) in items.into_iter().zip(1u32..) {
        let linked_price: Option<Decimal> = match item.cost_calculation_id {
            Some(calculation_id) => {
                let calc = tx
                    .get_calculation(calculation_id)
                    .await?
                    .ok_or(CostingError::CalculationNotFound(calculation_id))?;
                Some(calc.unit_selling_price())
            }
            None => None,
        };
        priced.push(item.priced(line_no, linked_price)?);
    }
    Ok(priced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use quoteforge_core::{ErrorCategory, RouteId, TermTemplateId};
    use quoteforge_costing::{CostBreakdown, CostCalculation, CostParameters, NewCalculation};
    use quoteforge_quoting::{ActivityKind, ApprovalStatus, SendStatus, TermTemplate};
    use rust_decimal_macros::dec;

    use crate::delivery::PlainTextRenderer;
    use crate::store::InMemoryQuotingStore;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<QuoteLifecycleEvent>>,
    }

    impl RecordingNotifier {
        fn kinds(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| match e {
                    QuoteLifecycleEvent::Created { .. } => "created",
                    QuoteLifecycleEvent::Submitted { .. } => "submitted",
                    QuoteLifecycleEvent::Approved { .. } => "approved",
                    QuoteLifecycleEvent::Rejected { .. } => "rejected",
                    QuoteLifecycleEvent::Sent { .. } => "sent",
                })
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, event: QuoteLifecycleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    struct FlakyMailer {
        fail: AtomicBool,
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait::async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeliveryError::Transport("smtp relay unreachable".to_string()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: InMemoryQuotingStore,
        notifier: Arc<RecordingNotifier>,
        mailer: Arc<FlakyMailer>,
        service: QuoteService,
    }

    fn fixture_with(settings: QuoteSettings) -> Fixture {
        let store = InMemoryQuotingStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mailer = Arc::new(FlakyMailer::default());
        let service = QuoteService::new(
            Arc::new(store.clone()),
            notifier.clone(),
            Arc::new(PlainTextRenderer),
            mailer.clone(),
            settings,
        );
        Fixture {
            store,
            notifier,
            mailer,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(QuoteSettings::default())
    }

    fn item(quantity: i64, unit_price: Option<Decimal>) -> ItemInput {
        ItemInput {
            product_name: "Mounting bracket".to_string(),
            specification: Some("S355, zinc plated".to_string()),
            quantity,
            unit: Some("pcs".to_string()),
            unit_price,
            cost_calculation_id: None,
            notes: None,
        }
    }

    fn request(items: Vec<ItemInput>) -> CreateQuoteRequest {
        CreateQuoteRequest {
            inquiry_id: Some(InquiryId::new()),
            customer_id: CustomerId::new(),
            cost_calculation_id: None,
            validity_days: None,
            payment_terms: Some("30 days net".to_string()),
            delivery_terms: Some("EXW".to_string()),
            items,
            terms: None,
            use_default_terms: false,
            version_notes: None,
        }
    }

    fn engineer() -> Approver {
        Approver::new(UserId::new(), [ApproverRole::EngineerLead])
    }

    fn sales_manager() -> Approver {
        Approver::new(UserId::new(), [ApproverRole::SalesManager])
    }

    async fn seed_calculation(store: &InMemoryQuotingStore) -> CostCalculation {
        let calc = CostCalculation::new(
            NewCalculation {
                calculation_number: "CALC-20260301-0001".to_string(),
                inquiry_id: None,
                product_name: "Mounting bracket".to_string(),
                product_category: Some("bracket".to_string()),
                route_id: RouteId::new(),
                quantity: 3,
                notes: None,
                created_by: UserId::new(),
                created_at: Utc::now(),
            },
            CostBreakdown {
                details: vec![],
                material_cost: dec!(700),
                process_cost: dec!(0),
                overhead_cost: dec!(0),
                total_cost: dec!(700),
                unit_cost: dec!(233.33),
                margin_percentage: dec!(30),
                selling_price: dec!(1000),
            },
            CostParameters::default(),
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_calculation(&calc).await.unwrap();
        tx.commit().await.unwrap();
        calc
    }

    async fn approved_quote(f: &Fixture) -> QuoteId {
        let created = f
            .service
            .create_quote(request(vec![item(10, Some(dec!(250)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;
        f.service.submit_quote(id, UserId::new()).await.unwrap();
        f.service.approve_quote(id, &engineer(), None).await.unwrap();
        id
    }

    #[tokio::test]
    async fn create_assigns_sequential_numbers_and_totals() {
        let f = fixture();
        let actor = UserId::new();

        let first = f
            .service
            .create_quote(
                request(vec![item(100, Some(dec!(12.5))), item(3, Some(dec!(400)))]),
                actor,
            )
            .await
            .unwrap();
        let second = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(10)))]), actor)
            .await
            .unwrap();

        assert!(first.quote.quote_number().starts_with("Q-"));
        assert!(first.quote.quote_number().ends_with("-0001"));
        assert!(second.quote.quote_number().ends_with("-0002"));
        assert_eq!(first.quote.status(), QuoteStatus::Draft);
        assert_eq!(first.quote.total_amount(), dec!(2450));
        assert_eq!(first.version.version_number, 1);
        assert!(first.version.is_current);
        assert_eq!(first.version.items().len(), 2);

        let activity = f.service.activity(first.quote.header().id).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].kind, ActivityKind::Created);
        assert_eq!(f.notifier.kinds(), vec!["created", "created"]);
    }

    #[tokio::test]
    async fn create_applies_configured_validity() {
        let f = fixture();
        let detail = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(10)))]), UserId::new())
            .await
            .unwrap();
        let header = detail.quote.header();
        assert_eq!(header.validity_days, 30);
        assert_eq!(
            (header.valid_until - header.valid_from).num_days(),
            i64::from(header.validity_days)
        );
    }

    #[tokio::test]
    async fn linked_calculation_prices_items_without_explicit_price() {
        let f = fixture();
        let calc = seed_calculation(&f.store).await;

        let mut linked = item(3, None);
        linked.cost_calculation_id = Some(calc.id);
        let mut overridden = item(2, Some(dec!(500)));
        overridden.cost_calculation_id = Some(calc.id);

        let mut req = request(vec![linked, overridden]);
        req.cost_calculation_id = Some(calc.id);
        let detail = f.service.create_quote(req, UserId::new()).await.unwrap();

        let items = detail.version.items();
        assert_eq!(items[0].unit_price, dec!(333.33));
        assert_eq!(items[1].unit_price, dec!(500));
        assert_eq!(detail.quote.total_amount(), dec!(1999.99));
        assert_eq!(detail.quote.header().cost_calculation_id, Some(calc.id));
    }

    #[tokio::test]
    async fn unknown_linked_calculation_creates_nothing() {
        let f = fixture();
        let mut linked = item(3, None);
        linked.cost_calculation_id = Some(CalculationId::new());

        let err = f
            .service
            .create_quote(request(vec![linked]), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Costing(CostingError::CalculationNotFound(_))
        ));
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(f.service.list_quotes(&QuoteFilter::default()).await.unwrap().is_empty());
        assert!(f.notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn item_without_any_price_is_rejected() {
        let f = fixture();
        let err = f
            .service
            .create_quote(request(vec![item(1, None)]), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Quote(QuoteError::InvalidItem { line_no: 1, .. })
        ));
    }

    #[tokio::test]
    async fn default_terms_are_cloned_unless_explicit_terms_given() {
        let f = fixture();
        f.store
            .add_term_template(TermTemplate {
                id: TermTemplateId::new(),
                title: "Warranty".to_string(),
                content: "12 months from delivery".to_string(),
                sort_order: 1,
                is_active: true,
            })
            .await;
        f.store
            .add_term_template(TermTemplate {
                id: TermTemplateId::new(),
                title: "Retired clause".to_string(),
                content: "no longer offered".to_string(),
                sort_order: 2,
                is_active: false,
            })
            .await;

        let mut with_defaults = request(vec![item(1, Some(dec!(10)))]);
        with_defaults.use_default_terms = true;
        let detail = f.service.create_quote(with_defaults, UserId::new()).await.unwrap();
        assert_eq!(detail.version.terms().len(), 1);
        assert_eq!(detail.version.terms()[0].title, "Warranty");

        let mut explicit = request(vec![item(1, Some(dec!(10)))]);
        explicit.use_default_terms = true;
        explicit.terms = Some(vec![TermInput {
            title: "Packaging".to_string(),
            content: "Euro pallets".to_string(),
        }]);
        let detail = f.service.create_quote(explicit, UserId::new()).await.unwrap();
        assert_eq!(detail.version.terms().len(), 1);
        assert_eq!(detail.version.terms()[0].title, "Packaging");
        assert!(detail.version.terms()[0].template_id.is_none());
    }

    #[tokio::test]
    async fn update_in_place_or_as_new_version() {
        let f = fixture();
        let actor = UserId::new();
        let created = f
            .service
            .create_quote(request(vec![item(10, Some(dec!(100)))]), actor)
            .await
            .unwrap();
        let id = created.quote.header().id;

        let in_place = f
            .service
            .update_quote(
                id,
                UpdateQuoteRequest {
                    items: Some(vec![item(10, Some(dec!(120)))]),
                    ..UpdateQuoteRequest::default()
                },
                actor,
            )
            .await
            .unwrap();
        assert_eq!(in_place.version.id, created.version.id);
        assert_eq!(in_place.quote.total_amount(), dec!(1200));

        let revised = f
            .service
            .update_quote(
                id,
                UpdateQuoteRequest {
                    items: Some(vec![item(20, Some(dec!(110)))]),
                    new_version: true,
                    version_notes: Some("volume increase".to_string()),
                    ..UpdateQuoteRequest::default()
                },
                actor,
            )
            .await
            .unwrap();
        assert_eq!(revised.version.version_number, 2);
        assert_eq!(revised.quote.current_version_number(), 2);
        assert_eq!(revised.quote.total_amount(), dec!(2200));

        let versions = f.service.list_versions(id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(!versions[0].is_current);
        assert_eq!(versions[0].total(), dec!(1200));
        assert!(versions[1].is_current);

        let kinds: Vec<ActivityKind> = f
            .service
            .activity(id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::Created, ActivityKind::Updated, ActivityKind::Updated]
        );
        assert_eq!(f.notifier.kinds(), vec!["created"]);
    }

    #[tokio::test]
    async fn pending_quote_cannot_be_edited() {
        let f = fixture();
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(10)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;
        f.service.submit_quote(id, UserId::new()).await.unwrap();

        let err = f
            .service
            .update_quote(id, UpdateQuoteRequest::default(), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Quote(QuoteError::NotEditable {
                status: QuoteStatus::PendingApproval
            })
        ));
    }

    #[tokio::test]
    async fn mid_tier_quote_needs_two_approvals() {
        let f = fixture();
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(45000)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;

        let submitted = f.service.submit_quote(id, UserId::new()).await.unwrap();
        let roles: Vec<ApproverRole> = submitted
            .approvals
            .iter()
            .map(|a| a.required_role)
            .collect();
        assert_eq!(
            roles,
            vec![ApproverRole::EngineerLead, ApproverRole::SalesManager]
        );
        assert_eq!(submitted.quote.status(), QuoteStatus::PendingApproval);

        let after_sales = f
            .service
            .approve_quote(id, &sales_manager(), Some("price ok".to_string()))
            .await
            .unwrap();
        assert_eq!(after_sales.quote.status(), QuoteStatus::PendingApproval);

        let done = f.service.approve_quote(id, &engineer(), None).await.unwrap();
        assert_eq!(done.quote.status(), QuoteStatus::Approved);
        assert_eq!(done.quote.approved_amount(), Some(dec!(45000)));
        assert!(
            done.approvals
                .iter()
                .all(|a| a.status == ApprovalStatus::Approved)
        );
        assert_eq!(f.notifier.kinds(), vec!["created", "submitted", "approved"]);
    }

    #[tokio::test]
    async fn approver_without_matching_role_is_refused() {
        let f = fixture();
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(500)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;
        f.service.submit_quote(id, UserId::new()).await.unwrap();

        let err = f
            .service
            .approve_quote(id, &sales_manager(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Quote(QuoteError::NoPendingApprovalForUser(_))
        ));
        let detail = f.service.get_quote(id).await.unwrap();
        assert_eq!(detail.quote.status(), QuoteStatus::PendingApproval);
        assert!(detail.approvals.iter().all(|a| a.is_pending()));
    }

    #[tokio::test]
    async fn sequential_ordering_blocks_higher_levels() {
        let f = fixture_with(QuoteSettings {
            approval_ordering: ApprovalOrdering::Sequential,
            ..QuoteSettings::default()
        });
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(20000)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;
        f.service.submit_quote(id, UserId::new()).await.unwrap();

        let err = f
            .service
            .approve_quote(id, &sales_manager(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Quote(QuoteError::ApprovalOutOfOrder { level: 2 })
        ));

        f.service.approve_quote(id, &engineer(), None).await.unwrap();
        let done = f
            .service
            .approve_quote(id, &sales_manager(), None)
            .await
            .unwrap();
        assert_eq!(done.quote.status(), QuoteStatus::Approved);
    }

    #[tokio::test]
    async fn rejected_quote_is_revised_and_resubmitted_in_a_new_round() {
        let f = fixture();
        let actor = UserId::new();
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(800)))]), actor)
            .await
            .unwrap();
        let id = created.quote.header().id;
        f.service.submit_quote(id, actor).await.unwrap();

        let rejected = f
            .service
            .reject_quote(id, &engineer(), Some("tolerance too tight".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.quote.status(), QuoteStatus::Rejected);
        assert!(f.service.pending_approvals(ApproverRole::EngineerLead).await.unwrap().is_empty());

        let revised = f
            .service
            .update_quote(
                id,
                UpdateQuoteRequest {
                    items: Some(vec![item(1, Some(dec!(750)))]),
                    new_version: true,
                    ..UpdateQuoteRequest::default()
                },
                actor,
            )
            .await
            .unwrap();
        assert_eq!(revised.quote.status(), QuoteStatus::Draft);

        let resubmitted = f.service.submit_quote(id, actor).await.unwrap();
        assert_eq!(resubmitted.quote.approval_round(), 2);
        assert_eq!(resubmitted.approvals[0].version_id, revised.version.id);

        let pending = f
            .service
            .pending_approvals(ApproverRole::EngineerLead)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].round, 2);
        assert_eq!(
            f.notifier.kinds(),
            vec!["created", "submitted", "rejected", "submitted"]
        );
    }

    #[tokio::test]
    async fn failed_approval_write_rolls_back_submission() {
        let f = fixture();
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(800)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;

        f.store.inject_failure("insert_approvals");
        let err = f.service.submit_quote(id, UserId::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Persistence);
        f.store.clear_failures();

        let detail = f.service.get_quote(id).await.unwrap();
        assert_eq!(detail.quote.status(), QuoteStatus::Draft);
        assert_eq!(detail.quote.approval_round(), 0);
        assert_eq!(f.service.activity(id).await.unwrap().len(), 1);
        assert_eq!(f.notifier.kinds(), vec!["created"]);
    }

    #[tokio::test]
    async fn send_delivers_and_marks_quote_sent() {
        let f = fixture();
        let id = approved_quote(&f).await;

        let outcome = f
            .service
            .send_quote(id, " buyer@example.com ", UserId::new())
            .await
            .unwrap();
        assert!(outcome.is_sent());
        assert_eq!(outcome.log().status, SendStatus::Sent);
        assert_eq!(outcome.log().recipient, "buyer@example.com");

        let detail = f.service.get_quote(id).await.unwrap();
        assert_eq!(detail.quote.status(), QuoteStatus::Sent);

        let sent = f.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].attachment_name.ends_with("-v1.txt"));
        assert!(!sent[0].attachment.is_empty());

        let last = f.service.activity(id).await.unwrap().pop().unwrap();
        assert_eq!(last.kind, ActivityKind::Sent);
        assert_eq!(f.notifier.kinds().last(), Some(&"sent"));
    }

    #[tokio::test]
    async fn failed_delivery_keeps_quote_approved_and_can_be_retried() {
        let f = fixture();
        let id = approved_quote(&f).await;

        f.mailer.fail.store(true, Ordering::SeqCst);
        let outcome = f
            .service
            .send_quote(id, "buyer@example.com", UserId::new())
            .await
            .unwrap();
        assert!(!outcome.is_sent());
        assert_eq!(outcome.log().status, SendStatus::Failed);
        assert!(
            outcome
                .log()
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("smtp relay unreachable"))
        );
        assert_eq!(
            f.service.get_quote(id).await.unwrap().quote.status(),
            QuoteStatus::Approved
        );

        f.mailer.fail.store(false, Ordering::SeqCst);
        let retry = f
            .service
            .send_quote(id, "buyer@example.com", UserId::new())
            .await
            .unwrap();
        assert!(retry.is_sent());

        let logs = f.service.send_logs(id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(
            logs.iter().filter(|l| l.status == SendStatus::Failed).count(),
            1
        );
    }

    /// Holds every delivery until two are in flight.
    struct GatedMailer {
        gate: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl Mailer for GatedMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), DeliveryError> {
            self.gate.wait().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_sends_settle_every_log() {
        let store = InMemoryQuotingStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = QuoteService::new(
            Arc::new(store),
            notifier.clone(),
            Arc::new(PlainTextRenderer),
            Arc::new(GatedMailer {
                gate: tokio::sync::Barrier::new(2),
            }),
            QuoteSettings::default(),
        );
        let created = service
            .create_quote(request(vec![item(10, Some(dec!(250)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;
        service.submit_quote(id, UserId::new()).await.unwrap();
        service.approve_quote(id, &engineer(), None).await.unwrap();

        let (a, b) = tokio::join!(
            service.send_quote(id, "a@example.com", UserId::new()),
            service.send_quote(id, "b@example.com", UserId::new()),
        );
        assert!(a.unwrap().is_sent());
        assert!(b.unwrap().is_sent());

        let logs = service.send_logs(id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == SendStatus::Sent));
        assert!(logs.iter().all(|l| l.completed_at.is_some()));

        assert_eq!(
            service.get_quote(id).await.unwrap().quote.status(),
            QuoteStatus::Sent
        );
        let sent_entries = service
            .activity(id)
            .await
            .unwrap()
            .iter()
            .filter(|a| a.kind == ActivityKind::Sent)
            .count();
        assert_eq!(sent_entries, 1);
        assert_eq!(notifier.kinds().iter().filter(|k| **k == "sent").count(), 1);
    }

    #[tokio::test]
    async fn only_approved_quotes_can_be_sent() {
        let f = fixture();
        let created = f
            .service
            .create_quote(request(vec![item(1, Some(dec!(10)))]), UserId::new())
            .await
            .unwrap();
        let id = created.quote.header().id;

        let err = f
            .service
            .send_quote(id, "buyer@example.com", UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Quote(QuoteError::InvalidTransition { action: "send", .. })
        ));
        assert!(f.service.send_logs(id).await.unwrap().is_empty());

        let err = f
            .service
            .send_quote(id, "not-an-address", UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
        assert!(f.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_quote_is_not_found() {
        let f = fixture();
        let err = f.service.get_quote(QuoteId::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        let err = f.service.submit_quote(QuoteId::new(), UserId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Quote(QuoteError::QuoteNotFound(_))));
    }

    #[test]
    fn update_request_fields_default_when_absent() {
        let req: UpdateQuoteRequest =
            serde_json::from_str(r#"{"new_version": true, "payment_terms": "60 days"}"#).unwrap();
        assert!(req.new_version);
        assert_eq!(req.payment_terms.as_deref(), Some("60 days"));
        assert!(req.items.is_none());
        assert!(req.customer_id.is_none());
    }
}
