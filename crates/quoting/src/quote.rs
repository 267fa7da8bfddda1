//! Quote aggregate: header, lifecycle state and transitions.
//!
//! Transitions are pure: each returns the records the caller must persist in
//! the same unit of work (versions, approval rows, one activity entry).

use chrono::{DateTime, Days, NaiveDate, Utc};
use quoteforge_core::{
    AggregateRoot, CalculationId, CustomerId, Decimal, InquiryId, QuoteId, QuoteVersionId, UserId,
};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityKind, QuoteActivityLog};
use crate::approval::{
    ApprovalOrdering, ApprovalPolicy, ApprovalStatus, Approver, ChainOutcome, Decision,
    QuoteApproval, evaluate_chain,
};
use crate::error::QuoteError;
use crate::version::{PricedItem, QuoteVersion, TermInput, TermTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Sent,
}

impl QuoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::PendingApproval => "pending_approval",
            QuoteStatus::Approved => "approved",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(QuoteStatus::Draft),
            "pending_approval" => Some(QuoteStatus::PendingApproval),
            "approved" => Some(QuoteStatus::Approved),
            "rejected" => Some(QuoteStatus::Rejected),
            "sent" => Some(QuoteStatus::Sent),
            _ => None,
        }
    }

    /// Only draft and rejected quotes may be edited or (re)submitted.
    pub fn is_editable(self) -> bool {
        matches!(self, QuoteStatus::Draft | QuoteStatus::Rejected)
    }
}

impl core::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for [`Quote::create`]. The quote number is allocated by the caller
/// inside the same unit of work.
#[derive(Debug, Clone)]
pub struct NewQuote {
    pub quote_number: String,
    pub inquiry_id: Option<InquiryId>,
    pub customer_id: CustomerId,
    pub cost_calculation_id: Option<CalculationId>,
    pub validity_days: i64,
    pub payment_terms: Option<String>,
    pub delivery_terms: Option<String>,
    pub items: Vec<PricedItem>,
    /// Explicit terms always win over templates.
    pub terms: Option<Vec<TermInput>>,
    pub use_default_terms: bool,
    pub version_notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Edits applied by [`Quote::revise`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct QuoteChanges {
    pub customer_id: Option<CustomerId>,
    pub cost_calculation_id: Option<CalculationId>,
    pub validity_days: Option<i64>,
    pub payment_terms: Option<String>,
    pub delivery_terms: Option<String>,
    pub items: Option<Vec<PricedItem>>,
    pub terms: Option<Vec<TermInput>>,
    pub new_version: bool,
    pub version_notes: Option<String>,
}

/// Descriptive quote fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteHeader {
    pub id: QuoteId,
    pub quote_number: String,
    pub inquiry_id: Option<InquiryId>,
    pub customer_id: CustomerId,
    pub cost_calculation_id: Option<CalculationId>,
    pub validity_days: u32,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub payment_terms: Option<String>,
    pub delivery_terms: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle fields, only ever changed by transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteState {
    pub status: QuoteStatus,
    pub total_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub current_version_id: QuoteVersionId,
    pub current_version_number: u32,
    pub approval_round: u32,
    pub updated_by: UserId,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    header: QuoteHeader,
    state: QuoteState,
}

impl AggregateRoot for Quote {
    type Id = QuoteId;

    fn id(&self) -> &Self::Id {
        &self.header.id
    }

    fn version(&self) -> u64 {
        u64::from(self.state.current_version_number)
    }
}

/// Result of [`Quote::create`].
#[derive(Debug, Clone)]
pub struct Created {
    pub quote: Quote,
    pub version: QuoteVersion,
    pub activity: QuoteActivityLog,
}

/// Result of [`Quote::revise`].
#[derive(Debug, Clone)]
pub struct Revision {
    /// The version that is current after the edit.
    pub version: QuoteVersion,
    /// The prior version, now flagged non-current, when a new version was cut.
    pub superseded: Option<QuoteVersion>,
    pub activity: QuoteActivityLog,
}

/// Result of [`Quote::submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub approvals: Vec<QuoteApproval>,
    pub activity: QuoteActivityLog,
}

/// Result of [`Quote::record_decision`].
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    /// The approval row as decided.
    pub approval: QuoteApproval,
    pub chain: ChainOutcome,
    pub activity: QuoteActivityLog,
}

fn validity_window(days: i64, from: DateTime<Utc>) -> Result<(u32, NaiveDate, NaiveDate), QuoteError> {
    let days = u32::try_from(days)
        .ok()
        .filter(|d| *d > 0)
        .ok_or(QuoteError::InvalidValidity)?;
    let valid_from = from.date_naive();
    let valid_until = valid_from
        .checked_add_days(Days::new(u64::from(days)))
        .ok_or(QuoteError::InvalidValidity)?;
    Ok((days, valid_from, valid_until))
}

impl Quote {
    /// Create a quote with version 1 in `draft`.
    pub fn create(new: NewQuote, templates: &[TermTemplate]) -> Result<Created, QuoteError> {
        let (validity_days, valid_from, valid_until) =
            validity_window(new.validity_days, new.created_at)?;
        let id = QuoteId::new();

        let mut version = QuoteVersion::new(id, 1, new.version_notes, new.created_by, new.created_at);
        version.replace_items(new.items)?;
        match new.terms {
            Some(terms) => version.replace_terms(terms)?,
            None if new.use_default_terms => version.clone_templates(templates),
            None => {}
        }

        let quote = Quote {
            header: QuoteHeader {
                id,
                quote_number: new.quote_number,
                inquiry_id: new.inquiry_id,
                customer_id: new.customer_id,
                cost_calculation_id: new.cost_calculation_id,
                validity_days,
                valid_from,
                valid_until,
                payment_terms: new.payment_terms,
                delivery_terms: new.delivery_terms,
                created_by: new.created_by,
                created_at: new.created_at,
            },
            state: QuoteState {
                status: QuoteStatus::Draft,
                total_amount: version.total(),
                approved_amount: None,
                approved_by: None,
                approved_at: None,
                sent_at: None,
                current_version_id: version.id,
                current_version_number: 1,
                approval_round: 0,
                updated_by: new.created_by,
                updated_at: new.created_at,
            },
        };

        let activity = QuoteActivityLog::new(
            id,
            Some(version.id),
            ActivityKind::Created,
            new.created_by,
            format!("Quote {} created", quote.header.quote_number),
            new.created_at,
        );

        Ok(Created {
            quote,
            version,
            activity,
        })
    }

    /// Reassemble a stored quote (store adapters only).
    pub fn restore(header: QuoteHeader, state: QuoteState) -> Self {
        Self { header, state }
    }

    pub fn header(&self) -> &QuoteHeader {
        &self.header
    }

    pub fn state(&self) -> &QuoteState {
        &self.state
    }

    pub fn quote_number(&self) -> &str {
        &self.header.quote_number
    }

    pub fn status(&self) -> QuoteStatus {
        self.state.status
    }

    pub fn total_amount(&self) -> Decimal {
        self.state.total_amount
    }

    pub fn approved_amount(&self) -> Option<Decimal> {
        self.state.approved_amount
    }

    pub fn current_version_id(&self) -> QuoteVersionId {
        self.state.current_version_id
    }

    pub fn current_version_number(&self) -> u32 {
        self.state.current_version_number
    }

    pub fn approval_round(&self) -> u32 {
        self.state.approval_round
    }

    pub fn ensure_editable(&self) -> Result<(), QuoteError> {
        if self.state.status.is_editable() {
            Ok(())
        } else {
            Err(QuoteError::NotEditable {
                status: self.state.status,
            })
        }
    }

    fn ensure_current(&self, version: &QuoteVersion) -> Result<(), QuoteError> {
        if version.quote_id != self.header.id
            || version.id != self.state.current_version_id
            || !version.is_current
        {
            return Err(QuoteError::Invariant(format!(
                "version {} is not the current version of quote {}",
                version.id, self.header.quote_number
            )));
        }
        Ok(())
    }

    fn touch(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.state.updated_by = actor;
        self.state.updated_at = at;
    }

    /// Edit a draft or rejected quote, in place or by cutting a new version.
    ///
    /// Items and terms are replaced only when supplied. A rejected quote
    /// returns to `draft`.
    pub fn revise(
        &mut self,
        current: QuoteVersion,
        changes: QuoteChanges,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Revision, QuoteError> {
        self.ensure_editable()?;
        self.ensure_current(&current)?;

        let window = changes
            .validity_days
            .map(|days| validity_window(days, at))
            .transpose()?;

        let (mut version, superseded) = if changes.new_version {
            let next = current.successor(changes.version_notes.clone(), actor, at);
            let mut prior = current;
            prior.is_current = false;
            (next, Some(prior))
        } else {
            let mut version = current;
            if changes.version_notes.is_some() {
                version.notes = changes.version_notes.clone();
            }
            (version, None)
        };
        if let Some(items) = changes.items {
            version.replace_items(items)?;
        }
        if let Some(terms) = changes.terms {
            version.replace_terms(terms)?;
        }

        if let Some((days, from, until)) = window {
            self.header.validity_days = days;
            self.header.valid_from = from;
            self.header.valid_until = until;
        }
        if let Some(customer_id) = changes.customer_id {
            self.header.customer_id = customer_id;
        }
        if let Some(calculation_id) = changes.cost_calculation_id {
            self.header.cost_calculation_id = Some(calculation_id);
        }
        if let Some(payment_terms) = changes.payment_terms {
            self.header.payment_terms = Some(payment_terms);
        }
        if let Some(delivery_terms) = changes.delivery_terms {
            self.header.delivery_terms = Some(delivery_terms);
        }

        self.state.current_version_id = version.id;
        self.state.current_version_number = version.version_number;
        self.state.total_amount = version.total();
        self.state.status = QuoteStatus::Draft;
        self.touch(actor, at);

        let description = match &superseded {
            Some(prior) => format!(
                "Quote updated to version {} (from {})",
                version.version_number, prior.version_number
            ),
            None => format!("Quote version {} updated", version.version_number),
        };
        let activity = QuoteActivityLog::new(
            self.header.id,
            Some(version.id),
            ActivityKind::Updated,
            actor,
            description,
            at,
        );

        Ok(Revision {
            version,
            superseded,
            activity,
        })
    }

    /// `draft | rejected → pending_approval`; opens a new approval round whose
    /// levels are fixed by the current total.
    pub fn submit(
        &mut self,
        current: &QuoteVersion,
        policy: &ApprovalPolicy,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Submission, QuoteError> {
        if !self.state.status.is_editable() {
            return Err(QuoteError::InvalidTransition {
                action: "submit",
                status: self.state.status,
            });
        }
        self.ensure_current(current)?;
        if current.total() != self.state.total_amount {
            return Err(QuoteError::Invariant(format!(
                "quote total {} differs from current version total {}",
                self.state.total_amount,
                current.total()
            )));
        }

        let round = self.state.approval_round + 1;
        let approvals: Vec<QuoteApproval> = policy
            .required_roles(self.state.total_amount)
            .into_iter()
            .zip(1u32..)
            .map(|(role, level)| {
                QuoteApproval::pending(self.header.id, current.id, round, level, role, at)
            })
            .collect();

        self.state.approval_round = round;
        self.state.status = QuoteStatus::PendingApproval;
        self.touch(actor, at);

        let activity = QuoteActivityLog::new(
            self.header.id,
            Some(current.id),
            ActivityKind::Submitted,
            actor,
            format!(
                "Submitted for approval ({} level(s), amount {})",
                approvals.len(),
                self.state.total_amount
            ),
            at,
        );

        Ok(Submission {
            approvals,
            activity,
        })
    }

    /// Record an approver's decision on the current round and re-evaluate the
    /// chain.
    ///
    /// `round` holds the approval rows of the current round. The decided row
    /// is updated in place and also returned.
    pub fn record_decision(
        &mut self,
        round: &mut [QuoteApproval],
        approver: &Approver,
        decision: Decision,
        notes: Option<String>,
        ordering: ApprovalOrdering,
        at: DateTime<Utc>,
    ) -> Result<DecisionOutcome, QuoteError> {
        if self.state.status != QuoteStatus::PendingApproval {
            return Err(QuoteError::InvalidTransition {
                action: match decision {
                    Decision::Approve => "approve",
                    Decision::Reject => "reject",
                },
                status: self.state.status,
            });
        }
        if round
            .iter()
            .any(|a| a.quote_id != self.header.id || a.round != self.state.approval_round)
        {
            return Err(QuoteError::Invariant(
                "approval rows do not belong to the current round".to_string(),
            ));
        }

        let idx = round
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_pending() && approver.holds(a.required_role))
            .min_by_key(|(_, a)| a.level)
            .map(|(i, _)| i)
            .ok_or(QuoteError::NoPendingApprovalForUser(approver.user_id))?;

        let level = round[idx].level;
        if ordering == ApprovalOrdering::Sequential
            && round
                .iter()
                .any(|a| a.level < level && a.status != ApprovalStatus::Approved)
        {
            return Err(QuoteError::ApprovalOutOfOrder { level });
        }

        round[idx].decide(decision, approver.user_id, notes.clone(), at);
        let chain = evaluate_chain(round);
        match chain {
            ChainOutcome::Rejected => {
                self.state.status = QuoteStatus::Rejected;
            }
            ChainOutcome::Approved => {
                self.state.status = QuoteStatus::Approved;
                self.state.approved_amount = Some(self.state.total_amount);
                self.state.approved_by = Some(approver.user_id);
                self.state.approved_at = Some(at);
            }
            ChainOutcome::Pending => {}
        }
        self.touch(approver.user_id, at);

        let approval = round[idx].clone();
        let (kind, verb) = match decision {
            Decision::Approve => (ActivityKind::Approved, "approved"),
            Decision::Reject => (ActivityKind::Rejected, "rejected"),
        };
        let mut description = format!(
            "Level {} ({}) {}",
            approval.level, approval.required_role, verb
        );
        if let Some(notes) = &notes {
            description.push_str(": ");
            description.push_str(notes);
        }
        let activity = QuoteActivityLog::new(
            self.header.id,
            Some(approval.version_id),
            kind,
            approver.user_id,
            description,
            at,
        );

        Ok(DecisionOutcome {
            approval,
            chain,
            activity,
        })
    }

    /// Checks that a delivery may be attempted.
    pub fn ensure_sendable(&self) -> Result<(), QuoteError> {
        if self.state.status == QuoteStatus::Approved {
            Ok(())
        } else {
            Err(QuoteError::InvalidTransition {
                action: "send",
                status: self.state.status,
            })
        }
    }

    /// `approved → sent`, after the delivery succeeded.
    pub fn mark_sent(
        &mut self,
        recipient: &str,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<QuoteActivityLog, QuoteError> {
        self.ensure_sendable()?;
        self.state.status = QuoteStatus::Sent;
        self.state.sent_at = Some(at);
        self.touch(actor, at);

        Ok(QuoteActivityLog::new(
            self.header.id,
            Some(self.state.current_version_id),
            ActivityKind::Sent,
            actor,
            format!("Quote sent to {recipient}"),
            at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApproverRole;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i64, unit_price: Decimal) -> PricedItem {
        PricedItem {
            product_name: "Bracket".to_string(),
            specification: Some("S355".to_string()),
            quantity,
            unit: Some("pcs".to_string()),
            unit_price,
            cost_calculation_id: None,
            notes: None,
        }
    }

    fn new_quote(items: Vec<PricedItem>) -> NewQuote {
        NewQuote {
            quote_number: "Q-20260301-0001".to_string(),
            inquiry_id: Some(InquiryId::new()),
            customer_id: CustomerId::new(),
            cost_calculation_id: None,
            validity_days: 30,
            payment_terms: Some("30 days net".to_string()),
            delivery_terms: None,
            items,
            terms: None,
            use_default_terms: false,
            version_notes: None,
            created_by: UserId::new(),
            created_at: Utc::now(),
        }
    }

    fn create(total: Decimal) -> (Quote, QuoteVersion) {
        let c = Quote::create(new_quote(vec![item(1, total)]), &[]).unwrap();
        (c.quote, c.version)
    }

    #[test]
    fn create_starts_at_version_one_in_draft() {
        let c = Quote::create(new_quote(vec![item(10, dec!(2.5)), item(2, dec!(100))]), &[])
            .unwrap();

        assert_eq!(c.quote.status(), QuoteStatus::Draft);
        assert_eq!(c.quote.current_version_number(), 1);
        assert_eq!(c.quote.current_version_id(), c.version.id);
        assert_eq!(c.quote.total_amount(), dec!(225.00));
        assert_eq!(c.quote.total_amount(), c.version.total());
        assert_eq!(
            c.quote.header().valid_until - c.quote.header().valid_from,
            chrono::Duration::days(30)
        );
        assert_eq!(c.activity.kind, ActivityKind::Created);
    }

    #[test]
    fn create_rejects_non_positive_validity() {
        let mut new = new_quote(vec![item(1, dec!(1))]);
        new.validity_days = 0;
        assert_eq!(
            Quote::create(new, &[]).unwrap_err(),
            QuoteError::InvalidValidity
        );
    }

    #[test]
    fn explicit_terms_win_over_templates() {
        let template = TermTemplate {
            id: quoteforge_core::TermTemplateId::new(),
            title: "Warranty".to_string(),
            content: "12 months".to_string(),
            sort_order: 1,
            is_active: true,
        };

        let mut with_defaults = new_quote(vec![item(1, dec!(1))]);
        with_defaults.use_default_terms = true;
        let c = Quote::create(with_defaults.clone(), std::slice::from_ref(&template)).unwrap();
        assert_eq!(c.version.terms()[0].title, "Warranty");

        with_defaults.terms = Some(vec![TermInput {
            title: "Payment".to_string(),
            content: "prepaid".to_string(),
        }]);
        let c = Quote::create(with_defaults, &[template]).unwrap();
        assert_eq!(c.version.terms().len(), 1);
        assert_eq!(c.version.terms()[0].title, "Payment");
    }

    #[test]
    fn scenario_45000_engineer_approves_sales_rejects() {
        let (mut quote, version) = create(dec!(45000));
        let actor = UserId::new();
        let sub = quote
            .submit(&version, &ApprovalPolicy::default(), actor, Utc::now())
            .unwrap();
        assert_eq!(quote.status(), QuoteStatus::PendingApproval);

        let roles: Vec<ApproverRole> = sub.approvals.iter().map(|a| a.required_role).collect();
        assert_eq!(
            roles,
            vec![ApproverRole::EngineerLead, ApproverRole::SalesManager]
        );
        assert!(sub.approvals.iter().all(|a| a.is_pending()));

        let mut round = sub.approvals;
        let lead = Approver::new(UserId::new(), [ApproverRole::EngineerLead]);
        let out = quote
            .record_decision(
                &mut round,
                &lead,
                Decision::Approve,
                None,
                ApprovalOrdering::Parallel,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(out.chain, ChainOutcome::Pending);
        assert_eq!(quote.status(), QuoteStatus::PendingApproval);

        let sales = Approver::new(UserId::new(), [ApproverRole::SalesManager]);
        let out = quote
            .record_decision(
                &mut round,
                &sales,
                Decision::Reject,
                Some("margin too thin".to_string()),
                ApprovalOrdering::Parallel,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(out.chain, ChainOutcome::Rejected);
        assert_eq!(quote.status(), QuoteStatus::Rejected);
        assert_eq!(quote.approved_amount(), None);
        assert_eq!(out.activity.kind, ActivityKind::Rejected);
        assert_eq!(out.approval.approver_id, Some(sales.user_id));
    }

    #[test]
    fn full_approval_freezes_amount() {
        let (mut quote, version) = create(dec!(60000));
        let mut round = quote
            .submit(&version, &ApprovalPolicy::default(), UserId::new(), Utc::now())
            .unwrap()
            .approvals;
        assert_eq!(round.len(), 3);

        // Highest level first is allowed under parallel ordering.
        for role in [
            ApproverRole::GeneralManager,
            ApproverRole::EngineerLead,
            ApproverRole::SalesManager,
        ] {
            quote
                .record_decision(
                    &mut round,
                    &Approver::new(UserId::new(), [role]),
                    Decision::Approve,
                    None,
                    ApprovalOrdering::Parallel,
                    Utc::now(),
                )
                .unwrap();
        }

        assert_eq!(quote.status(), QuoteStatus::Approved);
        assert_eq!(quote.approved_amount(), Some(dec!(60000)));
        assert!(quote.state().approved_at.is_some());
    }

    #[test]
    fn sequential_ordering_blocks_higher_levels() {
        let (mut quote, version) = create(dec!(20000));
        let mut round = quote
            .submit(&version, &ApprovalPolicy::default(), UserId::new(), Utc::now())
            .unwrap()
            .approvals;

        let err = quote
            .record_decision(
                &mut round,
                &Approver::new(UserId::new(), [ApproverRole::SalesManager]),
                Decision::Approve,
                None,
                ApprovalOrdering::Sequential,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, QuoteError::ApprovalOutOfOrder { level: 2 });
        assert!(round.iter().all(|a| a.is_pending()));
    }

    #[test]
    fn user_without_pending_row_is_refused() {
        let (mut quote, version) = create(dec!(100));
        let mut round = quote
            .submit(&version, &ApprovalPolicy::default(), UserId::new(), Utc::now())
            .unwrap()
            .approvals;
        let outsider = Approver::new(UserId::new(), [ApproverRole::SalesManager]);

        match quote.record_decision(
            &mut round,
            &outsider,
            Decision::Approve,
            None,
            ApprovalOrdering::Parallel,
            Utc::now(),
        ) {
            Err(QuoteError::NoPendingApprovalForUser(id)) if id == outsider.user_id => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn approved_quote_cannot_be_resubmitted_or_edited() {
        let (mut quote, version) = create(dec!(100));
        let mut round = quote
            .submit(&version, &ApprovalPolicy::default(), UserId::new(), Utc::now())
            .unwrap()
            .approvals;
        quote
            .record_decision(
                &mut round,
                &Approver::new(UserId::new(), [ApproverRole::EngineerLead]),
                Decision::Approve,
                None,
                ApprovalOrdering::Parallel,
                Utc::now(),
            )
            .unwrap();

        assert!(matches!(
            quote.submit(&version, &ApprovalPolicy::default(), UserId::new(), Utc::now()),
            Err(QuoteError::InvalidTransition { action: "submit", .. })
        ));
        assert!(matches!(
            quote.revise(version, QuoteChanges::default(), UserId::new(), Utc::now()),
            Err(QuoteError::NotEditable { .. })
        ));
    }

    #[test]
    fn rejected_quote_returns_to_draft_on_edit_and_resubmits_in_new_round() {
        let (mut quote, version) = create(dec!(100));
        let mut round = quote
            .submit(&version, &ApprovalPolicy::default(), UserId::new(), Utc::now())
            .unwrap()
            .approvals;
        quote
            .record_decision(
                &mut round,
                &Approver::new(UserId::new(), [ApproverRole::EngineerLead]),
                Decision::Reject,
                None,
                ApprovalOrdering::Parallel,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(quote.status(), QuoteStatus::Rejected);

        let rev = quote
            .revise(
                version,
                QuoteChanges {
                    items: Some(vec![item(1, dec!(12000))]),
                    new_version: true,
                    ..QuoteChanges::default()
                },
                UserId::new(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(quote.status(), QuoteStatus::Draft);
        assert_eq!(quote.total_amount(), dec!(12000));

        let sub = quote
            .submit(&rev.version, &ApprovalPolicy::default(), UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(quote.approval_round(), 2);
        assert!(sub.approvals.iter().all(|a| a.round == 2));
        assert_eq!(sub.approvals.len(), 2);
    }

    #[test]
    fn in_place_edit_keeps_items_when_none_supplied() {
        let (mut quote, version) = create(dec!(500));
        let before = version.items().to_vec();
        let rev = quote
            .revise(
                version,
                QuoteChanges {
                    payment_terms: Some("prepaid".to_string()),
                    validity_days: Some(14),
                    ..QuoteChanges::default()
                },
                UserId::new(),
                Utc::now(),
            )
            .unwrap();

        assert!(rev.superseded.is_none());
        assert_eq!(rev.version.items(), before.as_slice());
        assert_eq!(quote.current_version_number(), 1);
        assert_eq!(quote.header().validity_days, 14);
        assert_eq!(quote.header().payment_terms.as_deref(), Some("prepaid"));
    }

    #[test]
    fn stale_version_is_refused() {
        let (mut quote, version) = create(dec!(500));
        let stale = version.clone();
        quote
            .revise(
                version,
                QuoteChanges {
                    new_version: true,
                    ..QuoteChanges::default()
                },
                UserId::new(),
                Utc::now(),
            )
            .unwrap();

        assert!(matches!(
            quote.revise(stale, QuoteChanges::default(), UserId::new(), Utc::now()),
            Err(QuoteError::Invariant(_))
        ));
    }

    #[test]
    fn send_requires_approval() {
        let (mut quote, _) = create(dec!(100));
        assert!(matches!(
            quote.mark_sent("buyer@example.com", UserId::new(), Utc::now()),
            Err(QuoteError::InvalidTransition { action: "send", .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn new_versions_are_gap_free(n in 1usize..12) {
            let (mut quote, mut current) = create(dec!(10));
            let mut numbers = vec![current.version_number];
            for _ in 0..n {
                let rev = quote
                    .revise(
                        current,
                        QuoteChanges { new_version: true, ..QuoteChanges::default() },
                        UserId::new(),
                        Utc::now(),
                    )
                    .unwrap();
                let superseded = rev.superseded.unwrap();
                prop_assert!(!superseded.is_current);
                prop_assert!(rev.version.is_current);
                numbers.push(rev.version.version_number);
                current = rev.version;
            }
            let expected: Vec<u32> = (1..=(n as u32 + 1)).collect();
            prop_assert_eq!(numbers, expected);
            prop_assert_eq!(quote.current_version_number(), n as u32 + 1);
        }
    }
}
