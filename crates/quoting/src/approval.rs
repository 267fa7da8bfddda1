//! Amount-tiered approval chain.

use chrono::{DateTime, Utc};
use quoteforge_core::{ApprovalId, Decimal, Entity, QuoteId, QuoteVersionId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    EngineerLead,
    SalesManager,
    GeneralManager,
}

impl ApproverRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ApproverRole::EngineerLead => "engineer_lead",
            ApproverRole::SalesManager => "sales_manager",
            ApproverRole::GeneralManager => "general_manager",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "engineer_lead" => Some(ApproverRole::EngineerLead),
            "sales_manager" => Some(ApproverRole::SalesManager),
            "general_manager" => Some(ApproverRole::GeneralManager),
            _ => None,
        }
    }
}

impl core::fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl core::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether higher levels may act before lower levels have approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalOrdering {
    /// Any level with a pending row may act.
    #[default]
    Parallel,
    /// A level may act only once every lower level of the round approved.
    Sequential,
}

impl ApprovalOrdering {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parallel" => Some(ApprovalOrdering::Parallel),
            "sequential" => Some(ApprovalOrdering::Sequential),
            _ => None,
        }
    }
}

/// Thresholds deciding how many levels a quote total requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub sales_manager_threshold: Decimal,
    pub general_manager_threshold: Decimal,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            sales_manager_threshold: Decimal::from(10_000),
            general_manager_threshold: Decimal::from(50_000),
        }
    }
}

impl ApprovalPolicy {
    /// Roles required for `amount`, lowest level first.
    pub fn required_roles(&self, amount: Decimal) -> Vec<ApproverRole> {
        let mut roles = vec![ApproverRole::EngineerLead];
        if amount >= self.sales_manager_threshold {
            roles.push(ApproverRole::SalesManager);
        }
        if amount >= self.general_manager_threshold {
            roles.push(ApproverRole::GeneralManager);
        }
        roles
    }
}

/// Acting user together with the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub user_id: UserId,
    pub roles: Vec<ApproverRole>,
}

impl Approver {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = ApproverRole>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn holds(&self, role: ApproverRole) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// One required sign-off for a quote version in a submission round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteApproval {
    pub id: ApprovalId,
    pub quote_id: QuoteId,
    pub version_id: QuoteVersionId,
    pub round: u32,
    pub level: u32,
    pub required_role: ApproverRole,
    pub status: ApprovalStatus,
    pub approver_id: Option<UserId>,
    pub notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Entity for QuoteApproval {
    type Id = ApprovalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl QuoteApproval {
    pub fn pending(
        quote_id: QuoteId,
        version_id: QuoteVersionId,
        round: u32,
        level: u32,
        required_role: ApproverRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApprovalId::new(),
            quote_id,
            version_id,
            round,
            level,
            required_role,
            status: ApprovalStatus::Pending,
            approver_id: None,
            notes: None,
            decided_at: None,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub(crate) fn decide(
        &mut self,
        decision: Decision,
        approver: UserId,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = match decision {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        };
        self.approver_id = Some(approver);
        self.notes = notes;
        self.decided_at = Some(at);
    }
}

/// Combined state of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Pending,
    Approved,
    Rejected,
}

/// Any rejection rejects the chain; otherwise it is approved once every
/// level is approved.
pub fn evaluate_chain(approvals: &[QuoteApproval]) -> ChainOutcome {
    if approvals
        .iter()
        .any(|a| a.status == ApprovalStatus::Rejected)
    {
        ChainOutcome::Rejected
    } else if !approvals.is_empty()
        && approvals
            .iter()
            .all(|a| a.status == ApprovalStatus::Approved)
    {
        ChainOutcome::Approved
    } else {
        ChainOutcome::Pending
    }
}
