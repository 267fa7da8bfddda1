//! Quote versions, line items and commercial terms.

use chrono::{DateTime, Utc};
use quoteforge_core::{
    CalculationId, Decimal, Entity, QuoteId, QuoteItemId, QuoteVersionId, TermTemplateId, UserId,
    round_money,
};
use serde::{Deserialize, Serialize};

use crate::error::QuoteError;

/// A line item whose unit price has been settled (explicitly or from a cost
/// calculation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub product_name: String,
    pub specification: Option<String>,
    pub quantity: i64,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub cost_calculation_id: Option<CalculationId>,
    pub notes: Option<String>,
}

/// Line item as supplied by a caller. The unit price may be omitted when a
/// cost calculation is linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    pub product_name: String,
    pub specification: Option<String>,
    pub quantity: i64,
    pub unit: Option<String>,
    pub unit_price: Option<Decimal>,
    pub cost_calculation_id: Option<CalculationId>,
    pub notes: Option<String>,
}

impl ItemInput {
    /// Settle the unit price; `linked_unit_price` is the linked calculation's
    /// selling price per unit.
    pub fn priced(
        self,
        line_no: u32,
        linked_unit_price: Option<Decimal>,
    ) -> Result<PricedItem, QuoteError> {
        let unit_price = self
            .unit_price
            .or(linked_unit_price)
            .ok_or_else(|| QuoteError::InvalidItem {
                line_no,
                reason: "unit price is required without a linked cost calculation".to_string(),
            })?;
        Ok(PricedItem {
            product_name: self.product_name,
            specification: self.specification,
            quantity: self.quantity,
            unit: self.unit,
            unit_price,
            cost_calculation_id: self.cost_calculation_id,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: QuoteItemId,
    pub version_id: QuoteVersionId,
    pub line_no: u32,
    pub product_name: String,
    pub specification: Option<String>,
    pub quantity: u32,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub cost_calculation_id: Option<CalculationId>,
    pub notes: Option<String>,
}

impl QuoteItem {
    fn from_priced(
        version_id: QuoteVersionId,
        line_no: u32,
        item: PricedItem,
    ) -> Result<Self, QuoteError> {
        if item.product_name.trim().is_empty() {
            return Err(QuoteError::InvalidItem {
                line_no,
                reason: "product name is required".to_string(),
            });
        }
        let quantity = i32::try_from(item.quantity)
            .ok()
            .filter(|q| *q > 0)
            .and_then(|q| u32::try_from(q).ok())
            .ok_or_else(|| QuoteError::InvalidItem {
                line_no,
                reason: format!("quantity must be positive (got {})", item.quantity),
            })?;
        if item.unit_price < Decimal::ZERO {
            return Err(QuoteError::InvalidItem {
                line_no,
                reason: format!("unit price must not be negative (got {})", item.unit_price),
            });
        }

        let unit_price = round_money(item.unit_price);
        Ok(Self {
            id: QuoteItemId::new(),
            version_id,
            line_no,
            product_name: item.product_name,
            specification: item.specification,
            quantity,
            unit: item.unit,
            unit_price,
            total_price: round_money(unit_price * Decimal::from(quantity)),
            cost_calculation_id: item.cost_calculation_id,
            notes: item.notes,
        })
    }
}

/// A commercial clause supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInput {
    pub title: String,
    pub content: String,
}

/// Default clause cloned into new quotes on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermTemplate {
    pub id: TermTemplateId,
    pub title: String,
    pub content: String,
    pub sort_order: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTerm {
    pub version_id: QuoteVersionId,
    pub sort_order: u32,
    pub title: String,
    pub content: String,
    pub template_id: Option<TermTemplateId>,
}

/// Snapshot of a quote's priced content.
///
/// Immutable once superseded: only the current version is ever edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteVersion {
    pub id: QuoteVersionId,
    pub quote_id: QuoteId,
    pub version_number: u32,
    pub is_current: bool,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    items: Vec<QuoteItem>,
    terms: Vec<QuoteTerm>,
}

impl Entity for QuoteVersion {
    type Id = QuoteVersionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl QuoteVersion {
    pub fn new(
        quote_id: QuoteId,
        version_number: u32,
        notes: Option<String>,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QuoteVersionId::new(),
            quote_id,
            version_number,
            is_current: true,
            notes,
            created_by,
            created_at,
            items: Vec::new(),
            terms: Vec::new(),
        }
    }

    /// Reassemble a stored version (store adapters only).
    pub fn restore(
        mut header: QuoteVersion,
        items: Vec<QuoteItem>,
        terms: Vec<QuoteTerm>,
    ) -> Self {
        header.items = items;
        header.terms = terms;
        header.items.sort_by_key(|i| i.line_no);
        header.terms.sort_by_key(|t| t.sort_order);
        header
    }

    /// A successor version carrying this version's items and terms.
    pub fn successor(
        &self,
        notes: Option<String>,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut next = Self::new(
            self.quote_id,
            self.version_number + 1,
            notes,
            created_by,
            created_at,
        );
        next.items = self
            .items
            .iter()
            .map(|i| QuoteItem {
                id: QuoteItemId::new(),
                version_id: next.id,
                ..i.clone()
            })
            .collect();
        next.terms = self
            .terms
            .iter()
            .map(|t| QuoteTerm {
                version_id: next.id,
                ..t.clone()
            })
            .collect();
        next
    }

    pub fn items(&self) -> &[QuoteItem] {
        &self.items
    }

    pub fn terms(&self) -> &[QuoteTerm] {
        &self.terms
    }

    /// Replace all line items (numbered 1..).
    pub fn replace_items(&mut self, items: Vec<PricedItem>) -> Result<(), QuoteError> {
        let items = items
            .into_iter()
            .zip(1u32..)
            .map(|(item, line_no)| QuoteItem::from_priced(self.id, line_no, item))
            .collect::<Result<Vec<_>, _>>()?;
        self.items = items;
        Ok(())
    }

    /// Replace all terms with explicitly supplied clauses.
    pub fn replace_terms(&mut self, terms: Vec<TermInput>) -> Result<(), QuoteError> {
        let mut out = Vec::with_capacity(terms.len());
        for (term, sort_order) in terms.into_iter().zip(1u32..) {
            if term.title.trim().is_empty() {
                return Err(QuoteError::InvalidTerm(format!(
                    "term {sort_order} has no title"
                )));
            }
            out.push(QuoteTerm {
                version_id: self.id,
                sort_order,
                title: term.title,
                content: term.content,
                template_id: None,
            });
        }
        self.terms = out;
        Ok(())
    }

    /// Replace all terms with copies of the active templates.
    pub fn clone_templates(&mut self, templates: &[TermTemplate]) {
        let mut active: Vec<&TermTemplate> = templates.iter().filter(|t| t.is_active).collect();
        active.sort_by_key(|t| t.sort_order);
        self.terms = active
            .into_iter()
            .zip(1u32..)
            .map(|(t, sort_order)| QuoteTerm {
                version_id: self.id,
                sort_order,
                title: t.title.clone(),
                content: t.content.clone(),
                template_id: Some(t.id),
            })
            .collect();
    }

    /// Sum of line totals.
    pub fn total(&self) -> Decimal {
        self.items.iter().map(|i| i.total_price).sum()
    }
}
