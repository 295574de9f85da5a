use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl ExpenseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Approved and rejected records accept no further engine transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub total_price: Decimal,
}

/// Parsed receipt handed over by the ingestion pipeline. The workflow
/// accepts it verbatim; no monetary consistency is checked at this
/// boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedReceipt {
    pub vendor: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub gl_code: Option<String>,
    pub description: Option<String>,
    pub receipt_filename: Option<String>,
    pub line_items: Vec<LineItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub owner_id: UserId,
    /// The one outstanding approver, present exactly while the record is
    /// submitted.
    pub approver_id: Option<UserId>,
    pub vendor: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub gl_code: Option<String>,
    pub description: Option<String>,
    pub receipt_filename: Option<String>,
    pub status: ExpenseStatus,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// A capture becomes an editable draft owned by the capturing user.
    pub fn draft(owner_id: UserId, capture: CapturedReceipt) -> Self {
        Self {
            id: ExpenseId::generate(),
            owner_id,
            approver_id: None,
            vendor: capture.vendor,
            date: capture.date,
            amount: capture.amount,
            currency: capture.currency,
            category: capture.category,
            gl_code: capture.gl_code,
            description: capture.description,
            receipt_filename: capture.receipt_filename,
            status: ExpenseStatus::Draft,
            line_items: capture.line_items,
            created_at: Utc::now(),
        }
    }

    pub fn can_transition_to(&self, next: ExpenseStatus) -> bool {
        matches!(
            (self.status, next),
            (ExpenseStatus::Draft, ExpenseStatus::Submitted)
                | (ExpenseStatus::Submitted, ExpenseStatus::Submitted)
                | (ExpenseStatus::Submitted, ExpenseStatus::Approved)
                | (ExpenseStatus::Submitted, ExpenseStatus::Rejected)
        )
    }

    /// `approver_id` is set exactly while the record is submitted.
    pub fn routing_is_consistent(&self) -> bool {
        self.approver_id.is_some() == (self.status == ExpenseStatus::Submitted)
    }

    pub fn line_item_total(&self) -> Decimal {
        self.line_items.iter().map(|item| item.total_price).sum()
    }

    /// Advisory only: line totals are never enforced against `amount` at
    /// ingestion or edit time. Dashboards use this to flag drift.
    pub fn lines_reconcile(&self) -> bool {
        self.line_items.is_empty() || self.line_item_total() == self.amount
    }
}
