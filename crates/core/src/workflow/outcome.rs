use serde::{Deserialize, Serialize};

use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::notification::Notification;

/// Result of a single-record transition: the updated record plus the
/// notifications that must be committed in the same atomic unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ExpenseStatus,
    pub to: ExpenseStatus,
    pub expense: Expense,
    pub notifications: Vec<Notification>,
}

/// Result of a batch action over one owner's pending records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub to: ExpenseStatus,
    pub expenses: Vec<Expense>,
    pub notifications: Vec<Notification>,
}
