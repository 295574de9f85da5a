use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::directory::OrgDirectory;
use crate::domain::expense::Expense;
use crate::domain::user::UserId;

/// One owner's expenses rolled up for dashboard consumption.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseReport {
    pub owner_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub items_count: usize,
    pub total_amount: Decimal,
    /// Earliest `created_at` across the grouped records.
    pub submitted_at: DateTime<Utc>,
    pub expenses: Vec<Expense>,
}

/// Group a flat collection of expenses into one report per owner.
///
/// Read-only: no state is touched. An owner missing from the directory is
/// skipped silently; the read side stays best-effort while the write side
/// stays strict.
pub fn build_reports(expenses: Vec<Expense>, directory: &OrgDirectory) -> Vec<ExpenseReport> {
    let mut grouped: HashMap<UserId, Vec<Expense>> = HashMap::new();
    for expense in expenses {
        grouped.entry(expense.owner_id.clone()).or_default().push(expense);
    }

    let mut reports = Vec::with_capacity(grouped.len());
    for (owner_id, mut items) in grouped {
        let Some(owner) = directory.get(&owner_id) else {
            continue;
        };

        items.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        let submitted_at = match items.first() {
            Some(earliest) => earliest.created_at,
            None => continue,
        };

        reports.push(ExpenseReport {
            owner_id,
            user_name: owner.display_name().to_string(),
            user_email: owner.email.clone(),
            items_count: items.len(),
            total_amount: items.iter().map(|item| item.amount).sum(),
            submitted_at,
            expenses: items,
        });
    }

    reports.sort_by(|left, right| left.user_email.cmp(&right.user_email));
    reports
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::directory::OrgDirectory;
    use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use crate::domain::user::{User, UserId, ROLE_EMPLOYEE};

    use super::build_reports;

    fn user(id: &str, email: &str) -> User {
        User {
            id: UserId(id.to_string()),
            email: email.to_string(),
            role: ROLE_EMPLOYEE.to_string(),
            manager_id: None,
            created_at: Utc::now(),
        }
    }

    fn expense(id: &str, owner: &str, cents: i64, age_hours: i64) -> Expense {
        Expense {
            id: ExpenseId(id.to_string()),
            owner_id: UserId(owner.to_string()),
            approver_id: None,
            vendor: "Vendor".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            amount: Decimal::new(cents, 2),
            currency: "USD".to_string(),
            category: "Meals".to_string(),
            gl_code: None,
            description: None,
            receipt_filename: None,
            status: ExpenseStatus::Approved,
            line_items: Vec::new(),
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[test]
    fn groups_by_owner_with_count_sum_and_earliest_timestamp() {
        let directory = OrgDirectory::new(vec![
            user("u-alice", "alice@example.com"),
            user("u-bob", "bob@example.com"),
        ]);
        let expenses = vec![
            expense("e-1", "u-alice", 1_000, 1),
            expense("e-2", "u-alice", 2_550, 48),
            expense("e-3", "u-bob", 700, 2),
        ];

        let reports = build_reports(expenses, &directory);

        assert_eq!(reports.len(), 2);
        let alice = &reports[0];
        assert_eq!(alice.user_email, "alice@example.com");
        assert_eq!(alice.user_name, "alice");
        assert_eq!(alice.items_count, 2);
        assert_eq!(alice.total_amount, Decimal::new(3_550, 2));
        // Oldest record provides the report timestamp.
        assert_eq!(alice.submitted_at, alice.expenses[0].created_at);
        assert_eq!(alice.expenses[0].id.0, "e-2");
    }

    #[test]
    fn unknown_owners_are_skipped_silently() {
        let directory = OrgDirectory::new(vec![user("u-alice", "alice@example.com")]);
        let expenses =
            vec![expense("e-1", "u-alice", 1_000, 1), expense("e-2", "u-ghost", 9_900, 1)];

        let reports = build_reports(expenses, &directory);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].owner_id, UserId("u-alice".to_string()));
    }

    #[test]
    fn empty_input_yields_no_reports() {
        let directory = OrgDirectory::new(vec![user("u-alice", "alice@example.com")]);
        assert!(build_reports(Vec::new(), &directory).is_empty());
    }
}
