use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo seeds and verification contract: a three-level reporting
/// chain with one expense in each workflow state.
const SEED_USERS: &[SeedUserContract] = &[
    SeedUserContract { id: "u-dana", email: "dana@example.com", role: "admin", manager_id: None },
    SeedUserContract {
        id: "u-carol",
        email: "carol@example.com",
        role: "finance",
        manager_id: None,
    },
    SeedUserContract {
        id: "u-bob",
        email: "bob@example.com",
        role: "approver",
        manager_id: Some("u-carol"),
    },
    SeedUserContract {
        id: "u-alice",
        email: "alice@example.com",
        role: "employee",
        manager_id: Some("u-bob"),
    },
];

const SEED_EXPENSES: &[SeedExpenseContract] = &[
    SeedExpenseContract {
        expense_id: "exp-alice-taxi",
        owner_id: "u-alice",
        approver_id: None,
        status: "draft",
        expected_line_count: 1,
        description: "Airport transfer draft, ready to submit",
    },
    SeedExpenseContract {
        expense_id: "exp-alice-hotel",
        owner_id: "u-alice",
        approver_id: Some("u-bob"),
        status: "submitted",
        expected_line_count: 2,
        description: "Conference stay awaiting first-level approval",
    },
    SeedExpenseContract {
        expense_id: "exp-bob-software",
        owner_id: "u-bob",
        approver_id: None,
        status: "approved",
        expected_line_count: 1,
        description: "Fully approved license renewal",
    },
];

const SEED_NOTIFICATION_IDS: &[&str] = &["ntf-seed-001", "ntf-seed-002"];

struct SeedUserContract {
    id: &'static str,
    email: &'static str,
    role: &'static str,
    manager_id: Option<&'static str>,
}

struct SeedExpenseContract {
    expense_id: &'static str,
    owner_id: &'static str,
    approver_id: Option<&'static str>,
    status: &'static str,
    expected_line_count: i64,
    description: &'static str,
}

#[derive(Clone, Debug)]
pub struct ExpenseSeedInfo {
    pub expense_id: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub users_seeded: usize,
    pub expenses_seeded: Vec<ExpenseSeedInfo>,
}

#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Demo dataset for the workflow walk-through and smoke checks.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Load the demo dataset in one transaction.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let expenses_seeded = SEED_EXPENSES
            .iter()
            .map(|expense| ExpenseSeedInfo {
                expense_id: expense.expense_id,
                status: expense.status,
                description: expense.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { users_seeded: SEED_USERS.len(), expenses_seeded })
    }

    /// Verify that the stored rows match the seed contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users
                 WHERE id = ?1 AND email = ?2 AND role = ?3
                   AND ((?4 IS NULL AND manager_id IS NULL) OR manager_id = ?4))",
            )
            .bind(user.id)
            .bind(user.email)
            .bind(user.role)
            .bind(user.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((user.id, present == 1));
        }

        for expense in SEED_EXPENSES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM expenses
                 WHERE id = ?1 AND owner_id = ?2 AND status = ?3
                   AND ((?4 IS NULL AND approver_id IS NULL) OR approver_id = ?4))",
            )
            .bind(expense.expense_id)
            .bind(expense.owner_id)
            .bind(expense.status)
            .bind(expense.approver_id)
            .fetch_one(pool)
            .await?;
            checks.push((expense.expense_id, present == 1));

            let line_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM expense_line_items WHERE expense_id = ?1",
            )
            .bind(expense.expense_id)
            .fetch_one(pool)
            .await?;
            checks.push((expense.description, line_count == expense.expected_line_count));
        }

        // The submitted seed must honor the routing invariant the engine
        // maintains at runtime.
        let consistent: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM expenses
             WHERE (status = 'submitted' AND approver_id IS NULL)
                OR (status != 'submitted' AND approver_id IS NOT NULL)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("routing-invariant", consistent == 0));

        let notification_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM notifications WHERE id IN ('ntf-seed-001', 'ntf-seed-002')",
        )
        .fetch_one(pool)
        .await?;
        checks.push((
            "submission-notifications",
            notification_count == SEED_NOTIFICATION_IDS.len() as i64,
        ));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[cfg(test)]
mod tests {
    use super::DemoSeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let result = DemoSeedDataset::load(&pool).await.expect("load");
        assert_eq!(result.users_seeded, 4);
        assert_eq!(result.expenses_seeded.len(), 3);

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(
            verification.all_present,
            "failed checks: {:?}",
            verification
                .checks
                .iter()
                .filter(|(_, passed)| !passed)
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        DemoSeedDataset::load(&pool).await.expect("first load");
        DemoSeedDataset::load(&pool).await.expect("second load");

        let users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.expect("count");
        assert_eq!(users, 4);
    }
}
