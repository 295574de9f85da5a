use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{info, warn};

use outlay_core::directory::OrgDirectory;
use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use outlay_core::domain::user::{User, UserId};
use outlay_core::errors::WorkflowError;
use outlay_core::report::{build_reports, ExpenseReport};
use outlay_core::workflow::ApprovalEngine;

use crate::repositories::expense::{
    fetch_line_items, row_to_expense, SqlExpenseRepository, EXPENSE_COLUMNS,
};
use crate::repositories::notification::insert_notification;
use crate::repositories::user::row_to_user;
use crate::repositories::{ExpenseRepository, RepositoryError, SqlUserRepository, UserRepository};
use crate::DbPool;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("expense `{0}` was not found")]
    ExpenseNotFound(ExpenseId),
    #[error("user `{0}` was not found")]
    UserNotFound(UserId),
}

impl From<sqlx::Error> for ServiceError {
    fn from(value: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(value))
    }
}

/// Transactional boundary around the pure approval engine.
///
/// Every mutating call runs as one transaction: read the record(s) and the
/// current user set, let the engine decide, write the transition with a
/// guarded update, insert the notifications, commit. A failure anywhere
/// rolls the whole unit back, so a status change can never outrun its
/// notifications.
pub struct WorkflowService {
    pool: DbPool,
    engine: ApprovalEngine,
}

impl WorkflowService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, engine: ApprovalEngine::new() }
    }

    pub async fn submit_expense(
        &self,
        expense_id: &ExpenseId,
        acting_user_id: &UserId,
    ) -> Result<Expense, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let acting = load_user_required(&mut tx, acting_user_id).await?;
        let expense = load_expense_required(&mut tx, expense_id).await?;
        let directory = load_directory(&mut tx).await?;

        let outcome = match self.engine.submit(expense, &acting, &directory) {
            Ok(outcome) => outcome,
            Err(error) => return Err(rejected("submit", expense_id, acting_user_id, error)),
        };

        guarded_update(&mut tx, &outcome.expense, "submit", ExpenseStatus::Draft, None).await?;
        for notification in &outcome.notifications {
            insert_notification(&mut tx, notification).await?;
        }
        tx.commit().await?;

        applied("submit", &outcome.expense, acting_user_id, outcome.notifications.len());
        Ok(outcome.expense)
    }

    pub async fn approve_expense(
        &self,
        expense_id: &ExpenseId,
        acting_user_id: &UserId,
    ) -> Result<Expense, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let acting = load_user_required(&mut tx, acting_user_id).await?;
        let expense = load_expense_required(&mut tx, expense_id).await?;
        let directory = load_directory(&mut tx).await?;

        let outcome = match self.engine.approve_single(expense, &acting, &directory) {
            Ok(outcome) => outcome,
            Err(error) => return Err(rejected("approve", expense_id, acting_user_id, error)),
        };

        guarded_update(
            &mut tx,
            &outcome.expense,
            "approve",
            ExpenseStatus::Submitted,
            Some(&acting.id),
        )
        .await?;
        for notification in &outcome.notifications {
            insert_notification(&mut tx, notification).await?;
        }
        tx.commit().await?;

        applied("approve", &outcome.expense, acting_user_id, outcome.notifications.len());
        Ok(outcome.expense)
    }

    pub async fn reject_expense(
        &self,
        expense_id: &ExpenseId,
        acting_user_id: &UserId,
        reason: &str,
    ) -> Result<Expense, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let acting = load_user_required(&mut tx, acting_user_id).await?;
        let expense = load_expense_required(&mut tx, expense_id).await?;

        let outcome = match self.engine.reject_single(expense, &acting, reason) {
            Ok(outcome) => outcome,
            Err(error) => return Err(rejected("reject", expense_id, acting_user_id, error)),
        };

        guarded_update(
            &mut tx,
            &outcome.expense,
            "reject",
            ExpenseStatus::Submitted,
            Some(&acting.id),
        )
        .await?;
        for notification in &outcome.notifications {
            insert_notification(&mut tx, notification).await?;
        }
        tx.commit().await?;

        applied("reject", &outcome.expense, acting_user_id, outcome.notifications.len());
        Ok(outcome.expense)
    }

    /// Approve every submitted expense of `owner_id` currently routed to
    /// the acting approver. Batch approval finalizes; it never escalates.
    pub async fn approve_all_for_owner(
        &self,
        owner_id: &UserId,
        acting_user_id: &UserId,
    ) -> Result<Vec<Expense>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let acting = load_user_required(&mut tx, acting_user_id).await?;
        let candidates = load_awaiting(&mut tx, owner_id, &acting.id).await?;

        let outcome = match self.engine.approve_all_for_owner(candidates, owner_id, &acting) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    event_name = "workflow.batch_rejected",
                    owner_id = %owner_id,
                    actor = %acting_user_id,
                    error = %error,
                    "batch approval rejected"
                );
                return Err(error.into());
            }
        };

        for expense in &outcome.expenses {
            guarded_update(&mut tx, expense, "approve", ExpenseStatus::Submitted, Some(&acting.id))
                .await?;
        }
        for notification in &outcome.notifications {
            insert_notification(&mut tx, notification).await?;
        }
        tx.commit().await?;

        info!(
            event_name = "workflow.batch_applied",
            owner_id = %owner_id,
            actor = %acting_user_id,
            operation = "approve",
            items = outcome.expenses.len(),
            notifications = outcome.notifications.len(),
            "batch approval applied"
        );
        Ok(outcome.expenses)
    }

    /// Reject every submitted expense of `owner_id` currently routed to
    /// the acting approver, with one shared reason.
    pub async fn reject_all_for_owner(
        &self,
        owner_id: &UserId,
        acting_user_id: &UserId,
        reason: &str,
    ) -> Result<Vec<Expense>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let acting = load_user_required(&mut tx, acting_user_id).await?;
        let candidates = load_awaiting(&mut tx, owner_id, &acting.id).await?;

        let outcome = match self.engine.reject_all_for_owner(candidates, owner_id, &acting, reason)
        {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    event_name = "workflow.batch_rejected",
                    owner_id = %owner_id,
                    actor = %acting_user_id,
                    error = %error,
                    "batch rejection rejected"
                );
                return Err(error.into());
            }
        };

        for expense in &outcome.expenses {
            guarded_update(&mut tx, expense, "reject", ExpenseStatus::Submitted, Some(&acting.id))
                .await?;
        }
        for notification in &outcome.notifications {
            insert_notification(&mut tx, notification).await?;
        }
        tx.commit().await?;

        info!(
            event_name = "workflow.batch_applied",
            owner_id = %owner_id,
            actor = %acting_user_id,
            operation = "reject",
            items = outcome.expenses.len(),
            notifications = outcome.notifications.len(),
            "batch rejection applied"
        );
        Ok(outcome.expenses)
    }

    /// Owner's own records, newest first.
    pub async fn my_expenses(&self, owner_id: &UserId) -> Result<Vec<Expense>, ServiceError> {
        let repo = SqlExpenseRepository::new(self.pool.clone());
        Ok(repo.list_for_owner(owner_id).await?)
    }

    /// Grouped pending reports for one approver's dashboard.
    pub async fn pending_reports_for(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<ExpenseReport>, ServiceError> {
        let expense_repo = SqlExpenseRepository::new(self.pool.clone());
        let user_repo = SqlUserRepository::new(self.pool.clone());
        let expenses = expense_repo.list_pending_for_approver(approver_id).await?;
        let users = user_repo.list_all().await?;
        Ok(build_reports(expenses, &OrgDirectory::new(users)))
    }

    /// Grouped fully-approved reports.
    pub async fn approved_reports(&self) -> Result<Vec<ExpenseReport>, ServiceError> {
        let expense_repo = SqlExpenseRepository::new(self.pool.clone());
        let user_repo = SqlUserRepository::new(self.pool.clone());
        let expenses = expense_repo.list_approved().await?;
        let users = user_repo.list_all().await?;
        Ok(build_reports(expenses, &OrgDirectory::new(users)))
    }

    /// Boundary for the export renderer: one owner's approved records with
    /// line items and owner email. Read-only; rendering never feeds back.
    pub async fn approved_for_export(
        &self,
        owner_id: &UserId,
    ) -> Result<Option<ExpenseReport>, ServiceError> {
        let expense_repo = SqlExpenseRepository::new(self.pool.clone());
        let user_repo = SqlUserRepository::new(self.pool.clone());
        let expenses = expense_repo.list_approved_for_owner(owner_id).await?;
        let users = user_repo.list_all().await?;
        let mut reports = build_reports(expenses, &OrgDirectory::new(users));
        Ok(if reports.is_empty() { None } else { Some(reports.remove(0)) })
    }
}

fn rejected(
    operation: &'static str,
    expense_id: &ExpenseId,
    actor: &UserId,
    error: WorkflowError,
) -> ServiceError {
    warn!(
        event_name = "workflow.transition_rejected",
        expense_id = %expense_id,
        actor = %actor,
        operation,
        error = %error,
        "expense transition rejected"
    );
    error.into()
}

fn applied(operation: &'static str, expense: &Expense, actor: &UserId, notifications: usize) {
    info!(
        event_name = "workflow.transition_applied",
        expense_id = %expense.id,
        actor = %actor,
        operation,
        to = expense.status.as_str(),
        notifications,
        "expense transition applied"
    );
}

async fn load_user_required(
    conn: &mut SqliteConnection,
    id: &UserId,
) -> Result<User, ServiceError> {
    let row = sqlx::query("SELECT id, email, role, manager_id, created_at FROM users WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(ref r) => Ok(row_to_user(r)?),
        None => Err(ServiceError::UserNotFound(id.clone())),
    }
}

async fn load_directory(conn: &mut SqliteConnection) -> Result<OrgDirectory, ServiceError> {
    let rows = sqlx::query("SELECT id, email, role, manager_id, created_at FROM users")
        .fetch_all(conn)
        .await?;
    let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
    Ok(OrgDirectory::new(users))
}

async fn load_expense_required(
    conn: &mut SqliteConnection,
    id: &ExpenseId,
) -> Result<Expense, ServiceError> {
    let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(ref r) => {
            let line_items = fetch_line_items(conn, &id.0).await?;
            Ok(row_to_expense(r, line_items)?)
        }
        None => Err(ServiceError::ExpenseNotFound(id.clone())),
    }
}

/// The batch selection: submitted records of one owner currently routed to
/// the acting approver.
async fn load_awaiting(
    conn: &mut SqliteConnection,
    owner_id: &UserId,
    approver_id: &UserId,
) -> Result<Vec<Expense>, ServiceError> {
    let rows = sqlx::query(&format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses
         WHERE owner_id = ? AND status = 'submitted' AND approver_id = ?
         ORDER BY created_at ASC"
    ))
    .bind(&owner_id.0)
    .bind(&approver_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut expenses = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String =
            sqlx::Row::try_get(row, "id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let line_items = fetch_line_items(conn, &id).await?;
        expenses.push(row_to_expense(row, line_items)?);
    }
    Ok(expenses)
}

/// Compare-and-set write for a transition computed by the engine. The
/// predicate repeats the legality gate, so a transition raced out by a
/// concurrent commit misses the guard instead of overwriting it.
async fn guarded_update(
    conn: &mut SqliteConnection,
    expense: &Expense,
    operation: &'static str,
    guard_from: ExpenseStatus,
    guard_approver: Option<&UserId>,
) -> Result<(), ServiceError> {
    let result = match guard_approver {
        Some(approver) => {
            sqlx::query(
                "UPDATE expenses SET status = ?, approver_id = ?
                 WHERE id = ? AND status = ? AND approver_id = ?",
            )
            .bind(expense.status.as_str())
            .bind(expense.approver_id.as_ref().map(|id| id.0.as_str()))
            .bind(&expense.id.0)
            .bind(guard_from.as_str())
            .bind(&approver.0)
            .execute(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE expenses SET status = ?, approver_id = ?
                 WHERE id = ? AND status = ? AND approver_id IS NULL",
            )
            .bind(expense.status.as_str())
            .bind(expense.approver_id.as_ref().map(|id| id.0.as_str()))
            .bind(&expense.id.0)
            .bind(guard_from.as_str())
            .execute(&mut *conn)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        let actual = current_status(conn, &expense.id).await?;
        return Err(WorkflowError::InvalidState { operation, actual }.into());
    }
    Ok(())
}

async fn current_status(
    conn: &mut SqliteConnection,
    id: &ExpenseId,
) -> Result<ExpenseStatus, ServiceError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM expenses WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match status {
        Some(raw) => ExpenseStatus::parse(&raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown expense status `{raw}`")).into()),
        None => Err(ServiceError::ExpenseNotFound(id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, LineItem};
    use outlay_core::domain::user::{User, UserId};
    use outlay_core::errors::WorkflowError;

    use super::{ServiceError, WorkflowService};
    use crate::repositories::{
        ExpenseRepository, NewUser, NotificationRepository, SqlExpenseRepository,
        SqlNotificationRepository, SqlUserRepository, UserRepository,
    };
    use crate::{connect_with_settings, migrations};

    struct Harness {
        pool: sqlx::SqlitePool,
        service: WorkflowService,
        alice: User,
        bob: User,
        carol: User,
    }

    /// alice reports to bob, bob reports to carol.
    async fn harness() -> Harness {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let users = SqlUserRepository::new(pool.clone());
        let carol = users
            .create(NewUser { email: "carol@example.com".to_string(), manager_id: None })
            .await
            .expect("create carol");
        let bob = users
            .create(NewUser {
                email: "bob@example.com".to_string(),
                manager_id: Some(carol.id.clone()),
            })
            .await
            .expect("create bob");
        let alice = users
            .create(NewUser {
                email: "alice@example.com".to_string(),
                manager_id: Some(bob.id.clone()),
            })
            .await
            .expect("create alice");

        Harness { service: WorkflowService::new(pool.clone()), pool, alice, bob, carol }
    }

    async fn insert_draft(harness: &Harness, id: &str, owner: &UserId) -> ExpenseId {
        let repo = SqlExpenseRepository::new(harness.pool.clone());
        let expense = Expense {
            id: ExpenseId(id.to_string()),
            owner_id: owner.clone(),
            approver_id: None,
            vendor: "Corner Deli".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 6).unwrap(),
            amount: Decimal::new(1_875, 2),
            currency: "USD".to_string(),
            category: "Meals".to_string(),
            gl_code: Some("6410".to_string()),
            description: None,
            receipt_filename: None,
            status: ExpenseStatus::Draft,
            line_items: vec![LineItem {
                description: "Sandwiches".to_string(),
                quantity: Some(Decimal::new(3, 0)),
                unit_price: Some(Decimal::new(625, 2)),
                total_price: Decimal::new(1_875, 2),
            }],
            created_at: Utc::now(),
        };
        repo.save(expense).await.expect("insert draft");
        ExpenseId(id.to_string())
    }

    #[tokio::test]
    async fn submit_routes_and_notifies_atomically() {
        let harness = harness().await;
        let expense_id = insert_draft(&harness, "e-1", &harness.alice.id).await;

        let submitted = harness
            .service
            .submit_expense(&expense_id, &harness.alice.id)
            .await
            .expect("submit");

        assert_eq!(submitted.status, ExpenseStatus::Submitted);
        assert_eq!(submitted.approver_id, Some(harness.bob.id.clone()));

        let notifications = SqlNotificationRepository::new(harness.pool.clone());
        assert_eq!(notifications.unread_count(&harness.alice.id).await.expect("count"), 1);
        assert_eq!(notifications.unread_count(&harness.bob.id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn failed_operations_write_nothing() {
        let harness = harness().await;
        let expense_id = insert_draft(&harness, "e-1", &harness.alice.id).await;

        // bob does not own the draft; the submit must fail closed.
        let error = harness
            .service
            .submit_expense(&expense_id, &harness.bob.id)
            .await
            .expect_err("not the owner");
        assert!(matches!(error, ServiceError::Workflow(WorkflowError::NotOwner { .. })));

        let repo = SqlExpenseRepository::new(harness.pool.clone());
        let untouched = repo.find_by_id(&expense_id).await.expect("find").expect("exists");
        assert_eq!(untouched.status, ExpenseStatus::Draft);
        assert!(untouched.approver_id.is_none());

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&harness.pool)
            .await
            .expect("count");
        assert_eq!(total, 0, "no notification may outlive a rolled-back transition");
    }

    #[tokio::test]
    async fn approvals_walk_the_chain_then_finalize() {
        let harness = harness().await;
        let expense_id = insert_draft(&harness, "e-1", &harness.alice.id).await;

        harness.service.submit_expense(&expense_id, &harness.alice.id).await.expect("submit");

        let rerouted = harness
            .service
            .approve_expense(&expense_id, &harness.bob.id)
            .await
            .expect("bob approves");
        assert_eq!(rerouted.status, ExpenseStatus::Submitted);
        assert_eq!(rerouted.approver_id, Some(harness.carol.id.clone()));

        let finalized = harness
            .service
            .approve_expense(&expense_id, &harness.carol.id)
            .await
            .expect("carol finalizes");
        assert_eq!(finalized.status, ExpenseStatus::Approved);
        assert!(finalized.approver_id.is_none());

        // Terminal: nothing further is legal.
        let error = harness
            .service
            .approve_expense(&expense_id, &harness.carol.id)
            .await
            .expect_err("terminal record");
        assert!(matches!(
            error,
            ServiceError::Workflow(WorkflowError::InvalidState {
                actual: ExpenseStatus::Approved,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn stale_approver_is_refused() {
        let harness = harness().await;
        let expense_id = insert_draft(&harness, "e-1", &harness.alice.id).await;
        harness.service.submit_expense(&expense_id, &harness.alice.id).await.expect("submit");

        // carol is up the chain but the record is on bob's desk.
        let error = harness
            .service
            .approve_expense(&expense_id, &harness.carol.id)
            .await
            .expect_err("not the routed approver");
        assert!(matches!(
            error,
            ServiceError::Workflow(WorkflowError::NotAuthorizedApprover { .. })
        ));
    }

    #[tokio::test]
    async fn batch_approval_finalizes_only_the_actors_desk() {
        let harness = harness().await;
        let first = insert_draft(&harness, "e-1", &harness.alice.id).await;
        let second = insert_draft(&harness, "e-2", &harness.alice.id).await;
        let third = insert_draft(&harness, "e-3", &harness.alice.id).await;

        harness.service.submit_expense(&first, &harness.alice.id).await.expect("submit 1");
        harness.service.submit_expense(&second, &harness.alice.id).await.expect("submit 2");
        harness.service.submit_expense(&third, &harness.alice.id).await.expect("submit 3");
        // Escalate one record to carol; it must not be touched by bob's batch.
        harness.service.approve_expense(&third, &harness.bob.id).await.expect("escalate");

        let approved = harness
            .service
            .approve_all_for_owner(&harness.alice.id, &harness.bob.id)
            .await
            .expect("batch approve");

        assert_eq!(approved.len(), 2);
        assert!(approved
            .iter()
            .all(|e| e.status == ExpenseStatus::Approved && e.approver_id.is_none()));

        let repo = SqlExpenseRepository::new(harness.pool.clone());
        let escalated = repo.find_by_id(&third).await.expect("find").expect("exists");
        assert_eq!(escalated.status, ExpenseStatus::Submitted);
        assert_eq!(escalated.approver_id, Some(harness.carol.id.clone()));
    }

    #[tokio::test]
    async fn empty_batch_is_surfaced_without_writes() {
        let harness = harness().await;

        let error = harness
            .service
            .approve_all_for_owner(&harness.alice.id, &harness.bob.id)
            .await
            .expect_err("nothing pending");
        assert!(matches!(error, ServiceError::Workflow(WorkflowError::NothingToApprove { .. })));

        let error = harness
            .service
            .reject_all_for_owner(&harness.alice.id, &harness.bob.id, "late")
            .await
            .expect_err("nothing pending");
        assert!(matches!(error, ServiceError::Workflow(WorkflowError::NothingToReject { .. })));
    }

    #[tokio::test]
    async fn rejection_reason_reaches_the_owner() {
        let harness = harness().await;
        let expense_id = insert_draft(&harness, "e-1", &harness.alice.id).await;
        harness.service.submit_expense(&expense_id, &harness.alice.id).await.expect("submit");

        let rejected = harness
            .service
            .reject_expense(&expense_id, &harness.bob.id, "missing receipt")
            .await
            .expect("reject");
        assert_eq!(rejected.status, ExpenseStatus::Rejected);
        assert!(rejected.approver_id.is_none());

        let notifications = SqlNotificationRepository::new(harness.pool.clone());
        let inbox = notifications.list_for_user(&harness.alice.id).await.expect("inbox");
        assert!(inbox.iter().any(|n| n.message.contains("missing receipt")));
    }

    #[tokio::test]
    async fn reports_group_dashboard_queries_by_owner() {
        let harness = harness().await;
        let first = insert_draft(&harness, "e-1", &harness.alice.id).await;
        let second = insert_draft(&harness, "e-2", &harness.alice.id).await;

        harness.service.submit_expense(&first, &harness.alice.id).await.expect("submit 1");
        harness.service.submit_expense(&second, &harness.alice.id).await.expect("submit 2");

        let pending = harness
            .service
            .pending_reports_for(&harness.bob.id)
            .await
            .expect("pending reports");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_email, "alice@example.com");
        assert_eq!(pending[0].items_count, 2);
        assert_eq!(pending[0].total_amount, Decimal::new(3_750, 2));

        harness
            .service
            .approve_all_for_owner(&harness.alice.id, &harness.bob.id)
            .await
            .expect("batch approve");

        let approved = harness.service.approved_reports().await.expect("approved reports");
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].items_count, 2);

        let export = harness
            .service
            .approved_for_export(&harness.alice.id)
            .await
            .expect("export query")
            .expect("report exists");
        assert_eq!(export.user_email, "alice@example.com");
        assert_eq!(export.expenses.len(), 2);
        assert!(!export.expenses[0].line_items.is_empty(), "export carries line items");
    }
}
