use chrono::Utc;
use rust_decimal::Decimal;

use crate::commands::CommandResult;
use outlay_core::domain::expense::{CapturedReceipt, Expense, LineItem};
use outlay_core::domain::user::UserId;
use outlay_db::repositories::{
    ExpenseRepository, NewUser, NotificationRepository, SqlExpenseRepository,
    SqlNotificationRepository, SqlUserRepository, UserRepository,
};
use outlay_db::{connect_with_settings, migrations, WorkflowService};

/// Walks one expense through the full chain (employee -> manager ->
/// director) against a throwaway in-memory database and reports every hop.
pub fn run() -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "demo",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(drive_chain());

    match result {
        Ok(lines) => CommandResult::success("demo", lines.join("\n")),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("demo", error_class, message, exit_code)
        }
    }
}

async fn drive_chain() -> Result<Vec<String>, (&'static str, String, u8)> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;

    let users = SqlUserRepository::new(pool.clone());
    let carol = users
        .create(NewUser { email: "carol@example.com".to_string(), manager_id: None })
        .await
        .map_err(|error| ("setup", error.to_string(), 6u8))?;
    let bob = users
        .create(NewUser { email: "bob@example.com".to_string(), manager_id: Some(carol.id.clone()) })
        .await
        .map_err(|error| ("setup", error.to_string(), 6u8))?;
    let alice = users
        .create(NewUser { email: "alice@example.com".to_string(), manager_id: Some(bob.id.clone()) })
        .await
        .map_err(|error| ("setup", error.to_string(), 6u8))?;

    let expenses = SqlExpenseRepository::new(pool.clone());
    let draft = demo_draft(alice.id.clone());
    let expense_id = draft.id.clone();
    expenses.save(draft).await.map_err(|error| ("setup", error.to_string(), 6u8))?;

    let service = WorkflowService::new(pool.clone());
    let mut lines = Vec::new();

    let submitted = service
        .submit_expense(&expense_id, &alice.id)
        .await
        .map_err(|error| ("workflow", error.to_string(), 6u8))?;
    lines.push(format!(
        "alice submitted {} -> status={}, approver=bob",
        submitted.id,
        submitted.status.as_str()
    ));

    let rerouted = service
        .approve_expense(&expense_id, &bob.id)
        .await
        .map_err(|error| ("workflow", error.to_string(), 6u8))?;
    lines.push(format!(
        "bob approved -> status={}, escalated to carol",
        rerouted.status.as_str()
    ));

    let finalized = service
        .approve_expense(&expense_id, &carol.id)
        .await
        .map_err(|error| ("workflow", error.to_string(), 6u8))?;
    lines.push(format!(
        "carol approved -> status={}, chain exhausted",
        finalized.status.as_str()
    ));

    let notifications = SqlNotificationRepository::new(pool.clone());
    for (label, id) in [("alice", &alice.id), ("bob", &bob.id), ("carol", &carol.id)] {
        let unread = notifications
            .unread_count(id)
            .await
            .map_err(|error| ("workflow", error.to_string(), 6u8))?;
        lines.push(format!("{label}: {unread} unread notifications"));
    }

    pool.close().await;
    Ok(lines)
}

fn demo_draft(owner: UserId) -> Expense {
    // Stands in for the receipt ingestion pipeline's output.
    Expense::draft(
        owner,
        CapturedReceipt {
            vendor: "Transit Rail".to_string(),
            date: Utc::now().date_naive(),
            amount: Decimal::new(8_650, 2),
            currency: "USD".to_string(),
            category: "Travel".to_string(),
            gl_code: Some("6200".to_string()),
            description: Some("Site visit".to_string()),
            receipt_filename: None,
            line_items: vec![LineItem {
                description: "Return ticket".to_string(),
                quantity: Some(Decimal::new(1, 0)),
                unit_price: Some(Decimal::new(8_650, 2)),
                total_price: Decimal::new(8_650, 2),
            }],
        },
    )
}
