use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};

use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, LineItem};
use outlay_core::domain::user::UserId;

use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) const EXPENSE_COLUMNS: &str = "id, owner_id, approver_id, vendor, date, amount, \
     currency, category, gl_code, description, receipt_filename, status, created_at";

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse::<Decimal>().map_err(|e| RepositoryError::Decode(format!("{field}: {e}")))
}

fn parse_decimal_opt(field: &str, raw: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    raw.map(|value| parse_decimal(field, &value)).transpose()
}

pub(crate) fn row_to_expense(
    row: &sqlx::sqlite::SqliteRow,
    line_items: Vec<LineItem>,
) -> Result<Expense, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_id: String =
        row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_id: Option<String> =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let vendor: String =
        row.try_get("vendor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let date_str: String =
        row.try_get("date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_str: String =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let gl_code: Option<String> =
        row.try_get("gl_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let receipt_filename: Option<String> =
        row.try_get("receipt_filename").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = ExpenseStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown expense status `{status_str}`")))?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("date: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at: {e}")))?;

    Ok(Expense {
        id: ExpenseId(id),
        owner_id: UserId(owner_id),
        approver_id: approver_id.map(UserId),
        vendor,
        date,
        amount: parse_decimal("amount", &amount_str)?,
        currency,
        category,
        gl_code,
        description,
        receipt_filename,
        status,
        line_items,
        created_at,
    })
}

pub(crate) async fn fetch_line_items(
    conn: &mut SqliteConnection,
    expense_id: &str,
) -> Result<Vec<LineItem>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT description, quantity, unit_price, total_price
         FROM expense_line_items
         WHERE expense_id = ?
         ORDER BY position ASC",
    )
    .bind(expense_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let description: String =
                row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let quantity: Option<String> =
                row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let unit_price: Option<String> =
                row.try_get("unit_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let total_price: String =
                row.try_get("total_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;

            Ok(LineItem {
                description,
                quantity: parse_decimal_opt("quantity", quantity)?,
                unit_price: parse_decimal_opt("unit_price", unit_price)?,
                total_price: parse_decimal("total_price", &total_price)?,
            })
        })
        .collect()
}

pub(crate) async fn write_line_items(
    conn: &mut SqliteConnection,
    expense_id: &str,
    line_items: &[LineItem],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM expense_line_items WHERE expense_id = ?")
        .bind(expense_id)
        .execute(&mut *conn)
        .await?;

    for (position, item) in line_items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO expense_line_items (id, expense_id, position, description, quantity,
                                             unit_price, total_price)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(format!("{expense_id}-li-{position}"))
        .bind(expense_id)
        .bind(position as i64)
        .bind(&item.description)
        .bind(item.quantity.map(|value| value.to_string()))
        .bind(item.unit_price.map(|value| value.to_string()))
        .bind(item.total_price.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

impl SqlExpenseRepository {
    async fn list_where(
        &self,
        predicate: &str,
        binds: &[&str],
    ) -> Result<Vec<Expense>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE {predicate} ORDER BY created_at DESC"
        );
        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        let mut expenses = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let line_items = fetch_line_items(&mut conn, &id).await?;
            expenses.push(row_to_expense(row, line_items)?);
        }
        Ok(expenses)
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        let row =
            sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&mut *conn)
                .await?;

        match row {
            Some(ref r) => {
                let line_items = fetch_line_items(&mut conn, &id.0).await?;
                Ok(Some(row_to_expense(r, line_items)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO expenses (id, owner_id, approver_id, vendor, date, amount, currency,
                                   category, gl_code, description, receipt_filename, status,
                                   created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 approver_id = excluded.approver_id,
                 vendor = excluded.vendor,
                 date = excluded.date,
                 amount = excluded.amount,
                 currency = excluded.currency,
                 category = excluded.category,
                 gl_code = excluded.gl_code,
                 description = excluded.description,
                 receipt_filename = excluded.receipt_filename,
                 status = excluded.status",
        )
        .bind(&expense.id.0)
        .bind(&expense.owner_id.0)
        .bind(expense.approver_id.as_ref().map(|id| id.0.as_str()))
        .bind(&expense.vendor)
        .bind(expense.date.format("%Y-%m-%d").to_string())
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(expense.gl_code.as_deref())
        .bind(expense.description.as_deref())
        .bind(expense.receipt_filename.as_deref())
        .bind(expense.status.as_str())
        .bind(expense.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        write_line_items(&mut tx, &expense.id.0, &expense.line_items).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &ExpenseId) -> Result<(), RepositoryError> {
        // Line items go with the parent via ON DELETE CASCADE.
        sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_owner(&self, owner_id: &UserId) -> Result<Vec<Expense>, RepositoryError> {
        self.list_where("owner_id = ?", &[owner_id.0.as_str()]).await
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        self.list_where("status = 'submitted' AND approver_id = ?", &[approver_id.0.as_str()])
            .await
    }

    async fn list_approved(&self) -> Result<Vec<Expense>, RepositoryError> {
        self.list_where("status = 'approved' AND approver_id IS NULL", &[]).await
    }

    async fn list_approved_for_owner(
        &self,
        owner_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        self.list_where("status = 'approved' AND owner_id = ?", &[owner_id.0.as_str()]).await
    }
}
