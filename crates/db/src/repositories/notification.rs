use chrono::{DateTime, Utc};
use sqlx::Row;

use outlay_core::domain::notification::{Notification, NotificationId, NotificationKind};
use outlay_core::domain::user::UserId;

use super::{NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_notification(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Notification, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let read: i64 = row.try_get("read").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = NotificationKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown notification kind `{kind_str}`")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at: {e}")))?;

    Ok(Notification {
        id: NotificationId(id),
        user_id: UserId(user_id),
        kind,
        title,
        message,
        read: read != 0,
        created_at,
    })
}

pub(crate) async fn insert_notification(
    conn: &mut sqlx::SqliteConnection,
    notification: &Notification,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, title, message, read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&notification.id.0)
    .bind(&notification.user_id.0)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(i64::from(notification.read))
    .bind(notification.created_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_notification(&mut conn, &notification).await
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, title, message, read, created_at
             FROM notifications
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0",
        )
        .bind(&user_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
            .bind(&id.0)
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(
        &self,
        id: &NotificationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
            .bind(&id.0)
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
