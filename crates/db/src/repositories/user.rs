use chrono::{DateTime, Utc};
use sqlx::Row;

use outlay_core::domain::user::{User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub manager_id: Option<UserId>,
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at: {e}")))?;

    Ok(User { id: UserId(id), email, role, manager_id: manager_id.map(UserId), created_at })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The emptiness check and the insert share one transaction so two
        // racing registrations cannot both claim the bootstrap admin role.
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&mut *tx).await?;

        let user = User {
            id: UserId::generate(),
            email: new_user.email,
            role: User::bootstrap_role(existing == 0).to_string(),
            manager_id: new_user.manager_id,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, email, role, manager_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id.0)
        .bind(&user.email)
        .bind(&user.role)
        .bind(user.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, role, manager_id, created_at FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, role, manager_id, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, email, role, manager_id, created_at FROM users ORDER BY email ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn set_role(&self, id: &UserId, role: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_manager(
        &self,
        id: &UserId,
        manager_id: Option<&UserId>,
    ) -> Result<(), RepositoryError> {
        if manager_id == Some(id) {
            return Err(RepositoryError::Integrity(format!(
                "user `{id}` cannot be their own manager"
            )));
        }

        sqlx::query("UPDATE users SET manager_id = ? WHERE id = ?")
            .bind(manager_id.map(|m| m.0.as_str()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use outlay_core::domain::user::{ROLE_ADMIN, ROLE_APPROVER, ROLE_EMPLOYEE};

    use super::{NewUser, SqlUserRepository};
    use crate::repositories::{RepositoryError, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn first_user_is_elevated_to_admin() {
        let repo = SqlUserRepository::new(setup().await);

        let first = repo
            .create(NewUser { email: "dana@example.com".to_string(), manager_id: None })
            .await
            .expect("create first");
        let second = repo
            .create(NewUser { email: "alice@example.com".to_string(), manager_id: None })
            .await
            .expect("create second");

        assert_eq!(first.role, ROLE_ADMIN);
        assert_eq!(second.role, ROLE_EMPLOYEE);
    }

    #[tokio::test]
    async fn lookup_by_id_and_email_round_trips() {
        let repo = SqlUserRepository::new(setup().await);

        let created = repo
            .create(NewUser { email: "alice@example.com".to_string(), manager_id: None })
            .await
            .expect("create");

        let by_id = repo.find_by_id(&created.id).await.expect("find by id");
        let by_email = repo.find_by_email("alice@example.com").await.expect("find by email");

        assert_eq!(by_id.as_ref(), Some(&created));
        assert_eq!(by_email, Some(created));
        assert!(repo.find_by_email("nobody@example.com").await.expect("missing").is_none());
    }

    #[tokio::test]
    async fn role_and_manager_updates_are_persisted() {
        let repo = SqlUserRepository::new(setup().await);

        let manager = repo
            .create(NewUser { email: "bob@example.com".to_string(), manager_id: None })
            .await
            .expect("create manager");
        let report = repo
            .create(NewUser { email: "alice@example.com".to_string(), manager_id: None })
            .await
            .expect("create report");

        repo.set_role(&manager.id, ROLE_APPROVER).await.expect("set role");
        repo.set_manager(&report.id, Some(&manager.id)).await.expect("set manager");

        let reloaded = repo.find_by_id(&report.id).await.expect("find").expect("exists");
        assert_eq!(reloaded.manager_id, Some(manager.id.clone()));
        let manager = repo.find_by_id(&manager.id).await.expect("find").expect("exists");
        assert_eq!(manager.role, ROLE_APPROVER);
    }

    #[tokio::test]
    async fn self_management_is_rejected() {
        let repo = SqlUserRepository::new(setup().await);

        let user = repo
            .create(NewUser { email: "alice@example.com".to_string(), manager_id: None })
            .await
            .expect("create");

        let error = repo.set_manager(&user.id, Some(&user.id)).await.expect_err("self manager");
        assert!(matches!(error, RepositoryError::Integrity(_)));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_database_error() {
        let repo = SqlUserRepository::new(setup().await);

        repo.create(NewUser { email: "alice@example.com".to_string(), manager_id: None })
            .await
            .expect("create");
        let error = repo
            .create(NewUser { email: "alice@example.com".to_string(), manager_id: None })
            .await
            .expect_err("unique email");
        assert!(matches!(error, RepositoryError::Database(_)));
    }
}
