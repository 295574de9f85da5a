use sqlx::Row;

use outlay_core::domain::category::{Category, CategoryId};

use super::{CategoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCategoryRepository {
    pool: DbPool,
}

impl SqlCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Result<Category, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let gl_code: String =
        row.try_get("gl_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(Category { id: CategoryId(id), name, gl_code })
}

#[async_trait::async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn save(&self, category: Category) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO categories (id, name, gl_code)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 gl_code = excluded.gl_code",
        )
        .bind(&category.id.0)
        .bind(&category.name)
        .bind(&category.gl_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, gl_code FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_category(r)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, gl_code FROM categories ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_category).collect()
    }
}
