use async_trait::async_trait;
use thiserror::Error;

use outlay_core::domain::category::Category;
use outlay_core::domain::expense::{Expense, ExpenseId};
use outlay_core::domain::notification::{Notification, NotificationId};
use outlay_core::domain::user::{User, UserId};

pub mod category;
pub mod expense;
pub mod memory;
pub mod notification;
pub mod user;

pub use category::SqlCategoryRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{
    InMemoryExpenseRepository, InMemoryNotificationRepository, InMemoryUserRepository,
};
pub use notification::SqlNotificationRepository;
pub use user::{NewUser, SqlUserRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("integrity error: {0}")]
    Integrity(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Registers a user. The first registration into an empty registry is
    /// elevated to admin inside the same transaction that counts it.
    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
    async fn set_role(&self, id: &UserId, role: &str) -> Result<(), RepositoryError>;
    async fn set_manager(
        &self,
        id: &UserId,
        manager_id: Option<&UserId>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;
    /// Upsert; line items are replaced together with the parent row.
    async fn save(&self, expense: Expense) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &ExpenseId) -> Result<(), RepositoryError>;
    async fn list_for_owner(&self, owner_id: &UserId) -> Result<Vec<Expense>, RepositoryError>;
    async fn list_pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError>;
    async fn list_approved(&self) -> Result<Vec<Expense>, RepositoryError>;
    async fn list_approved_for_owner(
        &self,
        owner_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Notification>, RepositoryError>;
    async fn unread_count(&self, user_id: &UserId) -> Result<u64, RepositoryError>;
    /// Returns false when the notification does not exist or belongs to
    /// someone else; only the recipient may flip the flag.
    async fn mark_read(
        &self,
        id: &NotificationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError>;
    /// Same ownership rule as `mark_read`.
    async fn delete(&self, id: &NotificationId, user_id: &UserId)
        -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn save(&self, category: Category) -> Result<(), RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Category>, RepositoryError>;
}
