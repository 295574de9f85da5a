use std::collections::HashMap;

use tokio::sync::RwLock;

use chrono::Utc;

use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use outlay_core::domain::notification::{Notification, NotificationId};
use outlay_core::domain::user::{User, UserId};

use super::{
    ExpenseRepository, NewUser, NotificationRepository, RepositoryError, UserRepository,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|user| user.email == new_user.email) {
            return Err(RepositoryError::Integrity(format!(
                "email `{}` is already registered",
                new_user.email
            )));
        }

        let user = User {
            id: UserId::generate(),
            email: new_user.email,
            role: User::bootstrap_role(users.is_empty()).to_string(),
            manager_id: new_user.manager_id,
            created_at: Utc::now(),
        };
        users.insert(user.id.0.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|left, right| left.email.cmp(&right.email));
        Ok(all)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.len() as u64)
    }

    async fn set_role(&self, id: &UserId, role: &str) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id.0) {
            user.role = role.to_string();
        }
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

        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id.0) {
            user.manager_id = manager_id.cloned();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<String, Expense>>,
}

impl InMemoryExpenseRepository {
    async fn list_filtered<F>(&self, predicate: F) -> Vec<Expense>
    where
        F: Fn(&Expense) -> bool,
    {
        let expenses = self.expenses.read().await;
        let mut selected: Vec<Expense> =
            expenses.values().filter(|expense| predicate(expense)).cloned().collect();
        selected.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        selected
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn delete(&self, id: &ExpenseId) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.remove(&id.0);
        Ok(())
    }

    async fn list_for_owner(&self, owner_id: &UserId) -> Result<Vec<Expense>, RepositoryError> {
        Ok(self.list_filtered(|expense| expense.owner_id == *owner_id).await)
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        Ok(self
            .list_filtered(|expense| {
                expense.status == ExpenseStatus::Submitted
                    && expense.approver_id.as_ref() == Some(approver_id)
            })
            .await)
    }

    async fn list_approved(&self) -> Result<Vec<Expense>, RepositoryError> {
        Ok(self
            .list_filtered(|expense| {
                expense.status == ExpenseStatus::Approved && expense.approver_id.is_none()
            })
            .await)
    }

    async fn list_approved_for_owner(
        &self,
        owner_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        Ok(self
            .list_filtered(|expense| {
                expense.status == ExpenseStatus::Approved && expense.owner_id == *owner_id
            })
            .await)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut notifications = self.notifications.write().await;
        notifications.insert(notification.id.0.clone(), notification);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut selected: Vec<Notification> = notifications
            .values()
            .filter(|notification| notification.user_id == *user_id)
            .cloned()
            .collect();
        selected.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(selected)
    }

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .values()
            .filter(|notification| notification.user_id == *user_id && !notification.read)
            .count() as u64)
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&id.0) {
            Some(notification) if notification.user_id == *user_id => {
                notification.mark_read();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(
        &self,
        id: &NotificationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let mut notifications = self.notifications.write().await;
        match notifications.get(&id.0) {
            Some(notification) if notification.user_id == *user_id => {
                notifications.remove(&id.0);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
