use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Submission,
    Approval,
    Rejection,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Approval => "approval",
            Self::Rejection => "rejection",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "submission" => Some(Self::Submission),
            "approval" => Some(Self::Approval),
            "rejection" => Some(Self::Rejection),
            _ => None,
        }
    }
}

/// Append-only event delivered to exactly one recipient. Created only as a
/// side effect of a workflow transition, in the same transaction. The
/// recipient may flip `read` and delete their own entries; nothing else
/// mutates a stored notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId(Uuid::new_v4().to_string()),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::user::UserId;

    use super::{Notification, NotificationKind};

    #[test]
    fn new_notifications_start_unread() {
        let mut notification = Notification::new(
            UserId("U-1".to_string()),
            NotificationKind::Submission,
            "Expense Submitted",
            "You submitted expense E-1 for approval.",
        );

        assert!(!notification.read);
        notification.mark_read();
        assert!(notification.read);
    }

    #[test]
    fn kind_round_trips_through_text() {
        for kind in
            [NotificationKind::Submission, NotificationKind::Approval, NotificationKind::Rejection]
        {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("digest"), None);
    }
}
