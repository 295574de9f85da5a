pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod report;
pub mod workflow;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use directory::OrgDirectory;
pub use domain::category::{Category, CategoryId};
pub use domain::expense::{CapturedReceipt, Expense, ExpenseId, ExpenseStatus, LineItem};
pub use domain::notification::{Notification, NotificationId, NotificationKind};
pub use domain::user::{User, UserId};
pub use errors::WorkflowError;
pub use report::{build_reports, ExpenseReport};
pub use workflow::{ApprovalEngine, BatchOutcome, TransitionOutcome};
