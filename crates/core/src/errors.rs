use thiserror::Error;

use crate::domain::expense::ExpenseStatus;
use crate::domain::user::UserId;

/// Failure kinds for workflow operations. Every kind is local to one
/// operation and leaves no partial state behind.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("acting user `{user_id}` does not own this expense")]
    NotOwner { user_id: UserId },
    #[error("{operation} is not legal while the expense is {actual:?}")]
    InvalidState { operation: &'static str, actual: ExpenseStatus },
    #[error("no approver configured for user `{user_id}`")]
    NoApproverConfigured { user_id: UserId },
    #[error("acting user `{user_id}` is not the current approver for this expense")]
    NotAuthorizedApprover { user_id: UserId },
    #[error("no submitted expenses for owner `{owner_id}` are awaiting the acting approver")]
    NothingToApprove { owner_id: UserId },
    #[error("no submitted expenses for owner `{owner_id}` are awaiting the acting approver")]
    NothingToReject { owner_id: UserId },
    #[error("management hierarchy revisits user `{user_id}`; chain walk aborted")]
    CyclicHierarchy { user_id: UserId },
}

#[cfg(test)]
mod tests {
    use crate::domain::expense::ExpenseStatus;
    use crate::domain::user::UserId;

    use super::WorkflowError;

    #[test]
    fn messages_name_the_offending_state() {
        let error = WorkflowError::InvalidState {
            operation: "submit",
            actual: ExpenseStatus::Approved,
        };
        assert_eq!(error.to_string(), "submit is not legal while the expense is Approved");
    }

    #[test]
    fn cycle_error_names_the_revisited_user() {
        let error = WorkflowError::CyclicHierarchy { user_id: UserId("U-9".to_string()) };
        assert!(error.to_string().contains("U-9"));
    }
}
