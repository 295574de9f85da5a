use crate::directory::OrgDirectory;
use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::user::{User, UserId};
use crate::errors::WorkflowError;
use crate::workflow::outcome::{BatchOutcome, TransitionOutcome};

/// The approval state machine.
///
/// Every method is a pure decision: it validates the action against the
/// record's current state and the acting principal, applies the transition
/// to an owned copy, and returns the notifications that belong to it. The
/// caller is responsible for committing the outcome atomically.
///
/// Single-item approval walks the hierarchy one link at a time; the batch
/// verbs finalize everything currently on the actor's desk without further
/// escalation. That asymmetry is contractual: dashboards distinguish the
/// two verbs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalEngine;

impl ApprovalEngine {
    pub fn new() -> Self {
        Self
    }

    /// Owner pushes a draft into the approval chain.
    pub fn submit(
        &self,
        mut expense: Expense,
        acting: &User,
        directory: &OrgDirectory,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if expense.owner_id != acting.id {
            return Err(WorkflowError::NotOwner { user_id: acting.id.clone() });
        }
        if expense.status != ExpenseStatus::Draft {
            return Err(WorkflowError::InvalidState { operation: "submit", actual: expense.status });
        }

        let manager = directory
            .immediate_manager(&acting.id)
            .ok_or_else(|| WorkflowError::NoApproverConfigured { user_id: acting.id.clone() })?;

        let from = expense.status;
        expense.approver_id = Some(manager.id.clone());
        expense.status = ExpenseStatus::Submitted;
        debug_assert!(expense.routing_is_consistent());

        let notifications = vec![
            Notification::new(
                acting.id.clone(),
                NotificationKind::Submission,
                "Expense Submitted",
                format!("You submitted expense {} for approval.", expense.id),
            ),
            Notification::new(
                manager.id.clone(),
                NotificationKind::Submission,
                "New Expense Submitted",
                format!("{} submitted expense {}.", acting.email, expense.id),
            ),
        ];

        Ok(TransitionOutcome { from, to: expense.status, expense, notifications })
    }

    /// Current approver signs off one record. Re-routes to the next chain
    /// link when one exists, finalizes otherwise.
    ///
    /// The chain is recomputed fresh from the owner; it is consulted only
    /// to find who comes after the actor. Authorization rests solely on the
    /// record's current `approver_id`, so a reorg after routing leaves the
    /// sitting approver in charge. An actor absent from the recomputed
    /// chain has no next link and therefore finalizes.
    pub fn approve_single(
        &self,
        mut expense: Expense,
        acting: &User,
        directory: &OrgDirectory,
    ) -> Result<TransitionOutcome, WorkflowError> {
        authorize_pending(&expense, acting, "approve")?;

        let chain = directory.approval_chain(&expense.owner_id)?;
        let position = chain.iter().position(|link| link.id == acting.id);
        let next = position.and_then(|index| chain.get(index + 1));

        let from = expense.status;
        match next {
            Some(next_approver) => {
                expense.approver_id = Some(next_approver.id.clone());
            }
            None => {
                expense.approver_id = None;
                expense.status = ExpenseStatus::Approved;
            }
        }
        debug_assert!(expense.routing_is_consistent());

        // The owner hears about every approved link, not only the final
        // one: each sign-off is a discrete user-visible event.
        let notifications = vec![
            Notification::new(
                acting.id.clone(),
                NotificationKind::Approval,
                "Expense Approved",
                format!("You approved expense {}.", expense.id),
            ),
            Notification::new(
                expense.owner_id.clone(),
                NotificationKind::Approval,
                "Your Expense Approved",
                format!("Your expense {} was approved by {}.", expense.id, acting.email),
            ),
        ];

        Ok(TransitionOutcome { from, to: expense.status, expense, notifications })
    }

    /// Current approver rejects one record. Rejection terminates the chain
    /// at any depth; there is no re-routing.
    pub fn reject_single(
        &self,
        mut expense: Expense,
        acting: &User,
        reason: &str,
    ) -> Result<TransitionOutcome, WorkflowError> {
        authorize_pending(&expense, acting, "reject")?;

        let from = expense.status;
        expense.status = ExpenseStatus::Rejected;
        expense.approver_id = None;
        debug_assert!(expense.routing_is_consistent());

        let notifications = vec![
            Notification::new(
                expense.owner_id.clone(),
                NotificationKind::Rejection,
                "Expense Rejected",
                format!("Your expense {} was rejected. Reason: {reason}", expense.id),
            ),
            Notification::new(
                acting.id.clone(),
                NotificationKind::Rejection,
                "Submission Rejected",
                format!("You rejected expense {}. Reason: {reason}", expense.id),
            ),
        ];

        Ok(TransitionOutcome { from, to: expense.status, expense, notifications })
    }

    /// Approve everything of one owner's that currently sits on the
    /// actor's desk. Always finalizes; the batch verb never escalates up
    /// the chain, no matter how many levels remain.
    pub fn approve_all_for_owner(
        &self,
        candidates: Vec<Expense>,
        owner_id: &UserId,
        acting: &User,
    ) -> Result<BatchOutcome, WorkflowError> {
        let selection = awaiting_actor(candidates, owner_id, acting);
        if selection.is_empty() {
            return Err(WorkflowError::NothingToApprove { owner_id: owner_id.clone() });
        }

        let mut expenses = Vec::with_capacity(selection.len());
        let mut notifications = Vec::with_capacity(selection.len() + 1);
        for mut expense in selection {
            expense.status = ExpenseStatus::Approved;
            expense.approver_id = None;
            notifications.push(Notification::new(
                expense.owner_id.clone(),
                NotificationKind::Approval,
                "Expense Approved",
                format!("Your expense {} was approved.", expense.id),
            ));
            expenses.push(expense);
        }
        notifications.push(Notification::new(
            acting.id.clone(),
            NotificationKind::Approval,
            "Report Approved",
            format!("You approved all pending expenses for user {owner_id}."),
        ));

        Ok(BatchOutcome { to: ExpenseStatus::Approved, expenses, notifications })
    }

    /// Reject everything of one owner's that currently sits on the actor's
    /// desk, with one shared reason.
    pub fn reject_all_for_owner(
        &self,
        candidates: Vec<Expense>,
        owner_id: &UserId,
        acting: &User,
        reason: &str,
    ) -> Result<BatchOutcome, WorkflowError> {
        let selection = awaiting_actor(candidates, owner_id, acting);
        if selection.is_empty() {
            return Err(WorkflowError::NothingToReject { owner_id: owner_id.clone() });
        }

        let mut expenses = Vec::with_capacity(selection.len());
        let mut notifications = Vec::with_capacity(selection.len() + 1);
        for mut expense in selection {
            expense.status = ExpenseStatus::Rejected;
            expense.approver_id = None;
            notifications.push(Notification::new(
                expense.owner_id.clone(),
                NotificationKind::Rejection,
                "Expense Rejected",
                format!("Your expense {} was rejected. Reason: {reason}", expense.id),
            ));
            expenses.push(expense);
        }
        notifications.push(Notification::new(
            acting.id.clone(),
            NotificationKind::Rejection,
            "Report Rejected",
            format!("You rejected all pending expenses for user {owner_id}. Reason: {reason}"),
        ));

        Ok(BatchOutcome { to: ExpenseStatus::Rejected, expenses, notifications })
    }
}

fn authorize_pending(
    expense: &Expense,
    acting: &User,
    operation: &'static str,
) -> Result<(), WorkflowError> {
    if expense.status != ExpenseStatus::Submitted {
        return Err(WorkflowError::InvalidState { operation, actual: expense.status });
    }
    if expense.approver_id.as_ref() != Some(&acting.id) {
        return Err(WorkflowError::NotAuthorizedApprover { user_id: acting.id.clone() });
    }
    Ok(())
}

/// Batch selection rule: the owner's records that are submitted AND
/// currently routed to the acting approver. Mirrors the store-side query
/// so the in-memory path cannot drift from the SQL path.
fn awaiting_actor(candidates: Vec<Expense>, owner_id: &UserId, acting: &User) -> Vec<Expense> {
    candidates
        .into_iter()
        .filter(|expense| {
            expense.owner_id == *owner_id
                && expense.status == ExpenseStatus::Submitted
                && expense.approver_id.as_ref() == Some(&acting.id)
        })
        .collect()
}
