use std::collections::{HashMap, HashSet};

use crate::domain::user::{User, UserId};
use crate::errors::WorkflowError;

/// Point-in-time view of the management hierarchy.
///
/// Built fresh from the current user set on every engine invocation and
/// never cached across calls, so a reorg between two approvals is always
/// visible to the next chain walk.
#[derive(Clone, Debug, Default)]
pub struct OrgDirectory {
    users_by_id: HashMap<UserId, User>,
}

impl OrgDirectory {
    pub fn new(users: Vec<User>) -> Self {
        let users_by_id = users.into_iter().map(|user| (user.id.clone(), user)).collect();
        Self { users_by_id }
    }

    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.users_by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.users_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users_by_id.is_empty()
    }

    /// One-hop lookup through the weak manager reference. Absence is not
    /// an error; it expresses "no approver configured".
    pub fn immediate_manager(&self, id: &UserId) -> Option<&User> {
        let user = self.users_by_id.get(id)?;
        let manager_id = user.manager_id.as_ref()?;
        self.users_by_id.get(manager_id)
    }

    /// Ordered ancestor sequence `[immediate manager, their manager, ..]`.
    ///
    /// The stored relation must form a forest; a revisited id means the
    /// data is malformed, so the walk aborts instead of looping.
    pub fn approval_chain(&self, id: &UserId) -> Result<Vec<&User>, WorkflowError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.clone());

        let mut current = id.clone();
        while let Some(manager) = self.immediate_manager(&current) {
            if !visited.insert(manager.id.clone()) {
                return Err(WorkflowError::CyclicHierarchy { user_id: manager.id.clone() });
            }
            chain.push(manager);
            current = manager.id.clone();
        }

        Ok(chain)
    }

    /// Reverse lookup over the weak reference: everyone whose manager is
    /// `id`, ordered by email for stable output.
    pub fn direct_reports(&self, id: &UserId) -> Vec<&User> {
        let mut reports: Vec<&User> = self
            .users_by_id
            .values()
            .filter(|user| user.manager_id.as_ref() == Some(id))
            .collect();
        reports.sort_by(|left, right| left.email.cmp(&right.email));
        reports
    }
}
