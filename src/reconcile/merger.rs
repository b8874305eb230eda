//! Cluster merging: collapse every implicated cluster under the true primary

use super::error::{ReconcileError, ReconcileResult};
use super::primary::PrimarySelection;
use crate::contact::{Contact, ContactId, LinkRole};
use crate::storage::ContactTx;
use std::collections::HashSet;
use tracing::info;

/// Linkage rewrites that leave exactly one representative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub primary: ContactId,
    /// Stale representatives that become members of `primary`
    pub demote: Vec<ContactId>,
    /// Members of stale representatives that must point at `primary` instead
    pub repoint: Vec<ContactId>,
}

impl MergePlan {
    pub fn is_noop(&self) -> bool {
        self.demote.is_empty() && self.repoint.is_empty()
    }

    /// Every contact whose linkage changes, ascending
    pub fn affected(&self) -> Vec<ContactId> {
        let mut ids: Vec<ContactId> = self.demote.iter().chain(&self.repoint).copied().collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Work out the rewrites for `selection` over the loaded cluster membership
pub fn plan_merge(selection: &PrimarySelection, members: &[Contact]) -> MergePlan {
    let stale: HashSet<ContactId> = selection.stale.iter().map(|c| c.id).collect();
    let mut demote: Vec<ContactId> = stale.iter().copied().collect();
    demote.sort();

    let repoint = members
        .iter()
        .filter(|c| !c.is_representative())
        .filter(|c| c.link_target.map_or(false, |t| stale.contains(&t)))
        .map(|c| c.id)
        .collect();

    MergePlan {
        primary: selection.primary.id,
        demote,
        repoint,
    }
}

/// Apply `plan` inside the caller's unit of work.
///
/// Demotion and repointing go out as one linkage update, so no reader ever
/// sees a demoted representative with members still pointing at it.
pub fn apply_merge(tx: &dyn ContactTx, plan: &MergePlan) -> ReconcileResult<usize> {
    if plan.is_noop() {
        return Ok(0);
    }

    let ids = plan.affected();
    let changed = tx.update_linkage(&ids, LinkRole::Member, Some(plan.primary))?;
    if changed != ids.len() {
        return Err(ReconcileError::Consistency(format!(
            "merge into {} expected to relink {} contacts, relinked {}",
            plan.primary,
            ids.len(),
            changed
        )));
    }

    info!(
        primary = %plan.primary,
        demoted = plan.demote.len(),
        repointed = plan.repoint.len(),
        "merged clusters"
    );
    Ok(changed)
}
