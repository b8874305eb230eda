//! Cluster resolution: from directly matched contacts to full cluster membership

use super::error::{ReconcileError, ReconcileResult};
use crate::contact::{Contact, ContactId};
use crate::storage::ContactTx;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Root identifiers implicated by the matched contacts, ascending and
/// deduplicated. A representative is its own root; a member resolves to its
/// link target.
pub fn root_ids(matches: &[Contact]) -> ReconcileResult<Vec<ContactId>> {
    let mut roots = BTreeSet::new();
    for contact in matches {
        let root = contact.root_id().ok_or_else(|| {
            ReconcileError::Consistency(format!("member {} has no link target", contact.id))
        })?;
        roots.insert(root);
    }
    Ok(roots.into_iter().collect())
}

/// Load every live contact of the clusters rooted at `roots` and check that
/// their linkage is sound.
pub fn load_clusters(tx: &dyn ContactTx, roots: &[ContactId]) -> ReconcileResult<Vec<Contact>> {
    let members = tx.find_cluster_by_root_ids(roots)?;
    verify_linkage(roots, &members)?;
    debug!(roots = roots.len(), members = members.len(), "loaded clusters");
    Ok(members)
}

/// Refuse corrupt linkage instead of guessing a repair.
///
/// Every root must be a loaded representative, representatives carry no
/// target, and every member points straight at a loaded representative.
pub fn verify_linkage(roots: &[ContactId], members: &[Contact]) -> ReconcileResult<()> {
    let by_id: HashMap<ContactId, &Contact> = members.iter().map(|c| (c.id, c)).collect();

    for root in roots {
        match by_id.get(root) {
            Some(contact) if contact.is_representative() => {}
            Some(_) => {
                return Err(ReconcileError::Consistency(format!(
                    "contact {} is linked to as a representative but is a member",
                    root
                )))
            }
            None => {
                return Err(ReconcileError::Consistency(format!(
                    "representative {} is missing or deleted",
                    root
                )))
            }
        }
    }

    for contact in members {
        match (contact.is_representative(), contact.link_target) {
            (true, Some(target)) => {
                return Err(ReconcileError::Consistency(format!(
                    "representative {} carries link target {}",
                    contact.id, target
                )))
            }
            (true, None) => {}
            (false, None) => {
                return Err(ReconcileError::Consistency(format!(
                    "member {} has no link target",
                    contact.id
                )))
            }
            (false, Some(target)) => {
                let resolved = by_id.get(&target).map(|t| t.is_representative());
                if resolved != Some(true) {
                    return Err(ReconcileError::Consistency(format!(
                        "member {} points at {} which is not a live representative",
                        contact.id, target
                    )));
                }
            }
        }
    }

    Ok(())
}
