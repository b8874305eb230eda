//! Primary selection: the oldest representative wins

use super::error::{ReconcileError, ReconcileResult};
use crate::contact::Contact;

/// Outcome of ranking the representatives of the implicated clusters
#[derive(Debug, Clone, PartialEq)]
pub struct PrimarySelection {
    /// Oldest representative by (created_at, id)
    pub primary: Contact,
    /// Every other representative; each must be demoted
    pub stale: Vec<Contact>,
}

impl PrimarySelection {
    /// True when the implicated contacts already form a single cluster
    pub fn is_settled(&self) -> bool {
        self.stale.is_empty()
    }
}

/// Rank the representatives among `members` by seniority.
///
/// The id tie-break makes the order total, so identical timestamps still
/// yield a single deterministic winner.
pub fn select_primary(members: &[Contact]) -> ReconcileResult<PrimarySelection> {
    let mut representatives: Vec<&Contact> =
        members.iter().filter(|c| c.is_representative()).collect();
    representatives.sort_by(|a, b| a.seniority(b));

    let mut ranked = representatives.into_iter().cloned();
    let primary = ranked.next().ok_or_else(|| {
        ReconcileError::Consistency("implicated clusters contain no representative".to_string())
    })?;

    Ok(PrimarySelection {
        primary,
        stale: ranked.collect(),
    })
}
