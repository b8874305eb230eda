//! Fact ingestion: append a member only when the submitted facts are new

use super::error::ReconcileResult;
use super::request::IdentifyRequest;
use super::resolver::load_clusters;
use crate::contact::{Contact, ContactId, NewContact};
use crate::storage::ContactTx;
use std::collections::HashSet;
use tracing::{debug, info};

/// Distinct emails and phones already present in a cluster
#[derive(Debug, Default)]
pub struct KnownFacts<'a> {
    emails: HashSet<&'a str>,
    phones: HashSet<&'a str>,
}

impl<'a> KnownFacts<'a> {
    pub fn from_members(members: &'a [Contact]) -> Self {
        let mut facts = Self::default();
        for contact in members {
            if let Some(email) = contact.email.as_deref() {
                facts.emails.insert(email);
            }
            if let Some(phone) = contact.phone.as_deref() {
                facts.phones.insert(phone);
            }
        }
        facts
    }

    pub fn is_new_email(&self, email: Option<&str>) -> bool {
        email.map_or(false, |e| !self.emails.contains(e))
    }

    pub fn is_new_phone(&self, phone: Option<&str>) -> bool {
        phone.map_or(false, |p| !self.phones.contains(p))
    }
}

/// The member to append for `request`, if it brings anything new.
///
/// The member carries exactly the submitted fields; nothing is backfilled
/// from other contacts.
pub fn new_member_for(
    request: &IdentifyRequest,
    cluster: &[Contact],
    primary: ContactId,
) -> Option<NewContact> {
    let known = KnownFacts::from_members(cluster);
    if !known.is_new_email(request.email()) && !known.is_new_phone(request.phone()) {
        return None;
    }
    Some(NewContact::member(
        request.email().map(str::to_string),
        request.phone().map(str::to_string),
        primary,
    ))
}

/// Re-read the merged cluster inside the unit and append a member if needed.
///
/// Returns the cluster as it will be after commit, ordered by id.
pub fn ingest_fact(
    tx: &dyn ContactTx,
    request: &IdentifyRequest,
    primary: ContactId,
) -> ReconcileResult<Vec<Contact>> {
    // Must follow the merge within the same unit; an earlier read is stale
    let mut cluster = load_clusters(tx, &[primary])?;

    match new_member_for(request, &cluster, primary) {
        Some(member) => {
            let created = tx.create_contact(&member)?;
            info!(contact_id = %created.id, primary = %primary, "appended member with new fact");
            cluster.push(created);
        }
        None => debug!(primary = %primary, "no new facts; cluster unchanged"),
    }

    Ok(cluster)
}
