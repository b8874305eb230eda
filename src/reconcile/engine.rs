//! IdentityEngine: the identify operation over a contact store

use super::error::{ReconcileError, ReconcileResult};
use super::ingest::ingest_fact;
use super::merger::{apply_merge, plan_merge};
use super::primary::select_primary;
use super::request::IdentifyRequest;
use super::resolver::{load_clusters, root_ids};
use super::response::{build_identity, ConsolidatedIdentity};
use crate::contact::{Contact, ContactId, NewContact};
use crate::storage::{CommitGate, ContactStore, ContactTx};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// What the lookup outside the unit of work suggested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expectation {
    NewIdentity,
    Existing,
}

/// Resolves submitted facts to a single identity cluster
///
/// Holds an injected store handle; every mutation happens inside one of the
/// store's units of work.
pub struct IdentityEngine<S: ContactStore> {
    store: Arc<S>,
}

impl<S: ContactStore> IdentityEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Return the cluster containing the submitted facts, creating or
    /// merging records as needed.
    ///
    /// Safe to retry: a repeated identical call finds nothing new and
    /// writes nothing.
    pub fn identify(&self, request: &IdentifyRequest) -> ReconcileResult<ConsolidatedIdentity> {
        self.identify_gated(request, None)
    }

    /// `identify` whose unit of work commits only if it can claim `gate`.
    ///
    /// A caller that stops waiting abandons the gate; if that succeeds, the
    /// call is guaranteed to leave the store untouched.
    pub fn identify_with_gate(
        &self,
        request: &IdentifyRequest,
        gate: &CommitGate,
    ) -> ReconcileResult<ConsolidatedIdentity> {
        self.identify_gated(request, Some(gate))
    }

    fn identify_gated(
        &self,
        request: &IdentifyRequest,
        gate: Option<&CommitGate>,
    ) -> ReconcileResult<ConsolidatedIdentity> {
        let _span = info_span!("identify", email = ?request.email(), phone = ?request.phone())
            .entered();

        let seen = self
            .store
            .find_by_email_or_phone(request.email(), request.phone())?;
        let expectation = if seen.is_empty() {
            Expectation::NewIdentity
        } else {
            Expectation::Existing
        };
        debug!(matches = seen.len(), ?expectation, "initial lookup");

        let result = self
            .store
            .unit_of_work_gated(gate, |tx| reconcile_in_unit(tx, request, expectation));

        match &result {
            Ok(identity) => debug!(
                primary = %identity.primary_contact_id,
                secondaries = identity.secondary_contact_ids.len(),
                "identify complete"
            ),
            Err(err @ ReconcileError::Consistency(_)) => error!(error = %err, "identify refused"),
            Err(err) if err.is_retryable() => warn!(error = %err, "identify failed; retryable"),
            Err(err) => warn!(error = %err, "identify failed"),
        }
        result
    }

    /// Consolidated view of the cluster that `id` belongs to, without
    /// writing anything. `None` if the contact does not exist or is deleted.
    ///
    /// Runs in a read view, so it never waits on the write lock.
    pub fn cluster_of(&self, id: ContactId) -> ReconcileResult<Option<ConsolidatedIdentity>> {
        self.store.read_view(|tx| {
            let direct = tx.find_cluster_by_root_ids(&[id])?;
            let Some(contact) = direct.into_iter().find(|c| c.id == id) else {
                return Ok(None);
            };
            let roots = root_ids(std::slice::from_ref(&contact))?;
            let cluster = load_clusters(tx, &roots)?;
            let selection = select_primary(&cluster)?;
            if !selection.is_settled() {
                return Err(ReconcileError::Consistency(format!(
                    "cluster of {} has {} representatives",
                    id,
                    selection.stale.len() + 1
                )));
            }
            build_identity(&cluster, selection.primary.id).map(Some)
        })
    }
}

/// The whole identify step as one atomic unit: fresh match, then either
/// create a representative or merge and ingest.
fn reconcile_in_unit(
    tx: &dyn ContactTx,
    request: &IdentifyRequest,
    expectation: Expectation,
) -> ReconcileResult<ConsolidatedIdentity> {
    // Re-read under the unit's isolation; the earlier lookup may be stale
    let matches = tx.find_by_email_or_phone(request.email(), request.phone())?;

    if matches.is_empty() {
        if expectation == Expectation::Existing {
            debug!("earlier matches vanished before the unit began");
        }
        return create_representative(tx, request);
    }
    if expectation == Expectation::NewIdentity {
        info!(
            matches = matches.len(),
            "concurrent request created a match first; joining its cluster"
        );
    }
    merge_and_ingest(tx, request, &matches)
}

fn create_representative(
    tx: &dyn ContactTx,
    request: &IdentifyRequest,
) -> ReconcileResult<ConsolidatedIdentity> {
    let created = tx.create_contact(&NewContact::representative(
        request.email().map(str::to_string),
        request.phone().map(str::to_string),
    ))?;
    info!(contact_id = %created.id, "created representative");
    build_identity(std::slice::from_ref(&created), created.id)
}

fn merge_and_ingest(
    tx: &dyn ContactTx,
    request: &IdentifyRequest,
    matches: &[Contact],
) -> ReconcileResult<ConsolidatedIdentity> {
    let roots = root_ids(matches)?;
    let members = load_clusters(tx, &roots)?;

    let selection = select_primary(&members)?;
    let primary = selection.primary.id;
    let plan = plan_merge(&selection, &members);
    apply_merge(tx, &plan)?;

    let cluster = ingest_fact(tx, request, primary)?;
    build_identity(&cluster, primary)
}
