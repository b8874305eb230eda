//! Transport-independent API layer.
//!
//! `IdentityApi` is the entry point transports call. It owns the request
//! boundary (payload parsing and validation) and runs the blocking engine
//! off the async runtime under a wall-clock bound.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contact::ContactId;
use crate::reconcile::{
    ConsolidatedIdentity, IdentifyRequest, IdentityEngine, ReconcileError, ReconcileResult,
};
use crate::storage::{CommitGate, ContactStore};
use tokio::task::JoinError;

/// A phone number as sent by clients: either a JSON string or an integer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PhoneValue {
    Text(String),
    Number(i64),
}

impl PhoneValue {
    fn into_string(self) -> String {
        match self {
            PhoneValue::Text(s) => s,
            PhoneValue::Number(n) => n.to_string(),
        }
    }
}

/// Raw identify body, e.g. `{"email": "a@x.com", "phoneNumber": 123456}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<PhoneValue>,
}

impl IdentifyPayload {
    /// Parse a JSON body
    pub fn from_json(body: &str) -> ReconcileResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| ReconcileError::InvalidInput(format!("malformed identify payload: {}", e)))
    }
}

impl TryFrom<IdentifyPayload> for IdentifyRequest {
    type Error = ReconcileError;

    fn try_from(payload: IdentifyPayload) -> Result<Self, Self::Error> {
        IdentifyRequest::new(payload.email, payload.phone_number.map(PhoneValue::into_string))
    }
}

/// Response envelope: `{"contact": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ConsolidatedIdentity,
}

/// Single entry point for identify operations.
pub struct IdentityApi<S: ContactStore + 'static> {
    engine: Arc<IdentityEngine<S>>,
    request_timeout: Duration,
}

impl<S: ContactStore + 'static> Clone for IdentityApi<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: ContactStore + 'static> IdentityApi<S> {
    /// Create a new API instance.
    pub fn new(engine: Arc<IdentityEngine<S>>, request_timeout: Duration) -> Self {
        Self {
            engine,
            request_timeout,
        }
    }

    pub fn engine(&self) -> &Arc<IdentityEngine<S>> {
        &self.engine
    }

    /// Resolve a validated request to its consolidated identity.
    ///
    /// The engine's store calls block, so they run on the blocking pool.
    /// If the request outlives `request_timeout` the unit's commit gate is
    /// abandoned and the caller gets `ReconcileError::Timeout`, with nothing
    /// committed. If the unit had already claimed its commit, the caller
    /// waits for and receives its actual outcome instead.
    pub async fn identify(&self, request: IdentifyRequest) -> ReconcileResult<ConsolidatedIdentity> {
        let gate = CommitGate::new();
        let unit_gate = gate.clone();
        let engine = Arc::clone(&self.engine);
        let mut task =
            tokio::task::spawn_blocking(move || engine.identify_with_gate(&request, &unit_gate));

        match tokio::time::timeout(self.request_timeout, &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) if gate.abandon() => Err(ReconcileError::Timeout(self.request_timeout)),
            Err(_) => flatten(task.await),
        }
    }

    /// Validate a raw payload, then identify it.
    pub async fn identify_payload(&self, payload: IdentifyPayload) -> ReconcileResult<IdentifyResponse> {
        let request = IdentifyRequest::try_from(payload)?;
        let contact = self.identify(request).await?;
        Ok(IdentifyResponse { contact })
    }

    /// Read-only view of the cluster containing `id`. Writes nothing, so a
    /// timeout here needs no gate.
    pub async fn cluster_of(&self, id: ContactId) -> ReconcileResult<Option<ConsolidatedIdentity>> {
        let engine = Arc::clone(&self.engine);
        self.run_blocking(move || engine.cluster_of(id)).await
    }

    async fn run_blocking<T, F>(&self, work: F) -> ReconcileResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ReconcileResult<T> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.request_timeout, task).await {
            Ok(joined) => flatten(joined),
            Err(_) => Err(ReconcileError::Timeout(self.request_timeout)),
        }
    }
}

fn flatten<T>(joined: Result<ReconcileResult<T>, JoinError>) -> ReconcileResult<T> {
    joined.map_err(|e| ReconcileError::Task(e.to_string()))?
}
