//! Identity reconciliation core
//!
//! An identify call flows through the cluster resolver, the primary
//! selector, the cluster merger, the fact ingestor and the response
//! builder. The merge, the fresh re-read and the conditional insert all run
//! inside one unit of work of the contact store.

mod engine;
mod error;
mod ingest;
mod merger;
mod primary;
mod request;
mod resolver;
mod response;


pub use engine::IdentityEngine;
pub use error::{ReconcileError, ReconcileResult};
pub use ingest::{ingest_fact, new_member_for, KnownFacts};
pub use merger::{apply_merge, plan_merge, MergePlan};
pub use primary::{select_primary, PrimarySelection};
pub use request::IdentifyRequest;
pub use resolver::{load_clusters, root_ids, verify_linkage};
pub use response::{build_identity, ConsolidatedIdentity};
