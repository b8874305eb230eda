//! Contact representation in the identity store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Unique identifier for a contact
///
/// Assigned monotonically by the store, so a lower id was inserted earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(i64);

impl ContactId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ContactId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a contact within its cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    /// The canonical record of a cluster
    Representative,
    /// A record linked to the cluster's representative
    Member,
}

impl LinkRole {
    /// Column value used by the store ("primary" / "secondary")
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRole::Representative => "primary",
            LinkRole::Member => "secondary",
        }
    }
}

impl FromStr for LinkRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(LinkRole::Representative),
            "secondary" => Ok(LinkRole::Member),
            other => Err(format!("unknown link role '{}'", other)),
        }
    }
}

/// A persisted contact record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub link_role: LinkRole,
    /// Representative this contact belongs to; set only for members
    pub link_target: Option<ContactId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-deleted records are invisible to every lookup
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn is_representative(&self) -> bool {
        self.link_role == LinkRole::Representative
    }

    /// The cluster root this contact resolves to.
    ///
    /// `None` only for a member with no target, which is corrupt data.
    pub fn root_id(&self) -> Option<ContactId> {
        match self.link_role {
            LinkRole::Representative => Some(self.id),
            LinkRole::Member => self.link_target,
        }
    }

    /// Seniority order: earlier `created_at` first, then lower id.
    pub fn seniority(&self, other: &Contact) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Fields for a contact that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub link_role: LinkRole,
    pub link_target: Option<ContactId>,
}

impl NewContact {
    /// A fresh cluster root
    pub fn representative(email: Option<String>, phone: Option<String>) -> Self {
        Self {
            email,
            phone,
            link_role: LinkRole::Representative,
            link_target: None,
        }
    }

    /// A member appended to the cluster rooted at `target`
    pub fn member(email: Option<String>, phone: Option<String>, target: ContactId) -> Self {
        Self {
            email,
            phone,
            link_role: LinkRole::Member,
            link_target: Some(target),
        }
    }
}
