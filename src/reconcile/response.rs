//! Response projection: a cluster as one consolidated identity

use super::error::{ReconcileError, ReconcileResult};
use crate::contact::{Contact, ContactId};
use serde::{Deserialize, Serialize};

/// Caller-facing view of one identity cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedIdentity {
    pub primary_contact_id: ContactId,
    /// Deduplicated; the primary's own email first
    pub emails: Vec<String>,
    /// Deduplicated; the primary's own phone first
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

fn push_unique(list: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !list.iter().any(|seen| seen == value) {
            list.push(value.to_string());
        }
    }
}

/// Project `cluster` (in stored order) with `primary` as its representative
pub fn build_identity(cluster: &[Contact], primary: ContactId) -> ReconcileResult<ConsolidatedIdentity> {
    let root = cluster.iter().find(|c| c.id == primary).ok_or_else(|| {
        ReconcileError::Consistency(format!("primary {} missing from its own cluster", primary))
    })?;

    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    push_unique(&mut emails, root.email.as_deref());
    push_unique(&mut phone_numbers, root.phone.as_deref());

    let mut secondary_contact_ids = Vec::new();
    for contact in cluster.iter().filter(|c| c.id != primary) {
        push_unique(&mut emails, contact.email.as_deref());
        push_unique(&mut phone_numbers, contact.phone.as_deref());
        secondary_contact_ids.push(contact.id);
    }

    Ok(ConsolidatedIdentity {
        primary_contact_id: primary,
        emails,
        phone_numbers,
        secondary_contact_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::LinkRole;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn contact(id: i64, email: Option<&str>, phone: Option<&str>) -> Contact {
        let at = Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap();
        Contact {
            id: ContactId::new(id),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            link_role: LinkRole::Member,
            link_target: Some(ContactId::new(3)),
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_primary_facts_lead_even_when_primary_is_not_first_in_order() {
        // Member 2 sorts before primary 3 in stored order
        let cluster = vec![
            contact(2, Some("b@x.com"), Some("222")),
            contact(3, Some("a@x.com"), None),
            contact(5, Some("b@x.com"), Some("111")),
        ];
        let identity = build_identity(&cluster, ContactId::new(3)).unwrap();

        assert_eq!(identity.primary_contact_id, ContactId::new(3));
        assert_eq!(identity.emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(identity.phone_numbers, vec!["222", "111"]);
        assert_eq!(
            identity.secondary_contact_ids,
            vec![ContactId::new(2), ContactId::new(5)]
        );
    }

    #[test]
    fn test_lone_primary_has_no_secondaries() {
        let cluster = vec![contact(1, Some("a@x.com"), None)];
        let identity = build_identity(&cluster, ContactId::new(1)).unwrap();
        assert_eq!(identity.emails, vec!["a@x.com"]);
        assert!(identity.phone_numbers.is_empty());
        assert!(identity.secondary_contact_ids.is_empty());
    }

    #[test]
    fn test_missing_primary_is_a_consistency_error() {
        let cluster = vec![contact(2, Some("a@x.com"), None)];
        assert!(build_identity(&cluster, ContactId::new(1)).is_err());
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let cluster = vec![
            contact(1, Some("a@x.com"), Some("1")),
            contact(4, None, Some("2")),
        ];
        let identity = build_identity(&cluster, ContactId::new(1)).unwrap();
        assert_eq!(
            serde_json::to_value(&identity).unwrap(),
            json!({
                "primaryContactId": 1,
                "emails": ["a@x.com"],
                "phoneNumbers": ["1", "2"],
                "secondaryContactIds": [4]
            })
        );
    }
}
