//! Structural invariants over a whole contact table

use identify::{Contact, ContactId, LinkRole};
use std::collections::{HashMap, HashSet};

/// Groups of contacts connected by a shared email, a shared phone, or a
/// link. Each group must be exactly one cluster.
pub fn linked_components(contacts: &[Contact]) -> Vec<HashSet<ContactId>> {
    let mut adj: HashMap<ContactId, HashSet<ContactId>> = HashMap::new();
    let mut by_email: HashMap<&str, Vec<ContactId>> = HashMap::new();
    let mut by_phone: HashMap<&str, Vec<ContactId>> = HashMap::new();

    for contact in contacts {
        adj.entry(contact.id).or_default();
        if let Some(email) = contact.email.as_deref() {
            by_email.entry(email).or_default().push(contact.id);
        }
        if let Some(phone) = contact.phone.as_deref() {
            by_phone.entry(phone).or_default().push(contact.id);
        }
        if let Some(target) = contact.link_target {
            adj.entry(contact.id).or_default().insert(target);
            adj.entry(target).or_default().insert(contact.id);
        }
    }
    for group in by_email.values().chain(by_phone.values()) {
        for pair in group.windows(2) {
            adj.entry(pair[0]).or_default().insert(pair[1]);
            adj.entry(pair[1]).or_default().insert(pair[0]);
        }
    }

    let mut visited: HashSet<ContactId> = HashSet::new();
    let mut components = Vec::new();

    for contact in contacts {
        if visited.contains(&contact.id) {
            continue;
        }
        let mut component = HashSet::new();
        let mut stack = vec![contact.id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            component.insert(current);
            if let Some(neighbors) = adj.get(&current) {
                stack.extend(neighbors.iter().copied().filter(|n| !visited.contains(n)));
            }
        }
        components.push(component);
    }
    components
}

/// Check that every component holds one Representative, that it is the
/// oldest record, and that every Member links straight to it.
pub fn check_invariants(contacts: &[Contact]) -> Result<(), String> {
    let by_id: HashMap<ContactId, &Contact> = contacts.iter().map(|c| (c.id, c)).collect();

    for component in linked_components(contacts) {
        let mut members: Vec<&Contact> = component
            .iter()
            .map(|id| {
                by_id
                    .get(id)
                    .copied()
                    .ok_or_else(|| format!("link to missing contact {}", id))
            })
            .collect::<Result<_, _>>()?;
        members.sort_by(|a, b| a.seniority(b));

        let reps: Vec<&&Contact> = members
            .iter()
            .filter(|c| c.link_role == LinkRole::Representative)
            .collect();
        if reps.len() != 1 {
            return Err(format!(
                "component {:?} has {} representatives",
                sorted(&component),
                reps.len()
            ));
        }
        let rep = reps[0];
        if rep.id != members[0].id {
            return Err(format!(
                "representative {} is not the oldest; {} is",
                rep.id, members[0].id
            ));
        }
        if rep.link_target.is_some() {
            return Err(format!("representative {} has a link target", rep.id));
        }
        for member in members.iter().filter(|c| c.id != rep.id) {
            if member.link_target != Some(rep.id) {
                return Err(format!(
                    "member {} links to {:?}, expected {}",
                    member.id, member.link_target, rep.id
                ));
            }
        }
    }
    Ok(())
}

fn sorted(component: &HashSet<ContactId>) -> Vec<ContactId> {
    let mut ids: Vec<_> = component.iter().copied().collect();
    ids.sort();
    ids
}
