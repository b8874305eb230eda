//! Contact records: the single persisted entity of the identity store

mod model;

pub use model::{Contact, ContactId, LinkRole, NewContact};
