//! Validated identify input

use super::error::{ReconcileError, ReconcileResult};

/// The facts submitted to `identify`: an email, a phone, or both.
///
/// Construction is the validation boundary. A request always carries at
/// least one non-blank fact, so the core never re-checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifyRequest {
    email: Option<String>,
    phone: Option<String>,
}

impl IdentifyRequest {
    /// Blank values count as absent. Values are otherwise kept verbatim:
    /// matching is exact string equality.
    pub fn new(email: Option<String>, phone: Option<String>) -> ReconcileResult<Self> {
        let email = email.filter(|s| !s.trim().is_empty());
        let phone = phone.filter(|s| !s.trim().is_empty());
        if email.is_none() && phone.is_none() {
            return Err(ReconcileError::InvalidInput(
                "at least one of email or phone number is required".to_string(),
            ));
        }
        Ok(Self { email, phone })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}
