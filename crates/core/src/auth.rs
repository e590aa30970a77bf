use serde::{Deserialize, Serialize};

/// Identity of the caller behind one gateway request.
///
/// Anonymous callers carry no subject claim; administrators bypass
/// per-resource permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    subject: Option<String>,
    display_name: String,
    is_admin: bool,
}

impl CallerIdentity {
    /// Creates an authenticated caller identity.
    #[must_use]
    pub fn authenticated(
        subject: impl Into<String>,
        display_name: impl Into<String>,
        is_admin: bool,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            display_name: display_name.into(),
            is_admin,
        }
    }

    /// Creates the anonymous caller identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            subject: None,
            display_name: "AnonymousUser".to_owned(),
            is_admin: false,
        }
    }

    /// Returns the stable subject claim, absent for anonymous callers.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the display name for the caller.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns whether the caller is unauthenticated.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.subject.is_none()
    }

    /// Returns whether the caller holds catalog administrator rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}
