use geoperms_core::{AppError, AppResult, NonEmptyString, SubjectId};
use serde::{Deserialize, Serialize};

/// Name of the builtin group standing in for unauthenticated visitors.
pub const ANONYMOUS_GROUP_NAME: &str = "anonymous";

/// Name of the builtin group standing in for authenticated users without
/// an explicit assignment.
pub const REGISTERED_MEMBERS_GROUP_NAME: &str = "registered-members";

/// Kind of principal that can hold permissions on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// Group of users, including the builtin pseudo-groups.
    Group,
    /// Organization profile.
    Organization,
    /// Individual user account.
    User,
}

impl SubjectKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Organization => "organization",
            Self::User => "user",
        }
    }

    /// Parses a storage value into a subject kind.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "group" => Ok(Self::Group),
            "organization" => Ok(Self::Organization),
            "user" => Ok(Self::User),
            _ => Err(AppError::Validation(format!(
                "unknown subject kind '{value}'"
            ))),
        }
    }
}

/// A principal that can hold a compact permission level on a resource.
///
/// Immutable from the permission subsystem's point of view; the catalog
/// owns subject lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    id: SubjectId,
    kind: SubjectKind,
    name: NonEmptyString,
    title: String,
    is_admin: bool,
}

impl Subject {
    /// Creates a user subject.
    pub fn user(
        id: SubjectId,
        name: impl Into<String>,
        title: impl Into<String>,
        is_admin: bool,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            kind: SubjectKind::User,
            name: NonEmptyString::new(name)?,
            title: title.into(),
            is_admin,
        })
    }

    /// Creates a group subject.
    pub fn group(id: SubjectId, name: impl Into<String>, title: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            id,
            kind: SubjectKind::Group,
            name: NonEmptyString::new(name)?,
            title: title.into(),
            is_admin: false,
        })
    }

    /// Creates an organization subject.
    pub fn organization(
        id: SubjectId,
        name: impl Into<String>,
        title: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            kind: SubjectKind::Organization,
            name: NonEmptyString::new(name)?,
            title: title.into(),
            is_admin: false,
        })
    }

    /// Returns the stable subject identifier.
    #[must_use]
    pub fn id(&self) -> SubjectId {
        self.id
    }

    /// Returns the subject kind.
    #[must_use]
    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    /// Returns the stable name (username or group name).
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the user-facing title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns whether a user subject holds administrator rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Returns whether this is one of the builtin pseudo-groups.
    #[must_use]
    pub fn is_builtin_group(&self) -> bool {
        self.kind == SubjectKind::Group
            && matches!(
                self.name.as_str(),
                ANONYMOUS_GROUP_NAME | REGISTERED_MEMBERS_GROUP_NAME
            )
    }

    /// Returns whether this is the anonymous pseudo-group.
    #[must_use]
    pub fn is_anonymous_group(&self) -> bool {
        self.kind == SubjectKind::Group && self.name.as_str() == ANONYMOUS_GROUP_NAME
    }

    /// Returns whether this is the registered-members pseudo-group.
    #[must_use]
    pub fn is_registered_members_group(&self) -> bool {
        self.kind == SubjectKind::Group && self.name.as_str() == REGISTERED_MEMBERS_GROUP_NAME
    }
}
