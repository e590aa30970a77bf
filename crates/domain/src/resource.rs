use geoperms_core::{AppError, AppResult, NonEmptyString, ResourceId, SubjectId};
use serde::{Deserialize, Serialize};

use crate::capability::ResourceType;
use crate::subject::{Subject, SubjectKind};

/// A catalog resource as seen by the permission subsystem.
///
/// The surrounding catalog owns the resource; this subsystem only reads
/// its type and owner and writes its permission assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    id: ResourceId,
    title: NonEmptyString,
    resource_type: ResourceType,
    owner: Subject,
}

impl Resource {
    /// Creates a resource; the owner must be a user subject.
    pub fn new(
        id: ResourceId,
        title: impl Into<String>,
        resource_type: ResourceType,
        owner: Subject,
    ) -> AppResult<Self> {
        if owner.kind() != SubjectKind::User {
            return Err(AppError::Validation(format!(
                "resource owner must be a user, got {} '{}'",
                owner.kind().as_str(),
                owner.name()
            )));
        }

        Ok(Self {
            id,
            title: NonEmptyString::new(title)?,
            resource_type,
            owner,
        })
    }

    /// Returns the stable resource identifier.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the resource title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Returns the owning user subject.
    #[must_use]
    pub fn owner(&self) -> &Subject {
        &self.owner
    }

    /// Returns whether a subject id is the resource owner.
    #[must_use]
    pub fn is_owned_by(&self, subject_id: SubjectId) -> bool {
        self.owner.id() == subject_id
    }
}
