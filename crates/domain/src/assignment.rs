use geoperms_core::{AppError, AppResult, ResourceId};
use serde::{Deserialize, Serialize};

use crate::capability::{Compaction, FlagSet, ResourceType};
use crate::subject::Subject;

/// One subject's stored permission state on one resource.
///
/// The store keeps the expanded fine-grained flags; compact levels are
/// derived on read. Unique per `(resource, subject)`; an empty flag set is
/// represented by absence, so an assignment always carries a real grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionAssignment {
    resource_id: ResourceId,
    subject: Subject,
    flags: FlagSet,
}

impl PermissionAssignment {
    /// Creates an assignment; an empty flag set is not storable.
    pub fn new(resource_id: ResourceId, subject: Subject, flags: FlagSet) -> AppResult<Self> {
        if flags.is_empty() {
            return Err(AppError::Validation(format!(
                "subject '{}' cannot be assigned an empty flag set; revoke instead",
                subject.name()
            )));
        }

        Ok(Self {
            resource_id,
            subject,
            flags,
        })
    }

    /// Returns the resource the assignment applies to.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Returns the holding subject.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Returns the stored fine-grained flags.
    #[must_use]
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Compacts the stored flags to the nearest level for one resource type.
    #[must_use]
    pub fn compact(&self, resource_type: ResourceType) -> Compaction {
        resource_type.compact(&self.flags)
    }
}
