//! Domain model for the Geoperms permission subsystem.

#![forbid(unsafe_code)]

/// Compact permission levels and their fine-grained expansions.
pub mod capability;
/// Permission assignments held by subjects on resources.
pub mod assignment;
/// Catalog resources as seen by the permission subsystem.
pub mod resource;
/// Users, groups, organizations, and builtin pseudo-subjects.
pub mod subject;
/// Validated target permission specifications.
pub mod permission_spec;

pub use assignment::PermissionAssignment;
pub use capability::{Compaction, CompactLevel, FlagSet, PermissionFlag, ResourceType};
pub use permission_spec::{PermissionSpec, SpecEntry};
pub use resource::Resource;
pub use subject::{
    ANONYMOUS_GROUP_NAME, REGISTERED_MEMBERS_GROUP_NAME, Subject, SubjectKind,
};
