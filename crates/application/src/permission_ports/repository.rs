use async_trait::async_trait;
use geoperms_core::{AppResult, ResourceId, SubjectId};
use geoperms_domain::{PermissionAssignment, Resource, Subject};

use crate::diff_engine::PermissionOp;

/// Read-only port into the catalog's resources.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Returns one resource by id.
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<Resource>>;
}

/// Read-only port into the catalog's principals.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// Returns one subject by id, regardless of kind.
    async fn find_by_id(&self, subject_id: SubjectId) -> AppResult<Option<Subject>>;

    /// Returns one user subject by username.
    async fn find_user_by_name(&self, name: &str) -> AppResult<Option<Subject>>;

    /// Returns one group subject by group name.
    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Subject>>;

    /// Returns one organization subject by name.
    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Subject>>;

    /// Returns the groups and organizations one user belongs to.
    async fn list_memberships(&self, subject_id: SubjectId) -> AppResult<Vec<Subject>>;
}

/// Port over the stored permission assignments of resources.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Lists the stored assignments for one resource.
    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<PermissionAssignment>>;

    /// Returns one subject's stored assignment on one resource.
    async fn find_for_subject(
        &self,
        resource_id: ResourceId,
        subject_id: SubjectId,
    ) -> AppResult<Option<PermissionAssignment>>;

    /// Applies one reconciliation operation set as a single durable batch.
    ///
    /// All-or-nothing: on any failure the prior assignment state must be
    /// left intact.
    async fn apply_batch(&self, resource_id: ResourceId, ops: &[PermissionOp]) -> AppResult<()>;
}
