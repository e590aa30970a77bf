use std::sync::Arc;

use geoperms_core::auth::CallerIdentity;
use geoperms_core::{AppError, AppResult, ExecutionId, ResourceId};
use geoperms_domain::{
    ANONYMOUS_GROUP_NAME, CompactLevel, PermissionFlag, REGISTERED_MEMBERS_GROUP_NAME, Resource,
    ResourceType, Subject,
};
use serde::Serialize;
use tracing::info;

use crate::diff_engine::ApplyMode;
use crate::execution_service::ExecutionTracker;
use crate::permission_ports::{
    AssignmentRepository, ExecutionRequest, ReconciliationJob, ResourceRepository,
    SubjectDirectory,
};
use crate::spec_codec::{PermissionDocument, SpecCodec};


/// Receipt for an accepted permission change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledReconciliation {
    /// Always `created` at acceptance time.
    pub status: crate::permission_ports::ExecutionStatus,
    /// Identifier to poll for the outcome.
    pub execution_id: ExecutionId,
    /// Relative URL of the execution's status endpoint.
    pub status_url: String,
}

/// Entry point enforcing who may read or change a resource's permissions.
///
/// Reads answer from stored state directly; writes are validated up front
/// and then handed to the execution tracker, so the caller gets a receipt
/// rather than the applied state.
#[derive(Clone)]
pub struct PermissionGateway {
    resources: Arc<dyn ResourceRepository>,
    directory: Arc<dyn SubjectDirectory>,
    assignments: Arc<dyn AssignmentRepository>,
    tracker: ExecutionTracker,
    codec: SpecCodec,
}

impl PermissionGateway {
    /// Creates a gateway over the given repositories and tracker.
    #[must_use]
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        directory: Arc<dyn SubjectDirectory>,
        assignments: Arc<dyn AssignmentRepository>,
        tracker: ExecutionTracker,
        codec: SpecCodec,
    ) -> Self {
        Self {
            resources,
            directory,
            assignments,
            tracker,
            codec,
        }
    }

    /// Returns the compact permission document for one resource.
    pub async fn get_permissions(
        &self,
        caller: &CallerIdentity,
        resource_id: ResourceId,
    ) -> AppResult<PermissionDocument> {
        let resource = self.find_resource(resource_id).await?;
        self.ensure_can_read(caller, &resource).await?;

        let assignments = self.assignments.list_for_resource(resource_id).await?;
        self.codec.serialize(&resource, &assignments).await
    }

    /// Validates a target document and schedules its reconciliation.
    ///
    /// Rejections happen here, before any execution exists; acceptance
    /// returns a receipt pointing at the execution to poll.
    pub async fn set_permissions(
        &self,
        caller: &CallerIdentity,
        resource_id: ResourceId,
        document: PermissionDocument,
        mode: ApplyMode,
    ) -> AppResult<ScheduledReconciliation> {
        let resource = self.find_resource(resource_id).await?;
        self.ensure_can_manage(caller, &resource).await?;
        let requester = caller.subject().ok_or_else(|| {
            AppError::Unauthorized("permission changes require a caller".to_owned())
        })?;

        self.codec.parse(&resource, &document).await?;

        let execution = self
            .tracker
            .schedule(ReconciliationJob {
                resource_id,
                mode,
                permissions: document,
                requester: requester.to_owned(),
            })
            .await?;

        info!(
            resource_id = %resource_id,
            execution_id = %execution.exec_id,
            requester,
            mode = mode.as_str(),
            "permission change accepted"
        );

        Ok(ScheduledReconciliation {
            status: execution.status,
            execution_id: execution.exec_id,
            status_url: format!("/api/executions/{}", execution.exec_id),
        })
    }

    /// Returns one execution, visible to its requester and administrators.
    pub async fn get_execution(
        &self,
        caller: &CallerIdentity,
        exec_id: ExecutionId,
    ) -> AppResult<ExecutionRequest> {
        let subject_name = caller
            .subject()
            .ok_or_else(|| AppError::Unauthorized("execution status requires a caller".to_owned()))?;

        let execution = self.tracker.get_status(exec_id).await?;
        if !caller.is_admin() && execution.user != subject_name {
            return Err(AppError::Forbidden(format!(
                "execution '{exec_id}' belongs to another requester"
            )));
        }

        Ok(execution)
    }

    /// Lists a resource's executions for callers who may manage it.
    pub async fn list_executions(
        &self,
        caller: &CallerIdentity,
        resource_id: ResourceId,
    ) -> AppResult<Vec<ExecutionRequest>> {
        let resource = self.find_resource(resource_id).await?;
        self.ensure_can_manage(caller, &resource).await?;

        self.tracker.list_for_resource(resource_id).await
    }

    /// Computes the caller's strongest compact level on one resource.
    ///
    /// Administrators rate `manage` everywhere; the owner rates `owner`;
    /// everyone else gets the maximum over their own assignment, their
    /// memberships, and the builtin pseudo-groups that apply to them.
    pub async fn effective_level(
        &self,
        caller: &CallerIdentity,
        resource: &Resource,
    ) -> AppResult<CompactLevel> {
        if caller.is_admin() {
            return Ok(CompactLevel::Manage);
        }

        let Some(subject_name) = caller.subject() else {
            let anonymous_level = self
                .group_level(resource, ANONYMOUS_GROUP_NAME)
                .await?
                .unwrap_or(CompactLevel::None);

            return Ok(anonymous_level);
        };

        let subject = self
            .directory
            .find_user_by_name(subject_name)
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized(format!("unknown subject '{subject_name}'"))
            })?;

        if subject.is_admin() {
            return Ok(CompactLevel::Manage);
        }
        if resource.is_owned_by(subject.id()) {
            return Ok(CompactLevel::Owner);
        }

        let mut level = self
            .subject_level(resource, &subject)
            .await?
            .unwrap_or(CompactLevel::None);

        for builtin in [ANONYMOUS_GROUP_NAME, REGISTERED_MEMBERS_GROUP_NAME] {
            if let Some(group_level) = self.group_level(resource, builtin).await? {
                level = level.max(group_level);
            }
        }

        for membership in self.directory.list_memberships(subject.id()).await? {
            if let Some(member_level) = self.subject_level(resource, &membership).await? {
                level = level.max(member_level);
            }
        }

        Ok(level)
    }

    /// Describes every resource type's capability table.
    #[must_use]
    pub fn resource_types(&self) -> Vec<ResourceTypeDescriptor> {
        ResourceType::all()
            .iter()
            .map(|resource_type| ResourceTypeDescriptor::for_type(*resource_type))
            .collect()
    }

    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Resource> {
        self.resources
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}'")))
    }

    async fn ensure_can_read(
        &self,
        caller: &CallerIdentity,
        resource: &Resource,
    ) -> AppResult<()> {
        let level = self.effective_level(caller, resource).await?;
        if level < CompactLevel::View {
            return Err(AppError::Forbidden(format!(
                "resource '{}' is not visible to this caller",
                resource.id()
            )));
        }

        Ok(())
    }

    async fn ensure_can_manage(
        &self,
        caller: &CallerIdentity,
        resource: &Resource,
    ) -> AppResult<()> {
        if caller.is_anonymous() {
            return Err(AppError::Forbidden(
                "anonymous callers cannot change permissions".to_owned(),
            ));
        }

        let level = self.effective_level(caller, resource).await?;
        if level < CompactLevel::Manage {
            return Err(AppError::Forbidden(format!(
                "changing permissions on resource '{}' requires level 'manage'",
                resource.id()
            )));
        }

        Ok(())
    }

    async fn subject_level(
        &self,
        resource: &Resource,
        subject: &Subject,
    ) -> AppResult<Option<CompactLevel>> {
        let assignment = self
            .assignments
            .find_for_subject(resource.id(), subject.id())
            .await?;

        Ok(assignment.map(|assignment| assignment.compact(resource.resource_type()).level))
    }

    async fn group_level(
        &self,
        resource: &Resource,
        group_name: &str,
    ) -> AppResult<Option<CompactLevel>> {
        let Some(group) = self.directory.find_group_by_name(group_name).await? else {
            return Ok(None);
        };

        self.subject_level(resource, &group).await
    }
}

/// Capability table of one resource type, for permission editors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceTypeDescriptor {
    /// Resource type name.
    pub name: String,
    /// Grantable flags and compact choices per audience.
    pub allowed_perms: AllowedPerms,
}

/// Grantable permissions split by audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedPerms {
    /// Fine-grained flag ceilings per audience.
    pub perms: AudienceFlags,
    /// Compact level choices per audience.
    pub compact: AudienceChoices,
}

/// Fine-grained flag ceilings per audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudienceFlags {
    /// Strongest flags grantable to the anonymous pseudo-group.
    pub anonymous: Vec<String>,
    /// Strongest flags grantable to named users and groups.
    pub default: Vec<String>,
    /// Strongest flags grantable to the registered-members pseudo-group.
    #[serde(rename = "registered-members")]
    pub registered_members: Vec<String>,
}

/// Compact level choices per audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudienceChoices {
    /// Levels offered for the anonymous pseudo-group.
    pub anonymous: Vec<LevelChoice>,
    /// Levels offered for named users and groups.
    pub default: Vec<LevelChoice>,
    /// Levels offered for the registered-members pseudo-group.
    #[serde(rename = "registered-members")]
    pub registered_members: Vec<LevelChoice>,
}

/// One selectable compact level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelChoice {
    /// Stable level name.
    pub name: String,
    /// User-facing label for the level on this resource type.
    pub label: String,
}

impl ResourceTypeDescriptor {
    fn for_type(resource_type: ResourceType) -> Self {
        let ceiling = resource_type.anonymous_ceiling();

        Self {
            name: resource_type.as_str().to_owned(),
            allowed_perms: AllowedPerms {
                perms: AudienceFlags {
                    anonymous: flag_names(resource_type, ceiling),
                    default: flag_names(resource_type, CompactLevel::Manage),
                    registered_members: flag_names(resource_type, CompactLevel::Manage),
                },
                compact: AudienceChoices {
                    anonymous: level_choices(resource_type, ceiling),
                    default: level_choices(resource_type, CompactLevel::Owner),
                    registered_members: level_choices(resource_type, CompactLevel::Manage),
                },
            },
        }
    }
}

fn flag_names(resource_type: ResourceType, level: CompactLevel) -> Vec<String> {
    resource_type
        .expand(level)
        .unwrap_or_default()
        .iter()
        .map(|flag| PermissionFlag::as_str(flag).to_owned())
        .collect()
}

fn level_choices(resource_type: ResourceType, up_to: CompactLevel) -> Vec<LevelChoice> {
    resource_type
        .compact_levels()
        .iter()
        .filter(|level| **level <= up_to)
        .map(|level| LevelChoice {
            name: level.as_str().to_owned(),
            label: level.label(resource_type).to_owned(),
        })
        .collect()
}
