use std::collections::HashMap;

use async_trait::async_trait;
use geoperms_application::{AssignmentRepository, PermissionOp, ResourceRepository, SubjectDirectory};
use geoperms_core::{AppError, AppResult, ResourceId, SubjectId};
use geoperms_domain::{PermissionAssignment, Resource, Subject, SubjectKind};
use tokio::sync::RwLock;


/// In-memory catalog: resources, subjects, memberships, and assignments.
///
/// Backs development and test deployments; state is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    resources: RwLock<HashMap<ResourceId, Resource>>,
    subjects: RwLock<HashMap<SubjectId, Subject>>,
    memberships: RwLock<HashMap<SubjectId, Vec<SubjectId>>>,
    assignments: RwLock<HashMap<(ResourceId, SubjectId), PermissionAssignment>>,
}

impl InMemoryCatalogRepository {
    /// Creates an empty in-memory catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            subjects: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// Adds one subject to the catalog.
    pub async fn insert_subject(&self, subject: Subject) -> AppResult<()> {
        let mut subjects = self.subjects.write().await;
        if subjects.contains_key(&subject.id()) {
            return Err(AppError::Conflict(format!(
                "subject '{}' already exists",
                subject.name()
            )));
        }

        subjects.insert(subject.id(), subject);
        Ok(())
    }

    /// Adds one resource to the catalog.
    pub async fn insert_resource(&self, resource: Resource) -> AppResult<()> {
        let mut resources = self.resources.write().await;
        if resources.contains_key(&resource.id()) {
            return Err(AppError::Conflict(format!(
                "resource '{}' already exists",
                resource.id()
            )));
        }

        resources.insert(resource.id(), resource);
        Ok(())
    }

    /// Records one user's membership in a group or organization.
    pub async fn add_membership(&self, member: SubjectId, of: SubjectId) -> AppResult<()> {
        let subjects = self.subjects.read().await;
        if !subjects.contains_key(&member) || !subjects.contains_key(&of) {
            return Err(AppError::NotFound(
                "membership references an unknown subject".to_owned(),
            ));
        }
        drop(subjects);

        self.memberships
            .write()
            .await
            .entry(member)
            .or_default()
            .push(of);

        Ok(())
    }

    /// Stores one assignment directly, bypassing reconciliation.
    pub async fn seed_assignment(&self, assignment: PermissionAssignment) {
        self.assignments
            .write()
            .await
            .insert((assignment.resource_id(), assignment.subject().id()), assignment);
    }

    async fn find_by_kind_and_name(&self, kind: SubjectKind, name: &str) -> Option<Subject> {
        self.subjects
            .read()
            .await
            .values()
            .find(|subject| subject.kind() == kind && subject.name() == name)
            .cloned()
    }
}

#[async_trait]
impl ResourceRepository for InMemoryCatalogRepository {
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<Resource>> {
        Ok(self.resources.read().await.get(&resource_id).cloned())
    }
}

#[async_trait]
impl SubjectDirectory for InMemoryCatalogRepository {
    async fn find_by_id(&self, subject_id: SubjectId) -> AppResult<Option<Subject>> {
        Ok(self.subjects.read().await.get(&subject_id).cloned())
    }

    async fn find_user_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        Ok(self.find_by_kind_and_name(SubjectKind::User, name).await)
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        Ok(self.find_by_kind_and_name(SubjectKind::Group, name).await)
    }

    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        Ok(self
            .find_by_kind_and_name(SubjectKind::Organization, name)
            .await)
    }

    async fn list_memberships(&self, subject_id: SubjectId) -> AppResult<Vec<Subject>> {
        let memberships = self.memberships.read().await;
        let Some(ids) = memberships.get(&subject_id) else {
            return Ok(Vec::new());
        };

        let subjects = self.subjects.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| subjects.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryCatalogRepository {
    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<PermissionAssignment>> {
        let assignments = self.assignments.read().await;

        let mut values: Vec<PermissionAssignment> = assignments
            .iter()
            .filter_map(|((stored_resource_id, _), assignment)| {
                (*stored_resource_id == resource_id).then_some(assignment.clone())
            })
            .collect();
        values.sort_by(|left, right| left.subject().name().cmp(right.subject().name()));

        Ok(values)
    }

    async fn find_for_subject(
        &self,
        resource_id: ResourceId,
        subject_id: SubjectId,
    ) -> AppResult<Option<PermissionAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .get(&(resource_id, subject_id))
            .cloned())
    }

    async fn apply_batch(&self, resource_id: ResourceId, ops: &[PermissionOp]) -> AppResult<()> {
        // Grants are constructed before anything is touched, so a bad
        // operation leaves the stored state intact.
        let mut grants = Vec::new();
        for op in ops {
            if let PermissionOp::Grant { subject, flags, .. } = op {
                grants.push(PermissionAssignment::new(
                    resource_id,
                    subject.clone(),
                    flags.clone(),
                )?);
            }
        }

        let mut assignments = self.assignments.write().await;
        for op in ops {
            assignments.remove(&(resource_id, op.subject().id()));
        }
        for grant in grants {
            assignments.insert((resource_id, grant.subject().id()), grant);
        }

        Ok(())
    }
}
