//! Shared in-memory fakes for service tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use geoperms_core::{AppError, AppResult, ExecutionId, ResourceId, SubjectId};
use geoperms_domain::{PermissionAssignment, Resource, Subject, SubjectKind};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::diff_engine::PermissionOp;
use crate::permission_ports::{
    AssignmentRepository, CreateExecutionInput, ExecutionRepository, ExecutionRequest,
    ExecutionStatus, ResourceRepository, SubjectDirectory,
};

pub struct FakeCatalog {
    resources: Vec<Resource>,
    subjects: Vec<Subject>,
    memberships: Vec<(SubjectId, Subject)>,
    assignments: Mutex<Vec<PermissionAssignment>>,
    pub batches_applied: AtomicUsize,
    fail_batches: bool,
}

impl FakeCatalog {
    pub fn new(resources: Vec<Resource>, subjects: Vec<Subject>) -> Self {
        Self {
            resources,
            subjects,
            memberships: Vec::new(),
            assignments: Mutex::new(Vec::new()),
            batches_applied: AtomicUsize::new(0),
            fail_batches: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    pub fn with_membership(mut self, member: SubjectId, of: Subject) -> Self {
        self.memberships.push((member, of));
        self
    }

    pub async fn seed_assignment(&self, assignment: PermissionAssignment) {
        self.assignments.lock().await.push(assignment);
    }
}

#[async_trait]
impl ResourceRepository for FakeCatalog {
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<Resource>> {
        Ok(self
            .resources
            .iter()
            .find(|resource| resource.id() == resource_id)
            .cloned())
    }
}

#[async_trait]
impl SubjectDirectory for FakeCatalog {
    async fn find_by_id(&self, subject_id: SubjectId) -> AppResult<Option<Subject>> {
        Ok(self
            .subjects
            .iter()
            .find(|subject| subject.id() == subject_id)
            .cloned())
    }

    async fn find_user_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        Ok(self
            .subjects
            .iter()
            .find(|subject| subject.kind() == SubjectKind::User && subject.name() == name)
            .cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        Ok(self
            .subjects
            .iter()
            .find(|subject| subject.kind() == SubjectKind::Group && subject.name() == name)
            .cloned())
    }

    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        Ok(self
            .subjects
            .iter()
            .find(|subject| {
                subject.kind() == SubjectKind::Organization && subject.name() == name
            })
            .cloned())
    }

    async fn list_memberships(&self, subject_id: SubjectId) -> AppResult<Vec<Subject>> {
        Ok(self
            .memberships
            .iter()
            .filter(|(member, _)| *member == subject_id)
            .map(|(_, of)| of.clone())
            .collect())
    }
}

#[async_trait]
impl AssignmentRepository for FakeCatalog {
    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<PermissionAssignment>> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|assignment| assignment.resource_id() == resource_id)
            .cloned()
            .collect())
    }

    async fn find_for_subject(
        &self,
        resource_id: ResourceId,
        subject_id: SubjectId,
    ) -> AppResult<Option<PermissionAssignment>> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .find(|assignment| {
                assignment.resource_id() == resource_id
                    && assignment.subject().id() == subject_id
            })
            .cloned())
    }

    async fn apply_batch(&self, resource_id: ResourceId, ops: &[PermissionOp]) -> AppResult<()> {
        if self.fail_batches {
            return Err(AppError::Storage("assignment store unavailable".to_owned()));
        }

        let mut rows = self.assignments.lock().await;
        for op in ops {
            rows.retain(|assignment| {
                assignment.resource_id() != resource_id
                    || assignment.subject().id() != op.subject().id()
            });
            if let PermissionOp::Grant { subject, flags, .. } = op {
                rows.push(PermissionAssignment::new(
                    resource_id,
                    subject.clone(),
                    flags.clone(),
                )?);
            }
        }
        self.batches_applied.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

pub struct FakeExecutions {
    rows: Mutex<Vec<ExecutionRequest>>,
}

impl FakeExecutions {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    async fn finish(
        &self,
        exec_id: ExecutionId,
        status: ExecutionStatus,
        output: Value,
    ) -> AppResult<ExecutionRequest> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.exec_id == exec_id)
            .ok_or_else(|| AppError::NotFound(format!("execution '{exec_id}'")))?;

        row.status.ensure_transition(status)?;
        row.status = status;
        row.output_params = output;
        let now = Utc::now();
        row.last_updated = now;
        row.finished = Some(now);

        Ok(row.clone())
    }
}

#[async_trait]
impl ExecutionRepository for FakeExecutions {
    async fn create(&self, input: CreateExecutionInput) -> AppResult<ExecutionRequest> {
        let now = Utc::now();
        let execution = ExecutionRequest {
            exec_id: ExecutionId::new(),
            user: input.user,
            func_name: input.func_name,
            resource_id: input.resource_id,
            status: ExecutionStatus::Created,
            input_params: input.input_params,
            output_params: json!({}),
            created: now,
            last_updated: now,
            finished: None,
        };
        self.rows.lock().await.push(execution.clone());

        Ok(execution)
    }

    async fn find(&self, exec_id: ExecutionId) -> AppResult<Option<ExecutionRequest>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.exec_id == exec_id)
            .cloned())
    }

    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<ExecutionRequest>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn claim_next(&self, _worker_id: &str) -> AppResult<Option<ExecutionRequest>> {
        let mut rows = self.rows.lock().await;
        let busy: Vec<ResourceId> = rows
            .iter()
            .filter(|row| row.status == ExecutionStatus::Running)
            .map(|row| row.resource_id)
            .collect();

        let Some(row) = rows.iter_mut().find(|row| {
            row.status == ExecutionStatus::Created && !busy.contains(&row.resource_id)
        }) else {
            return Ok(None);
        };

        row.status.ensure_transition(ExecutionStatus::Running)?;
        row.status = ExecutionStatus::Running;
        row.last_updated = Utc::now();

        Ok(Some(row.clone()))
    }

    async fn complete(&self, exec_id: ExecutionId, output: Value) -> AppResult<ExecutionRequest> {
        self.finish(exec_id, ExecutionStatus::Finished, output).await
    }

    async fn fail(&self, exec_id: ExecutionId, output: Value) -> AppResult<ExecutionRequest> {
        self.finish(exec_id, ExecutionStatus::Failed, output).await
    }
}
