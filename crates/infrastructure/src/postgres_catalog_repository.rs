use async_trait::async_trait;
use geoperms_application::{
    AssignmentRepository, PermissionOp, ResourceRepository, SubjectDirectory,
};
use geoperms_core::{AppError, AppResult, ResourceId, SubjectId};
use geoperms_domain::{
    FlagSet, PermissionAssignment, PermissionFlag, Resource, ResourceType, Subject, SubjectKind,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;


/// PostgreSQL-backed catalog: resources, subjects, and assignments.
#[derive(Clone)]
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    /// Creates a catalog repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_subject_where(
        &self,
        condition: &str,
        bind: &str,
    ) -> AppResult<Option<Subject>> {
        let query = format!(
            "SELECT id, kind, name, title, is_admin FROM subjects WHERE {condition}"
        );
        let row = sqlx::query_as::<_, SubjectRow>(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Storage(format!("failed to load subject: {error}")))?;

        row.map(SubjectRow::into_subject).transpose()
    }
}

#[derive(Debug, FromRow)]
struct SubjectRow {
    id: Uuid,
    kind: String,
    name: String,
    title: String,
    is_admin: bool,
}

impl SubjectRow {
    fn into_subject(self) -> AppResult<Subject> {
        let id = SubjectId::from_uuid(self.id);
        match SubjectKind::parse(&self.kind)? {
            SubjectKind::User => Subject::user(id, self.name, self.title, self.is_admin),
            SubjectKind::Group => Subject::group(id, self.name, self.title),
            SubjectKind::Organization => Subject::organization(id, self.name, self.title),
        }
    }
}

#[derive(Debug, FromRow)]
struct ResourceRow {
    id: Uuid,
    title: String,
    resource_type: String,
    owner_id: Uuid,
    owner_name: String,
    owner_title: String,
    owner_is_admin: bool,
}

impl ResourceRow {
    fn into_resource(self) -> AppResult<Resource> {
        let owner = Subject::user(
            SubjectId::from_uuid(self.owner_id),
            self.owner_name,
            self.owner_title,
            self.owner_is_admin,
        )?;

        Resource::new(
            ResourceId::from_uuid(self.id),
            self.title,
            ResourceType::parse(&self.resource_type)?,
            owner,
        )
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    resource_id: Uuid,
    flags: Vec<String>,
    subject_id: Uuid,
    subject_kind: String,
    subject_name: String,
    subject_title: String,
    subject_is_admin: bool,
}

impl AssignmentRow {
    fn into_assignment(self) -> AppResult<PermissionAssignment> {
        let subject = SubjectRow {
            id: self.subject_id,
            kind: self.subject_kind,
            name: self.subject_name,
            title: self.subject_title,
            is_admin: self.subject_is_admin,
        }
        .into_subject()?;

        let mut flags = FlagSet::new();
        for flag in &self.flags {
            flags.insert(PermissionFlag::parse(flag)?);
        }

        PermissionAssignment::new(ResourceId::from_uuid(self.resource_id), subject, flags)
    }
}

const ASSIGNMENT_COLUMNS: &str = r#"
    a.resource_id,
    a.flags,
    s.id AS subject_id,
    s.kind AS subject_kind,
    s.name AS subject_name,
    s.title AS subject_title,
    s.is_admin AS subject_is_admin
"#;

#[async_trait]
impl ResourceRepository for PostgresCatalogRepository {
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT
                r.id,
                r.title,
                r.resource_type,
                s.id AS owner_id,
                s.name AS owner_name,
                s.title AS owner_title,
                s.is_admin AS owner_is_admin
            FROM resources r
            INNER JOIN subjects s ON s.id = r.owner_id
            WHERE r.id = $1
            "#,
        )
        .bind(resource_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to load resource '{resource_id}': {error}"))
        })?;

        row.map(ResourceRow::into_resource).transpose()
    }
}

#[async_trait]
impl SubjectDirectory for PostgresCatalogRepository {
    async fn find_by_id(&self, subject_id: SubjectId) -> AppResult<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, kind, name, title, is_admin FROM subjects WHERE id = $1",
        )
        .bind(subject_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to load subject '{subject_id}': {error}"))
        })?;

        row.map(SubjectRow::into_subject).transpose()
    }

    async fn find_user_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        self.find_subject_where("kind = 'user' AND name = $1", name)
            .await
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        self.find_subject_where("kind = 'group' AND name = $1", name)
            .await
    }

    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Subject>> {
        self.find_subject_where("kind = 'organization' AND name = $1", name)
            .await
    }

    async fn list_memberships(&self, subject_id: SubjectId) -> AppResult<Vec<Subject>> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            r#"
            SELECT s.id, s.kind, s.name, s.title, s.is_admin
            FROM memberships m
            INNER JOIN subjects s ON s.id = m.group_id
            WHERE m.member_id = $1
            ORDER BY s.name ASC
            "#,
        )
        .bind(subject_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!(
                "failed to load memberships of '{subject_id}': {error}"
            ))
        })?;

        rows.into_iter().map(SubjectRow::into_subject).collect()
    }
}

#[async_trait]
impl AssignmentRepository for PostgresCatalogRepository {
    async fn list_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<PermissionAssignment>> {
        let query = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM permission_assignments a
            INNER JOIN subjects s ON s.id = a.subject_id
            WHERE a.resource_id = $1
            ORDER BY s.name ASC
            "#
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&query)
            .bind(resource_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Storage(format!(
                    "failed to load assignments of '{resource_id}': {error}"
                ))
            })?;

        rows.into_iter().map(AssignmentRow::into_assignment).collect()
    }

    async fn find_for_subject(
        &self,
        resource_id: ResourceId,
        subject_id: SubjectId,
    ) -> AppResult<Option<PermissionAssignment>> {
        let query = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM permission_assignments a
            INNER JOIN subjects s ON s.id = a.subject_id
            WHERE a.resource_id = $1 AND a.subject_id = $2
            "#
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&query)
            .bind(resource_id.as_uuid())
            .bind(subject_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Storage(format!(
                    "failed to load assignment of '{subject_id}' on '{resource_id}': {error}"
                ))
            })?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn apply_batch(&self, resource_id: ResourceId, ops: &[PermissionOp]) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Storage(format!("failed to start assignment transaction: {error}"))
        })?;

        for op in ops {
            sqlx::query(
                "DELETE FROM permission_assignments WHERE resource_id = $1 AND subject_id = $2",
            )
            .bind(resource_id.as_uuid())
            .bind(op.subject().id().as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Storage(format!(
                    "failed to clear assignment of '{}': {error}",
                    op.subject().name()
                ))
            })?;

            if let PermissionOp::Grant { subject, flags, .. } = op {
                let flag_values: Vec<&str> =
                    flags.iter().map(PermissionFlag::as_str).collect();

                sqlx::query(
                    r#"
                    INSERT INTO permission_assignments (resource_id, subject_id, flags)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(resource_id.as_uuid())
                .bind(subject.id().as_uuid())
                .bind(&flag_values)
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Storage(format!(
                        "failed to store assignment of '{}': {error}",
                        subject.name()
                    ))
                })?;
            }
        }

        transaction.commit().await.map_err(|error| {
            AppError::Storage(format!("failed to commit assignment batch: {error}"))
        })?;

        Ok(())
    }
}
