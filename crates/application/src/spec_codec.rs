use std::sync::Arc;

use geoperms_core::{AppError, AppResult};
use geoperms_domain::{
    ANONYMOUS_GROUP_NAME, CompactLevel, PermissionAssignment, PermissionSpec,
    REGISTERED_MEMBERS_GROUP_NAME, Resource, ResourceType, SpecEntry, Subject, SubjectKind,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::permission_ports::SubjectDirectory;

#[cfg(test)]
mod tests;

/// Wire shape of one user entry in a permission document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Stable subject id; optional on input when `username` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Username; optional on input when `id` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Compact level name.
    pub permissions: String,
}

/// Wire shape of one group or organization entry in a permission document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Stable subject id; optional on input when `name` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Group or organization name; optional on input when `id` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// User-facing title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Compact level name.
    pub permissions: String,
}

/// Wire representation of a permission spec: `{users, groups,
/// organizations}`.
///
/// Sections absent from input are treated as empty, which under merge
/// semantics means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDocument {
    /// Per-user entries.
    #[serde(default)]
    pub users: Vec<UserEntry>,
    /// Per-group entries, including the builtin pseudo-groups.
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    /// Per-organization entries.
    #[serde(default)]
    pub organizations: Vec<GroupEntry>,
}

/// Parses and serializes permission documents against the catalog.
///
/// Rejects malformed or ambiguous input before anything reaches the diff
/// engine; the whole document is rejected, never partially applied.
#[derive(Clone)]
pub struct SpecCodec {
    directory: Arc<dyn SubjectDirectory>,
}

impl SpecCodec {
    /// Creates a codec resolving subjects through the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn SubjectDirectory>) -> Self {
        Self { directory }
    }

    /// Turns a wire document into a validated permission spec.
    pub async fn parse(
        &self,
        resource: &Resource,
        document: &PermissionDocument,
    ) -> AppResult<PermissionSpec> {
        let resource_type = resource.resource_type();
        let mut entries = Vec::new();

        for entry in &document.users {
            let subject = self.resolve_user(entry).await?;
            let level = parse_level(resource_type, entry.permissions.as_str())?;
            validate_owner_rules(resource, &subject, level)?;
            entries.push(SpecEntry::new(subject, level));
        }

        for entry in &document.groups {
            let subject = self
                .resolve_group_like(entry, SubjectKind::Group)
                .await?;
            let level = parse_level(resource_type, entry.permissions.as_str())?;
            validate_owner_rules(resource, &subject, level)?;
            validate_anonymous_ceiling(resource_type, &subject, level)?;
            entries.push(SpecEntry::new(subject, level));
        }

        for entry in &document.organizations {
            let subject = self
                .resolve_group_like(entry, SubjectKind::Organization)
                .await?;
            let level = parse_level(resource_type, entry.permissions.as_str())?;
            validate_owner_rules(resource, &subject, level)?;
            entries.push(SpecEntry::new(subject, level));
        }

        PermissionSpec::new(entries)
    }

    /// Serializes the current assignment state back into the wire shape.
    ///
    /// The owner is always present with level `owner`; the builtin
    /// pseudo-groups are always present, defaulting to `none`.
    pub async fn serialize(
        &self,
        resource: &Resource,
        assignments: &[PermissionAssignment],
    ) -> AppResult<PermissionDocument> {
        let owner = resource.owner();

        let mut users = vec![UserEntry {
            id: Some(owner.id().as_uuid()),
            username: Some(owner.name().to_owned()),
            permissions: CompactLevel::Owner.as_str().to_owned(),
        }];
        let mut groups = Vec::new();
        let mut organizations = Vec::new();

        let mut anonymous_entry = self
            .builtin_group_entry(ANONYMOUS_GROUP_NAME, "anonymous")
            .await?;
        let mut registered_entry = self
            .builtin_group_entry(REGISTERED_MEMBERS_GROUP_NAME, "Registered Members")
            .await?;

        for assignment in assignments {
            let subject = assignment.subject();
            if subject.id() == owner.id() {
                continue;
            }

            let Some(level) = compact_stored_flags(resource, assignment) else {
                continue;
            };

            match subject.kind() {
                SubjectKind::User => users.push(UserEntry {
                    id: Some(subject.id().as_uuid()),
                    username: Some(subject.name().to_owned()),
                    permissions: level.as_str().to_owned(),
                }),
                SubjectKind::Group => {
                    let entry = GroupEntry {
                        id: Some(subject.id().as_uuid()),
                        name: Some(subject.name().to_owned()),
                        title: Some(subject.title().to_owned()),
                        permissions: level.as_str().to_owned(),
                    };

                    if subject.is_anonymous_group() {
                        anonymous_entry = entry;
                    } else if subject.is_registered_members_group() {
                        registered_entry = entry;
                    } else {
                        groups.push(entry);
                    }
                }
                SubjectKind::Organization => organizations.push(GroupEntry {
                    id: Some(subject.id().as_uuid()),
                    name: Some(subject.name().to_owned()),
                    title: Some(subject.title().to_owned()),
                    permissions: level.as_str().to_owned(),
                }),
            }
        }

        users[1..].sort_by(|left, right| left.username.cmp(&right.username));
        groups.sort_by(|left, right| left.name.cmp(&right.name));
        organizations.sort_by(|left, right| left.name.cmp(&right.name));

        let mut all_groups = vec![anonymous_entry, registered_entry];
        all_groups.extend(groups);

        Ok(PermissionDocument {
            users,
            groups: all_groups,
            organizations,
        })
    }

    async fn resolve_user(&self, entry: &UserEntry) -> AppResult<Subject> {
        let subject = if let Some(id) = entry.id {
            self.directory
                .find_by_id(geoperms_core::SubjectId::from_uuid(id))
                .await?
        } else if let Some(username) = entry.username.as_deref() {
            self.directory.find_user_by_name(username).await?
        } else {
            return Err(AppError::Validation(
                "user entry requires an id or a username".to_owned(),
            ));
        };

        let reference = entry
            .username
            .clone()
            .or_else(|| entry.id.map(|id| id.to_string()))
            .unwrap_or_default();
        let subject =
            subject.ok_or_else(|| AppError::UnknownSubject(format!("user '{reference}'")))?;

        if subject.kind() != SubjectKind::User {
            return Err(AppError::Validation(format!(
                "subject '{}' is listed under users but is a {}",
                subject.name(),
                subject.kind().as_str()
            )));
        }

        Ok(subject)
    }

    async fn resolve_group_like(&self, entry: &GroupEntry, kind: SubjectKind) -> AppResult<Subject> {
        let subject = if let Some(id) = entry.id {
            self.directory
                .find_by_id(geoperms_core::SubjectId::from_uuid(id))
                .await?
        } else if let Some(name) = entry.name.as_deref() {
            match kind {
                SubjectKind::Group => self.directory.find_group_by_name(name).await?,
                SubjectKind::Organization => {
                    self.directory.find_organization_by_name(name).await?
                }
                SubjectKind::User => None,
            }
        } else {
            return Err(AppError::Validation(format!(
                "{} entry requires an id or a name",
                kind.as_str()
            )));
        };

        let reference = entry
            .name
            .clone()
            .or_else(|| entry.id.map(|id| id.to_string()))
            .unwrap_or_default();
        let subject = subject.ok_or_else(|| {
            AppError::UnknownSubject(format!("{} '{reference}'", kind.as_str()))
        })?;

        if subject.kind() != kind {
            return Err(AppError::Validation(format!(
                "subject '{}' is listed under {}s but is a {}",
                subject.name(),
                kind.as_str(),
                subject.kind().as_str()
            )));
        }

        Ok(subject)
    }

    async fn builtin_group_entry(
        &self,
        name: &str,
        fallback_title: &str,
    ) -> AppResult<GroupEntry> {
        let subject = self.directory.find_group_by_name(name).await?;

        Ok(match subject {
            Some(group) => GroupEntry {
                id: Some(group.id().as_uuid()),
                name: Some(group.name().to_owned()),
                title: Some(group.title().to_owned()),
                permissions: CompactLevel::None.as_str().to_owned(),
            },
            None => GroupEntry {
                id: None,
                name: Some(name.to_owned()),
                title: Some(fallback_title.to_owned()),
                permissions: CompactLevel::None.as_str().to_owned(),
            },
        })
    }
}

fn parse_level(resource_type: ResourceType, value: &str) -> AppResult<CompactLevel> {
    let level = CompactLevel::parse(value)?;
    if !resource_type.supports_level(level) {
        return Err(AppError::InvalidLevel(format!(
            "compact level '{}' is not defined for resource type '{}'",
            level.as_str(),
            resource_type.as_str()
        )));
    }

    Ok(level)
}

fn validate_owner_rules(
    resource: &Resource,
    subject: &Subject,
    level: CompactLevel,
) -> AppResult<()> {
    if resource.is_owned_by(subject.id()) {
        if level != CompactLevel::Owner {
            return Err(AppError::Validation(format!(
                "the owner '{}' can only be listed with level 'owner'",
                subject.name()
            )));
        }

        return Ok(());
    }

    if level == CompactLevel::Owner {
        return Err(AppError::Validation(format!(
            "subject '{}' cannot be granted level 'owner'; only the resource owner holds it",
            subject.name()
        )));
    }

    Ok(())
}

fn validate_anonymous_ceiling(
    resource_type: ResourceType,
    subject: &Subject,
    level: CompactLevel,
) -> AppResult<()> {
    if subject.is_anonymous_group() && level > resource_type.anonymous_ceiling() {
        return Err(AppError::Validation(format!(
            "the anonymous group cannot hold level '{}' on a {}; ceiling is '{}'",
            level.as_str(),
            resource_type.as_str(),
            resource_type.anonymous_ceiling().as_str()
        )));
    }

    Ok(())
}

fn compact_stored_flags(
    resource: &Resource,
    assignment: &PermissionAssignment,
) -> Option<CompactLevel> {
    let compaction = assignment.compact(resource.resource_type());

    if !compaction.is_exact() {
        warn!(
            resource_id = %resource.id(),
            subject = assignment.subject().name(),
            level = compaction.level.as_str(),
            unmatched = ?compaction.unmatched,
            "stored flags diverge from the capability table"
        );
    }

    (compaction.level != CompactLevel::None).then_some(compaction.level)
}
