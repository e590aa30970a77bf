use std::sync::Arc;

use geoperms_core::{AppError, ResourceId, SubjectId};
use geoperms_domain::{
    ANONYMOUS_GROUP_NAME, CompactLevel, PermissionAssignment, REGISTERED_MEMBERS_GROUP_NAME,
    Resource, ResourceType, Subject,
};

use crate::test_support::FakeCatalog;

use super::{GroupEntry, PermissionDocument, SpecCodec, UserEntry};

fn user(name: &str) -> Subject {
    let Ok(subject) = Subject::user(SubjectId::new(), name, name, false) else {
        panic!("user construction failed");
    };

    subject
}

fn group(name: &str) -> Subject {
    let Ok(subject) = Subject::group(SubjectId::new(), name, name) else {
        panic!("group construction failed");
    };

    subject
}

fn dataset(owner: &Subject) -> Resource {
    let Ok(resource) = Resource::new(
        ResourceId::new(),
        "Elevation",
        ResourceType::Dataset,
        owner.clone(),
    ) else {
        panic!("resource construction failed");
    };

    resource
}

fn map(owner: &Subject) -> Resource {
    let Ok(resource) = Resource::new(ResourceId::new(), "Atlas", ResourceType::Map, owner.clone())
    else {
        panic!("resource construction failed");
    };

    resource
}

fn user_entry_by_name(name: &str, level: &str) -> UserEntry {
    UserEntry {
        id: None,
        username: Some(name.to_owned()),
        permissions: level.to_owned(),
    }
}

fn group_entry_by_name(name: &str, level: &str) -> GroupEntry {
    GroupEntry {
        id: None,
        name: Some(name.to_owned()),
        title: None,
        permissions: level.to_owned(),
    }
}

fn codec(subjects: Vec<Subject>) -> SpecCodec {
    SpecCodec::new(Arc::new(FakeCatalog::new(Vec::new(), subjects)))
}

#[tokio::test]
async fn entries_resolve_by_id_or_by_name() {
    let owner = user("bobby");
    let norman = user("norman");
    let resource = dataset(&owner);
    let codec = codec(vec![owner, norman.clone()]);

    let document = PermissionDocument {
        users: vec![
            UserEntry {
                id: Some(norman.id().as_uuid()),
                username: None,
                permissions: "view".to_owned(),
            },
            user_entry_by_name("norman", "edit"),
        ],
        ..PermissionDocument::default()
    };

    // Both entries resolve to the same subject, so the duplicate check
    // fires; resolution itself succeeded for each form.
    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn unknown_subjects_are_rejected_whole() {
    let owner = user("bobby");
    let resource = dataset(&owner);
    let codec = codec(vec![owner]);

    let document = PermissionDocument {
        users: vec![user_entry_by_name("nobody", "view")],
        ..PermissionDocument::default()
    };

    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::UnknownSubject(_))));
}

#[tokio::test]
async fn entry_without_id_or_name_is_rejected() {
    let owner = user("bobby");
    let resource = dataset(&owner);
    let codec = codec(vec![owner]);

    let document = PermissionDocument {
        users: vec![UserEntry {
            id: None,
            username: None,
            permissions: "view".to_owned(),
        }],
        ..PermissionDocument::default()
    };

    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn owner_cannot_be_demoted() {
    let owner = user("bobby");
    let resource = dataset(&owner);
    let codec = codec(vec![owner]);

    let document = PermissionDocument {
        users: vec![user_entry_by_name("bobby", "view")],
        ..PermissionDocument::default()
    };

    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn non_owner_cannot_hold_owner_level() {
    let owner = user("bobby");
    let norman = user("norman");
    let resource = dataset(&owner);
    let codec = codec(vec![owner, norman]);

    let document = PermissionDocument {
        users: vec![user_entry_by_name("norman", "owner")],
        ..PermissionDocument::default()
    };

    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn download_on_a_map_is_an_invalid_level() {
    let owner = user("bobby");
    let norman = user("norman");
    let resource = map(&owner);
    let codec = codec(vec![owner, norman]);

    let document = PermissionDocument {
        users: vec![user_entry_by_name("norman", "download")],
        ..PermissionDocument::default()
    };

    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::InvalidLevel(_))));
}

#[tokio::test]
async fn anonymous_group_is_capped_at_its_ceiling() {
    let owner = user("bobby");
    let anonymous = group(ANONYMOUS_GROUP_NAME);
    let resource = dataset(&owner);
    let codec = codec(vec![owner, anonymous]);

    let capped = PermissionDocument {
        groups: vec![group_entry_by_name(ANONYMOUS_GROUP_NAME, "edit")],
        ..PermissionDocument::default()
    };
    let result = codec.parse(&resource, &capped).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let allowed = PermissionDocument {
        groups: vec![group_entry_by_name(ANONYMOUS_GROUP_NAME, "download")],
        ..PermissionDocument::default()
    };
    let result = codec.parse(&resource, &allowed).await;
    assert!(result.is_ok_and(|spec| spec.entries().len() == 1));
}

#[tokio::test]
async fn a_group_listed_under_users_is_rejected() {
    let owner = user("bobby");
    let cartographers = group("cartographers");
    let resource = dataset(&owner);
    let codec = codec(vec![owner, cartographers.clone()]);

    let document = PermissionDocument {
        users: vec![UserEntry {
            id: Some(cartographers.id().as_uuid()),
            username: None,
            permissions: "view".to_owned(),
        }],
        ..PermissionDocument::default()
    };

    let result = codec.parse(&resource, &document).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn serialized_documents_always_carry_owner_and_builtin_groups() {
    let owner = user("bobby");
    let anonymous = group(ANONYMOUS_GROUP_NAME);
    let registered = group(REGISTERED_MEMBERS_GROUP_NAME);
    let resource = dataset(&owner);
    let codec = codec(vec![owner.clone(), anonymous, registered]);

    let Ok(document) = codec.serialize(&resource, &[]).await else {
        return assert!(false, "serialization failed");
    };

    assert_eq!(document.users.len(), 1);
    assert_eq!(document.users[0].username.as_deref(), Some("bobby"));
    assert_eq!(document.users[0].permissions, "owner");

    assert_eq!(document.groups.len(), 2);
    assert_eq!(
        document.groups[0].name.as_deref(),
        Some(ANONYMOUS_GROUP_NAME)
    );
    assert_eq!(document.groups[0].permissions, "none");
    assert_eq!(
        document.groups[1].name.as_deref(),
        Some(REGISTERED_MEMBERS_GROUP_NAME)
    );
    assert_eq!(document.groups[1].permissions, "none");
    assert!(document.organizations.is_empty());
}

#[tokio::test]
async fn serialized_documents_compact_stored_flags_and_sort_users() {
    let owner = user("bobby");
    let norman = user("norman");
    let annie = user("annie");
    let anonymous = group(ANONYMOUS_GROUP_NAME);
    let registered = group(REGISTERED_MEMBERS_GROUP_NAME);
    let resource = dataset(&owner);
    let codec = codec(vec![
        owner.clone(),
        norman.clone(),
        annie.clone(),
        anonymous.clone(),
        registered,
    ]);

    let assignments = [
        assignment(&resource, &norman, CompactLevel::Edit),
        assignment(&resource, &annie, CompactLevel::View),
        assignment(&resource, &anonymous, CompactLevel::Download),
    ];

    let Ok(document) = codec.serialize(&resource, &assignments).await else {
        return assert!(false, "serialization failed");
    };

    let usernames: Vec<_> = document
        .users
        .iter()
        .filter_map(|entry| entry.username.as_deref())
        .collect();
    assert_eq!(usernames, ["bobby", "annie", "norman"]);
    assert_eq!(document.users[1].permissions, "view");
    assert_eq!(document.users[2].permissions, "edit");
    assert_eq!(document.groups[0].permissions, "download");
}

fn assignment(
    resource: &Resource,
    subject: &Subject,
    level: CompactLevel,
) -> PermissionAssignment {
    let flags = resource
        .resource_type()
        .expand(level)
        .unwrap_or_default();
    let Ok(assignment) = PermissionAssignment::new(resource.id(), subject.clone(), flags) else {
        panic!("assignment construction failed");
    };

    assignment
}
