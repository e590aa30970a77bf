use std::sync::Arc;
use std::sync::atomic::Ordering;

use geoperms_core::{ResourceId, SubjectId};
use geoperms_domain::{
    ANONYMOUS_GROUP_NAME, CompactLevel, REGISTERED_MEMBERS_GROUP_NAME, Resource, ResourceType,
    Subject,
};

use crate::diff_engine::ApplyMode;
use crate::permission_ports::{AssignmentRepository, ExecutionStatus, ReconciliationJob};
use crate::spec_codec::{GroupEntry, PermissionDocument, SpecCodec, UserEntry};
use crate::test_support::{FakeCatalog, FakeExecutions};

use super::ExecutionTracker;

struct Fixture {
    tracker: ExecutionTracker,
    catalog: Arc<FakeCatalog>,
    resource: Resource,
    norman: Subject,
}

fn fixture(fail_batches: bool) -> Fixture {
    let Ok(owner) = Subject::user(SubjectId::new(), "bobby", "Bobby", false) else {
        panic!("user construction failed");
    };
    let Ok(norman) = Subject::user(SubjectId::new(), "norman", "Norman", false) else {
        panic!("user construction failed");
    };
    let Ok(anonymous) = Subject::group(SubjectId::new(), ANONYMOUS_GROUP_NAME, "anonymous")
    else {
        panic!("group construction failed");
    };
    let Ok(registered) = Subject::group(
        SubjectId::new(),
        REGISTERED_MEMBERS_GROUP_NAME,
        "Registered Members",
    ) else {
        panic!("group construction failed");
    };
    let Ok(resource) = Resource::new(
        ResourceId::new(),
        "Elevation",
        ResourceType::Dataset,
        owner.clone(),
    ) else {
        panic!("resource construction failed");
    };

    let mut catalog = FakeCatalog::new(
        vec![resource.clone()],
        vec![owner, norman.clone(), anonymous, registered],
    );
    if fail_batches {
        catalog = catalog.failing();
    }
    let catalog = Arc::new(catalog);
    let executions = Arc::new(FakeExecutions::new());
    let codec = SpecCodec::new(catalog.clone());
    let tracker = ExecutionTracker::new(catalog.clone(), catalog.clone(), executions, codec);

    Fixture {
        tracker,
        catalog,
        resource,
        norman,
    }
}

fn edit_norman_job(fixture: &Fixture) -> ReconciliationJob {
    ReconciliationJob {
        resource_id: fixture.resource.id(),
        mode: ApplyMode::Merge,
        permissions: PermissionDocument {
            users: vec![UserEntry {
                id: None,
                username: Some("norman".to_owned()),
                permissions: "edit".to_owned(),
            }],
            ..PermissionDocument::default()
        },
        requester: "bobby".to_owned(),
    }
}

#[tokio::test]
async fn scheduling_records_a_created_execution() {
    let fixture = fixture(false);

    let Ok(execution) = fixture.tracker.schedule(edit_norman_job(&fixture)).await else {
        return assert!(false, "scheduling failed");
    };

    assert_eq!(execution.status, ExecutionStatus::Created);
    assert_eq!(execution.func_name, super::RECONCILE_FUNC_NAME);
    assert_eq!(execution.resource_id, fixture.resource.id());
    assert!(execution.finished.is_none());

    let found = fixture.tracker.get_status(execution.exec_id).await;
    assert!(found.is_ok_and(|found| found.exec_id == execution.exec_id));
}

#[tokio::test]
async fn a_claimed_job_applies_and_finishes_with_the_new_spec() {
    let fixture = fixture(false);
    let Ok(_) = fixture.tracker.schedule(edit_norman_job(&fixture)).await else {
        return assert!(false, "scheduling failed");
    };

    let Ok(Some(record)) = fixture.tracker.run_next("worker-1").await else {
        return assert!(false, "run failed");
    };

    assert_eq!(record.status, ExecutionStatus::Finished);
    assert!(record.finished.is_some());
    assert!(record.last_updated >= record.created);

    let spec = &record.output_params["spec"];
    let usernames: Vec<_> = spec["users"]
        .as_array()
        .map(|users| {
            users
                .iter()
                .filter_map(|entry| entry["username"].as_str())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(usernames, ["bobby", "norman"]);

    let stored = fixture
        .catalog
        .find_for_subject(fixture.resource.id(), fixture.norman.id())
        .await;
    assert!(stored.is_ok_and(|stored| {
        stored.is_some_and(|assignment| {
            assignment.compact(ResourceType::Dataset).level == CompactLevel::Edit
        })
    }));
}

#[tokio::test]
async fn a_failed_apply_marks_the_execution_failed_and_keeps_prior_state() {
    let fixture = fixture(true);
    let Ok(_) = fixture.tracker.schedule(edit_norman_job(&fixture)).await else {
        return assert!(false, "scheduling failed");
    };

    let Ok(Some(record)) = fixture.tracker.run_next("worker-1").await else {
        return assert!(false, "run failed");
    };

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.output_params["error"]["category"], "storage");

    let stored = fixture
        .catalog
        .find_for_subject(fixture.resource.id(), fixture.norman.id())
        .await;
    assert!(stored.is_ok_and(|stored| stored.is_none()));
}

#[tokio::test]
async fn repeating_an_applied_spec_touches_the_store_only_once() {
    let fixture = fixture(false);
    for _ in 0..2 {
        let Ok(_) = fixture.tracker.schedule(edit_norman_job(&fixture)).await else {
            return assert!(false, "scheduling failed");
        };
        let Ok(Some(record)) = fixture.tracker.run_next("worker-1").await else {
            return assert!(false, "run failed");
        };
        assert_eq!(record.status, ExecutionStatus::Finished);
    }

    assert_eq!(fixture.catalog.batches_applied.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn executions_run_in_submission_order() {
    let fixture = fixture(false);
    let Ok(first) = fixture.tracker.schedule(edit_norman_job(&fixture)).await else {
        return assert!(false, "scheduling failed");
    };

    let mut job = edit_norman_job(&fixture);
    job.permissions.groups = vec![GroupEntry {
        id: None,
        name: Some(ANONYMOUS_GROUP_NAME.to_owned()),
        title: None,
        permissions: "view".to_owned(),
    }];
    let Ok(second) = fixture.tracker.schedule(job).await else {
        return assert!(false, "scheduling failed");
    };

    let Ok(Some(ran_first)) = fixture.tracker.run_next("worker-1").await else {
        return assert!(false, "run failed");
    };
    let Ok(Some(ran_second)) = fixture.tracker.run_next("worker-1").await else {
        return assert!(false, "run failed");
    };

    assert_eq!(ran_first.exec_id, first.exec_id);
    assert_eq!(ran_second.exec_id, second.exec_id);

    let listed = fixture
        .tracker
        .list_for_resource(fixture.resource.id())
        .await;
    assert!(listed.is_ok_and(|listed| listed.len() == 2));
}
