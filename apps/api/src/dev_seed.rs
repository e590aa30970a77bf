use geoperms_core::{AppError, AppResult, ResourceId, SubjectId};
use geoperms_domain::{
    ANONYMOUS_GROUP_NAME, CompactLevel, PermissionAssignment, REGISTERED_MEMBERS_GROUP_NAME,
    Resource, ResourceType, Subject,
};
use geoperms_infrastructure::InMemoryCatalogRepository;
use tracing::info;
use uuid::Uuid;

const DEV_SEED_ADMIN_ID: &str = "11111111-1111-1111-1111-111111111111";
const DEV_SEED_BOBBY_ID: &str = "22222222-2222-2222-2222-222222222222";
const DEV_SEED_NORMAN_ID: &str = "33333333-3333-3333-3333-333333333333";
const DEV_SEED_ANNIE_ID: &str = "44444444-4444-4444-4444-444444444444";
const DEV_SEED_DATASET_ID: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
const DEV_SEED_MAP_ID: &str = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";
const DEV_SEED_DOCUMENT_ID: &str = "cccccccc-cccc-cccc-cccc-cccccccccccc";

/// Seeds a development catalog with fixed identifiers.
pub async fn run(catalog: &InMemoryCatalogRepository) -> AppResult<()> {
    let admin = Subject::user(
        parse_id(DEV_SEED_ADMIN_ID)?,
        "admin",
        "Administrator",
        true,
    )?;
    let bobby = Subject::user(parse_id(DEV_SEED_BOBBY_ID)?, "bobby", "Bobby", false)?;
    let norman = Subject::user(parse_id(DEV_SEED_NORMAN_ID)?, "norman", "Norman", false)?;
    let annie = Subject::user(parse_id(DEV_SEED_ANNIE_ID)?, "annie", "Annie", false)?;

    let anonymous = Subject::group(SubjectId::new(), ANONYMOUS_GROUP_NAME, "anonymous")?;
    let registered = Subject::group(
        SubjectId::new(),
        REGISTERED_MEMBERS_GROUP_NAME,
        "Registered Members",
    )?;
    let cartographers = Subject::group(SubjectId::new(), "cartographers", "Cartographers")?;
    let survey_office = Subject::organization(SubjectId::new(), "survey-office", "Survey Office")?;

    for subject in [
        admin,
        bobby.clone(),
        norman.clone(),
        annie,
        anonymous.clone(),
        registered,
        cartographers.clone(),
        survey_office,
    ] {
        catalog.insert_subject(subject).await?;
    }
    catalog
        .add_membership(norman.id(), cartographers.id())
        .await?;

    let dataset = Resource::new(
        ResourceId::from_uuid(parse_uuid(DEV_SEED_DATASET_ID)?),
        "Elevation Contours",
        ResourceType::Dataset,
        bobby.clone(),
    )?;
    let map = Resource::new(
        ResourceId::from_uuid(parse_uuid(DEV_SEED_MAP_ID)?),
        "Regional Atlas",
        ResourceType::Map,
        bobby,
    )?;
    let document = Resource::new(
        ResourceId::from_uuid(parse_uuid(DEV_SEED_DOCUMENT_ID)?),
        "Survey Field Notes",
        ResourceType::Document,
        norman,
    )?;

    // The dataset starts out publicly visible.
    let anonymous_view = PermissionAssignment::new(
        dataset.id(),
        anonymous,
        ResourceType::Dataset.expand(CompactLevel::View)?,
    )?;
    catalog.seed_assignment(anonymous_view).await;

    for resource in [dataset, map, document] {
        info!(
            resource_id = %resource.id(),
            title = resource.title(),
            resource_type = resource.resource_type().as_str(),
            "seeded resource"
        );
        catalog.insert_resource(resource).await?;
    }

    info!("development seed applied");
    Ok(())
}

fn parse_id(value: &str) -> AppResult<SubjectId> {
    Ok(SubjectId::from_uuid(parse_uuid(value)?))
}

fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|error| AppError::Internal(format!("invalid seed id '{value}': {error}")))
}
