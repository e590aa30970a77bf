use std::collections::BTreeSet;

use geoperms_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Resource types known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Vector or raster dataset.
    Dataset,
    /// Composed map.
    Map,
    /// Uploaded document.
    Document,
    /// Geospatial application.
    #[serde(rename = "geoapp")]
    GeoApp,
}

/// Fine-grained permission flags backing the compact levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionFlag {
    /// Read resource metadata.
    ViewResourcebase,
    /// Download resource payload.
    DownloadResourcebase,
    /// Edit resource metadata.
    ChangeResourcebaseMetadata,
    /// Edit the resource itself.
    ChangeResourcebase,
    /// Edit dataset features.
    ChangeDatasetData,
    /// Edit dataset styling.
    ChangeDatasetStyle,
    /// Delete the resource.
    DeleteResourcebase,
    /// Edit the resource's permission assignments.
    ChangeResourcebasePermissions,
    /// Publish or unpublish the resource.
    PublishResourcebase,
}

/// Set of fine-grained permission flags; ordered for deterministic output.
pub type FlagSet = BTreeSet<PermissionFlag>;

/// Compact permission levels, ordered from weakest to strongest.
///
/// Each level's expansion is a superset of every lower level's expansion
/// for the same resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactLevel {
    /// No access.
    None,
    /// Metadata visibility.
    View,
    /// Metadata visibility plus payload download.
    Download,
    /// Content and metadata editing.
    Edit,
    /// Full control short of ownership.
    Manage,
    /// Ownership marker; held by exactly one subject per resource.
    Owner,
}

impl ResourceType {
    /// Returns every resource type known to the catalog.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ResourceType] = &[
            ResourceType::Dataset,
            ResourceType::Map,
            ResourceType::Document,
            ResourceType::GeoApp,
        ];

        ALL
    }

    /// Returns a stable storage value for this resource type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Map => "map",
            Self::Document => "document",
            Self::GeoApp => "geoapp",
        }
    }

    /// Parses a storage value into a resource type.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "dataset" => Ok(Self::Dataset),
            "map" => Ok(Self::Map),
            "document" => Ok(Self::Document),
            "geoapp" => Ok(Self::GeoApp),
            _ => Err(AppError::Validation(format!(
                "unknown resource type '{value}'"
            ))),
        }
    }

    /// Returns the compact levels defined for this resource type.
    ///
    /// Maps and geoapps have no separate payload, so they omit `download`.
    #[must_use]
    pub fn compact_levels(&self) -> &'static [CompactLevel] {
        const WITH_DOWNLOAD: &[CompactLevel] = &[
            CompactLevel::None,
            CompactLevel::View,
            CompactLevel::Download,
            CompactLevel::Edit,
            CompactLevel::Manage,
            CompactLevel::Owner,
        ];
        const WITHOUT_DOWNLOAD: &[CompactLevel] = &[
            CompactLevel::None,
            CompactLevel::View,
            CompactLevel::Edit,
            CompactLevel::Manage,
            CompactLevel::Owner,
        ];

        match self {
            Self::Dataset | Self::Document => WITH_DOWNLOAD,
            Self::Map | Self::GeoApp => WITHOUT_DOWNLOAD,
        }
    }

    /// Returns whether a compact level is defined for this resource type.
    #[must_use]
    pub fn supports_level(&self, level: CompactLevel) -> bool {
        self.compact_levels().contains(&level)
    }

    /// Expands a compact level into its fine-grained flag set.
    ///
    /// Fails only for a `(type, level)` pair the capability table does not
    /// define.
    pub fn expand(&self, level: CompactLevel) -> AppResult<FlagSet> {
        if !self.supports_level(level) {
            return Err(AppError::InvalidLevel(format!(
                "compact level '{}' is not defined for resource type '{}'",
                level.as_str(),
                self.as_str()
            )));
        }

        let mut flags = FlagSet::new();
        if level >= CompactLevel::View {
            flags.insert(PermissionFlag::ViewResourcebase);
        }
        if level >= CompactLevel::Download && self.supports_level(CompactLevel::Download) {
            flags.insert(PermissionFlag::DownloadResourcebase);
        }
        if level >= CompactLevel::Edit {
            flags.insert(PermissionFlag::ChangeResourcebaseMetadata);
            flags.insert(PermissionFlag::ChangeResourcebase);
            if *self == Self::Dataset {
                flags.insert(PermissionFlag::ChangeDatasetData);
                flags.insert(PermissionFlag::ChangeDatasetStyle);
            }
        }
        if level >= CompactLevel::Manage {
            flags.insert(PermissionFlag::DeleteResourcebase);
            flags.insert(PermissionFlag::ChangeResourcebasePermissions);
            flags.insert(PermissionFlag::PublishResourcebase);
        }

        Ok(flags)
    }

    /// Compacts an arbitrary flag set to the highest level whose expansion
    /// it covers.
    ///
    /// `Owner` shares its expansion with `Manage` and is carried by the
    /// resource, not derivable from flags, so compaction never reports it.
    /// Flags not covered by the chosen level are surfaced in `unmatched`
    /// rather than silently dropped.
    #[must_use]
    pub fn compact(&self, flags: &FlagSet) -> Compaction {
        let mut chosen = CompactLevel::None;
        let mut chosen_expansion = FlagSet::new();

        for level in self.compact_levels() {
            if *level == CompactLevel::Owner {
                continue;
            }

            // Levels are declared weakest-first; the last subset wins.
            if let Ok(expansion) = self.expand(*level)
                && expansion.is_subset(flags)
            {
                chosen = *level;
                chosen_expansion = expansion;
            }
        }

        let unmatched = flags.difference(&chosen_expansion).copied().collect();

        Compaction {
            level: chosen,
            unmatched,
        }
    }

    /// Returns the strongest compact level grantable to the anonymous
    /// pseudo-group for this resource type.
    #[must_use]
    pub fn anonymous_ceiling(&self) -> CompactLevel {
        if self.supports_level(CompactLevel::Download) {
            CompactLevel::Download
        } else {
            CompactLevel::View
        }
    }
}

impl CompactLevel {
    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::View => "view",
            Self::Download => "download",
            Self::Edit => "edit",
            Self::Manage => "manage",
            Self::Owner => "owner",
        }
    }

    /// Parses a storage value into a compact level.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "none" => Ok(Self::None),
            "view" => Ok(Self::View),
            "download" => Ok(Self::Download),
            "edit" => Ok(Self::Edit),
            "manage" => Ok(Self::Manage),
            "owner" => Ok(Self::Owner),
            _ => Err(AppError::InvalidLevel(format!(
                "unknown compact level '{value}'"
            ))),
        }
    }

    /// Returns the user-facing label for this level on one resource type.
    #[must_use]
    pub fn label(&self, resource_type: ResourceType) -> &'static str {
        match (self, resource_type) {
            (Self::View, ResourceType::Document) => "View Metadata",
            (Self::Download, ResourceType::Document) => "View and Download",
            (Self::None, _) => "None",
            (Self::View, _) => "View",
            (Self::Download, _) => "Download",
            (Self::Edit, _) => "Edit",
            (Self::Manage, _) => "Manage",
            (Self::Owner, _) => "Owner",
        }
    }
}

impl PermissionFlag {
    /// Returns a stable storage value for this flag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewResourcebase => "view_resourcebase",
            Self::DownloadResourcebase => "download_resourcebase",
            Self::ChangeResourcebaseMetadata => "change_resourcebase_metadata",
            Self::ChangeResourcebase => "change_resourcebase",
            Self::ChangeDatasetData => "change_dataset_data",
            Self::ChangeDatasetStyle => "change_dataset_style",
            Self::DeleteResourcebase => "delete_resourcebase",
            Self::ChangeResourcebasePermissions => "change_resourcebase_permissions",
            Self::PublishResourcebase => "publish_resourcebase",
        }
    }

    /// Parses a storage value into a permission flag.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "view_resourcebase" => Ok(Self::ViewResourcebase),
            "download_resourcebase" => Ok(Self::DownloadResourcebase),
            "change_resourcebase_metadata" => Ok(Self::ChangeResourcebaseMetadata),
            "change_resourcebase" => Ok(Self::ChangeResourcebase),
            "change_dataset_data" => Ok(Self::ChangeDatasetData),
            "change_dataset_style" => Ok(Self::ChangeDatasetStyle),
            "delete_resourcebase" => Ok(Self::DeleteResourcebase),
            "change_resourcebase_permissions" => Ok(Self::ChangeResourcebasePermissions),
            "publish_resourcebase" => Ok(Self::PublishResourcebase),
            _ => Err(AppError::Validation(format!(
                "unknown permission flag '{value}'"
            ))),
        }
    }
}

/// Result of compacting a flag set: the nearest level at or below the
/// flags, plus any flags the level does not account for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    /// Highest compact level whose expansion the flags cover.
    pub level: CompactLevel,
    /// Flags present on the resource but not part of the chosen level.
    pub unmatched: FlagSet,
}

impl Compaction {
    /// Returns whether the flags matched the chosen level exactly.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.unmatched.is_empty()
    }
}
