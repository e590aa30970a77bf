use geoperms_core::{AppError, AppResult, SubjectId};
use geoperms_domain::{
    CompactLevel, FlagSet, PermissionAssignment, PermissionSpec, Resource, Subject,
};
use serde::{Deserialize, Serialize};

/// How a target spec relates to the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// The spec is the complete target state; unmentioned non-owner
    /// subjects are revoked.
    Replace,
    /// The spec only adjusts the subjects it mentions.
    Merge,
}

impl ApplyMode {
    /// Returns a stable storage value for this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
        }
    }

    /// Parses a storage value into an apply mode.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            _ => Err(AppError::Validation(format!("unknown apply mode '{value}'"))),
        }
    }
}

/// One reconciliation step against the assignment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PermissionOp {
    /// Store the expanded flags of one level for one subject, replacing
    /// whatever that subject held before.
    Grant {
        /// Receiving subject.
        subject: Subject,
        /// Granted compact level.
        level: CompactLevel,
        /// The level's expansion for the resource's type.
        flags: FlagSet,
    },
    /// Remove one subject's assignment entirely.
    Revoke {
        /// Subject losing its assignment.
        subject: Subject,
    },
}

impl PermissionOp {
    /// Returns the subject the operation touches.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        match self {
            Self::Grant { subject, .. } | Self::Revoke { subject } => subject,
        }
    }
}

/// Computes the minimal operation set turning the stored state into the
/// target spec.
///
/// The owner is never touched: no operation in the output ever targets the
/// owning subject. An entry whose stored flags already compact exactly to
/// the target level produces nothing. Output order is deterministic:
/// revokes before grants, then groups, organizations, users, then subject
/// id.
pub fn compute_operations(
    resource: &Resource,
    current: &[PermissionAssignment],
    target: &PermissionSpec,
    mode: ApplyMode,
) -> AppResult<Vec<PermissionOp>> {
    let resource_type = resource.resource_type();
    let mut ops = Vec::new();

    for entry in target.entries() {
        let subject = entry.subject();
        if resource.is_owned_by(subject.id()) {
            continue;
        }

        let stored = current
            .iter()
            .find(|assignment| assignment.subject().id() == subject.id());

        if entry.level() == CompactLevel::None {
            if stored.is_some() {
                ops.push(PermissionOp::Revoke {
                    subject: subject.clone(),
                });
            }

            continue;
        }

        if let Some(assignment) = stored {
            let compaction = assignment.compact(resource_type);
            if compaction.is_exact() && compaction.level == entry.level() {
                continue;
            }
        }

        ops.push(PermissionOp::Grant {
            subject: subject.clone(),
            level: entry.level(),
            flags: resource_type.expand(entry.level())?,
        });
    }

    if mode == ApplyMode::Replace {
        for assignment in current {
            let subject = assignment.subject();
            if resource.is_owned_by(subject.id()) {
                continue;
            }

            if target.level_for(subject.id()).is_none() {
                ops.push(PermissionOp::Revoke {
                    subject: subject.clone(),
                });
            }
        }
    }

    ops.sort_by_key(sort_key);

    Ok(ops)
}

fn sort_key(op: &PermissionOp) -> (u8, geoperms_domain::SubjectKind, SubjectId) {
    let rank = match op {
        PermissionOp::Revoke { .. } => 0,
        PermissionOp::Grant { .. } => 1,
    };

    (rank, op.subject().kind(), op.subject().id())
}

#[cfg(test)]
mod tests {
    use geoperms_core::{ResourceId, SubjectId};
    use geoperms_domain::{
        CompactLevel, PermissionAssignment, PermissionSpec, Resource, ResourceType, SpecEntry,
        Subject,
    };

    use super::{ApplyMode, PermissionOp, compute_operations};

    fn dataset_with_owner() -> (Resource, Subject) {
        let Ok(owner) = Subject::user(SubjectId::new(), "bobby", "Bobby", false) else {
            panic!("user construction failed");
        };
        let Ok(resource) = Resource::new(
            ResourceId::new(),
            "Elevation",
            ResourceType::Dataset,
            owner.clone(),
        ) else {
            panic!("resource construction failed");
        };

        (resource, owner)
    }

    fn user(name: &str) -> Subject {
        let Ok(subject) = Subject::user(SubjectId::new(), name, name, false) else {
            panic!("user construction failed");
        };

        subject
    }

    fn assignment(resource: &Resource, subject: &Subject, level: CompactLevel) -> PermissionAssignment {
        let flags = resource
            .resource_type()
            .expand(level)
            .unwrap_or_default();
        let Ok(assignment) = PermissionAssignment::new(resource.id(), subject.clone(), flags)
        else {
            panic!("assignment construction failed");
        };

        assignment
    }

    fn spec(entries: Vec<SpecEntry>) -> PermissionSpec {
        let Ok(spec) = PermissionSpec::new(entries) else {
            panic!("spec construction failed");
        };

        spec
    }

    #[test]
    fn matching_level_produces_no_operations() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let current = vec![assignment(&resource, &norman, CompactLevel::Edit)];
        let target = spec(vec![SpecEntry::new(norman, CompactLevel::Edit)]);

        let ops = compute_operations(&resource, &current, &target, ApplyMode::Merge);
        assert!(ops.is_ok_and(|ops| ops.is_empty()));
    }

    #[test]
    fn level_change_becomes_one_grant_with_expanded_flags() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let current = vec![assignment(&resource, &norman, CompactLevel::View)];
        let target = spec(vec![SpecEntry::new(norman.clone(), CompactLevel::Edit)]);

        let Ok(ops) = compute_operations(&resource, &current, &target, ApplyMode::Merge) else {
            return assert!(false, "diff failed");
        };
        let expected_flags = resource
            .resource_type()
            .expand(CompactLevel::Edit)
            .unwrap_or_default();
        assert_eq!(
            ops,
            vec![PermissionOp::Grant {
                subject: norman,
                level: CompactLevel::Edit,
                flags: expected_flags,
            }]
        );
    }

    #[test]
    fn level_none_revokes_only_existing_assignments() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let stranger = user("stranger");
        let current = vec![assignment(&resource, &norman, CompactLevel::View)];
        let target = spec(vec![
            SpecEntry::new(norman.clone(), CompactLevel::None),
            SpecEntry::new(stranger, CompactLevel::None),
        ]);

        let Ok(ops) = compute_operations(&resource, &current, &target, ApplyMode::Merge) else {
            return assert!(false, "diff failed");
        };
        assert_eq!(ops, vec![PermissionOp::Revoke { subject: norman }]);
    }

    #[test]
    fn replace_revokes_unmentioned_subjects_but_merge_does_not() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let annie = user("annie");
        let current = vec![
            assignment(&resource, &norman, CompactLevel::View),
            assignment(&resource, &annie, CompactLevel::Edit),
        ];
        let target = spec(vec![SpecEntry::new(norman, CompactLevel::View)]);

        let Ok(replace) = compute_operations(&resource, &current, &target, ApplyMode::Replace)
        else {
            return assert!(false, "diff failed");
        };
        assert_eq!(replace, vec![PermissionOp::Revoke { subject: annie }]);

        let merge = compute_operations(&resource, &current, &target, ApplyMode::Merge);
        assert!(merge.is_ok_and(|ops| ops.is_empty()));
    }

    #[test]
    fn owner_is_never_touched() {
        let (resource, owner) = dataset_with_owner();
        let current = vec![assignment(&resource, &owner, CompactLevel::Manage)];
        let target = spec(vec![SpecEntry::new(owner, CompactLevel::Owner)]);

        let replace = compute_operations(&resource, &current, &target, ApplyMode::Replace);
        assert!(replace.is_ok_and(|ops| ops.is_empty()));

        let empty = spec(Vec::new());
        let wipe = compute_operations(&resource, &current, &empty, ApplyMode::Replace);
        assert!(wipe.is_ok_and(|ops| ops.is_empty()));
    }

    #[test]
    fn divergent_stored_flags_are_rewritten_even_at_the_same_level() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let mut flags = resource
            .resource_type()
            .expand(CompactLevel::View)
            .unwrap_or_default();
        flags.insert(geoperms_domain::PermissionFlag::ChangeDatasetStyle);
        let Ok(stored) = PermissionAssignment::new(resource.id(), norman.clone(), flags) else {
            return assert!(false, "assignment construction failed");
        };
        let target = spec(vec![SpecEntry::new(norman.clone(), CompactLevel::View)]);

        let Ok(ops) = compute_operations(&resource, &[stored], &target, ApplyMode::Merge) else {
            return assert!(false, "diff failed");
        };
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            PermissionOp::Grant { subject, level: CompactLevel::View, .. }
                if subject.id() == norman.id()
        ));
    }

    #[test]
    fn output_order_is_revokes_then_grants_grouped_by_kind() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let annie = user("annie");
        let Ok(cartographers) = Subject::group(SubjectId::new(), "cartographers", "Cartographers")
        else {
            return assert!(false, "group construction failed");
        };
        let current = vec![assignment(&resource, &annie, CompactLevel::Edit)];
        let target = spec(vec![
            SpecEntry::new(norman, CompactLevel::View),
            SpecEntry::new(cartographers, CompactLevel::View),
            SpecEntry::new(annie.clone(), CompactLevel::None),
        ]);

        let Ok(ops) = compute_operations(&resource, &current, &target, ApplyMode::Merge) else {
            return assert!(false, "diff failed");
        };
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], PermissionOp::Revoke { subject: annie });
        assert!(matches!(&ops[1], PermissionOp::Grant { subject, .. }
            if subject.kind() == geoperms_domain::SubjectKind::Group));
        assert!(matches!(&ops[2], PermissionOp::Grant { subject, .. }
            if subject.kind() == geoperms_domain::SubjectKind::User));
    }

    #[test]
    fn applying_the_operations_makes_a_second_diff_empty() {
        let (resource, _) = dataset_with_owner();
        let norman = user("norman");
        let target = spec(vec![SpecEntry::new(norman.clone(), CompactLevel::Edit)]);

        let Ok(ops) = compute_operations(&resource, &[], &target, ApplyMode::Replace) else {
            return assert!(false, "diff failed");
        };
        let applied: Vec<_> = ops
            .into_iter()
            .filter_map(|op| match op {
                PermissionOp::Grant { subject, flags, .. } => {
                    PermissionAssignment::new(resource.id(), subject, flags).ok()
                }
                PermissionOp::Revoke { .. } => None,
            })
            .collect();

        let second = compute_operations(&resource, &applied, &target, ApplyMode::Replace);
        assert!(second.is_ok_and(|ops| ops.is_empty()));
    }
}
