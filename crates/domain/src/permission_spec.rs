use std::collections::HashSet;

use geoperms_core::{AppError, AppResult, SubjectId};
use serde::{Deserialize, Serialize};

use crate::capability::CompactLevel;
use crate::subject::Subject;

/// One subject-to-level pairing inside a target spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecEntry {
    subject: Subject,
    level: CompactLevel,
}

impl SpecEntry {
    /// Creates a spec entry.
    #[must_use]
    pub fn new(subject: Subject, level: CompactLevel) -> Self {
        Self { subject, level }
    }

    /// Returns the targeted subject.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Returns the target compact level.
    #[must_use]
    pub fn level(&self) -> CompactLevel {
        self.level
    }
}

/// A validated target permission state for one resource.
///
/// Transient: built from one caller request, consumed by one
/// reconciliation, then discarded. Subjects not mentioned are left
/// unchanged by merge-mode reconciliations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    entries: Vec<SpecEntry>,
}

impl PermissionSpec {
    /// Creates a spec, rejecting duplicate subjects.
    pub fn new(entries: Vec<SpecEntry>) -> AppResult<Self> {
        let mut seen: HashSet<SubjectId> = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.subject().id()) {
                return Err(AppError::Validation(format!(
                    "duplicate subject '{}' in permission spec",
                    entry.subject().name()
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Returns the spec entries.
    #[must_use]
    pub fn entries(&self) -> &[SpecEntry] {
        &self.entries
    }

    /// Returns the target level for one subject, if mentioned.
    #[must_use]
    pub fn level_for(&self, subject_id: SubjectId) -> Option<CompactLevel> {
        self.entries
            .iter()
            .find(|entry| entry.subject().id() == subject_id)
            .map(SpecEntry::level)
    }

    /// Returns whether the spec mentions no subject at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
