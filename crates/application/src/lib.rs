//! Permission services: spec codec, diff engine, execution tracking, and
//! the caller-facing gateway.

#![forbid(unsafe_code)]

/// Diffing a target spec against stored assignment state.
pub mod diff_engine;
/// Asynchronous reconciliation tracking and worker loop.
pub mod execution_service;
/// Caller-facing permission reads, writes, and execution queries.
pub mod gateway;
/// Ports implemented by infrastructure adapters.
pub mod permission_ports;
/// Wire codec for compact permission documents.
pub mod spec_codec;

#[cfg(test)]
pub(crate) mod test_support;

pub use diff_engine::{ApplyMode, PermissionOp, compute_operations};
pub use execution_service::{ExecutionTracker, RECONCILE_FUNC_NAME, ReconciliationWorker};
pub use gateway::{
    AllowedPerms, AudienceChoices, AudienceFlags, LevelChoice, PermissionGateway,
    ResourceTypeDescriptor, ScheduledReconciliation,
};
pub use permission_ports::{
    AssignmentRepository, CreateExecutionInput, ExecutionRepository, ExecutionRequest,
    ExecutionStatus, ReconciliationJob, ResourceRepository, SubjectDirectory,
};
pub use spec_codec::{GroupEntry, PermissionDocument, SpecCodec, UserEntry};
