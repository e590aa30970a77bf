//! Ports implemented by infrastructure adapters.

/// Execution tracking records and repository port.
pub mod execution;
/// Catalog, directory, and assignment repository ports.
pub mod repository;

pub use execution::{
    CreateExecutionInput, ExecutionRepository, ExecutionRequest, ExecutionStatus,
    ReconciliationJob,
};
pub use repository::{AssignmentRepository, ResourceRepository, SubjectDirectory};
