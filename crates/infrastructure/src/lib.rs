//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_catalog_repository;
mod in_memory_execution_repository;
mod postgres_catalog_repository;
mod postgres_execution_repository;

pub use in_memory_catalog_repository::InMemoryCatalogRepository;
pub use in_memory_execution_repository::InMemoryExecutionRepository;
pub use postgres_catalog_repository::PostgresCatalogRepository;
pub use postgres_execution_repository::PostgresExecutionRepository;
