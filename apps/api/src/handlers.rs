pub mod executions;
pub mod health;
pub mod permissions;
pub mod resource_types;
