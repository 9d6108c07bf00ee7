//! Entity-typed repositories.
//!
//! # Responsibility
//! - Expose CRUD and declared-query entry points per entity type.
//! - Keep callers decoupled from table paths and driver handles.

pub mod crud;

pub use crud::CrudRepository;
