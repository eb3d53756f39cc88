//! CrudService: filter-driven CRUD over the connection registry.

mod crud;
pub use crud::{row_to_json, CrudService};
