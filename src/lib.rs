//! Trellis SDK: filter-driven CRUD backend library for PostgreSQL.
//!
//! The core is a pair of components: a compiler that turns a declarative
//! filter object into a single parameterized SQL statement, and a reshaper
//! that folds join-duplicated flat rows back into nested object graphs.
//! Around them sit the usual backend plumbing: a named connection registry,
//! generic entity handlers, response envelopes, and error mapping.

pub mod error;
pub mod extractors;
pub mod filter;
pub mod handlers;
pub mod logging;
pub mod registry;
pub mod reshape;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod util;

pub use error::AppError;
pub use filter::{Comparator, Filter, Predicate, Sort, SortDirection};
pub use registry::{ConnectionConfig, ConnectionRegistry};
pub use reshape::{reshape, reshape_by, reshape_rows};
pub use response::{error_body, ok_many, ok_one};
pub use routes::{common_routes, common_routes_with_ready, entity_routes};
pub use service::CrudService;
pub use sql::{compile, FindOptions, QueryBuf, QueryBuilder};
pub use state::AppState;
