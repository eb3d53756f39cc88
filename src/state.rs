//! Shared application state for all routes.

use crate::registry::ConnectionRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    /// Connection used when a request does not name one.
    pub default_connection: String,
}

impl AppState {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let default_connection = registry.default_connection().to_string();
        AppState {
            registry,
            default_connection,
        }
    }
}
