//! Generic entity routes. Every table reachable through the registry gets
//! the same surface; handlers receive the table name as a path segment and
//! the connection from the X-Connection header (or the default).

use crate::handlers::entity::{
    count, create, delete as delete_handler, delete_where, list, read, update, update_where,
};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this are rejected before the handler runs.
const BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/:table",
            get(list)
                .post(create)
                .patch(update_where)
                .delete(delete_where),
        )
        .route("/:table/count", get(count))
        .route(
            "/:table/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}
