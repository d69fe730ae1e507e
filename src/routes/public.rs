use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Read-only endpoints open to anonymous clients. Nothing here mutates the
/// repository, so no credentials are checked.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /advertisements
        // Every advertisement, one line each. 404 when the store is empty.
        .route("/advertisements", get(handlers::list_advertisements))
        // GET /advertisements/{id}
        // A single advertisement. 400 for a non-numeric id, 404 if absent.
        .route("/advertisements/{id}", get(handlers::get_advertisement))
}
