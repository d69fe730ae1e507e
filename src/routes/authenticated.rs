use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, patch, post},
};

/// Authenticated Router Module
///
/// Every mutating endpoint. `create_router` wraps this router in the
/// credential-checking route layer, which places the verified `Principal` in
/// the request extensions before any handler here runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /create-adv/
        // Creates an advertisement owned by the caller.
        .route("/create-adv/", post(handlers::create_advertisement))
        // DELETE /advertisements/{id}/delete
        // Owner-only. Non-owners see the same 404 as a missing record.
        .route(
            "/advertisements/{id}/delete",
            delete(handlers::delete_advertisement),
        )
        // PATCH /advertisements/{id}/update
        // Owner-only partial update of title and/or description.
        .route(
            "/advertisements/{id}/update",
            patch(handlers::update_advertisement),
        )
}
