use crate::{
    AppState,
    handlers::{self, referrer_types},
};
use axum::{Router, routing::get};

/// Referrer Type Router Module
///
/// Reads are open to any authenticated caller; every mutation is admin-only,
/// enforced in the handlers.
pub fn referrer_type_routes() -> Router<AppState> {
    Router::new()
        // GET /referrer-types   POST /referrer-types
        .route(
            "/referrer-types",
            get(referrer_types::list_referrer_types)
                .post(referrer_types::create_referrer_type)
                .fallback(handlers::method_not_allowed),
        )
        // GET/PUT/DELETE /referrer-types/{id}
        .route(
            "/referrer-types/{id}",
            get(referrer_types::get_referrer_type)
                .put(referrer_types::update_referrer_type)
                .delete(referrer_types::delete_referrer_type)
                .fallback(handlers::method_not_allowed),
        )
}
