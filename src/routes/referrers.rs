use crate::{
    AppState,
    handlers::{self, referrers},
};
use axum::{Router, routing::get};

/// Referrer Router Module
///
/// Any authenticated caller may read and search; staff may create and update;
/// only administrators may delete. Those checks run inside the handlers.
pub fn referrer_routes() -> Router<AppState> {
    Router::new()
        // GET /referrers?type=...   POST /referrers
        .route(
            "/referrers",
            get(referrers::list_referrers)
                .post(referrers::create_referrer)
                .fallback(handlers::method_not_allowed),
        )
        // GET /referrers/search?q=...
        // The static segment takes precedence over `/referrers/{id}`.
        .route(
            "/referrers/search",
            get(referrers::search_referrers).fallback(handlers::method_not_allowed),
        )
        // GET/PUT/DELETE /referrers/{id}
        .route(
            "/referrers/{id}",
            get(referrers::get_referrer)
                .put(referrers::update_referrer)
                .delete(referrers::delete_referrer)
                .fallback(handlers::method_not_allowed),
        )
}
