//! HTTP server and routes.

mod extractors;
mod handlers;
mod response;
mod state;

pub use extractors::SESSION_COOKIE;
pub use response::{ApiResponse, Created};
pub use state::AppState;

use axum::{
    Router,
    routing::{MethodRouter, get},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Unsupported methods answer 405 in the standard envelope.
fn resource(methods: MethodRouter<AppState>) -> MethodRouter<AppState> {
    methods.fallback(handlers::method_not_allowed)
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", resource(get(handlers::health)))
        .route(
            "/auth",
            resource(
                get(handlers::auth_get)
                    .post(handlers::auth_post)
                    .put(handlers::auth_put),
            ),
        )
        .route(
            "/books",
            resource(
                get(handlers::books_get)
                    .post(handlers::books_post)
                    .put(handlers::books_put)
                    .delete(handlers::books_delete),
            ),
        )
        .route(
            "/categories",
            resource(
                get(handlers::categories_get)
                    .post(handlers::categories_post)
                    .put(handlers::categories_put)
                    .delete(handlers::categories_delete),
            ),
        )
        .route(
            "/bookmarks",
            resource(
                get(handlers::bookmarks_get)
                    .post(handlers::bookmarks_post)
                    .put(handlers::bookmarks_put)
                    .delete(handlers::bookmarks_delete),
            ),
        )
        .route(
            "/reading-progress",
            resource(
                get(handlers::progress_get)
                    .post(handlers::progress_post)
                    .delete(handlers::progress_delete),
            ),
        )
        .route(
            "/reviews",
            resource(
                get(handlers::reviews_get)
                    .post(handlers::reviews_post)
                    .put(handlers::reviews_put)
                    .delete(handlers::reviews_delete),
            ),
        )
        .route("/reader", resource(get(handlers::reader_get)));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
