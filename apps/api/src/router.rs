use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;


/// Builds the API router with identity, tracing, and CORS layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        .route(
            "/api/resource_types",
            get(handlers::resource_types::list_resource_types_handler),
        )
        .route(
            "/api/resources/{resource_id}/permissions",
            get(handlers::permissions::get_resource_permissions_handler)
                .put(handlers::permissions::replace_resource_permissions_handler)
                .patch(handlers::permissions::merge_resource_permissions_handler),
        )
        .route(
            "/api/resources/{resource_id}/executions",
            get(handlers::executions::list_resource_executions_handler),
        )
        .route(
            "/api/executions/{exec_id}",
            get(handlers::executions::get_execution_handler),
        )
        .layer(from_fn_with_state(state.clone(), middleware::caller_identity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
