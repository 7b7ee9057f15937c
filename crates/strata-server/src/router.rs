//! Strata Router
//!
//! HTTP route table for the replica. Defines the key-value, view, shard, and
//! sync endpoints and applies request tracing and CORS.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Router
// =============================================================================

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let shard_routes = Router::new()
        .route("/ids", get(handlers::get_shard_ids))
        .route("/node-shard-id", get(handlers::get_node_shard_id))
        .route("/members/:id", get(handlers::get_shard_members))
        .route("/key-count/:id", get(handlers::get_shard_key_count))
        .route("/add-member/:id", put(handlers::add_shard_member))
        .route("/reshard", put(handlers::reshard))
        .route("/kvs-update/:key", put(handlers::kvs_update));

    Router::new()
        .route(
            "/kvs/:key",
            get(handlers::get_key)
                .put(handlers::put_key)
                .delete(handlers::delete_key),
        )
        .route(
            "/view",
            get(handlers::get_view)
                .put(handlers::put_view)
                .delete(handlers::delete_view),
        )
        .nest("/shard", shard_routes)
        .route("/sync", get(handlers::get_sync))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::NodeConfig;

    #[test]
    fn test_router_builds() {
        let config = NodeConfig::new("n0:8090".to_string(), "n0:8090", None).unwrap();
        let state = AppState::new(config);
        let _router = create_router(state);
    }
}
