// API module - HTTP endpoints

pub mod health;
pub mod keys;
pub mod middleware;
pub mod state;
pub mod validate;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use state::AppState;

/// Builds the full application router.
///
/// `/api/validate` and `/health` are public; the key management routes sit
/// behind the admin token check. Any other path is looked up in the static
/// directory.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = keys::router().route_layer(from_fn_with_state(
        state.clone(),
        middleware::auth::require_admin,
    ));

    Router::new()
        .merge(health::router())
        .merge(validate::router())
        .merge(admin_routes)
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
