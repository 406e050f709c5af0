//! Route definitions

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::auth::{auth_middleware, AuthState};
use super::handlers::{self, AppState};

/// Build the service router. Scrape and search sit behind the API-key
/// middleware; health and metrics stay open for supervisors and scrapers
/// of a different kind.
pub fn create_router(app_state: AppState, auth_state: AuthState) -> Router {
    let protected = Router::new()
        .route("/scrape", post(handlers::scrape))
        .route("/search", post(handlers::search))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(protected)
        .with_state(app_state)
}
