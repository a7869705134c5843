//! Route configuration and setup

use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use dubmix_core::constants::{API_PREFIX, OWNER_HEADER};
use dubmix_core::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes with CORS, body limit and request tracing.
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    // Outermost first: trace, then CORS, then the body limit.
    let router = app_routes(state)
        .layer(RequestBodyLimitLayer::new(config.max_request_body_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

/// Routes and handlers without middleware.
pub fn app_routes(state: Arc<AppState>) -> Router<()> {
    let catalog = Router::new()
        .route("/videos", get(handlers::videos::list_owner_videos))
        .route("/videos/public", get(handlers::videos::list_public_videos))
        .route(
            "/videos/{id}",
            get(handlers::videos::get_video).delete(handlers::videos::delete_video),
        )
        .route(
            "/videos/{id}/visibility",
            patch(handlers::videos::set_visibility),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/merge", post(handlers::merge::merge))
        .route("/v/{id}", get(handlers::videos::resolve_short_link))
        .nest(API_PREFIX, catalog)
        .with_state(state)
}

fn allowed_methods() -> [Method; 5] {
    [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ]
}

/// Browsers call the merge endpoint directly, so `*` is honoured in every environment.
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.allows_any_origin() {
        if config.is_production() {
            tracing::warn!("CORS configured to allow all origins in production");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(allowed_methods())
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .map_err(|_| anyhow::anyhow!("Invalid CORS origin: {}", o))
            })
            .collect::<Result<Vec<_>, _>>()?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(allowed_methods())
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                HeaderName::from_static(OWNER_HEADER),
            ])
    };
    Ok(cors)
}
