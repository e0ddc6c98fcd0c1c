use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, on, post, MethodFilter};
use axum::{middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::config::AppConfig;
use crate::demo;
use crate::error;
use crate::lab;
use crate::models::SharedState;
use crate::request_id::{self, RequestId};

pub fn build_router(state: SharedState) -> Router {
    let app = Router::new()
        .route(
            "/foo",
            on(MethodFilter::GET.or(MethodFilter::POST), demo::foo_handler),
        )
        .route(
            "/bar",
            get(demo::get_bar_handler).post(demo::post_bar_handler),
        )
        .route("/baz", post(demo::baz_handler))
        .route("/sse", get(demo::sse_demo_handler))
        .route(
            "/lab",
            get(lab::get_lab_spec_handler).post(lab::execute_lab_module_handler),
        );

    let router = Router::new()
        .route("/health", get(demo::health_handler))
        .nest("/api/app", app)
        .with_state(state.clone());

    with_middleware(router, &state.config)
}

/// Outermost first: request id → CORS → tracing → panic catcher → handlers.
pub fn with_middleware(router: Router, config: &AppConfig) -> Router {
    let cors = if config.cors_allow_any {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    router
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
        .layer(middleware::from_fn(request_id::assign_request_id))
}

fn request_span(req: &Request<Body>) -> Span {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::unknown);
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    )
}
