//! HTTP surface.
//!
//! | Route | Middleware | Handler |
//! |-------|------------|---------|
//! | `POST /api/v0/prices` | archive unwrap | ingest the CSV member |
//! | `GET /api/v0/prices` | optional archive wrap | all records as JSON |
//! | `GET /health` | | store ping |
//!
//! Every response carries `x-request-id` and the security headers set in
//! [`router`].

mod error;
mod handlers;

pub use error::ApiError;

use crate::observability::{
    REQUEST_ID_HEADER, RequestContext, current_request_id, scope_request_context,
};
use crate::services::IngestionService;
use crate::transport::{MemberLimit, archive_response, unwrap_upload};
use crate::{Error, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{HeaderName, HeaderValue, header};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::Response;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Path of the price-list resource.
pub const PRICES_PATH: &str = "/api/v0/prices";

/// Path of the health check.
pub const HEALTH_PATH: &str = "/health";

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The ingestion service.
    pub service: Arc<IngestionService>,
}

/// Builds the application router.
///
/// `upload_limit` caps request bodies, including the multipart envelope.
/// `member_limit` caps the CSV member once decompressed; the unwrapped body
/// is not checked against `upload_limit` again.
pub fn router(service: Arc<IngestionService>, upload_limit: usize, member_limit: u64) -> Router {
    Router::new()
        .route(
            PRICES_PATH,
            post(handlers::post_prices)
                .layer(DefaultBodyLimit::disable())
                .layer(from_fn_with_state(MemberLimit(member_limit), unwrap_upload)),
        )
        .route(
            PRICES_PATH,
            get(handlers::get_prices).layer(from_fn(archive_response)),
        )
        .route(HEALTH_PATH, get(handlers::health))
        .layer(DefaultBodyLimit::max(upload_limit))
        // Security headers (OWASP recommendations)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %current_request_id().unwrap_or_default(),
                )
            }),
        )
        .layer(from_fn(propagate_request_id))
        .with_state(AppState { service })
}

/// Scopes a [`RequestContext`] around the request and echoes its ID.
async fn propagate_request_id(request: Request, next: Next) -> Response {
    let context = RequestContext::from_header(
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let request_id = context.request_id().to_string();

    let mut response = scope_request_context(context, next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Serves `app` until `shutdown` resolves, then drains for at most `grace`.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> Result<()> {
    let signalled = Arc::new(Notify::new());
    let notify = Arc::clone(&signalled);

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received, draining connections");
                notify.notify_one();
            })
            .await
    };

    let drain_deadline = async {
        signalled.notified().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map_err(|e| Error::OperationFailed {
            operation: "serve".to_string(),
            cause: e.to_string(),
        }),
        () = drain_deadline => {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Grace period elapsed, dropping open connections"
            );
            Ok(())
        },
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
