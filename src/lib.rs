//! dirauth checks credentials against an LDAP directory and maps directory
//! entries to application identities.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ldap;
mod router;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State over an in-memory directory.
#[cfg(test)]
pub(crate) fn test_state(memory: ldap::testing::MemoryDirectory) -> AppState {
    let mut config = config::Configuration::default();
    config.ldap = Some(ldap::configuration::tests::configuration());
    let directory = ldap::Directory::with_connector(
        ldap::configuration::tests::configuration(),
        memory,
    )
    .unwrap();

    AppState {
        config: Arc::new(config),
        directory: Arc::new(directory),
        metrics: None,
    }
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub directory: Arc<ldap::Directory>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout() + Duration::from_secs(5),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .route("/metrics", get(router::metrics::handler))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => config::Configuration::default().path(path).read(),
        Err(_) => config::Configuration::default().read(),
    };

    // a directory is required.
    let Some(directory_config) = config.ldap.clone() else {
        return Err("missing `ldap` entry on `config.yaml` file".into());
    };
    let directory = ldap::Directory::new(directory_config)?;

    tracing::info!(
        host = %directory.config().host,
        port = directory.config().port,
        encryption = ?directory.policy().encryption,
        bases = directory.config().domain_bases_list().len(),
        "directory configured"
    );
    if directory.policy().encryption != ldap::Encryption::None && directory.policy().skip_verify {
        tracing::warn!("TLS certificate verification is disabled for the directory");
    }

    Ok(AppState {
        config,
        directory: Arc::new(directory),
        metrics: None,
    })
}
