//! HTTP server setup: router, embedded static UI, and API route wiring.

use super::decisions;
use super::state::ApiState;

use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::Embed;
use tower_http::cors::{Any, CorsLayer};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Embedded single-page app assets. `demos/` stands in for a real frontend
/// build's `dist/` output; the fallback degrades to a 404 when it's empty.
#[derive(Embed)]
#[folder = "demos/"]
#[allow(unused)]
struct UiAssets;

/// Start the HTTP server on the given address, shutting down gracefully when
/// `cancellation` fires.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    cancellation: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let decision_routes = Router::new()
        .route("/", get(decisions::list))
        .route("/events", get(decisions::events))
        .route("/{id}", get(decisions::get))
        .route("/{id}/resolve", axum::routing::post(decisions::resolve))
        .route("/{id}/dismiss", axum::routing::post(decisions::dismiss));

    let api_routes = Router::new()
        .nest("/decisions", decision_routes)
        .route("/unreleased", get(unreleased));

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/version", get(version))
        .route("/ui", get(static_handler))
        .route("/ui/{*path}", get(static_handler))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancellation.cancelled().await })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": env!("CARGO_PKG_NAME"),
    }))
}

/// Unreleased-commit reporting: no VCS REST client is wired up in this
/// build, so this reports which repos would be checked rather than
/// fabricating commit data.
async fn unreleased(axum::extract::State(state): axum::extract::State<Arc<ApiState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "configured": !state.vcs_repos.is_empty(),
        "repos": state.vcs_repos,
    }))
}

async fn static_handler(uri: Uri) -> Response {
    let path = uri
        .path()
        .trim_start_matches("/ui")
        .trim_start_matches('/');

    if let Some(content) = UiAssets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref())],
            content.data,
        )
            .into_response();
    }

    if let Some(content) = UiAssets::get("index.html") {
        return Html(std::str::from_utf8(&content.data).unwrap_or("").to_string()).into_response();
    }

    (StatusCode::NOT_FOUND, "not found").into_response()
}
