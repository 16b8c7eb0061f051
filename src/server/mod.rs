//! HTTP front end serving the status tree under `/json`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::query::{self, QueryConfig};
use crate::tree::StatusTree;

type Params = Query<Vec<(String, String)>>;

/// Build the router. Every response carries `Access-Control-Allow-Origin: *`.
pub fn router(tree: Arc<StatusTree>) -> Router {
    Router::new()
        .route("/json", get(json_root))
        .route("/json/", get(json_root))
        .route("/json/*path", get(json_path))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                )),
        )
        .with_state(tree)
}

async fn json_root(State(tree): State<Arc<StatusTree>>, Query(params): Params) -> Response {
    handle(&tree, "", &params).await
}

async fn json_path(
    State(tree): State<Arc<StatusTree>>,
    Path(path): Path<String>,
    Query(params): Params,
) -> Response {
    handle(&tree, &path, &params).await
}

async fn handle(tree: &StatusTree, path: &str, params: &[(String, String)]) -> Response {
    let config = QueryConfig::from_pairs(params);
    match query::execute(tree, path, &config).await {
        Ok(response) => {
            let mut http = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, HeaderValue::from_static(response.content_type))],
                response.body,
            )
                .into_response();
            if response.cache_seconds > 0 {
                let expires = Utc::now() + chrono::Duration::seconds(i64::from(response.cache_seconds));
                let expires = expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
                if let Ok(value) = HeaderValue::from_str(&expires) {
                    http.headers_mut().insert(header::EXPIRES, value);
                }
                http.headers_mut()
                    .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            }
            http
        }
        Err(e) => {
            let status = if e.is_not_found() {
                tracing::debug!(path, error = %e, "not found");
                StatusCode::NOT_FOUND
            } else {
                tracing::error!(path, error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, axum::Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(
    tree: StatusTree,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(tree));

    let host_addr: std::net::IpAddr = host
        .parse()
        .map_err(|e| format!("Invalid host address '{}': {}", host, e))?;
    let addr = SocketAddr::from((host_addr, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving status at http://{}/json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
