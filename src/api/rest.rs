use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{
        header::{
            ACCEPT, ACCEPT_ENCODING, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN,
        },
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, MethodRouter},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use crate::config::{RouteConfig, RouteKind};
use crate::services::parser::parse_snapshot;
use crate::services::refresh::LAST_DATA_KEY;
use crate::services::render::{summarize, ITEMS_KEY};
use crate::services::{PublishedCache, RefreshStats};

pub struct AppState {
    pub cache: Arc<PublishedCache>,
    pub stats: Arc<RefreshStats>,
    pub static_root: PathBuf,
    pub index_file: String,
}

/// GET /data/{id} - raw published value, empty when unknown
async fn lookup(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> String {
    state.cache.read(&id)
}

/// GET /pool/{symbol} - numeric summary of the first pool with that symbol
async fn pool_summary(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    let blob = state.cache.read(LAST_DATA_KEY);
    if blob.is_empty() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let snapshot = match parse_snapshot(blob.as_bytes()) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("stored snapshot unreadable: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(pool) = snapshot.find(&symbol) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match serde_json::to_string(&summarize(pool)) {
        Ok(body) => ([(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::warn!("summary encoding failed for {}: {}", symbol, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /price/{any} - prerendered table
async fn price_table(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.cache.read(ITEMS_KEY))
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

/// GET /stats
async fn stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = &state.stats;
    Json(serde_json::json!({
        "cache_keys": state.cache.len(),
        "passes": stats.passes.load(Ordering::Relaxed),
        "succeeded": stats.succeeded.load(Ordering::Relaxed),
        "failed": stats.failed.load(Ordering::Relaxed),
        "consecutive_failures": stats.consecutive_failures.load(Ordering::Relaxed),
        "last_publish": stats.last_publish(),
    }))
}

fn is_traversal(path: &str) -> bool {
    path.to_ascii_lowercase().replace("%2e", ".").contains("..")
}

/// Everything the route table does not claim is a file under the static root.
async fn serve_static(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let path = req.uri().path();
    if is_traversal(path) {
        tracing::debug!("rejecting traversal path {}", path);
        return StatusCode::BAD_REQUEST.into_response();
    }

    let result = if path == "/" {
        ServeFile::new(state.static_root.join(&state.index_file))
            .oneshot(req)
            .await
    } else {
        ServeDir::new(&state.static_root).oneshot(req).await
    };

    match result {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches(','))
        .filter(|v| !v.is_empty())
}

/// Caller address: last valid `X-Forwarded-For` hop, then `X-Real-Ip`, then
/// the TCP peer.
pub fn real_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(xff) = header(headers, "x-forwarded-for") {
        if let Ok(ip) = xff.rsplit(',').next().unwrap_or_default().trim().parse() {
            return Some(ip);
        }
    } else if let Some(ip) = header(headers, "x-real-ip").and_then(|v| v.trim().parse().ok()) {
        return Some(ip);
    }
    peer.map(|addr| addr.ip())
}

async fn log_request(
    connect: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = real_addr(req.headers(), connect.map(|ConnectInfo(addr)| addr));
    tracing::debug!(
        "{} {} from {}",
        req.method(),
        req.uri().path(),
        peer.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string())
    );
    next.run(req).await
}

const ALLOWED_METHODS: [Method; 5] = [Method::POST, Method::GET, Method::OPTIONS, Method::PUT, Method::DELETE];

const ALLOWED_HEADERS: [HeaderName; 6] = [
    ACCEPT,
    CONTENT_TYPE,
    CONTENT_LENGTH,
    ACCEPT_ENCODING,
    HeaderName::from_static("x-csrf-token"),
    AUTHORIZATION,
];

fn joined<T, F>(items: &[T], name: F) -> Option<HeaderValue>
where
    F: Fn(&T) -> &str,
{
    let list: Vec<&str> = items.iter().map(name).collect();
    HeaderValue::from_str(&list.join(", ")).ok()
}

/// Echoes the caller's origin; `OPTIONS` is answered here with headers only.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
}

/// Non-preflight responses to a cross-origin caller carry the allow-lists too.
async fn cors_allow_lists(req: Request, next: Next) -> Response {
    let cross_origin = req.headers().contains_key(ORIGIN);
    let mut resp = next.run(req).await;
    if cross_origin {
        let headers = resp.headers_mut();
        if let Some(methods) = joined(&ALLOWED_METHODS, Method::as_str) {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        if let Some(names) = joined(&ALLOWED_HEADERS, HeaderName::as_str) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, names);
        }
    }
    resp
}

fn handler_for(kind: RouteKind) -> MethodRouter<Arc<AppState>> {
    match kind {
        RouteKind::Lookup => get(lookup),
        RouteKind::PoolSummary => get(pool_summary),
        RouteKind::PriceTable => get(price_table),
        RouteKind::Health => get(health),
        RouteKind::Stats => get(stats),
    }
}

pub fn create_rest_router(state: Arc<AppState>, routes: &[RouteConfig]) -> Router {
    routes
        .iter()
        .fold(Router::new(), |router, route| {
            router.route(&route.path, handler_for(route.handler))
        })
        .fallback(serve_static)
        .layer(middleware::from_fn(log_request))
        .layer(middleware::from_fn(cors_allow_lists))
        .layer(cors_layer())
        .with_state(state)
}
