//! Offline proxy: runs every incoming request through the fetch handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::agent::OfflineAgent;
use crate::cache::CacheStorage;
use crate::config::ServerConfig;
use crate::control::WorkerControl;
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::network::Network;

/// Header telling the client which fallback produced the response.
pub const SOURCE_HEADER: &str = "x-offline-source";

/// Hop-by-hop headers, plus `content-length`, which is recomputed for the
/// buffered body. None of these is forwarded in either direction.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

fn is_forwardable(name: &str) -> bool {
    !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Converts an incoming request into an agent request against the origin.
fn to_agent_request(
    origin_url: String,
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Request {
    let headers = headers
        .iter()
        .filter(|(name, _)| name.as_str() != "host" && is_forwardable(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Request {
        method,
        url: origin_url,
        headers,
        body,
    }
}

/// Converts an agent response into an axum response tagged with its source.
fn to_http_response(response: Response, source: &'static str) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if !is_forwardable(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    (status, headers, response.body).into_response()
}

async fn proxy<S, N, W>(
    State(agent): State<Arc<OfflineAgent<S, N, W>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
    W: WorkerControl + 'static,
{
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = match agent.config().resolve_on_origin(path) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let request = to_agent_request(url, method, &headers, body);
    let outcome = agent.fetch(&request).await;
    match (outcome.source(), outcome.into_response()) {
        (Some(source), Some(response)) => to_http_response(response, source.as_str()),
        _ => {
            log::info!("{} {}: offline, nothing cached", request.method, request.url);
            (
                StatusCode::GATEWAY_TIMEOUT,
                [(SOURCE_HEADER, "none")],
                "Offline and no cached copy is available",
            )
                .into_response()
        }
    }
}

/// Builds the proxy router for an agent.
pub fn router<S, N, W>(agent: Arc<OfflineAgent<S, N, W>>) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
    W: WorkerControl + 'static,
{
    Router::new().fallback(proxy::<S, N, W>).with_state(agent)
}

/// Serves the proxy on an already bound listener until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve_on<S, N, W>(
    listener: TcpListener,
    agent: Arc<OfflineAgent<S, N, W>>,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
    W: WorkerControl + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!(
            "Offline proxy for {} listening on http://{addr}",
            agent.config().origin
        );
    }
    axum::serve(listener, router(agent))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("Offline proxy stopped");
    Ok(())
}

/// Binds to the configured address and serves the proxy until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address is invalid, cannot be bound, or the server fails.
pub async fn serve<S, N, W>(
    agent: Arc<OfflineAgent<S, N, W>>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
    W: WorkerControl + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid server address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, agent, shutdown).await
}
