//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (tracing, request timeout)
//! - Bind server to listener, stop on the shutdown signal
//! - Apply configuration reloads to the shared gateway state
//! - Dispatch requests: route lookup, then the balancing pipeline

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::http::forward::{ForwardStage, HttpExchange};
use crate::observability::metrics;
use crate::pipeline::{
    DownstreamContext, DownstreamTarget, ErrorClass, LoadBalancingStage, PipelineError, Stage,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub pipeline: Arc<dyn Stage<HttpExchange>>,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    router: Router,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let gateway = Arc::new(Gateway::new(&config));

        let forward = ForwardStage::new(Duration::from_secs(config.timeouts.downstream_secs));
        let pipeline: Arc<dyn Stage<HttpExchange>> =
            Arc::new(LoadBalancingStage::new(gateway.house().clone(), forward));

        let state = AppState {
            gateway: gateway.clone(),
            pipeline,
        };

        let router = Self::build_router(&config, state);
        Self { router, gateway }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` replace the routing state
    /// without restarting; the listener and timeouts keep their startup values.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                gateway.apply_config(&config);
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

/// Main gateway handler.
/// Looks up the route, then leases an endpoint and forwards through the pipeline.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let (host, inbound_port) = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .map(split_host_port)
        .map_or((None, None), |(h, p)| (Some(h.to_string()), p));

    let router = state.gateway.router();
    let Some(route) = router.match_request(host.as_deref(), request.uri().path()) else {
        tracing::warn!(client = %client, path = %request.uri().path(), "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let route_name = route.name.clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    // endpoints without a port inherit the one the client addressed
    let mut target = DownstreamTarget::new(route.scheme.as_str(), path_and_query);
    target.port = inbound_port;
    let downstream = route.downstream();
    drop(router);

    let (parts, body) = request.into_parts();
    let exchange = HttpExchange::new(parts.method, parts.headers, body);
    let mut ctx = DownstreamContext::new(downstream, target, exchange);

    tracing::debug!(
        request_id = %ctx.request_id,
        client = %client,
        route = %route_name,
        "Dispatching request"
    );

    state.pipeline.invoke(&mut ctx).await;

    let response = match (ctx.errors.first(), ctx.exchange.response.take()) {
        (Some(error), _) => error_response(error),
        (None, Some(response)) => response,
        (None, None) => (StatusCode::BAD_GATEWAY, "No downstream response").into_response(),
    };

    metrics::record_request(&method, response.status().as_u16(), &route_name, start_time);
    response
}

fn error_response(error: &PipelineError) -> Response {
    let status = match error.class() {
        ErrorClass::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Misconfigured => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorClass::BadGateway => StatusCode::BAD_GATEWAY,
        ErrorClass::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, error.to_string()).into_response()
}

/// Split a Host header value into host and port; IPv6 brackets are removed.
fn split_host_port(authority: &str) -> (&str, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':').and_then(|p| p.parse().ok())),
            None => (rest, None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, port.parse().ok())
        }
        _ => (authority, None),
    }
}
