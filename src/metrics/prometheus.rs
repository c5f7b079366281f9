//! Metric definitions and the HTTP endpoint serving them

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, Gauge, HistogramVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Per-workload pause/resume outcomes
    pub static ref OPERATIONS: CounterVec = register_counter_vec!(
        "controller_pause_operations_total",
        "Total number of workload pause/resume operations by outcome",
        &["operation", "outcome"]
    ).unwrap();

    /// Duration of whole pause/resume passes
    pub static ref PASS_DURATION: HistogramVec = register_histogram_vec!(
        "controller_pause_pass_duration_seconds",
        "Duration of pause/resume passes in seconds",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    /// Replica snapshot writes by outcome
    pub static ref SNAPSHOT_WRITES: CounterVec = register_counter_vec!(
        "controller_pause_snapshot_writes_total",
        "Total number of replica snapshot writes by outcome",
        &["outcome"]
    ).unwrap();

    /// Workloads currently held at zero replicas by this process
    pub static ref PAUSED_WORKLOADS: Gauge = prometheus::register_gauge!(
        "controller_pause_paused_workloads",
        "Number of workloads paused by the last pause pass"
    ).unwrap();

    /// Process health (1 = healthy, 0 = unhealthy)
    pub static ref HEALTH: Gauge = prometheus::register_gauge!(
        "controller_pause_health",
        "Health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Serve `/metrics`, `/healthz` and `/readyz` until `shutdown` fires.
///
/// `HEALTH` is 1 only while the listener is accepting connections.
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let result = accept_loop(port, shutdown).await;
    HEALTH.set(0.0);
    if let Err(e) = &result {
        error!(error = %e, "Metrics server stopped");
    }
    result
}

async fn accept_loop(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Metrics server listening");

    HEALTH.set(1.0);

    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => accepted?.0,
            _ = shutdown.cancelled() => {
                info!("Metrics server stopping");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Error serving metrics connection");
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/readyz" => respond(StatusCode::OK, "ok"),
        _ => respond(StatusCode::NOT_FOUND, "Not Found"),
    })
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return respond(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

fn respond(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Record the outcome of one workload operation
pub fn record_operation(operation: &str, outcome: &str) {
    OPERATIONS.with_label_values(&[operation, outcome]).inc();
}
