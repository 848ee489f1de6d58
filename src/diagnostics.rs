//! Read-only view of the engine and the HTTP surface that serves it.
//!
//! The engine publishes a [`Diagnostics`] value after every cycle into shared
//! storage. [`DiagnosticsServer`] serves that storage over HTTP:
//!
//! | Path | Body |
//! |------|------|
//! | `/` | endpoint list |
//! | `/health` | `OK`, or 503 before the engine has started |
//! | `/metrics` | Prometheus text exposition |
//! | `/metrics/json` | [`Diagnostics`] as JSON |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use pm2watch_types::{MonitorState, ProcessSnapshot, ProcessStatus};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Shared, continuously updated diagnostics.
pub type DiagnosticsHandle = Arc<RwLock<Diagnostics>>;

/// A point-in-time copy of what the engine knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub process_name: String,
    pub is_running: bool,
    pub state: MonitorState,
    pub last_snapshot: Option<ProcessSnapshot>,
    pub notifications_sent: u64,
    pub delivery_failures: u64,
    pub last_notification_at_ms: Option<u64>,
    /// When the engine was started.
    pub started_at_ms: Option<u64>,
}

impl Diagnostics {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            ..Default::default()
        }
    }

    pub fn last_status(&self) -> ProcessStatus {
        self.state.last_status
    }

    pub fn restart_count(&self) -> u64 {
        self.state.restart_count
    }
}

/// Render diagnostics in the Prometheus text exposition format.
pub fn format_prometheus(diag: &Diagnostics) -> String {
    let mut out = String::new();
    let label = format!("process=\"{}\"", escape_label_value(&diag.process_name));

    let mut metric = |name: &str, kind: &str, help: &str, value: String| {
        out.push_str(&format!("# HELP {} {}\n", name, help));
        out.push_str(&format!("# TYPE {} {}\n", name, kind));
        out.push_str(&format!("{}{{{}}} {}\n", name, label, value));
    };

    metric(
        "pm2watch_up",
        "gauge",
        "Whether the monitor is running",
        u8::from(diag.is_running).to_string(),
    );
    metric(
        "pm2watch_process_status",
        "gauge",
        "Last observed status (0 unknown, 1 online, 2 launching, 3 restarting, 4 stopping, 5 stopped, 6 errored, 7 not found)",
        diag.state.last_status.gauge().to_string(),
    );

    if let Some(snapshot) = &diag.last_snapshot {
        metric(
            "pm2watch_process_uptime_seconds",
            "gauge",
            "Uptime of the current process incarnation",
            format!("{:.3}", snapshot.uptime().as_secs_f64()),
        );
        metric(
            "pm2watch_process_memory_bytes",
            "gauge",
            "Resident memory of the process",
            snapshot.memory_bytes.to_string(),
        );
        metric(
            "pm2watch_process_cpu_percent",
            "gauge",
            "CPU usage of the process",
            format!("{:.2}", snapshot.cpu_percent),
        );
        metric(
            "pm2watch_supervisor_restarts",
            "gauge",
            "Restart counter reported by PM2",
            snapshot.restart_count.to_string(),
        );
    }

    metric(
        "pm2watch_restarts_total",
        "counter",
        "Restarts detected by the monitor",
        diag.state.restart_count.to_string(),
    );
    metric(
        "pm2watch_notifications_sent_total",
        "counter",
        "Notifications delivered",
        diag.notifications_sent.to_string(),
    );
    metric(
        "pm2watch_delivery_failures_total",
        "counter",
        "Notifications that could not be delivered",
        diag.delivery_failures.to_string(),
    );

    out
}

/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// HTTP server for a [`DiagnosticsHandle`].
#[derive(Debug, Clone)]
pub struct DiagnosticsServer {
    addr: SocketAddr,
    storage: DiagnosticsHandle,
}

impl DiagnosticsServer {
    pub fn new(addr: SocketAddr, storage: DiagnosticsHandle) -> Self {
        Self { addr, storage }
    }

    /// Bind the listener and serve in a background task.
    ///
    /// Binding happens before returning so address errors surface at startup.
    pub async fn start(self) -> std::io::Result<JoinHandle<()>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "Diagnostics server listening");

        let storage = self.storage;
        Ok(tokio::spawn(async move {
            if let Err(e) = serve(listener, storage).await {
                error!(error = %e, "Diagnostics server stopped");
            }
        }))
    }
}

async fn serve(listener: TcpListener, storage: DiagnosticsHandle) -> std::io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let storage = storage.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let storage = storage.clone();
                async move { handle_request(req.uri().path(), &storage) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(error = %e, "Diagnostics connection error");
            }
        });
    }
}

fn handle_request(
    path: &str,
    storage: &DiagnosticsHandle,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match path {
        "/" => respond(
            StatusCode::OK,
            "application/json",
            serde_json::json!({
                "service": "pm2watch",
                "endpoints": ["/health", "/metrics", "/metrics/json"],
            })
            .to_string(),
        ),
        "/health" | "/healthz" => {
            if storage.read().is_running {
                respond(StatusCode::OK, "text/plain", "OK".to_string())
            } else {
                respond(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/plain",
                    "STOPPED".to_string(),
                )
            }
        }
        "/metrics" => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus(&storage.read()),
        ),
        "/metrics/json" => {
            let diag = storage.read().clone();
            match serde_json::to_string(&diag) {
                Ok(body) => respond(StatusCode::OK, "application/json", body),
                Err(e) => respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    e.to_string(),
                ),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn sample() -> Diagnostics {
        let mut diag = Diagnostics::new("api \"main\"");
        diag.is_running = true;
        diag.state.last_status = ProcessStatus::Online;
        diag.state.restart_count = 2;
        diag.notifications_sent = 5;
        diag.last_snapshot = Some(
            ProcessSnapshot::builder("api")
                .status(ProcessStatus::Online)
                .started_at_ms(1_000)
                .observed_at_ms(61_000)
                .memory_bytes(1024)
                .cpu_percent(12.5)
                .restart_count(7)
                .build(),
        );
        diag
    }

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_format_prometheus() {
        let text = format_prometheus(&sample());
        let label = r#"process="api \"main\"""#;

        assert!(text.contains(&format!("pm2watch_up{{{}}} 1\n", label)));
        assert!(text.contains(&format!("pm2watch_process_status{{{}}} 1\n", label)));
        assert!(text.contains(&format!("pm2watch_process_uptime_seconds{{{}}} 60.000\n", label)));
        assert!(text.contains(&format!("pm2watch_restarts_total{{{}}} 2\n", label)));
        assert!(text.contains(&format!("pm2watch_supervisor_restarts{{{}}} 7\n", label)));
        assert!(text.contains("# TYPE pm2watch_notifications_sent_total counter"));
    }

    #[test]
    fn test_format_prometheus_without_snapshot() {
        let text = format_prometheus(&Diagnostics::new("api"));
        assert!(text.contains("pm2watch_up{process=\"api\"} 0\n"));
        assert!(!text.contains("pm2watch_process_memory_bytes"));
    }

    #[tokio::test]
    async fn test_routes() {
        let storage: DiagnosticsHandle = Arc::new(RwLock::new(sample()));

        let health = handle_request("/health", &storage).unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let json = handle_request("/metrics/json", &storage).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body_of(json).await).unwrap();
        assert_eq!(value["state"]["restart_count"], 2);
        assert_eq!(value["state"]["last_status"], "online");

        let missing = handle_request("/nope", &storage).unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        storage.write().is_running = false;
        let health = handle_request("/health", &storage).unwrap();
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_server_serves_metrics() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let storage: DiagnosticsHandle = Arc::new(RwLock::new(sample()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, storage));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("pm2watch_notifications_sent_total"));
    }
}
