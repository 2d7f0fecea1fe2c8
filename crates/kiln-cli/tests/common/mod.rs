//! Shared fixtures: an in-process axum app standing in for the build server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, Response, StatusCode},
    routing::{any, get},
    Router,
};
use http_body_util::BodyExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use kiln_cli::dev::{
    start_server, BuildProcess, BuildServerHandle, Bundler, DevServer, ServeRequest, ServerConfig,
};
use kiln_cli::StartupError;
use std::convert::Infallible;
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

pub const INDEX_HTML: &str = "<!doctype html><html><body><div id=\"root\"></div></body></html>";
pub const APP_JS: &str = "import React from \"react\";\nimport \"./styles.css\";\nconst page = () => import(\"./page.js\");\n";
pub const APP_CSS: &str = "body { margin: 0; }";

/// Routes served by the stand-in build server.
pub fn build_server_routes() -> Router {
    Router::new()
        .route(
            "/index.html",
            get(|| async { html_response(INDEX_HTML) }),
        )
        .route(
            "/src/app.js",
            get(|| async { typed_response("application/javascript", APP_JS) }),
        )
        .route(
            "/src/app.css",
            get(|| async { typed_response("text/css", APP_CSS) }),
        )
        .route(
            "/boom",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route("/echo", any(echo))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "slow"
            }),
        )
}

fn html_response(body: &'static str) -> Response<Body> {
    typed_response("text/html", body)
}

fn typed_response(content_type: &'static str, body: &'static str) -> Response<Body> {
    Response::builder()
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap()
}

/// Reflects the request back: method and probe header as response headers,
/// the request body as the response body.
async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Response<Body> {
    let probe = headers
        .get("x-kiln-probe")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    Response::builder()
        .status(StatusCode::CREATED)
        .header("x-echo-method", method.as_str())
        .header("x-echo-probe", probe)
        .header("x-upstream", "stand-in")
        .header("content-type", "application/octet-stream")
        .body(Body::from(body))
        .unwrap()
}

/// Build server routes plus two endpoints with streamed bodies.
///
/// `/ticker` sends a chunk every 20ms until its reader goes away, then sets
/// `ticker_closed`. `/gated` sends `first` and holds back `rest` until
/// `gate` is notified.
#[derive(Clone, Default)]
pub struct StreamingRoutes {
    pub ticker_closed: Arc<AtomicBool>,
    pub gate: Arc<Notify>,
}

impl StreamingRoutes {
    pub fn router(&self) -> Router {
        let closed = self.ticker_closed.clone();
        let gate = self.gate.clone();
        build_server_routes()
            .route("/ticker", get(move || ticker(closed.clone())))
            .route("/gated", get(move || gated(gate.clone())))
    }
}

type Chunks = mpsc::Receiver<Result<Bytes, Infallible>>;

fn stream_response(rx: Chunks) -> Response<Body> {
    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap()
}

async fn ticker(closed: Arc<AtomicBool>) -> Response<Body> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut n = 0u64;
        while tx.send(Ok(Bytes::from(format!("tick {}\n", n)))).await.is_ok() {
            n += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        closed.store(true, Ordering::SeqCst);
    });
    stream_response(rx)
}

async fn gated(gate: Arc<Notify>) -> Response<Body> {
    let (tx, rx) = mpsc::channel(2);
    tokio::spawn(async move {
        let _ = tx.send(Ok(Bytes::from_static(b"first\n"))).await;
        gate.notified().await;
        let _ = tx.send(Ok(Bytes::from_static(b"rest\n"))).await;
    });
    stream_response(rx)
}

/// Bundler that serves a router in-process and counts stops.
pub struct StubBundler {
    router: Option<Router>,
    pub stops: Arc<AtomicUsize>,
    pub serves: Arc<AtomicUsize>,
}

impl StubBundler {
    pub fn new(router: Router) -> Self {
        Self {
            router: Some(router),
            stops: Arc::default(),
            serves: Arc::default(),
        }
    }

    /// Reports a build server on a port nothing listens on.
    pub fn unreachable() -> Self {
        Self {
            router: None,
            stops: Arc::default(),
            serves: Arc::default(),
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

struct InProcess {
    task: Option<JoinHandle<()>>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl BuildProcess for InProcess {
    async fn terminate(&mut self) -> std::io::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Bundler for StubBundler {
    async fn serve(&self, _request: ServeRequest) -> Result<BuildServerHandle, StartupError> {
        self.serves.fetch_add(1, Ordering::SeqCst);

        let (port, task) = match &self.router {
            Some(router) => {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                let router = router.clone();
                let task = tokio::spawn(async move {
                    let _ = axum::serve(listener, router).await;
                });
                (port, Some(task))
            }
            None => (free_port(), None),
        };

        Ok(BuildServerHandle::new(
            "127.0.0.1",
            port,
            Box::new(InProcess {
                task,
                stops: self.stops.clone(),
            }),
        ))
    }
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A started server plus everything the test needs to keep alive.
pub struct Harness {
    pub server: DevServer,
    pub bundler: Arc<StubBundler>,
    pub root: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(StubBundler::new(build_server_routes()), |_| {}).await
    }

    pub async fn start_with(bundler: StubBundler, configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let root = TempDir::new().unwrap();
        let mut config = ServerConfig::for_root(root.path(), free_port()).unwrap();
        config.shutdown_timeout = Duration::from_secs(2);
        configure(&mut config);

        let bundler = Arc::new(bundler);
        let server = start_server(config, bundler.clone()).await.unwrap();

        Self {
            server,
            bundler,
            root,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.server_url(), path)
    }
}

pub fn http_client() -> Client<HttpConnector, Body> {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Send a request and buffer the whole response.
pub async fn send(req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = http_client().request(req).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, bytes)
}

pub async fn get_url(url: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(Request::get(url).body(Body::empty()).unwrap()).await
}
