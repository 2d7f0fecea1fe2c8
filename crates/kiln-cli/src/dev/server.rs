//! Development server facade.
//!
//! [`start_server`] starts the bundler's build server, binds the public
//! listener and proxies everything to the build server. The returned
//! [`DevServer`] is the single handle callers use for URL resolution, change
//! notification, runtime loading and shutdown.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::dev::bundler::{BuildServerHandle, Bundler, Upstream};
use crate::dev::mime::{ExtensionTable, MimeLookup};
use crate::dev::notifier::{ChangeNotifier, Subscription};
use crate::dev::proxy::RequestProxy;
use crate::dev::resolve::{UrlLoader, UrlResolution, UrlResolver};
use crate::dev::responses;
use crate::dev::runtime::{RuntimeOptions, ServerRuntime};
use crate::dev::state::{DevServerState, ServerStatus, SharedState};
use crate::dev::{ChangeEvent, ServerConfig};
use crate::error::{CliError, ListenerError, ResolutionError, StartupError};

/// Route for the change notification stream.
pub const HMR_PATH: &str = "/__kiln_hmr__";

/// How long terminated connections get to close before the listener task is
/// aborted.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Start the build server and the public listener.
///
/// # Errors
///
/// - `config` breaks an invariant (`InvalidConfig`)
/// - The bundler fails to start (`Spawn`, `ExitedEarly`, `ReadyTimeout`)
/// - The public port cannot be bound (`Bind`); the build server is stopped
///   before returning
pub async fn start_server(
    config: ServerConfig,
    bundler: Arc<dyn Bundler>,
) -> Result<DevServer, StartupError> {
    config.validate()?;
    let state: SharedState = Arc::new(DevServerState::new());

    let build_server = bundler.serve(config.serve_request()).await?;
    let upstream = build_server.upstream();
    debug!("build server listening on {}", upstream);

    let (listener, port) = match bind(&config.address()).await {
        Ok(bound) => bound,
        Err(err) => {
            if let Err(stop_err) = build_server.stop().await {
                warn!("failed to stop build server: {}", stop_err);
            }
            return Err(err);
        }
    };

    let proxy = RequestProxy::new(upstream);
    let mime: Arc<dyn MimeLookup> = Arc::new(ExtensionTable);
    let resolver = UrlResolver::new(
        proxy.clone(),
        config.root_directory.clone(),
        state.changes(),
    )
    .with_mime(mime.clone());

    let terminate = CancellationToken::new();
    let router = build_router(
        AppState {
            state: state.clone(),
            proxy: proxy.clone(),
            mime: mime.clone(),
            terminate: terminate.clone(),
        },
        config.hmr_enabled,
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (closed_tx, closed_rx) = watch::channel(false);
    let serve_task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        let _ = closed_tx.send(true);
        result
    });

    state.transition(ServerStatus::Starting, ServerStatus::Running);
    info!("dev server running at http://{}:{}", config.host, port);

    Ok(DevServer {
        config,
        port,
        state,
        build_server,
        proxy,
        resolver,
        notifier: ChangeNotifier::new(),
        mime,
        terminate,
        shutdown_tx: parking_lot::Mutex::new(Some(shutdown_tx)),
        serve_task: tokio::sync::Mutex::new(Some(serve_task)),
        closed: closed_rx,
    })
}

async fn bind(address: &str) -> Result<(TcpListener, u16), StartupError> {
    let to_bind_error = |source| StartupError::Bind {
        address: address.to_string(),
        source,
    };
    let listener = TcpListener::bind(address).await.map_err(to_bind_error)?;
    let port = listener.local_addr().map_err(to_bind_error)?.port();
    Ok((listener, port))
}

/// A running dev server.
pub struct DevServer {
    config: ServerConfig,
    port: u16,
    state: SharedState,
    build_server: BuildServerHandle,
    proxy: RequestProxy,
    resolver: UrlResolver,
    notifier: ChangeNotifier,
    mime: Arc<dyn MimeLookup>,
    /// Cancelled when draining gives up on open exchanges
    terminate: CancellationToken,
    shutdown_tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
    serve_task: tokio::sync::Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    closed: watch::Receiver<bool>,
}

impl DevServer {
    /// The bound public port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn status(&self) -> ServerStatus {
        self.state.status()
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.port)
    }

    /// Address of the build server requests are proxied to.
    pub fn upstream(&self) -> &Upstream {
        self.proxy.upstream()
    }

    /// Resolve `url` to its built contents and the imports it references.
    pub async fn load_url(&self, url: &str) -> Result<UrlResolution, ResolutionError> {
        self.resolver.load_url(url).await
    }

    /// Servable URL for a package specifier.
    pub fn get_url_for_package(&self, spec: &str) -> Result<String, ResolutionError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ResolutionError::InvalidSpecifier(spec.to_string()));
        }
        Ok(spec.to_string())
    }

    /// Servable URL for a file: root-relative for files under the served
    /// root, the path itself otherwise.
    pub fn get_url_for_file(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        let root = &self.config.root_directory;

        let relative = path.strip_prefix(root).ok().map(Path::to_path_buf).or_else(|| {
            let canonical = path.canonicalize().ok()?;
            canonical.strip_prefix(root).ok().map(Path::to_path_buf)
        });

        match relative {
            Some(relative) => root_relative_url(&relative),
            None => path.to_string_lossy().into_owned(),
        }
    }

    /// Proxy a request to the build server.
    pub async fn handle_request(&self, req: Request<Body>) -> Response<Body> {
        proxy_or_unavailable(
            &self.state,
            &self.proxy,
            self.mime.as_ref(),
            &self.terminate,
            req,
        )
        .await
    }

    /// Serve a file; files are always served by the build server.
    pub async fn send_response_file(&self, req: Request<Body>) -> Response<Body> {
        self.handle_request(req).await
    }

    /// Empty error response typed after the requested path.
    pub fn send_response_error<B>(&self, req: &Request<B>, status: StatusCode) -> Response<Body> {
        responses::send_response_error(req, status, self.mime.as_ref())
    }

    /// Register a listener for announced file changes.
    pub fn on_file_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    /// A module loader backed by this server's build server.
    pub fn get_server_runtime(&self, options: RuntimeOptions) -> ServerRuntime {
        ServerRuntime::new(Arc::new(self.resolver.clone()), options, &self.notifier)
    }

    /// Announce that `path` changed.
    ///
    /// Marks outstanding resolutions stale, notifies listeners in
    /// registration order and pushes the event to HMR clients. Returns the
    /// listener failures, which have already been logged.
    pub fn mark_changed(&self, path: impl Into<PathBuf>) -> Vec<ListenerError> {
        let event = ChangeEvent {
            file_path: path.into(),
        };
        let generation = self.state.bump_generation();
        debug!(file = %event.file_path.display(), generation, "change announced");

        let failures = self.notifier.publish(&event);
        if self.config.hmr_enabled {
            self.state.broadcast(&event);
        }
        failures
    }

    /// Resolves once the public listener has stopped serving.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // A dropped sender means the serve task is gone too.
        let _ = closed.wait_for(|done| *done).await;
    }

    /// Stop accepting connections, drain in-flight requests, then stop the
    /// build server.
    ///
    /// Exchanges still open after `shutdown_timeout` are terminated: their
    /// response bodies fail and the connections are closed.
    ///
    /// Only the first call does anything; later and concurrent calls return
    /// `Ok(())` immediately.
    pub async fn shutdown(&self) -> Result<(), CliError> {
        if !self
            .state
            .transition(ServerStatus::Running, ServerStatus::ShuttingDown)
        {
            return Ok(());
        }
        info!("shutting down dev server");

        // Event streams never finish on their own.
        self.state.disconnect_all();
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        let task = self.serve_task.lock().await.take();
        if let Some(mut task) = task {
            self.drain(&mut task).await;
        }
        self.terminate.cancel();

        let stopped = self.build_server.stop().await;
        self.state.set_status(ServerStatus::Stopped);

        match stopped {
            Ok(_) => {
                debug!("dev server stopped");
                Ok(())
            }
            Err(err) => Err(CliError::Server(format!(
                "failed to stop build server: {}",
                err
            ))),
        }
    }

    async fn drain(&self, task: &mut JoinHandle<std::io::Result<()>>) {
        let timeout = self.config.shutdown_timeout;
        let joined = match tokio::time::timeout(timeout, &mut *task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "in-flight requests did not finish within {}ms, terminating them",
                    timeout.as_millis()
                );
                self.terminate.cancel();

                match tokio::time::timeout(TERMINATE_GRACE, &mut *task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("connections still open after termination, aborting listener");
                        task.abort();
                        return;
                    }
                }
            }
        };

        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("server error during shutdown: {}", err),
            Err(err) => warn!("server task failed: {}", err),
        }
    }
}

fn root_relative_url(relative: &Path) -> String {
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", segments.join("/"))
}

#[derive(Clone)]
struct AppState {
    state: SharedState,
    proxy: RequestProxy,
    mime: Arc<dyn MimeLookup>,
    terminate: CancellationToken,
}

fn build_router(app: AppState, hmr_enabled: bool) -> Router {
    let mut router = Router::new();

    if hmr_enabled {
        router = router.route(
            HMR_PATH,
            get(handle_hmr).layer(
                // CORS: Allow all origins for dev (standard practice)
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        );
    }

    router.fallback(handle_proxy).with_state(app)
}

async fn handle_proxy(State(app): State<AppState>, req: Request<Body>) -> Response<Body> {
    proxy_or_unavailable(
        &app.state,
        &app.proxy,
        app.mime.as_ref(),
        &app.terminate,
        req,
    )
    .await
}

async fn proxy_or_unavailable(
    state: &DevServerState,
    proxy: &RequestProxy,
    mime: &dyn MimeLookup,
    terminate: &CancellationToken,
    req: Request<Body>,
) -> Response<Body> {
    if !state.status().is_running() {
        return responses::send_response_error(&req, StatusCode::SERVICE_UNAVAILABLE, mime);
    }

    // Keep the path around for the error response.
    let mut head = Request::new(());
    *head.uri_mut() = req.uri().clone();

    match proxy.handle_until(req, terminate).await {
        Some(response) => response,
        None => responses::send_response_error(&head, StatusCode::SERVICE_UNAVAILABLE, mime),
    }
}

fn unavailable() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}

/// Handle SSE connections for change events.
async fn handle_hmr(State(app): State<AppState>) -> Response<Body> {
    let (id, rx) = app.state.register_client();

    // Registered after `disconnect_all` ran, so nothing would ever end it.
    if !app.state.status().is_running() {
        app.state.unregister_client(id);
        return unavailable();
    }
    debug!("HMR client {} connected", id);

    let stream =
        ReceiverStream::new(rx).map(|data| Ok::<_, Infallible>(Event::default().data(data)));

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_state() -> AppState {
        AppState {
            state: Arc::new(DevServerState::new()),
            proxy: RequestProxy::new(Upstream {
                host: "127.0.0.1".to_string(),
                port: 4100,
            }),
            mime: Arc::new(ExtensionTable),
            terminate: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_hmr_refused_outside_running() {
        let app = app_state();
        app.state.set_status(ServerStatus::ShuttingDown);

        let response = handle_hmr(State(app.clone())).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(app.state.client_count(), 0);
    }

    #[tokio::test]
    async fn test_hmr_registers_client_while_running() {
        let app = app_state();
        app.state.set_status(ServerStatus::Running);

        let response = handle_hmr(State(app.clone())).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.state.client_count(), 1);
    }

    #[tokio::test]
    async fn test_terminated_exchange_is_unavailable() {
        let app = app_state();
        app.state.set_status(ServerStatus::Running);
        app.terminate.cancel();

        let req = Request::get("/src/app.js").body(Body::empty()).unwrap();
        let response = handle_proxy(State(app), req).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()["content-type"],
            "application/javascript"
        );
    }

    #[test]
    fn test_root_relative_url_uses_forward_slashes() {
        let relative: PathBuf = ["src", "components", "App.jsx"].iter().collect();
        assert_eq!(root_relative_url(&relative), "/src/components/App.jsx");
        assert_eq!(root_relative_url(Path::new("")), "/");
    }
}
