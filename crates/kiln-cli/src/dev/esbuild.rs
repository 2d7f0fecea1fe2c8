//! esbuild `--serve` build server.
//!
//! Spawns the esbuild CLI on an ephemeral loopback port and waits for it to
//! accept TCP connections before handing out a [`BuildServerHandle`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dev::bundler::{BuildProcess, BuildServerHandle, Bundler, ServeRequest};
use crate::error::StartupError;
use kiln_config::BundlerOptions;

const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Lines of bundler output kept for startup errors.
const OUTPUT_TAIL_LINES: usize = 20;

/// How long a dead or killed bundler gets to flush its pipes.
const OUTPUT_FLUSH_GRACE: Duration = Duration::from_millis(250);

/// Starts esbuild in serve mode.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    command: String,
    host: String,
    ready_timeout: Duration,
}

impl EsbuildBundler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            host: "127.0.0.1".to_string(),
            ready_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_options(options: &BundlerOptions) -> Self {
        Self::new(options.command.clone())
            .with_ready_timeout(Duration::from_millis(options.ready_timeout_ms))
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Command line for one serve session, without the executable.
    pub fn build_args(&self, request: &ServeRequest, port: u16) -> Vec<String> {
        let options = &request.options;
        let mut args = vec![
            format!("--serve={}:{}", self.host, port),
            format!("--servedir={}", request.serve_dir.display()),
        ];

        if options.bundle {
            args.push("--bundle".to_string());
        }
        args.push(format!("--outbase={}", options.outbase));
        if let Some(outdir) = &options.outdir {
            args.push(format!("--outdir={}", outdir.display()));
        }
        if options.minify {
            args.push("--minify".to_string());
        }

        args.extend(options.extra_args.iter().cloned());
        args.extend(request.entry_points.iter().cloned());
        args
    }
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn serve(&self, request: ServeRequest) -> Result<BuildServerHandle, StartupError> {
        for plugin in &request.plugins {
            warn!(
                "plugin '{}' ignored: the esbuild CLI cannot load plugins",
                plugin
            );
        }

        let port = reserve_port(&self.host).await?;
        let args = self.build_args(&request, port);
        debug!("spawning {} {}", self.command, args.join(" "));

        let mut child = Command::new(&self.command)
            .args(&args)
            .current_dir(&request.serve_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartupError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // Drain both pipes so a chatty bundler never blocks on a full buffer.
        let tail = OutputTail::default();
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(drain_lines(stdout, "stdout", tail.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(drain_lines(stderr, "stderr", tail.clone()));
        }

        let address = format!("{}:{}", self.host, port);
        match tokio::time::timeout(self.ready_timeout, wait_until_ready(&mut child, &address))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(StartupError::ExitedEarly { status, .. })) => {
                return Err(StartupError::ExitedEarly {
                    status,
                    output: collect_output(drains, &tail).await,
                });
            }
            Ok(Err(err)) => {
                abort_all(&drains);
                return Err(err);
            }
            Err(_) => {
                if let Err(err) = child.kill().await {
                    debug!("failed to kill unresponsive build server: {}", err);
                }
                return Err(StartupError::ReadyTimeout {
                    address,
                    timeout: self.ready_timeout,
                    output: collect_output(drains, &tail).await,
                });
            }
        }

        debug!("build server ready at {}", address);
        Ok(BuildServerHandle::new(
            self.host.clone(),
            port,
            Box::new(EsbuildProcess { child, drains }),
        ))
    }
}

/// Bind an ephemeral port and release it for the child to claim.
async fn reserve_port(host: &str) -> Result<u16, StartupError> {
    let listener = TcpListener::bind((host, 0)).await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

async fn wait_until_ready(child: &mut Child, address: &str) -> Result<(), StartupError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(StartupError::ExitedEarly {
                status: status.to_string(),
                output: String::new(),
            });
        }

        match TcpStream::connect(address).await {
            Ok(_) => return Ok(()),
            Err(e) => debug!("TCP probe failed for {}: {}", address, e),
        }

        tokio::time::sleep(PROBE_INTERVAL).await;
    }
}

/// The most recent lines the bundler printed.
#[derive(Clone, Default)]
struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl OutputTail {
    fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == OUTPUT_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn render(&self) -> String {
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

fn drain_lines<R>(reader: R, stream: &'static str, tail: OutputTail) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream, "esbuild: {}", line);
            tail.push(line);
        }
    })
}

/// Wait for the pipes to close, then return what the bundler printed.
///
/// A grandchild can keep a pipe open after the bundler itself is gone, so
/// each drain only gets a short grace period.
async fn collect_output(drains: Vec<JoinHandle<()>>, tail: &OutputTail) -> String {
    for mut drain in drains {
        if tokio::time::timeout(OUTPUT_FLUSH_GRACE, &mut drain).await.is_err() {
            drain.abort();
        }
    }
    tail.render()
}

fn abort_all(drains: &[JoinHandle<()>]) {
    for drain in drains {
        drain.abort();
    }
}

struct EsbuildProcess {
    child: Child,
    drains: Vec<JoinHandle<()>>,
}

#[async_trait]
impl BuildProcess for EsbuildProcess {
    async fn terminate(&mut self) -> std::io::Result<()> {
        abort_all(&self.drains);

        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::bundler::BundleOptions;
    use serial_test::serial;
    use std::path::PathBuf;

    fn request(serve_dir: PathBuf) -> ServeRequest {
        ServeRequest {
            serve_dir,
            entry_points: vec!["src/index.jsx".to_string()],
            options: BundleOptions {
                bundle: true,
                minify: false,
                outbase: "dist".to_string(),
                outdir: None,
                extra_args: vec![],
            },
            plugins: vec![],
        }
    }

    #[test]
    fn test_build_args_development() {
        let bundler = EsbuildBundler::default();
        let args = bundler.build_args(&request(PathBuf::from("/srv/app")), 4123);

        assert_eq!(
            args,
            vec![
                "--serve=127.0.0.1:4123",
                "--servedir=/srv/app",
                "--bundle",
                "--outbase=dist",
                "src/index.jsx",
            ]
        );
    }

    #[test]
    fn test_build_args_production_minifies() {
        let bundler = EsbuildBundler::default();
        let mut req = request(PathBuf::from("/srv/app"));
        req.options.minify = true;
        req.options.outdir = Some(PathBuf::from("build"));
        req.options.extra_args = vec!["--sourcemap".to_string()];

        let args = bundler.build_args(&req, 4123);

        assert!(args.contains(&"--minify".to_string()));
        assert!(args.contains(&"--outdir=build".to_string()));
        // extra args come before the entry points
        let sourcemap = args.iter().position(|a| a == "--sourcemap").unwrap();
        let entry = args.iter().position(|a| a == "src/index.jsx").unwrap();
        assert!(sourcemap < entry);
    }

    #[tokio::test]
    async fn test_reserved_ports_differ_between_sessions() {
        let first = reserve_port("127.0.0.1").await.unwrap();
        let listener = TcpListener::bind(("127.0.0.1", first)).await.unwrap();
        let second = reserve_port("127.0.0.1").await.unwrap();
        assert_ne!(first, second);
        drop(listener);
    }

    // Spawning tests run serially: a concurrent fork can hold the freshly
    // written script open and fail exec with ETXTBSY.
    #[tokio::test]
    #[serial]
    async fn test_missing_executable_is_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = EsbuildBundler::new("/definitely/not/esbuild");

        let err = bundler.serve(request(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, StartupError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_process_exiting_early_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundler = EsbuildBundler::new("false");

        let err = bundler.serve(request(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, StartupError::ExitedEarly { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_server_that_never_listens_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("silent-bundler.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let bundler = EsbuildBundler::new(script.to_string_lossy())
            .with_ready_timeout(Duration::from_millis(200));

        let err = bundler.serve(request(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, StartupError::ReadyTimeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_early_exit_carries_bundler_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("failing-bundler.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'X [ERROR] Could not resolve \"src/index.jsx\"' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let bundler = EsbuildBundler::new(script.to_string_lossy());
        let err = bundler.serve(request(dir.path().to_path_buf())).await.unwrap_err();

        match &err {
            StartupError::ExitedEarly { output, .. } => {
                assert!(output.contains("Could not resolve"), "output: {output}");
            }
            other => panic!("expected ExitedEarly, got {other:?}"),
        }
        assert!(err.to_string().contains("Could not resolve \"src/index.jsx\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_ready_timeout_carries_bundler_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("stuck-bundler.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'waiting for lock' >&2\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let bundler = EsbuildBundler::new(script.to_string_lossy())
            .with_ready_timeout(Duration::from_millis(300));
        let err = bundler.serve(request(dir.path().to_path_buf())).await.unwrap_err();

        match err {
            StartupError::ReadyTimeout { output, .. } => assert_eq!(output, "waiting for lock"),
            other => panic!("expected ReadyTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_output_tail_keeps_latest_lines() {
        let tail = OutputTail::default();
        for i in 0..OUTPUT_TAIL_LINES + 5 {
            tail.push(format!("line {}", i));
        }

        let rendered = tail.render();
        assert!(!rendered.contains("line 4\n"));
        assert!(rendered.starts_with("line 5\n"));
        assert!(rendered.ends_with(&format!("line {}", OUTPUT_TAIL_LINES + 4)));
    }
}
