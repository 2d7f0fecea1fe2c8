//! Development server command implementation.
//!
//! Loads the layered configuration, starts the bundler's build server behind
//! the proxy and blocks until Ctrl+C, then shuts everything down in order.

use crate::cli::DevArgs;
use crate::dev::{start_server, Bundler, EsbuildBundler, ServerConfig};
use crate::error::{CliError, Result};
use crate::ui;
use kiln_config::{ConfigDiscovery, KilnConfig};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error};

/// Execute the dev command.
///
/// # Process Flow
///
/// 1. Load config (defaults, file, `KILN_*` env, flags)
/// 2. Start the build server and the public listener
/// 3. Open the browser unless `open` is `none`
/// 4. Wait for Ctrl+C or for the listener to stop
/// 5. Shut down: drain requests, then stop the build server
///
/// # Errors
///
/// Returns errors for:
/// - Invalid configuration
/// - Build server or listener startup failures
pub async fn execute(args: DevArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = load_config(&cwd, &args)?;
    let server_config = ServerConfig::from_config(&config)?;

    let bundler: Arc<dyn Bundler> = Arc::new(EsbuildBundler::from_options(&config.bundler));
    let spinner = ui::Spinner::for_output(
        server_config.output,
        &format!("Starting {}...", config.bundler.command),
    );

    let server = match start_server(server_config, bundler).await {
        Ok(server) => server,
        Err(err) => {
            spinner.fail("Build server failed to start");
            error!("{}", err);
            debug!("{:?}", err);
            return Err(CliError::Startup(err));
        }
    };
    spinner.finish(&format!("{} ready", config.bundler.command));

    ui::server_ready(&server.server_url(), &server.upstream().to_string());

    if let Some(browser) = &server.config().open {
        open_browser(&server.server_url(), browser);
    }

    ui::info("Press Ctrl+C to stop");

    tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down development server...");
        }
        _ = server.closed() => {
            ui::warning("Server stopped unexpectedly");
        }
    }

    server.shutdown().await?;
    ui::success("Development server stopped");
    Ok(())
}

fn load_config(cwd: &Path, args: &DevArgs) -> Result<KilnConfig> {
    let mut discovery = ConfigDiscovery::new(cwd);
    if let Some(path) = &args.config {
        if !cwd.join(path).exists() {
            return Err(CliError::FileNotFound(path.clone()));
        }
        discovery = discovery.with_config_file(path);
    }

    let config = discovery.load_with(&args.overrides())?;
    debug!(
        mode = ?config.mode,
        root = %config.dev_options.root.display(),
        "configuration loaded"
    );
    Ok(config)
}

/// Open `url` in a browser.
///
/// `default` uses the platform opener:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
///
/// Any other value is run as the browser command.
fn open_browser(url: &str, browser: &str) {
    use std::process::Command;

    let result = match browser {
        "default" if cfg!(target_os = "macos") => Command::new("open").arg(url).spawn(),
        "default" if cfg!(target_os = "windows") => {
            Command::new("cmd").args(["/C", "start", url]).spawn()
        }
        "default" => Command::new("xdg-open").arg(url).spawn(),
        browser if cfg!(target_os = "macos") => {
            Command::new("open").args(["-a", browser, url]).spawn()
        }
        browser => Command::new(browser).arg(url).spawn(),
    };

    match result {
        Ok(_) => debug!("opened {} in {}", url, browser),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_explicit_config_file() {
        let dir = TempDir::new().unwrap();
        let args = DevArgs {
            config: Some(PathBuf::from("missing.toml")),
            ..Default::default()
        };

        let err = load_config(dir.path(), &args).unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("kiln.toml"),
            "[devOptions]\nport = 4000\nopen = \"firefox\"\n",
        )
        .unwrap();

        let args = DevArgs {
            port: Some(5000),
            ..Default::default()
        };
        let config = load_config(dir.path(), &args).unwrap();

        assert_eq!(config.dev_options.port, 5000);
        assert_eq!(config.dev_options.open, "firefox");
        assert_eq!(config.dev_options.root, dir.path().join("."));
    }
}
