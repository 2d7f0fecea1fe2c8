//! Terminal UI utilities for status output.
//!
//! Handles environment detection (CI, TTY) and degrades gracefully when
//! terminal features aren't available.
//!
//! # Examples
//!
//! ```no_run
//! use kiln_cli::ui;
//!
//! // Pass `true` for --no-color
//! ui::init_colors(false);
//!
//! let spinner = ui::Spinner::new("Starting build server...");
//! spinner.finish("Build server ready");
//!
//! ui::success("Dev server running");
//! ui::error("Failed to bind port 8080");
//! ```

mod messages;
mod spinner;

pub use messages::{error, info, server_ready, success, warning};
pub use spinner::Spinner;

/// Check if running in a CI environment.
///
/// Detects common CI environment variables from GitHub Actions, GitLab CI,
/// CircleCI, and Travis CI.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "TRAVIS"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Check if color output should be enabled.
///
/// Respects NO_COLOR and FORCE_COLOR environment variables, falls back to
/// terminal capability detection.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }

    console::user_attended_stderr()
}

/// Initialize color support based on environment.
///
/// `no_color` from the command line wins over the environment.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && should_use_color();
    owo_colors::set_override(enabled);
    console::set_colors_enabled_stderr(enabled);
}
