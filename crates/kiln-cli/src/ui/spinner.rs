//! Spinner for waiting on the build server.

use indicatif::{ProgressBar, ProgressStyle};
use kiln_config::OutputMode;
use owo_colors::OwoColorize;
use std::time::Duration;

/// Spinner for tasks without known duration.
///
/// In stream output the spinner is hidden and only the final message is
/// printed, so piped logs stay line-oriented.
///
/// ```no_run
/// use kiln_cli::ui::Spinner;
/// use kiln_config::OutputMode;
///
/// let spinner = Spinner::for_output(OutputMode::Dashboard, "Starting esbuild...");
/// // Do work...
/// spinner.finish("esbuild ready");
/// ```
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    /// Create and start a new spinner.
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["◐", "◓", "◑", "◒"]),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self { pb }
    }

    /// A spinner in dashboard mode, a hidden one otherwise.
    pub fn for_output(output: OutputMode, message: &str) -> Self {
        match output {
            OutputMode::Dashboard if !super::is_ci() => Self::new(message),
            _ => Self {
                pb: ProgressBar::hidden(),
            },
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.pb.is_hidden()
    }

    /// Finish spinner with success message.
    pub fn finish(&self, message: &str) {
        if self.is_hidden() {
            super::success(message);
            return;
        }
        self.pb
            .finish_with_message(format!("{} {}", "✓".green(), message));
    }

    /// Finish spinner with error message.
    pub fn fail(&self, message: &str) {
        if self.is_hidden() {
            super::error(message);
            return;
        }
        self.pb
            .finish_with_message(format!("{} {}", "✗".red(), message));
    }
}
