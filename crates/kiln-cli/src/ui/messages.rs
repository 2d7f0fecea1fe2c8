//! Status message functions for terminal output.

use owo_colors::{OwoColorize, Stream::Stderr, Style};
use std::fmt::Display;

/// Apply `style` when stderr supports color.
fn paint<T: Display>(text: T, style: Style) -> String {
    text.if_supports_color(Stderr, |t| t.style(style)).to_string()
}

/// Print a success message to stderr.
///
/// ```no_run
/// use kiln_cli::ui::success;
///
/// success("Dev server stopped");
/// ```
pub fn success(message: &str) {
    eprintln!("{} {}", paint("✓", Style::new().green().bold()), message);
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", paint("ℹ", Style::new().blue().bold()), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    eprintln!(
        "{} {}",
        paint("⚠", Style::new().yellow().bold()),
        paint(message, Style::new().yellow())
    );
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        paint("✗", Style::new().red().bold()),
        paint(message, Style::new().red())
    );
}

/// Print the addresses of a freshly started server.
pub fn server_ready(url: &str, upstream: &str) {
    eprintln!();
    eprintln!(
        "  {} {}",
        paint("Local:", Style::new().bold()),
        paint(url, Style::new().cyan())
    );
    eprintln!(
        "  {} {}",
        paint("Build server:", Style::new().dimmed()),
        paint(upstream, Style::new().dimmed())
    );
    eprintln!();
}
