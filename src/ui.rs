//! Terminal output with colors.
//!
//! All status output goes to stderr so stdout stays free for the wrapped
//! command. Colors auto-disable when stderr is not a TTY or `NO_COLOR` is set.

use owo_colors::OwoColorize;
use std::fmt::Display;
use std::path::Path;

/// Check if stderr supports colors (TTY detection)
pub fn use_colors() -> bool {
    supports_color::on(supports_color::Stream::Stderr).is_some()
}

/// Format a file path (cyan)
pub fn path_str(p: &Path, colors: bool) -> String {
    if colors {
        format!("{}", p.display().cyan())
    } else {
        format!("{}", p.display())
    }
}

/// Format a success message (green checkmark prefix)
pub fn success(msg: impl Display) {
    if use_colors() {
        eprintln!("{} {}", "✓".green(), msg);
    } else {
        eprintln!("✓ {}", msg);
    }
}

/// Format a lock released message
pub fn released(path: &Path) {
    let colors = use_colors();
    if colors {
        eprintln!("{} {}", "Released".green(), path_str(path, colors));
    } else {
        eprintln!("Released {}", path_str(path, colors));
    }
}

/// Format a "lock is held elsewhere" message
pub fn held(path: &Path, mode: &str) {
    let colors = use_colors();
    if colors {
        eprintln!(
            "{} {} lock on {} is held by another process",
            "Busy:".yellow().bold(),
            mode,
            path_str(path, colors)
        );
    } else {
        eprintln!(
            "Busy: {} lock on {} is held by another process",
            mode,
            path_str(path, colors)
        );
    }
}

/// Format a fatal error
pub fn error(msg: impl Display) {
    if use_colors() {
        eprintln!("{}: {}", "error".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}
