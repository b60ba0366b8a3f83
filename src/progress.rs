//! Waiter that reports lock contention on a terminal line.

use crate::flock::LockTarget;
use crate::ui;
use crate::waiter::{Cancellation, Waiter};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// How often the waiting line is redrawn.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Erase the current terminal line and return to column 0.
const CLEAR_LINE: &str = "\x1b[2K\r";

/// Rewrites `Waiting for filesystem lock on <path> (<elapsed>)` once per
/// interval, then prints an acquired line when cancelled.
///
/// Write errors are ignored; this only reports, it never affects the lock.
pub struct ProgressWaiter<W = io::Stderr> {
    out: W,
    interval: Duration,
    colors: bool,
}

impl ProgressWaiter<io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            out: io::stderr(),
            interval: DEFAULT_INTERVAL,
            colors: ui::use_colors(),
        }
    }
}

impl<W: Write + Send + 'static> ProgressWaiter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            interval: DEFAULT_INTERVAL,
            colors: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }
}

impl<W: Write + Send + 'static> Waiter for ProgressWaiter<W> {
    fn wait(mut self, cancel: Cancellation, target: LockTarget) {
        let start = Instant::now();
        let path = ui::path_str(target.path(), self.colors);

        while !cancel.wait_timeout(self.interval) {
            let _ = write!(
                self.out,
                "{CLEAR_LINE}Waiting for filesystem lock on {} ({})",
                path,
                format_elapsed(start.elapsed())
            );
            let _ = self.out.flush();
        }

        let _ = writeln!(self.out, "{CLEAR_LINE}Acquired filesystem lock on {}", path);
        let _ = self.out.flush();
    }
}

/// Render a duration rounded to whole seconds, e.g. `5s`, `1m5s`, `1h2m3s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = (elapsed.as_millis() + 500) / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
