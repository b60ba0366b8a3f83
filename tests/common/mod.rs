//! Common test helpers for lock and CLI tests.

#![allow(dead_code)] // Functions used across different test binaries

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Create a temp directory and the path of a (not yet created) lock file in it
pub fn scratch_lock(name: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

/// Write a `.flockwait.toml` with a fast progress interval into `dir`
pub fn write_fast_config(dir: &Path) {
    std::fs::write(
        dir.join(".flockwait.toml"),
        "[waiter]\ninterval_ms = 50\n",
    )
    .expect("failed to write config");
}

/// Build a flockwait command running in `dir` with colors off
pub fn flockwait_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_flockwait"));
    cmd.current_dir(dir).env("NO_COLOR", "1").env_remove("FLOCKWAIT_LOG");
    cmd
}

/// Run flockwait to completion and capture output
pub fn run_flockwait(dir: &Path, args: &[&str]) -> Output {
    flockwait_cmd(dir)
        .args(args)
        .output()
        .expect("failed to run flockwait")
}

/// A `flockwait hold` process that has reported holding its lock
pub struct Holder {
    child: Child,
    _stdout: BufReader<ChildStdout>,
}

impl Holder {
    /// Spawn `flockwait hold <args>` and wait until it prints its readiness line
    pub fn spawn(dir: &Path, args: &[&str]) -> Holder {
        let mut child = flockwait_cmd(dir)
            .arg("hold")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start lock holder");

        let mut stdout = BufReader::new(child.stdout.take().expect("holder stdout"));
        let mut line = String::new();
        stdout.read_line(&mut line).expect("failed to read holder output");
        assert!(line.starts_with("locked "), "unexpected holder output: {line:?}");

        Holder {
            child,
            _stdout: stdout,
        }
    }

    /// Close stdin so the holder releases, and wait for it to exit
    pub fn release(mut self) {
        drop(self.child.stdin.take());
        let status = self.child.wait().expect("failed to wait for holder");
        assert!(status.success(), "holder exited with {status}");
    }
}

impl Drop for Holder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// In-memory writer shared between a waiter thread and the test
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Poll until `needle` shows up or `timeout` passes
    pub fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.contents().contains(needle) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        self.contents().contains(needle)
    }
}

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
