use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use super::discovery::RendererEndpoints;
use super::reader::RendererLog;
use crate::error::{Error, Result};

/// Shared child handle so both the exit watcher and `kill` can reach it.
pub type SharedChild = Arc<Mutex<Child>>;

const EXIT_POLL: Duration = Duration::from_millis(50);

/// How a renderer process ended on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub pid: u32,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitReport {
    pub fn is_failure(&self) -> bool {
        self.code != Some(0)
    }
}

/// A live renderer process owned by exactly one preview session.
pub struct RendererProcess {
    child: SharedChild,
    pid: u32,
    /// Cleared by `kill` and by the exit watcher.
    running: Arc<AtomicBool>,
    /// Set once `kill` has run; the watcher clearing `running` does not count.
    killed: bool,
    log: RendererLog,
    endpoint_rx: Receiver<RendererEndpoints>,
    endpoints: Option<RendererEndpoints>,
    exit_handle: Option<std::thread::JoinHandle<()>>,
}

impl RendererProcess {
    pub(crate) fn new(
        child: Child,
        pid: u32,
        log: RendererLog,
        endpoint_rx: Receiver<RendererEndpoints>,
    ) -> Self {
        Self {
            child: Arc::new(Mutex::new(child)),
            pid,
            running: Arc::new(AtomicBool::new(true)),
            killed: false,
            log,
            endpoint_rx,
            endpoints: None,
            exit_handle: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn log(&self) -> &RendererLog {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Block until endpoint discovery resolves or `timeout` passes.
    pub fn wait_endpoints(&mut self, timeout: Duration) -> Result<RendererEndpoints> {
        if let Some(endpoints) = self.endpoints {
            return Ok(endpoints);
        }
        match self.endpoint_rx.recv_timeout(timeout) {
            Ok(endpoints) => {
                self.endpoints = Some(endpoints);
                Ok(endpoints)
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::StartupTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                // Both output streams closed without announcing all servers.
                let code = self
                    .child
                    .lock()
                    .try_wait()
                    .ok()
                    .flatten()
                    .and_then(|status| status.code());
                Err(Error::RendererExited { code })
            }
        }
    }

    /// How the process ended, if it already has. `None` while it runs and
    /// after an intentional [`kill`](Self::kill).
    pub fn try_exit_report(&self) -> Option<ExitReport> {
        if self.killed {
            return None;
        }
        match self.child.lock().try_wait() {
            Ok(Some(status)) => Some(ExitReport {
                pid: self.pid,
                code: status.code(),
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(pid = self.pid, "Failed to poll renderer status: {}", e);
                None
            }
        }
    }

    pub fn endpoints(&self) -> Option<RendererEndpoints> {
        self.endpoints
    }

    /// Spawn the exit-watcher thread.
    pub(crate) fn watch_exit(&mut self, on_exit: Box<dyn FnOnce(ExitReport) + Send>) {
        let child = Arc::clone(&self.child);
        let running = Arc::clone(&self.running);
        let pid = self.pid;

        let handle = std::thread::Builder::new()
            .name(format!("renderer-exit-{pid}"))
            .spawn(move || {
                let report = loop {
                    if !running.load(Ordering::Acquire) {
                        // Killed on purpose; the killer owns teardown.
                        return;
                    }
                    match child.lock().try_wait() {
                        Ok(Some(status)) => {
                            break ExitReport {
                                pid,
                                code: status.code(),
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(pid, "Failed to poll renderer status: {}", e);
                            break ExitReport { pid, code: None };
                        }
                    }
                    std::thread::sleep(EXIT_POLL);
                };

                // Lost the race against `kill`: teardown is already underway.
                if !running.swap(false, Ordering::AcqRel) {
                    return;
                }
                if report.is_failure() {
                    tracing::warn!(pid, code = ?report.code, "Renderer exited abnormally");
                } else {
                    tracing::info!(pid, "Renderer exited");
                }
                on_exit(report);
            })
            .expect("Failed to spawn renderer exit watcher thread");

        self.exit_handle = Some(handle);
    }

    /// Terminate the process. Suppresses the exit callback.
    pub fn kill(&mut self) {
        self.killed = true;
        let was_running = self.running.swap(false, Ordering::AcqRel);
        {
            let mut child = self.child.lock();
            if was_running {
                if let Err(e) = child.kill() {
                    tracing::debug!(pid = self.pid, "Renderer kill: {}", e);
                }
            }
            let _ = child.wait();
        }

        if let Some(handle) = self.exit_handle.take() {
            // Teardown may be driven from the watcher's own callback.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for RendererProcess {
    fn drop(&mut self) {
        self.kill();
    }
}
