use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::control::{ChannelState, ControlChannel, ControlRequest};
use crate::data::{DataPlaneAdapter, DataRequest, DocumentView};
use crate::error::{Error, Result};
use crate::host::PreviewPanel;
use crate::renderer::{ExitReport, RendererLog, RendererProcess};

type Hook = Box<dyn FnOnce() + Send>;

/// Teardown hooks released together when a session ends.
#[derive(Default)]
pub struct Disposables {
    hooks: Mutex<Vec<Hook>>,
    released: AtomicBool,
}

impl Disposables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Runs immediately if the group was already released.
    pub fn push(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.hooks.lock();
            if !self.released.load(Ordering::Acquire) {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every hook once, most recent first.
    pub fn dispose_all(&self) {
        let hooks = {
            let mut hooks = self.hooks.lock();
            self.released.store(true, Ordering::Release);
            std::mem::take(&mut *hooks)
        };
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }
}

/// The live binding between one document and its renderer.
pub struct PreviewSession {
    id: Uuid,
    document: PathBuf,
    static_port: u16,
    created_at: SystemTime,
    control: Mutex<Option<ControlChannel>>,
    data: Mutex<Option<DataPlaneAdapter>>,
    process: Mutex<Option<RendererProcess>>,
    panel: Mutex<Option<Box<dyn PreviewPanel>>>,
    log: Option<RendererLog>,
    disposables: Disposables,
    disposed: AtomicBool,
}

impl PreviewSession {
    pub fn new(id: Uuid, document: PathBuf, static_port: u16) -> Self {
        Self {
            id,
            document,
            static_port,
            created_at: SystemTime::now(),
            control: Mutex::new(None),
            data: Mutex::new(None),
            process: Mutex::new(None),
            panel: Mutex::new(None),
            log: None,
            disposables: Disposables::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_control(self, control: ControlChannel) -> Self {
        *self.control.lock() = Some(control);
        self
    }

    pub fn with_data(self, data: DataPlaneAdapter) -> Self {
        *self.data.lock() = Some(data);
        self
    }

    pub fn with_process(mut self, process: RendererProcess) -> Self {
        self.log = Some(process.log().clone());
        *self.process.lock() = Some(process);
        self
    }

    pub fn with_panel(self, panel: Box<dyn PreviewPanel>) -> Self {
        panel.attach(self.static_port);
        *self.panel.lock() = Some(panel);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &Path {
        &self.document
    }

    pub fn static_port(&self) -> u16 {
        self.static_port
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn disposables(&self) -> &Disposables {
        &self.disposables
    }

    /// Renderer output captured so far, empty without a process.
    pub fn log_text(&self) -> String {
        self.log.as_ref().map(RendererLog::text).unwrap_or_default()
    }

    pub fn control_state(&self) -> ChannelState {
        self.control
            .lock()
            .as_ref()
            .map_or(ChannelState::Closed, ControlChannel::state)
    }

    pub fn send_control(&self, request: ControlRequest) -> Result<()> {
        match self.control.lock().as_ref() {
            Some(control) if !self.is_disposed() => control.send(request),
            _ => Err(Error::ChannelClosed),
        }
    }

    pub fn request_data(&self, request: DataRequest) -> Result<()> {
        match self.data.lock().as_ref() {
            Some(data) if !self.is_disposed() => data.request(request),
            _ => Err(Error::ChannelClosed),
        }
    }

    pub fn data_view(&self) -> Option<DocumentView> {
        self.data.lock().as_ref().map(DataPlaneAdapter::view)
    }

    pub fn is_process_running(&self) -> bool {
        self.process
            .lock()
            .as_ref()
            .is_some_and(RendererProcess::is_running)
    }

    /// Give the renderer up to `grace` to be seen as exited. `None` if it is
    /// still running, was killed, or the session no longer owns it.
    pub fn wait_renderer_exit(&self, grace: Duration) -> Option<ExitReport> {
        let deadline = Instant::now() + grace;
        loop {
            let report = self.process.lock().as_ref()?.try_exit_report();
            if report.is_some() || Instant::now() >= deadline {
                return report;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Tear everything down. Idempotent; safe to call from any of the
    /// session's own threads.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(session = %self.id, document = %self.document.display(), "Disposing preview session");

        self.disposables.dispose_all();

        // Take each part out before closing it so no lock is held across a
        // thread join. The process goes first: its sockets are what the IO
        // threads may be blocked on.
        let process = self.process.lock().take();
        if let Some(mut process) = process {
            process.kill();
        }
        let control = self.control.lock().take();
        if let Some(mut control) = control {
            control.close();
        }
        let data = self.data.lock().take();
        if let Some(mut data) = data {
            data.dispose();
        }
        let panel = self.panel.lock().take();
        if let Some(panel) = panel {
            panel.dispose();
        }
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PreviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("id", &self.id)
            .field("document", &self.document)
            .field("static_port", &self.static_port)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
