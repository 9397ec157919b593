//! Editor-facing entry points: launching previews and routing editor events
//! to them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use uuid::Uuid;

use crate::config::{ControlPlaneLoss, PreviewConfig, ScrollSyncMode};
use crate::control::{
    ControlChannel, ControlEvent, ControlHandler, ControlRequest, ControlSender, DocumentPosition,
    Outline,
};
use crate::data::{
    DataPlaneAdapter, DataPlaneListener, DataPlaneOptions, DataRequest, RenderingKernel,
};
use crate::error::{Error, Result};
use crate::host::{EditorPosition, PreviewHost, PreviewPanel, SelectionChangeKind};
use crate::jump;
use crate::registry::TaskRegistry;
use crate::renderer::{ExitReport, LaunchCommand, RendererLauncher};
use crate::session::PreviewSession;
use crate::ws;

/// How long a lost control plane waits to see whether the renderer died.
const EXIT_GRACE: Duration = Duration::from_millis(250);

/// What to preview and where to draw it.
pub struct LaunchRequest {
    pub document: PathBuf,
    /// Project root passed to the renderer; defaults to the document's
    /// directory.
    pub root: PathBuf,
    pub kernel: Box<dyn RenderingKernel>,
    pub panel: Option<Box<dyn PreviewPanel>>,
}

impl LaunchRequest {
    pub fn new(document: impl Into<PathBuf>, kernel: Box<dyn RenderingKernel>) -> Self {
        let document = document.into();
        let root = document
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            document,
            root,
            kernel,
            panel: None,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_panel(mut self, panel: Box<dyn PreviewPanel>) -> Self {
        self.panel = Some(panel);
        self
    }
}

struct ServiceInner {
    config: PreviewConfig,
    registry: TaskRegistry,
    host: Arc<dyn PreviewHost>,
}

/// Owns the task registry and drives every preview session.
#[derive(Clone)]
pub struct PreviewService {
    inner: Arc<ServiceInner>,
}

impl PreviewService {
    pub fn new(config: PreviewConfig, host: Arc<dyn PreviewHost>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                registry: TaskRegistry::new(),
                host,
            }),
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Start a renderer for `request.document`, connect both planes and
    /// register the session, replacing any previous preview of the document.
    ///
    /// Blocks until the renderer announces its servers or the startup
    /// timeout passes. Launch failures are shown through the host and
    /// returned.
    pub fn launch_preview(&self, request: LaunchRequest) -> Result<Arc<PreviewSession>> {
        let LaunchRequest {
            document,
            root,
            kernel,
            panel,
        } = request;
        let inner = &self.inner;
        let config = &inner.config;
        let id = Uuid::new_v4();

        let command = LaunchCommand::for_preview(&config.renderer, &root, &document, config.log_lines);
        let on_exit = {
            let weak = Arc::downgrade(&self.inner);
            let document = document.clone();
            Box::new(move |report: ExitReport| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_exit(&document, id, report);
                }
            })
        };

        let mut process = RendererLauncher::launch(&command, on_exit).map_err(|e| {
            inner.host.show_error(&format!("Failed to start the preview renderer: {e}"));
            e
        })?;

        let endpoints = match process.wait_endpoints(config.startup_timeout()) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                let message = format!("Preview renderer did not start: {e}");
                match &e {
                    Error::RendererExited { .. } => {
                        inner.host.show_exit_error(&message, &process.log().text())
                    }
                    _ => inner.host.show_error(&message),
                }
                process.kill();
                return Err(e);
            }
        };
        tracing::info!(
            session = %id,
            control = endpoints.control_plane,
            data = endpoints.data_plane,
            static_file = endpoints.static_file,
            "Renderer endpoints discovered"
        );

        let host = &config.renderer.host;
        let reconnect = match config.reconnect.control_plane {
            ControlPlaneLoss::TearDown => None,
            ControlPlaneLoss::Reconnect => Some(config.data_plane_reconnect_delay()),
        };
        let listener = Arc::new(SessionListener {
            service: Arc::downgrade(&self.inner),
            document: document.clone(),
            id,
        });

        let control = ControlChannel::connect(
            ws::loopback_url(host, endpoints.control_plane),
            reconnect,
            Arc::clone(&listener) as Arc<dyn ControlHandler>,
        );
        let data = DataPlaneAdapter::start(
            ws::loopback_url(host, endpoints.data_plane),
            kernel,
            DataPlaneOptions::from_config(config),
            listener,
        );

        let mut session = PreviewSession::new(id, document.clone(), endpoints.static_file)
            .with_process(process)
            .with_control(control)
            .with_data(data);
        if let Some(panel) = panel {
            session = session.with_panel(panel);
        }
        let session = Arc::new(session);
        inner.registry.register(Arc::clone(&session));

        // An exit between discovery and registration found nothing to clean up.
        if !session.is_process_running() && !session.is_disposed() {
            inner.registry.unregister_session(&document, id);
            let log = session.log_text();
            session.dispose();
            let e = Error::RendererExited { code: None };
            inner
                .host
                .show_exit_error(&format!("Preview renderer exited during startup: {e}"), &log);
            return Err(e);
        }

        tracing::info!(session = %id, document = %document.display(), "Preview launched");
        Ok(session)
    }

    /// Ask the preview to scroll to the rendering of a source position.
    /// Returns whether a session received it.
    pub fn report_position(&self, path: &Path, position: EditorPosition) -> bool {
        self.route(path, || ControlRequest::PanelScrollTo {
            filepath: path.display().to_string(),
            line: position.line,
            character: position.character,
        })
    }

    /// Send an explicit request to the preview of `document`. Unlike editor
    /// events, this does not fall back to a sole session.
    pub fn send_doc_request(&self, document: &Path, request: ControlRequest) -> Result<()> {
        let session = self
            .inner
            .registry
            .get(document)
            .ok_or_else(|| Error::NoSession(document.display().to_string()))?;
        session.send_control(request)
    }

    /// Scroll the preview of `document` to a page position.
    pub fn scroll_preview_to(&self, document: &Path, position: DocumentPosition) -> Result<()> {
        self.send_doc_request(document, ControlRequest::PanelScrollByPosition { position })
    }

    /// A rendered element was clicked; the renderer answers with an
    /// `editorScrollTo` event.
    pub fn resolve_span(&self, document: &Path, span: &str) -> Result<()> {
        self.data_request(document, DataRequest::SourceLocation(span.to_string()))
    }

    /// Sync the outline highlight of `document` to a page position.
    pub fn sync_outline(&self, document: &Path, position: DocumentPosition) -> Result<()> {
        self.data_request(document, DataRequest::OutlineSync(position))
    }

    /// Tear down the preview of `document`. Returns whether one existed.
    pub fn dispose_preview(&self, document: &Path) -> bool {
        match self.inner.registry.unregister(document) {
            Some(session) => {
                session.dispose();
                self.inner.host.on_session_ended(document);
                true
            }
            None => false,
        }
    }

    /// Route an editor selection change. The cursor indicator follows every
    /// change; scrolling follows the configured sync mode.
    pub fn on_selection_changed(
        &self,
        path: &Path,
        position: EditorPosition,
        kind: SelectionChangeKind,
    ) -> bool {
        let config = &self.inner.config;
        let Some(session) = self.inner.registry.resolve(path) else {
            tracing::trace!(path = %path.display(), "No preview for selection change");
            return false;
        };

        let filepath = path.display().to_string();
        let mut sent = false;
        if config.cursor_indicator {
            sent |= send_logged(
                &session,
                ControlRequest::ChangeCursorPosition {
                    filepath: filepath.clone(),
                    line: position.line,
                    character: position.character,
                },
            );
        }

        let scroll = match config.scroll_sync {
            ScrollSyncMode::Never => false,
            ScrollSyncMode::OnSelectionChangeByMouse => kind == SelectionChangeKind::Mouse,
            ScrollSyncMode::OnSelectionChange => true,
        };
        if scroll {
            sent |= send_logged(
                &session,
                ControlRequest::PanelScrollTo {
                    filepath,
                    line: position.line,
                    character: position.character,
                },
            );
        }
        sent
    }

    /// Push an unsaved buffer to the renderer.
    pub fn on_document_changed(&self, path: &Path, content: String) -> bool {
        self.route(path, || ControlRequest::UpdateMemoryFiles {
            files: BTreeMap::from([(path.display().to_string(), content)]),
        })
    }

    /// The buffer was closed or saved; the renderer should read it from disk.
    pub fn on_document_closed(&self, path: &Path) -> bool {
        self.route(path, || ControlRequest::RemoveMemoryFiles {
            files: vec![path.display().to_string()],
        })
    }

    /// Dispose every session.
    pub fn shutdown(&self) {
        let sessions = self.inner.registry.drain();
        tracing::info!(count = sessions.len(), "Shutting down previews");
        for session in sessions {
            session.dispose();
            self.inner.host.on_session_ended(session.document());
        }
    }

    fn route(&self, path: &Path, request: impl FnOnce() -> ControlRequest) -> bool {
        match self.inner.registry.resolve(path) {
            Some(session) => send_logged(&session, request()),
            None => {
                tracing::trace!(path = %path.display(), "No preview to route to");
                false
            }
        }
    }

    fn data_request(&self, document: &Path, request: DataRequest) -> Result<()> {
        let session = self
            .inner
            .registry
            .get(document)
            .ok_or_else(|| Error::NoSession(document.display().to_string()))?;
        session.request_data(request)
    }
}

fn send_logged(session: &PreviewSession, request: ControlRequest) -> bool {
    let event = request.event_name();
    match session.send_control(request) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(session = %session.id(), event, "Dropped control request: {}", e);
            false
        }
    }
}

impl ServiceInner {
    fn handle_exit(&self, document: &Path, id: Uuid, report: ExitReport) {
        let Some(session) = self.registry.unregister_session(document, id) else {
            return;
        };
        let log = session.log_text();
        session.dispose();
        if report.is_failure() {
            let code = report
                .code
                .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
            self.host.show_exit_error(
                &format!("Preview renderer for {} exited with {code}", document.display()),
                &log,
            );
        }
        self.host.on_session_ended(document);
    }

    /// Control plane gone for good with the tear-down policy.
    ///
    /// A crashing renderer drops its sockets before the exit watcher notices,
    /// so look for an exit first and report it as one.
    fn handle_control_lost(&self, document: &Path, id: Uuid) {
        let exit = self
            .registry
            .get(document)
            .filter(|session| session.id() == id)
            .and_then(|session| session.wait_renderer_exit(EXIT_GRACE));
        if let Some(report) = exit {
            self.handle_exit(document, id, report);
            return;
        }
        if let Some(session) = self.registry.unregister_session(document, id) {
            tracing::warn!(session = %id, "Control plane lost, tearing down preview");
            session.dispose();
            self.host.on_session_ended(document);
        }
    }
}

/// Per-session glue between the two planes and the host.
struct SessionListener {
    service: Weak<ServiceInner>,
    document: PathBuf,
    id: Uuid,
}

impl ControlHandler for SessionListener {
    fn on_open(&self, tx: &ControlSender) {
        let Some(service) = self.service.upgrade() else {
            return;
        };
        if !service.config.cursor_indicator {
            return;
        }
        if let Some((path, position)) = service.host.active_cursor() {
            let _ = tx.send(ControlRequest::ChangeCursorPosition {
                filepath: path.display().to_string(),
                line: position.line,
                character: position.character,
            });
        }
    }

    fn on_event(&self, event: ControlEvent, tx: &ControlSender) {
        let Some(service) = self.service.upgrade() else {
            return;
        };
        match event {
            ControlEvent::EditorScrollTo(info) => match jump::resolve_jump(&info) {
                Some(selection) => service.host.on_jump_to_source(&selection),
                None => tracing::debug!(file = %info.filepath, "Jump without source range"),
            },
            ControlEvent::SyncEditorChanges => {
                let files = service.host.unsaved_files();
                tracing::debug!(count = files.len(), "Syncing unsaved files");
                let _ = tx.send(ControlRequest::SyncMemoryFiles { files });
            }
            ControlEvent::CompileStatus { kind } => {
                service.host.on_compile_status(&self.document, kind);
            }
            ControlEvent::Outline(outline) => service.host.on_outline(&self.document, &outline),
        }
    }

    fn on_lost(&self) {
        if let Some(service) = self.service.upgrade() {
            service.handle_control_lost(&self.document, self.id);
        }
    }
}

impl DataPlaneListener for SessionListener {
    fn on_connect(&self) {
        tracing::debug!(session = %self.id, "Data plane requested full frame");
    }

    fn on_outline(&self, outline: Outline) {
        if let Some(service) = self.service.upgrade() {
            service.host.on_outline(&self.document, &outline);
        }
    }
}
