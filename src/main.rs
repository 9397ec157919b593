//! Headless preview runner: launches a renderer for one file and logs what
//! the preview would show.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::Sender;

use ripple_lib::control::{CompileStatus, DocumentPosition, Outline};
use ripple_lib::data::{PageGeometry, RenderingKernel, ScrollOffset, Viewport};
use ripple_lib::jump::SourceSelection;
use ripple_lib::{LaunchRequest, PreviewConfig, PreviewHost, PreviewService};

#[derive(Debug, Parser)]
#[command(name = "ripple", about = "Run a live preview without an editor")]
struct Args {
    /// Document to preview.
    file: PathBuf,
    /// Project root; defaults to the file's directory.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Renderer executable, overriding the configured one.
    #[arg(long, value_name = "PROGRAM")]
    renderer: Option<String>,
}

struct LoggingHost {
    ended: Sender<PathBuf>,
}

impl PreviewHost for LoggingHost {
    fn on_compile_status(&self, document: &Path, status: CompileStatus) {
        tracing::info!(document = %document.display(), ?status, "Compile status");
    }

    fn on_outline(&self, document: &Path, outline: &Outline) {
        tracing::info!(document = %document.display(), entries = outline.items.len(), "Outline");
    }

    fn on_jump_to_source(&self, selection: &SourceSelection) {
        tracing::info!(
            path = %selection.path.display(),
            line = selection.start.line,
            character = selection.start.character,
            "Jump to source"
        );
    }

    fn show_error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn show_exit_error(&self, message: &str, log: &str) {
        tracing::error!("{}\n{}", message, log);
    }

    fn on_session_ended(&self, document: &Path) {
        let _ = self.ended.send(document.to_path_buf());
    }
}

/// Counts what it is fed instead of drawing.
#[derive(Default)]
struct HeadlessKernel {
    changesets: u64,
    bytes: usize,
}

impl RenderingKernel for HeadlessKernel {
    fn reset(&mut self) {
        tracing::debug!(changesets = self.changesets, bytes = self.bytes, "Kernel reset");
        self.changesets = 0;
        self.bytes = 0;
    }

    fn merge_changeset(&mut self, tag: &str, payload: &[u8]) {
        self.changesets += 1;
        self.bytes += payload.len();
        tracing::debug!(tag, bytes = payload.len(), "Changeset");
    }

    fn current_page(&self) -> usize {
        1
    }

    fn page_geometry(&self, _page: usize) -> Option<PageGeometry> {
        None
    }

    fn viewport(&self) -> Viewport {
        Viewport::default()
    }

    fn scroll_to(&mut self, offset: ScrollOffset) {
        tracing::debug!(left = offset.left, top = offset.top, "Scroll");
    }

    fn render_cursor(&mut self, cursor: Option<DocumentPosition>) {
        tracing::debug!(?cursor, "Cursor");
    }
}

fn main() -> ripple_lib::Result<()> {
    ripple_lib::init_logging();
    let args = Args::parse();

    let mut config = PreviewConfig::load();
    if let Some(program) = args.renderer {
        config.renderer.program = program;
    }

    let (ended, ended_rx) = crossbeam_channel::unbounded();
    let service = PreviewService::new(config, Arc::new(LoggingHost { ended }));

    let mut request = LaunchRequest::new(&args.file, Box::new(HeadlessKernel::default()));
    if let Some(root) = args.root {
        request = request.with_root(root);
    }
    let session = service.launch_preview(request)?;
    tracing::info!(
        static_port = session.static_port(),
        "Preview running at http://{}:{}/",
        service.config().renderer.host,
        session.static_port()
    );
    drop(session);

    let _ = ended_rx.recv();
    service.shutdown();
    Ok(())
}
