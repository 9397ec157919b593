pub mod frame;
pub mod kernel;

pub use frame::{DataRequest, FrameError, RenderFrame};
pub use kernel::{PageGeometry, PageRect, RenderingKernel, ScrollOffset, Viewport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tungstenite::Message;

use crate::config::PreviewConfig;
use crate::control::{DocumentPosition, Outline};
use crate::error::{Error, Result};
use crate::jump;
use crate::ws::{self, ReadOutcome};

/// A batch is flushed after this many debounce windows even if frames keep
/// arriving.
const MAX_BATCH_WINDOWS: u32 = 8;

/// Data-plane notifications that leave the rendering surface.
pub trait DataPlaneListener: Send + Sync {
    /// A (re)connection was established and a full frame requested.
    fn on_connect(&self) {}

    fn on_outline(&self, _outline: Outline) {}
}

/// Listener that ignores everything.
pub struct NoListener;

impl DataPlaneListener for NoListener {}

#[derive(Debug, Clone, Copy)]
pub struct DataPlaneOptions {
    pub reconnect_delay: Duration,
    pub debounce: Duration,
}

impl DataPlaneOptions {
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            reconnect_delay: config.data_plane_reconnect_delay(),
            debounce: config.debounce(),
        }
    }
}

impl Default for DataPlaneOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            debounce: Duration::from_millis(16),
        }
    }
}

/// View state that lives next to the kernel and is not part of the
/// rendered document itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentView {
    pub partial_rendering: bool,
    pub invert_colors: Option<String>,
    pub cursor: Option<DocumentPosition>,
    pub cursor_paths: Option<Value>,
    /// Number of kernel resets, one per established connection.
    pub resets: u64,
    pub changesets_applied: u64,
    pub last_scroll: Option<ScrollOffset>,
}

struct ViewState {
    kernel: Box<dyn RenderingKernel>,
    view: DocumentView,
}

enum PumpItem {
    Reset,
    Frame(RenderFrame),
}

/// Feeds one rendering kernel from the renderer's binary frame stream.
///
/// Two threads: the IO thread owns the socket and reconnects with a fixed
/// delay until disposed; the pump thread batches frames over the debounce
/// window and applies them to the kernel in arrival order.
pub struct DataPlaneAdapter {
    requests: Sender<DataRequest>,
    state: Arc<Mutex<ViewState>>,
    disposed: Arc<AtomicBool>,
    io_handle: Option<std::thread::JoinHandle<()>>,
    pump_handle: Option<std::thread::JoinHandle<()>>,
}

impl DataPlaneAdapter {
    pub fn start(
        url: String,
        kernel: Box<dyn RenderingKernel>,
        options: DataPlaneOptions,
        listener: Arc<dyn DataPlaneListener>,
    ) -> Self {
        let (requests, requests_rx) = crossbeam_channel::unbounded::<DataRequest>();
        let (items_tx, items_rx) = crossbeam_channel::unbounded::<PumpItem>();
        let state = Arc::new(Mutex::new(ViewState {
            kernel,
            view: DocumentView::default(),
        }));
        let disposed = Arc::new(AtomicBool::new(false));

        let io_disposed = Arc::clone(&disposed);
        let io_listener = Arc::clone(&listener);
        let io_handle = std::thread::Builder::new()
            .name("data-plane".to_string())
            .spawn(move || {
                run_io(
                    &url,
                    options.reconnect_delay,
                    &requests_rx,
                    &items_tx,
                    &io_disposed,
                    &*io_listener,
                );
            })
            .expect("Failed to spawn data-plane thread");

        let pump_state = Arc::clone(&state);
        let pump_disposed = Arc::clone(&disposed);
        let pump_handle = std::thread::Builder::new()
            .name("data-render".to_string())
            .spawn(move || {
                run_pump(
                    &items_rx,
                    options.debounce,
                    &pump_state,
                    &pump_disposed,
                    &*listener,
                );
            })
            .expect("Failed to spawn data-render thread");

        Self {
            requests,
            state,
            disposed,
            io_handle: Some(io_handle),
            pump_handle: Some(pump_handle),
        }
    }

    /// Queue a text request. Requests made while disconnected are sent after
    /// the next connection's full-frame request.
    pub fn request(&self, request: DataRequest) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::ChannelClosed);
        }
        self.requests.send(request).map_err(|_| Error::ChannelClosed)
    }

    pub fn view(&self) -> DocumentView {
        self.state.lock().view.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop both threads. Pending frames and reconnect timers are dropped.
    pub fn dispose(&mut self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let current = std::thread::current().id();
        for handle in [self.io_handle.take(), self.pump_handle.take()].into_iter().flatten() {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        tracing::debug!("Data plane adapter disposed");
    }
}

impl Drop for DataPlaneAdapter {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run_io(
    url: &str,
    reconnect_delay: Duration,
    requests: &Receiver<DataRequest>,
    items: &Sender<PumpItem>,
    disposed: &AtomicBool,
    listener: &dyn DataPlaneListener,
) {
    let live = || !disposed.load(Ordering::Acquire);

    while live() {
        match ws::connect(url, live) {
            Ok(mut socket) => {
                if !live() {
                    ws::close(&mut socket);
                    return;
                }
                tracing::info!(url, "Data plane connected");

                // The reset must precede every frame of this connection.
                if items.send(PumpItem::Reset).is_err() {
                    return;
                }
                match socket.send(Message::text(DataRequest::Current.to_text())) {
                    Ok(()) => {
                        listener.on_connect();
                        serve(&mut socket, requests, items, disposed);
                    }
                    Err(e) => tracing::warn!("Failed to request full frame: {}", e),
                }

                if !live() {
                    ws::close(&mut socket);
                    return;
                }
                tracing::warn!(url, "Data plane connection lost, retrying in {:?}", reconnect_delay);
            }
            Err(e) => {
                tracing::debug!("Data plane connect failed: {}", e);
            }
        }

        if !ws::sleep_while(reconnect_delay, live) {
            return;
        }
    }
}

fn serve(
    socket: &mut ws::Socket,
    requests: &Receiver<DataRequest>,
    items: &Sender<PumpItem>,
    disposed: &AtomicBool,
) {
    while !disposed.load(Ordering::Acquire) {
        while let Ok(request) = requests.try_recv() {
            if let Err(e) = socket.send(Message::text(request.to_text())) {
                tracing::warn!("Data plane send failed: {}", e);
                return;
            }
        }

        let data = match ws::read(socket) {
            ReadOutcome::Message(Message::Binary(data)) => data.to_vec(),
            ReadOutcome::Message(Message::Text(text)) => {
                // The renderer only sends text to complain about our requests.
                tracing::warn!("Data plane renderer message: {}", text.as_str());
                continue;
            }
            ReadOutcome::Message(_) | ReadOutcome::Idle => continue,
            ReadOutcome::Closed => return,
        };

        match RenderFrame::parse(&data) {
            Ok(frame) => {
                tracing::trace!(tag = frame.tag(), bytes = data.len(), "Data plane frame");
                if items.send(PumpItem::Frame(frame)).is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!("Dropping malformed data-plane frame: {}", e),
        }
    }
}

fn run_pump(
    items: &Receiver<PumpItem>,
    debounce: Duration,
    state: &Mutex<ViewState>,
    disposed: &AtomicBool,
    listener: &dyn DataPlaneListener,
) {
    let max_window = debounce * MAX_BATCH_WINDOWS;

    while let Ok(first) = items.recv() {
        let mut batch = vec![first];
        let opened = Instant::now();
        while opened.elapsed() < max_window {
            match items.recv_timeout(debounce) {
                Ok(item) => batch.push(item),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if disposed.load(Ordering::Acquire) {
            return;
        }

        let outlines = {
            let mut state = state.lock();
            apply_batch(&mut state, batch)
        };
        for outline in outlines {
            listener.on_outline(outline);
        }
    }
}

/// Apply a batch in order; returns outlines to surface once the view lock is
/// released.
fn apply_batch(state: &mut ViewState, batch: Vec<PumpItem>) -> Vec<Outline> {
    let ViewState { kernel, view } = state;
    let mut outlines = Vec::new();

    for item in batch {
        let frame = match item {
            PumpItem::Reset => {
                kernel.reset();
                view.cursor = None;
                view.cursor_paths = None;
                view.resets += 1;
                continue;
            }
            PumpItem::Frame(frame) => frame,
        };

        match frame {
            RenderFrame::Jump(candidates) | RenderFrame::Viewport(candidates) => {
                if let Some(offset) = scroll_to_nearest(kernel.as_mut(), &candidates) {
                    view.last_scroll = Some(offset);
                }
            }
            RenderFrame::Cursor(cursor) => {
                view.cursor = cursor;
                kernel.render_cursor(cursor);
                kernel.viewport_changed();
            }
            RenderFrame::CursorPaths(paths) => {
                kernel.render_cursor_paths(&paths);
                view.cursor_paths = Some(paths);
            }
            RenderFrame::PartialRendering(enabled) => {
                kernel.set_partial_rendering(enabled);
                view.partial_rendering = enabled;
            }
            RenderFrame::InvertColors(mode) => {
                kernel.set_invert_colors(&mode);
                view.invert_colors = Some(mode);
            }
            RenderFrame::Outline(outline) => outlines.push(outline),
            RenderFrame::Changeset { tag, payload } => {
                kernel.merge_changeset(&tag, &payload);
                view.changesets_applied += 1;
            }
        }
    }
    outlines
}

fn scroll_to_nearest(
    kernel: &mut dyn RenderingKernel,
    candidates: &[DocumentPosition],
) -> Option<ScrollOffset> {
    let target = jump::nearest_candidate(kernel.current_page(), candidates)?;
    let Some(geometry) = kernel.page_geometry(target.page_no) else {
        tracing::debug!(page = target.page_no, "Jump target page is not rendered");
        return None;
    };
    let offset = jump::scroll_target(target, &geometry, &kernel.viewport());
    kernel.scroll_to(offset);
    Some(offset)
}
