#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tungstenite::{Message, WebSocket};

use ripple_lib::control::{CompileStatus, DocumentPosition, Outline};
use ripple_lib::data::{PageGeometry, PageRect, RenderingKernel, ScrollOffset, Viewport};
use ripple_lib::jump::SourceSelection;
use ripple_lib::{EditorPosition, PreviewHost};

pub type ServerSocket = WebSocket<TcpStream>;

/// Loopback WebSocket server; every accepted connection runs `handler` on
/// its own thread with its 0-based connection index.
pub struct MockServer {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(usize, ServerSocket) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("mock server addr").port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let counter = Arc::clone(&accepted);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                std::thread::spawn(move || {
                    if let Ok(socket) = tungstenite::accept(stream) {
                        handler(index, socket);
                    }
                });
            }
        });

        Self { port, accepted }
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

pub enum Poll {
    Text(String),
    Idle,
    Closed,
}

pub fn set_poll_timeout(socket: &mut ServerSocket) {
    socket
        .get_mut()
        .set_read_timeout(Some(Duration::from_millis(20)))
        .expect("set read timeout");
}

/// One read attempt; binary and control frames count as idle.
pub fn poll(socket: &mut ServerSocket) -> Poll {
    match socket.read() {
        Ok(Message::Text(text)) => Poll::Text(text.as_str().to_string()),
        Ok(Message::Close(_)) => Poll::Closed,
        Ok(_) => Poll::Idle,
        Err(tungstenite::Error::Io(err))
            if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            Poll::Idle
        }
        Err(_) => Poll::Closed,
    }
}

/// Block until a text message arrives; `None` once the peer is gone.
pub fn read_text(socket: &mut ServerSocket) -> Option<String> {
    loop {
        match poll(socket) {
            Poll::Text(text) => return Some(text),
            Poll::Idle => continue,
            Poll::Closed => return None,
        }
    }
}

pub fn send_binary(socket: &mut ServerSocket, frame: &[u8]) {
    socket
        .send(Message::binary(frame.to_vec()))
        .expect("send binary frame");
}

pub fn send_json(socket: &mut ServerSocket, value: serde_json::Value) {
    socket
        .send(Message::text(value.to_string()))
        .expect("send text frame");
}

/// Close from the server side and collect whatever the client still sends.
pub fn close_and_drain(socket: &mut ServerSocket) -> Vec<String> {
    let _ = socket.close(None);
    let mut rest = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        match poll(socket) {
            Poll::Text(text) => rest.push(text),
            Poll::Idle => {}
            Poll::Closed => break,
        }
    }
    rest
}

/// Keep reading until the client disconnects, recording text messages.
pub fn drain_until_closed(socket: &mut ServerSocket, sink: &Mutex<Vec<String>>) {
    while let Some(text) = read_text(socket) {
        sink.lock().push(text);
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Kernel that records every call; pages are stacked vertically, 1000px
/// each, filling a 1000x1000 viewport.
pub struct RecordingKernel {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub current_page: usize,
}

impl RecordingKernel {
    pub fn new(current_page: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: Arc::clone(&calls),
                current_page,
            },
            calls,
        )
    }
}

impl RenderingKernel for RecordingKernel {
    fn reset(&mut self) {
        self.calls.lock().push("reset".to_string());
    }

    fn merge_changeset(&mut self, tag: &str, payload: &[u8]) {
        self.calls
            .lock()
            .push(format!("{tag}:{}", String::from_utf8_lossy(payload)));
    }

    fn current_page(&self) -> usize {
        self.current_page
    }

    fn page_geometry(&self, page: usize) -> Option<PageGeometry> {
        Some(PageGeometry {
            rect: PageRect {
                left: 0.0,
                top: (page as f64 - 1.0) * 1000.0,
                width: 1000.0,
                height: 1000.0,
            },
            page_width: 1000.0,
            page_height: 1000.0,
        })
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 1000.0,
            height: 1000.0,
        }
    }

    fn scroll_to(&mut self, offset: ScrollOffset) {
        self.calls
            .lock()
            .push(format!("scroll:{}:{}", offset.left, offset.top));
    }

    fn render_cursor(&mut self, cursor: Option<DocumentPosition>) {
        self.calls
            .lock()
            .push(format!("cursor:{:?}", cursor.map(|c| c.page_no)));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    CompileStatus(CompileStatus),
    Outline(usize),
    Jump(SourceSelection),
    Error(String),
    ExitError { message: String, log: String },
    Ended(PathBuf),
}

#[derive(Default)]
pub struct RecordingHost {
    pub events: Mutex<Vec<HostEvent>>,
    pub unsaved: BTreeMap<String, String>,
    pub cursor: Option<(PathBuf, EditorPosition)>,
}

impl RecordingHost {
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn jumps(&self) -> Vec<SourceSelection> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Jump(selection) => Some(selection),
                _ => None,
            })
            .collect()
    }

    pub fn has(&self, predicate: impl Fn(&HostEvent) -> bool) -> bool {
        self.events.lock().iter().any(predicate)
    }
}

impl PreviewHost for RecordingHost {
    fn on_compile_status(&self, _document: &Path, status: CompileStatus) {
        self.events.lock().push(HostEvent::CompileStatus(status));
    }

    fn on_outline(&self, _document: &Path, outline: &Outline) {
        self.events.lock().push(HostEvent::Outline(outline.items.len()));
    }

    fn on_jump_to_source(&self, selection: &SourceSelection) {
        self.events.lock().push(HostEvent::Jump(selection.clone()));
    }

    fn unsaved_files(&self) -> BTreeMap<String, String> {
        self.unsaved.clone()
    }

    fn active_cursor(&self) -> Option<(PathBuf, EditorPosition)> {
        self.cursor.clone()
    }

    fn show_error(&self, message: &str) {
        self.events.lock().push(HostEvent::Error(message.to_string()));
    }

    fn show_exit_error(&self, message: &str, log: &str) {
        self.events.lock().push(HostEvent::ExitError {
            message: message.to_string(),
            log: log.to_string(),
        });
    }

    fn on_session_ended(&self, document: &Path) {
        self.events.lock().push(HostEvent::Ended(document.to_path_buf()));
    }
}

fn announce(control: u16, data: u16, static_file: u16) -> String {
    format!(
        "echo 'Control plane server listening on: 127.0.0.1:{control}' >&2; \
         echo 'Data plane server listening on: 127.0.0.1:{data}' >&2; \
         echo 'Static file server listening on: 127.0.0.1:{static_file}' >&2"
    )
}

/// Shell script that announces the given ports the way the renderer does,
/// then runs `tail`.
pub fn fake_renderer_script(control: u16, data: u16, static_file: u16, tail: &str) -> String {
    format!("{}; {tail}", announce(control, data, static_file))
}

/// Like [`fake_renderer_script`], but picks the ports by the suffix of the
/// entry file, which the renderer receives as its last argument.
pub fn routing_renderer_script(routes: &[(&str, u16, u16)], static_file: u16) -> String {
    let mut script = String::from("eval \"entry=\\${$#}\"; case \"$entry\" in ");
    for (suffix, control, data) in routes {
        script.push_str(&format!("*{suffix}) {} ;; ", announce(*control, *data, static_file)));
    }
    script.push_str("esac; exec sleep 30");
    script
}
