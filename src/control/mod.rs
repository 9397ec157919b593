pub mod message;

pub use message::{
    parse_inbound, CompileStatus, ControlEvent, ControlRequest, DocumentPosition, Inbound,
    JumpInfo, Outline, OutlineItem,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tungstenite::Message;

use crate::error::{Error, Result};
use crate::ws::{self, ReadOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Receives control-plane lifecycle and inbound events on the channel's IO
/// thread. Implementations must not block for long.
pub trait ControlHandler: Send + Sync {
    /// Connection established (again, after a reconnect).
    fn on_open(&self, _tx: &ControlSender) {}

    fn on_event(&self, event: ControlEvent, tx: &ControlSender);

    /// The connection is gone for good and `close` was not the cause.
    fn on_lost(&self) {}
}

/// Cloneable handle for queueing outbound requests.
#[derive(Clone)]
pub struct ControlSender {
    tx: Sender<ControlRequest>,
    state: Arc<Mutex<ChannelState>>,
}

impl ControlSender {
    /// Queue a request. Fire-and-forget: there is no acknowledgement.
    pub fn send(&self, request: ControlRequest) -> Result<()> {
        if *self.state.lock() == ChannelState::Closed {
            return Err(Error::ChannelClosed);
        }
        self.tx.send(request).map_err(|_| Error::ChannelClosed)
    }
}

/// Persistent JSON message channel to the renderer's control plane.
///
/// Requests queued while `Connecting` are flushed once the socket opens.
pub struct ControlChannel {
    sender: ControlSender,
    state: Arc<Mutex<ChannelState>>,
    running: Arc<AtomicBool>,
    io_handle: Option<std::thread::JoinHandle<()>>,
}

impl ControlChannel {
    /// Start connecting to `url` on a dedicated IO thread.
    ///
    /// With `reconnect` set, an unexpected close is retried after that delay;
    /// otherwise the handler's `on_lost` fires and the channel stays closed.
    pub fn connect(
        url: String,
        reconnect: Option<Duration>,
        handler: Arc<dyn ControlHandler>,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<ControlRequest>();
        let state = Arc::new(Mutex::new(ChannelState::Connecting));
        let running = Arc::new(AtomicBool::new(true));
        let sender = ControlSender {
            tx,
            state: Arc::clone(&state),
        };

        let io_sender = sender.clone();
        let io_state = Arc::clone(&state);
        let io_running = Arc::clone(&running);

        let io_handle = std::thread::Builder::new()
            .name("control-plane".to_string())
            .spawn(move || {
                run_io(&url, reconnect, rx, &io_sender, &io_state, &io_running, &*handler);
            })
            .expect("Failed to spawn control-plane thread");

        Self {
            sender,
            state,
            running,
            io_handle: Some(io_handle),
        }
    }

    pub fn sender(&self) -> ControlSender {
        self.sender.clone()
    }

    pub fn send(&self, request: ControlRequest) -> Result<()> {
        self.sender.send(request)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Close the channel. No handler callbacks run afterwards.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        *self.state.lock() = ChannelState::Closed;
        if let Some(handle) = self.io_handle.take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_io(
    url: &str,
    reconnect: Option<Duration>,
    rx: Receiver<ControlRequest>,
    sender: &ControlSender,
    state: &Mutex<ChannelState>,
    running: &AtomicBool,
    handler: &dyn ControlHandler,
) {
    let is_running = || running.load(Ordering::Acquire);

    while is_running() {
        match ws::connect(url, is_running) {
            Ok(mut socket) => {
                {
                    let mut state = state.lock();
                    if !is_running() {
                        ws::close(&mut socket);
                        return;
                    }
                    *state = ChannelState::Open;
                }
                tracing::info!(url, "Control plane connected");
                handler.on_open(sender);

                serve(&mut socket, &rx, sender, running, handler);
                if !is_running() {
                    ws::close(&mut socket);
                    return;
                }
                tracing::warn!(url, "Control plane connection lost");
            }
            Err(e) => {
                tracing::warn!("Control plane connect failed: {}", e);
            }
        }

        let Some(delay) = reconnect else { break };
        *state.lock() = ChannelState::Connecting;
        if !ws::sleep_while(delay, is_running) {
            return;
        }
    }

    let mut state = state.lock();
    *state = ChannelState::Closed;
    if is_running() {
        drop(state);
        handler.on_lost();
    }
}

/// Pump one open connection until it drops or the channel is closed.
fn serve(
    socket: &mut ws::Socket,
    rx: &Receiver<ControlRequest>,
    sender: &ControlSender,
    running: &AtomicBool,
    handler: &dyn ControlHandler,
) {
    while running.load(Ordering::Acquire) {
        while let Ok(request) = rx.try_recv() {
            let text = match request.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(event = request.event_name(), "Failed to encode request: {}", e);
                    continue;
                }
            };
            tracing::trace!(event = request.event_name(), "Control plane send");
            if let Err(e) = socket.send(Message::text(text)) {
                tracing::warn!("Control plane send failed: {}", e);
                return;
            }
        }

        match ws::read(socket) {
            ReadOutcome::Message(Message::Text(text)) => dispatch(text.as_str(), sender, handler),
            ReadOutcome::Message(other) => {
                tracing::trace!("Ignoring non-text control message: {:?}", other);
            }
            ReadOutcome::Idle => {}
            ReadOutcome::Closed => return,
        }
    }
}

fn dispatch(text: &str, sender: &ControlSender, handler: &dyn ControlHandler) {
    match parse_inbound(text) {
        Ok(Inbound::Event(event)) => {
            tracing::debug!(?event, "Control plane event");
            handler.on_event(event, sender);
        }
        Ok(Inbound::Unknown(tag)) => {
            tracing::warn!(tag = %tag, "Ignoring control message with unknown tag");
        }
        Err(e) => {
            let preview: String = text.chars().take(200).collect();
            tracing::warn!("Malformed control message ({}): {}", e, preview);
        }
    }
}
