//! Blocking WebSocket helpers shared by both channels.
//!
//! Each channel owns its socket on a single IO thread. Reads use a short
//! socket timeout so the same thread can interleave queued writes and
//! observe its run flag.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::{Error, Result};

pub type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Read timeout of the IO loop; bounds outbound latency and shutdown delay.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound for the TCP connect and for the WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A peer that stops reading for this long counts as gone.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn loopback_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}/")
}

/// Open a client connection and prepare it for polling.
///
/// No step blocks longer than [`CONNECT_TIMEOUT`], and the handshake gives up
/// early once `keep_going` turns false.
pub fn connect(url: &str, keep_going: impl Fn() -> bool) -> Result<Socket> {
    let request = url
        .into_client_request()
        .map_err(|e| Error::connect(url, e))?;
    let uri = request.uri();
    let host = uri.host().unwrap_or("127.0.0.1").to_string();
    let port = uri.port_u16().unwrap_or(80);

    let stream = open_stream(&host, port).map_err(|e| Error::connect(url, e.into()))?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let _ = stream.set_nodelay(true);

    let started = Instant::now();
    let mut attempt = tungstenite::client(request, MaybeTlsStream::Plain(stream));
    loop {
        match attempt {
            Ok((socket, _response)) => return Ok(socket),
            Err(HandshakeError::Failure(e)) => return Err(Error::connect(url, e)),
            Err(HandshakeError::Interrupted(mid)) => {
                if !keep_going() || started.elapsed() >= CONNECT_TIMEOUT {
                    let timed_out = std::io::Error::new(ErrorKind::TimedOut, "handshake timed out");
                    return Err(Error::connect(url, timed_out.into()));
                }
                attempt = mid.handshake();
            }
        }
    }
}

fn open_stream(host: &str, port: u16) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no address for host")))
}

pub enum ReadOutcome {
    Message(Message),
    /// Nothing arrived within the poll interval.
    Idle,
    /// The peer closed the connection or the transport failed.
    Closed,
}

pub fn read(socket: &mut Socket) -> ReadOutcome {
    match socket.read() {
        Ok(Message::Close(frame)) => {
            tracing::debug!(?frame, "WebSocket close frame received");
            ReadOutcome::Closed
        }
        Ok(message) => ReadOutcome::Message(message),
        Err(tungstenite::Error::Io(err))
            if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            ReadOutcome::Idle
        }
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
            ReadOutcome::Closed
        }
        Err(e) => {
            tracing::debug!("WebSocket read failed: {}", e);
            ReadOutcome::Closed
        }
    }
}

/// Best-effort close handshake.
pub fn close(socket: &mut Socket) {
    let _ = socket.close(None);
    let _ = socket.flush();
}

/// Sleep for `total`, waking early when `keep_going` turns false.
/// Returns whether the caller should continue.
pub fn sleep_while(total: Duration, keep_going: impl Fn() -> bool) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !keep_going() {
            return false;
        }
        let step = remaining.min(POLL_INTERVAL);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    keep_going()
}
