use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

use parking_lot::Mutex;

use super::discovery::EndpointDiscovery;

/// Bounded ring of recent renderer output, kept for "reveal logs".
#[derive(Clone)]
pub struct RendererLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl RendererLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn text(&self) -> String {
        self.lines().join("\n")
    }
}

/// Spawn a thread that reads one output stream line by line, mirrors each
/// line to `tracing` and the log ring, and feeds endpoint discovery.
///
/// The thread ends at EOF. It is never joined: a grandchild holding the pipe
/// open must not block session teardown.
pub fn spawn_output_reader<R: Read + Send + 'static>(
    stream: R,
    stream_name: &'static str,
    pid: u32,
    discovery: Arc<Mutex<EndpointDiscovery>>,
    log: RendererLog,
) {
    let spawned = std::thread::Builder::new()
        .name(format!("renderer-{stream_name}-{pid}"))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::with_capacity(256);
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        tracing::debug!(pid, stream = stream_name, "Renderer output EOF");
                        break;
                    }
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']);
                        if line.is_empty() {
                            continue;
                        }
                        tracing::info!(target: "ripple::renderer", pid, "{}", line);
                        if let Some(endpoints) = discovery.lock().feed_line(line) {
                            tracing::info!(
                                pid,
                                control_plane = endpoints.control_plane,
                                data_plane = endpoints.data_plane,
                                static_file = endpoints.static_file,
                                "Renderer endpoints discovered"
                            );
                        }
                        log.push(line.to_string());
                    }
                    Err(e) => {
                        tracing::warn!(pid, stream = stream_name, "Renderer output read error: {}", e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        tracing::error!(pid, stream = stream_name, "Failed to spawn renderer output reader: {}", e);
    }
}
