//! Extract dynamically bound ports from renderer startup diagnostics.
//!
//! The renderer prints one line per server once it has bound:
//!
//! ```text
//! Control plane server listening on: 127.0.0.1:41231
//! Data plane server listening on: 127.0.0.1:41233
//! Static file server listening on: 127.0.0.1:41235
//! ```
//!
//! Lines may carry a log prefix (timestamp, level, module); only the text
//! right before ` server listening on:` decides the role.

use crossbeam_channel::Sender;

const MARKER: &str = " server listening on:";

/// Which server a diagnostic line announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    ControlPlane,
    DataPlane,
    StaticFile,
}

/// Ports of one renderer process. Immutable once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererEndpoints {
    pub control_plane: u16,
    pub data_plane: u16,
    pub static_file: u16,
}

/// Parse a single output line into a `(role, port)` pair.
pub fn parse_listening_line(line: &str) -> Option<(EndpointRole, u16)> {
    let idx = line.find(MARKER)?;
    let role_part = line[..idx].trim_end().to_ascii_lowercase();
    let role = if role_part.ends_with("control plane") {
        EndpointRole::ControlPlane
    } else if role_part.ends_with("data plane") {
        EndpointRole::DataPlane
    } else if role_part.ends_with("static file") {
        EndpointRole::StaticFile
    } else {
        return None;
    };

    // Format: <host>:<port>, host may itself contain colons (IPv6).
    let addr = line[idx + MARKER.len()..].trim();
    let (_, port) = addr.rsplit_once(':')?;
    let port = port.trim_end_matches('/').parse::<u16>().ok()?;
    Some((role, port))
}

/// Accumulates ports from output lines and resolves exactly once.
///
/// A repeated line for a role overwrites the captured port. Resolution
/// happens the first time all three roles are known and is never repeated;
/// there is no timeout here, the caller waits with its own deadline.
pub struct EndpointDiscovery {
    control_plane: Option<u16>,
    data_plane: Option<u16>,
    static_file: Option<u16>,
    resolved: Option<RendererEndpoints>,
    notify: Option<Sender<RendererEndpoints>>,
}

impl EndpointDiscovery {
    pub fn new(notify: Option<Sender<RendererEndpoints>>) -> Self {
        Self {
            control_plane: None,
            data_plane: None,
            static_file: None,
            resolved: None,
            notify,
        }
    }

    /// Feed one line. Returns the endpoints on the call that completes them.
    pub fn feed_line(&mut self, line: &str) -> Option<RendererEndpoints> {
        let (role, port) = parse_listening_line(line)?;
        tracing::debug!(?role, port, "Renderer endpoint announced");
        match role {
            EndpointRole::ControlPlane => self.control_plane = Some(port),
            EndpointRole::DataPlane => self.data_plane = Some(port),
            EndpointRole::StaticFile => self.static_file = Some(port),
        }

        if self.resolved.is_some() {
            return None;
        }

        let endpoints = RendererEndpoints {
            control_plane: self.control_plane?,
            data_plane: self.data_plane?,
            static_file: self.static_file?,
        };
        self.resolved = Some(endpoints);
        if let Some(tx) = self.notify.take() {
            let _ = tx.send(endpoints);
        }
        Some(endpoints)
    }

    /// Endpoints as first resolved, if discovery has completed.
    pub fn resolved(&self) -> Option<RendererEndpoints> {
        self.resolved
    }

    /// Latest announced port for a role, including post-resolution updates.
    pub fn latest(&self, role: EndpointRole) -> Option<u16> {
        match role {
            EndpointRole::ControlPlane => self.control_plane,
            EndpointRole::DataPlane => self.data_plane,
            EndpointRole::StaticFile => self.static_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_lines() {
        assert_eq!(
            parse_listening_line("Control plane server listening on: 127.0.0.1:4001"),
            Some((EndpointRole::ControlPlane, 4001))
        );
        assert_eq!(
            parse_listening_line("Data plane server listening on: 127.0.0.1:4002"),
            Some((EndpointRole::DataPlane, 4002))
        );
        assert_eq!(
            parse_listening_line("Static file server listening on: 127.0.0.1:4003"),
            Some((EndpointRole::StaticFile, 4003))
        );
    }

    #[test]
    fn parse_line_with_log_prefix() {
        let line = "[2024-05-01T10:00:00Z INFO  typst_preview] Data plane server listening on: 127.0.0.1:23625";
        assert_eq!(
            parse_listening_line(line),
            Some((EndpointRole::DataPlane, 23625))
        );
    }

    #[test]
    fn parse_ipv6_host() {
        assert_eq!(
            parse_listening_line("Static file server listening on: [::1]:8080"),
            Some((EndpointRole::StaticFile, 8080))
        );
    }

    #[test]
    fn parse_rejects_unrelated_lines() {
        assert_eq!(parse_listening_line("compiling main.typ"), None);
        assert_eq!(parse_listening_line("Debug server listening on: 127.0.0.1:1"), None);
        assert_eq!(
            parse_listening_line("Control plane server listening on: 127.0.0.1:notaport"),
            None
        );
    }

    #[test]
    fn resolves_once_all_three_roles_are_known() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut discovery = EndpointDiscovery::new(Some(tx));

        assert!(discovery
            .feed_line("Control plane server listening on: 127.0.0.1:1")
            .is_none());
        assert!(discovery.feed_line("unrelated output").is_none());
        assert!(discovery
            .feed_line("Data plane server listening on: 127.0.0.1:2")
            .is_none());
        assert!(rx.try_recv().is_err());

        let endpoints = discovery
            .feed_line("Static file server listening on: 127.0.0.1:3")
            .expect("third role completes discovery");
        assert_eq!(
            endpoints,
            RendererEndpoints {
                control_plane: 1,
                data_plane: 2,
                static_file: 3
            }
        );
        assert_eq!(rx.try_recv().ok(), Some(endpoints));
    }

    #[test]
    fn duplicate_role_line_overwrites_before_resolution() {
        let mut discovery = EndpointDiscovery::new(None);
        discovery.feed_line("Control plane server listening on: 127.0.0.1:10");
        discovery.feed_line("Control plane server listening on: 127.0.0.1:11");
        discovery.feed_line("Data plane server listening on: 127.0.0.1:20");
        let endpoints = discovery
            .feed_line("Static file server listening on: 127.0.0.1:30")
            .unwrap();
        assert_eq!(endpoints.control_plane, 11);
    }

    #[test]
    fn duplicate_after_resolution_does_not_resolve_again() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut discovery = EndpointDiscovery::new(Some(tx));
        discovery.feed_line("Control plane server listening on: 127.0.0.1:10");
        discovery.feed_line("Data plane server listening on: 127.0.0.1:20");
        discovery.feed_line("Static file server listening on: 127.0.0.1:30");

        assert!(discovery
            .feed_line("Data plane server listening on: 127.0.0.1:21")
            .is_none());
        assert_eq!(discovery.latest(EndpointRole::DataPlane), Some(21));
        assert_eq!(discovery.resolved().map(|e| e.data_plane), Some(20));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn never_resolves_without_all_roles() {
        let mut discovery = EndpointDiscovery::new(None);
        for _ in 0..3 {
            assert!(discovery
                .feed_line("Control plane server listening on: 127.0.0.1:10")
                .is_none());
        }
        assert!(discovery.resolved().is_none());
    }
}
