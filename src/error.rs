use thiserror::Error;

/// Errors surfaced by the preview engine.
///
/// Only launch and exit failures are meant to reach the user; everything else
/// is logged where the malformed input was received.
#[derive(Debug, Error)]
pub enum Error {
    /// The renderer process could not be started.
    #[error("failed to start renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Endpoint discovery did not finish before the caller's deadline.
    #[error("renderer did not report its endpoints within {0:?}")]
    StartupTimeout(std::time::Duration),

    /// The renderer exited before it finished starting up.
    #[error("renderer exited during startup (code {code:?})")]
    RendererExited { code: Option<i32> },

    /// WebSocket handshake or transport failure.
    #[error("websocket error on {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    /// The channel was already closed when a send was attempted.
    #[error("channel closed")]
    ChannelClosed,

    /// No preview session is bound to the requested document.
    #[error("no preview session for {0}")]
    NoSession(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or written.
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn connect(url: &str, source: tungstenite::Error) -> Self {
        Self::Connect {
            url: url.to_string(),
            source: Box::new(source),
        }
    }
}
