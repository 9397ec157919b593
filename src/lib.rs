pub mod config;
pub mod control;
pub mod data;
pub mod error;
pub mod host;
pub mod jump;
pub mod preview;
pub mod registry;
pub mod renderer;
pub mod session;
mod ws;

pub use config::PreviewConfig;
pub use error::{Error, Result};
pub use host::{EditorPosition, PreviewHost, PreviewPanel, SelectionChangeKind};
pub use preview::{LaunchRequest, PreviewService};
pub use registry::TaskRegistry;
pub use session::PreviewSession;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple=info,ripple_lib=info".into()),
        )
        .try_init();
}
