use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Preview configuration, loaded from ~/.config/ripple/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewConfig {
    pub renderer: RendererConfig,
    pub scroll_sync: ScrollSyncMode,
    /// Report the editor cursor to the renderer so it can draw an indicator.
    pub cursor_indicator: bool,
    pub startup_timeout_ms: u64,
    /// Quiet period after which buffered data-plane frames are drained.
    pub debounce_ms: u64,
    pub reconnect: ReconnectConfig,
    /// Number of renderer output lines retained for "reveal logs".
    pub log_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    pub program: String,
    /// Arguments placed before the computed renderer flags (e.g. a subcommand).
    pub leading_args: Vec<String>,
    /// Bind host for all three servers; ports are always assigned dynamically.
    pub host: String,
    pub font_paths: Vec<PathBuf>,
    pub ignore_system_fonts: bool,
    pub partial_rendering: bool,
    pub invert_colors: String,
    pub preview_mode: PreviewMode,
    pub inputs: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    #[default]
    Doc,
    Slide,
}

impl PreviewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PreviewMode::Doc => "doc",
            PreviewMode::Slide => "slide",
        }
    }
}

/// Which editor selection changes produce outbound scroll reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollSyncMode {
    Never,
    #[default]
    OnSelectionChangeByMouse,
    OnSelectionChange,
}

/// What happens when the control-plane socket drops while the renderer lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlPlaneLoss {
    #[default]
    TearDown,
    Reconnect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectConfig {
    pub data_plane_delay_ms: u64,
    pub control_plane: ControlPlaneLoss,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::default(),
            scroll_sync: ScrollSyncMode::default(),
            cursor_indicator: true,
            startup_timeout_ms: 30_000,
            debounce_ms: 16,
            reconnect: ReconnectConfig::default(),
            log_lines: 2_000,
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "tinymist".to_string(),
            leading_args: vec!["preview".to_string()],
            host: "127.0.0.1".to_string(),
            font_paths: Vec::new(),
            ignore_system_fonts: false,
            partial_rendering: false,
            invert_colors: "never".to_string(),
            preview_mode: PreviewMode::Doc,
            inputs: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            data_plane_delay_ms: 1_000,
            control_plane: ControlPlaneLoss::TearDown,
        }
    }
}

impl PreviewConfig {
    /// Load config from the standard config path, falling back to defaults.
    pub fn load() -> Self {
        let path = config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard config path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn data_plane_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.data_plane_delay_ms)
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("ripple")
        .join("config.json")
}
