//! Interfaces the embedding editor implements.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::control::{CompileStatus, Outline};
use crate::jump::SourceSelection;

/// 0-based line and character in an editor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EditorPosition {
    pub line: usize,
    pub character: usize,
}

impl EditorPosition {
    pub const fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// What caused an editor selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChangeKind {
    Mouse,
    Keyboard,
    Command,
}

/// Editor-side callbacks for preview sessions.
///
/// Called from channel and watcher threads, never while a registry lock is
/// held. Implementations should hand work off instead of blocking.
pub trait PreviewHost: Send + Sync {
    fn on_compile_status(&self, _document: &Path, _status: CompileStatus) {}

    fn on_outline(&self, _document: &Path, _outline: &Outline) {}

    /// Open `selection.path`, select the range and center it.
    fn on_jump_to_source(&self, selection: &SourceSelection);

    /// Unsaved buffers keyed by absolute path.
    fn unsaved_files(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Active editor file and cursor, reported when a control plane opens.
    fn active_cursor(&self) -> Option<(PathBuf, EditorPosition)> {
        None
    }

    fn show_error(&self, message: &str);

    /// Abnormal renderer exit; `log` holds the renderer's recent output.
    fn show_exit_error(&self, message: &str, log: &str) {
        let _ = log;
        self.show_error(message);
    }

    /// The document no longer has a preview. Not called when a relaunch
    /// replaces the session.
    fn on_session_ended(&self, _document: &Path) {}
}

/// A UI surface showing one preview.
pub trait PreviewPanel: Send + Sync {
    /// Static asset port the panel should load the preview from.
    fn attach(&self, _static_port: u16) {}

    fn dispose(&self);
}
