//! Control-plane wire types. Every message is one JSON object tagged by
//! its `event` field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A point on a rendered page. Pages are 1-based, coordinates in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentPosition {
    pub page_no: usize,
    pub x: f32,
    pub y: f32,
}

/// Render-to-source jump target. A missing `start` or `end` means the
/// rendered element has no source span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpInfo {
    pub filepath: String,
    /// `[line, column]`, both 0-based.
    pub start: Option<(usize, usize)>,
    pub end: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompileStatus {
    Compiling,
    CompileSuccess,
    CompileError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub items: Vec<OutlineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub title: String,
    /// Span id in hex format.
    #[serde(default)]
    pub span: Option<String>,
    #[serde(default)]
    pub position: Option<DocumentPosition>,
    #[serde(default)]
    pub children: Vec<OutlineItem>,
}

/// Editor → renderer messages. Fire-and-forget: nothing is acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControlRequest {
    /// Cursor moved; drives the rendered cursor indicator.
    ChangeCursorPosition {
        filepath: String,
        line: usize,
        character: usize,
    },
    /// Scroll the preview to the rendering of a source position.
    PanelScrollTo {
        filepath: String,
        line: usize,
        character: usize,
    },
    /// Scroll the preview to a page position (e.g. an outline entry).
    PanelScrollByPosition { position: DocumentPosition },
    /// Resolve a rendered span back to source.
    SourceScrollBySpan { span: String },
    /// Full set of unsaved buffers; replaces every previous memory file.
    SyncMemoryFiles { files: BTreeMap<String, String> },
    UpdateMemoryFiles { files: BTreeMap<String, String> },
    RemoveMemoryFiles { files: Vec<String> },
}

impl ControlRequest {
    pub fn event_name(&self) -> &'static str {
        match self {
            ControlRequest::ChangeCursorPosition { .. } => "changeCursorPosition",
            ControlRequest::PanelScrollTo { .. } => "panelScrollTo",
            ControlRequest::PanelScrollByPosition { .. } => "panelScrollByPosition",
            ControlRequest::SourceScrollBySpan { .. } => "sourceScrollBySpan",
            ControlRequest::SyncMemoryFiles { .. } => "syncMemoryFiles",
            ControlRequest::UpdateMemoryFiles { .. } => "updateMemoryFiles",
            ControlRequest::RemoveMemoryFiles { .. } => "removeMemoryFiles",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Renderer → editor messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControlEvent {
    EditorScrollTo(JumpInfo),
    /// The renderer asks for a full `syncMemoryFiles` batch.
    SyncEditorChanges,
    CompileStatus { kind: CompileStatus },
    Outline(Outline),
}

impl ControlEvent {
    const TAGS: [&'static str; 4] = ["editorScrollTo", "syncEditorChanges", "compileStatus", "outline"];
}

/// Result of decoding one inbound text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ControlEvent),
    /// A well-formed message with a tag this client does not know.
    Unknown(String),
}

/// Decode an inbound message. Unknown tags are not errors; malformed JSON or
/// a known tag with a bad payload is.
pub fn parse_inbound(text: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !ControlEvent::TAGS.contains(&tag.as_str()) {
        return Ok(Inbound::Unknown(tag));
    }
    Ok(Inbound::Event(serde_json::from_value(value)?))
}
