//! Data-plane frame decoding.
//!
//! A frame is `<ascii-tag>,<payload>`. Known tags carry small text payloads;
//! any other tag is an opaque changeset for the rendering kernel.

use serde_json::Value;
use thiserror::Error;

use crate::control::{DocumentPosition, Outline};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame tag is not valid UTF-8")]
    InvalidTag,
    #[error("invalid position list: {0}")]
    InvalidPositions(String),
    #[error("invalid {tag} payload: {message}")]
    InvalidPayload { tag: &'static str, message: String },
}

/// One decoded data-plane frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderFrame {
    /// Source → render jump candidates.
    Jump(Vec<DocumentPosition>),
    /// Scroll request candidates (e.g. from an outline click).
    Viewport(Vec<DocumentPosition>),
    /// Cursor indicator position; `None` hides it.
    Cursor(Option<DocumentPosition>),
    CursorPaths(Value),
    PartialRendering(bool),
    InvertColors(String),
    Outline(Outline),
    /// Incremental patch for the kernel, tag preserved.
    Changeset { tag: String, payload: Vec<u8> },
}

impl RenderFrame {
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let (tag, payload) = match data.iter().position(|&b| b == b',') {
            Some(idx) => (&data[..idx], &data[idx + 1..]),
            None => (data, &[][..]),
        };
        let tag = std::str::from_utf8(tag).map_err(|_| FrameError::InvalidTag)?;

        let frame = match tag {
            "jump" => RenderFrame::Jump(parse_positions(text(payload, "jump")?)?),
            "viewport" => RenderFrame::Viewport(parse_positions(text(payload, "viewport")?)?),
            "cursor" => {
                let mut positions = parse_positions(text(payload, "cursor")?)?;
                RenderFrame::Cursor(if positions.is_empty() {
                    None
                } else {
                    Some(positions.swap_remove(0))
                })
            }
            "cursor-paths" => RenderFrame::CursorPaths(json(payload, "cursor-paths")?),
            "partial-rendering" => {
                RenderFrame::PartialRendering(text(payload, "partial-rendering")?.trim() == "true")
            }
            "invert-colors" => {
                RenderFrame::InvertColors(text(payload, "invert-colors")?.trim().to_string())
            }
            "outline" => RenderFrame::Outline(json(payload, "outline")?),
            other => RenderFrame::Changeset {
                tag: other.to_string(),
                payload: payload.to_vec(),
            },
        };
        Ok(frame)
    }

    pub fn tag(&self) -> &str {
        match self {
            RenderFrame::Jump(_) => "jump",
            RenderFrame::Viewport(_) => "viewport",
            RenderFrame::Cursor(_) => "cursor",
            RenderFrame::CursorPaths(_) => "cursor-paths",
            RenderFrame::PartialRendering(_) => "partial-rendering",
            RenderFrame::InvertColors(_) => "invert-colors",
            RenderFrame::Outline(_) => "outline",
            RenderFrame::Changeset { tag, .. } => tag,
        }
    }
}

fn text<'a>(payload: &'a [u8], tag: &'static str) -> Result<&'a str, FrameError> {
    std::str::from_utf8(payload).map_err(|e| FrameError::InvalidPayload {
        tag,
        message: e.to_string(),
    })
}

fn json<T: serde::de::DeserializeOwned>(payload: &[u8], tag: &'static str) -> Result<T, FrameError> {
    serde_json::from_slice(payload).map_err(|e| FrameError::InvalidPayload {
        tag,
        message: e.to_string(),
    })
}

/// Parse `page x y` triples separated by commas and/or whitespace.
pub fn parse_positions(input: &str) -> Result<Vec<DocumentPosition>, FrameError> {
    let tokens: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() % 3 != 0 {
        return Err(FrameError::InvalidPositions(input.to_string()));
    }

    tokens
        .chunks(3)
        .map(|triple| {
            let invalid = || FrameError::InvalidPositions(input.to_string());
            Ok(DocumentPosition {
                page_no: triple[0].parse::<usize>().map_err(|_| invalid())?,
                x: triple[1].parse::<f32>().map_err(|_| invalid())?,
                y: triple[2].parse::<f32>().map_err(|_| invalid())?,
            })
        })
        .collect()
}

/// Outbound text requests on the data plane.
#[derive(Debug, Clone, PartialEq)]
pub enum DataRequest {
    /// Ask for a full frame of the latest state.
    Current,
    /// A rendered element was clicked; resolve its span to source.
    SourceLocation(String),
    OutlineSync(DocumentPosition),
    /// Element path for cursor-path resolution, as JSON.
    SourcePath(Value),
}

impl DataRequest {
    pub fn to_text(&self) -> String {
        match self {
            DataRequest::Current => "current".to_string(),
            DataRequest::SourceLocation(span) => format!("srclocation {span}"),
            DataRequest::OutlineSync(pos) => {
                format!("outline-sync,{} {} {}", pos.page_no, pos.x, pos.y)
            }
            DataRequest::SourcePath(path) => format!("srcpath {path}"),
        }
    }
}
