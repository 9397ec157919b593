use serde_json::Value;

use crate::control::DocumentPosition;

/// Page bounding box relative to the viewport, in view pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Where a page sits in the view and how large it is in document units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub rect: PageRect,
    pub page_width: f64,
    pub page_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Absolute scroll position of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOffset {
    pub left: f64,
    pub top: f64,
}

/// The rendering kernel and the surface it draws on.
///
/// Changesets are opaque: the adapter never looks inside them, it only
/// guarantees they arrive in order and that a `reset` precedes the full
/// frame sent after every (re)connect.
pub trait RenderingKernel: Send {
    /// Drop all visual state ahead of a full frame.
    fn reset(&mut self);

    /// Apply one incremental (or full) changeset.
    fn merge_changeset(&mut self, tag: &str, payload: &[u8]);

    fn set_partial_rendering(&mut self, _enabled: bool) {}

    fn set_invert_colors(&mut self, _mode: &str) {}

    /// 1-based page currently shown; 0 when nothing is rendered yet.
    fn current_page(&self) -> usize;

    fn page_geometry(&self, page: usize) -> Option<PageGeometry>;

    fn viewport(&self) -> Viewport;

    fn scroll_to(&mut self, offset: ScrollOffset);

    /// The visible region should be re-evaluated (e.g. lazy page rendering).
    fn viewport_changed(&mut self) {}

    /// Draw or hide the cursor indicator.
    fn render_cursor(&mut self, _cursor: Option<DocumentPosition>) {}

    fn render_cursor_paths(&mut self, _paths: &Value) {}
}
