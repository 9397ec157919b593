//! Cross-jump: mapping between rendered page coordinates and source
//! positions.
//!
//! Source → render goes through the renderer: the editor reports a position
//! on the control plane and the renderer answers with `jump` candidates on the
//! data plane. This module picks among those candidates and turns the winner
//! into a scroll offset. Render → source arrives as a [`JumpInfo`] and is
//! turned into an editor selection.

use std::path::PathBuf;

use crate::control::{DocumentPosition, JumpInfo};
use crate::data::kernel::{PageGeometry, ScrollOffset, Viewport};
use crate::host::EditorPosition;

/// Horizontal margin kept left of the target, as a share of viewport width.
pub const MARGIN_X_RATIO: f64 = 0.07;
/// Vertical margin kept above the target, as a share of viewport height.
pub const MARGIN_Y_RATIO: f64 = 0.382;

/// Page width shares bounding the dual-column layout band.
const DUAL_COLUMN_MIN: f64 = 0.5;
const DUAL_COLUMN_MAX: f64 = 0.9;

/// Choose the candidate whose page is numerically closest to `current_page`.
/// Ties go to the earliest candidate in list order.
pub fn nearest_candidate(
    current_page: usize,
    candidates: &[DocumentPosition],
) -> Option<DocumentPosition> {
    let mut best: Option<(usize, DocumentPosition)> = None;
    for candidate in candidates {
        let distance = candidate.page_no.abs_diff(current_page);
        match best {
            Some((best_distance, _)) if distance >= best_distance => {}
            _ => best = Some((distance, *candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// Scroll offset that brings `position` into view on its page.
///
/// The target is shifted by a fixed margin so it does not land on the
/// viewport edge. Pages that fill most of the viewport, or less than half of
/// it, scroll straight to the target; pages in between are treated as a
/// two-column layout and scroll horizontally to the start of the column that
/// contains the target.
pub fn scroll_target(
    position: DocumentPosition,
    page: &PageGeometry,
    viewport: &Viewport,
) -> ScrollOffset {
    let rect = page.rect;
    let scale_x = if page.page_width > 0.0 {
        rect.width / page.page_width
    } else {
        1.0
    };
    let scale_y = if page.page_height > 0.0 {
        rect.height / page.page_height
    } else {
        1.0
    };

    let page_left = viewport.scroll_x + rect.left;
    let page_top = viewport.scroll_y + rect.top;
    let target_x = page_left + f64::from(position.x) * scale_x;
    let target_y = page_top + f64::from(position.y) * scale_y;

    let margin_x = viewport.width * MARGIN_X_RATIO;
    let margin_y = viewport.height * MARGIN_Y_RATIO;

    let occupied = if viewport.width > 0.0 {
        rect.width / viewport.width
    } else {
        1.0
    };

    let left = if occupied >= DUAL_COLUMN_MAX || occupied < DUAL_COLUMN_MIN {
        target_x - margin_x
    } else {
        let column_split = page_left + rect.width / 2.0;
        let column_start = if target_x < column_split {
            page_left
        } else {
            column_split
        };
        column_start - margin_x
    };

    ScrollOffset {
        left: left.max(0.0),
        top: (target_y - margin_y).max(0.0),
    }
}

/// Editor selection produced by a render → source jump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    pub path: PathBuf,
    pub start: EditorPosition,
    pub end: EditorPosition,
}

/// Turn a jump into a selection. `None` when either end is missing: the
/// rendered element has no source span and nothing should happen.
pub fn resolve_jump(info: &JumpInfo) -> Option<SourceSelection> {
    let (start, end) = match (info.start, info.end) {
        (Some(start), Some(end)) => (start, end),
        _ => return None,
    };
    Some(SourceSelection {
        path: PathBuf::from(&info.filepath),
        start: EditorPosition::new(start.0, start.1),
        end: EditorPosition::new(end.0, end.1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::kernel::PageRect;

    fn pos(page_no: usize, x: f32, y: f32) -> DocumentPosition {
        DocumentPosition { page_no, x, y }
    }

    #[test]
    fn nearest_page_breaks_ties_by_list_order() {
        let candidates = [pos(1, 0.0, 0.0), pos(5, 10.0, 10.0), pos(3, 50.0, 50.0)];
        assert_eq!(nearest_candidate(4, &candidates), Some(pos(5, 10.0, 10.0)));

        let reversed = [pos(3, 50.0, 50.0), pos(5, 10.0, 10.0), pos(1, 0.0, 0.0)];
        assert_eq!(nearest_candidate(4, &reversed), Some(pos(3, 50.0, 50.0)));
    }

    #[test]
    fn strictly_nearer_page_wins_regardless_of_order() {
        let candidates = [pos(9, 0.0, 0.0), pos(1, 0.0, 0.0), pos(4, 1.0, 2.0)];
        assert_eq!(nearest_candidate(4, &candidates), Some(pos(4, 1.0, 2.0)));
        assert_eq!(nearest_candidate(8, &candidates), Some(pos(9, 0.0, 0.0)));
    }

    #[test]
    fn no_candidates_means_no_jump() {
        assert_eq!(nearest_candidate(1, &[]), None);
    }

    fn viewport() -> Viewport {
        Viewport {
            scroll_x: 0.0,
            scroll_y: 1000.0,
            width: 1000.0,
            height: 800.0,
        }
    }

    #[test]
    fn full_width_page_scrolls_to_target_minus_margin() {
        // Page rendered at 950px wide for a 475pt page: scale 2.
        let page = PageGeometry {
            rect: PageRect {
                left: 25.0,
                top: -200.0,
                width: 950.0,
                height: 1344.0,
            },
            page_width: 475.0,
            page_height: 672.0,
        };
        let offset = scroll_target(pos(2, 100.0, 300.0), &page, &viewport());
        // x: 25 + 200 - 70, y: 1000 - 200 + 600 - 305.6
        assert!((offset.left - 155.0).abs() < 1e-9);
        assert!((offset.top - 1094.4).abs() < 1e-6);
    }

    #[test]
    fn dual_column_band_snaps_to_column_start() {
        let page = PageGeometry {
            rect: PageRect {
                left: 200.0,
                top: 0.0,
                width: 600.0,
                height: 800.0,
            },
            page_width: 600.0,
            page_height: 800.0,
        };
        let vp = Viewport {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 1000.0,
            height: 800.0,
        };
        let left_col = scroll_target(pos(1, 100.0, 0.0), &page, &vp);
        assert!((left_col.left - 130.0).abs() < 1e-9);
        let right_col = scroll_target(pos(1, 450.0, 0.0), &page, &vp);
        assert!((right_col.left - 430.0).abs() < 1e-9);
    }

    #[test]
    fn narrow_page_scrolls_directly_and_clamps_at_zero() {
        let page = PageGeometry {
            rect: PageRect {
                left: 10.0,
                top: 10.0,
                width: 300.0,
                height: 400.0,
            },
            page_width: 300.0,
            page_height: 400.0,
        };
        let offset = scroll_target(pos(1, 5.0, 5.0), &page, &viewport());
        assert_eq!(offset.left, 0.0);
        // 1000 + 10 + 5 - 305.6
        assert!((offset.top - 709.4).abs() < 1e-6);
    }

    #[test]
    fn resolve_jump_builds_selection() {
        let info = JumpInfo {
            filepath: "/p/ch1.typ".to_string(),
            start: Some((4, 2)),
            end: Some((4, 9)),
        };
        let selection = resolve_jump(&info).unwrap();
        assert_eq!(selection.path, PathBuf::from("/p/ch1.typ"));
        assert_eq!(selection.start, EditorPosition::new(4, 2));
        assert_eq!(selection.end, EditorPosition::new(4, 9));
    }

    #[test]
    fn resolve_jump_with_missing_end_is_a_no_op() {
        let mut info = JumpInfo {
            filepath: "/p/ch1.typ".to_string(),
            start: None,
            end: None,
        };
        assert!(resolve_jump(&info).is_none());
        info.start = Some((1, 1));
        assert!(resolve_jump(&info).is_none());
    }
}
