//! Render surface handles
//!
//! The window system that owns a drawable target is an external collaborator.
//! A graph only ever binds its sink to a surface and lets go of it on teardown;
//! it never creates, resizes or destroys one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rectangle in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{},{},{}>", self.x, self.y, self.width, self.height)
    }
}

/// Externally supplied drawable target for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderSurface {
    /// No surface yet; the sink opens its own output or runs headless
    #[default]
    None,

    /// Native window handle (XID, HWND) for overlay-capable sinks
    WindowHandle(u64),

    /// Region of the display (KMS plane area, overlay sub-rectangle)
    Rect(Rect),
}

impl RenderSurface {
    pub fn is_none(&self) -> bool {
        matches!(self, RenderSurface::None)
    }

    /// Short kind name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            RenderSurface::None => "none",
            RenderSurface::WindowHandle(_) => "window-handle",
            RenderSurface::Rect(_) => "rect",
        }
    }
}

impl fmt::Display for RenderSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderSurface::None => write!(f, "none"),
            RenderSurface::WindowHandle(h) => write!(f, "window:{:#x}", h),
            RenderSurface::Rect(r) => write!(f, "rect:{}", r),
        }
    }
}

/// Cell rectangle for tile `index` of a `columns` x `rows` wall
///
/// Tiles are numbered row-major. The last column and row absorb the pixels
/// left over by integer division so the wall covers the whole screen.
/// Returns `None` for an empty grid or an index past the last cell.
pub fn grid_cell(
    index: usize,
    columns: u32,
    rows: u32,
    screen_width: u32,
    screen_height: u32,
) -> Option<Rect> {
    if columns == 0 || rows == 0 || index >= (columns as usize) * (rows as usize) {
        return None;
    }

    let col = (index % columns as usize) as u32;
    let row = (index / columns as usize) as u32;
    let cell_w = screen_width / columns;
    let cell_h = screen_height / rows;

    let width = if col + 1 == columns {
        screen_width - cell_w * col
    } else {
        cell_w
    };
    let height = if row + 1 == rows {
        screen_height - cell_h * row
    } else {
        cell_h
    };

    Some(Rect::new(
        (cell_w * col) as i32,
        (cell_h * row) as i32,
        width,
        height,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_2x2_on_1080p() {
        assert_eq!(grid_cell(0, 2, 2, 1920, 1080), Some(Rect::new(0, 0, 960, 540)));
        assert_eq!(grid_cell(1, 2, 2, 1920, 1080), Some(Rect::new(960, 0, 960, 540)));
        assert_eq!(grid_cell(2, 2, 2, 1920, 1080), Some(Rect::new(0, 540, 960, 540)));
        assert_eq!(grid_cell(3, 2, 2, 1920, 1080), Some(Rect::new(960, 540, 960, 540)));
    }

    #[test]
    fn test_grid_remainder_goes_to_last_cell() {
        // 1000 / 3 = 333, last column takes 334
        assert_eq!(grid_cell(2, 3, 1, 1000, 100), Some(Rect::new(666, 0, 334, 100)));
        assert_eq!(grid_cell(0, 3, 1, 1000, 100), Some(Rect::new(0, 0, 333, 100)));
    }

    #[test]
    fn test_grid_out_of_range() {
        assert_eq!(grid_cell(4, 2, 2, 1920, 1080), None);
        assert_eq!(grid_cell(0, 0, 2, 1920, 1080), None);
    }

    #[test]
    fn test_surface_serde() {
        let s: RenderSurface = serde_json::from_str(r#"{"window_handle": 42}"#).unwrap();
        assert_eq!(s, RenderSurface::WindowHandle(42));

        let s: RenderSurface =
            serde_json::from_str(r#"{"rect": {"x": 0, "y": 540, "width": 960, "height": 540}}"#)
                .unwrap();
        assert_eq!(s, RenderSurface::Rect(Rect::new(0, 540, 960, 540)));

        let s: RenderSurface = serde_json::from_str(r#""none""#).unwrap();
        assert!(s.is_none());
    }

    #[test]
    fn test_rect_display_matches_render_rectangle_syntax() {
        assert_eq!(Rect::new(960, 0, 960, 540).to_string(), "<960,0,960,540>");
    }
}
