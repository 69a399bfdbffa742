// Viewbox-to-canvas mapping.
//
// One uniform scale plus centering offsets. Content is only ever shrunk, never
// enlarged, so a small diagram lands at its natural size in the middle of the
// canvas.

use crate::path::PathSeg;
use crate::types::{Rect, Size};
use serde::Serialize;

/// Content-space rectangle fitted onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBox {
    pub const fn new(min_x: f64, min_y: f64, width: f64, height: f64) -> Self {
        Self {
            min_x,
            min_y,
            width,
            height,
        }
    }

    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

impl Default for ViewBox {
    fn default() -> Self {
        Self::new(0.0, 0.0, 800.0, 600.0)
    }
}

/// Parses a `viewBox` attribute (`min-x min-y width height`, whitespace or
/// comma separated). Non-positive extents are rejected.
pub fn parse_viewbox(input: &str) -> Option<ViewBox> {
    let mut it = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty());
    let min_x = it.next()?.parse::<f64>().ok()?;
    let min_y = it.next()?.parse::<f64>().ok()?;
    let w = it.next()?.parse::<f64>().ok()?;
    let h = it.next()?.parse::<f64>().ok()?;
    if it.next().is_some() || !(w > 0.0 && h > 0.0) || !min_x.is_finite() || !min_y.is_finite() {
        return None;
    }
    Some(ViewBox::new(min_x, min_y, w, h))
}

/// Canvas for a document: the floor size, grown just enough to hold the
/// content plus `margin` on each axis.
pub fn canvas_size(floor: Size, view_box: ViewBox, margin: f64) -> Size {
    Size::new(
        floor.width.to_f64().max(view_box.width + margin),
        floor.height.to_f64().max(view_box.height + margin),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mapper {
    view_box: ViewBox,
    s: f64,
    ox: f64,
    oy: f64,
}

impl Mapper {
    pub fn new(view_box: ViewBox, canvas: Size) -> Self {
        let (cw, ch) = (canvas.width.to_f64(), canvas.height.to_f64());
        let sx = if view_box.width > 0.0 { cw / view_box.width } else { 1.0 };
        let sy = if view_box.height > 0.0 { ch / view_box.height } else { 1.0 };
        let s = sx.min(sy).min(1.0);
        Self {
            view_box,
            s,
            ox: (cw - view_box.width * s) / 2.0,
            oy: (ch - view_box.height * s) / 2.0,
        }
    }

    pub fn view_box(&self) -> ViewBox {
        self.view_box
    }

    pub fn scale(&self) -> f64 {
        self.s
    }

    pub fn offset(&self) -> (f64, f64) {
        (self.ox, self.oy)
    }

    pub fn x(&self, v: f64) -> f64 {
        (v - self.view_box.min_x) * self.s + self.ox
    }

    pub fn y(&self, v: f64) -> f64 {
        (v - self.view_box.min_y) * self.s + self.oy
    }

    pub fn point(&self, x: f64, y: f64) -> (f64, f64) {
        (self.x(x), self.y(y))
    }

    pub fn len(&self, v: f64) -> f64 {
        v * self.s
    }

    /// Device box for the content-space box spanning two corners.
    pub fn rect(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::from_corners(self.x(x0), self.y(y0), self.x(x1), self.y(y1))
    }

    /// Maps every point of a root-space path onto the canvas.
    pub fn path(&self, segs: &[PathSeg]) -> Vec<PathSeg> {
        segs.iter()
            .map(|seg| seg.map_points(|x, y| self.point(x, y)))
            .collect()
    }

    pub fn inverse_x(&self, v: f64) -> f64 {
        (v - self.ox) / self.s + self.view_box.min_x
    }

    pub fn inverse_y(&self, v: f64) -> f64 {
        (v - self.oy) / self.s + self.view_box.min_y
    }
}
