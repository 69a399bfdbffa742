// Output model handed to a presentation writer. Every coordinate in here is
// already in canvas space; consumers lay shapes out as given.

use crate::mapper::ViewBox;
use crate::path::PathSeg;
use crate::types::{Color, Pt, Rect, Size};
use crate::units::DashStyle;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slide {
    pub size: Size,
    /// Content-to-canvas scale used for this slide.
    pub scale: f64,
    pub view_box: ViewBox,
    pub shapes: Vec<Shape>,
}

impl Slide {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ShapeStyle {
    pub fill: Option<Color>,
    pub stroke: Option<Stroke>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stroke {
    pub color: Color,
    pub width: Pt,
    pub dash: Option<DashStyle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecorationKind {
    Triangle,
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecorationSize {
    Small,
    Medium,
    Large,
}

impl DecorationSize {
    pub fn bucket(value: f64) -> Self {
        if value <= 2.5 {
            DecorationSize::Small
        } else if value <= 5.0 {
            DecorationSize::Medium
        } else {
            DecorationSize::Large
        }
    }
}

/// Native line-end decoration. Sizes are `None` when the referenced marker
/// was not found and the writer's default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineDecoration {
    pub kind: DecorationKind,
    pub width: Option<DecorationSize>,
    pub length: Option<DecorationSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineEnds {
    pub head: Option<LineDecoration>,
    pub tail: Option<LineDecoration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn from_anchor(anchor: Option<&str>) -> Self {
        match anchor.map(|a| a.trim().to_ascii_lowercase()).as_deref() {
            Some("middle") => TextAlign::Center,
            Some("end") => TextAlign::Right,
            _ => TextAlign::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub text: String,
    pub font_family: String,
    pub font_size: Pt,
    pub color: Option<Color>,
    pub align: TextAlign,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Rect {
        anchor: Rect,
        rounded: bool,
        style: ShapeStyle,
    },
    Ellipse {
        anchor: Rect,
        style: ShapeStyle,
    },
    Freeform {
        path: Vec<PathSeg>,
        closed: bool,
        style: ShapeStyle,
        ends: LineEnds,
    },
    Connector {
        anchor: Rect,
        flip_h: bool,
        flip_v: bool,
        style: ShapeStyle,
        ends: LineEnds,
    },
    TextBlock {
        anchor: Rect,
        paragraphs: Vec<TextLine>,
    },
}

impl Shape {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Rect { rounded: false, .. } => "rect",
            Shape::Rect { rounded: true, .. } => "round_rect",
            Shape::Ellipse { .. } => "ellipse",
            Shape::Freeform { .. } => "freeform",
            Shape::Connector { .. } => "connector",
            Shape::TextBlock { .. } => "text_block",
        }
    }

    /// Anchor box; for freeforms the bounds of the device-space points.
    pub fn anchor(&self) -> Option<Rect> {
        match self {
            Shape::Rect { anchor, .. }
            | Shape::Ellipse { anchor, .. }
            | Shape::Connector { anchor, .. }
            | Shape::TextBlock { anchor, .. } => Some(*anchor),
            Shape::Freeform { path, .. } => crate::path::path_bounds(path)
                .map(|b| Rect::from_corners(b.min_x, b.min_y, b.max_x, b.max_y)),
        }
    }

    pub fn style(&self) -> Option<&ShapeStyle> {
        match self {
            Shape::Rect { style, .. }
            | Shape::Ellipse { style, .. }
            | Shape::Freeform { style, .. }
            | Shape::Connector { style, .. } => Some(style),
            Shape::TextBlock { .. } => None,
        }
    }
}
