// Shape emission: one document walk, one exhaustive dispatch per element.

use crate::dom::{Document, Node};
use crate::font::FontRegistry;
use crate::mapper::Mapper;
use crate::marker::{self, MarkerRegistry};
use crate::oracle::OracleTable;
use crate::path::{self, PathSeg};
use crate::shape::{LineEnds, Shape, ShapeStyle};
use crate::style::{self, StyleProperty, StyleResolver, StyleSet};
use crate::text::{self, TextRun};
use crate::transform::{Matrix, full_transform};

/// Rendering knobs the emitter needs from the converter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitOptions {
    pub default_font_family: String,
    pub default_font_size_px: f64,
    /// Emitted font size is `font-size px * mapper scale * font_scale`.
    pub font_scale: f64,
    pub min_stroke_width: f64,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            default_font_family: "Malgun Gothic".to_string(),
            default_font_size_px: 16.0,
            font_scale: 0.5,
            min_stroke_width: 0.25,
        }
    }
}

/// Closed set of element kinds the emitter knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drawable {
    Rect,
    Circle,
    Ellipse,
    Polygon,
    Polyline,
    Line,
    Path,
    Text,
    /// Non-rendering subtree (`defs`, `marker`, `style`, `metadata`).
    Skip,
    /// Anything else: transparent container, children are visited.
    Group,
}

impl Drawable {
    pub fn classify(tag: &str) -> Drawable {
        match tag {
            "rect" => Drawable::Rect,
            "circle" => Drawable::Circle,
            "ellipse" => Drawable::Ellipse,
            "polygon" => Drawable::Polygon,
            "polyline" => Drawable::Polyline,
            "line" => Drawable::Line,
            "path" => Drawable::Path,
            "text" => Drawable::Text,
            "defs" | "marker" | "style" | "metadata" => Drawable::Skip,
            _ => Drawable::Group,
        }
    }
}

pub struct Emitter<'a> {
    pub(crate) oracle: Option<&'a OracleTable>,
    pub(crate) resolver: StyleResolver<'a>,
    pub(crate) mapper: Mapper,
    pub(crate) markers: MarkerRegistry<'a>,
    pub(crate) fonts: &'a FontRegistry,
    pub(crate) options: &'a EmitOptions,
    doc: &'a Document,
}

impl<'a> Emitter<'a> {
    pub fn new(
        doc: &'a Document,
        resolver: StyleResolver<'a>,
        mapper: Mapper,
        fonts: &'a FontRegistry,
        options: &'a EmitOptions,
    ) -> Self {
        Self {
            oracle: resolver.oracle(),
            markers: MarkerRegistry::new(doc),
            resolver,
            mapper,
            fonts,
            options,
            doc,
        }
    }

    /// Shapes for the whole document in paint order.
    pub fn emit(&self) -> Vec<Shape> {
        let mut out = Vec::new();
        self.walk(self.doc.root(), &mut out);
        out
    }

    fn walk(&self, parent: Node<'a>, out: &mut Vec<Shape>) {
        let children: Vec<Node<'a>> = parent.element_children().collect();
        let mut i = 0;
        while i < children.len() {
            let el = children[i];
            i += 1;
            let kind = Drawable::classify(el.tag_name());
            tracing::trace!(element = %el.id(), tag = el.tag_name(), ?kind, "dispatch");
            match kind {
                Drawable::Skip => {}
                Drawable::Group => self.walk(el, out),
                Drawable::Text => {
                    let mut runs = vec![TextRun::new(el, self.resolver.style_for(el))];
                    while let Some(next) = children.get(i).filter(|n| n.has_tag_name("text")) {
                        let run = TextRun::new(*next, self.resolver.style_for(*next));
                        if !text::can_group(&runs[0], &run, &self.mapper, self.options.default_font_size_px) {
                            break;
                        }
                        runs.push(run);
                        i += 1;
                    }
                    if runs.len() > 1 {
                        tracing::debug!(
                            count = runs.len(),
                            first = %el.id(),
                            "grouping adjacent text elements"
                        );
                    }
                    out.extend(text::text_block(self, &runs));
                }
                Drawable::Rect => self.rect(el, &self.resolver.style_for(el), out),
                Drawable::Circle => {
                    let r = el.number("r").unwrap_or(0.0);
                    self.ellipse(el, r, r, &self.resolver.style_for(el), out);
                }
                Drawable::Ellipse => {
                    let rx = el.number("rx").unwrap_or(0.0);
                    let ry = el.number("ry").unwrap_or(0.0);
                    self.ellipse(el, rx, ry, &self.resolver.style_for(el), out);
                }
                Drawable::Polygon => self.poly(el, true, &self.resolver.style_for(el), out),
                Drawable::Polyline => self.poly(el, false, &self.resolver.style_for(el), out),
                Drawable::Line => self.line(el, &self.resolver.style_for(el), out),
                Drawable::Path => self.path(el, &self.resolver.style_for(el), out),
            }
        }
    }

    pub(crate) fn full_transform(&self, node: Node<'_>) -> Matrix {
        full_transform(node, self.oracle)
    }

    pub(crate) fn shape_style(&self, style: &StyleSet, connector: bool) -> ShapeStyle {
        style::shape_style(
            style,
            connector,
            self.mapper.scale(),
            self.options.min_stroke_width,
        )
    }

    /// Resolved `stroke-width` of a marker host, with zero or missing read as 1.
    pub(crate) fn host_stroke_width(&self, host: Node<'_>) -> f64 {
        self.resolver
            .resolve(host, StyleProperty::StrokeWidth)
            .as_deref()
            .and_then(crate::units::parse_length)
            .filter(|sw| *sw > 0.0)
            .unwrap_or(1.0)
    }

    fn rect(&self, el: Node<'a>, style: &StyleSet, out: &mut Vec<Shape>) {
        let x = el.number("x").unwrap_or(0.0);
        let y = el.number("y").unwrap_or(0.0);
        let w = el.number("width").unwrap_or(0.0);
        let h = el.number("height").unwrap_or(0.0);
        let rx = el.number("rx").unwrap_or(0.0);
        let ry = el.number("ry").unwrap_or(0.0);

        let m = self.full_transform(el);
        let (x0, y0) = m.apply(x, y);
        let (x1, y1) = m.apply(x + w, y + h);
        out.push(Shape::Rect {
            anchor: self.mapper.rect(x0, y0, x1, y1),
            rounded: rx > 0.0 || ry > 0.0,
            style: self.shape_style(style, false),
        });
    }

    fn ellipse(&self, el: Node<'a>, rx: f64, ry: f64, style: &StyleSet, out: &mut Vec<Shape>) {
        let cx = el.number("cx").unwrap_or(0.0);
        let cy = el.number("cy").unwrap_or(0.0);
        let (x0, y0, x1, y1) = self
            .full_transform(el)
            .map_rect(cx - rx, cy - ry, 2.0 * rx, 2.0 * ry);
        out.push(Shape::Ellipse {
            anchor: self.mapper.rect(x0, y0, x1, y1),
            style: self.shape_style(style, false),
        });
    }

    fn poly(&self, el: Node<'a>, close: bool, style: &StyleSet, out: &mut Vec<Shape>) {
        let Some(points) = el.non_empty_attribute("points") else {
            return;
        };
        let segs = path::parse_points(points, close);
        if segs.is_empty() {
            return;
        }
        let segs = path::transform_segs(&segs, self.full_transform(el));
        out.push(Shape::Freeform {
            path: self.mapper.path(&segs),
            closed: close,
            style: self.shape_style(style, false),
            ends: LineEnds::default(),
        });
    }

    fn line(&self, el: Node<'a>, style: &StyleSet, out: &mut Vec<Shape>) {
        let x1 = el.number("x1").unwrap_or(0.0);
        let y1 = el.number("y1").unwrap_or(0.0);
        let x2 = el.number("x2").unwrap_or(0.0);
        let y2 = el.number("y2").unwrap_or(0.0);

        let m = self.full_transform(el);
        let (sx1, sy1) = {
            let (x, y) = m.apply(x1, y1);
            self.mapper.point(x, y)
        };
        let (sx2, sy2) = {
            let (x, y) = m.apply(x2, y2);
            self.mapper.point(x, y)
        };
        let start = style.get(StyleProperty::MarkerStart);
        let end = style.get(StyleProperty::MarkerEnd);
        out.push(Shape::Connector {
            anchor: crate::types::Rect::from_corners(sx1, sy1, sx2, sy2),
            flip_h: sx1 > sx2,
            flip_v: sy1 > sy2,
            style: self.shape_style(style, true),
            ends: self.line_ends(el, start, end),
        });
        out.extend(marker::marker_shapes(self, el, start, x1, y1));
        out.extend(marker::marker_shapes(self, el, end, x2, y2));
    }

    fn path(&self, el: Node<'a>, style: &StyleSet, out: &mut Vec<Shape>) {
        let Some(d) = el.non_empty_attribute("d") else {
            return;
        };
        let segs = path::parse_path_data(d);
        if segs.is_empty() {
            return;
        }
        // Marker anchors stay in local coordinates; the marker code applies
        // the host transform itself.
        let first = path::first_point(&segs);
        let last = path::last_point(&segs);
        let closed = segs.iter().any(|s| matches!(s, PathSeg::Close));
        let start = style.get(StyleProperty::MarkerStart);
        let end = style.get(StyleProperty::MarkerEnd);

        let root_space = path::transform_segs(&segs, self.full_transform(el));
        out.push(Shape::Freeform {
            path: self.mapper.path(&root_space),
            closed,
            style: self.shape_style(style, false),
            ends: self.line_ends(el, start, end),
        });
        if let Some((x, y)) = first {
            out.extend(marker::marker_shapes(self, el, start, x, y));
        }
        if let Some((x, y)) = last {
            out.extend(marker::marker_shapes(self, el, end, x, y));
        }
    }

    fn line_ends(&self, host: Node<'_>, start: Option<&str>, end: Option<&str>) -> LineEnds {
        if start.is_none() && end.is_none() {
            return LineEnds::default();
        }
        let sw = self.host_stroke_width(host);
        LineEnds {
            head: start.and_then(|url| self.markers.decoration(url, sw)),
            tail: end.and_then(|url| self.markers.decoration(url, sw)),
        }
    }
}
