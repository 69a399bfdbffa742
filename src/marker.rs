// Marker registry and marker rendering.
//
// Arrow-like markers become native line-end decorations on the host shape.
// Every other marker is drawn as independent child shapes at the host's
// endpoint.

use crate::dom::{Document, Node};
use crate::emit::Emitter;
use crate::path::{self, PathSeg};
use crate::shape::{DecorationKind, DecorationSize, LineDecoration, LineEnds, Shape};
use crate::transform::Matrix;
use std::collections::HashMap;

const DEFAULT_MARKER_SIZE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerUnits {
    StrokeWidth,
    UserSpaceOnUse,
}

impl MarkerUnits {
    pub fn of(marker: Node<'_>) -> MarkerUnits {
        match marker.non_empty_attribute("markerUnits") {
            Some(v) if v.trim().eq_ignore_ascii_case("userSpaceOnUse") => MarkerUnits::UserSpaceOnUse,
            _ => MarkerUnits::StrokeWidth,
        }
    }
}

/// `<marker>` elements by id, collected once per document. A later
/// definition with the same id replaces an earlier one.
#[derive(Debug, Default)]
pub struct MarkerRegistry<'a> {
    markers: HashMap<&'a str, Node<'a>>,
}

impl<'a> MarkerRegistry<'a> {
    pub fn new(doc: &'a Document) -> Self {
        let markers = doc
            .elements()
            .filter(|n| n.has_tag_name("marker"))
            .filter_map(|n| n.non_empty_attribute("id").map(|id| (id, n)))
            .collect();
        Self { markers }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Node<'a>> {
        self.markers.get(id).copied()
    }

    /// Native decoration for a `marker-start`/`marker-end` value, or `None`
    /// when the reference is not an arrow-like marker. `host_stroke_width`
    /// must already be positive.
    pub fn decoration(&self, url: &str, host_stroke_width: f64) -> Option<LineDecoration> {
        let id = marker_id(url)?;
        let kind = native_kind(&id)?;
        let Some(marker) = self.get(&id) else {
            tracing::debug!(marker = %id, "marker not defined, using default triangle");
            return Some(LineDecoration {
                kind: DecorationKind::Triangle,
                width: None,
                length: None,
            });
        };
        let mw = marker.number("markerWidth").unwrap_or(DEFAULT_MARKER_SIZE);
        let mh = marker.number("markerHeight").unwrap_or(DEFAULT_MARKER_SIZE);
        let (w, l) = match MarkerUnits::of(marker) {
            MarkerUnits::UserSpaceOnUse => (mh / host_stroke_width, mw / host_stroke_width),
            MarkerUnits::StrokeWidth => (mh, mw),
        };
        Some(LineDecoration {
            kind,
            width: Some(DecorationSize::bucket(w)),
            length: Some(DecorationSize::bucket(l)),
        })
    }
}

/// Extracts the id from `url(#id)`, `url('#id')` or a bare `#id`.
pub fn marker_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once('#')?;
    let id: String = rest
        .chars()
        .filter(|c| !matches!(c, ')' | '\'' | '"'))
        .collect();
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Decoration shape for ids rendered natively, `None` for the rest.
pub fn native_kind(id: &str) -> Option<DecorationKind> {
    let id = id.to_ascii_lowercase();
    if id.contains("crosshead") {
        Some(DecorationKind::Arrow)
    } else if id.contains("arrowhead") || id.contains("filled-head") {
        Some(DecorationKind::Triangle)
    } else {
        None
    }
}

/// Child shapes of a non-native marker placed at the host's local point
/// `(x, y)`. Circles become ellipses; paths and polygons become freeforms.
pub(crate) fn marker_shapes(
    em: &Emitter<'_>,
    host: Node<'_>,
    url: Option<&str>,
    x: f64,
    y: f64,
) -> Vec<Shape> {
    let Some(id) = url.and_then(marker_id) else {
        return Vec::new();
    };
    if native_kind(&id).is_some() {
        return Vec::new();
    }
    let Some(marker) = em.markers.get(&id) else {
        tracing::debug!(marker = %id, host = %host.id(), "unresolved marker reference");
        return Vec::new();
    };

    let sw = match MarkerUnits::of(marker) {
        MarkerUnits::StrokeWidth => em.host_stroke_width(host),
        MarkerUnits::UserSpaceOnUse => 1.0,
    };
    let ref_x = marker.number("refX").unwrap_or(0.0) * sw;
    let ref_y = marker.number("refY").unwrap_or(0.0) * sw;
    let marker_style = em.resolver.style_for(marker);
    let host_m = em.full_transform(host);

    let mut out = Vec::new();
    for child in marker.element_children() {
        let style = em.resolver.style_for(child).over(&marker_style);
        match child.tag_name() {
            "circle" => {
                let cx = child.number("cx").unwrap_or(0.0) * sw;
                let cy = child.number("cy").unwrap_or(0.0) * sw;
                let r = child.number("r").unwrap_or(0.0) * sw;
                let (dx, dy) = (cx - ref_x, cy - ref_y);
                let (x0, y0, x1, y1) =
                    host_m.map_rect(x + dx - r, y + dy - r, 2.0 * r, 2.0 * r);
                out.push(Shape::Ellipse {
                    anchor: em.mapper.rect(x0, y0, x1, y1),
                    style: em.shape_style(&style, false),
                });
            }
            tag @ ("path" | "polygon") => {
                let segs = if tag == "path" {
                    child
                        .non_empty_attribute("d")
                        .map(path::parse_path_data)
                        .unwrap_or_default()
                } else {
                    child
                        .non_empty_attribute("points")
                        .map(|p| path::parse_points(p, true))
                        .unwrap_or_default()
                };
                if segs.is_empty() {
                    continue;
                }
                let m = host_m
                    .mul(Matrix::translate(x, y))
                    .mul(Matrix::translate(-ref_x, -ref_y))
                    .mul(Matrix::scale(sw, sw));
                let root_space = path::transform_segs(&segs, m);
                out.push(Shape::Freeform {
                    closed: segs.iter().any(|s| matches!(s, PathSeg::Close)),
                    path: em.mapper.path(&root_space),
                    style: em.shape_style(&style, false),
                    ends: LineEnds::default(),
                });
            }
            other => tracing::debug!(marker = %id, tag = other, "ignoring marker child"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::EmitOptions;
    use crate::font::FontRegistry;
    use crate::mapper::{Mapper, ViewBox};
    use crate::style::StyleResolver;
    use crate::types::{Color, Size};

    #[test]
    fn ids_come_out_of_url_references() {
        assert_eq!(marker_id("url(#arrow)").as_deref(), Some("arrow"));
        assert_eq!(marker_id("url('#a-b')").as_deref(), Some("a-b"));
        assert_eq!(marker_id("url(\"#x\") ").as_deref(), Some("x"));
        assert_eq!(marker_id("#plain").as_deref(), Some("plain"));
        assert_eq!(marker_id("none"), None);
        assert_eq!(marker_id("url(#)"), None);
    }

    #[test]
    fn native_kinds() {
        assert_eq!(native_kind("mermaid-1_flowchart-v2-pointEnd-ArrowHead"), Some(DecorationKind::Triangle));
        assert_eq!(native_kind("sequence-filled-head"), Some(DecorationKind::Triangle));
        assert_eq!(native_kind("crosshead"), Some(DecorationKind::Arrow));
        assert_eq!(native_kind("flowchart-circleEnd"), None);
    }

    #[test]
    fn decoration_sizes_follow_marker_units() {
        let doc = Document::parse(
            r#"<svg><marker id="a-arrowhead" markerWidth="2" markerHeight="6"/><marker id="b-arrowhead" markerUnits="userSpaceOnUse" markerWidth="12" markerHeight="4"/><marker id="c-arrowhead"/></svg>"#,
        )
        .expect("parse");
        let reg = MarkerRegistry::new(&doc);
        assert_eq!(reg.len(), 3);

        let a = reg.decoration("url(#a-arrowhead)", 2.0).expect("a");
        assert_eq!(a.width, Some(DecorationSize::Large));
        assert_eq!(a.length, Some(DecorationSize::Small));

        let b = reg.decoration("url(#b-arrowhead)", 2.0).expect("b");
        assert_eq!(b.width, Some(DecorationSize::Small));
        assert_eq!(b.length, Some(DecorationSize::Large));

        let c = reg.decoration("url(#c-arrowhead)", 1.0).expect("c");
        assert_eq!(c.width, Some(DecorationSize::Medium));
        assert_eq!(c.length, Some(DecorationSize::Medium));

        assert!(reg.decoration("url(#circle)", 1.0).is_none());
    }

    fn emit(svg: &str) -> Vec<Shape> {
        let doc = Document::parse(svg).expect("parse");
        let fonts = FontRegistry::new();
        let options = EmitOptions::default();
        let mapper = Mapper::new(ViewBox::new(0.0, 0.0, 1000.0, 1000.0), Size::new(1000.0, 1000.0));
        Emitter::new(&doc, StyleResolver::new(None, false), mapper, &fonts, &options).emit()
    }

    #[test]
    fn circle_marker_is_drawn_at_the_endpoint() {
        let shapes = emit(
            r#"<svg><defs><marker id="dot" refX="5" refY="5" fill="red"><circle cx="5" cy="5" r="5"/></marker></defs><g transform="translate(100 0)"><line x1="0" y1="0" x2="50" y2="0" stroke="black" stroke-width="2" marker-end="url(#dot)"/></g></svg>"#,
        );
        assert_eq!(shapes.len(), 2);
        let Shape::Ellipse { anchor, style } = &shapes[1] else {
            panic!("expected marker ellipse, got {:?}", shapes[1]);
        };
        // strokeWidth units: everything doubles; centered on (150, 0).
        assert_eq!(anchor.x.to_f64(), 140.0);
        assert_eq!(anchor.y.to_f64(), -10.0);
        assert_eq!(anchor.width.to_f64(), 20.0);
        // Fill comes from the marker element, merged under the child.
        assert_eq!(style.fill, Some(Color::rgb(0xFF, 0, 0)));
    }

    #[test]
    fn path_marker_is_offset_by_ref_point() {
        let shapes = emit(
            r#"<svg><marker id="tri" markerUnits="userSpaceOnUse" refX="10" refY="5"><path d="M0 0 L10 5 L0 10 Z" fill="blue"/><text>ignored</text></marker><path d="M0 0 L100 100" marker-start="url(#tri)" stroke-width="4"/></svg>"#,
        );
        assert_eq!(shapes.len(), 2);
        let Shape::Freeform { path, closed, style, .. } = &shapes[1] else {
            panic!("expected marker freeform");
        };
        assert!(closed);
        assert_eq!(path[0], PathSeg::MoveTo { x: -10.0, y: -5.0 });
        assert_eq!(path[1], PathSeg::LineTo { x: 0.0, y: 0.0 });
        assert_eq!(style.fill, Some(Color::rgb(0, 0, 0xFF)));
    }

    #[test]
    fn closed_path_end_marker_sits_on_the_last_vertex() {
        let shapes = emit(
            r#"<svg><marker id="dot" markerUnits="userSpaceOnUse" refX="5" refY="5"><circle cx="5" cy="5" r="5"/></marker><path d="M0 0 L100 0 L100 50 Z" marker-end="url(#dot)"/></svg>"#,
        );
        assert_eq!(shapes.len(), 2);
        let Shape::Ellipse { anchor, .. } = &shapes[1] else {
            panic!("expected marker ellipse, got {:?}", shapes[1]);
        };
        // Centered on (100, 50), not back on the subpath start.
        assert_eq!(anchor.x.to_f64(), 95.0);
        assert_eq!(anchor.y.to_f64(), 45.0);
        assert_eq!(anchor.width.to_f64(), 10.0);
    }

    #[test]
    fn unknown_marker_draws_nothing() {
        let shapes = emit(r#"<svg><line x2="10" marker-end="url(#nope)"/></svg>"#);
        assert_eq!(shapes.len(), 1);
    }
}
