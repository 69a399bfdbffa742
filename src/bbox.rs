// Global content bounds from oracle-reported element boxes.

use crate::dom::{Document, Node};
use crate::mapper::{ViewBox, parse_viewbox};
use crate::oracle::OracleTable;
use crate::transform::full_transform;

/// Tags whose oracle box contributes to the content bounds.
pub const DRAWABLE_TAGS: [&str; 8] = [
    "rect", "circle", "ellipse", "polygon", "polyline", "line", "path", "text",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct BBoxAggregator {
    bounds: Option<(f64, f64, f64, f64)>,
    contributors: usize,
}

impl BBoxAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return;
        }
        self.bounds = Some(match self.bounds {
            Some((x0, y0, x1, y1)) => (x0.min(min_x), y0.min(min_y), x1.max(max_x), y1.max(max_y)),
            None => (min_x, min_y, max_x, max_y),
        });
        self.contributors += 1;
    }

    /// Projects the element's oracle box through its full transform and adds
    /// it. Returns false when the element has nothing to contribute.
    pub fn include_element(&mut self, node: Node<'_>, oracle: &OracleTable) -> bool {
        if !DRAWABLE_TAGS.contains(&node.tag_name()) {
            return false;
        }
        let Some(b) = oracle.bbox(node.id()) else {
            return false;
        };
        if b.width == 0.0 && b.height == 0.0 && !node.has_tag_name("line") {
            return false;
        }
        let (x0, y0, x1, y1) = full_transform(node, Some(oracle)).map_rect(b.x, b.y, b.width, b.height);
        self.include(x0, y0, x1, y1);
        true
    }

    pub fn contributors(&self) -> usize {
        self.contributors
    }

    pub fn view_box(&self) -> Option<ViewBox> {
        self.bounds
            .map(|(x0, y0, x1, y1)| ViewBox::from_bounds(x0, y0, x1, y1))
    }
}

/// The content viewbox of a document: the union of visible drawable oracle
/// boxes, else the root `viewBox` attribute, else `fallback`.
pub fn content_viewbox(doc: &Document, oracle: Option<&OracleTable>, fallback: ViewBox) -> ViewBox {
    let mut agg = BBoxAggregator::new();
    if let Some(table) = oracle {
        for id in table.visible() {
            agg.include_element(doc.get(id), table);
        }
    }
    if let Some(vb) = agg.view_box() {
        tracing::debug!(
            contributors = agg.contributors(),
            x = vb.min_x,
            y = vb.min_y,
            w = vb.width,
            h = vb.height,
            "content bounds from oracle boxes"
        );
        return vb;
    }
    let declared = doc
        .root()
        .non_empty_attribute("viewBox")
        .and_then(parse_viewbox);
    declared.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StaticOracle;

    fn table_for(doc: &Document, entries: &[(&str, &str)]) -> OracleTable {
        // (tag, extra json) pairs, matched to the first element of that tag
        let records: Vec<String> = entries
            .iter()
            .map(|(tag, extra)| {
                let node = doc.elements().find(|n| n.has_tag_name(tag)).expect("tag");
                format!(
                    r#"{{"idx":{},"tagName":"{}","styles":{{}}{}}}"#,
                    node.id(),
                    tag,
                    extra
                )
            })
            .collect();
        OracleTable::load(doc, &StaticOracle::new(format!("[{}]", records.join(","))))
            .expect("oracle")
    }

    #[test]
    fn unions_transformed_boxes() {
        let doc = Document::parse(
            r#"<svg viewBox="0 0 1 1"><rect/><g transform="translate(100 50)"><circle/></g></svg>"#,
        )
        .expect("parse");
        let table = table_for(
            &doc,
            &[
                ("rect", r#","bbox":{"x":0,"y":0,"width":10,"height":10}"#),
                ("circle", r#","bbox":{"x":-5,"y":-5,"width":10,"height":10}"#),
            ],
        );
        let vb = content_viewbox(&doc, Some(&table), ViewBox::default());
        assert_eq!(vb, ViewBox::new(0.0, 0.0, 105.0, 55.0));
    }

    #[test]
    fn point_boxes_only_count_for_lines() {
        let doc = Document::parse(r#"<svg><rect/><path/><circle/><line/></svg>"#).expect("parse");
        let table = table_for(
            &doc,
            &[
                ("rect", r#","bbox":{"x":0,"y":0,"width":10,"height":10}"#),
                ("path", r#","bbox":{"x":500,"y":0,"width":0,"height":40}"#),
                ("circle", r#","bbox":{"x":900,"y":900,"width":0,"height":0}"#),
                ("line", r#","bbox":{"x":-20,"y":5,"width":0,"height":0}"#),
            ],
        );
        let mut agg = BBoxAggregator::new();
        for id in table.visible() {
            agg.include_element(doc.get(id), &table);
        }
        assert_eq!(agg.contributors(), 3, "only the empty circle is dropped");
        assert_eq!(agg.view_box(), Some(ViewBox::new(-20.0, 0.0, 520.0, 40.0)));
    }

    #[test]
    fn flat_edges_widen_the_content_box() {
        let doc = Document::parse(r#"<svg><rect/><path/></svg>"#).expect("parse");
        let table = table_for(
            &doc,
            &[
                ("rect", r#","bbox":{"x":0,"y":0,"width":10,"height":10}"#),
                ("path", r#","bbox":{"x":0,"y":5,"width":500,"height":0}"#),
            ],
        );
        let vb = content_viewbox(&doc, Some(&table), ViewBox::default());
        assert_eq!(vb, ViewBox::new(0.0, 0.0, 500.0, 10.0));
    }

    #[test]
    fn hidden_and_non_drawable_elements_are_ignored() {
        let doc = Document::parse(r#"<svg><g/><defs><rect/></defs></svg>"#).expect("parse");
        let table = table_for(
            &doc,
            &[
                ("g", r#","bbox":{"x":0,"y":0,"width":10,"height":10}"#),
                ("rect", r#","bbox":{"x":0,"y":0,"width":10,"height":10},"isHidden":true"#),
            ],
        );
        let vb = content_viewbox(&doc, Some(&table), ViewBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(vb, ViewBox::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn falls_back_to_declared_viewbox_then_default() {
        let doc = Document::parse(r#"<svg viewBox="10 20 300 400"><rect width="5" height="5"/></svg>"#)
            .expect("parse");
        assert_eq!(
            content_viewbox(&doc, None, ViewBox::default()),
            ViewBox::new(10.0, 20.0, 300.0, 400.0)
        );
        let bare = Document::parse(r#"<svg><rect/></svg>"#).expect("parse");
        assert_eq!(
            content_viewbox(&bare, None, ViewBox::default()),
            ViewBox::new(0.0, 0.0, 800.0, 600.0)
        );
        let broken = Document::parse(r#"<svg viewBox="0 0 -1 5"/>"#).expect("parse");
        assert_eq!(content_viewbox(&broken, None, ViewBox::default()), ViewBox::default());
    }
}
