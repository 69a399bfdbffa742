// Seam to the external style & geometry oracle.
//
// The converter hands the oracle an instrumented copy of the document (every
// element carries its stable index), receives one record per element, and
// freezes the result into an `OracleTable` before any geometry work starts.

use crate::dom::{Document, Node, NodeId};
use crate::error::OracleError;
use crate::transform::Matrix;
use std::collections::HashMap;
use std::fmt::Write as _;
use svgdeck_oracle_contract::{BoundingBox, ElementRecord, INDEX_ATTRIBUTE};

/// A rendering environment able to report computed style and geometry for an
/// instrumented SVG document. Called at most once per conversion.
pub trait StyleOracle {
    fn probe(&self, instrumented_svg: &str) -> Result<Vec<ElementRecord>, OracleError>;
}

/// Oracle backed by a payload captured earlier (for example by running the
/// contract's probe script out of process).
#[derive(Debug, Clone)]
pub struct StaticOracle {
    payload: String,
}

impl StaticOracle {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl StyleOracle for StaticOracle {
    fn probe(&self, _instrumented_svg: &str) -> Result<Vec<ElementRecord>, OracleError> {
        Ok(svgdeck_oracle_contract::parse_payload(&self.payload)?)
    }
}

/// Read-only `ElementId -> Snapshot` table.
#[derive(Debug, Clone, Default)]
pub struct OracleTable {
    records: HashMap<NodeId, ElementRecord>,
    order: Vec<NodeId>,
}

impl OracleTable {
    /// Correlates records with the document by index. Records pointing at a
    /// missing node, or at a node with a different tag, are dropped.
    pub fn from_records(doc: &Document, records: Vec<ElementRecord>) -> OracleTable {
        let mut table = OracleTable::default();
        for record in records {
            if record.idx >= doc.len() {
                tracing::debug!(idx = record.idx, "oracle record for unknown element");
                continue;
            }
            let id = NodeId::new(record.idx);
            let node = doc.get(id);
            if !node.is_element()
                || (!record.tag_name.is_empty() && !record.tag_name.eq_ignore_ascii_case(node.tag_name()))
            {
                tracing::debug!(
                    idx = record.idx,
                    reported = %record.tag_name,
                    actual = node.tag_name(),
                    "oracle record does not match element"
                );
                continue;
            }
            if table.records.insert(id, record).is_none() {
                table.order.push(id);
            }
        }
        table
    }

    /// Instruments `doc`, runs the oracle once and builds the table.
    pub fn load(doc: &Document, oracle: &dyn StyleOracle) -> Result<OracleTable, OracleError> {
        let instrumented = instrument(doc);
        let records = oracle.probe(&instrumented)?;
        if records.is_empty() && doc.elements().next().is_some() {
            return Err(OracleError::Protocol("oracle returned no records".to_string()));
        }
        Ok(OracleTable::from_records(doc, records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&ElementRecord> {
        self.records.get(&id)
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.get(id)?.style(property)
    }

    pub fn bbox(&self, id: NodeId) -> Option<BoundingBox> {
        self.get(id)?.bbox
    }

    pub fn ctm(&self, id: NodeId) -> Option<Matrix> {
        self.get(id)?.ctm.map(Matrix::from)
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|r| r.is_hidden)
    }

    /// Elements the oracle reported as visible, in the order it reported them.
    pub fn visible(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(move |id| !self.is_hidden(*id))
    }
}

/// Serializes `doc` with the index attribute on every element.
pub fn instrument(doc: &Document) -> String {
    let mut out = String::new();
    write_node(doc.root(), doc, &mut out);
    out
}

fn write_node(node: Node<'_>, doc: &Document, out: &mut String) {
    if let Some(text) = node.text() {
        escape_into(text, false, out);
        return;
    }
    let tag = node.tag_name();
    out.push('<');
    out.push_str(tag);
    if node.parent().is_none() {
        for (prefix, uri) in doc.namespaces() {
            match prefix {
                Some(prefix) if prefix != "xml" => {
                    let _ = write!(out, " xmlns:{prefix}=\"");
                }
                Some(_) => continue,
                None => out.push_str(" xmlns=\""),
            }
            escape_into(uri, true, out);
            out.push('"');
        }
    }
    for attr in node.attributes() {
        if attr.prefix.is_none() && attr.name == INDEX_ATTRIBUTE {
            continue;
        }
        let _ = write!(out, " {}=\"", attr.qualified_name());
        escape_into(&attr.value, true, out);
        out.push('"');
    }
    let _ = write!(out, " {INDEX_ATTRIBUTE}=\"{}\"", node.id());
    let mut children = node.children().peekable();
    if children.peek().is_none() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in children {
        write_node(child, doc, out);
    }
    let _ = write!(out, "</{tag}>");
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink"><defs><marker id="m"><path d="M0 0"/></marker></defs><rect title="a&amp;b &quot;q&quot;" width="4" height="2"/><text>x &lt; y</text><use xlink:href="#m"/></svg>"##;

    #[test]
    fn instrumented_document_round_trips_with_indices() {
        let doc = Document::parse(SVG).expect("parse");
        let xml = instrument(&doc);
        let again = Document::parse(&xml).expect("instrumented output must parse");
        assert_eq!(again.len(), doc.len());
        for (a, b) in doc.elements().zip(again.elements()) {
            assert_eq!(a.tag_name(), b.tag_name());
            assert_eq!(b.attribute(INDEX_ATTRIBUTE), Some(a.id().to_string().as_str()));
        }
        let rect = again.elements().find(|n| n.has_tag_name("rect")).expect("rect");
        assert_eq!(rect.attribute("title"), Some("a&b \"q\""));
        let text = again.elements().find(|n| n.has_tag_name("text")).expect("text");
        assert_eq!(text.text_content(), "x < y");
        let use_el = again.elements().find(|n| n.has_tag_name("use")).expect("use");
        assert_eq!(use_el.attributes()[0].qualified_name(), "xlink:href");
    }

    fn record_json(idx: usize, tag: &str, extra: &str) -> String {
        format!(r#"{{"idx":{idx},"tagName":"{tag}","styles":{{}},"attrs":{{}}{extra}}}"#)
    }

    #[test]
    fn table_correlates_records_by_index() {
        let doc = Document::parse(SVG).expect("parse");
        let rect = doc.elements().find(|n| n.has_tag_name("rect")).expect("rect");
        let path = doc.elements().find(|n| n.has_tag_name("path")).expect("path");
        let payload = format!(
            "[{},{},{},{}]",
            record_json(
                rect.id().index(),
                "rect",
                r#","bbox":{"x":0,"y":0,"width":4,"height":2},"ctm":{"a":1,"b":0,"c":0,"d":1,"e":3,"f":0}"#
            ),
            record_json(path.id().index(), "path", r#","isHidden":true"#),
            record_json(999, "rect", ""),
            record_json(0, "circle", ""),
        );
        let table = OracleTable::load(&doc, &StaticOracle::new(payload)).expect("load");
        assert_eq!(table.len(), 2);
        assert_eq!(table.bbox(rect.id()).map(|b| b.width), Some(4.0));
        assert_eq!(table.ctm(rect.id()), Some(Matrix::translate(3.0, 0.0)));
        assert!(table.is_hidden(path.id()));
        assert_eq!(table.visible().collect::<Vec<_>>(), vec![rect.id()]);
        assert!(table.get(NodeId::new(0)).is_none());
    }

    #[test]
    fn empty_or_broken_payloads_are_oracle_errors() {
        let doc = Document::parse(SVG).expect("parse");
        assert!(matches!(
            OracleTable::load(&doc, &StaticOracle::new("[]")),
            Err(OracleError::Protocol(_))
        ));
        assert!(matches!(
            OracleTable::load(&doc, &StaticOracle::new("not json")),
            Err(OracleError::Json(_))
        ));
    }
}
