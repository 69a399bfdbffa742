// Arena element tree.
//
// Nodes live in one Vec in document order; children are index lists and the
// parent is an explicit index, so the tree has no reference cycles. A node's
// index doubles as the stable element id the oracle echoes back.

use crate::error::{Result, SvgDeckError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element { tag: String, attrs: Vec<Attribute> },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Owned SVG document. Contains element and text nodes only; comments and
/// processing instructions are dropped while parsing.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    namespaces: Vec<(Option<String>, String)>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Document> {
        let xml = roxmltree::Document::parse(text)?;
        let root = xml.root_element();
        let mut doc = Document {
            nodes: Vec::new(),
            namespaces: root
                .namespaces()
                .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
                .collect(),
        };
        doc.append(root, None);
        Ok(doc)
    }

    /// Decodes raw bytes, honouring a UTF-8 BOM and the XML declaration.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Document> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let text = std::str::from_utf8(bytes)
            .map_err(|err| SvgDeckError::Encoding(format!("input is not valid utf-8: {err}")))?;
        if let Some(encoding) = declared_encoding(text) {
            let normalized = encoding.to_ascii_lowercase();
            if !matches!(normalized.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
                return Err(SvgDeckError::Encoding(format!(
                    "unsupported declared encoding {encoding}"
                )));
            }
        }
        Document::parse(text)
    }

    fn append(&mut self, node: roxmltree::Node<'_, '_>, parent: Option<NodeId>) -> Option<NodeId> {
        let kind = if node.is_element() {
            let attrs = node
                .attributes()
                .map(|attr| Attribute {
                    prefix: attr
                        .namespace()
                        .and_then(|ns| node.lookup_prefix(ns))
                        .map(str::to_string),
                    name: attr.name().to_string(),
                    value: attr.value().to_string(),
                })
                .collect();
            NodeKind::Element {
                tag: node.tag_name().name().to_string(),
                attrs,
            }
        } else if node.is_text() {
            NodeKind::Text(node.text().unwrap_or_default().to_string())
        } else {
            return None;
        };

        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeData {
            parent,
            children: Vec::new(),
            kind,
        });
        for child in node.children() {
            if let Some(child_id) = self.append(child, Some(id)) {
                self.nodes[id.index()].children.push(child_id);
            }
        }
        Some(id)
    }

    pub fn root(&self) -> Node<'_> {
        self.get(NodeId::new(0))
    }

    pub fn get(&self, id: NodeId) -> Node<'_> {
        Node {
            id,
            d: &self.nodes[id.index()],
            doc: self,
        }
    }

    /// Namespace declarations in scope on the root element, as (prefix, uri).
    pub fn namespaces(&self) -> &[(Option<String>, String)] {
        &self.namespaces
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in document order.
    pub fn descendants(&self) -> impl Iterator<Item = Node<'_>> {
        (0..self.nodes.len()).map(|i| self.get(NodeId::new(i)))
    }

    pub fn elements(&self) -> impl Iterator<Item = Node<'_>> {
        self.descendants().filter(|n| n.is_element())
    }

    pub fn element_by_id(&self, id: &str) -> Option<Node<'_>> {
        self.elements().find(|n| n.attribute("id") == Some(id))
    }
}

#[derive(Clone, Copy)]
pub struct Node<'a> {
    id: NodeId,
    d: &'a NodeData,
    doc: &'a Document,
}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_element(&self) -> bool {
        matches!(self.d.kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.d.kind, NodeKind::Text(_))
    }

    /// Local tag name; empty for text nodes.
    pub fn tag_name(&self) -> &'a str {
        match &self.d.kind {
            NodeKind::Element { tag, .. } => tag,
            NodeKind::Text(_) => "",
        }
    }

    pub fn has_tag_name(&self, name: &str) -> bool {
        self.tag_name() == name
    }

    pub fn attributes(&self) -> &'a [Attribute] {
        match &self.d.kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.attributes()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Attribute value, treating an empty or blank value as absent.
    pub fn non_empty_attribute(&self, name: &str) -> Option<&'a str> {
        self.attribute(name).filter(|v| !v.trim().is_empty())
    }

    /// Attribute parsed as a plain number; unit suffixes make it absent.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.attribute(name).and_then(crate::units::parse_number)
    }

    pub fn text(&self) -> Option<&'a str> {
        match &self.d.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.d.parent.map(|id| self.doc.get(id))
    }

    /// Parent, grandparent, ... up to the root. Does not include `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'a>> + use<'a> {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + use<'a> {
        let doc = self.doc;
        self.d.children.iter().map(move |id| doc.get(*id))
    }

    pub fn element_children(&self) -> impl Iterator<Item = Node<'a>> + use<'a> {
        self.children().filter(|n| n.is_element())
    }

    /// Every node below `self` in document order, excluding `self`. Arena
    /// order is pre-order, so a subtree is a contiguous index range.
    pub fn descendants(&self) -> impl Iterator<Item = Node<'a>> + use<'a> {
        let doc = self.doc;
        let start = self.id.index() + 1;
        let end = self.subtree_end();
        (start..end).map(move |i| doc.get(NodeId::new(i)))
    }

    fn subtree_end(&self) -> usize {
        let mut node = *self;
        loop {
            match node.d.children.last() {
                Some(last) => node = self.doc.get(*last),
                None => return node.id.index() + 1,
            }
        }
    }

    pub fn first_descendant(&self, tag: &str) -> Option<Node<'a>> {
        self.descendants().find(|n| n.has_tag_name(tag))
    }

    pub fn first_child_element(&self, tag: &str) -> Option<Node<'a>> {
        self.element_children().find(|n| n.has_tag_name(tag))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        if let Some(text) = self.text() {
            return text.to_string();
        }
        self.descendants().filter_map(|n| n.text()).collect()
    }

    /// True when any ancestor has one of the given tags.
    pub fn is_inside(&self, tags: &[&str]) -> bool {
        self.ancestors().any(|a| tags.contains(&a.tag_name()))
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.d.kind {
            NodeKind::Element { tag, .. } => write!(f, "Element({}, {})", self.id, tag),
            NodeKind::Text(text) => write!(f, "Text({}, {:?})", self.id, text),
        }
    }
}

fn declared_encoding(text: &str) -> Option<&str> {
    let decl = text.trim_start().strip_prefix("<?xml")?;
    let decl = &decl[..decl.find("?>")?];
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 10 10">
  <!-- comment -->
  <g id="grp" transform="translate(1 2)">
    <rect x="1" y="1" width="2" height="2"/>
    <text x="0" y="5"><tspan>Hello</tspan> <tspan>World</tspan></text>
  </g>
  <use xlink:href="#grp"/>
</svg>"##;

    #[test]
    fn builds_arena_in_document_order() {
        let doc = Document::parse(SVG).expect("parse");
        let root = doc.root();
        assert!(root.has_tag_name("svg"));
        assert_eq!(root.id(), NodeId::new(0));
        let tags: Vec<&str> = doc.elements().map(|n| n.tag_name()).collect();
        assert_eq!(tags, vec!["svg", "g", "rect", "text", "tspan", "tspan", "use"]);
        let ids: Vec<usize> = doc.descendants().map(|n| n.id().index()).collect();
        assert_eq!(ids, (0..doc.len()).collect::<Vec<_>>());
    }

    #[test]
    fn parent_and_child_links_agree() {
        let doc = Document::parse(SVG).expect("parse");
        for node in doc.descendants() {
            for child in node.children() {
                assert_eq!(child.parent().map(|p| p.id()), Some(node.id()));
            }
        }
        let rect = doc.elements().find(|n| n.has_tag_name("rect")).expect("rect");
        let chain: Vec<&str> = rect.ancestors().map(|n| n.tag_name()).collect();
        assert_eq!(chain, vec!["g", "svg"]);
        assert!(rect.is_inside(&["g"]));
        assert!(!rect.is_inside(&["defs", "marker"]));
    }

    #[test]
    fn keeps_namespaced_attribute_prefixes() {
        let doc = Document::parse(SVG).expect("parse");
        let use_el = doc.elements().find(|n| n.has_tag_name("use")).expect("use");
        assert_eq!(use_el.attribute("href"), Some("#grp"));
        assert_eq!(use_el.attributes()[0].qualified_name(), "xlink:href");
        assert_eq!(doc.element_by_id("grp").map(|n| n.tag_name()), Some("g"));
        assert!(
            doc.namespaces()
                .iter()
                .any(|(prefix, uri)| prefix.as_deref() == Some("xlink")
                    && uri == "http://www.w3.org/1999/xlink")
        );
    }

    #[test]
    fn text_content_spans_descendants() {
        let doc = Document::parse(SVG).expect("parse");
        let text = doc.elements().find(|n| n.has_tag_name("text")).expect("text");
        assert_eq!(text.text_content(), "Hello World");
        assert_eq!(text.descendants().filter(|n| n.is_element()).count(), 2);
        assert_eq!(
            text.first_descendant("tspan").map(|n| n.text_content()),
            Some("Hello".to_string())
        );
    }

    #[test]
    fn malformed_xml_is_fatal() {
        let err = Document::parse("<svg><g></svg>");
        assert!(matches!(err, Err(SvgDeckError::Xml(_))));
    }

    #[test]
    fn rejects_undecodable_input() {
        let err = Document::parse_bytes(b"<svg>\xff</svg>");
        assert!(matches!(err, Err(SvgDeckError::Encoding(_))));
        let latin = br#"<?xml version="1.0" encoding="ISO-8859-1"?><svg/>"#;
        assert!(matches!(
            Document::parse_bytes(latin),
            Err(SvgDeckError::Encoding(_))
        ));
        let ok = b"\xEF\xBB\xBF<?xml version='1.0' encoding='UTF-8'?><svg/>";
        assert!(Document::parse_bytes(ok).is_ok());
    }
}
