// Per-element style resolution.
//
// Each property is looked up through an ordered list of strategies and the
// first one that yields a value wins. There is no cascade and no inheritance:
// an element's style is its oracle snapshot, optionally its inline `style=""`
// declarations, then its own presentation attributes.

use crate::dom::Node;
use crate::oracle::OracleTable;
use crate::shape::{ShapeStyle, Stroke};
use crate::types::{Color, Pt};
use crate::units::{dash_pattern, is_none_or_transparent, parse_color, parse_length, strip_important};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StyleProperty {
    Fill,
    Stroke,
    StrokeWidth,
    StrokeDasharray,
    FontSize,
    FontFamily,
    FontWeight,
    TextAnchor,
    MarkerStart,
    MarkerEnd,
    Color,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 11] = [
        StyleProperty::Fill,
        StyleProperty::Stroke,
        StyleProperty::StrokeWidth,
        StyleProperty::StrokeDasharray,
        StyleProperty::FontSize,
        StyleProperty::FontFamily,
        StyleProperty::FontWeight,
        StyleProperty::TextAnchor,
        StyleProperty::MarkerStart,
        StyleProperty::MarkerEnd,
        StyleProperty::Color,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StyleProperty::Fill => "fill",
            StyleProperty::Stroke => "stroke",
            StyleProperty::StrokeWidth => "stroke-width",
            StyleProperty::StrokeDasharray => "stroke-dasharray",
            StyleProperty::FontSize => "font-size",
            StyleProperty::FontFamily => "font-family",
            StyleProperty::FontWeight => "font-weight",
            StyleProperty::TextAnchor => "text-anchor",
            StyleProperty::MarkerStart => "marker-start",
            StyleProperty::MarkerEnd => "marker-end",
            StyleProperty::Color => "color",
        }
    }

    pub fn from_name(name: &str) -> Option<StyleProperty> {
        StyleProperty::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Resolved values for one element. Absent properties are simply missing, so
/// "not specified" and an explicit `none` stay distinguishable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSet {
    values: BTreeMap<StyleProperty, String>,
}

impl StyleSet {
    pub fn get(&self, prop: StyleProperty) -> Option<&str> {
        self.values.get(&prop).map(String::as_str)
    }

    pub fn contains(&self, prop: StyleProperty) -> bool {
        self.values.contains_key(&prop)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StyleProperty, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// `self` layered over `base`: entries present in `self` win.
    pub fn over(&self, base: &StyleSet) -> StyleSet {
        let mut values = base.values.clone();
        values.extend(self.values.iter().map(|(k, v)| (*k, v.clone())));
        StyleSet { values }
    }

    /// Font size in pixels, `default_px` when missing or unparsable.
    pub fn font_size_px(&self, default_px: f64) -> f64 {
        self.get(StyleProperty::FontSize)
            .and_then(parse_length)
            .filter(|v| *v > 0.0)
            .unwrap_or(default_px)
    }
}

impl FromIterator<(StyleProperty, String)> for StyleSet {
    fn from_iter<T: IntoIterator<Item = (StyleProperty, String)>>(iter: T) -> Self {
        StyleSet {
            values: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStrategy {
    /// Computed style reported by the oracle. Paint sentinels (`none`,
    /// `transparent`, `rgba(0, 0, 0, 0)`) count as "no answer".
    Oracle,
    /// Declarations in the element's own `style` attribute.
    InlineStyle,
    /// The element's presentation attribute of the same name.
    Attribute,
}

pub struct StyleResolver<'a> {
    oracle: Option<&'a OracleTable>,
    chain: Vec<ResolverStrategy>,
}

impl<'a> StyleResolver<'a> {
    pub fn new(oracle: Option<&'a OracleTable>, inline_style: bool) -> Self {
        let chain = if inline_style {
            vec![
                ResolverStrategy::Oracle,
                ResolverStrategy::InlineStyle,
                ResolverStrategy::Attribute,
            ]
        } else {
            vec![ResolverStrategy::Oracle, ResolverStrategy::Attribute]
        };
        Self::with_chain(oracle, chain)
    }

    pub fn with_chain(oracle: Option<&'a OracleTable>, chain: Vec<ResolverStrategy>) -> Self {
        Self { oracle, chain }
    }

    pub fn oracle(&self) -> Option<&'a OracleTable> {
        self.oracle
    }

    pub fn chain(&self) -> &[ResolverStrategy] {
        &self.chain
    }

    pub fn resolve(&self, node: Node<'_>, prop: StyleProperty) -> Option<String> {
        self.chain
            .iter()
            .find_map(|strategy| self.lookup(*strategy, node, prop))
    }

    fn lookup(&self, strategy: ResolverStrategy, node: Node<'_>, prop: StyleProperty) -> Option<String> {
        match strategy {
            ResolverStrategy::Oracle => {
                let value = self.oracle?.style(node.id(), prop.name())?.trim();
                if value.is_empty() || is_none_or_transparent(value) {
                    return None;
                }
                Some(value.to_string())
            }
            ResolverStrategy::InlineStyle => {
                let style = node.non_empty_attribute("style")?;
                inline_declarations(style).remove(&prop)
            }
            ResolverStrategy::Attribute => node
                .non_empty_attribute(prop.name())
                .map(|v| v.trim().to_string()),
        }
    }

    /// Resolves the whole property set in one pass.
    pub fn style_for(&self, node: Node<'_>) -> StyleSet {
        StyleProperty::ALL
            .into_iter()
            .filter_map(|prop| self.resolve(node, prop).map(|v| (prop, v)))
            .collect()
    }
}

/// Declarations from a `style` attribute that name a resolvable property.
/// Important declarations override normal ones.
pub fn inline_declarations(input: &str) -> BTreeMap<StyleProperty, String> {
    let mut out = BTreeMap::new();
    if let Ok(style_attr) = StyleAttribute::parse(input, ParserOptions::default()) {
        let block = &style_attr.declarations;
        for prop in block
            .declarations
            .iter()
            .chain(block.important_declarations.iter())
        {
            let id = prop.property_id();
            let Some(key) = StyleProperty::from_name(id.name()) else {
                continue;
            };
            if let Ok(value) = prop.value_to_css_string(PrinterOptions::default()) {
                out.insert(key, value);
            }
        }
        return out;
    }
    inline_declarations_legacy(input)
}

fn inline_declarations_legacy(input: &str) -> BTreeMap<StyleProperty, String> {
    let mut normal = BTreeMap::new();
    let mut important = BTreeMap::new();
    for decl in input.split(';') {
        let Some((k, v)) = decl.split_once(':') else {
            continue;
        };
        let Some(key) = StyleProperty::from_name(&k.trim().to_ascii_lowercase()) else {
            continue;
        };
        let value = strip_important(v);
        if value.is_empty() {
            continue;
        }
        if v.to_ascii_lowercase().contains("!important") {
            important.insert(key, value.to_string());
        } else {
            normal.insert(key, value.to_string());
        }
    }
    normal.extend(important);
    normal
}

/// Fill colour for a shape, from the raw resolved `fill` value:
/// explicit `none`/`transparent` and a missing value paint nothing, a colour
/// paints, `url(...)` paints nothing and anything else unparsable is black.
/// Connectors only ever take a parsable colour.
pub fn resolve_fill(raw: Option<&str>, connector: bool) -> Option<Color> {
    let raw = raw?;
    if is_none_or_transparent(raw) {
        return None;
    }
    if let Some(color) = parse_color(raw) {
        return Some(color);
    }
    if connector || raw.contains("url(") {
        return None;
    }
    Some(Color::BLACK)
}

/// Fill and stroke for a shape. `scale` is the mapper scale; stroke widths are
/// mapped through it and held to `min_stroke_width`.
pub fn shape_style(style: &StyleSet, connector: bool, scale: f64, min_stroke_width: f64) -> ShapeStyle {
    let fill = resolve_fill(style.get(StyleProperty::Fill), connector);
    let stroke = style
        .get(StyleProperty::Stroke)
        .and_then(parse_color)
        .map(|color| {
            let width = match style.get(StyleProperty::StrokeWidth).and_then(parse_length) {
                Some(sw) => (sw * scale).max(min_stroke_width),
                None => scale,
            };
            Stroke {
                color,
                width: Pt::from_f64(width),
                dash: style
                    .get(StyleProperty::StrokeDasharray)
                    .and_then(dash_pattern),
            }
        });
    ShapeStyle { fill, stroke }
}

/// First family of a `font-family` list with quotes removed.
pub fn pick_font_family<'s>(style: &'s StyleSet, default_family: &'s str) -> &'s str {
    style
        .get(StyleProperty::FontFamily)
        .and_then(|list| {
            list.split(',')
                .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\'').trim())
                .find(|f| !f.is_empty())
        })
        .unwrap_or(default_family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::oracle::{OracleTable, StaticOracle};
    use crate::units::DashStyle;

    fn first<'d>(doc: &'d Document, tag: &str) -> Node<'d> {
        doc.elements().find(|n| n.has_tag_name(tag)).expect("element")
    }

    #[test]
    fn attributes_resolve_without_oracle() {
        let doc = Document::parse(
            r##"<svg><rect fill="#ff0000" stroke="none" stroke-width="2" font-size="12px" style="fill:#00ff00"/></svg>"##,
        )
        .expect("parse");
        let rect = first(&doc, "rect");
        let resolver = StyleResolver::new(None, false);
        let st = resolver.style_for(rect);
        assert_eq!(st.get(StyleProperty::Fill), Some("#ff0000"));
        // Explicit none from an attribute is kept.
        assert_eq!(st.get(StyleProperty::Stroke), Some("none"));
        assert_eq!(st.get(StyleProperty::StrokeWidth), Some("2"));
        assert!(!st.contains(StyleProperty::Color));
        assert_eq!(st.font_size_px(16.0), 12.0);
        assert_eq!(st.len(), 4);
    }

    #[test]
    fn no_inheritance_from_ancestors() {
        let doc = Document::parse(r##"<svg><g fill="#ff0000"><rect/></g></svg>"##).expect("parse");
        let st = StyleResolver::new(None, false).style_for(first(&doc, "rect"));
        assert!(st.is_empty());
    }

    #[test]
    fn oracle_wins_and_sentinels_fall_back_to_attributes() {
        let doc = Document::parse(
            r##"<svg><rect fill="#ff0000" stroke="#0000ff" color="red"/></svg>"##,
        )
        .expect("parse");
        let rect = first(&doc, "rect");
        let payload = format!(
            r#"[{{"idx":{},"tagName":"rect","styles":{{"fill":"rgb(1, 2, 3)","stroke":"none","color":"rgba(0, 0, 0, 0)","font-size":"14px"}}}}]"#,
            rect.id()
        );
        let table = OracleTable::load(&doc, &StaticOracle::new(payload)).expect("oracle");
        let resolver = StyleResolver::new(Some(&table), false);
        let st = resolver.style_for(rect);
        assert_eq!(st.get(StyleProperty::Fill), Some("rgb(1, 2, 3)"));
        assert_eq!(st.get(StyleProperty::Stroke), Some("#0000ff"));
        assert_eq!(st.get(StyleProperty::Color), Some("red"));
        assert_eq!(st.get(StyleProperty::FontSize), Some("14px"));
    }

    #[test]
    fn inline_style_strategy_is_opt_in() {
        let doc = Document::parse(
            r##"<svg><rect fill="#ff0000" style="stroke-width: 3 !important; fill: blue; marker-end: url(#arrow)"/></svg>"##,
        )
        .expect("parse");
        let rect = first(&doc, "rect");
        let plain = StyleResolver::new(None, false).style_for(rect);
        assert_eq!(plain.get(StyleProperty::Fill), Some("#ff0000"));
        assert!(!plain.contains(StyleProperty::StrokeWidth));

        let resolver = StyleResolver::new(None, true);
        assert_eq!(
            resolver.chain(),
            &[
                ResolverStrategy::Oracle,
                ResolverStrategy::InlineStyle,
                ResolverStrategy::Attribute
            ]
        );
        let st = resolver.style_for(rect);
        let fill = st.get(StyleProperty::Fill).and_then(parse_color);
        assert_eq!(fill.map(Color::to_hex).as_deref(), Some("0000FF"));
        assert_eq!(st.get(StyleProperty::StrokeWidth).and_then(parse_length), Some(3.0));
        assert!(st.get(StyleProperty::MarkerEnd).is_some_and(|v| v.contains("#arrow")));
    }

    #[test]
    fn legacy_inline_parser_strips_important() {
        let decls = inline_declarations_legacy("fill: red !important; fill: blue; bogus: 1; stroke:");
        assert_eq!(decls.get(&StyleProperty::Fill).map(String::as_str), Some("red"));
        assert!(!decls.contains_key(&StyleProperty::Stroke));
    }

    #[test]
    fn fill_defaulting_policy() {
        assert_eq!(resolve_fill(Some("none"), false), None);
        assert_eq!(resolve_fill(Some("transparent"), false), None);
        assert_eq!(resolve_fill(None, false), None);
        assert_eq!(resolve_fill(Some("url(#grad)"), false), None);
        assert_eq!(resolve_fill(Some("bogus"), false), Some(Color::BLACK));
        assert_eq!(resolve_fill(Some("bogus"), true), None);
        assert_eq!(
            resolve_fill(Some("#123456"), true),
            Some(Color::rgb(0x12, 0x34, 0x56))
        );
    }

    #[test]
    fn stroke_widths_map_through_scale_with_a_floor() {
        let st: StyleSet = [
            (StyleProperty::Stroke, "#000".to_string()),
            (StyleProperty::StrokeWidth, "2".to_string()),
            (StyleProperty::StrokeDasharray, "4 4".to_string()),
        ]
        .into_iter()
        .collect();
        let out = shape_style(&st, false, 0.5, 0.25);
        let stroke = out.stroke.expect("stroke");
        assert_eq!(stroke.width.to_f64(), 1.0);
        assert_eq!(stroke.dash, Some(DashStyle::Dashed));
        assert_eq!(out.fill, None);

        let thin = shape_style(&st, false, 0.1, 0.25).stroke.expect("stroke");
        assert_eq!(thin.width.to_f64(), 0.25);

        let no_width: StyleSet = [(StyleProperty::Stroke, "red".to_string())].into_iter().collect();
        let s = shape_style(&no_width, false, 0.75, 0.25).stroke.expect("stroke");
        assert_eq!(s.width.to_f64(), 0.75);

        let dashed_no_stroke: StyleSet = [(StyleProperty::StrokeDasharray, "4".to_string())]
            .into_iter()
            .collect();
        assert!(shape_style(&dashed_no_stroke, false, 1.0, 0.25).stroke.is_none());
    }

    #[test]
    fn picks_first_font_family() {
        let st: StyleSet = [(
            StyleProperty::FontFamily,
            "\"trebuchet ms\", verdana, arial".to_string(),
        )]
        .into_iter()
        .collect();
        assert_eq!(pick_font_family(&st, "Malgun Gothic"), "trebuchet ms");
        assert_eq!(pick_font_family(&StyleSet::default(), "Malgun Gothic"), "Malgun Gothic");
    }

    #[test]
    fn layered_styles_prefer_the_top_layer() {
        let base: StyleSet = [
            (StyleProperty::Fill, "red".to_string()),
            (StyleProperty::Stroke, "blue".to_string()),
        ]
        .into_iter()
        .collect();
        let top: StyleSet = [(StyleProperty::Fill, "green".to_string())].into_iter().collect();
        let merged = top.over(&base);
        assert_eq!(merged.get(StyleProperty::Fill), Some("green"));
        assert_eq!(merged.get(StyleProperty::Stroke), Some("blue"));
    }
}
