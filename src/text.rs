// Text blocks: line extraction, sibling grouping and box geometry.

use crate::dom::Node;
use crate::emit::Emitter;
use crate::mapper::Mapper;
use crate::shape::{Shape, TextAlign, TextLine};
use crate::style::{StyleProperty, StyleSet, pick_font_family};
use crate::types::{Color, Pt, Rect};
use crate::units::{is_none_or_transparent, parse_color, parse_length_with_font};

const LINE_HEIGHT: f64 = 1.35;
const BOX_PAD_X: f64 = 10.0;
const BOX_PAD_Y: f64 = 6.0;
/// Horizontal tolerance for grouping, in canvas units.
const GROUP_MAX_DX: f64 = 2.0;
const GROUP_MIN_DY_EM: f64 = 0.5;
const GROUP_MAX_DY_EM: f64 = 3.0;

// Mermaid's default node fills. A label whose fill is one of these but whose
// `color` is pure black is really styled through `color`. Narrow on purpose;
// do not extend without a diagram that needs it.
const DEFAULT_NODE_FILLS: [Color; 2] = [Color::rgb(0xEC, 0xEC, 0xFF), Color::rgb(0xEA, 0xEA, 0xEA)];

/// A `text` element together with its resolved style.
#[derive(Debug, Clone)]
pub struct TextRun<'a> {
    pub node: Node<'a>,
    pub style: StyleSet,
}

impl<'a> TextRun<'a> {
    pub fn new(node: Node<'a>, style: StyleSet) -> Self {
        Self { node, style }
    }
}

/// Visible text of a `text` element. Each non-blank `tspan` is one line;
/// without tspans the whole trimmed content is one line.
pub fn extract_text(node: Node<'_>) -> String {
    let mut tspans = node
        .descendants()
        .filter(|n| n.has_tag_name("tspan"))
        .peekable();
    if tspans.peek().is_none() {
        return node.text_content().trim().to_string();
    }
    tspans
        .map(|t| t.text_content().replace('\n', "").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn position(node: Node<'_>, name: &str) -> Option<f64> {
    match node.non_empty_attribute(name) {
        Some(_) => node.number(name),
        None => node.first_descendant("tspan").and_then(|t| t.number(name)),
    }
}

/// `x` of the element, else of its first `tspan`.
pub fn text_x(node: Node<'_>) -> Option<f64> {
    position(node, "x")
}

/// `y` of the element, else of its first `tspan`.
pub fn text_y(node: Node<'_>) -> Option<f64> {
    position(node, "y")
}

/// Vertical shift in pixels: the element's `dy` plus its first tspan's.
pub fn dy_px(node: Node<'_>, font_size_px: f64) -> f64 {
    let own = node
        .non_empty_attribute("dy")
        .and_then(|v| parse_length_with_font(v, font_size_px));
    let tspan = node
        .first_descendant("tspan")
        .and_then(|t| t.non_empty_attribute("dy"))
        .and_then(|v| parse_length_with_font(v, font_size_px));
    own.unwrap_or(0.0) + tspan.unwrap_or(0.0)
}

/// Whether `next` joins the block started by `first`: same font metadata,
/// aligned horizontally, and within a few lines of the block's first line.
pub fn can_group(first: &TextRun<'_>, next: &TextRun<'_>, mapper: &Mapper, default_font_px: f64) -> bool {
    let same = [
        StyleProperty::FontSize,
        StyleProperty::FontWeight,
        StyleProperty::TextAnchor,
        StyleProperty::FontFamily,
    ]
    .into_iter()
    .all(|p| first.style.get(p) == next.style.get(p));
    if !same {
        return false;
    }

    let (Some(x1), Some(x2)) = (text_x(first.node), text_x(next.node)) else {
        return false;
    };
    if mapper.len((x1 - x2).abs()) > GROUP_MAX_DX {
        return false;
    }

    let (Some(y1), Some(y2)) = (text_y(first.node), text_y(next.node)) else {
        return false;
    };
    let fs = first.style.font_size_px(default_font_px);
    let dy = (y1 - y2).abs();
    (fs * GROUP_MIN_DY_EM..=fs * GROUP_MAX_DY_EM).contains(&dy)
}

/// Glyph colour for the lines produced by one run.
pub(crate) fn line_color(em: &Emitter<'_>, run: &TextRun<'_>) -> Option<Color> {
    let mut fill = run.style.get(StyleProperty::Fill).map(str::to_string);
    let mut color = run.style.get(StyleProperty::Color).map(str::to_string);

    if let Some(tspan) = run.node.first_child_element("tspan") {
        let ts = em.resolver.style_for(tspan);
        if let Some(f) = ts.get(StyleProperty::Fill).filter(|v| !is_none_or_transparent(v)) {
            fill = Some(f.to_string());
        }
        let inherits_default = color.as_deref().is_none_or(|c| c == "rgb(0, 0, 0)");
        if let Some(c) = ts.get(StyleProperty::Color).filter(|v| !is_none_or_transparent(v)) {
            if inherits_default {
                color = Some(c.to_string());
            }
        }
    }

    let color = color.as_deref().and_then(parse_color);
    let fill = fill.as_deref().and_then(parse_color);
    match fill {
        Some(f) if DEFAULT_NODE_FILLS.contains(&f) && color == Some(Color::BLACK) => color,
        Some(f) => Some(f),
        None => color,
    }
}

/// One text block for a group of runs, or `None` when they hold no text.
pub(crate) fn text_block(em: &Emitter<'_>, runs: &[TextRun<'_>]) -> Option<Shape> {
    let first = runs.first()?;
    let mut lines: Vec<(String, usize)> = Vec::new();
    for (i, run) in runs.iter().enumerate() {
        let text = extract_text(run.node);
        lines.extend(
            text.split('\n')
                .filter(|l| !l.is_empty())
                .map(|l| (l.to_string(), i)),
        );
    }
    if lines.is_empty() {
        return None;
    }

    let fs_px = first.style.font_size_px(em.options.default_font_size_px);
    let font = pick_font_family(&first.style, &em.options.default_font_family).to_string();
    let font_size = Pt::from_f64(fs_px * em.mapper.scale() * em.options.font_scale);

    let (anchor, align) = match oracle_box(em, runs) {
        Some(found) => found,
        None => estimated_box(em, first, &lines, &font, fs_px),
    };

    let colors: Vec<Option<Color>> = runs.iter().map(|run| line_color(em, run)).collect();
    let paragraphs = lines
        .into_iter()
        .map(|(text, source)| TextLine {
            text,
            font_family: font.clone(),
            font_size,
            color: colors.get(source).copied().flatten(),
            align,
        })
        .collect();
    Some(Shape::TextBlock { anchor, paragraphs })
}

/// Union of the oracle boxes of all runs, projected to root space.
fn oracle_box(em: &Emitter<'_>, runs: &[TextRun<'_>]) -> Option<(Rect, TextAlign)> {
    let oracle = em.oracle?;
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    let mut align = TextAlign::Left;
    for run in runs {
        let Some(b) = oracle.bbox(run.node.id()) else {
            continue;
        };
        let (x0, y0, x1, y1) = em
            .full_transform(run.node)
            .map_rect(b.x, b.y, b.width, b.height);
        bounds = Some(match bounds {
            Some((a, b, c, d)) => (a.min(x0), b.min(y0), c.max(x1), d.max(y1)),
            None => (x0, y0, x1, y1),
        });
        match TextAlign::from_anchor(run.style.get(StyleProperty::TextAnchor)) {
            TextAlign::Left => {}
            other => align = other,
        }
    }
    let (x0, y0, x1, y1) = bounds?;
    Some((em.mapper.rect(x0, y0, x1, y1), align))
}

/// Box estimated from the first run's position and measured line widths,
/// vertically centered on the baseline position.
fn estimated_box(
    em: &Emitter<'_>,
    first: &TextRun<'_>,
    lines: &[(String, usize)],
    font: &str,
    fs_px: f64,
) -> (Rect, TextAlign) {
    let node = first.node;
    let tspans = || node.descendants().filter(|n| n.has_tag_name("tspan"));
    let x = node
        .number("x")
        .or_else(|| tspans().find_map(|t| t.number("x")))
        .unwrap_or(0.0);
    let y = node
        .number("y")
        .or_else(|| tspans().find_map(|t| t.number("y")))
        .unwrap_or(0.0);
    let (x, y) = em.full_transform(node).apply(x, y);
    let y = y + dy_px(node, fs_px);

    let width = lines
        .iter()
        .map(|(line, _)| em.fonts.measure_text_width(font, Pt::from_f64(fs_px), line).to_f64())
        .fold(0.0, f64::max)
        + BOX_PAD_X;
    let height = fs_px * LINE_HEIGHT * lines.len() as f64 + BOX_PAD_Y;

    let align = TextAlign::from_anchor(first.style.get(StyleProperty::TextAnchor));
    let left = match align {
        TextAlign::Center => x - width / 2.0,
        TextAlign::Right => x - width,
        TextAlign::Left => x,
    };
    let top = y - height / 2.0;
    (em.mapper.rect(left, top, left + width, top + height), align)
}
