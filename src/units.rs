// Scalar, length, colour and dash-pattern parsing.
//
// Every parser here is total: malformed input yields `None` and the caller
// supplies the default. Nothing in this module returns an error.

use crate::types::Color;
use serde::Serialize;

// Named colours understood by the converter. Anything else must be written
// as hex or rgb()/hsl().
const NAMED_COLORS: [(&str, Color); 11] = [
    ("black", Color::rgb(0x00, 0x00, 0x00)),
    ("white", Color::rgb(0xFF, 0xFF, 0xFF)),
    ("gray", Color::rgb(0x80, 0x80, 0x80)),
    ("grey", Color::rgb(0x80, 0x80, 0x80)),
    ("lightgrey", Color::rgb(0xD3, 0xD3, 0xD3)),
    ("lightgray", Color::rgb(0xD3, 0xD3, 0xD3)),
    ("darkgrey", Color::rgb(0xA9, 0xA9, 0xA9)),
    ("darkgray", Color::rgb(0xA9, 0xA9, 0xA9)),
    ("red", Color::rgb(0xFF, 0x00, 0x00)),
    ("green", Color::rgb(0x00, 0xFF, 0x00)),
    ("blue", Color::rgb(0x00, 0x00, 0xFF)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashStyle {
    Dotted,
    Dashed,
}

pub fn parse_number(input: &str) -> Option<f64> {
    let v = input.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Parses a length into pixels. `px`, `pt` and unitless values are converted;
/// `em` values come back unscaled because only the caller knows the font size.
pub fn parse_length(input: &str) -> Option<f64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(v) = s.strip_suffix("px") {
        return parse_number(v);
    }
    if let Some(v) = s.strip_suffix("pt") {
        return parse_number(v).map(|v| v * 96.0 / 72.0);
    }
    if let Some(v) = s.strip_suffix("em") {
        return parse_number(v);
    }
    parse_number(s)
}

/// Like [`parse_length`] but resolves `em` against `font_size_px`.
pub fn parse_length_with_font(input: &str, font_size_px: f64) -> Option<f64> {
    let v = parse_length(input)?;
    if input.trim().ends_with("em") {
        Some(v * font_size_px)
    } else {
        Some(v)
    }
}

pub fn strip_important(input: &str) -> &str {
    let lower = input.to_ascii_lowercase();
    match lower.find("!important") {
        Some(pos) => input[..pos].trim(),
        None => input.trim(),
    }
}

/// True for the paint values that mean "do not paint": `none`, `transparent`
/// and a fully transparent black, ignoring case, spacing and `!important`.
pub fn is_none_or_transparent(input: &str) -> bool {
    let v = strip_important(input);
    if v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("transparent") {
        return true;
    }
    let compact: String = v
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    compact == "rgba(0,0,0,0)"
}

pub fn parse_color(input: &str) -> Option<Color> {
    let v = strip_important(input);
    if v.is_empty() || is_none_or_transparent(v) {
        return None;
    }
    if let Some(hex) = v.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = v.to_ascii_lowercase();
    if let Some((_, color)) = NAMED_COLORS.iter().find(|(name, _)| *name == lower) {
        return Some(*color);
    }
    if let Some(args) = function_args(&lower, "rgba") {
        let [r, g, b, a] = numbers::<4>(args)?;
        if a == 0.0 {
            return None;
        }
        return Some(Color::rgb(channel(r), channel(g), channel(b)));
    }
    if let Some(args) = function_args(&lower, "rgb") {
        let [r, g, b] = numbers::<3>(args)?;
        return Some(Color::rgb(channel(r), channel(g), channel(b)));
    }
    if let Some(args) = function_args(&lower, "hsl") {
        let mut parts = args.split(',').map(str::trim);
        let h = parse_number(parts.next()?)?;
        let s = parse_number(parts.next()?.strip_suffix('%')?)?;
        let l = parse_number(parts.next()?.strip_suffix('%')?)?;
        if parts.next().is_some() {
            return None;
        }
        return Some(hsl_to_rgb(h, s, l));
    }
    None
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok();
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let (r, g, b) = (nibble(0)?, nibble(1)?, nibble(2)?);
            Some(Color::rgb(r * 17, g * 17, b * 17))
        }
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        _ => None,
    }
}

fn function_args<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(name)?.trim_start();
    rest.strip_prefix('(')?.strip_suffix(')')
}

fn numbers<const N: usize>(args: &str) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    let mut parts = args.split(',');
    for slot in out.iter_mut() {
        let v = parse_number(parts.next()?)?;
        if v < 0.0 {
            return None;
        }
        *slot = v;
    }
    parts.next().is_none().then_some(out)
}

fn channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Standard HSL to RGB over six 60 degree sectors. `s` and `l` are percentages.
/// Channels are truncated, not rounded.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Color {
    let h = h.rem_euclid(360.0);
    let s = (s / 100.0).clamp(0.0, 1.0);
    let l = (l / 100.0).clamp(0.0, 1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_byte = |v: f64| ((v + m) * 255.0).clamp(0.0, 255.0) as u8;
    Color::rgb(to_byte(r), to_byte(g), to_byte(b))
}

/// Classifies a dash array by its mean segment length: short dashes read as
/// dots. `None` means a solid line.
pub fn dash_pattern(input: &str) -> Option<DashStyle> {
    let v = strip_important(input);
    if v.is_empty() || v == "0" || is_none_or_transparent(v) {
        return None;
    }
    let values: Vec<f64> = v
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(parse_length)
        .collect();
    if values.is_empty() {
        return None;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    if avg <= 2.2 {
        Some(DashStyle::Dotted)
    } else {
        Some(DashStyle::Dashed)
    }
}

/// Splits a whitespace/comma separated number list, skipping bad tokens.
pub fn parse_number_list(input: &str) -> Vec<f64> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(parse_number)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_expands_and_ignores_case() {
        assert_eq!(parse_color("#abc"), parse_color("#AABBCC"));
        assert_eq!(parse_color("#abc").map(Color::to_hex).as_deref(), Some("AABBCC"));
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
    }

    #[test]
    fn transparent_values_do_not_paint() {
        assert_eq!(parse_color("rgba(0,0,0,0)"), None);
        assert_eq!(parse_color("rgba(10, 20, 30, 0)"), None);
        assert_eq!(parse_color("none"), None);
        assert_eq!(parse_color("NONE !important"), None);
        assert_eq!(parse_color("Transparent"), None);
        assert!(is_none_or_transparent("rgba(0, 0, 0, 0)"));
        assert!(!is_none_or_transparent("rgba(0, 0, 0, 0.5)"));
    }

    #[test]
    fn rgb_functions_round_each_channel() {
        let c = parse_color("rgb( 12.4 , 12.5,254.6 )").expect("rgb");
        assert_eq!(c.to_hex(), "0C0DFF");
        let c = parse_color("rgba(255, 0, 0, 0.5)").expect("rgba");
        assert_eq!(c.to_hex(), "FF0000");
        assert_eq!(parse_color("rgb(1, 2)"), None);
    }

    #[test]
    fn important_suffix_is_stripped() {
        assert_eq!(
            parse_color("#ff0000 !important").map(Color::to_hex).as_deref(),
            Some("FF0000")
        );
    }

    #[test]
    fn named_and_unsupported_colors() {
        assert_eq!(parse_color("Grey").map(Color::to_hex).as_deref(), Some("808080"));
        assert_eq!(parse_color("green").map(Color::to_hex).as_deref(), Some("00FF00"));
        assert_eq!(parse_color("url(#grad)"), None);
        assert_eq!(parse_color("rebeccapurple"), None);
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 100.0, 50.0).to_hex(), "FF0000");
        assert_eq!(hsl_to_rgb(120.0, 100.0, 50.0).to_hex(), "00FF00");
        assert_eq!(hsl_to_rgb(240.0, 100.0, 50.0).to_hex(), "0000FF");
        assert_eq!(
            parse_color("hsl(240, 100%, 50%)").map(Color::to_hex).as_deref(),
            Some("0000FF")
        );
        // 50% grey truncates 127.5 down.
        assert_eq!(hsl_to_rgb(0.0, 0.0, 50.0).to_hex(), "7F7F7F");
    }

    #[test]
    fn lengths_convert_units() {
        assert_eq!(parse_length("12"), Some(12.0));
        assert_eq!(parse_length(" 12px "), Some(12.0));
        assert_eq!(parse_length("12pt"), Some(16.0));
        assert_eq!(parse_length("1.5em"), Some(1.5));
        assert_eq!(parse_length_with_font("1.5em", 16.0), Some(24.0));
        assert_eq!(parse_length_with_font("3", 16.0), Some(3.0));
        assert_eq!(parse_length("abc"), None);
        assert_eq!(parse_length(""), None);
    }

    #[test]
    fn dash_patterns_bucket_by_average() {
        assert_eq!(dash_pattern("2 2"), Some(DashStyle::Dotted));
        assert_eq!(dash_pattern("2.2"), Some(DashStyle::Dotted));
        assert_eq!(dash_pattern("1,3"), Some(DashStyle::Dotted));
        assert_eq!(dash_pattern("5, 5"), Some(DashStyle::Dashed));
        assert_eq!(dash_pattern("3px 3px"), Some(DashStyle::Dashed));
        assert_eq!(dash_pattern("0"), None);
        assert_eq!(dash_pattern("none"), None);
        assert_eq!(dash_pattern(""), None);
        assert_eq!(dash_pattern("x y"), None);
    }
}
