use crate::error::SvgDeckError;
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use ttf_parser::GlyphId;

/// Advance used per character when a family is not registered, as a fraction
/// of the font size.
const FALLBACK_ADVANCE: f64 = 0.6;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Pt>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            let Some(old) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&old);
        }
    }
}

/// Font faces available for text measurement, looked up by family, full or
/// PostScript name (case-insensitive).
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub struct RegisteredFont {
    pub name: String,
    data: Vec<u8>,
    metrics: FontMetrics,
}

/// Latin-1 advance table in 1/1000 em, with pairwise kerning.
#[derive(Debug)]
struct FontMetrics {
    first_char: u8,
    last_char: u8,
    widths: Vec<u16>,
    glyph_ids: Vec<u16>,
    missing_width: u16,
    kerning: HashMap<(u16, u16), i16>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Registers every `.ttf`/`.otf` file directly inside `path`. Files that
    /// fail to load are skipped. Returns the number of faces added.
    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> Result<usize, SvgDeckError> {
        let mut added = 0;
        for entry in fs::read_dir(path.as_ref())?.flatten() {
            let path = entry.path();
            if !path.is_file() || !has_font_extension(&path) {
                continue;
            }
            match self.register_file(&path) {
                Ok(_) => added += 1,
                Err(err) => tracing::debug!(path = %path.display(), %err, "skipping font file"),
            }
        }
        Ok(added)
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String, SvgDeckError> {
        let path = path.as_ref();
        if !has_font_extension(path) {
            return Err(SvgDeckError::Asset(format!(
                "not a ttf/otf font: {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        self.register(data, path)
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, SvgDeckError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        self.register(data, Path::new(source))
    }

    fn register(&mut self, data: Vec<u8>, source: &Path) -> Result<String, SvgDeckError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            SvgDeckError::Asset(format!("invalid font data for {}: {err}", source.display()))
        })?;
        let (name, aliases) = font_names(&face, source);
        let metrics = FontMetrics::from_face(&face);
        drop(face);

        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
        });
        for alias in std::iter::once(name.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        tracing::debug!(font = %name, "registered font");
        Ok(name)
    }

    pub fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        let key = normalize_name(name);
        self.lookup
            .get(&key)
            .and_then(|index| self.fonts.get(*index))
    }

    /// Advance width of a single line of `text` at `font_size`, in the same
    /// unit as `font_size`. Unknown families get a flat per-character estimate.
    pub fn measure_text_width(&self, name: &str, font_size: Pt, text: &str) -> Pt {
        let key = normalize_name(name);
        let Some((index, font)) = self
            .lookup
            .get(&key)
            .and_then(|index| self.fonts.get(*index).map(|font| (*index, font)))
        else {
            return fallback_width(font_size, text);
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let value = if font.metrics.is_within_table(text) {
            font.metrics.measure_text_width(font_size, text)
        } else {
            measure_text_width_full(font, font_size, text)
                .unwrap_or_else(|| font.metrics.measure_text_width(font_size, text))
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }
}

fn fallback_width(font_size: Pt, text: &str) -> Pt {
    let char_width = (font_size * FALLBACK_ADVANCE).max(Pt::from_f32(1.0));
    char_width * (text.chars().count() as i32)
}

fn has_font_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|v| v.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"))
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let glyph_ids = build_glyph_ids(face, first_char, last_char);
        let widths = build_widths(face, scale, first_char, last_char);
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);
        let kerning = build_kerning_pairs(face, &glyph_ids, scale);
        Self {
            first_char,
            last_char,
            widths,
            glyph_ids,
            missing_width,
            kerning,
        }
    }

    fn table_index(&self, ch: char) -> Option<usize> {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        (first..=last)
            .contains(&code)
            .then(|| (code - first) as usize)
    }

    fn measure_text_width(&self, font_size: Pt, text: &str) -> Pt {
        let mut total_units: i32 = 0;
        let mut prev: Option<u16> = None;
        for ch in text.chars() {
            let idx = self.table_index(ch);
            let gid = idx
                .and_then(|i| self.glyph_ids.get(i).copied())
                .unwrap_or(0);
            let adv = idx
                .and_then(|i| self.widths.get(i).copied())
                .unwrap_or(self.missing_width);
            total_units = total_units.saturating_add(adv as i32);
            if let Some(k) = prev.and_then(|p| self.kerning.get(&(p, gid))) {
                total_units = total_units.saturating_add(*k as i32);
            }
            prev = Some(gid);
        }
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }

    fn is_within_table(&self, text: &str) -> bool {
        text.chars().all(|ch| self.table_index(ch).is_some())
    }
}

fn build_glyph_ids(face: &ttf_parser::Face<'_>, first: u8, last: u8) -> Vec<u16> {
    (first..=last)
        .map(|code| {
            char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .map(|g| g.0)
                .unwrap_or(0)
        })
        .collect()
}

fn build_widths(face: &ttf_parser::Face<'_>, scale: f32, first: u8, last: u8) -> Vec<u16> {
    (first..=last)
        .map(|code| {
            let width = char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(0);
            let scaled = (width as f32 * scale).round() as i32;
            scaled.clamp(0, u16::MAX as i32) as u16
        })
        .collect()
}

fn build_kerning_pairs(
    face: &ttf_parser::Face<'_>,
    glyph_ids: &[u16],
    scale: f32,
) -> HashMap<(u16, u16), i16> {
    let mut out = HashMap::new();
    let Some(kern) = face.tables().kern else {
        return out;
    };

    let subtables: Vec<_> = kern
        .subtables
        .into_iter()
        .filter(|s| s.horizontal && !s.has_cross_stream && !s.has_state_machine)
        .collect();
    if subtables.is_empty() {
        return out;
    }

    for &left in glyph_ids.iter().filter(|g| **g != 0) {
        for &right in glyph_ids.iter().filter(|g| **g != 0) {
            let total: i32 = subtables
                .iter()
                .filter_map(|sub| sub.glyphs_kerning(GlyphId(left), GlyphId(right)))
                .map(i32::from)
                .sum();
            if total == 0 {
                continue;
            }
            let clamped = total.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            let scaled = scale_i16(clamped, scale);
            if scaled != 0 {
                out.insert((left, right), scaled);
            }
        }
    }
    out
}

/// Shapes `text` with rustybuzz; used for anything outside the Latin-1 table
/// (CJK labels, combining marks, right-to-left runs).
fn measure_text_width_full(font: &RegisteredFont, font_size: Pt, text: &str) -> Option<Pt> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let total_units = positions.iter().fold(0i32, |acc, pos| {
        let adv = (((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em) as i32;
        acc.saturating_add(adv)
    });
    if total_units <= 0 {
        return Some(Pt::ZERO);
    }
    Some(font_size.mul_ratio(total_units, 1000))
}

fn detect_direction(text: &str) -> HbDirection {
    let rtl = text.chars().any(|ch| {
        matches!(
            ch as u32,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        )
    });
    if rtl {
        HbDirection::RightToLeft
    } else {
        HbDirection::LeftToRight
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        let slot = match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => &mut family,
            name_id::FULL_NAME => &mut full,
            name_id::POST_SCRIPT_NAME => &mut post,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(name);
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = family
        .clone()
        .or_else(|| full.clone())
        .or_else(|| post.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let aliases = [family, full, post, stem]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();

    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_family_uses_flat_advance() {
        let fonts = FontRegistry::new();
        let width = fonts.measure_text_width("No Such Font", Pt::from_f64(10.0), "abcd");
        assert_eq!(width.to_f64(), 24.0);
        // Tiny sizes still advance at least one unit per character.
        let tiny = fonts.measure_text_width("No Such Font", Pt::from_f64(0.5), "ab");
        assert_eq!(tiny.to_f64(), 2.0);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let mut fonts = FontRegistry::new();
        let err = fonts
            .register_bytes(b"definitely not a font".to_vec(), Some("bad.ttf"))
            .expect_err("must reject");
        assert!(matches!(err, SvgDeckError::Asset(_)));
        assert!(fonts.is_empty());
        assert!(fonts.resolve("bad").is_none());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let mut fonts = FontRegistry::new();
        let err = fonts
            .register_dir("/nonexistent/svgdeck-font-dir")
            .expect_err("missing dir");
        assert!(matches!(err, SvgDeckError::Io(_)));
    }

    #[test]
    fn names_normalize_quotes_and_case() {
        assert_eq!(normalize_name("  \"Malgun Gothic\" "), "malgun gothic");
        assert_eq!(normalize_name("'Arial'"), "arial");
    }

    #[test]
    fn arabic_runs_shape_right_to_left() {
        assert_eq!(detect_direction("abc"), HbDirection::LeftToRight);
        assert_eq!(detect_direction("abc \u{0627}"), HbDirection::RightToLeft);
    }

    #[test]
    fn width_cache_evicts_oldest() {
        let mut cache = TextWidthCache::new(1);
        let key = |t: &str| TextWidthKey {
            font_index: 0,
            size_milli: 1000,
            text: t.to_string(),
        };
        cache.insert(key("a"), Pt::from_f64(1.0));
        cache.insert(key("b"), Pt::from_f64(2.0));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.get(&key("b")), Some(Pt::from_f64(2.0)));
    }
}
