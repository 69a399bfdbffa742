mod bbox;
mod dom;
mod emit;
mod error;
mod font;
mod mapper;
mod marker;
mod oracle;
mod path;
mod shape;
mod style;
mod text;
mod transform;
mod types;
mod units;

pub use bbox::{BBoxAggregator, DRAWABLE_TAGS, content_viewbox};
pub use dom::{Attribute, Document, Node, NodeId};
pub use emit::{Drawable, EmitOptions, Emitter};
pub use error::{OracleError, Result, SvgDeckError};
pub use font::FontRegistry;
pub use mapper::{Mapper, ViewBox, canvas_size, parse_viewbox};
pub use marker::{MarkerRegistry, MarkerUnits};
pub use oracle::{OracleTable, StaticOracle, StyleOracle, instrument};
pub use path::{PathBounds, PathSeg, arc_to_cubics, parse_path_data, path_bounds};
pub use shape::{
    DecorationKind, DecorationSize, LineDecoration, LineEnds, Shape, ShapeStyle, Slide, Stroke,
    TextAlign, TextLine,
};
pub use style::{ResolverStrategy, StyleProperty, StyleResolver, StyleSet};
pub use transform::{Matrix, full_transform, parse_transform};
pub use types::{Color, Pt, Rect, Size};
pub use units::{DashStyle, dash_pattern, hsl_to_rgb, parse_color, parse_length};

/// SVG-to-slide converter. Holds configuration and registered fonts; every
/// call to [`SvgDeck::convert`] is independent.
pub struct SvgDeck {
    canvas_floor: Size,
    margin: f64,
    default_viewbox: ViewBox,
    inline_style: bool,
    emit_options: EmitOptions,
    fonts: FontRegistry,
    oracle: Option<Box<dyn StyleOracle>>,
}

pub struct SvgDeckBuilder {
    canvas_floor: Size,
    margin: f64,
    default_viewbox: ViewBox,
    inline_style: bool,
    emit_options: EmitOptions,
    font_dirs: Vec<std::path::PathBuf>,
    font_files: Vec<std::path::PathBuf>,
    font_bytes: Vec<(Vec<u8>, Option<String>)>,
    oracle: Option<Box<dyn StyleOracle>>,
}

impl Default for SvgDeckBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgDeckBuilder {
    pub fn new() -> Self {
        Self {
            canvas_floor: Size::widescreen(),
            margin: 40.0,
            default_viewbox: ViewBox::default(),
            inline_style: false,
            emit_options: EmitOptions::default(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            oracle: None,
        }
    }

    /// Smallest canvas a slide may have. The canvas grows past it to fit
    /// content plus margin, never shrinks below it.
    pub fn canvas_floor(mut self, size: Size) -> Self {
        self.canvas_floor = size;
        self
    }

    pub fn margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Content bounds used when neither oracle boxes nor a `viewBox`
    /// attribute are available.
    pub fn default_viewbox(mut self, min_x: f64, min_y: f64, width: f64, height: f64) -> Self {
        self.default_viewbox = ViewBox::new(min_x, min_y, width, height);
        self
    }

    pub fn default_font_family(mut self, family: impl Into<String>) -> Self {
        self.emit_options.default_font_family = family.into();
        self
    }

    pub fn default_font_size_px(mut self, px: f64) -> Self {
        self.emit_options.default_font_size_px = px;
        self
    }

    pub fn font_scale(mut self, scale: f64) -> Self {
        self.emit_options.font_scale = scale;
        self
    }

    pub fn min_stroke_width(mut self, width: f64) -> Self {
        self.emit_options.min_stroke_width = width;
        self
    }

    // Reads `style=""` declarations between the oracle and plain attributes.
    pub fn inline_style(mut self, enabled: bool) -> Self {
        self.inline_style = enabled;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, data: Vec<u8>, source_name: Option<&str>) -> Self {
        self.font_bytes.push((data, source_name.map(str::to_string)));
        self
    }

    pub fn oracle(mut self, oracle: Box<dyn StyleOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn build(self) -> Result<SvgDeck> {
        let floor_w = self.canvas_floor.width.to_f64();
        let floor_h = self.canvas_floor.height.to_f64();
        if !(floor_w > 0.0 && floor_h > 0.0) {
            return Err(SvgDeckError::InvalidConfiguration(format!(
                "canvas_floor must be positive, got {floor_w}x{floor_h}"
            )));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(SvgDeckError::InvalidConfiguration(format!(
                "margin must be finite and >= 0, got {}",
                self.margin
            )));
        }
        let vb = self.default_viewbox;
        if !(vb.width > 0.0 && vb.height > 0.0) || !vb.min_x.is_finite() || !vb.min_y.is_finite() {
            return Err(SvgDeckError::InvalidConfiguration(
                "default_viewbox requires finite origin and width, height > 0".to_string(),
            ));
        }
        let opts = &self.emit_options;
        if opts.default_font_family.trim().is_empty() {
            return Err(SvgDeckError::InvalidConfiguration(
                "default_font_family must not be empty".to_string(),
            ));
        }
        if !(opts.default_font_size_px > 0.0 && opts.default_font_size_px.is_finite()) {
            return Err(SvgDeckError::InvalidConfiguration(format!(
                "default_font_size_px must be > 0, got {}",
                opts.default_font_size_px
            )));
        }
        if !(opts.font_scale > 0.0 && opts.font_scale.is_finite()) {
            return Err(SvgDeckError::InvalidConfiguration(format!(
                "font_scale must be > 0, got {}",
                opts.font_scale
            )));
        }
        if !opts.min_stroke_width.is_finite() || opts.min_stroke_width < 0.0 {
            return Err(SvgDeckError::InvalidConfiguration(format!(
                "min_stroke_width must be >= 0, got {}",
                opts.min_stroke_width
            )));
        }

        let mut fonts = FontRegistry::new();
        for dir in &self.font_dirs {
            let added = fonts.register_dir(dir)?;
            tracing::debug!(dir = %dir.display(), added, "registered font directory");
        }
        for file in &self.font_files {
            fonts.register_file(file)?;
        }
        for (data, name) in self.font_bytes {
            fonts.register_bytes(data, name.as_deref())?;
        }

        Ok(SvgDeck {
            canvas_floor: self.canvas_floor,
            margin: self.margin,
            default_viewbox: self.default_viewbox,
            inline_style: self.inline_style,
            emit_options: self.emit_options,
            fonts,
            oracle: self.oracle,
        })
    }
}

impl SvgDeck {
    pub fn builder() -> SvgDeckBuilder {
        SvgDeckBuilder::new()
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn emit_options(&self) -> &EmitOptions {
        &self.emit_options
    }

    /// Converts one SVG document. Fails only when the document itself cannot
    /// be parsed; everything else degrades to defaults.
    pub fn convert(&self, svg: &str) -> Result<Slide> {
        let doc = Document::parse(svg)?;
        Ok(self.convert_document(&doc))
    }

    pub fn convert_bytes(&self, bytes: &[u8]) -> Result<Slide> {
        let doc = Document::parse_bytes(bytes)?;
        Ok(self.convert_document(&doc))
    }

    pub fn convert_document(&self, doc: &Document) -> Slide {
        let table = self.oracle.as_deref().and_then(|oracle| {
            match OracleTable::load(doc, oracle) {
                Ok(table) => Some(table),
                Err(err) => {
                    tracing::warn!(%err, "style oracle failed, falling back to attributes");
                    None
                }
            }
        });

        let view_box = content_viewbox(doc, table.as_ref(), self.default_viewbox);
        let size = canvas_size(self.canvas_floor, view_box, self.margin);
        let mapper = Mapper::new(view_box, size);
        let resolver = StyleResolver::new(table.as_ref(), self.inline_style);
        let shapes = Emitter::new(doc, resolver, mapper, &self.fonts, &self.emit_options).emit();

        tracing::info!(
            shapes = shapes.len(),
            width = size.width.to_f64(),
            height = size.height.to_f64(),
            scale = mapper.scale(),
            oracle = table.is_some(),
            "converted svg"
        );
        Slide {
            size,
            scale: mapper.scale(),
            view_box,
            shapes,
        }
    }
}
