// Affine transforms: transform-list parsing and root-to-leaf composition.

use crate::dom::Node;
use crate::oracle::OracleTable;
use svgdeck_oracle_contract::Ctm;

/// `[x', y'] = [a c; b d] * [x, y] + [e, f]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::identity()
        }
    }

    pub fn rotate(deg: f64) -> Self {
        let rad = deg.to_radians();
        let s = libm::sin(rad);
        let c = libm::cos(rad);
        Self {
            a: c,
            b: s,
            c: -s,
            d: c,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn rotate_about(deg: f64, cx: f64, cy: f64) -> Self {
        Matrix::translate(cx, cy)
            .mul(Matrix::rotate(deg))
            .mul(Matrix::translate(-cx, -cy))
    }

    /// `self * other`: `other` applies first, then `self`.
    pub fn mul(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn invert(self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    /// Axis-aligned bounds of the rectangle `(x, y, w, h)` after transforming
    /// all four corners, as `(min_x, min_y, max_x, max_y)`.
    pub fn map_rect(self, x: f64, y: f64, w: f64, h: f64) -> (f64, f64, f64, f64) {
        let corners = [
            self.apply(x, y),
            self.apply(x + w, y),
            self.apply(x, y + h),
            self.apply(x + w, y + h),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), &(px, py)| (x0.min(px), y0.min(py), x1.max(px), y1.max(py)),
        )
    }
}

impl From<Ctm> for Matrix {
    fn from(m: Ctm) -> Self {
        Self {
            a: m.a,
            b: m.b,
            c: m.c,
            d: m.d,
            e: m.e,
            f: m.f,
        }
    }
}

/// Parses an SVG transform list left to right. Unknown functions and bad
/// argument counts are skipped; the result is never an error.
pub fn parse_transform(input: &str) -> Matrix {
    let mut out = Matrix::identity();
    let mut s = input.trim();

    while !s.is_empty() {
        let Some(open) = s.find('(') else { break };
        let name = s[..open].trim().trim_start_matches(',').trim();
        let Some(close) = s[open + 1..].find(')') else {
            break;
        };
        let args_str = &s[open + 1..open + 1 + close];
        let args = crate::units::parse_number_list(args_str);

        let m = match (name, args.as_slice()) {
            ("translate", [tx]) => Some(Matrix::translate(*tx, 0.0)),
            ("translate", [tx, ty]) => Some(Matrix::translate(*tx, *ty)),
            ("scale", [s]) => Some(Matrix::scale(*s, *s)),
            ("scale", [sx, sy]) => Some(Matrix::scale(*sx, *sy)),
            ("rotate", [deg]) => Some(Matrix::rotate(*deg)),
            ("rotate", [deg, cx, cy]) => Some(Matrix::rotate_about(*deg, *cx, *cy)),
            ("matrix", [a, b, c, d, e, f, ..]) => Some(Matrix {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            ("skewX", [deg]) => Some(Matrix {
                c: libm::tan(deg.to_radians()),
                ..Matrix::identity()
            }),
            ("skewY", [deg]) => Some(Matrix {
                b: libm::tan(deg.to_radians()),
                ..Matrix::identity()
            }),
            _ => None,
        };
        match m {
            Some(m) => out = out.mul(m),
            None => tracing::debug!(function = name, args = args_str, "skipping transform function"),
        }
        s = s[open + 1 + close + 1..].trim_start();
    }

    out
}

/// The element's own `transform` attribute, identity when absent.
pub fn element_transform(node: Node<'_>) -> Matrix {
    node.non_empty_attribute("transform")
        .map(parse_transform)
        .unwrap_or_default()
}

/// Maps the element's local coordinates to document root space. An oracle CTM
/// wins; otherwise ancestor transforms are concatenated root to leaf.
pub fn full_transform(node: Node<'_>, oracle: Option<&OracleTable>) -> Matrix {
    if let Some(ctm) = oracle.and_then(|o| o.ctm(node.id())) {
        return ctm;
    }
    let mut chain: Vec<Node<'_>> = node.ancestors().collect();
    chain.reverse();
    chain.push(node);
    chain
        .into_iter()
        .fold(Matrix::identity(), |acc, n| acc.mul(element_transform(n)))
}
