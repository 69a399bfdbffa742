// SVG path data interpreter.
//
// Supported commands: M/m, L/l, H/h, V/v, C/c, S/s, Q/q, T/t, A/a, Z/z with
// implicit repetition. Output is absolute. Quadratics stay quadratic; arcs are
// flattened to cubic Beziers of at most 90 degrees each. Trig goes through
// libm so results are identical on every target.

use crate::transform::Matrix;
use serde::Serialize;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PathSeg {
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    QuadTo { x1: f64, y1: f64, x: f64, y: f64 },
    CurveTo { x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64 },
    Close,
}

impl PathSeg {
    pub fn end_point(&self) -> Option<(f64, f64)> {
        match *self {
            PathSeg::MoveTo { x, y }
            | PathSeg::LineTo { x, y }
            | PathSeg::QuadTo { x, y, .. }
            | PathSeg::CurveTo { x, y, .. } => Some((x, y)),
            PathSeg::Close => None,
        }
    }

    /// Applies `f` to every coordinate pair of the segment.
    pub fn map_points(self, mut f: impl FnMut(f64, f64) -> (f64, f64)) -> PathSeg {
        match self {
            PathSeg::MoveTo { x, y } => {
                let (x, y) = f(x, y);
                PathSeg::MoveTo { x, y }
            }
            PathSeg::LineTo { x, y } => {
                let (x, y) = f(x, y);
                PathSeg::LineTo { x, y }
            }
            PathSeg::QuadTo { x1, y1, x, y } => {
                let (x1, y1) = f(x1, y1);
                let (x, y) = f(x, y);
                PathSeg::QuadTo { x1, y1, x, y }
            }
            PathSeg::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let (x1, y1) = f(x1, y1);
                let (x2, y2) = f(x2, y2);
                let (x, y) = f(x, y);
                PathSeg::CurveTo {
                    x1,
                    y1,
                    x2,
                    y2,
                    x,
                    y,
                }
            }
            PathSeg::Close => PathSeg::Close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl PathBounds {
    fn at(x: f64, y: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

pub fn transform_segs(segs: &[PathSeg], m: Matrix) -> Vec<PathSeg> {
    segs.iter().map(|seg| seg.map_points(|x, y| m.apply(x, y))).collect()
}

/// First point of the path (its initial move-to), in local coordinates.
pub fn first_point(segs: &[PathSeg]) -> Option<(f64, f64)> {
    segs.iter().find_map(PathSeg::end_point)
}

/// End point of the last explicit segment, in local coordinates. A closing
/// `Z` does not move it back to the subpath start.
pub fn last_point(segs: &[PathSeg]) -> Option<(f64, f64)> {
    segs.iter().rev().find_map(PathSeg::end_point)
}

/// Builds a move/line sequence from a `points` list (`polygon`, `polyline`).
/// A dangling odd coordinate is dropped.
pub fn parse_points(points: &str, close: bool) -> Vec<PathSeg> {
    let coords = crate::units::parse_number_list(points);
    let mut segs: Vec<PathSeg> = coords
        .chunks_exact(2)
        .enumerate()
        .map(|(i, xy)| match i {
            0 => PathSeg::MoveTo { x: xy[0], y: xy[1] },
            _ => PathSeg::LineTo { x: xy[0], y: xy[1] },
        })
        .collect();
    if close && !segs.is_empty() {
        segs.push(PathSeg::Close);
    }
    segs
}

pub fn parse_path_data(d: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    let mut p = PathParser::new(d);
    let mut cmd = ' ';
    let mut cur_x = 0.0;
    let mut cur_y = 0.0;
    let mut start_x = 0.0;
    let mut start_y = 0.0;
    let mut last_cubic_ctrl2: Option<(f64, f64)> = None;
    let mut last_quad_ctrl: Option<(f64, f64)> = None;

    while let Some((c, fresh)) = p.next_command(&mut cmd) {
        let before = p.pos();
        match c {
            'M' | 'm' => {
                let rel = c == 'm';
                if let Some((x, y)) = p.next_pair() {
                    let (x, y) = if rel { (cur_x + x, cur_y + y) } else { (x, y) };
                    segs.push(PathSeg::MoveTo { x, y });
                    cur_x = x;
                    cur_y = y;
                    start_x = x;
                    start_y = y;
                    last_cubic_ctrl2 = None;
                    last_quad_ctrl = None;
                    // Further pairs after a move are implicit line-tos.
                    cmd = if rel { 'l' } else { 'L' };
                }
            }
            'L' | 'l' => {
                let rel = c == 'l';
                while let Some((x, y)) = p.next_pair() {
                    let (x, y) = if rel { (cur_x + x, cur_y + y) } else { (x, y) };
                    segs.push(PathSeg::LineTo { x, y });
                    cur_x = x;
                    cur_y = y;
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'H' | 'h' => {
                let rel = c == 'h';
                while let Some(x) = p.next_number() {
                    let x = if rel { cur_x + x } else { x };
                    segs.push(PathSeg::LineTo { x, y: cur_y });
                    cur_x = x;
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'V' | 'v' => {
                let rel = c == 'v';
                while let Some(y) = p.next_number() {
                    let y = if rel { cur_y + y } else { y };
                    segs.push(PathSeg::LineTo { x: cur_x, y });
                    cur_y = y;
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'C' | 'c' => {
                let rel = c == 'c';
                while let Some([x1, y1, x2, y2, x, y]) = p.next_numbers::<6>() {
                    let (ox, oy) = if rel { (cur_x, cur_y) } else { (0.0, 0.0) };
                    let (x1, y1, x2, y2, x, y) = (ox + x1, oy + y1, ox + x2, oy + y2, ox + x, oy + y);
                    segs.push(PathSeg::CurveTo {
                        x1,
                        y1,
                        x2,
                        y2,
                        x,
                        y,
                    });
                    cur_x = x;
                    cur_y = y;
                    last_cubic_ctrl2 = Some((x2, y2));
                    last_quad_ctrl = None;
                }
            }
            'S' | 's' => {
                let rel = c == 's';
                while let Some([x2, y2, x, y]) = p.next_numbers::<4>() {
                    let (ox, oy) = if rel { (cur_x, cur_y) } else { (0.0, 0.0) };
                    let (x2, y2, x, y) = (ox + x2, oy + y2, ox + x, oy + y);
                    let (x1, y1) = match last_cubic_ctrl2 {
                        Some((px2, py2)) => (2.0 * cur_x - px2, 2.0 * cur_y - py2),
                        None => (cur_x, cur_y),
                    };
                    segs.push(PathSeg::CurveTo {
                        x1,
                        y1,
                        x2,
                        y2,
                        x,
                        y,
                    });
                    cur_x = x;
                    cur_y = y;
                    last_cubic_ctrl2 = Some((x2, y2));
                    last_quad_ctrl = None;
                }
            }
            'Q' | 'q' => {
                let rel = c == 'q';
                while let Some([x1, y1, x, y]) = p.next_numbers::<4>() {
                    let (ox, oy) = if rel { (cur_x, cur_y) } else { (0.0, 0.0) };
                    let (x1, y1, x, y) = (ox + x1, oy + y1, ox + x, oy + y);
                    segs.push(PathSeg::QuadTo { x1, y1, x, y });
                    cur_x = x;
                    cur_y = y;
                    last_quad_ctrl = Some((x1, y1));
                    last_cubic_ctrl2 = None;
                }
            }
            'T' | 't' => {
                let rel = c == 't';
                while let Some((x, y)) = p.next_pair() {
                    let (x, y) = if rel { (cur_x + x, cur_y + y) } else { (x, y) };
                    let (x1, y1) = match last_quad_ctrl {
                        Some((px1, py1)) => (2.0 * cur_x - px1, 2.0 * cur_y - py1),
                        None => (cur_x, cur_y),
                    };
                    segs.push(PathSeg::QuadTo { x1, y1, x, y });
                    cur_x = x;
                    cur_y = y;
                    last_quad_ctrl = Some((x1, y1));
                    last_cubic_ctrl2 = None;
                }
            }
            'A' | 'a' => {
                let rel = c == 'a';
                while let Some((rx, ry, rot, large, sweep, x, y)) = p.next_arc() {
                    let (x, y) = if rel { (cur_x + x, cur_y + y) } else { (x, y) };
                    segs.extend(arc_to_cubics(cur_x, cur_y, rx, ry, rot, large, sweep, x, y));
                    cur_x = x;
                    cur_y = y;
                    last_cubic_ctrl2 = None;
                    last_quad_ctrl = None;
                }
            }
            'Z' | 'z' => {
                if fresh {
                    segs.push(PathSeg::Close);
                    cur_x = start_x;
                    cur_y = start_y;
                    last_cubic_ctrl2 = None;
                    last_quad_ctrl = None;
                }
            }
            _ => {}
        }
        // Stray numbers after Z, unknown letters or garbage: skip one token so
        // the loop always makes progress.
        if !fresh && p.pos() == before {
            p.skip_token();
        }
    }

    segs
}

/// Converts an SVG endpoint-parameterized elliptical arc into cubic Beziers,
/// following the center parameterization from the SVG implementation notes.
#[allow(clippy::too_many_arguments)]
pub fn arc_to_cubics(
    x0: f64,
    y0: f64,
    rx_in: f64,
    ry_in: f64,
    x_axis_rotation_deg: f64,
    large_arc: bool,
    sweep: bool,
    x1: f64,
    y1: f64,
) -> Vec<PathSeg> {
    if x0 == x1 && y0 == y1 {
        return Vec::new();
    }
    let mut rx = rx_in.abs();
    let mut ry = ry_in.abs();
    if rx == 0.0 || ry == 0.0 {
        return vec![PathSeg::LineTo { x: x1, y: y1 }];
    }

    let phi = x_axis_rotation_deg.to_radians();
    let sin_phi = libm::sin(phi);
    let cos_phi = libm::cos(phi);

    // Midpoint in the rotated frame.
    let dx2 = (x0 - x1) / 2.0;
    let dy2 = (y0 - y1) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    // Scale radii up until the ellipse can pass through both endpoints.
    let x1p2 = x1p * x1p;
    let y1p2 = y1p * y1p;
    let lambda = x1p2 / (rx * rx) + y1p2 / (ry * ry);
    if lambda > 1.0 {
        let s = libm::sqrt(lambda);
        rx *= s;
        ry *= s;
    }

    let rx2 = rx * rx;
    let ry2 = ry * ry;
    let num = rx2 * ry2 - rx2 * y1p2 - ry2 * x1p2;
    let den = rx2 * y1p2 + ry2 * x1p2;
    let mut coef = 0.0;
    if den != 0.0 {
        let sign = if large_arc == sweep { -1.0 } else { 1.0 };
        coef = sign * libm::sqrt((num / den).max(0.0));
    }
    let cxp = coef * (rx * y1p / ry);
    let cyp = coef * (-ry * x1p / rx);

    let cx = cos_phi * cxp - sin_phi * cyp + (x0 + x1) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (y0 + y1) / 2.0;

    fn angle(ux: f64, uy: f64, vx: f64, vy: f64) -> f64 {
        let dot = ux * vx + uy * vy;
        let det = ux * vy - uy * vx;
        libm::atan2(det, dot)
    }

    let ux = (x1p - cxp) / rx;
    let uy = (y1p - cyp) / ry;
    let vx = (-x1p - cxp) / rx;
    let vy = (-y1p - cyp) / ry;

    let mut theta = angle(1.0, 0.0, ux, uy);
    let mut dtheta = angle(ux, uy, vx, vy);

    // atan2 yields (-180, 180]; the sweep flag picks the direction, which keeps
    // the extent inside (-360, 360).
    if !sweep && dtheta > 0.0 {
        dtheta -= 2.0 * PI;
    } else if sweep && dtheta < 0.0 {
        dtheta += 2.0 * PI;
    }

    let count = libm::ceil(dtheta.abs() / (PI / 2.0)).max(1.0) as usize;
    let delta = dtheta / count as f64;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let t2 = theta + delta;
        let mut seg = arc_segment_to_cubic(cx, cy, rx, ry, sin_phi, cos_phi, theta, t2);
        // Pin the final endpoint so rounding never opens a gap.
        if i + 1 == count {
            if let PathSeg::CurveTo { x, y, .. } = &mut seg {
                *x = x1;
                *y = y1;
            }
        }
        out.push(seg);
        theta = t2;
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn arc_segment_to_cubic(
    cx: f64,
    cy: f64,
    rx: f64,
    ry: f64,
    sin_phi: f64,
    cos_phi: f64,
    t1: f64,
    t2: f64,
) -> PathSeg {
    let k = (4.0 / 3.0) * libm::tan((t2 - t1) / 4.0);

    let s1 = libm::sin(t1);
    let c1 = libm::cos(t1);
    let s2 = libm::sin(t2);
    let c2 = libm::cos(t2);

    // Unit circle -> ellipse -> rotate -> translate.
    let map = |x: f64, y: f64| {
        let x = rx * x;
        let y = ry * y;
        (cx + cos_phi * x - sin_phi * y, cy + sin_phi * x + cos_phi * y)
    };

    let (x1, y1) = map(c1 - k * s1, s1 + k * c1);
    let (x2, y2) = map(c2 + k * s2, s2 - k * c2);
    let (x, y) = map(c2, s2);
    PathSeg::CurveTo {
        x1,
        y1,
        x2,
        y2,
        x,
        y,
    }
}

/// Tight axis-aligned bounds of the rendered curve (control points only count
/// where the curve actually reaches them).
pub fn path_bounds(segs: &[PathSeg]) -> Option<PathBounds> {
    let mut bounds: Option<PathBounds> = None;
    let mut cur = (0.0, 0.0);
    let mut start = (0.0, 0.0);

    for seg in segs {
        match *seg {
            PathSeg::MoveTo { x, y } => {
                include(&mut bounds, x, y);
                cur = (x, y);
                start = cur;
            }
            PathSeg::LineTo { x, y } => {
                include(&mut bounds, cur.0, cur.1);
                include(&mut bounds, x, y);
                cur = (x, y);
            }
            PathSeg::QuadTo { x1, y1, x, y } => {
                let c1 = (cur.0 + (2.0 / 3.0) * (x1 - cur.0), cur.1 + (2.0 / 3.0) * (y1 - cur.1));
                let c2 = (x + (2.0 / 3.0) * (x1 - x), y + (2.0 / 3.0) * (y1 - y));
                for (px, py) in cubic_extremes(cur, c1, c2, (x, y)) {
                    include(&mut bounds, px, py);
                }
                cur = (x, y);
            }
            PathSeg::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                for (px, py) in cubic_extremes(cur, (x1, y1), (x2, y2), (x, y)) {
                    include(&mut bounds, px, py);
                }
                cur = (x, y);
            }
            PathSeg::Close => cur = start,
        }
    }
    bounds
}

fn include(bounds: &mut Option<PathBounds>, x: f64, y: f64) {
    if let Some(b) = bounds {
        b.include_point(x, y);
    } else {
        *bounds = Some(PathBounds::at(x, y));
    }
}

fn cubic_eval(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let a = -p0 + 3.0 * p1 - 3.0 * p2 + p3;
    let b = 3.0 * p0 - 6.0 * p1 + 3.0 * p2;
    let c = -3.0 * p0 + 3.0 * p1;
    ((a * t + b) * t + c) * t + p0
}

// Endpoints plus every interior point where dx/dt or dy/dt vanishes.
fn cubic_extremes(
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
) -> Vec<(f64, f64)> {
    const EPS: f64 = 1e-12;
    let mut out = vec![p0, p3];
    for (a0, a1, a2, a3) in [(p0.0, p1.0, p2.0, p3.0), (p0.1, p1.1, p2.1, p3.1)] {
        let a = -a0 + 3.0 * a1 - 3.0 * a2 + a3;
        let b = 3.0 * a0 - 6.0 * a1 + 3.0 * a2;
        let c = -3.0 * a0 + 3.0 * a1;
        let (qa, qb, qc) = (3.0 * a, 2.0 * b, c);
        let mut roots = Vec::with_capacity(2);
        if qa.abs() <= EPS {
            if qb.abs() > EPS {
                roots.push(-qc / qb);
            }
        } else {
            let disc = qb * qb - 4.0 * qa * qc;
            if disc >= 0.0 {
                let s = libm::sqrt(disc);
                roots.push((-qb + s) / (2.0 * qa));
                roots.push((-qb - s) / (2.0 * qa));
            }
        }
        for t in roots {
            if t > 0.0 && t < 1.0 {
                out.push((
                    cubic_eval(p0.0, p1.0, p2.0, p3.0, t),
                    cubic_eval(p0.1, p1.1, p2.1, p3.1, t),
                ));
            }
        }
    }
    out
}

struct PathParser<'a> {
    bytes: &'a [u8],
    i: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            i: 0,
        }
    }

    fn pos(&self) -> usize {
        self.i
    }

    fn skip_ws(&mut self) {
        while self.i < self.bytes.len() {
            match self.bytes[self.i] {
                b' ' | b'\n' | b'\r' | b'\t' | b',' => self.i += 1,
                _ => break,
            }
        }
    }

    /// Returns the command to run next and whether it was spelled out (`true`)
    /// or repeated implicitly because a bare argument follows (`false`).
    fn next_command(&mut self, current: &mut char) -> Option<(char, bool)> {
        self.skip_ws();
        let &b = self.bytes.get(self.i)?;
        if b.is_ascii_alphabetic() {
            *current = b as char;
            self.i += 1;
            return Some((*current, true));
        }
        Some((*current, false))
    }

    fn skip_token(&mut self) {
        if self.next_number().is_none() {
            self.i += 1;
        }
    }

    fn next_number(&mut self) -> Option<f64> {
        self.skip_ws();
        if self.i >= self.bytes.len() {
            return None;
        }
        let start = self.i;
        let mut has = false;

        if matches!(self.bytes[self.i], b'+' | b'-') {
            self.i += 1;
        }
        while self.i < self.bytes.len() && self.bytes[self.i].is_ascii_digit() {
            self.i += 1;
            has = true;
        }
        if self.i < self.bytes.len() && self.bytes[self.i] == b'.' {
            self.i += 1;
            while self.i < self.bytes.len() && self.bytes[self.i].is_ascii_digit() {
                self.i += 1;
                has = true;
            }
        }
        if has && self.i < self.bytes.len() && matches!(self.bytes[self.i], b'e' | b'E') {
            let mark = self.i;
            self.i += 1;
            if self.i < self.bytes.len() && matches!(self.bytes[self.i], b'+' | b'-') {
                self.i += 1;
            }
            let digits = self.i;
            while self.i < self.bytes.len() && self.bytes[self.i].is_ascii_digit() {
                self.i += 1;
            }
            if self.i == digits {
                // Not an exponent after all.
                self.i = mark;
            }
        }

        if !has {
            self.i = start;
            return None;
        }

        let s = std::str::from_utf8(&self.bytes[start..self.i]).ok()?;
        s.parse::<f64>().ok()
    }

    fn next_numbers<const N: usize>(&mut self) -> Option<[f64; N]> {
        let mut out = [0.0; N];
        for slot in out.iter_mut() {
            *slot = self.next_number()?;
        }
        Some(out)
    }

    fn next_pair(&mut self) -> Option<(f64, f64)> {
        let [x, y] = self.next_numbers::<2>()?;
        Some((x, y))
    }

    // Flags may be packed against the next argument ("a1 1 0 015 5").
    fn next_flag(&mut self) -> Option<bool> {
        self.skip_ws();
        match self.bytes.get(self.i)? {
            b'0' => {
                self.i += 1;
                Some(false)
            }
            b'1' => {
                self.i += 1;
                Some(true)
            }
            _ => None,
        }
    }

    #[allow(clippy::type_complexity)]
    fn next_arc(&mut self) -> Option<(f64, f64, f64, bool, bool, f64, f64)> {
        let [rx, ry, rot] = self.next_numbers::<3>()?;
        let large = self.next_flag()?;
        let sweep = self.next_flag()?;
        let (x, y) = self.next_pair()?;
        Some((rx, ry, rot, large, sweep, x, y))
    }
}
