use fixed::types::I32F32;
use serde::{Serialize, Serializer};
use std::fmt;

/// Device-space length in canvas points, quantized to thousandths so emitted
/// geometry is byte-stable across platforms.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f64(value: f64) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_f32(value: f32) -> Pt {
        Pt::from_f64(value as f64)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_num()
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    pub fn abs(self) -> Pt {
        if self.to_milli_i64() < 0 { -self } else { self }
    }

    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        let value = div_round_i128(milli.saturating_mul(num as i128), denom as i128);
        Pt::from_milli_i128(value)
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        let milli = self.to_milli_i64() as i128;
        Pt::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Mul<f64> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f64) -> Pt {
        if !rhs.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_f64(self.to_f64() * rhs)
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    if num >= 0 {
        (num + (den_abs / 2)) / den
    } else {
        -(((-num) + (den_abs / 2)) / den)
    }
}

impl fmt::Display for Pt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let milli = self.to_milli_i64();
        let sign = if milli < 0 { "-" } else { "" };
        let milli = milli.unsigned_abs();
        write!(f, "{sign}{}.{:03}", milli / 1000, milli % 1000)
    }
}

impl Serialize for Pt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_milli_i64() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: Pt::from_f64(width),
            height: Pt::from_f64(height),
        }
    }

    /// Widescreen 16:9 slide, 13.333in x 7.5in at 72pt/in.
    pub fn widescreen() -> Self {
        Self::from_inches(13.333, 7.5)
    }

    pub fn from_inches(width_in: f64, height_in: f64) -> Self {
        Self::new(width_in * 72.0, height_in * 72.0)
    }
}

/// Device-space rectangle with a canonical min corner and non-negative extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
}

impl Rect {
    /// Builds the axis-aligned box spanning two arbitrary corners.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: Pt::from_f64(x0.min(x1)),
            y: Pt::from_f64(y0.min(y1)),
            width: Pt::from_f64((x1 - x0).abs()),
            height: Pt::from_f64((y1 - y0).abs()),
        }
    }
}

/// Opaque sRGB colour, rendered as six upper-case hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_quantizes_to_thousandths() {
        let p = Pt::from_f64(1.23456);
        assert_eq!(p.to_milli_i64(), 1235);
        assert_eq!(p.to_string(), "1.235");
        assert_eq!(Pt::from_f64(-0.5).to_string(), "-0.500");
        assert_eq!(Pt::from_f64(f64::NAN), Pt::ZERO);
    }

    #[test]
    fn pt_arithmetic_stays_quantized() {
        let a = Pt::from_f64(1.5);
        let b = Pt::from_f64(0.25);
        assert_eq!((a + b).to_milli_i64(), 1750);
        assert_eq!((a - b).to_milli_i64(), 1250);
        assert_eq!((a * 3).to_milli_i64(), 4500);
        assert_eq!(a.mul_ratio(1, 3).to_milli_i64(), 500);
        assert_eq!((-a).abs(), a);
    }

    #[test]
    fn widescreen_floor_matches_slide_size() {
        let size = Size::widescreen();
        assert_eq!(size.width.to_milli_i64(), 959_976);
        assert_eq!(size.height.to_milli_i64(), 540_000);
    }

    #[test]
    fn rect_from_corners_is_canonical() {
        let r = Rect::from_corners(10.0, 20.0, 4.0, 5.0);
        assert_eq!(r.x.to_f64(), 4.0);
        assert_eq!(r.y.to_f64(), 5.0);
        assert_eq!(r.width.to_f64(), 6.0);
        assert_eq!(r.height.to_f64(), 15.0);
    }

    #[test]
    fn color_renders_upper_hex() {
        assert_eq!(Color::rgb(0xab, 0x0c, 0xff).to_hex(), "AB0CFF");
        let json = serde_json::to_string(&Color::BLACK).expect("serialize");
        assert_eq!(json, "\"000000\"");
    }
}
