//! Ink colors and the HSV working state behind the color palette.

use serde::{Deserialize, Serialize};

/// RGB color assigned to strokes. Stroke transparency is a separate
/// per-stroke opacity, so the color itself carries no alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to normalized RGB values (0.0 to 1.0).
    pub fn to_normalized(&self) -> (f32, f32, f32) {
        (self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0)
    }

    /// `#rrggbb` form, as assigned to the active pen by the palette.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

/// Common ink colors
impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };
    pub const RED: Color = Color { r: 220, g: 38, b: 38 };
    pub const BLUE: Color = Color { r: 37, g: 99, b: 235 };
    pub const GREEN: Color = Color { r: 22, g: 163, b: 74 };
    pub const YELLOW: Color = Color { r: 250, g: 204, b: 21 };
}

/// HSV working state used while picking a pen color. Ephemeral: only the
/// resulting [`Color`] reaches a stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvColor {
    /// Hue in degrees, 0–360.
    pub h: f32,
    /// Saturation, 0–1.
    pub s: f32,
    /// Value, 0–1.
    pub v: f32,
}

impl HsvColor {
    pub fn new(h: f32, s: f32, v: f32) -> Self {
        Self { h: h.rem_euclid(360.0), s: s.clamp(0.0, 1.0), v: v.clamp(0.0, 1.0) }
    }

    pub fn to_color(&self) -> Color {
        let c = self.v * self.s;
        let h_prime = self.h / 60.0;
        let x = c * (1.0 - (h_prime.rem_euclid(2.0) - 1.0).abs());
        let (r1, g1, b1) = match h_prime as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.v - c;
        Color {
            r: ((r1 + m) * 255.0).round() as u8,
            g: ((g1 + m) * 255.0).round() as u8,
            b: ((b1 + m) * 255.0).round() as u8,
        }
    }

    pub fn from_color(color: Color) -> Self {
        let (r, g, b) = color.to_normalized();
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta < f32::EPSILON {
            0.0
        } else if (max - r).abs() < f32::EPSILON {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if (max - g).abs() < f32::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let s = if max < f32::EPSILON { 0.0 } else { delta / max };
        Self { h, s, v: max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let color = Color::rgb(220, 38, 38);
        assert_eq!(color.to_hex(), "#dc2626");
        assert_eq!(Color::from_hex("#dc2626"), Some(color));
        assert_eq!(Color::from_hex("dc2626"), None);
        assert_eq!(Color::from_hex("#zz0000"), None);
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(HsvColor::new(0.0, 1.0, 1.0).to_color(), Color::rgb(255, 0, 0));
        assert_eq!(HsvColor::new(120.0, 1.0, 1.0).to_color(), Color::rgb(0, 255, 0));
        assert_eq!(HsvColor::new(240.0, 1.0, 1.0).to_color(), Color::rgb(0, 0, 255));
    }

    #[test]
    fn hsv_grayscale_has_zero_saturation() {
        let hsv = HsvColor::from_color(Color::rgb(128, 128, 128));
        assert_eq!(hsv.s, 0.0);
        assert!((hsv.v - 128.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn hsv_round_trips_within_rounding() {
        for color in [Color::RED, Color::BLUE, Color::GREEN, Color::YELLOW, Color::rgb(13, 200, 97)]
        {
            let back = HsvColor::from_color(color).to_color();
            assert!((back.r as i16 - color.r as i16).abs() <= 1);
            assert!((back.g as i16 - color.g as i16).abs() <= 1);
            assert!((back.b as i16 - color.b as i16).abs() <= 1);
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let hsv = HsvColor::new(540.0, 2.0, -1.0);
        assert_eq!(hsv.h, 180.0);
        assert_eq!(hsv.s, 1.0);
        assert_eq!(hsv.v, 0.0);
    }
}
