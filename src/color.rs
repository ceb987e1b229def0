use crate::bbox::{BBox, Xywh};

use image::RgbImage;
use log::trace;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

const HUE_WEIGHT: f32 = 0.6;
const SATURATION_WEIGHT: f32 = 0.3;
const VALUE_WEIGHT: f32 = 0.1;
const NEUTRAL_SIMILARITY: f32 = 0.5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    pub enabled: bool,
    /// fraction trimmed from every edge before sampling
    pub margin: f32,
    /// sample every n-th pixel in both directions
    pub step: usize,
    /// 0..255
    pub min_saturation: f32,
    /// 0..255
    pub min_value: f32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            margin: 0.15,
            step: 3,
            min_saturation: 40.0,
            min_value: 60.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColorName {
    Black,
    White,
    Gray,
    Dark,
    Red,
    Orange,
    Yellow,
    Lime,
    Green,
    Cyan,
    Blue,
    Purple,
    Magenta,
    Unknown,
}

impl ColorName {
    /// `h` in degrees, `s` and `v` in 0..255.
    pub fn classify(h: f32, s: f32, v: f32, min_saturation: f32, min_value: f32) -> Self {
        if s < min_saturation {
            return if v < 70.0 {
                ColorName::Black
            } else if v > 200.0 {
                ColorName::White
            } else {
                ColorName::Gray
            };
        }

        if v < min_value {
            return ColorName::Dark;
        }

        match h {
            h if !(20.0..340.0).contains(&h) => ColorName::Red,
            h if h < 50.0 => ColorName::Orange,
            h if h < 70.0 => ColorName::Yellow,
            h if h < 90.0 => ColorName::Lime,
            h if h < 170.0 => ColorName::Green,
            h if h < 200.0 => ColorName::Cyan,
            h if h < 250.0 => ColorName::Blue,
            h if h < 310.0 => ColorName::Purple,
            _ => ColorName::Magenta,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorName::Black => "black",
            ColorName::White => "white",
            ColorName::Gray => "gray",
            ColorName::Dark => "dark",
            ColorName::Red => "red",
            ColorName::Orange => "orange",
            ColorName::Yellow => "yellow",
            ColorName::Lime => "lime",
            ColorName::Green => "green",
            ColorName::Cyan => "cyan",
            ColorName::Blue => "blue",
            ColorName::Purple => "purple",
            ColorName::Magenta => "magenta",
            ColorName::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean HSV of a box interior: hue in degrees, saturation and value in 0..255.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ColorDescriptor {
    pub h: f32,
    pub s: f32,
    pub v: f32,
    pub name: ColorName,
    pub valid: bool,
}

impl ColorDescriptor {
    pub fn invalid() -> Self {
        Self {
            h: 0.0,
            s: 0.0,
            v: 128.0,
            name: ColorName::Unknown,
            valid: false,
        }
    }
}

impl Default for ColorDescriptor {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Returns (H: 0-360, S: 0-255, V: 0-255).
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta < 1e-6 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let s = if max < 1e-6 { 0.0 } else { delta / max * 255.0 };

    (h, s, max * 255.0)
}

/// Similarity in [0, 1] with hue dominating; 0.5 when either side is unreliable.
pub fn color_similarity(a: &ColorDescriptor, b: &ColorDescriptor) -> f32 {
    if !a.valid || !b.valid {
        return NEUTRAL_SIMILARITY;
    }

    let h_diff = (a.h - b.h).abs();
    let h_diff = h_diff.min(360.0 - h_diff);
    let s_diff = (a.s - b.s).abs();
    let v_diff = (a.v - b.v).abs();

    let dissimilarity = h_diff / 180.0 * HUE_WEIGHT
        + s_diff / 255.0 * SATURATION_WEIGHT
        + v_diff / 255.0 * VALUE_WEIGHT;

    (1.0 - dissimilarity).clamp(0.0, 1.0)
}

pub struct ColorSampler {
    config: ColorConfig,
}

impl ColorSampler {
    pub fn new(config: ColorConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ColorConfig {
        &self.config
    }

    pub fn sample(&self, image: &RgbImage, bbox: &BBox<Xywh>) -> ColorDescriptor {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 || !bbox.is_finite() {
            return ColorDescriptor::invalid();
        }

        let clipped = bbox
            .as_ltrb()
            .clip((width - 1) as f32, (height - 1) as f32);

        let (x1, y1) = (clipped.left() as u32, clipped.top() as u32);
        let (x2, y2) = (clipped.right() as u32, clipped.bottom() as u32);

        if x2 <= x1 || y2 <= y1 {
            trace!("color: degenerate region {:?}", clipped);
            return ColorDescriptor::invalid();
        }

        let margin = self.config.margin.clamp(0.0, 0.49);
        let mx = ((x2 - x1) as f32 * margin) as u32;
        let my = ((y2 - y1) as f32 * margin) as u32;
        let (cx1, cx2) = (x1 + mx, x2 - mx);
        let (cy1, cy2) = (y1 + my, y2 - my);

        let step = self.config.step.max(1);
        let mut count = 0usize;
        let (mut hue_x, mut hue_y) = (0.0f32, 0.0f32);
        let (mut sum_s, mut sum_v) = (0.0f32, 0.0f32);

        for y in (cy1..cy2).step_by(step) {
            for x in (cx1..cx2).step_by(step) {
                let [r, g, b] = image.get_pixel(x, y).0;
                let (h, s, v) = rgb_to_hsv(r, g, b);
                let angle = h.to_radians();

                hue_x += angle.cos();
                hue_y += angle.sin();
                sum_s += s;
                sum_v += v;
                count += 1;
            }
        }

        if count == 0 {
            return ColorDescriptor::invalid();
        }

        let n = count as f32;
        let h = hue_y.atan2(hue_x).to_degrees().rem_euclid(360.0);
        let (s, v) = (sum_s / n, sum_v / n);

        ColorDescriptor {
            h,
            s,
            v,
            name: ColorName::classify(
                h,
                s,
                v,
                self.config.min_saturation,
                self.config.min_value,
            ),
            valid: s >= self.config.min_saturation && v >= self.config.min_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(rgb))
    }

    fn descriptor(h: f32, s: f32, v: f32) -> ColorDescriptor {
        ColorDescriptor {
            h,
            s,
            v,
            name: ColorName::classify(h, s, v, 40.0, 60.0),
            valid: true,
        }
    }

    #[test]
    fn hsv_of_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0.0, 255.0, 255.0));

        let (h, s, v) = rgb_to_hsv(0, 255, 0);
        assert_abs_diff_eq!(h, 120.0, epsilon = 1e-3);
        assert_abs_diff_eq!(s, 255.0);
        assert_abs_diff_eq!(v, 255.0);

        let (h, _, _) = rgb_to_hsv(0, 0, 255);
        assert_abs_diff_eq!(h, 240.0, epsilon = 1e-3);

        let (h, s, v) = rgb_to_hsv(128, 128, 128);
        assert_eq!((h, s), (0.0, 0.0));
        assert_abs_diff_eq!(v, 128.0, epsilon = 1e-3);
    }

    #[test]
    fn samples_solid_blue_region() {
        let sampler = ColorSampler::new(ColorConfig::default());
        let img = solid(64, 48, [20, 40, 220]);

        let color = sampler.sample(&img, &BBox::xywh(32.0, 24.0, 30.0, 20.0));
        assert!(color.valid);
        assert_eq!(color.name, ColorName::Blue);
    }

    #[test]
    fn margin_excludes_box_border() {
        let sampler = ColorSampler::new(ColorConfig {
            step: 1,
            ..Default::default()
        });

        let mut img = solid(100, 100, [0, 200, 0]);
        for (x, y, px) in img.enumerate_pixels_mut() {
            if (30..70).contains(&x) && (30..70).contains(&y) {
                *px = Rgb([220, 10, 10]);
            }
        }

        // 20..80 trims 9 px per edge to 29..71, which is mostly red
        let color = sampler.sample(&img, &BBox::ltrb(20.0, 20.0, 80.0, 80.0).as_xywh());
        assert_eq!(color.name, ColorName::Red);
    }

    #[test]
    fn gray_region_is_invalid() {
        let sampler = ColorSampler::new(ColorConfig::default());
        let img = solid(32, 32, [230, 230, 230]);

        let color = sampler.sample(&img, &BBox::xywh(16.0, 16.0, 20.0, 20.0));
        assert!(!color.valid);
        assert_eq!(color.name, ColorName::White);
    }

    #[test]
    fn region_outside_image_is_invalid() {
        let sampler = ColorSampler::new(ColorConfig::default());
        let img = solid(32, 32, [200, 0, 0]);

        let color = sampler.sample(&img, &BBox::xywh(-50.0, -50.0, 10.0, 10.0));
        assert_eq!(color, ColorDescriptor::invalid());

        let color = sampler.sample(&img, &BBox::xywh(16.0, 16.0, 0.0, 10.0));
        assert!(!color.valid);
    }

    #[test]
    fn reds_across_zero_do_not_average_to_cyan() {
        let sampler = ColorSampler::new(ColorConfig {
            step: 1,
            margin: 0.0,
            ..Default::default()
        });

        let mut img = solid(20, 10, [230, 0, 30]);
        for (x, _, px) in img.enumerate_pixels_mut() {
            if x % 2 == 0 {
                *px = Rgb([230, 30, 0]);
            }
        }

        let color = sampler.sample(&img, &BBox::ltrb(0.0, 0.0, 19.0, 9.0).as_xywh());
        assert_eq!(color.name, ColorName::Red);
    }

    #[test]
    fn names_cover_hue_bands() {
        let name = |h| ColorName::classify(h, 200.0, 200.0, 40.0, 60.0);

        assert_eq!(name(5.0), ColorName::Red);
        assert_eq!(name(350.0), ColorName::Red);
        assert_eq!(name(30.0), ColorName::Orange);
        assert_eq!(name(60.0), ColorName::Yellow);
        assert_eq!(name(80.0), ColorName::Lime);
        assert_eq!(name(120.0), ColorName::Green);
        assert_eq!(name(180.0), ColorName::Cyan);
        assert_eq!(name(220.0), ColorName::Blue);
        assert_eq!(name(280.0), ColorName::Purple);
        assert_eq!(name(320.0), ColorName::Magenta);

        assert_eq!(ColorName::classify(0.0, 10.0, 30.0, 40.0, 60.0), ColorName::Black);
        assert_eq!(ColorName::classify(0.0, 10.0, 150.0, 40.0, 60.0), ColorName::Gray);
        assert_eq!(ColorName::classify(0.0, 100.0, 30.0, 40.0, 60.0), ColorName::Dark);
    }

    #[test]
    fn similarity_wraps_hue() {
        let a = descriptor(355.0, 200.0, 200.0);
        let b = descriptor(5.0, 200.0, 200.0);

        // 10 degrees apart
        assert_abs_diff_eq!(color_similarity(&a, &b), 1.0 - 10.0 / 180.0 * 0.6, epsilon = 1e-5);
        assert_abs_diff_eq!(color_similarity(&a, &a), 1.0);
    }

    #[test]
    fn similarity_is_bounded_and_neutral_when_invalid() {
        let a = descriptor(0.0, 255.0, 255.0);
        let b = descriptor(180.0, 0.0, 0.0);

        assert_abs_diff_eq!(color_similarity(&a, &b), 0.0);
        assert_eq!(color_similarity(&a, &ColorDescriptor::invalid()), 0.5);
    }
}
