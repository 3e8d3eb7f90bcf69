//! Diagonal text overlay for pages that may not be downloaded.
//!
//! Text is drawn with a small built-in 5x7 bitmap font so that stamping needs nothing
//! beyond the raster itself. Characters outside the glyph set render as `?`.

use crate::config::{ConfigError, WatermarkConfig};
use crate::document::{CallerIdentity, PageNumber};
use doc_decoder::RgbaImage;
use image::{Pixel, Rgba};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Glyph width plus one column of spacing
const CELL_WIDTH: u32 = GLYPH_WIDTH + 1;
/// Text never grows taller than this fraction of the page height
const MAX_HEIGHT_FRACTION: f32 = 0.12;

/// Resolved overlay for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub text: String,
    pub opacity_fraction: f32,
    pub rotation_radians: f32,
}

impl WatermarkSpec {
    /// Builds the overlay for `page` as seen by `identity`.
    pub fn for_page(identity: &CallerIdentity, page: PageNumber, style: &WatermarkStyle) -> Self {
        let name = identity.name_or(&style.fallback_name);
        Self {
            text: format!("{name} - {} - PAGE {page}", style.label),
            opacity_fraction: style.opacity,
            rotation_radians: style.angle_degrees.to_radians(),
        }
    }
}

/// Validated watermark settings shared by every page of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkStyle {
    pub opacity: f32,
    pub angle_degrees: f32,
    pub color: [u8; 3],
    pub width_fraction: f32,
    pub label: String,
    pub fallback_name: String,
}

impl WatermarkStyle {
    pub fn from_config(config: &WatermarkConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            opacity: config.opacity,
            angle_degrees: config.angle_degrees,
            color: config.rgb()?,
            width_fraction: config.width_fraction,
            label: config.label.clone(),
            fallback_name: config.fallback_name.clone(),
        })
    }
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            opacity: 0.15,
            angle_degrees: -30.0,
            color: [255, 0, 0],
            width_fraction: 0.6,
            label: "VIEW ONLY".to_string(),
            fallback_name: "User".to_string(),
        }
    }
}

/// Composites `spec` onto `image`, centered, and returns the number of pixels touched.
pub fn stamp(image: &mut RgbaImage, spec: &WatermarkSpec, style: &WatermarkStyle) -> usize {
    let glyphs: Vec<[u8; 7]> = spec.text.chars().map(glyph).collect();
    if glyphs.is_empty() || image.width() == 0 || image.height() == 0 {
        return 0;
    }

    let (width, height) = (image.width() as f32, image.height() as f32);
    let text_units = (glyphs.len() as u32 * CELL_WIDTH - 1) as f32;
    let unit_px = (width * style.width_fraction / text_units)
        .min(height * MAX_HEIGHT_FRACTION / GLYPH_HEIGHT as f32)
        .max(1.0);

    let alpha = (spec.opacity_fraction.clamp(0.0, 1.0) * 255.0).round() as u8;
    let [r, g, b] = style.color;
    let ink = Rgba([r, g, b, alpha]);

    let (sin, cos) = spec.rotation_radians.sin_cos();
    let (cx, cy) = (width / 2.0, height / 2.0);
    let half_w = text_units / 2.0;
    let half_h = GLYPH_HEIGHT as f32 / 2.0;
    let reach = (half_w * half_w + half_h * half_h).sqrt() * unit_px;

    let x_range = (cx - reach).floor().max(0.0) as u32..(cx + reach).ceil().min(width) as u32;
    let y_range = (cy - reach).floor().max(0.0) as u32..(cy + reach).ceil().min(height) as u32;

    let mut touched = 0;
    for y in y_range {
        for x in x_range.clone() {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            // Undo the rotation to land in text space.
            let u = (dx * cos + dy * sin) / unit_px + half_w;
            let v = (-dx * sin + dy * cos) / unit_px + half_h;
            if u < 0.0 || v < 0.0 || u >= text_units || v >= GLYPH_HEIGHT as f32 {
                continue;
            }

            let column = u as u32;
            let (index, gx) = ((column / CELL_WIDTH) as usize, column % CELL_WIDTH);
            if gx >= GLYPH_WIDTH {
                continue;
            }
            let row = glyphs[index][v as usize];
            if row & (1 << (GLYPH_WIDTH - 1 - gx)) != 0 {
                image.get_pixel_mut(x, y).blend(&ink);
                touched += 1;
            }
        }
    }
    touched
}

fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '@' => [0x0E, 0x11, 0x17, 0x15, 0x17, 0x10, 0x0F],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
