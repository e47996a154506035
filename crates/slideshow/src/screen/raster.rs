//! Software composition of slideshow frames into `0xAARRGGBB` pixels.

// Drawing helpers pass explicit geometry and colours to stay allocation free.
#![allow(clippy::too_many_arguments)]

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use fontdb::{Database, Family, Query, Source};
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbaImage};
use tracing::debug;

use crate::error::ScreenError;
use crate::events::Region;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub fn from_rgb(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self { r, g, b, a: 1.0 }
    }

    pub fn from_rgba(hex: u32, alpha: f32) -> Self {
        let mut value = Self::from_rgb(hex);
        value.a = alpha.clamp(0.0, 1.0);
        value
    }

    fn rgb(self) -> (f32, f32, f32) {
        (self.r, self.g, self.b)
    }
}

pub const BACKGROUND: u32 = 0xFF00_0000;

/// Pending frame.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            pixels: vec![BACKGROUND; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn clear(&mut self) {
        self.pixels.fill(BACKGROUND);
    }

    /// Scale `img` to fit the canvas, keeping its aspect ratio, and centre it.
    pub fn draw_image(&mut self, img: &RgbaImage) {
        let (width, height) = fit_within(img.width(), img.height(), self.width, self.height);
        if width == 0 || height == 0 {
            return;
        }
        let scaled;
        let src = if (width, height) == img.dimensions() {
            img
        } else {
            scaled = imageops::resize(img, width, height, FilterType::Triangle);
            &scaled
        };
        let left = (self.width - width) / 2;
        let top = (self.height - height) / 2;
        for (x, y, px) in src.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            let idx = ((top + y) * self.width + left + x) as usize;
            let color = Color {
                r: f32::from(r) / 255.0,
                g: f32::from(g) / 255.0,
                b: f32::from(b) / 255.0,
                a: f32::from(a) / 255.0,
            };
            if a == 255 {
                self.pixels[idx] = pack_color(color.rgb());
            } else {
                self.blend_pixel((left + x) as f32, (top + y) as f32, color, 1.0);
            }
        }
    }

    pub fn fill_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, color: Color) {
        let x0 = left.max(0.0).floor() as i32;
        let y0 = top.max(0.0).floor() as i32;
        let x1 = right.min(self.width as f32).ceil() as i32;
        let y1 = bottom.min(self.height as f32).ceil() as i32;
        for y in y0.max(0)..y1.min(self.height as i32) {
            for x in x0.max(0)..x1.min(self.width as i32) {
                self.blend_pixel(x as f32, y as f32, color, color.a);
            }
        }
    }

    /// One-pixel rectangle outline.
    pub fn stroke_rect(&mut self, region: Region, color: Color) {
        let left = region.x as f32;
        let top = region.y as f32;
        let right = left + region.width as f32;
        let bottom = top + region.height as f32;
        self.fill_rect(left, top, right, top + 1.0, color);
        self.fill_rect(left, bottom - 1.0, right, bottom, color);
        self.fill_rect(left, top, left + 1.0, bottom, color);
        self.fill_rect(right - 1.0, top, right, bottom, color);
    }

    pub fn draw_text(
        &mut self,
        font: &FontArc,
        text: &str,
        color: Color,
        left: f32,
        baseline: f32,
        scale: PxScale,
    ) {
        let scaled = font.as_scaled(scale);
        let mut cursor_x = left;
        let mut previous = None;
        for ch in text.chars() {
            if ch.is_control() {
                continue;
            }
            let glyph = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                cursor_x += scaled.kern(prev, glyph);
            }
            let advance = scaled.h_advance(glyph);
            let mut positioned = scaled.scaled_glyph(ch);
            positioned.position = point(cursor_x, baseline);
            if let Some(outline) = font.outline_glyph(positioned) {
                let bounds = outline.px_bounds();
                outline.draw(|x, y, coverage| {
                    self.blend_pixel(
                        bounds.min.x + x as f32,
                        bounds.min.y + y as f32,
                        color,
                        coverage,
                    );
                });
            }
            cursor_x += advance;
            previous = Some(glyph);
        }
    }

    fn blend_pixel(&mut self, x: f32, y: f32, color: Color, coverage: f32) {
        if coverage <= 0.0 {
            return;
        }
        let xi = x.floor() as i32;
        let yi = y.floor() as i32;
        if xi < 0 || yi < 0 || xi >= self.width as i32 || yi >= self.height as i32 {
            return;
        }
        let idx = (yi as u32 * self.width + xi as u32) as usize;
        let src_a = (color.a * coverage).clamp(0.0, 1.0);
        let dst = unpack_color(self.pixels[idx]);
        self.pixels[idx] = pack_color(blend(color.rgb(), dst, src_a));
    }
}

/// Largest size with the aspect ratio of `src` that fits in `bounds`.
pub fn fit_within(src_w: u32, src_h: u32, bounds_w: u32, bounds_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (0, 0);
    }
    let scale = (bounds_w as f64 / src_w as f64).min(bounds_h as f64 / src_h as f64);
    let width = ((src_w as f64 * scale).round() as u32).clamp(1, bounds_w);
    let height = ((src_h as f64 * scale).round() as u32).clamp(1, bounds_h);
    (width, height)
}

fn blend(src: (f32, f32, f32), dst: (f32, f32, f32), alpha: f32) -> (f32, f32, f32) {
    (
        src.0 * alpha + dst.0 * (1.0 - alpha),
        src.1 * alpha + dst.1 * (1.0 - alpha),
        src.2 * alpha + dst.2 * (1.0 - alpha),
    )
}

fn unpack_color(value: u32) -> (f32, f32, f32) {
    let r = ((value >> 16) & 0xFF) as f32 / 255.0;
    let g = ((value >> 8) & 0xFF) as f32 / 255.0;
    let b = (value & 0xFF) as f32 / 255.0;
    (r, g, b)
}

fn pack_color(color: (f32, f32, f32)) -> u32 {
    let r = (color.0.clamp(0.0, 1.0) * 255.0).round() as u32;
    let g = (color.1.clamp(0.0, 1.0) * 255.0).round() as u32;
    let b = (color.2.clamp(0.0, 1.0) * 255.0).round() as u32;
    0xFF00_0000 | (r << 16) | (g << 8) | b
}

pub fn measure_text(font: &FontArc, text: &str, scale: PxScale) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0;
    let mut previous = None;
    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    width
}

/// Greedy word wrap; a single word wider than `max_width` gets its own line.
pub fn wrap_text(text: &str, font: &FontArc, scale: PxScale, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();
    for word in text.split_whitespace() {
        let candidate = if current_line.is_empty() {
            word.to_string()
        } else {
            format!("{current_line} {word}")
        };
        if measure_text(font, &candidate, scale) <= max_width {
            current_line = candidate;
        } else {
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            current_line = word.to_string();
        }
    }
    if !current_line.is_empty() {
        lines.push(current_line);
    }
    lines
}

/// Decode a picture and apply its EXIF orientation.
pub fn load_picture(path: &Path) -> Result<RgbaImage, ScreenError> {
    let decoded = ImageReader::open(path)
        .map_err(|err| ScreenError::Picture {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(err),
        })?
        .with_guessed_format()
        .map_err(|err| ScreenError::Picture {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(err),
        })?
        .decode()
        .map_err(|source| ScreenError::Picture {
            path: path.to_path_buf(),
            source,
        })?;
    let img = decoded.to_rgba8();
    Ok(match read_orientation(path).unwrap_or(1) {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    })
}

fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)?;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}

/// Pick a sans-serif system font.
pub fn load_font() -> Result<FontArc, ScreenError> {
    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::Name("Liberation Sans"),
        Family::SansSerif,
    ];
    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)
        {
            return Ok(font);
        }
    }
    db.faces()
        .find_map(|face| load_face(&db, face.id))
        .ok_or_else(|| ScreenError::Font("no loadable face in the system font database".into()))
}

fn load_face(db: &Database, id: fontdb::ID) -> Option<FontArc> {
    let face = db.face(id)?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => fs::read(path).ok()?,
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    FontArc::try_from_vec(data).ok()
}
