//! Freehand annotation and rectangular crop editor.
//!
//! # Coordinate Mapping
//!
//! The editor is shown at a preview size that fits inside a square of
//! `max_side` pixels, keeping the aspect ratio and never upscaling. All
//! interaction (strokes, crop selection) happens in those display
//! coordinates. [`Editor::export`] maps every stroke point and the crop
//! rectangle back into source pixels before compositing, so the exported
//! image has the source resolution (or the cropped part of it), not the
//! preview resolution.
//!
//! Drawing and cropping are separate modes. Switching modes keeps the work
//! done in the other one.

use crate::error::{AppError, Result};
use crate::image_processing::EncodedImage;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum diagonal (in display pixels) for a drag to count as a crop selection.
pub const MIN_SELECTION_DISTANCE: f32 = 10.0;

pub const DEFAULT_BRUSH_WIDTH: f32 = 4.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// RGBA color, written as `#rrggbb` or `#rrggbbaa` in annotation documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub Rgba<u8>);

impl Color {
    pub const RED: Color = Color(Rgba([255, 0, 0, 255]));

    pub fn parse(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || AppError::image(format!("Invalid color {hex:?}, expected #rrggbb or #rrggbbaa"));
        if !matches!(digits.len(), 6 | 8) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid());
        let alpha = if digits.len() == 8 { channel(3)? } else { 255 };
        Ok(Color(Rgba([channel(0)?, channel(1)?, channel(2)?, alpha])))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::RED
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

impl TryFrom<String> for Color {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Color::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// A freehand line in display coordinates, with an optional note for the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    #[serde(default)]
    pub color: Color,
    #[serde(default = "default_brush_width")]
    pub width: f32,
    #[serde(default)]
    pub note: String,
}

fn default_brush_width() -> f32 {
    DEFAULT_BRUSH_WIDTH
}

/// Axis-aligned rectangle in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    /// Rectangle spanning two opposite corners, whichever way the drag went.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    #[default]
    Draw,
    Crop,
}

/// Serializable editor work: strokes and an optional crop, in display coordinates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub crop: Option<CropRect>,
}

/// Fits `width` x `height` inside a `max_side` square, keeping aspect ratio and never upscaling.
pub fn fit_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width, height);
    }
    let ratio = max_side as f64 / longest as f64;
    let scale = |side: u32| ((side as f64 * ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

pub struct Editor {
    source_size: (u32, u32),
    display_size: (u32, u32),
    mode: EditorMode,
    brush_color: Color,
    brush_width: f32,
    strokes: Vec<Stroke>,
    active_stroke: Option<Stroke>,
    crop: Option<CropRect>,
    crop_drag: Option<(Point, Point)>,
}

impl Editor {
    /// Creates an editor for a source image of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ImageProcessing`] if either dimension is zero.
    pub fn new(source_width: u32, source_height: u32, max_side: u32) -> Result<Self> {
        if source_width == 0 || source_height == 0 {
            return Err(AppError::image("Cannot edit an image with zero width or height"));
        }
        Ok(Self {
            source_size: (source_width, source_height),
            display_size: fit_dimensions(source_width, source_height, max_side.max(1)),
            mode: EditorMode::Draw,
            brush_color: Color::default(),
            brush_width: DEFAULT_BRUSH_WIDTH,
            strokes: Vec::new(),
            active_stroke: None,
            crop: None,
            crop_drag: None,
        })
    }

    pub fn for_image(image: &DynamicImage, max_side: u32) -> Result<Self> {
        Self::new(image.width(), image.height(), max_side)
    }

    pub fn source_size(&self) -> (u32, u32) {
        self.source_size
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display_size
    }

    /// Source pixels per display pixel, per axis.
    pub fn scale(&self) -> (f32, f32) {
        (
            self.source_size.0 as f32 / self.display_size.0 as f32,
            self.source_size.1 as f32 / self.display_size.1 as f32,
        )
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    /// Switches mode. An in-progress stroke or crop drag is finished first.
    pub fn set_mode(&mut self, mode: EditorMode) {
        if self.mode == mode {
            return;
        }
        self.end_stroke();
        self.finish_crop();
        self.mode = mode;
    }

    pub fn set_brush(&mut self, color: Color, width: f32) {
        self.brush_color = color;
        self.brush_width = width.max(1.0);
    }

    // Drawing

    /// Starts a stroke at `point`. Ignored outside draw mode.
    pub fn begin_stroke(&mut self, point: Point, note: impl Into<String>) -> bool {
        if self.mode != EditorMode::Draw {
            return false;
        }
        self.end_stroke();
        self.active_stroke = Some(Stroke {
            points: vec![point],
            color: self.brush_color,
            width: self.brush_width,
            note: note.into(),
        });
        true
    }

    pub fn extend_stroke(&mut self, point: Point) {
        if let Some(stroke) = self.active_stroke.as_mut() {
            stroke.points.push(point);
        }
    }

    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.active_stroke.take() {
            self.strokes.push(stroke);
        }
    }

    pub fn undo_stroke(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    pub fn clear_strokes(&mut self) {
        self.strokes.clear();
        self.active_stroke = None;
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Non-empty notes attached to strokes, in creation order.
    pub fn notes(&self) -> Vec<&str> {
        self.strokes
            .iter()
            .map(|s| s.note.trim())
            .filter(|note| !note.is_empty())
            .collect()
    }

    // Cropping

    /// Starts a crop drag at `point`. Ignored outside crop mode.
    pub fn begin_crop(&mut self, point: Point) -> bool {
        if self.mode != EditorMode::Crop {
            return false;
        }
        self.crop_drag = Some((point, point));
        true
    }

    pub fn update_crop(&mut self, point: Point) {
        if let Some((_, current)) = self.crop_drag.as_mut() {
            *current = point;
        }
    }

    /// Ends the crop drag. A long enough drag replaces the current crop;
    /// a short one is discarded and leaves the current crop alone.
    pub fn finish_crop(&mut self) -> Option<CropRect> {
        let (start, end) = self.crop_drag.take()?;
        if start.distance(end) <= MIN_SELECTION_DISTANCE {
            return None;
        }
        self.set_crop(CropRect::from_corners(start, end))
    }

    /// Replaces the crop, clamped to the preview. Returns the stored rectangle,
    /// or `None` if nothing of it lies inside the preview.
    pub fn set_crop(&mut self, rect: CropRect) -> Option<CropRect> {
        let (w, h) = (self.display_size.0 as f32, self.display_size.1 as f32);
        let x0 = rect.x.clamp(0.0, w);
        let y0 = rect.y.clamp(0.0, h);
        let x1 = (rect.x + rect.width).clamp(0.0, w);
        let y1 = (rect.y + rect.height).clamp(0.0, h);
        if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
            return None;
        }
        let clamped = CropRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        };
        self.crop = Some(clamped);
        self.crop
    }

    pub fn clear_crop(&mut self) {
        self.crop = None;
        self.crop_drag = None;
    }

    pub fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    // Documents

    /// Loads strokes and crop from a document, replacing current work.
    ///
    /// Points may lie outside the preview; they are clipped at export.
    /// Brush widths are capped at the preview diagonal.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ImageProcessing`] if a coordinate or width is not a
    /// finite number, or a width is not positive. Current work is left untouched.
    pub fn apply(&mut self, annotations: &Annotations) -> Result<()> {
        let max_width = self.display_diagonal();
        let mut strokes = Vec::with_capacity(annotations.strokes.len());
        for (i, stroke) in annotations.strokes.iter().enumerate() {
            if !stroke.width.is_finite() || stroke.width <= 0.0 {
                return Err(AppError::image(format!("Stroke {i} has invalid width {}", stroke.width)));
            }
            if stroke.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
                return Err(AppError::image(format!("Stroke {i} has a non-finite point")));
            }
            strokes.push(Stroke {
                width: stroke.width.min(max_width),
                ..stroke.clone()
            });
        }
        if let Some(rect) = annotations.crop {
            if ![rect.x, rect.y, rect.width, rect.height].iter().all(|v| v.is_finite()) {
                return Err(AppError::image("Crop rectangle has a non-finite value"));
            }
        }

        self.active_stroke = None;
        self.strokes = strokes;
        self.crop = None;
        if let Some(rect) = annotations.crop {
            self.set_crop(rect);
        }
        Ok(())
    }

    fn display_diagonal(&self) -> f32 {
        let (w, h) = (self.display_size.0 as f32, self.display_size.1 as f32);
        (w * w + h * h).sqrt()
    }

    pub fn annotations(&self) -> Annotations {
        Annotations {
            strokes: self.strokes.clone(),
            crop: self.crop,
        }
    }

    // Export

    pub fn to_source(&self, point: Point) -> Point {
        let (sx, sy) = self.scale();
        Point::new(point.x * sx, point.y * sy)
    }

    /// Crop rectangle in source pixels as `(x, y, width, height)`, clamped to the image.
    pub fn source_crop(&self) -> Option<(u32, u32, u32, u32)> {
        let rect = self.crop?;
        let (sx, sy) = self.scale();
        let (src_w, src_h) = self.source_size;

        let x = ((rect.x * sx).round().max(0.0) as u32).min(src_w - 1);
        let y = ((rect.y * sy).round().max(0.0) as u32).min(src_h - 1);
        let width = ((rect.width * sx).round() as u32).clamp(1, src_w - x);
        let height = ((rect.height * sy).round() as u32).clamp(1, src_h - y);
        Some((x, y, width, height))
    }

    /// Renders strokes onto a copy of `source` and applies the crop, at source resolution.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ImageProcessing`] if `source` is not the size the editor was built for.
    pub fn export(&self, source: &DynamicImage) -> Result<DynamicImage> {
        if (source.width(), source.height()) != self.source_size {
            return Err(AppError::image(format!(
                "Editor was built for a {}x{} image, got {}x{}",
                self.source_size.0,
                self.source_size.1,
                source.width(),
                source.height()
            )));
        }

        let mut canvas: RgbaImage = source.to_rgba8();
        let (sx, sy) = self.scale();
        let width_scale = (sx + sy) / 2.0;

        for stroke in self.strokes.iter().chain(self.active_stroke.iter()) {
            let points: Vec<Point> = stroke.points.iter().map(|p| self.to_source(*p)).collect();
            paint_stroke(&mut canvas, &points, stroke.color.0, stroke.width * width_scale);
        }

        let mut output = DynamicImage::ImageRgba8(canvas);
        if let Some((x, y, width, height)) = self.source_crop() {
            output = output.crop_imm(x, y, width, height);
        }
        tracing::debug!(width = output.width(), height = output.height(), "exported edited image");
        Ok(output)
    }

    /// [`export`](Self::export), encoded as PNG.
    pub fn export_encoded(&self, source: &DynamicImage) -> Result<EncodedImage> {
        EncodedImage::encode_png(&self.export(source)?)
    }
}

/// Stamps round brush dabs along the polyline so the line has even thickness.
///
/// Segments are clipped to the canvas grown by the brush radius, so the
/// number of dabs is bounded by the canvas size whatever the coordinates.
fn paint_stroke(canvas: &mut RgbaImage, points: &[Point], color: Rgba<u8>, width: f32) {
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    let diagonal = (w * w + h * h).sqrt();
    let radius = (width / 2.0).clamp(0.5, diagonal.max(0.5));
    let spacing = (radius / 2.0).max(0.5);
    let bounds = (-radius, -radius, w + radius, h + radius);
    let dab = |canvas: &mut RgbaImage, p: Point| {
        draw_filled_circle_mut(canvas, (p.x.round() as i32, p.y.round() as i32), radius.round() as i32, color);
    };

    if let [only] = points {
        if let Some((a, _)) = clip_segment(*only, *only, bounds) {
            dab(canvas, a);
        }
        return;
    }

    for pair in points.windows(2) {
        let Some((a, b)) = clip_segment(pair[0], pair[1], bounds) else {
            continue;
        };
        let steps = (a.distance(b) / spacing).ceil().max(1.0) as u32;
        dab(canvas, a);
        for step in 1..=steps {
            let t = step as f32 / steps as f32;
            dab(canvas, Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t));
        }
    }
}

/// Liang-Barsky clip of the segment `a`-`b` to `(min_x, min_y, max_x, max_y)`.
fn clip_segment(a: Point, b: Point, bounds: (f32, f32, f32, f32)) -> Option<(Point, Point)> {
    if ![a.x, a.y, b.x, b.y].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (min_x, min_y, max_x, max_y) = bounds;
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (mut t0, mut t1) = (0.0f32, 1.0f32);

    for (p, q) in [(-dx, a.x - min_x), (dx, max_x - a.x), (-dy, a.y - min_y), (dy, max_y - a.y)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f32| Point::new(a.x + dx * t, a.y + dy * t);
    Some((at(t0), at(t1)))
}
