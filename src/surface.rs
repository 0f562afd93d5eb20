//! Raster drawing surface: pointer-driven ink, pen/eraser tools, clearing and
//! PNG snapshots.
//!
//! The surface is a pixel buffer, not a stroke log. Pen segments are painted
//! source-over with round caps; eraser segments punch pixels back to fully
//! transparent regardless of what was there.

use std::io::Cursor;

use base64::Engine as _;
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::{debug, instrument};

use crate::config::SurfaceConfig;
use crate::domain::{Color, Mode, Point};
use crate::error::SubmitError;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Axis-aligned ink bounds in pixel coordinates (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InkBounds {
  pub min_x: u32,
  pub min_y: u32,
  pub max_x: u32,
  pub max_y: u32,
}

impl InkBounds {
  pub fn center(&self) -> Point {
    Point::new(
      (self.min_x + self.max_x) as f32 / 2.0,
      (self.min_y + self.max_y) as f32 / 2.0,
    )
  }
}

pub struct Surface {
  pixels: RgbaImage,
  mode: Mode,
  active_color: Color,
  saved_color: Color,
  drawing: bool,
  last: Point,
  pen_width: f32,
  eraser_width: f32,
}

impl Surface {
  pub fn new(cfg: &SurfaceConfig) -> Self {
    Self {
      pixels: RgbaImage::from_pixel(cfg.width.max(1), cfg.height.max(1), TRANSPARENT),
      mode: Mode::Pen,
      active_color: cfg.default_color,
      saved_color: cfg.default_color,
      drawing: false,
      last: Point::default(),
      pen_width: cfg.pen_width,
      eraser_width: cfg.eraser_width,
    }
  }

  pub fn mode(&self) -> Mode { self.mode }
  pub fn active_color(&self) -> Color { self.active_color }
  pub fn is_drawing(&self) -> bool { self.drawing }

  /// Start a stroke at `p`. Ignored while a stroke is already active.
  pub fn begin_stroke(&mut self, p: Point) {
    if self.drawing {
      return;
    }
    self.last = p;
    self.drawing = true;
  }

  /// Paint a straight segment from the previous point to `p` with the active tool.
  pub fn extend_stroke(&mut self, p: Point) {
    if !self.drawing {
      return;
    }
    let from = self.last;
    match self.mode {
      Mode::Pen => {
        let color = self.active_color;
        self.paint_segment(from, p, self.pen_width, |px| blend_over(px, color));
      }
      Mode::Eraser => {
        self.paint_segment(from, p, self.eraser_width, |px| *px = TRANSPARENT);
      }
    }
    self.last = p;
  }

  pub fn end_stroke(&mut self) {
    self.drawing = false;
  }

  pub fn set_mode(&mut self, mode: Mode) {
    if mode == self.mode {
      return;
    }
    match mode {
      Mode::Eraser => self.saved_color = self.active_color,
      Mode::Pen => self.active_color = self.saved_color,
    }
    debug!(target: "surface", ?mode, "Tool switched");
    self.mode = mode;
  }

  /// Changes the pen colour. While erasing the change is dropped, so leaving
  /// the eraser restores exactly the colour that was active before it.
  pub fn set_color(&mut self, color: Color) {
    if self.mode == Mode::Eraser {
      return;
    }
    self.active_color = color;
  }

  /// Wipe the raster. Tool and colour are kept.
  pub fn clear(&mut self) {
    for px in self.pixels.pixels_mut() {
      *px = TRANSPARENT;
    }
  }

  /// Encode the current raster as a `data:image/png;base64,...` URL.
  #[instrument(level = "debug", skip(self))]
  pub fn snapshot(&self) -> Result<String, SubmitError> {
    let mut buf = Cursor::new(Vec::new());
    self.pixels
      .write_to(&mut buf, ImageFormat::Png)
      .map_err(|e| SubmitError::Encode(e.to_string()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
    Ok(format!("data:image/png;base64,{encoded}"))
  }

  /// Bounding box of every pixel with non-zero alpha, or None on a blank surface.
  /// Full scan of the buffer.
  pub fn ink_bounds(&self) -> Option<InkBounds> {
    let mut bounds: Option<InkBounds> = None;
    for (x, y, px) in self.pixels.enumerate_pixels() {
      if px.0[3] == 0 {
        continue;
      }
      bounds = Some(match bounds {
        None => InkBounds { min_x: x, min_y: y, max_x: x, max_y: y },
        Some(b) => InkBounds {
          min_x: b.min_x.min(x),
          min_y: b.min_y.min(y),
          max_x: b.max_x.max(x),
          max_y: b.max_y.max(y),
        },
      });
    }
    bounds
  }

  #[cfg(test)]
  pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
    self.pixels.get_pixel(x, y).0
  }

  fn paint_segment(&mut self, from: Point, to: Point, width: f32, mut apply: impl FnMut(&mut Rgba<u8>)) {
    let r = (width / 2.0).max(0.5);
    let (w, h) = self.pixels.dimensions();

    let lo_x = from.x.min(to.x) - r;
    let hi_x = from.x.max(to.x) + r;
    let lo_y = from.y.min(to.y) - r;
    let hi_y = from.y.max(to.y) + r;
    if hi_x < 0.0 || hi_y < 0.0 || lo_x >= w as f32 || lo_y >= h as f32 {
      return;
    }
    let x0 = lo_x.floor().max(0.0) as u32;
    let y0 = lo_y.floor().max(0.0) as u32;
    let x1 = (hi_x.ceil() as u32).min(w - 1);
    let y1 = (hi_y.ceil() as u32).min(h - 1);

    let r2 = r * r;
    for y in y0..=y1 {
      for x in x0..=x1 {
        let c = Point::new(x as f32 + 0.5, y as f32 + 0.5);
        if dist2_to_segment(c, from, to) <= r2 {
          apply(self.pixels.get_pixel_mut(x, y));
        }
      }
    }
  }
}

fn dist2_to_segment(p: Point, a: Point, b: Point) -> f32 {
  let (abx, aby) = (b.x - a.x, b.y - a.y);
  let len2 = abx * abx + aby * aby;
  let t = if len2 == 0.0 {
    0.0
  } else {
    (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0)
  };
  let (dx, dy) = (p.x - (a.x + t * abx), p.y - (a.y + t * aby));
  dx * dx + dy * dy
}

fn blend_over(dst: &mut Rgba<u8>, src: Color) {
  let [sr, sg, sb, sa] = src.rgba();
  if sa == 255 {
    *dst = Rgba([sr, sg, sb, 255]);
    return;
  }
  let sa_f = sa as f32 / 255.0;
  let da_f = dst.0[3] as f32 / 255.0;
  let out_a = sa_f + da_f * (1.0 - sa_f);
  if out_a <= 0.0 {
    *dst = TRANSPARENT;
    return;
  }
  let mix = |s: u8, d: u8| {
    ((s as f32 * sa_f + d as f32 * da_f * (1.0 - sa_f)) / out_a).round().clamp(0.0, 255.0) as u8
  };
  *dst = Rgba([
    mix(sr, dst.0[0]),
    mix(sg, dst.0[1]),
    mix(sb, dst.0[2]),
    (out_a * 255.0).round() as u8,
  ]);
}
