//! 8-bit coverage masks for bitmap effects
//!
//! A [`CoverageMask`] is a rectangle of alpha coverage in device space.
//! Effect compositing extracts one from a layer's raster, box-blurs it,
//! offsets it, and recombines it against the unblurred source before
//! tinting and blending the result into the parent layer.
//!
//! The blur is a separable two-pass integer box filter; bounds expand by
//! the kernel radius on each side so no coverage is clipped. All the
//! combination math is u8 with rounding division.

use crate::color::Rgba;
use crate::error::SurfaceError;
use crate::geometry::IntRect;
use crate::surface;
use tiny_skia::{Pixmap, PremultipliedColorU8};

/// A rectangular 8-bit alpha coverage mask in device space
#[derive(Debug, Clone)]
pub(crate) struct CoverageMask {
  bounds: IntRect,
  data: Vec<u8>,
}

impl CoverageMask {
  /// Allocates a zeroed mask over `bounds`, fallibly
  pub fn try_new(bounds: IntRect) -> Result<Self, SurfaceError> {
    if bounds.is_empty() {
      return Err(SurfaceError::InvalidParameters {
        message: "coverage mask bounds are empty".to_string(),
      });
    }
    let area = bounds.area();
    if area > surface::MAX_SURFACE_BYTES {
      return Err(SurfaceError::AllocationRejected {
        message: format!("coverage mask of {} pixels exceeds limit", area),
      });
    }

    let mut data = Vec::new();
    data
      .try_reserve_exact(area as usize)
      .map_err(|err| SurfaceError::AllocationRejected {
        message: format!("coverage mask allocation failed: {err}"),
      })?;
    data.resize(area as usize, 0);
    Ok(Self { bounds, data })
  }

  /// Extracts the alpha channel of a raster positioned at `origin`
  pub fn from_pixmap_alpha(pixmap: &Pixmap, origin: (i32, i32)) -> Result<Self, SurfaceError> {
    let bounds = IntRect::from_xywh(origin.0, origin.1, pixmap.width(), pixmap.height());
    let mut mask = Self::try_new(bounds)?;
    for (dst, px) in mask.data.iter_mut().zip(pixmap.pixels().iter()) {
      *dst = px.alpha();
    }
    Ok(mask)
  }

  pub fn bounds(&self) -> IntRect {
    self.bounds
  }

  /// Coverage at a device pixel; zero outside the mask
  pub fn sample(&self, x: i32, y: i32) -> u8 {
    if !self.bounds.contains(x, y) {
      return 0;
    }
    let w = self.bounds.width() as usize;
    let ix = (x - self.bounds.left) as usize;
    let iy = (y - self.bounds.top) as usize;
    self.data[iy * w + ix]
  }

  /// Translates the mask in device space
  pub fn offset(mut self, dx: i32, dy: i32) -> Self {
    self.bounds = self.bounds.offset(dx, dy);
    self
  }

  /// Box-blurs the mask, expanding bounds by the kernel radii
  ///
  /// Radii are in device pixels; a zero radius on both axes returns an
  /// unblurred copy. The filter is separable: one horizontal pass into
  /// a widened intermediate, one vertical pass into the final mask.
  pub fn box_blur(&self, rx: i32, ry: i32) -> Result<Self, SurfaceError> {
    let rx = rx.max(0);
    let ry = ry.max(0);
    if rx == 0 && ry == 0 {
      return Ok(self.clone());
    }

    // Horizontal pass
    let mid_bounds = self.bounds.expand(rx, 0);
    let mut mid = Self::try_new(mid_bounds)?;
    let mid_w = mid_bounds.width() as usize;
    let window = (2 * rx + 1) as u32;
    for y in self.bounds.top..self.bounds.bottom {
      let row = (y - mid_bounds.top) as usize * mid_w;
      let mut sum: u32 = 0;
      // Prime the window for the first output pixel
      for x in (mid_bounds.left - rx)..(mid_bounds.left + rx + 1) {
        sum += self.sample(x, y) as u32;
      }
      for x in mid_bounds.left..mid_bounds.right {
        mid.data[row + (x - mid_bounds.left) as usize] = ((sum + window / 2) / window) as u8;
        sum += self.sample(x + rx + 1, y) as u32;
        sum -= self.sample(x - rx, y) as u32;
      }
    }

    if ry == 0 {
      return Ok(mid);
    }

    // Vertical pass
    let out_bounds = mid_bounds.expand(0, ry);
    let mut out = Self::try_new(out_bounds)?;
    let out_w = out_bounds.width() as usize;
    let window = (2 * ry + 1) as u32;
    for x in out_bounds.left..out_bounds.right {
      let col = (x - out_bounds.left) as usize;
      let mut sum: u32 = 0;
      for y in (out_bounds.top - ry)..(out_bounds.top + ry + 1) {
        sum += mid.sample(x, y) as u32;
      }
      for y in out_bounds.top..out_bounds.bottom {
        out.data[(y - out_bounds.top) as usize * out_w + col] =
          ((sum + window / 2) / window) as u8;
        sum += mid.sample(x, y + ry + 1) as u32;
        sum -= mid.sample(x, y - ry) as u32;
      }
    }

    Ok(out)
  }

  /// Pushes the blurred ramp toward full coverage
  ///
  /// `spread` in [0, 1): every value is divided by `1 - spread` and
  /// clamped; at 1.0 any nonzero coverage becomes solid.
  pub fn apply_spread(&mut self, spread: f32) {
    let spread = spread.clamp(0.0, 1.0);
    if spread == 0.0 {
      return;
    }
    if spread >= 1.0 {
      for v in &mut self.data {
        if *v > 0 {
          *v = 255;
        }
      }
      return;
    }
    let scale = 1.0 / (1.0 - spread);
    for v in &mut self.data {
      *v = ((*v as f32 * scale).round()).min(255.0) as u8;
    }
  }

  /// Multiplies every coverage value by an alpha factor in [0, 1]
  pub fn scale_alpha(&mut self, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha >= 1.0 {
      return;
    }
    let factor = (alpha * 256.0).round() as u32;
    for v in &mut self.data {
      *v = ((*v as u32 * factor) >> 8) as u8;
    }
  }

  /// The complement of `source` coverage over `bounds`
  ///
  /// Pixels outside `source` read as fully covered in the result.
  pub fn inverted_within(source: &Self, bounds: IntRect) -> Result<Self, SurfaceError> {
    let mut out = Self::try_new(bounds)?;
    let w = bounds.width() as usize;
    for y in bounds.top..bounds.bottom {
      let row = (y - bounds.top) as usize * w;
      for x in bounds.left..bounds.right {
        out.data[row + (x - bounds.left) as usize] = 255 - source.sample(x, y);
      }
    }
    Ok(out)
  }

  /// Restricts this (blurred) mask to the inside of `source`
  ///
  /// Result bounds are the overlap of the two masks.
  pub fn restrict_inner(&self, source: &Self) -> Result<Self, SurfaceError> {
    let bounds = self.bounds.intersect(source.bounds);
    if bounds.is_empty() {
      return Err(SurfaceError::InvalidParameters {
        message: "inner restriction has no overlap".to_string(),
      });
    }
    let mut out = Self::try_new(bounds)?;
    let w = bounds.width() as usize;
    for y in bounds.top..bounds.bottom {
      let row = (y - bounds.top) as usize * w;
      for x in bounds.left..bounds.right {
        out.data[row + (x - bounds.left) as usize] =
          mul_u8(self.sample(x, y), source.sample(x, y));
      }
    }
    Ok(out)
  }

  /// Inverts this (blurred) mask against the inside of `source`
  ///
  /// Result bounds are the source's bounds; where this mask does not
  /// reach, the source interior is fully covered.
  pub fn restrict_inverted_inner(&self, source: &Self) -> Result<Self, SurfaceError> {
    let bounds = source.bounds;
    let mut out = Self::try_new(bounds)?;
    let w = bounds.width() as usize;
    for y in bounds.top..bounds.bottom {
      let row = (y - bounds.top) as usize * w;
      for x in bounds.left..bounds.right {
        out.data[row + (x - bounds.left) as usize] =
          mul_u8(255 - self.sample(x, y), source.sample(x, y));
      }
    }
    Ok(out)
  }

  /// Restricts this (blurred) mask to the outside of `source`
  pub fn restrict_outer(&self, source: &Self) -> Result<Self, SurfaceError> {
    let bounds = self.bounds;
    let mut out = Self::try_new(bounds)?;
    let w = bounds.width() as usize;
    for y in bounds.top..bounds.bottom {
      let row = (y - bounds.top) as usize * w;
      for x in bounds.left..bounds.right {
        out.data[row + (x - bounds.left) as usize] =
          mul_u8(self.sample(x, y), 255 - source.sample(x, y));
      }
    }
    Ok(out)
  }

  /// Renders the mask as a premultiplied solid-color raster
  ///
  /// The mask's own coverage becomes the alpha channel; `color`'s RGB
  /// is premultiplied per pixel. The caller blits the result into the
  /// parent layer with the effect's blend mode.
  pub fn to_pixmap(&self, color: Rgba) -> Result<Pixmap, SurfaceError> {
    let mut pixmap = surface::new_pixmap(self.bounds.width(), self.bounds.height())?;
    let r = color.r as u16;
    let g = color.g as u16;
    let b = color.b as u16;
    for (px, &alpha) in pixmap.pixels_mut().iter_mut().zip(self.data.iter()) {
      if alpha == 0 {
        continue;
      }
      let a = alpha as u16;
      *px = PremultipliedColorU8::from_rgba(
        ((r * a + 127) / 255) as u8,
        ((g * a + 127) / 255) as u8,
        ((b * a + 127) / 255) as u8,
        alpha,
      )
      .unwrap_or(PremultipliedColorU8::TRANSPARENT);
    }
    Ok(pixmap)
  }
}

#[inline]
fn mul_u8(a: u8, b: u8) -> u8 {
  ((a as u16 * b as u16 + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
  use super::*;

  fn solid_mask(bounds: IntRect, value: u8) -> CoverageMask {
    let mut mask = CoverageMask::try_new(bounds).unwrap();
    mask.data.fill(value);
    mask
  }

  #[test]
  fn sample_outside_bounds_is_zero() {
    let mask = solid_mask(IntRect::new(2, 2, 4, 4), 200);
    assert_eq!(mask.sample(2, 2), 200);
    assert_eq!(mask.sample(1, 2), 0);
    assert_eq!(mask.sample(4, 4), 0);
  }

  #[test]
  fn blur_expands_bounds() {
    let mask = solid_mask(IntRect::new(0, 0, 4, 4), 255);
    let blurred = mask.box_blur(2, 3).unwrap();
    assert_eq!(blurred.bounds(), IntRect::new(-2, -3, 6, 7));
  }

  #[test]
  fn zero_radius_blur_is_identity() {
    let mask = solid_mask(IntRect::new(1, 1, 5, 5), 180);
    let blurred = mask.box_blur(0, 0).unwrap();
    assert_eq!(blurred.bounds(), mask.bounds());
    assert_eq!(blurred.sample(2, 2), 180);
  }

  #[test]
  fn blur_preserves_interior_and_ramps_edges() {
    let mask = solid_mask(IntRect::new(0, 0, 9, 9), 255);
    let blurred = mask.box_blur(2, 2).unwrap();
    // Deep interior: full window is covered
    assert_eq!(blurred.sample(4, 4), 255);
    // Just outside the original edge: partial coverage
    let edge = blurred.sample(-1, 4);
    assert!(edge > 0 && edge < 255, "edge coverage was {}", edge);
    // Far corner of the expanded bounds: minimal coverage
    assert!(blurred.sample(-2, -2) < edge);
  }

  #[test]
  fn offset_translates_bounds() {
    let mask = solid_mask(IntRect::new(0, 0, 2, 2), 100);
    let moved = mask.offset(3, -1);
    assert_eq!(moved.bounds(), IntRect::new(3, -1, 5, 1));
    assert_eq!(moved.sample(3, -1), 100);
    assert_eq!(moved.sample(0, 0), 0);
  }

  #[test]
  fn spread_pushes_ramp_toward_solid() {
    let mut mask = solid_mask(IntRect::new(0, 0, 2, 1), 128);
    mask.apply_spread(0.5);
    assert_eq!(mask.sample(0, 0), 255);

    let mut faint = solid_mask(IntRect::new(0, 0, 2, 1), 40);
    faint.apply_spread(0.5);
    assert_eq!(faint.sample(0, 0), 80);

    let mut binary = solid_mask(IntRect::new(0, 0, 2, 1), 1);
    binary.apply_spread(1.0);
    assert_eq!(binary.sample(0, 0), 255);
  }

  #[test]
  fn scale_alpha_halves_coverage() {
    let mut mask = solid_mask(IntRect::new(0, 0, 2, 1), 200);
    mask.scale_alpha(0.5);
    assert_eq!(mask.sample(0, 0), 100);
  }

  #[test]
  fn restrict_inner_masks_to_source() {
    let blurred = solid_mask(IntRect::new(0, 0, 6, 6), 200);
    let source = solid_mask(IntRect::new(2, 2, 8, 8), 255);
    let inner = blurred.restrict_inner(&source).unwrap();
    assert_eq!(inner.bounds(), IntRect::new(2, 2, 6, 6));
    assert_eq!(inner.sample(3, 3), 200);
    assert_eq!(inner.sample(1, 1), 0);
  }

  #[test]
  fn restrict_inverted_inner_fills_unreached_interior() {
    // Blur covers only the left half of the source
    let blurred = solid_mask(IntRect::new(0, 0, 4, 8), 255);
    let source = solid_mask(IntRect::new(0, 0, 8, 8), 255);
    let shadow = blurred.restrict_inverted_inner(&source).unwrap();
    assert_eq!(shadow.bounds(), source.bounds());
    // Where the blur reaches, the shadow is knocked out
    assert_eq!(shadow.sample(1, 1), 0);
    // Where it does not, the interior is fully shadowed
    assert_eq!(shadow.sample(6, 6), 255);
  }

  #[test]
  fn restrict_outer_knocks_out_source() {
    let blurred = solid_mask(IntRect::new(0, 0, 8, 8), 255);
    let source = solid_mask(IntRect::new(2, 2, 6, 6), 255);
    let outer = blurred.restrict_outer(&source).unwrap();
    assert_eq!(outer.sample(3, 3), 0);
    assert_eq!(outer.sample(0, 0), 255);
  }

  #[test]
  fn inverted_within_complements_source() {
    let source = solid_mask(IntRect::new(2, 2, 6, 6), 255);
    let inverted = CoverageMask::inverted_within(&source, IntRect::new(0, 0, 8, 8)).unwrap();
    assert_eq!(inverted.sample(3, 3), 0);
    assert_eq!(inverted.sample(0, 0), 255);
  }

  #[test]
  fn to_pixmap_premultiplies_color() {
    let mask = solid_mask(IntRect::new(0, 0, 1, 1), 128);
    let pixmap = mask.to_pixmap(Rgba::rgb(255, 0, 0)).unwrap();
    let px = pixmap.pixels()[0];
    assert_eq!(px.alpha(), 128);
    assert_eq!(px.red(), 128);
    assert_eq!(px.green(), 0);
  }

  #[test]
  fn oversized_mask_is_rejected() {
    let bounds = IntRect::from_xywh(0, 0, u32::MAX / 2, u32::MAX / 2);
    assert!(matches!(
      CoverageMask::try_new(bounds),
      Err(SurfaceError::AllocationRejected { .. })
    ));
  }
}
