//! Raster surface management
//!
//! Every layer owns exactly one raster surface. Allocation is guarded:
//! zero or overflowing dimensions and allocations past a hard byte limit
//! are rejected with an error instead of aborting the process, and the
//! buffer is reserved fallibly so an out-of-memory condition surfaces as
//! a value.
//!
//! The clip-mask helpers at the bottom keep backend clip state coherent
//! across independent rasters: masks are surface-sized, so entering a
//! bounded layer crops the active mask to the layer's region, and
//! intersecting two clips multiplies their coverage.

use crate::error::SurfaceError;
use crate::geometry::IntRect;
use tiny_skia::{IntSize, Mask, Pixmap};

const BYTES_PER_PIXEL: u64 = 4;
/// Upper bound on a single raster allocation to avoid process aborts on OOM.
pub(crate) const MAX_SURFACE_BYTES: u64 = 512 * 1024 * 1024;

fn guard_dimensions(width: u32, height: u32) -> Result<usize, SurfaceError> {
  if width == 0 || height == 0 {
    return Err(SurfaceError::InvalidParameters {
      message: format!("surface size is zero ({width}x{height})"),
    });
  }

  let pixels = (width as u64)
    .checked_mul(height as u64)
    .ok_or(SurfaceError::AllocationRejected {
      message: format!("surface dimensions overflow ({width}x{height})"),
    })?;
  let bytes = pixels
    .checked_mul(BYTES_PER_PIXEL)
    .ok_or(SurfaceError::AllocationRejected {
      message: format!("surface byte size overflows ({width}x{height})"),
    })?;
  if bytes > MAX_SURFACE_BYTES {
    return Err(SurfaceError::AllocationRejected {
      message: format!(
        "surface {}x{} would allocate {} bytes (limit {})",
        width, height, bytes, MAX_SURFACE_BYTES
      ),
    });
  }

  Ok(bytes as usize)
}

/// Allocates a zeroed raster surface, fallibly
pub(crate) fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, SurfaceError> {
  let bytes = guard_dimensions(width, height)?;

  let mut buffer = Vec::new();
  buffer
    .try_reserve_exact(bytes)
    .map_err(|err| SurfaceError::AllocationRejected {
      message: format!("surface allocation failed for {bytes} bytes: {err}"),
    })?;
  buffer.resize(bytes, 0);

  let size = IntSize::from_wh(width, height).ok_or(SurfaceError::InvalidParameters {
    message: format!("surface dimensions out of range ({width}x{height})"),
  })?;
  Pixmap::from_vec(buffer, size).ok_or(SurfaceError::CreationFailed { width, height })
}

/// Copies a device-space region out of a surface
///
/// `region` is given in the surface's own pixel coordinates. Pixels of
/// the region that fall outside the surface are left transparent.
pub(crate) fn copy_region(pixmap: &Pixmap, region: IntRect) -> Result<Pixmap, SurfaceError> {
  if region.is_empty() {
    return Err(SurfaceError::RegionOutOfBounds {
      x: region.left,
      y: region.top,
      width: region.width(),
      height: region.height(),
    });
  }

  let mut out = new_pixmap(region.width(), region.height())?;
  let surface_rect = IntRect::from_xywh(0, 0, pixmap.width(), pixmap.height());
  let readable = region.intersect(surface_rect);
  if readable.is_empty() {
    return Err(SurfaceError::RegionOutOfBounds {
      x: region.left,
      y: region.top,
      width: region.width(),
      height: region.height(),
    });
  }

  let src = pixmap.data();
  let dst = out.data_mut();
  let src_stride = pixmap.width() as usize * 4;
  let dst_stride = region.width() as usize * 4;
  for y in readable.top..readable.bottom {
    let src_idx = y as usize * src_stride + readable.left as usize * 4;
    let dst_row = (y - region.top) as usize;
    let dst_idx = dst_row * dst_stride + (readable.left - region.left) as usize * 4;
    let len = readable.width() as usize * 4;
    dst[dst_idx..dst_idx + len].copy_from_slice(&src[src_idx..src_idx + len]);
  }

  Ok(out)
}

/// Multiplies `existing` coverage into `into`, pixel by pixel
///
/// Both masks must be the same size; mismatched masks leave `into`
/// untouched.
pub(crate) fn combine_masks(into: &mut Mask, existing: &Mask) {
  if into.width() != existing.width() || into.height() != existing.height() {
    return;
  }

  for (dst, src) in into.data_mut().iter_mut().zip(existing.data().iter()) {
    let multiplied = (*dst as u16 * *src as u16 + 127) / 255;
    *dst = multiplied as u8;
  }
}

/// Crops a surface-sized mask to a sub-region of that surface
///
/// Used when a bounded layer is pushed: the parent's clip mask must be
/// replayed into the child's smaller raster at the child's origin.
/// Returns None when the region lies fully outside the mask.
pub(crate) fn crop_mask(mask: &Mask, origin_x: i32, origin_y: i32, width: u32, height: u32) -> Option<Mask> {
  if width == 0 || height == 0 {
    return None;
  }

  let mut out = Mask::new(width, height)?;
  let src = mask.data();
  let dst = out.data_mut();
  let src_w = mask.width() as i32;
  let src_h = mask.height() as i32;

  for row in 0..height as i32 {
    let sy = origin_y + row;
    if sy < 0 || sy >= src_h {
      continue;
    }
    for col in 0..width as i32 {
      let sx = origin_x + col;
      if sx < 0 || sx >= src_w {
        continue;
      }
      dst[(row * width as i32 + col) as usize] = src[(sy * src_w + sx) as usize];
    }
  }

  Some(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_zero_dimensions() {
    assert!(matches!(
      new_pixmap(0, 10),
      Err(SurfaceError::InvalidParameters { .. })
    ));
    assert!(matches!(
      new_pixmap(10, 0),
      Err(SurfaceError::InvalidParameters { .. })
    ));
  }

  #[test]
  fn rejects_overflow_and_limit() {
    assert!(matches!(
      new_pixmap(u32::MAX, 2),
      Err(SurfaceError::AllocationRejected { .. })
    ));

    let too_wide = (MAX_SURFACE_BYTES / BYTES_PER_PIXEL + 1) as u32;
    assert!(matches!(
      new_pixmap(too_wide, 1),
      Err(SurfaceError::AllocationRejected { .. })
    ));
  }

  #[test]
  fn allocates_small_surfaces() {
    let pixmap = new_pixmap(4, 4).expect("small surface");
    assert_eq!(pixmap.width(), 4);
    assert_eq!(pixmap.height(), 4);
    assert!(pixmap.data().iter().all(|&b| b == 0));
  }

  #[test]
  fn copy_region_reads_pixels() {
    let mut pixmap = new_pixmap(8, 8).unwrap();
    pixmap.fill(tiny_skia::Color::from_rgba8(255, 0, 0, 255));

    let region = copy_region(&pixmap, IntRect::new(2, 2, 6, 6)).expect("region");
    assert_eq!(region.width(), 4);
    assert_eq!(region.height(), 4);
    assert_eq!(region.data()[0], 255);
  }

  #[test]
  fn copy_region_outside_bounds_fails() {
    let pixmap = new_pixmap(8, 8).unwrap();
    assert!(copy_region(&pixmap, IntRect::new(20, 20, 24, 24)).is_err());
    assert!(copy_region(&pixmap, IntRect::EMPTY).is_err());
  }

  #[test]
  fn copy_region_partial_overlap_pads_transparent() {
    let mut pixmap = new_pixmap(4, 4).unwrap();
    pixmap.fill(tiny_skia::Color::from_rgba8(0, 255, 0, 255));

    let region = copy_region(&pixmap, IntRect::new(-2, -2, 2, 2)).expect("region");
    let data = region.data();
    // Top-left quadrant is outside the surface: transparent
    assert_eq!(data[3], 0);
    // Bottom-right pixel of the region maps to surface (1, 1)
    let idx = (3 * 4 + 3) * 4;
    assert_eq!(data[idx + 1], 255);
  }

  #[test]
  fn combine_masks_multiplies_coverage() {
    let mut a = Mask::new(2, 1).unwrap();
    let mut b = Mask::new(2, 1).unwrap();
    a.data_mut().copy_from_slice(&[255, 128]);
    b.data_mut().copy_from_slice(&[128, 128]);
    combine_masks(&mut a, &b);
    assert_eq!(a.data()[0], 128);
    assert_eq!(a.data()[1], 64);
  }

  #[test]
  fn crop_mask_extracts_region() {
    let mut mask = Mask::new(4, 4).unwrap();
    mask.data_mut()[5] = 200; // (1, 1)

    let cropped = crop_mask(&mask, 1, 1, 2, 2).expect("crop");
    assert_eq!(cropped.data()[0], 200);
    assert_eq!(cropped.data()[1], 0);
  }

  #[test]
  fn crop_mask_outside_is_none_or_empty() {
    let mask = Mask::new(4, 4).unwrap();
    assert!(crop_mask(&mask, 0, 0, 0, 2).is_none());
    let all_outside = crop_mask(&mask, 10, 10, 2, 2).expect("allocated");
    assert!(all_outside.data().iter().all(|&b| b == 0));
  }
}
