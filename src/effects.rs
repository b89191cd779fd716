//! Bitmap effects
//!
//! Effects are computed from a layer's alpha coverage when the layer is
//! composited back into its parent: drop shadow, inner shadow, outer
//! glow, inner glow and color overlay, in that fixed paint order with
//! the source content drawn between the outer and inner effects.
//!
//! Two pieces live here. [`layer_bounds`] answers "how large must the
//! layer raster be so every enabled effect has the source pixels it
//! needs": rectangle algebra over device-transformed radii and
//! offsets. [`composite`] performs the actual mask extraction, blur,
//! recombination and tinted blit into the parent raster.
//!
//! A failed allocation inside one effect skips that effect only; the
//! rest of the composite proceeds. This is deliberate: a missing glow
//! is a degraded frame, not a broken context.

use crate::color::Rgba;
use crate::error::SurfaceError;
use crate::geometry::{IntRect, Point, Rect};
use crate::mask::CoverageMask;
use crate::paint::BlendMode;
use log::warn;
use tiny_skia::{FilterQuality, Mask, Pixmap, PixmapPaint, Transform};

/// Parameters of one bitmap effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
  /// Effect color; the alpha channel is the effect's opacity
  pub color: Rgba,
  /// Blend mode used when compositing the effect into the parent
  pub blend_mode: BlendMode,
  /// Blur radius in user units (device-transformed before use)
  pub size: f32,
  /// Pushes the blur ramp toward full coverage, 0.0 to 1.0
  pub spread: f32,
  /// Shadow offset in user units; ignored by glows and overlay
  pub offset: Point,
  /// Drop shadow only: knock the shadow out under the source
  pub knockout: bool,
}

impl Default for EffectParams {
  fn default() -> Self {
    Self {
      color: Rgba::new(0, 0, 0, 0.75),
      blend_mode: BlendMode::SourceOver,
      size: 4.0,
      spread: 0.0,
      offset: Point::new(2.0, 2.0),
      knockout: false,
    }
  }
}

/// The effects attached to a compositing layer
///
/// Each slot is independently optional. `isolated` suppresses drawing
/// the unmodified source content, leaving only the effect output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitmapEffects {
  pub drop_shadow: Option<EffectParams>,
  pub inner_shadow: Option<EffectParams>,
  pub outer_glow: Option<EffectParams>,
  pub inner_glow: Option<EffectParams>,
  pub color_overlay: Option<EffectParams>,
  /// Draw only the effects, not the source content
  pub isolated: bool,
}

impl BitmapEffects {
  /// True when at least one effect slot is populated
  pub fn has_any(&self) -> bool {
    self.drop_shadow.is_some()
      || self.inner_shadow.is_some()
      || self.outer_glow.is_some()
      || self.inner_glow.is_some()
      || self.color_overlay.is_some()
  }
}

/// Blur radii of an effect in device pixels, per axis
fn device_radii(size: f32, ts: Transform) -> (i32, i32) {
  let sx = (ts.sx * ts.sx + ts.ky * ts.ky).sqrt();
  let sy = (ts.kx * ts.kx + ts.sy * ts.sy).sqrt();
  (
    (size.max(0.0) * sx).round() as i32,
    (size.max(0.0) * sy).round() as i32,
  )
}

/// Shadow offset mapped through the linear part of the device transform
fn device_offset(offset: Point, ts: Transform) -> (i32, i32) {
  let dx = offset.x * ts.sx + offset.y * ts.kx;
  let dy = offset.x * ts.ky + offset.y * ts.sy;
  (dx.round() as i32, dy.round() as i32)
}

/// Computes the device-space raster bounds a layer needs for its effects
///
/// Starts from the visible region (shape ∩ clip) and unions in, per
/// enabled effect, the source region that effect can pull pixels from:
/// the clip grown by the blur radius and, for shadows, shifted against
/// the shadow offset, always intersected back against the shape, since
/// the layer never contains content outside it. An empty result means
/// the layer can be skipped entirely.
pub(crate) fn layer_bounds(
  shape: Rect,
  clip: IntRect,
  ts: Transform,
  effects: &BitmapEffects,
) -> IntRect {
  let shape_dev = IntRect::hull(shape.transform_aabb(ts));
  let mut acc = shape_dev.intersect(clip);

  let mut add = |params: &EffectParams, offset: bool| {
    let (rx, ry) = device_radii(params.size, ts);
    let mut region = clip.expand(rx, ry);
    if offset {
      let (dx, dy) = device_offset(params.offset, ts);
      region = region.offset(-dx, -dy);
    }
    acc = acc.union(region.intersect(shape_dev));
  };

  if let Some(params) = &effects.drop_shadow {
    add(params, true);
  }
  if let Some(params) = &effects.inner_shadow {
    add(params, true);
  }
  if let Some(params) = &effects.outer_glow {
    add(params, false);
  }
  if let Some(params) = &effects.inner_glow {
    add(params, false);
  }

  acc
}

/// Composites a child layer into its parent with effects applied
///
/// `origin` is the child raster's device-space top-left; `parent_origin`
/// the parent's. `opacity` and `blend` are the outer scope's values and
/// modulate both the source content and every effect's strength.
#[allow(clippy::too_many_arguments)]
pub(crate) fn composite(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  child: &Pixmap,
  origin: (i32, i32),
  parent_origin: (i32, i32),
  effects: &BitmapEffects,
  ts: Transform,
  opacity: f32,
  blend: BlendMode,
) {
  let source = match CoverageMask::from_pixmap_alpha(child, origin) {
    Ok(mask) => mask,
    Err(err) => {
      warn!("skipping bitmap effects, coverage extraction failed: {err}");
      draw_source(parent, parent_clip, child, origin, parent_origin, opacity, blend);
      return;
    }
  };

  if let Some(params) = &effects.drop_shadow {
    if let Err(err) = drop_shadow(parent, parent_clip, &source, params, ts, opacity, parent_origin)
    {
      warn!("skipping drop shadow: {err}");
    }
  }
  if let Some(params) = &effects.outer_glow {
    if let Err(err) = outer_glow(parent, parent_clip, &source, params, ts, opacity, parent_origin)
    {
      warn!("skipping outer glow: {err}");
    }
  }

  if !effects.isolated {
    draw_source(parent, parent_clip, child, origin, parent_origin, opacity, blend);
  }

  if let Some(params) = &effects.inner_shadow {
    if let Err(err) = inner_shadow(parent, parent_clip, &source, params, ts, opacity, parent_origin)
    {
      warn!("skipping inner shadow: {err}");
    }
  }
  if let Some(params) = &effects.inner_glow {
    if let Err(err) = inner_glow(parent, parent_clip, &source, params, ts, opacity, parent_origin) {
      warn!("skipping inner glow: {err}");
    }
  }
  if let Some(params) = &effects.color_overlay {
    if let Err(err) = color_overlay(parent, parent_clip, &source, params, opacity, parent_origin) {
      warn!("skipping color overlay: {err}");
    }
  }
}

/// Blits a child raster into its parent at its device-space origin
pub(crate) fn draw_source(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  child: &Pixmap,
  origin: (i32, i32),
  parent_origin: (i32, i32),
  opacity: f32,
  blend: BlendMode,
) {
  let paint = PixmapPaint {
    opacity: opacity.clamp(0.0, 1.0),
    blend_mode: blend.to_skia(),
    quality: FilterQuality::Nearest,
  };
  parent.draw_pixmap(
    origin.0 - parent_origin.0,
    origin.1 - parent_origin.1,
    child.as_ref(),
    &paint,
    Transform::identity(),
    parent_clip,
  );
}

fn drop_shadow(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  source: &CoverageMask,
  params: &EffectParams,
  ts: Transform,
  opacity: f32,
  parent_origin: (i32, i32),
) -> Result<(), SurfaceError> {
  let (rx, ry) = device_radii(params.size, ts);
  let (dx, dy) = device_offset(params.offset, ts);

  let mut blurred = source.box_blur(rx, ry)?.offset(dx, dy);
  blurred.apply_spread(params.spread);
  let mut mask = if params.knockout {
    blurred.restrict_outer(source)?
  } else {
    blurred
  };
  mask.scale_alpha(params.color.a * opacity);
  blit_mask(parent, parent_clip, &mask, params.color, params.blend_mode, parent_origin)
}

fn outer_glow(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  source: &CoverageMask,
  params: &EffectParams,
  ts: Transform,
  opacity: f32,
  parent_origin: (i32, i32),
) -> Result<(), SurfaceError> {
  let (rx, ry) = device_radii(params.size, ts);

  let mut mask = source.box_blur(rx, ry)?;
  mask.apply_spread(params.spread);
  mask.scale_alpha(params.color.a * opacity);
  blit_mask(parent, parent_clip, &mask, params.color, params.blend_mode, parent_origin)
}

fn inner_shadow(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  source: &CoverageMask,
  params: &EffectParams,
  ts: Transform,
  opacity: f32,
  parent_origin: (i32, i32),
) -> Result<(), SurfaceError> {
  let (rx, ry) = device_radii(params.size, ts);
  let (dx, dy) = device_offset(params.offset, ts);

  let blurred = source.box_blur(rx, ry)?.offset(dx, dy);
  let mut mask = blurred.restrict_inverted_inner(source)?;
  mask.apply_spread(params.spread);
  mask.scale_alpha(params.color.a * opacity);
  blit_mask(parent, parent_clip, &mask, params.color, params.blend_mode, parent_origin)
}

fn inner_glow(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  source: &CoverageMask,
  params: &EffectParams,
  ts: Transform,
  opacity: f32,
  parent_origin: (i32, i32),
) -> Result<(), SurfaceError> {
  let (rx, ry) = device_radii(params.size, ts);

  // The glow hugs the inside edge: blur the complement of the source,
  // then keep only what lands inside it.
  let inverted =
    CoverageMask::inverted_within(source, source.bounds().expand(rx.max(1), ry.max(1)))?;
  let blurred = inverted.box_blur(rx, ry)?;
  let mut mask = blurred.restrict_inner(source)?;
  mask.apply_spread(params.spread);
  mask.scale_alpha(params.color.a * opacity);
  blit_mask(parent, parent_clip, &mask, params.color, params.blend_mode, parent_origin)
}

fn color_overlay(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  source: &CoverageMask,
  params: &EffectParams,
  opacity: f32,
  parent_origin: (i32, i32),
) -> Result<(), SurfaceError> {
  let mut mask = source.clone();
  mask.scale_alpha(params.color.a * opacity);
  blit_mask(parent, parent_clip, &mask, params.color, params.blend_mode, parent_origin)
}

fn blit_mask(
  parent: &mut Pixmap,
  parent_clip: Option<&Mask>,
  mask: &CoverageMask,
  color: Rgba,
  blend: BlendMode,
  parent_origin: (i32, i32),
) -> Result<(), SurfaceError> {
  let tinted = mask.to_pixmap(color.opaque())?;
  let paint = PixmapPaint {
    opacity: 1.0,
    blend_mode: blend.to_skia(),
    quality: FilterQuality::Nearest,
  };
  parent.draw_pixmap(
    mask.bounds().left - parent_origin.0,
    mask.bounds().top - parent_origin.1,
    tinted.as_ref(),
    &paint,
    Transform::identity(),
    parent_clip,
  );
  Ok(())
}
