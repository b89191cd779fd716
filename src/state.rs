//! Drawing-state records
//!
//! One [`ContextState`] holds everything `save`/`restore` snapshots:
//! paints, stroke attributes, blend mode, opacity, antialiasing, the
//! local transform and the active clip. States are value types cloned
//! on save; the paints and dash patterns inside them are shared `Arc`s,
//! so a save is cheap regardless of paint complexity.

use crate::paint::{BlendMode, Paint};
use crate::stroke::StrokeAttrs;
use std::sync::Arc;
use tiny_skia::{FillRule, Mask, Transform};

use crate::geometry::Rect;

/// One save-point's worth of drawing attributes
#[derive(Clone)]
pub(crate) struct ContextState {
  /// Fill color source; None means "no fill"
  pub fill_paint: Option<Arc<Paint>>,
  /// Stroke color source; None means "no stroke"
  pub stroke_paint: Option<Arc<Paint>>,
  /// Winding rule used by fill and clip
  pub fill_rule: FillRule,
  /// Extra opacity applied to fills only
  pub fill_opacity: f32,
  /// Extra opacity applied to strokes only
  pub stroke_opacity: f32,
  /// Stroke geometry attributes
  pub stroke: StrokeAttrs,
  /// Compositing mode for draws and layer composites
  pub blend_mode: BlendMode,
  /// Global opacity multiplied into every draw
  pub opacity: f32,
  /// Antialias edges of fills and strokes
  pub antialias: bool,
  /// Curve flattening tolerance hint
  pub flatness: f32,
  /// Local transform, composed with the layer's base transform
  pub transform: Transform,
  /// Device-space bounds of the active clip, if any
  pub clip_rect: Option<Rect>,
  /// Surface-local coverage of the active clip, if any
  pub clip_mask: Option<Mask>,
  /// Marks the state that opened the innermost layer
  pub is_layer_begin_pt: bool,
}

impl ContextState {
  pub fn new() -> Self {
    Self {
      fill_paint: Some(Arc::new(Paint::solid(crate::color::Rgba::BLACK))),
      stroke_paint: Some(Arc::new(Paint::solid(crate::color::Rgba::BLACK))),
      fill_rule: FillRule::Winding,
      fill_opacity: 1.0,
      stroke_opacity: 1.0,
      stroke: StrokeAttrs::default(),
      blend_mode: BlendMode::SourceOver,
      opacity: 1.0,
      antialias: true,
      flatness: 0.25,
      transform: Transform::identity(),
      clip_rect: None,
      clip_mask: None,
      is_layer_begin_pt: false,
    }
  }
}

impl Default for ContextState {
  fn default() -> Self {
    Self::new()
  }
}
