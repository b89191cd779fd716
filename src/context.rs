//! The drawing context
//!
//! [`Context`] is the public-facing object: it owns a root surface, a
//! stack of drawing states, a stack of compositing layers and at most
//! one in-progress path. Simple draws go straight to the current
//! layer's raster; operations that need isolation (bitmap effects,
//! non-source-over group compositing) open a layer with
//! [`Context::begin_layer`], draw into it, and composite it back with
//! [`Context::end_layer`].
//!
//! # Error policy
//!
//! Drawing operations never return errors. Any unrecoverable failure
//! (raster allocation, malformed geometry) marks the context invalid,
//! and from then on every operation is a silent no-op. Check
//! [`Context::is_valid`] after a logical group of calls rather than
//! after each one. Stack-discipline mistakes (`restore` with nothing to
//! pop, `restore` across an open layer) are ignored without
//! invalidating: they are recoverable caller bugs.
//!
//! # Examples
//!
//! ```
//! use fastcanvas::{Context, Rgba, Rect};
//!
//! let mut ctx = Context::new(200, 100, Rgba::WHITE)?;
//! ctx.set_fill_color(Rgba::rgb(200, 30, 30));
//! ctx.add_rounded_rectangle(Rect::from_xywh(20.0, 20.0, 100.0, 50.0), 8.0, 8.0);
//! ctx.fill();
//! assert!(ctx.is_valid());
//! let pixmap = ctx.into_pixmap();
//! # Ok::<(), fastcanvas::Error>(())
//! ```

use crate::color::Rgba;
use crate::effects::{self, BitmapEffects};
use crate::error::{Error, Result};
use crate::geometry::{IntRect, Point, Rect};
use crate::layer::LayerRecord;
use crate::paint::{BlendMode, Paint};
use crate::path::PathSink;
use crate::state::ContextState;
use crate::stroke::{DashPattern, LineCap, LineJoin};
use crate::surface;
use log::{debug, trace};
use std::sync::Arc;
use tiny_skia::{FillRule, FilterQuality, Mask, Pixmap, PixmapPaint, SpreadMode, Transform};

/// A layered 2D vector-graphics drawing context
///
/// See the [module documentation](self) for an overview.
pub struct Context {
  /// The current layer's raster
  pixmap: Pixmap,
  /// Device-space top-left of the current raster
  origin: (i32, i32),
  /// Device transform in effect when the current layer scope opened
  base_transform: Transform,
  /// Current drawing state
  state: ContextState,
  /// Saved drawing states, bottom first
  state_stack: Vec<ContextState>,
  /// Parked parent layers, root side first
  layer_stack: Vec<LayerRecord>,
  /// Suppressed begin/end count of the current layer
  nesting: u32,
  /// The in-progress path, if any
  path: Option<PathSink>,
  /// Sticky validity flag; false makes every operation a no-op
  valid: bool,
}

impl Context {
  /// Creates a context with an opaque background
  ///
  /// # Errors
  ///
  /// Returns an error when the dimensions are zero, overflow, or the
  /// raster allocation is rejected.
  pub fn new(width: u32, height: u32, background: Rgba) -> Result<Self> {
    let mut pixmap = surface::new_pixmap(width, height)?;
    pixmap.fill(background.to_skia());
    Ok(Self::from_pixmap(pixmap))
  }

  /// Creates a context with a transparent background
  pub fn new_transparent(width: u32, height: u32) -> Result<Self> {
    Self::new(width, height, Rgba::TRANSPARENT)
  }

  /// Wraps an existing raster without clearing it
  pub fn from_pixmap(pixmap: Pixmap) -> Self {
    Self {
      pixmap,
      origin: (0, 0),
      base_transform: Transform::identity(),
      state: ContextState::new(),
      state_stack: Vec::new(),
      layer_stack: Vec::new(),
      nesting: 0,
      path: None,
      valid: true,
    }
  }

  /// Width of the current layer's raster in pixels
  #[inline]
  pub fn width(&self) -> u32 {
    self.pixmap.width()
  }

  /// Height of the current layer's raster in pixels
  #[inline]
  pub fn height(&self) -> u32 {
    self.pixmap.height()
  }

  /// True until the context hits an unrecoverable failure
  ///
  /// Once false, stays false; no operation resurrects a context.
  #[inline]
  pub fn is_valid(&self) -> bool {
    self.valid
  }

  /// Current save-stack depth
  #[inline]
  pub fn state_depth(&self) -> usize {
    self.state_stack.len()
  }

  /// Number of open offscreen layers
  #[inline]
  pub fn layer_depth(&self) -> usize {
    self.layer_stack.len()
  }

  /// Suppressed begin/end count of the current layer
  #[inline]
  pub fn layer_nesting(&self) -> u32 {
    self.nesting
  }

  /// Fills the current layer's raster with a color
  pub fn clear(&mut self, color: Rgba) {
    if !self.valid {
      return;
    }
    self.pixmap.fill(color.to_skia());
  }

  /// Consumes the context and returns the root raster
  ///
  /// Layers still open are discarded, not composited; call
  /// [`Context::end_layer`] first to keep their content.
  pub fn into_pixmap(mut self) -> Pixmap {
    if self.layer_stack.is_empty() {
      self.pixmap
    } else {
      self.layer_stack.swap_remove(0).pixmap
    }
  }

  /// The current layer's raster
  #[inline]
  pub fn pixmap(&self) -> &Pixmap {
    &self.pixmap
  }

  fn invalidate(&mut self, why: &str) {
    if self.valid {
      debug!("context invalidated: {why}");
      self.valid = false;
    }
  }

  // ========================================================================
  // Transforms
  // ========================================================================

  /// Replaces the local transform
  pub fn set_transform(&mut self, ts: Transform) {
    if !self.valid {
      return;
    }
    self.state.transform = ts;
  }

  /// Concatenates a transform onto the local transform
  pub fn concat_transform(&mut self, ts: Transform) {
    if !self.valid {
      return;
    }
    self.state.transform = self.state.transform.pre_concat(ts);
  }

  /// Translates subsequent drawing
  pub fn translate(&mut self, dx: f32, dy: f32) {
    if !self.valid {
      return;
    }
    self.state.transform = self.state.transform.pre_translate(dx, dy);
  }

  /// Scales subsequent drawing
  pub fn scale(&mut self, sx: f32, sy: f32) {
    if !self.valid {
      return;
    }
    self.state.transform = self.state.transform.pre_scale(sx, sy);
  }

  /// Rotates subsequent drawing by an angle in degrees
  pub fn rotate(&mut self, degrees: f32) {
    if !self.valid {
      return;
    }
    self.state.transform = self
      .state
      .transform
      .pre_concat(Transform::from_rotate(degrees));
  }

  /// Resets the local transform to identity
  pub fn reset_transform(&mut self) {
    if !self.valid {
      return;
    }
    self.state.transform = Transform::identity();
  }

  /// The full user-to-device transform currently in effect
  ///
  /// The local transform composed with the enclosing layer scope's base
  /// transform. Entering or leaving a layer or save scope never loses
  /// or double-applies the device-space component.
  pub fn device_transform(&self) -> Transform {
    self.base_transform.pre_concat(self.state.transform)
  }

  /// Device-space bounds of the active clip
  ///
  /// The current raster's extent intersected with the clip rectangle,
  /// if one is set.
  pub fn device_clip_bounds(&self) -> IntRect {
    let surface_rect = IntRect::from_xywh(
      self.origin.0,
      self.origin.1,
      self.pixmap.width(),
      self.pixmap.height(),
    );
    match self.state.clip_rect {
      Some(rect) => IntRect::hull(rect).intersect(surface_rect),
      None => surface_rect,
    }
  }

  /// Transform from user space to the current raster's pixels
  fn raster_transform(&self) -> Transform {
    self
      .device_transform()
      .post_translate(-(self.origin.0 as f32), -(self.origin.1 as f32))
  }

  // ========================================================================
  // Attributes
  // ========================================================================

  /// Sets the fill to a solid color
  pub fn set_fill_color(&mut self, color: Rgba) {
    if !self.valid {
      return;
    }
    self.state.fill_paint = Some(Arc::new(Paint::solid(color)));
  }

  /// Sets the fill to a shared paint
  pub fn set_fill_paint(&mut self, paint: Arc<Paint>) {
    if !self.valid {
      return;
    }
    self.state.fill_paint = Some(paint);
  }

  /// Disables filling; subsequent fills draw nothing
  pub fn set_fill_none(&mut self) {
    if !self.valid {
      return;
    }
    self.state.fill_paint = None;
  }

  /// Sets the winding rule used by fill and clip
  pub fn set_fill_rule(&mut self, rule: FillRule) {
    if !self.valid {
      return;
    }
    self.state.fill_rule = rule;
  }

  /// Sets the fill-only opacity, clamped to [0, 1]
  pub fn set_fill_opacity(&mut self, opacity: f32) {
    if !self.valid {
      return;
    }
    self.state.fill_opacity = opacity.clamp(0.0, 1.0);
  }

  /// Sets the stroke to a solid color
  pub fn set_stroke_color(&mut self, color: Rgba) {
    if !self.valid {
      return;
    }
    self.state.stroke_paint = Some(Arc::new(Paint::solid(color)));
  }

  /// Sets the stroke to a shared paint
  pub fn set_stroke_paint(&mut self, paint: Arc<Paint>) {
    if !self.valid {
      return;
    }
    self.state.stroke_paint = Some(paint);
  }

  /// Disables stroking; subsequent strokes draw nothing
  pub fn set_stroke_none(&mut self) {
    if !self.valid {
      return;
    }
    self.state.stroke_paint = None;
  }

  /// Sets the stroke-only opacity, clamped to [0, 1]
  pub fn set_stroke_opacity(&mut self, opacity: f32) {
    if !self.valid {
      return;
    }
    self.state.stroke_opacity = opacity.clamp(0.0, 1.0);
  }

  /// Sets the stroke width
  pub fn set_stroke_width(&mut self, width: f32) {
    if !self.valid || !width.is_finite() || width < 0.0 {
      return;
    }
    self.state.stroke.width = width;
  }

  /// Sets the stroke end-cap shape
  pub fn set_stroke_cap(&mut self, cap: LineCap) {
    if !self.valid {
      return;
    }
    self.state.stroke.cap = cap;
  }

  /// Sets the stroke join shape
  pub fn set_stroke_join(&mut self, join: LineJoin) {
    if !self.valid {
      return;
    }
    self.state.stroke.join = join;
  }

  /// Sets the miter length limit
  pub fn set_miter_limit(&mut self, limit: f32) {
    if !self.valid || !limit.is_finite() || limit < 1.0 {
      return;
    }
    self.state.stroke.miter_limit = limit;
  }

  /// Sets or clears the shared stroke dash pattern
  pub fn set_dashes(&mut self, dashes: Option<Arc<DashPattern>>) {
    if !self.valid {
      return;
    }
    self.state.stroke.dash = dashes;
  }

  /// Sets the blend mode for subsequent draws and layer composites
  pub fn set_blend_mode(&mut self, mode: BlendMode) {
    if !self.valid {
      return;
    }
    self.state.blend_mode = mode;
  }

  /// Sets the global opacity, clamped to [0, 1]
  pub fn set_opacity(&mut self, opacity: f32) {
    if !self.valid {
      return;
    }
    self.state.opacity = opacity.clamp(0.0, 1.0);
  }

  /// Current global opacity
  #[inline]
  pub fn opacity(&self) -> f32 {
    self.state.opacity
  }

  /// Enables or disables antialiased edges
  pub fn set_should_antialias(&mut self, antialias: bool) {
    if !self.valid {
      return;
    }
    self.state.antialias = antialias;
  }

  /// Sets the curve flattening tolerance hint
  pub fn set_flatness(&mut self, flatness: f32) {
    if !self.valid || !flatness.is_finite() || flatness <= 0.0 {
      return;
    }
    self.state.flatness = flatness;
  }

  /// Current curve flattening tolerance hint
  #[inline]
  pub fn flatness(&self) -> f32 {
    self.state.flatness
  }

  // ========================================================================
  // Save / Restore
  // ========================================================================

  /// Saves the current drawing state
  ///
  /// The snapshot includes paints, stroke attributes, blend mode,
  /// opacity, the local transform and the active clip.
  pub fn save(&mut self) {
    if !self.valid {
      return;
    }
    let snapshot = self.state.clone();
    self.state_stack.push(snapshot);
    self.state.is_layer_begin_pt = false;
  }

  /// Restores the most recently saved drawing state
  ///
  /// Refuses, silently and without invalidating, when there is nothing
  /// to pop or when popping would cross the innermost open layer's
  /// begin point. Close the layer with [`Context::end_layer`] first.
  pub fn restore(&mut self) {
    if !self.valid {
      return;
    }
    let Some(parent) = self.state_stack.last() else {
      return;
    };
    if parent.is_layer_begin_pt {
      return;
    }
    if let Some(state) = self.state_stack.pop() {
      self.state = state;
    }
  }

  // ========================================================================
  // Layers
  // ========================================================================

  /// Opens a compositing layer
  ///
  /// When `need_layer` is false and the current blend mode is
  /// source-over at full opacity, or the device clip is empty, no
  /// raster is allocated: the call is counted and the matching
  /// [`Context::end_layer`] unwinds it for free. Otherwise subsequent
  /// drawing goes to a fresh offscreen raster sized to the device clip,
  /// composited back on `end_layer` with the outer scope's opacity and
  /// blend mode.
  pub fn begin_layer(&mut self, need_layer: bool) {
    if !self.valid {
      return;
    }
    let clip = self.device_clip_bounds();
    let fast = !need_layer && self.state.blend_mode.is_source_over() && self.state.opacity == 1.0;
    if fast || clip.is_empty() {
      self.nesting += 1;
      return;
    }
    self.push_layer(clip, None);
  }

  /// Opens a compositing layer carrying bitmap effects
  ///
  /// `shape` bounds the content that will be drawn into the layer, in
  /// user space. The layer raster covers the visible part of the shape
  /// plus whatever margin the enabled effects need; blur radii and
  /// shadow offsets are accounted for in device space. When that region
  /// is empty the call degenerates to the counted fast path.
  pub fn begin_layer_with_effects(&mut self, shape: Rect, effects: BitmapEffects) {
    if !self.valid {
      return;
    }
    let clip = self.device_clip_bounds();
    let bounds = effects::layer_bounds(shape, clip, self.device_transform(), &effects);
    if bounds.is_empty() {
      self.nesting += 1;
      return;
    }
    self.push_layer(bounds, Some(effects));
  }

  fn push_layer(&mut self, bounds: IntRect, effects: Option<BitmapEffects>) {
    let child = match surface::new_pixmap(bounds.width(), bounds.height()) {
      Ok(pixmap) => pixmap,
      Err(err) => {
        self.invalidate(&format!("layer allocation failed: {err}"));
        return;
      }
    };

    // Replay the active clip into the child raster; clip masks are
    // surface-local and do not follow across independent rasters.
    let child_mask = self.state.clip_mask.as_ref().and_then(|mask| {
      surface::crop_mask(
        mask,
        bounds.left - self.origin.0,
        bounds.top - self.origin.1,
        bounds.width(),
        bounds.height(),
      )
    });

    let device = self.device_transform();

    // The current state becomes the layer's begin point; the layer
    // draws on a fresh state whose opacity and blend mode are neutral,
    // since both apply once when the layer composites back.
    self.state.is_layer_begin_pt = true;
    let mut layer_state = self.state.clone();
    layer_state.is_layer_begin_pt = false;
    layer_state.opacity = 1.0;
    layer_state.blend_mode = BlendMode::SourceOver;
    layer_state.transform = Transform::identity();
    layer_state.clip_mask = child_mask;
    self.state_stack.push(std::mem::replace(&mut self.state, layer_state));

    let record = LayerRecord {
      pixmap: std::mem::replace(&mut self.pixmap, child),
      origin: std::mem::replace(&mut self.origin, (bounds.left, bounds.top)),
      base_transform: std::mem::replace(&mut self.base_transform, device),
      nesting: std::mem::take(&mut self.nesting),
      effects,
    };
    self.layer_stack.push(record);
    trace!("layer opened at {bounds}");
  }

  /// Closes the innermost layer and composites it into its parent
  ///
  /// Unwinds a counted fast-path call first. Closing the root layer is
  /// a no-op. States saved inside the layer and not restored are popped
  /// along the way.
  pub fn end_layer(&mut self) {
    if !self.valid {
      return;
    }
    if self.nesting > 0 {
      self.nesting -= 1;
      return;
    }
    let Some(record) = self.layer_stack.pop() else {
      return;
    };

    // Pop states back to the layer's begin point and clear the mark.
    loop {
      if self.state.is_layer_begin_pt {
        self.state.is_layer_begin_pt = false;
        break;
      }
      match self.state_stack.pop() {
        Some(state) => self.state = state,
        None => break,
      }
    }

    let child = std::mem::replace(&mut self.pixmap, record.pixmap);
    let child_origin = std::mem::replace(&mut self.origin, record.origin);
    let layer_transform = std::mem::replace(&mut self.base_transform, record.base_transform);
    self.nesting = record.nesting;

    let opacity = self.state.opacity;
    let blend = self.state.blend_mode;
    match record.effects {
      Some(effects) if effects.has_any() => effects::composite(
        &mut self.pixmap,
        self.state.clip_mask.as_ref(),
        &child,
        child_origin,
        self.origin,
        &effects,
        layer_transform,
        opacity,
        blend,
      ),
      _ => effects::draw_source(
        &mut self.pixmap,
        self.state.clip_mask.as_ref(),
        &child,
        child_origin,
        self.origin,
        opacity,
        blend,
      ),
    }
    trace!("layer composited at {},{}", child_origin.0, child_origin.1);
  }

  // ========================================================================
  // Path construction
  // ========================================================================

  /// Opens a new empty path
  ///
  /// Calling this while a path is already open is a caller bug; the
  /// open path is kept and the call does nothing.
  pub fn begin_path(&mut self) {
    if !self.valid || self.path.is_some() {
      return;
    }
    self.path = Some(PathSink::new());
  }

  fn path_op(&mut self, op: impl FnOnce(&mut PathSink)) {
    if !self.valid {
      return;
    }
    let sink = self.path.get_or_insert_with(PathSink::new);
    op(sink);
    if sink.is_bad() {
      self.path = None;
      self.invalidate("malformed path geometry");
    }
  }

  /// Starts a new subpath
  pub fn move_to(&mut self, p: Point) {
    self.path_op(|sink| sink.move_to(p));
  }

  /// Appends a line segment
  pub fn line_to(&mut self, p: Point) {
    self.path_op(|sink| sink.line_to(p));
  }

  /// Appends a quadratic bezier segment
  pub fn quadratic_to(&mut self, ctrl: Point, p: Point) {
    self.path_op(|sink| sink.quad_to(ctrl, p));
  }

  /// Appends a cubic bezier segment
  pub fn cubic_to(&mut self, ctrl1: Point, ctrl2: Point, p: Point) {
    self.path_op(|sink| sink.cubic_to(ctrl1, ctrl2, p));
  }

  /// Appends an arc tangent to two lines
  pub fn arc_to(&mut self, p1: Point, p2: Point, radius: f32) {
    self.path_op(|sink| sink.arc_to(p1, p2, radius));
  }

  /// Closes the current subpath
  pub fn close_subpath(&mut self) {
    self.path_op(|sink| sink.close());
  }

  /// Appends a rectangle, opening a path if none is open
  pub fn add_rectangle(&mut self, rect: Rect) {
    self.path_op(|sink| sink.add_rectangle(rect));
  }

  /// Appends a rounded rectangle
  pub fn add_rounded_rectangle(&mut self, rect: Rect, rx: f32, ry: f32) {
    self.path_op(|sink| sink.add_rounded_rectangle(rect, rx, ry));
  }

  /// Appends an ellipse
  pub fn add_ellipse(&mut self, center: Point, rx: f32, ry: f32) {
    self.path_op(|sink| sink.add_ellipse(center, rx, ry));
  }

  /// Appends an open elliptical arc; angles in degrees
  pub fn add_arc(&mut self, center: Point, rx: f32, ry: f32, start_deg: f32, sweep_deg: f32) {
    self.path_op(|sink| sink.add_arc(center, rx, ry, start_deg, sweep_deg));
  }

  /// Appends a closed pie-slice sector
  pub fn add_sector(&mut self, center: Point, rx: f32, ry: f32, start_deg: f32, sweep_deg: f32) {
    self.path_op(|sink| sink.add_sector(center, rx, ry, start_deg, sweep_deg));
  }

  /// Appends a closed chord segment
  pub fn add_segment(&mut self, center: Point, rx: f32, ry: f32, start_deg: f32, sweep_deg: f32) {
    self.path_op(|sink| sink.add_segment(center, rx, ry, start_deg, sweep_deg));
  }

  /// Appends a line as its own subpath
  pub fn add_line(&mut self, from: Point, to: Point) {
    self.path_op(|sink| sink.add_line(from, to));
  }

  /// Appends a closed polygon
  pub fn add_polygon(&mut self, points: &[Point]) {
    self.path_op(|sink| sink.add_polygon(points));
  }

  /// Appends an open polyline
  pub fn add_polyline(&mut self, points: &[Point]) {
    self.path_op(|sink| sink.add_polyline(points));
  }

  /// Appends a dot
  pub fn add_dot(&mut self, p: Point) {
    self.path_op(|sink| sink.add_dot(p));
  }

  /// Appends a finished path, optionally transformed
  pub fn add_path(&mut self, path: &tiny_skia::Path, transform: Option<Transform>) {
    self.path_op(|sink| sink.add_path(path, transform));
  }

  /// Snapshots the open path without consuming it
  pub fn copy_path(&self) -> Option<tiny_skia::Path> {
    self.path.as_ref().and_then(|sink| sink.snapshot())
  }

  // ========================================================================
  // Drawing
  // ========================================================================

  /// Fills the open path and consumes it
  ///
  /// A path is consumed at most once; with no open path this is a
  /// no-op. With the fill paint set to none, the path is consumed but
  /// nothing is drawn.
  pub fn fill(&mut self) {
    if !self.valid {
      return;
    }
    let Some(sink) = self.path.take() else {
      return;
    };
    if let Some(path) = sink.finish() {
      self.fill_path_with(&path);
    }
  }

  /// Strokes the open path and consumes it
  pub fn stroke(&mut self) {
    if !self.valid {
      return;
    }
    let Some(sink) = self.path.take() else {
      return;
    };
    if let Some(path) = sink.finish() {
      self.stroke_path_with(&path);
    }
  }

  /// Fills then strokes the open path, consuming it once
  pub fn fill_and_stroke(&mut self) {
    if !self.valid {
      return;
    }
    let Some(sink) = self.path.take() else {
      return;
    };
    if let Some(path) = sink.finish() {
      self.fill_path_with(&path);
      self.stroke_path_with(&path);
    }
  }

  /// Intersects the active clip with the open path and consumes it
  ///
  /// Uses the state's fill rule. The clip applies to subsequent draws
  /// in this state and to states saved from it.
  pub fn clip(&mut self) {
    if !self.valid {
      return;
    }
    let Some(sink) = self.path.take() else {
      return;
    };
    let Some(path) = sink.finish() else {
      return;
    };

    let bounds = path.bounds();
    let dev_bounds = Rect::from_xywh(bounds.x(), bounds.y(), bounds.width(), bounds.height())
      .transform_aabb(self.device_transform());
    self.state.clip_rect = Some(match self.state.clip_rect {
      Some(existing) => existing.intersection(dev_bounds).unwrap_or(Rect::ZERO),
      None => dev_bounds,
    });

    let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) else {
      self.invalidate("clip mask allocation failed");
      return;
    };
    mask.fill_path(
      &path,
      self.state.fill_rule,
      self.state.antialias,
      self.raster_transform(),
    );
    self.state.clip_mask = match self.state.clip_mask.take() {
      Some(existing) => {
        surface::combine_masks(&mut mask, &existing);
        Some(mask)
      }
      None => Some(mask),
    };
  }

  fn fill_path_with(&mut self, path: &tiny_skia::Path) {
    let Some(paint) = self.state.fill_paint.clone() else {
      return;
    };
    let opacity = self.state.opacity * self.state.fill_opacity;
    let Some(shader) = paint.to_shader(opacity) else {
      return;
    };
    let skia_paint = tiny_skia::Paint {
      shader,
      blend_mode: self.state.blend_mode.to_skia(),
      anti_alias: self.state.antialias,
      force_hq_pipeline: false,
    };
    self.pixmap.fill_path(
      path,
      &skia_paint,
      self.state.fill_rule,
      self.raster_transform(),
      self.state.clip_mask.as_ref(),
    );
  }

  fn stroke_path_with(&mut self, path: &tiny_skia::Path) {
    let Some(paint) = self.state.stroke_paint.clone() else {
      return;
    };
    let opacity = self.state.opacity * self.state.stroke_opacity;
    let Some(shader) = paint.to_shader(opacity) else {
      return;
    };
    let skia_paint = tiny_skia::Paint {
      shader,
      blend_mode: self.state.blend_mode.to_skia(),
      anti_alias: self.state.antialias,
      force_hq_pipeline: false,
    };
    self.pixmap.stroke_path(
      path,
      &skia_paint,
      &self.state.stroke.to_skia(),
      self.raster_transform(),
      self.state.clip_mask.as_ref(),
    );
  }

  // ========================================================================
  // Raster operations
  // ========================================================================

  /// Draws a raster with its top-left corner at a user-space point
  pub fn draw_pixmap_at(&mut self, image: &Pixmap, x: f32, y: f32, quality: FilterQuality) {
    if !self.valid {
      return;
    }
    let paint = PixmapPaint {
      opacity: self.state.opacity,
      blend_mode: self.state.blend_mode.to_skia(),
      quality,
    };
    let ts = self.raster_transform().pre_translate(x, y);
    self.pixmap.draw_pixmap(
      0,
      0,
      image.as_ref(),
      &paint,
      ts,
      self.state.clip_mask.as_ref(),
    );
  }

  /// Draws a source rectangle of a raster into a destination rectangle
  ///
  /// The source region is resampled with `quality` to fit the
  /// destination, honoring the current transform, clip, opacity and
  /// blend mode.
  pub fn draw_image(&mut self, image: &Pixmap, src: Rect, dst: Rect, quality: FilterQuality) {
    if !self.valid || src.is_empty() || dst.is_empty() {
      return;
    }
    let mut sink = PathSink::new();
    sink.add_rectangle(dst);
    let Some(path) = sink.finish() else {
      return;
    };

    let pattern_ts = Transform::from_translate(dst.x(), dst.y())
      .pre_scale(dst.width() / src.width(), dst.height() / src.height())
      .pre_translate(-src.x(), -src.y());
    let shader = tiny_skia::Pattern::new(
      image.as_ref(),
      SpreadMode::Pad,
      quality,
      self.state.opacity,
      pattern_ts,
    );
    let skia_paint = tiny_skia::Paint {
      shader,
      blend_mode: self.state.blend_mode.to_skia(),
      anti_alias: self.state.antialias,
      force_hq_pipeline: false,
    };
    self.pixmap.fill_path(
      &path,
      &skia_paint,
      FillRule::Winding,
      self.raster_transform(),
      self.state.clip_mask.as_ref(),
    );
  }

  /// Copies a user-space rectangle of the current layer to a new raster
  ///
  /// The rectangle is mapped to device space; pixels outside the
  /// current raster read back transparent.
  pub fn copy_image(&self, rect: Rect) -> Result<Pixmap> {
    if !self.valid {
      return Err(Error::Other("context is invalid".to_string()));
    }
    let region = IntRect::hull(rect.transform_aabb(self.device_transform()))
      .offset(-self.origin.0, -self.origin.1);
    surface::copy_region(&self.pixmap, region).map_err(Error::from)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
    let idx = ((y * pixmap.width() + x) * 4) as usize;
    let data = pixmap.data();
    (data[idx], data[idx + 1], data[idx + 2], data[idx + 3])
  }

  #[test]
  fn test_context_creation() {
    let ctx = Context::new(100, 50, Rgba::WHITE).unwrap();
    assert_eq!(ctx.width(), 100);
    assert_eq!(ctx.height(), 50);
    assert!(ctx.is_valid());
  }

  #[test]
  fn test_context_creation_rejects_zero() {
    assert!(Context::new(0, 10, Rgba::WHITE).is_err());
  }

  #[test]
  fn test_fill_rect_draws_pixels() {
    let mut ctx = Context::new(20, 20, Rgba::WHITE).unwrap();
    ctx.set_fill_color(Rgba::RED);
    ctx.add_rectangle(Rect::from_xywh(5.0, 5.0, 10.0, 10.0));
    ctx.fill();
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 10, 10), (255, 0, 0, 255));
    assert_eq!(pixel(&pixmap, 1, 1), (255, 255, 255, 255));
  }

  #[test]
  fn test_save_restore_balances_depth() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    assert_eq!(ctx.state_depth(), 0);
    for _ in 0..5 {
      ctx.save();
    }
    assert_eq!(ctx.state_depth(), 5);
    for _ in 0..5 {
      ctx.restore();
    }
    assert_eq!(ctx.state_depth(), 0);
    assert!(ctx.is_valid());
  }

  #[test]
  fn test_restore_at_root_is_ignored() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.restore();
    ctx.restore();
    assert_eq!(ctx.state_depth(), 0);
    assert!(ctx.is_valid());
  }

  #[test]
  fn test_restore_recovers_attributes() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.save();
    ctx.set_opacity(0.5);
    ctx.set_blend_mode(BlendMode::Multiply);
    ctx.restore();
    assert_eq!(ctx.opacity(), 1.0);
  }

  #[test]
  fn test_opacity_clamping() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.set_opacity(1.5);
    assert_eq!(ctx.opacity(), 1.0);
    ctx.set_opacity(-0.3);
    assert_eq!(ctx.opacity(), 0.0);
    ctx.set_fill_opacity(7.0);
    ctx.set_stroke_opacity(-2.0);
    assert!(ctx.is_valid());
  }

  #[test]
  fn test_path_consumed_by_fill() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.add_rectangle(Rect::from_xywh(1.0, 1.0, 4.0, 4.0));
    assert!(ctx.copy_path().is_some());
    ctx.fill();
    assert!(ctx.copy_path().is_none());
    // A second fill with no path is a harmless no-op
    ctx.fill();
    assert!(ctx.is_valid());
  }

  #[test]
  fn test_path_consumed_by_clip_and_stroke() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.add_rectangle(Rect::from_xywh(1.0, 1.0, 4.0, 4.0));
    ctx.clip();
    assert!(ctx.copy_path().is_none());

    ctx.add_rectangle(Rect::from_xywh(1.0, 1.0, 4.0, 4.0));
    ctx.stroke();
    assert!(ctx.copy_path().is_none());
  }

  #[test]
  fn test_begin_path_with_open_path_keeps_it() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.begin_path();
    ctx.add_rectangle(Rect::from_xywh(0.0, 0.0, 2.0, 2.0));
    let before = ctx.copy_path().unwrap().bounds();
    ctx.begin_path();
    let after = ctx.copy_path().unwrap().bounds();
    assert_eq!(before, after);
  }

  #[test]
  fn test_sticky_invalidity() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    // Malformed geometry poisons the context
    ctx.add_ellipse(Point::new(5.0, 5.0), -3.0, 3.0);
    assert!(!ctx.is_valid());

    // Every later operation is a no-op and validity never returns
    ctx.save();
    assert_eq!(ctx.state_depth(), 0);
    ctx.set_fill_color(Rgba::RED);
    ctx.add_rectangle(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
    ctx.fill();
    ctx.begin_layer(true);
    assert_eq!(ctx.layer_depth(), 0);
    assert!(!ctx.is_valid());

    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 5, 5), (255, 255, 255, 255));
  }

  #[test]
  fn test_fill_none_consumes_without_drawing() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.set_fill_none();
    ctx.add_rectangle(Rect::from_xywh(2.0, 2.0, 6.0, 6.0));
    ctx.fill();
    assert!(ctx.copy_path().is_none());
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 5, 5), (255, 255, 255, 255));
  }

  #[test]
  fn test_clip_limits_fill() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.add_rectangle(Rect::from_xywh(2.0, 2.0, 4.0, 4.0));
    ctx.clip();
    ctx.set_fill_color(Rgba::RED);
    ctx.add_rectangle(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
    ctx.fill();
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 3, 3), (255, 0, 0, 255));
    assert_eq!(pixel(&pixmap, 8, 8), (255, 255, 255, 255));
  }

  #[test]
  fn test_clip_survives_save_restore() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.save();
    ctx.add_rectangle(Rect::from_xywh(2.0, 2.0, 4.0, 4.0));
    ctx.clip();
    ctx.restore();
    // The clip was set after the save, so restoring discards it
    ctx.set_fill_color(Rgba::BLUE);
    ctx.add_rectangle(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
    ctx.fill();
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 8, 8), (0, 0, 255, 255));
  }

  #[test]
  fn test_translated_fill() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.translate(4.0, 4.0);
    ctx.set_fill_color(Rgba::GREEN);
    ctx.add_rectangle(Rect::from_xywh(0.0, 0.0, 3.0, 3.0));
    ctx.fill();
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 5, 5), (0, 255, 0, 255));
    assert_eq!(pixel(&pixmap, 1, 1), (255, 255, 255, 255));
  }

  #[test]
  fn test_device_transform_composes_with_layers() {
    let mut ctx = Context::new(40, 40, Rgba::WHITE).unwrap();
    ctx.translate(3.0, 0.0);
    ctx.set_opacity(0.5);
    ctx.begin_layer(true);
    // Inside the layer the local transform is fresh but the device
    // transform still carries the outer translation
    let device = ctx.device_transform();
    assert_eq!(device.tx, 3.0);
    ctx.translate(2.0, 0.0);
    assert_eq!(ctx.device_transform().tx, 5.0);
    ctx.end_layer();
    assert_eq!(ctx.device_transform().tx, 3.0);
  }

  #[test]
  fn test_fast_path_layer_counts_nesting() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    assert_eq!(ctx.layer_nesting(), 0);
    ctx.begin_layer(false);
    assert_eq!(ctx.layer_nesting(), 1);
    assert_eq!(ctx.layer_depth(), 0);
    ctx.end_layer();
    assert_eq!(ctx.layer_nesting(), 0);
  }

  #[test]
  fn test_end_layer_on_root_is_ignored() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.end_layer();
    assert!(ctx.is_valid());
    assert_eq!(ctx.layer_depth(), 0);
  }

  #[test]
  fn test_restore_cannot_cross_layer_boundary() {
    let mut ctx = Context::new(20, 20, Rgba::WHITE).unwrap();
    ctx.set_opacity(0.5);
    ctx.begin_layer(true);
    assert_eq!(ctx.layer_depth(), 1);
    let depth = ctx.state_depth();
    // The state below is the layer's begin point; restore refuses
    ctx.restore();
    assert_eq!(ctx.state_depth(), depth);
    assert!(ctx.is_valid());
    // Saves inside the layer still pair up
    ctx.save();
    ctx.restore();
    assert_eq!(ctx.state_depth(), depth);
    ctx.end_layer();
    assert_eq!(ctx.layer_depth(), 0);
    assert_eq!(ctx.opacity(), 0.5);
  }

  #[test]
  fn test_end_layer_pops_unbalanced_saves() {
    let mut ctx = Context::new(20, 20, Rgba::WHITE).unwrap();
    ctx.set_opacity(0.5);
    ctx.begin_layer(true);
    ctx.save();
    ctx.save();
    ctx.end_layer();
    assert_eq!(ctx.layer_depth(), 0);
    assert_eq!(ctx.state_depth(), 0);
    assert_eq!(ctx.opacity(), 0.5);
  }

  #[test]
  fn test_layer_composites_with_outer_opacity() {
    let mut ctx = Context::new(20, 20, Rgba::TRANSPARENT).unwrap();
    ctx.set_opacity(0.5);
    ctx.begin_layer(true);
    ctx.set_fill_color(Rgba::RED);
    ctx.add_rectangle(Rect::from_xywh(5.0, 5.0, 10.0, 10.0));
    ctx.fill();
    ctx.end_layer();
    let pixmap = ctx.into_pixmap();
    let (_, _, _, a) = pixel(&pixmap, 10, 10);
    assert!((127..=129).contains(&a), "alpha was {}", a);
    assert_eq!(pixel(&pixmap, 1, 1).3, 0);
  }

  #[test]
  fn test_empty_clip_makes_layer_fast_path() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.add_rectangle(Rect::from_xywh(2.0, 2.0, 2.0, 2.0));
    ctx.clip();
    ctx.add_rectangle(Rect::from_xywh(6.0, 6.0, 2.0, 2.0));
    ctx.clip();
    // Disjoint clips leave an empty device clip
    assert!(ctx.device_clip_bounds().is_empty());
    ctx.set_opacity(0.5);
    ctx.begin_layer(true);
    assert_eq!(ctx.layer_depth(), 0);
    assert_eq!(ctx.layer_nesting(), 1);
    ctx.end_layer();
    assert!(ctx.is_valid());
  }

  #[test]
  fn test_dropping_context_with_open_layers_is_safe() {
    let mut ctx = Context::new(30, 30, Rgba::WHITE).unwrap();
    ctx.set_opacity(0.5);
    ctx.begin_layer(true);
    ctx.set_opacity(0.25);
    ctx.begin_layer(true);
    ctx.save();
    assert_eq!(ctx.layer_depth(), 2);
    drop(ctx);
  }

  #[test]
  fn test_copy_image_reads_back_pixels() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.set_fill_color(Rgba::RED);
    ctx.add_rectangle(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
    ctx.fill();
    let region = ctx.copy_image(Rect::from_xywh(2.0, 2.0, 4.0, 4.0)).unwrap();
    assert_eq!(region.width(), 4);
    assert_eq!(pixel(&region, 0, 0), (255, 0, 0, 255));
  }

  #[test]
  fn test_copy_image_on_invalid_context_errors() {
    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.add_ellipse(Point::new(0.0, 0.0), -1.0, 1.0);
    assert!(!ctx.is_valid());
    assert!(ctx.copy_image(Rect::from_xywh(0.0, 0.0, 4.0, 4.0)).is_err());
  }

  #[test]
  fn test_draw_pixmap_at_blits() {
    let mut tile = surface::new_pixmap(2, 2).unwrap();
    tile.fill(tiny_skia::Color::from_rgba8(0, 0, 255, 255));

    let mut ctx = Context::new(10, 10, Rgba::WHITE).unwrap();
    ctx.draw_pixmap_at(&tile, 4.0, 4.0, FilterQuality::Nearest);
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 4, 4), (0, 0, 255, 255));
    assert_eq!(pixel(&pixmap, 7, 7), (255, 255, 255, 255));
  }

  #[test]
  fn test_draw_image_scales_source() {
    let mut tile = surface::new_pixmap(2, 2).unwrap();
    tile.fill(tiny_skia::Color::from_rgba8(0, 128, 0, 255));

    let mut ctx = Context::new(16, 16, Rgba::WHITE).unwrap();
    ctx.draw_image(
      &tile,
      Rect::from_xywh(0.0, 0.0, 2.0, 2.0),
      Rect::from_xywh(4.0, 4.0, 8.0, 8.0),
      FilterQuality::Nearest,
    );
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 8, 8), (0, 128, 0, 255));
    assert_eq!(pixel(&pixmap, 1, 1), (255, 255, 255, 255));
  }

  #[test]
  fn test_stroke_draws_outline_only() {
    let mut ctx = Context::new(20, 20, Rgba::WHITE).unwrap();
    ctx.set_stroke_color(Rgba::BLACK);
    ctx.set_stroke_width(2.0);
    ctx.set_should_antialias(false);
    ctx.add_rectangle(Rect::from_xywh(5.0, 5.0, 10.0, 10.0));
    ctx.stroke();
    let pixmap = ctx.into_pixmap();
    assert_eq!(pixel(&pixmap, 5, 10), (0, 0, 0, 255));
    assert_eq!(pixel(&pixmap, 10, 10), (255, 255, 255, 255));
  }
}
