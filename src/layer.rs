//! Compositing layer records
//!
//! The context draws into exactly one raster at a time. Opening a layer
//! swaps a freshly allocated raster into place and parks the parent's
//! raster, together with everything needed to resume it, in a
//! [`LayerRecord`] on the layer stack. Closing the layer swaps back and
//! composites. The root layer is the context's own surface and has no
//! record; `Vec` ownership releases every parked raster exactly once,
//! whether layers are closed in order or the context is dropped with
//! layers still open.

use crate::effects::BitmapEffects;
use tiny_skia::{Pixmap, Transform};

/// Parent-layer state parked while a child layer is open
pub(crate) struct LayerRecord {
  /// The parent layer's raster
  pub pixmap: Pixmap,
  /// Device-space top-left of the parent raster
  pub origin: (i32, i32),
  /// The parent scope's base transform
  pub base_transform: Transform,
  /// The parent layer's suppressed begin/end count
  pub nesting: u32,
  /// Effects to apply when the child composites back, if any
  pub effects: Option<BitmapEffects>,
}
