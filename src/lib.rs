//! fastcanvas: a layered 2D vector-graphics rendering context
//!
//! A stateful drawing surface over [tiny-skia]: path construction,
//! paint and stroke attributes, a save/restore attribute stack, nested
//! offscreen compositing layers, and bitmap effects (drop shadow, inner
//! shadow, outer glow, inner glow, color overlay) rendered from a
//! layer's alpha coverage.
//!
//! # Quick start
//!
//! ```
//! use fastcanvas::{BitmapEffects, Context, EffectParams, Point, Rect, Rgba};
//!
//! let mut ctx = Context::new(256, 256, Rgba::WHITE)?;
//!
//! // A rounded card with a drop shadow
//! let card = Rect::from_xywh(48.0, 48.0, 160.0, 120.0);
//! let effects = BitmapEffects {
//!   drop_shadow: Some(EffectParams {
//!     offset: Point::new(4.0, 4.0),
//!     size: 6.0,
//!     ..Default::default()
//!   }),
//!   ..Default::default()
//! };
//! ctx.begin_layer_with_effects(card.inflate(1.0), effects);
//! ctx.set_fill_color(Rgba::rgb(240, 240, 250));
//! ctx.add_rounded_rectangle(card, 12.0, 12.0);
//! ctx.fill();
//! ctx.end_layer();
//!
//! assert!(ctx.is_valid());
//! let pixmap = ctx.into_pixmap();
//! # Ok::<(), fastcanvas::Error>(())
//! ```
//!
//! # Error policy
//!
//! Drawing never returns errors. An unrecoverable failure marks the
//! context invalid and all later operations become silent no-ops; check
//! [`Context::is_valid`] after a group of calls. See the
//! [`context`] module documentation for the full policy.
//!
//! [tiny-skia]: https://github.com/linebender/tiny-skia

pub mod color;
pub mod context;
pub mod effects;
pub mod error;
pub mod geometry;
pub mod paint;
pub mod path;
pub mod stroke;

mod layer;
mod mask;
mod state;
mod surface;

pub use color::Rgba;
pub use context::Context;
pub use effects::{BitmapEffects, EffectParams};
pub use error::{Error, Result, SurfaceError};
pub use geometry::{IntRect, Point, Rect, Size};
pub use paint::{BlendMode, Gradient, GradientKind, GradientStop, Paint};
pub use path::PathSink;
pub use stroke::{DashPattern, LineCap, LineJoin, StrokeAttrs};

// Backend types that appear in the public API
pub use tiny_skia::{FillRule, FilterQuality, Pixmap, SpreadMode, Transform};
