//! Paint sources and blend modes
//!
//! A [`Paint`] is an immutable description of how a fill or stroke is
//! colored: a solid color, a tiled pattern image, or a multi-stop
//! gradient. Paints are shared via `Arc` (a single paint may be attached
//! to the fill and stroke of any number of context states at once) and
//! are never mutated after construction.
//!
//! Conversion to a backend shader happens at draw time; the paint itself
//! stores backend-independent data plus its own local-to-device transform
//! and resampling filter.

use crate::color::Rgba;
use crate::geometry::Point;
use tiny_skia::{FilterQuality, Shader, SpreadMode, Transform};

/// How a blend operation combines source and destination pixels
///
/// The default is [`BlendMode::SourceOver`]. Modes map one-to-one onto
/// the backend compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
  Clear,
  Source,
  Destination,
  #[default]
  SourceOver,
  DestinationOver,
  SourceIn,
  DestinationIn,
  SourceOut,
  DestinationOut,
  SourceAtop,
  DestinationAtop,
  Xor,
  Plus,
  Modulate,
  Multiply,
  Screen,
  Overlay,
  Darken,
  Lighten,
  ColorDodge,
  ColorBurn,
  HardLight,
  SoftLight,
  Difference,
  Exclusion,
}

impl BlendMode {
  /// Returns true for the default compositing mode
  pub fn is_source_over(self) -> bool {
    self == BlendMode::SourceOver
  }

  /// Converts to the backend blend mode
  pub fn to_skia(self) -> tiny_skia::BlendMode {
    use tiny_skia::BlendMode as S;
    match self {
      BlendMode::Clear => S::Clear,
      BlendMode::Source => S::Source,
      BlendMode::Destination => S::Destination,
      BlendMode::SourceOver => S::SourceOver,
      BlendMode::DestinationOver => S::DestinationOver,
      BlendMode::SourceIn => S::SourceIn,
      BlendMode::DestinationIn => S::DestinationIn,
      BlendMode::SourceOut => S::SourceOut,
      BlendMode::DestinationOut => S::DestinationOut,
      BlendMode::SourceAtop => S::SourceAtop,
      BlendMode::DestinationAtop => S::DestinationAtop,
      BlendMode::Xor => S::Xor,
      BlendMode::Plus => S::Plus,
      BlendMode::Modulate => S::Modulate,
      BlendMode::Multiply => S::Multiply,
      BlendMode::Screen => S::Screen,
      BlendMode::Overlay => S::Overlay,
      BlendMode::Darken => S::Darken,
      BlendMode::Lighten => S::Lighten,
      BlendMode::ColorDodge => S::ColorDodge,
      BlendMode::ColorBurn => S::ColorBurn,
      BlendMode::HardLight => S::HardLight,
      BlendMode::SoftLight => S::SoftLight,
      BlendMode::Difference => S::Difference,
      BlendMode::Exclusion => S::Exclusion,
    }
  }
}

/// One color stop of a gradient ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
  /// Position along the ramp, 0.0 to 1.0
  pub offset: f32,
  /// Color at this position
  pub color: Rgba,
}

impl GradientStop {
  pub fn new(offset: f32, color: Rgba) -> Self {
    Self {
      offset: offset.clamp(0.0, 1.0),
      color,
    }
  }
}

/// Geometry of a gradient ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientKind {
  /// Linear ramp between two points
  Linear { from: Point, to: Point },
  /// Radial ramp from a center out to a radius
  Radial { center: Point, radius: f32 },
}

/// A multi-stop gradient paint
///
/// Carries its own local-to-device transform and spread mode; the stop
/// ramp is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
  pub kind: GradientKind,
  pub stops: Vec<GradientStop>,
  pub spread: SpreadMode,
  pub transform: Transform,
}

/// A tiled pattern paint
#[derive(Debug, Clone)]
pub struct Pattern {
  /// Tile image, shared between paints
  pub image: std::sync::Arc<tiny_skia::Pixmap>,
  /// Pattern-space to device-space transform
  pub transform: Transform,
  /// Resampling filter used when the transform is not pixel-aligned
  pub filter: FilterQuality,
}

/// An immutable fill/stroke color source
///
/// Construct once, wrap in an `Arc`, attach to any number of states.
/// A "none" paint is represented as the absence of a paint
/// (`Option<Arc<Paint>>` on the context state), not as a variant here.
#[derive(Debug, Clone)]
pub enum Paint {
  /// Uniform color
  Solid(Rgba),
  /// Tiled raster pattern
  Pattern(Pattern),
  /// Linear or radial gradient
  Gradient(Gradient),
}

impl Paint {
  /// Convenience constructor for a solid paint
  pub fn solid(color: Rgba) -> Self {
    Paint::Solid(color)
  }

  /// Convenience constructor for a pattern paint
  pub fn pattern(
    image: std::sync::Arc<tiny_skia::Pixmap>,
    transform: Transform,
    filter: FilterQuality,
  ) -> Self {
    Paint::Pattern(Pattern {
      image,
      transform,
      filter,
    })
  }

  /// Builds the backend shader for this paint
  ///
  /// `opacity` is the product of the state's global and per-paint
  /// opacities; it is folded into the shader so the backend applies it
  /// in a single pass. Returns None when the gradient geometry is
  /// degenerate (e.g. zero-length linear ramp), in which case the draw
  /// is skipped.
  pub fn to_shader(&self, opacity: f32) -> Option<Shader<'_>> {
    let opacity = opacity.clamp(0.0, 1.0);
    match self {
      Paint::Solid(color) => Some(Shader::SolidColor(color.to_skia_with_opacity(opacity))),
      Paint::Pattern(pattern) => Some(tiny_skia::Pattern::new(
        pattern.image.as_ref().as_ref(),
        SpreadMode::Repeat,
        pattern.filter,
        opacity,
        pattern.transform,
      )),
      Paint::Gradient(gradient) => {
        let stops: Vec<tiny_skia::GradientStop> = gradient
          .stops
          .iter()
          .map(|stop| {
            tiny_skia::GradientStop::new(
              stop.offset,
              stop.color.to_skia_with_opacity(opacity),
            )
          })
          .collect();
        if stops.is_empty() {
          return None;
        }
        match gradient.kind {
          GradientKind::Linear { from, to } => tiny_skia::LinearGradient::new(
            tiny_skia::Point::from_xy(from.x, from.y),
            tiny_skia::Point::from_xy(to.x, to.y),
            stops,
            gradient.spread,
            gradient.transform,
          ),
          GradientKind::Radial { center, radius } => tiny_skia::RadialGradient::new(
            tiny_skia::Point::from_xy(center.x, center.y),
            tiny_skia::Point::from_xy(center.x, center.y),
            radius,
            stops,
            gradient.spread,
            gradient.transform,
          ),
        }
      }
    }
  }
}
