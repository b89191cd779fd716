//! Stroke attributes and dash patterns

use std::sync::Arc;
use tiny_skia::StrokeDash;

/// Shape drawn at the ends of open subpaths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
  #[default]
  Butt,
  Round,
  Square,
}

impl LineCap {
  pub fn to_skia(self) -> tiny_skia::LineCap {
    match self {
      LineCap::Butt => tiny_skia::LineCap::Butt,
      LineCap::Round => tiny_skia::LineCap::Round,
      LineCap::Square => tiny_skia::LineCap::Square,
    }
  }
}

/// Shape drawn where two stroked segments meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
  #[default]
  Miter,
  Round,
  Bevel,
}

impl LineJoin {
  pub fn to_skia(self) -> tiny_skia::LineJoin {
    match self {
      LineJoin::Miter => tiny_skia::LineJoin::Miter,
      LineJoin::Round => tiny_skia::LineJoin::Round,
      LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
    }
  }
}

/// An immutable, shareable list of stroke dash lengths plus a phase offset
///
/// Dash patterns are validated on construction: the interval list must be
/// non-empty, every interval non-negative, and at least one interval
/// positive. Share via `Arc`; a pattern attached to several states is
/// never mutated.
///
/// # Examples
///
/// ```
/// use fastcanvas::DashPattern;
///
/// let dashes = DashPattern::new(vec![4.0, 2.0], 0.0).unwrap();
/// assert_eq!(dashes.intervals(), &[4.0, 2.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DashPattern {
  intervals: Vec<f32>,
  phase: f32,
}

impl DashPattern {
  /// Creates a validated dash pattern
  ///
  /// Returns None for an empty list, negative or non-finite intervals,
  /// or a list whose intervals are all zero.
  pub fn new(intervals: Vec<f32>, phase: f32) -> Option<Self> {
    if intervals.is_empty() || !phase.is_finite() {
      return None;
    }
    let mut sum = 0.0f32;
    for &len in &intervals {
      if !len.is_finite() || len < 0.0 {
        return None;
      }
      sum += len;
    }
    if sum <= 0.0 {
      return None;
    }
    Some(Self { intervals, phase })
  }

  /// The dash interval list
  pub fn intervals(&self) -> &[f32] {
    &self.intervals
  }

  /// Offset into the pattern at which dashing starts
  pub fn phase(&self) -> f32 {
    self.phase
  }

  /// Converts to the backend dash representation
  ///
  /// The backend requires an even number of intervals; odd-length lists
  /// are repeated once, the conventional dashing behavior.
  pub fn to_skia(&self) -> Option<StrokeDash> {
    let mut array = self.intervals.clone();
    if array.len() % 2 != 0 {
      array.extend_from_slice(&self.intervals);
    }
    StrokeDash::new(array, self.phase)
  }
}

/// The stroke attributes of a context state
#[derive(Debug, Clone)]
pub struct StrokeAttrs {
  /// Stroke width in user units
  pub width: f32,
  /// End-cap shape
  pub cap: LineCap,
  /// Join shape
  pub join: LineJoin,
  /// Miter length limit, in multiples of the stroke width
  pub miter_limit: f32,
  /// Optional shared dash pattern; None strokes solid
  pub dash: Option<Arc<DashPattern>>,
}

impl Default for StrokeAttrs {
  fn default() -> Self {
    Self {
      width: 1.0,
      cap: LineCap::Butt,
      join: LineJoin::Miter,
      miter_limit: 4.0,
      dash: None,
    }
  }
}

impl StrokeAttrs {
  /// Converts to the backend stroke description
  pub fn to_skia(&self) -> tiny_skia::Stroke {
    tiny_skia::Stroke {
      width: self.width,
      miter_limit: self.miter_limit,
      line_cap: self.cap.to_skia(),
      line_join: self.join.to_skia(),
      dash: self.dash.as_ref().and_then(|d| d.to_skia()),
    }
  }
}
