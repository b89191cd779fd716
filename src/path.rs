//! Path construction
//!
//! [`PathSink`] wraps the backend path builder and carries the shape
//! helpers the context exposes: curves, rectangles, rounded rectangles,
//! ellipses, arcs, sectors, segments, polygons and dots. A sink that
//! receives malformed geometry (non-finite coordinates, negative radii)
//! goes *bad*; the owning context translates that into its sticky
//! invalidity instead of panicking mid-draw.

use crate::geometry::{Point, Rect};
use tiny_skia::{Path, PathBuilder, Transform};

// Cubic bezier circle approximation constant: 4/3 * tan(pi/8)
const KAPPA: f32 = 0.552_284_8;

/// An in-progress path
///
/// # Examples
///
/// ```
/// use fastcanvas::{PathSink, Point, Rect};
///
/// let mut sink = PathSink::new();
/// sink.move_to(Point::new(0.0, 0.0));
/// sink.line_to(Point::new(10.0, 0.0));
/// sink.line_to(Point::new(10.0, 10.0));
/// sink.close();
/// assert!(sink.finish().is_some());
/// ```
#[derive(Clone, Default)]
pub struct PathSink {
  builder: PathBuilder,
  bad: bool,
}

impl PathSink {
  /// Creates an empty sink
  pub fn new() -> Self {
    Self {
      builder: PathBuilder::new(),
      bad: false,
    }
  }

  /// True once any operation received malformed geometry
  pub fn is_bad(&self) -> bool {
    self.bad
  }

  /// True when nothing has been appended yet
  pub fn is_empty(&self) -> bool {
    self.builder.is_empty()
  }

  fn check(&mut self, values: &[f32]) -> bool {
    if values.iter().any(|v| !v.is_finite()) {
      self.bad = true;
      return false;
    }
    true
  }

  /// Starts a new subpath at the given point
  pub fn move_to(&mut self, p: Point) {
    if self.check(&[p.x, p.y]) {
      self.builder.move_to(p.x, p.y);
    }
  }

  /// Appends a line segment
  pub fn line_to(&mut self, p: Point) {
    if self.check(&[p.x, p.y]) {
      self.ensure_start(p);
      self.builder.line_to(p.x, p.y);
    }
  }

  /// Appends a quadratic bezier segment
  pub fn quad_to(&mut self, ctrl: Point, p: Point) {
    if self.check(&[ctrl.x, ctrl.y, p.x, p.y]) {
      self.ensure_start(ctrl);
      self.builder.quad_to(ctrl.x, ctrl.y, p.x, p.y);
    }
  }

  /// Appends a cubic bezier segment
  pub fn cubic_to(&mut self, ctrl1: Point, ctrl2: Point, p: Point) {
    if self.check(&[ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, p.x, p.y]) {
      self.ensure_start(ctrl1);
      self
        .builder
        .cubic_to(ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, p.x, p.y);
    }
  }

  /// Appends a circular arc tangent to the lines current→p1 and p1→p2
  ///
  /// The classic `arct` construction: a line segment is emitted up to
  /// the first tangent point, then the arc itself. Degenerate input
  /// (zero radius, collinear points) degrades to a line to `p1`.
  pub fn arc_to(&mut self, p1: Point, p2: Point, radius: f32) {
    if !self.check(&[p1.x, p1.y, p2.x, p2.y, radius]) {
      return;
    }
    if radius < 0.0 {
      self.bad = true;
      return;
    }

    let p0 = match self.builder.last_point() {
      Some(p) => Point::new(p.x, p.y),
      None => {
        self.builder.move_to(p1.x, p1.y);
        return;
      }
    };

    let v1 = (p0.x - p1.x, p0.y - p1.y);
    let v2 = (p2.x - p1.x, p2.y - p1.y);
    let len1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let len2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if radius == 0.0 || len1 < f32::EPSILON || len2 < f32::EPSILON {
      self.builder.line_to(p1.x, p1.y);
      return;
    }

    let u1 = (v1.0 / len1, v1.1 / len1);
    let u2 = (v2.0 / len2, v2.1 / len2);
    let cross = u1.0 * u2.1 - u1.1 * u2.0;
    let dot = (u1.0 * u2.0 + u1.1 * u2.1).clamp(-1.0, 1.0);
    if cross.abs() < 1e-6 {
      // Collinear tangents have no arc between them
      self.builder.line_to(p1.x, p1.y);
      return;
    }

    let theta = dot.acos();
    let tangent_dist = radius / (theta / 2.0).tan();
    let t1 = Point::new(p1.x + u1.0 * tangent_dist, p1.y + u1.1 * tangent_dist);

    // Arc center sits along the angle bisector
    let bisector = (u1.0 + u2.0, u1.1 + u2.1);
    let bisector_len = (bisector.0 * bisector.0 + bisector.1 * bisector.1).sqrt();
    let center_dist = radius / (theta / 2.0).sin();
    let center = Point::new(
      p1.x + bisector.0 / bisector_len * center_dist,
      p1.y + bisector.1 / bisector_len * center_dist,
    );

    let start = (t1.y - center.y).atan2(t1.x - center.x);
    let sweep = if cross > 0.0 {
      theta - std::f32::consts::PI
    } else {
      std::f32::consts::PI - theta
    };

    self.builder.line_to(t1.x, t1.y);
    append_arc(&mut self.builder, center, radius, radius, start, sweep);
  }

  /// Closes the current subpath
  pub fn close(&mut self) {
    self.builder.close();
  }

  /// Appends a rectangle as a closed subpath
  pub fn add_rectangle(&mut self, rect: Rect) {
    if !self.check(&[rect.x(), rect.y(), rect.width(), rect.height()]) {
      return;
    }
    if rect.is_empty() {
      return;
    }
    self.builder.move_to(rect.min_x(), rect.min_y());
    self.builder.line_to(rect.max_x(), rect.min_y());
    self.builder.line_to(rect.max_x(), rect.max_y());
    self.builder.line_to(rect.min_x(), rect.max_y());
    self.builder.close();
  }

  /// Appends a rounded rectangle with per-axis corner radii
  pub fn add_rounded_rectangle(&mut self, rect: Rect, rx: f32, ry: f32) {
    if !self.check(&[rect.x(), rect.y(), rect.width(), rect.height(), rx, ry]) {
      return;
    }
    if rx < 0.0 || ry < 0.0 {
      self.bad = true;
      return;
    }
    if rect.is_empty() {
      return;
    }
    let rx = rx.min(rect.width() / 2.0);
    let ry = ry.min(rect.height() / 2.0);
    if rx == 0.0 || ry == 0.0 {
      return self.add_rectangle(rect);
    }

    let (l, t, r, b) = (rect.min_x(), rect.min_y(), rect.max_x(), rect.max_y());
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);

    self.builder.move_to(l + rx, t);
    self.builder.line_to(r - rx, t);
    self
      .builder
      .cubic_to(r - rx + kx, t, r, t + ry - ky, r, t + ry);
    self.builder.line_to(r, b - ry);
    self
      .builder
      .cubic_to(r, b - ry + ky, r - rx + kx, b, r - rx, b);
    self.builder.line_to(l + rx, b);
    self
      .builder
      .cubic_to(l + rx - kx, b, l, b - ry + ky, l, b - ry);
    self.builder.line_to(l, t + ry);
    self
      .builder
      .cubic_to(l, t + ry - ky, l + rx - kx, t, l + rx, t);
    self.builder.close();
  }

  /// Appends an axis-aligned ellipse as a closed subpath
  pub fn add_ellipse(&mut self, center: Point, rx: f32, ry: f32) {
    if !self.check(&[center.x, center.y, rx, ry]) {
      return;
    }
    if rx < 0.0 || ry < 0.0 {
      self.bad = true;
      return;
    }
    if rx == 0.0 || ry == 0.0 {
      return;
    }
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);
    let (cx, cy) = (center.x, center.y);

    self.builder.move_to(cx, cy - ry);
    self
      .builder
      .cubic_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
    self
      .builder
      .cubic_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
    self
      .builder
      .cubic_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
    self
      .builder
      .cubic_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
    self.builder.close();
  }

  /// Appends an elliptical arc as a new open subpath
  ///
  /// Angles are in degrees, measured clockwise from the positive x axis
  /// (the y axis points down).
  pub fn add_arc(&mut self, center: Point, rx: f32, ry: f32, start_deg: f32, sweep_deg: f32) {
    if !self.arc_start(center, rx, ry, start_deg, sweep_deg, false) {
      return;
    }
    append_arc(
      &mut self.builder,
      center,
      rx,
      ry,
      start_deg.to_radians(),
      sweep_deg.to_radians(),
    );
  }

  /// Appends a pie-slice sector: center, arc, closed
  pub fn add_sector(&mut self, center: Point, rx: f32, ry: f32, start_deg: f32, sweep_deg: f32) {
    if !self.arc_start(center, rx, ry, start_deg, sweep_deg, true) {
      return;
    }
    append_arc(
      &mut self.builder,
      center,
      rx,
      ry,
      start_deg.to_radians(),
      sweep_deg.to_radians(),
    );
    self.builder.close();
  }

  /// Appends a chord segment: arc closed straight back to its start
  pub fn add_segment(&mut self, center: Point, rx: f32, ry: f32, start_deg: f32, sweep_deg: f32) {
    if !self.arc_start(center, rx, ry, start_deg, sweep_deg, false) {
      return;
    }
    append_arc(
      &mut self.builder,
      center,
      rx,
      ry,
      start_deg.to_radians(),
      sweep_deg.to_radians(),
    );
    self.builder.close();
  }

  fn arc_start(
    &mut self,
    center: Point,
    rx: f32,
    ry: f32,
    start_deg: f32,
    sweep_deg: f32,
    from_center: bool,
  ) -> bool {
    if !self.check(&[center.x, center.y, rx, ry, start_deg, sweep_deg]) {
      return false;
    }
    if rx < 0.0 || ry < 0.0 {
      self.bad = true;
      return false;
    }
    if rx == 0.0 || ry == 0.0 || sweep_deg == 0.0 {
      return false;
    }
    let start = start_deg.to_radians();
    let sx = center.x + rx * start.cos();
    let sy = center.y + ry * start.sin();
    if from_center {
      self.builder.move_to(center.x, center.y);
      self.builder.line_to(sx, sy);
    } else {
      self.builder.move_to(sx, sy);
    }
    true
  }

  /// Appends a single line segment as its own subpath
  pub fn add_line(&mut self, from: Point, to: Point) {
    if self.check(&[from.x, from.y, to.x, to.y]) {
      self.builder.move_to(from.x, from.y);
      self.builder.line_to(to.x, to.y);
    }
  }

  /// Appends a closed polygon
  pub fn add_polygon(&mut self, points: &[Point]) {
    self.add_poly(points, true);
  }

  /// Appends an open polyline
  pub fn add_polyline(&mut self, points: &[Point]) {
    self.add_poly(points, false);
  }

  fn add_poly(&mut self, points: &[Point], closed: bool) {
    if points.len() < 2 {
      return;
    }
    for p in points {
      if !self.check(&[p.x, p.y]) {
        return;
      }
    }
    self.builder.move_to(points[0].x, points[0].y);
    for p in &points[1..] {
      self.builder.line_to(p.x, p.y);
    }
    if closed {
      self.builder.close();
    }
  }

  /// Appends a dot: a hairline-sized filled circle
  pub fn add_dot(&mut self, p: Point) {
    self.add_ellipse(p, 0.5, 0.5);
  }

  /// Appends a finished path, optionally transformed
  pub fn add_path(&mut self, path: &Path, transform: Option<Transform>) {
    let transformed;
    let source = match transform {
      Some(ts) if !ts.is_identity() => match path.clone().transform(ts) {
        Some(p) => {
          transformed = p;
          &transformed
        }
        None => {
          self.bad = true;
          return;
        }
      },
      _ => path,
    };
    for segment in source.segments() {
      match segment {
        tiny_skia::PathSegment::MoveTo(p) => self.builder.move_to(p.x, p.y),
        tiny_skia::PathSegment::LineTo(p) => self.builder.line_to(p.x, p.y),
        tiny_skia::PathSegment::QuadTo(c, p) => self.builder.quad_to(c.x, c.y, p.x, p.y),
        tiny_skia::PathSegment::CubicTo(c1, c2, p) => {
          self.builder.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y)
        }
        tiny_skia::PathSegment::Close => self.builder.close(),
      }
    }
  }

  /// Finishes the sink into a backend path
  ///
  /// Returns None when the sink is empty or bad.
  pub fn finish(self) -> Option<Path> {
    if self.bad {
      return None;
    }
    self.builder.finish()
  }

  /// Snapshots the current contents without consuming the sink
  pub fn snapshot(&self) -> Option<Path> {
    if self.bad {
      return None;
    }
    self.builder.clone().finish()
  }

  // A curve op with no preceding move_to opens the subpath at the
  // op's first point, mirroring the usual canvas behavior.
  fn ensure_start(&mut self, p: Point) {
    if self.builder.last_point().is_none() {
      self.builder.move_to(p.x, p.y);
    }
  }
}

/// Appends an elliptical arc to `builder` as cubic segments
///
/// The sweep is split into quarter-turn chunks, each approximated with
/// one cubic. Assumes the builder already has a current point at the
/// arc's start.
fn append_arc(
  builder: &mut PathBuilder,
  center: Point,
  rx: f32,
  ry: f32,
  start: f32,
  sweep: f32,
) {
  let steps = (sweep.abs() / std::f32::consts::FRAC_PI_2).ceil().max(1.0) as usize;
  let delta = sweep / steps as f32;
  let k = 4.0 / 3.0 * (delta / 4.0).tan();

  let mut angle = start;
  for _ in 0..steps {
    let next = angle + delta;
    let (sin0, cos0) = angle.sin_cos();
    let (sin1, cos1) = next.sin_cos();

    let p0 = (center.x + rx * cos0, center.y + ry * sin0);
    let p3 = (center.x + rx * cos1, center.y + ry * sin1);
    let c1 = (p0.0 - k * rx * sin0, p0.1 + k * ry * cos0);
    let c2 = (p3.0 + k * rx * sin1, p3.1 - k * ry * cos1);

    builder.cubic_to(c1.0, c1.1, c2.0, c2.1, p3.0, p3.1);
    angle = next;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_sink_finishes_to_none() {
    assert!(PathSink::new().finish().is_none());
  }

  #[test]
  fn test_rectangle_bounds() {
    let mut sink = PathSink::new();
    sink.add_rectangle(Rect::from_xywh(2.0, 3.0, 10.0, 4.0));
    let path = sink.finish().expect("rect path");
    let bounds = path.bounds();
    assert_eq!(bounds.left(), 2.0);
    assert_eq!(bounds.top(), 3.0);
    assert_eq!(bounds.right(), 12.0);
    assert_eq!(bounds.bottom(), 7.0);
  }

  #[test]
  fn test_ellipse_bounds() {
    let mut sink = PathSink::new();
    sink.add_ellipse(Point::new(10.0, 10.0), 5.0, 3.0);
    let path = sink.finish().expect("ellipse path");
    let bounds = path.bounds();
    assert!((bounds.left() - 5.0).abs() < 0.01);
    assert!((bounds.right() - 15.0).abs() < 0.01);
    assert!((bounds.top() - 7.0).abs() < 0.01);
    assert!((bounds.bottom() - 13.0).abs() < 0.01);
  }

  #[test]
  fn test_non_finite_input_marks_bad() {
    let mut sink = PathSink::new();
    sink.move_to(Point::new(0.0, 0.0));
    sink.line_to(Point::new(f32::NAN, 1.0));
    assert!(sink.is_bad());
    assert!(sink.finish().is_none());
  }

  #[test]
  fn test_negative_radius_marks_bad() {
    let mut sink = PathSink::new();
    sink.add_ellipse(Point::new(0.0, 0.0), -1.0, 2.0);
    assert!(sink.is_bad());
  }

  #[test]
  fn test_zero_sweep_arc_adds_nothing() {
    let mut sink = PathSink::new();
    sink.add_arc(Point::new(0.0, 0.0), 5.0, 5.0, 0.0, 0.0);
    assert!(sink.is_empty());
    assert!(!sink.is_bad());
  }

  #[test]
  fn test_full_circle_arc_bounds() {
    let mut sink = PathSink::new();
    sink.add_arc(Point::new(0.0, 0.0), 4.0, 4.0, 0.0, 360.0);
    let path = sink.finish().expect("circle");
    let bounds = path.bounds();
    assert!((bounds.left() + 4.0).abs() < 0.05);
    assert!((bounds.right() - 4.0).abs() < 0.05);
  }

  #[test]
  fn test_arc_to_collinear_degrades_to_line() {
    let mut sink = PathSink::new();
    sink.move_to(Point::new(0.0, 0.0));
    sink.arc_to(Point::new(5.0, 0.0), Point::new(10.0, 0.0), 2.0);
    assert!(!sink.is_bad());
    assert!(sink.finish().is_some());
  }

  #[test]
  fn test_arc_to_rounds_a_corner() {
    let mut sink = PathSink::new();
    sink.move_to(Point::new(0.0, 0.0));
    sink.arc_to(Point::new(10.0, 0.0), Point::new(10.0, 10.0), 3.0);
    let path = sink.finish().expect("arc corner");
    let bounds = path.bounds();
    // The arc ends at the second tangent point (10, 3) and stays
    // inside the corner's bounding box
    assert!((bounds.right() - 10.0).abs() < 0.05);
    assert!((bounds.bottom() - 3.0).abs() < 0.05);
    assert!(bounds.top() >= -0.05);
  }

  #[test]
  fn test_snapshot_leaves_sink_usable() {
    let mut sink = PathSink::new();
    sink.add_rectangle(Rect::from_xywh(0.0, 0.0, 4.0, 4.0));
    let snap = sink.snapshot().expect("snapshot");
    sink.add_rectangle(Rect::from_xywh(10.0, 10.0, 4.0, 4.0));
    let full = sink.finish().expect("full");
    assert!(full.bounds().right() > snap.bounds().right());
  }

  #[test]
  fn test_polygon_closes() {
    let mut sink = PathSink::new();
    sink.add_polygon(&[
      Point::new(0.0, 0.0),
      Point::new(4.0, 0.0),
      Point::new(2.0, 3.0),
    ]);
    assert!(sink.finish().is_some());
  }

  #[test]
  fn test_short_polyline_ignored() {
    let mut sink = PathSink::new();
    sink.add_polyline(&[Point::new(1.0, 1.0)]);
    assert!(sink.is_empty());
  }
}
