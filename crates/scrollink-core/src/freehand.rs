//! Freehand outline shaping.
//!
//! Turns a stream of `(x, y, pressure)` samples into a closed polygon whose
//! width follows pressure, then into a smooth closed path. The shaper sits
//! behind [`OutlineShaper`] so the paint pipeline does not depend on a
//! particular shaping algorithm.

use crate::stroke::StrokePoint;
use kurbo::{BezPath, Point, Vec2};
use std::f64::consts::PI;

/// Slightly more than PI so rotated cap points never coincide exactly.
const FIXED_PI: f64 = PI + 0.0001;
/// How fast simulated pressure follows velocity.
const RATE_OF_PRESSURE_CHANGE: f64 = 0.275;
/// Number of segments in a half-circle cap.
const CAP_STEPS: usize = 13;
/// Number of segments in the end cap sweep.
const END_CAP_STEPS: usize = 29;

/// Parameters for outline shaping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineOptions {
    /// Base diameter in canvas pixels.
    pub size: f64,
    /// Effect of pressure on width. Negative values invert the response.
    pub thinning: f64,
    /// Minimum spacing of outline vertices, as a fraction of `size`.
    pub smoothing: f64,
    /// How strongly input points are pulled towards their predecessor.
    pub streamline: f64,
    /// Derive pressure from point spacing instead of the sampled values.
    pub simulate_pressure: bool,
    /// The input is complete (the final point is used as-is).
    pub last: bool,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            size: 16.0,
            thinning: 0.5,
            smoothing: 0.5,
            streamline: 0.5,
            simulate_pressure: true,
            last: false,
        }
    }
}

/// Produces a closed outline polygon for a run of input samples.
pub trait OutlineShaper {
    fn outline(&self, points: &[StrokePoint], options: &OutlineOptions) -> Vec<Point>;
}

/// Default pressure-sensitive shaper.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreehandShaper;

/// An input point after streamlining.
#[derive(Debug, Clone, Copy)]
struct ShapedPoint {
    point: Point,
    pressure: f64,
    /// Unit vector pointing back towards the previous point.
    vector: Vec2,
    distance: f64,
    running_length: f64,
}

impl OutlineShaper for FreehandShaper {
    fn outline(&self, points: &[StrokePoint], options: &OutlineOptions) -> Vec<Point> {
        let shaped = streamline_points(points, options);
        outline_points(&shaped, options)
    }
}

fn unit(v: Vec2) -> Vec2 {
    let len = v.hypot();
    if len == 0.0 { v } else { v / len }
}

/// Perpendicular, rotated a quarter turn clockwise.
fn perpendicular(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

fn rotate_around(p: Point, center: Point, radians: f64) -> Point {
    let (s, c) = radians.sin_cos();
    let d = p - center;
    Point::new(center.x + d.x * c - d.y * s, center.y + d.x * s + d.y * c)
}

fn pressure_of(sample: &StrokePoint, fallback: f64) -> f64 {
    if sample.pressure >= 0.0 { sample.pressure } else { fallback }
}

fn radius_for(size: f64, thinning: f64, pressure: f64) -> f64 {
    size * (0.5 - thinning * (0.5 - pressure))
}

fn simulated_pressure(previous: f64, distance: f64, size: f64) -> f64 {
    let speed = (distance / size).min(1.0);
    let rest = (1.0 - speed).min(1.0);
    (previous + (rest - previous) * (speed * RATE_OF_PRESSURE_CHANGE)).min(1.0)
}

fn streamline_points(input: &[StrokePoint], options: &OutlineOptions) -> Vec<ShapedPoint> {
    let Some(first) = input.first() else {
        return Vec::new();
    };

    let mut pts: Vec<StrokePoint> = input.to_vec();
    if pts.len() == 2 {
        let end = pts[1];
        pts.truncate(1);
        for i in 1..5 {
            let t = i as f64 / 4.0;
            pts.push(StrokePoint::new(
                first.x + (end.x - first.x) * t,
                first.y + (end.y - first.y) * t,
                end.pressure,
            ));
        }
    }
    if pts.len() == 1 {
        pts.push(StrokePoint::new(first.x + 1.0, first.y + 1.0, first.pressure));
    }

    let t = 0.15 + (1.0 - options.streamline) * 0.85;
    let max = pts.len() - 1;
    let mut out = vec![ShapedPoint {
        point: first.position(),
        pressure: pressure_of(first, 0.25),
        vector: Vec2::new(1.0, 1.0),
        distance: 0.0,
        running_length: 0.0,
    }];
    let mut reached_minimum = false;
    let mut running_length = 0.0;
    let mut prev = out[0];

    for (i, sample) in pts.iter().enumerate().skip(1) {
        let point = if options.last && i == max {
            sample.position()
        } else {
            prev.point.lerp(sample.position(), t)
        };
        if point == prev.point {
            continue;
        }
        let distance = point.distance(prev.point);
        running_length += distance;
        if i < max && !reached_minimum {
            if running_length < options.size {
                continue;
            }
            reached_minimum = true;
        }
        prev = ShapedPoint {
            point,
            pressure: pressure_of(sample, 0.5),
            vector: unit(prev.point - point),
            distance,
            running_length,
        };
        out.push(prev);
    }

    out[0].vector = out.get(1).map(|p| p.vector).unwrap_or(Vec2::ZERO);
    out
}

fn outline_points(points: &[ShapedPoint], options: &OutlineOptions) -> Vec<Point> {
    let size = options.size;
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    if size <= 0.0 {
        return Vec::new();
    }

    let total_length = last.running_length;
    let min_distance = (size * options.smoothing).powi(2);

    let mut left: Vec<Point> = Vec::new();
    let mut right: Vec<Point> = Vec::new();

    let mut prev_pressure = points.iter().take(10).fold(first.pressure, |acc, p| {
        let pressure = if options.simulate_pressure {
            simulated_pressure(acc, p.distance, size)
        } else {
            p.pressure
        };
        (acc + pressure) / 2.0
    });

    let mut radius = radius_for(size, options.thinning, last.pressure);
    let mut first_radius: Option<f64> = None;
    let mut prev_vector = first.vector;
    let mut pl = first.point;
    let mut pr = first.point;
    let mut prev_was_sharp = false;

    for (i, shaped) in points.iter().enumerate() {
        let is_last = i == points.len() - 1;
        if !is_last && total_length - shaped.running_length < 3.0 {
            continue;
        }

        let mut pressure = shaped.pressure;
        if options.thinning != 0.0 {
            if options.simulate_pressure {
                pressure = simulated_pressure(prev_pressure, shaped.distance, size);
            }
            radius = radius_for(size, options.thinning, pressure);
        } else {
            radius = size / 2.0;
        }
        radius = radius.max(0.01);
        if first_radius.is_none() {
            first_radius = Some(radius);
        }

        let next_vector = if is_last { shaped.vector } else { points[i + 1].vector };
        let next_dot = if is_last { 1.0 } else { shaped.vector.dot(next_vector) };
        let prev_dot = shaped.vector.dot(prev_vector);

        let is_sharp = prev_dot < 0.0 && !prev_was_sharp;
        let next_is_sharp = next_dot < 0.0;

        if is_sharp || next_is_sharp {
            let offset = perpendicular(prev_vector) * radius;
            for step in 0..=CAP_STEPS {
                let t = step as f64 / CAP_STEPS as f64;
                let tl = rotate_around(shaped.point - offset, shaped.point, FIXED_PI * t);
                let tr = rotate_around(shaped.point + offset, shaped.point, -FIXED_PI * t);
                left.push(tl);
                right.push(tr);
                pl = tl;
                pr = tr;
            }
            if next_is_sharp {
                prev_was_sharp = true;
            }
            continue;
        }
        prev_was_sharp = false;

        if is_last {
            let offset = perpendicular(shaped.vector) * radius;
            left.push(shaped.point - offset);
            right.push(shaped.point + offset);
            continue;
        }

        let offset = perpendicular(next_vector.lerp(shaped.vector, next_dot)) * radius;
        let tl = shaped.point - offset;
        if i <= 1 || (pl - tl).hypot2() > min_distance {
            left.push(tl);
            pl = tl;
        }
        let tr = shaped.point + offset;
        if i <= 1 || (pr - tr).hypot2() > min_distance {
            right.push(tr);
            pr = tr;
        }

        prev_pressure = pressure;
        prev_vector = shaped.vector;
    }

    let first_point = first.point;
    let last_point = if points.len() > 1 {
        last.point
    } else {
        first.point + Vec2::new(1.0, 1.0)
    };

    if points.len() == 1 {
        let direction = unit(perpendicular(first_point - last_point));
        let start = first_point + direction * -first_radius.unwrap_or(radius);
        return (0..=CAP_STEPS)
            .map(|step| {
                let t = step as f64 / CAP_STEPS as f64;
                rotate_around(start, first_point, FIXED_PI * 2.0 * t)
            })
            .collect();
    }

    let mut start_cap = Vec::with_capacity(CAP_STEPS + 1);
    if let Some(&anchor) = right.first() {
        for step in 0..=CAP_STEPS {
            let t = step as f64 / CAP_STEPS as f64;
            start_cap.push(rotate_around(anchor, first_point, FIXED_PI * t));
        }
    }

    let direction = perpendicular(-last.vector);
    let end_start = last_point + direction * radius;
    let end_cap = (1..END_CAP_STEPS).map(|step| {
        let t = step as f64 / END_CAP_STEPS as f64;
        rotate_around(end_start, last_point, FIXED_PI * 3.0 * t)
    });

    let mut outline = left;
    outline.extend(end_cap);
    outline.extend(right.into_iter().rev());
    outline.extend(start_cap);
    outline
}

/// Build a closed path through an outline polygon, using each vertex as a
/// quadratic control point and the midpoint to its successor as the on-curve
/// point, which avoids visible facets.
pub fn outline_to_path(outline: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let Some(&first) = outline.first() else {
        return path;
    };
    path.move_to(first);
    for pair in outline.windows(2).skip(1) {
        let (p, next) = (pair[0], pair[1]);
        path.quad_to(p, p.midpoint(next));
    }
    path.close_path();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{PathEl, Shape};

    fn samples(points: &[(f64, f64)], pressure: f64) -> Vec<StrokePoint> {
        points
            .iter()
            .map(|&(x, y)| StrokePoint::new(x, y, pressure))
            .collect()
    }

    fn options(size: f64) -> OutlineOptions {
        OutlineOptions {
            size,
            thinning: 0.65,
            last: true,
            ..OutlineOptions::default()
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(FreehandShaper.outline(&[], &options(10.0)).is_empty());
    }

    #[test]
    fn test_single_point_stays_near_sample() {
        let outline = FreehandShaper.outline(&samples(&[(50.0, 50.0)], 0.5), &options(10.0));
        assert!(!outline.is_empty());
        for p in &outline {
            let d = p.distance(Point::new(50.0, 50.0));
            assert!(d > 0.0 && d < 10.0, "vertex at distance {d}");
        }
    }

    #[test]
    fn test_repeated_point_is_a_dot() {
        let outline = FreehandShaper.outline(
            &samples(&[(50.0, 50.0), (50.0, 50.0)], 0.5),
            &options(10.0),
        );
        assert_eq!(outline.len(), CAP_STEPS + 1);
        let center = Point::new(50.0, 50.0);
        let r = outline[0].distance(center);
        for p in &outline {
            assert!((p.distance(center) - r).abs() < 1e-6);
        }
    }

    #[test]
    fn test_outline_surrounds_line() {
        let pts: Vec<(f64, f64)> = (0..40).map(|i| (i as f64 * 5.0, 100.0)).collect();
        let outline = FreehandShaper.outline(&samples(&pts, 0.5), &options(10.0));
        assert!(outline.len() > 10);
        let above = outline.iter().any(|p| p.y < 99.0);
        let below = outline.iter().any(|p| p.y > 101.0);
        assert!(above && below);
        for p in &outline {
            assert!(p.x.is_finite() && p.y.is_finite());
            assert!((p.y - 100.0).abs() <= 10.0);
        }
    }

    #[test]
    fn test_thinning_widens_with_pressure() {
        let pts: Vec<(f64, f64)> = (0..30).map(|i| (i as f64 * 4.0, 0.0)).collect();
        let mut opts = options(10.0);
        opts.simulate_pressure = false;
        let light = FreehandShaper.outline(&samples(&pts, 0.1), &opts);
        let heavy = FreehandShaper.outline(&samples(&pts, 1.0), &opts);
        let spread = |o: &[Point]| o.iter().map(|p| p.y.abs()).fold(0.0, f64::max);
        assert!(spread(&heavy) > spread(&light));

        opts.thinning = -0.65;
        let light = FreehandShaper.outline(&samples(&pts, 0.1), &opts);
        let heavy = FreehandShaper.outline(&samples(&pts, 1.0), &opts);
        assert!(spread(&heavy) < spread(&light));
    }

    #[test]
    fn test_outline_to_path_is_closed_quads() {
        let outline = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let path = outline_to_path(&outline);
        let els: Vec<PathEl> = path.elements().to_vec();
        assert_eq!(els.len(), 4);
        assert!(matches!(els[0], PathEl::MoveTo(_)));
        assert_eq!(els[1], PathEl::QuadTo(Point::new(10.0, 0.0), Point::new(10.0, 5.0)));
        assert_eq!(els[2], PathEl::QuadTo(Point::new(10.0, 10.0), Point::new(5.0, 10.0)));
        assert_eq!(els[3], PathEl::ClosePath);
        assert!(path.bounding_box().width() > 0.0);
    }

    #[test]
    fn test_outline_to_path_empty() {
        assert!(outline_to_path(&[]).elements().is_empty());
    }
}
