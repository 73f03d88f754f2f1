//! Planar geometry helpers
//!
//! All route math works on plain `(x, y)` tuples in a single planar unit
//! (meters for projected coordinates, degrees when a router hands back raw
//! lon/lat). Nothing here holds state.
//!
//! Degenerate inputs never panic:
//! - zero-length segments report progress `1.0` (already complete)
//! - zero-length vectors make [`angle_between`] return `None`

/// A 2D point or vector `(x, y)`.
pub type Point = (f64, f64);

/// Lengths below this are treated as zero.
pub const EPSILON: f64 = 1e-6;

#[inline]
pub fn sub(a: Point, b: Point) -> Point {
    (a.0 - b.0, a.1 - b.1)
}

#[inline]
pub fn add(a: Point, b: Point) -> Point {
    (a.0 + b.0, a.1 + b.1)
}

#[inline]
pub fn scale(v: Point, factor: f64) -> Point {
    (v.0 * factor, v.1 * factor)
}

#[inline]
pub fn dot(a: Point, b: Point) -> f64 {
    a.0 * b.0 + a.1 * b.1
}

#[inline]
pub fn length(v: Point) -> f64 {
    (v.0 * v.0 + v.1 * v.1).sqrt()
}

#[inline]
pub fn distance(a: Point, b: Point) -> f64 {
    length(sub(b, a))
}

/// Unit vector, or `None` when `v` is shorter than [`EPSILON`].
#[inline]
pub fn normalize(v: Point) -> Option<Point> {
    let len = length(v);
    if len < EPSILON {
        None
    } else {
        Some((v.0 / len, v.1 / len))
    }
}

/// Linear interpolation between `a` and `b`; `t` is not clamped.
#[inline]
pub fn lerp(a: Point, b: Point, t: f64) -> Point {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

/// Move from `current` toward `target` by at most `max_step`.
pub fn move_towards(current: Point, target: Point, max_step: f64) -> Point {
    let to_target = sub(target, current);
    let dist = length(to_target);
    if dist <= max_step || dist < EPSILON {
        target
    } else {
        add(current, scale(to_target, max_step / dist))
    }
}

/// Signed progress of `point` along the segment `start -> end`.
///
/// Projection of `point - start` onto the segment direction, divided by the
/// segment length. `0.0` is the start, `1.0` the end; values outside `[0, 1]`
/// mean the point projects before the start or past the end of the segment.
/// Degenerate segments return `1.0`.
pub fn segment_progress(point: Point, start: Point, end: Point) -> f64 {
    let seg = sub(end, start);
    let seg_len = length(seg);
    if seg_len < EPSILON {
        return 1.0;
    }
    let dir = (seg.0 / seg_len, seg.1 / seg_len);
    dot(sub(point, start), dir) / seg_len
}

/// Closest location to `point` on the clamped segment `start -> end`.
pub fn closest_point_on_segment(point: Point, start: Point, end: Point) -> Point {
    let seg = sub(end, start);
    let seg_len_sq = dot(seg, seg);
    if seg_len_sq < EPSILON * EPSILON {
        return start;
    }
    let t = (dot(sub(point, start), seg) / seg_len_sq).clamp(0.0, 1.0);
    lerp(start, end, t)
}

/// Euclidean distance from `point` to the clamped segment `start -> end`.
pub fn distance_to_segment(point: Point, start: Point, end: Point) -> f64 {
    distance(point, closest_point_on_segment(point, start, end))
}

/// Angle between two vectors in degrees, in `[0, 180]`.
///
/// Returns `None` when either vector is degenerate; callers must skip the
/// sample instead of reading it as "aligned".
pub fn angle_between(a: Point, b: Point) -> Option<f64> {
    let a_hat = normalize(a)?;
    let b_hat = normalize(b)?;
    let cross = a_hat.0 * b_hat.1 - a_hat.1 * b_hat.0;
    Some(cross.abs().atan2(dot(a_hat, b_hat)).to_degrees())
}

/// Total length of a polyline.
pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Index of the segment closest to `point` (lowest index wins ties).
///
/// `None` for polylines with fewer than two points.
pub fn closest_segment(points: &[Point], point: Point) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, w) in points.windows(2).enumerate() {
        let d = distance_to_segment(point, w[0], w[1]);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_segment_progress_midpoint() {
        let p = segment_progress((5.0, 3.0), (0.0, 0.0), (10.0, 0.0));
        assert!((p - 0.5).abs() < TOL);
    }

    #[test]
    fn test_segment_progress_unbounded() {
        assert!((segment_progress((15.0, 0.0), (0.0, 0.0), (10.0, 0.0)) - 1.5).abs() < TOL);
        assert!((segment_progress((-5.0, 0.0), (0.0, 0.0), (10.0, 0.0)) + 0.5).abs() < TOL);
    }

    #[test]
    fn test_segment_progress_degenerate_is_complete() {
        assert_eq!(segment_progress((3.0, 4.0), (1.0, 1.0), (1.0, 1.0)), 1.0);
    }

    #[test]
    fn test_distance_to_segment_clamps() {
        // Beyond the end: distance to the end point, not to the infinite line
        let d = distance_to_segment((13.0, 4.0), (0.0, 0.0), (10.0, 0.0));
        assert!((d - 5.0).abs() < TOL);

        let d = distance_to_segment((5.0, -2.0), (0.0, 0.0), (10.0, 0.0));
        assert!((d - 2.0).abs() < TOL);
    }

    #[test]
    fn test_distance_to_degenerate_segment() {
        let d = distance_to_segment((3.0, 4.0), (0.0, 0.0), (0.0, 0.0));
        assert!((d - 5.0).abs() < TOL);
    }

    #[test]
    fn test_angle_between_basic() {
        assert!(angle_between((1.0, 0.0), (1.0, 0.0)).unwrap().abs() < 1e-6);
        assert!((angle_between((1.0, 0.0), (0.0, 2.0)).unwrap() - 90.0).abs() < 1e-6);
        assert!((angle_between((1.0, 1.0), (-1.0, -1.0)).unwrap() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_between_precise_near_extremes() {
        let opposite = angle_between((1.0, 1.0), (-1.0, -1.0)).unwrap();
        assert!((opposite - 180.0).abs() < 1e-12);
        assert_eq!(angle_between((3.0, -7.0), (3.0, -7.0)), Some(0.0));
        // 1e-4 rad, where an arccosine of the dot product is off by percent
        let small = angle_between((1.0, 0.0), (1.0, 1e-4)).unwrap();
        assert!((small - 1e-4f64.atan().to_degrees()).abs() < 1e-12);
    }

    #[test]
    fn test_angle_between_degenerate() {
        assert!(angle_between((0.0, 0.0), (1.0, 0.0)).is_none());
        assert!(angle_between((1.0, 0.0), (0.0, 1e-9)).is_none());
    }

    #[test]
    fn test_move_towards_does_not_overshoot() {
        assert_eq!(move_towards((0.0, 0.0), (3.0, 0.0), 5.0), (3.0, 0.0));
        let p = move_towards((0.0, 0.0), (10.0, 0.0), 4.0);
        assert!((p.0 - 4.0).abs() < TOL && p.1.abs() < TOL);
    }

    #[test]
    fn test_closest_segment_prefers_first_on_tie() {
        let route = [(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)];
        // Both segments overlap exactly: lowest index wins
        assert_eq!(closest_segment(&route, (5.0, 1.0)), Some(0));
        assert_eq!(closest_segment(&route[..1], (5.0, 1.0)), None);
    }

    #[test]
    fn test_polyline_length() {
        let route = [(0.0, 0.0), (3.0, 4.0), (3.0, 4.0), (3.0, 10.0)];
        assert!((polyline_length(&route) - 11.0).abs() < TOL);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any non-degenerate vector is aligned with itself and opposed to its negation
            #[test]
            fn prop_angle_self_and_opposite(
                x in -1000.0f64..1000.0,
                y in -1000.0f64..1000.0
            ) {
                prop_assume!(length((x, y)) > 1e-3);
                let same = angle_between((x, y), (x, y)).unwrap();
                let opposite = angle_between((x, y), (-x, -y)).unwrap();
                prop_assert!(same.abs() < 1e-3);
                prop_assert!((opposite - 180.0).abs() < 1e-3);
            }

            /// Clamped distance is never larger than the distance to either endpoint
            #[test]
            fn prop_segment_distance_bounded_by_endpoints(
                px in -100.0f64..100.0, py in -100.0f64..100.0,
                ax in -100.0f64..100.0, ay in -100.0f64..100.0,
                bx in -100.0f64..100.0, by in -100.0f64..100.0
            ) {
                let d = distance_to_segment((px, py), (ax, ay), (bx, by));
                prop_assert!(d <= distance((px, py), (ax, ay)) + 1e-9);
                prop_assert!(d <= distance((px, py), (bx, by)) + 1e-9);
            }
        }
    }
}
