//! Continuous collision: time of impact between two swept proxies by
//! conservative advancement.
//!
//! Each outer iteration computes the closest features at the current time,
//! builds a separating axis from them and root-finds the time at which the
//! separation along that axis reaches the target. Bodies are then advanced
//! and the process repeats until the proxies touch within tolerance.

use glam::Vec2;

use crate::collision::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::common::math::{cross_vs, Sweep};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

const TOI_MAX_ITERATIONS: u32 = 20;
const TOI_MAX_ROOT_ITERATIONS: u32 = 50;

/// Query for [`time_of_impact`]. Sweeps are relative to the same time
/// interval; `t_max` bounds the search within `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    pub t_max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToiState {
    #[default]
    Unknown,
    /// Conservative advancement did not converge; `t` is the best estimate.
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
}

/// Call and iteration counters for TOI and its GJK queries. Owned by the
/// caller and accumulated across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToiMetrics {
    pub calls: u32,
    pub iters: u32,
    pub max_iters: u32,
    pub root_iters: u32,
    pub max_root_iters: u32,
    pub gjk_calls: u32,
    pub gjk_iters: u32,
    pub gjk_max_iters: u32,
}

impl ToiMetrics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Separation function
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// Separation of two swept proxies along an axis derived from the GJK
/// simplex, as a function of time.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    /// Build the axis from the cached simplex at time `t1`. Returns the
    /// function and the separation at `t1`.
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> (Self, f32) {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = SeparationFunction {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            let axis = point_b - point_a;
            let s = axis.length();
            f.axis = axis.normalize_or_zero();
            return (f, s);
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationKind::FaceB;
            let local_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_b2 = proxy_b.vertex(cache.index_b[1]);

            f.axis = cross_vs(local_b2 - local_b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.apply(f.axis);

            f.local_point = 0.5 * (local_b1 + local_b2);
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));

            let mut s = (point_a - point_b).dot(normal);
            if s < 0.0 {
                f.axis = -f.axis;
                s = -s;
            }
            (f, s)
        } else {
            // Two points on A and one or two points on B.
            f.kind = SeparationKind::FaceA;
            let local_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_a2 = proxy_a.vertex(cache.index_a[1]);

            f.axis = cross_vs(local_a2 - local_a1, 1.0).normalize_or_zero();
            let normal = xf_a.q.apply(f.axis);

            f.local_point = 0.5 * (local_a1 + local_a2);
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));

            let mut s = (point_b - point_a).dot(normal);
            if s < 0.0 {
                f.axis = -f.axis;
                s = -s;
            }
            (f, s)
        }
    }

    /// Deepest points along the axis at time `t`.
    fn find_min_separation(&self, t: f32) -> (usize, usize, f32) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.q.apply_t(self.axis);
                let axis_b = xf_b.q.apply_t(-self.axis);

                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);

                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));

                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);

                let axis_b = xf_b.q.apply_t(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));

                (0, index_b, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);

                let axis_a = xf_a.q.apply_t(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));

                (index_a, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given feature pair at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Time of impact
// ---------------------------------------------------------------------------

/// Earliest time in `[0, t_max]` at which the proxies come within the
/// target separation `max(linear_slop, r_a + r_b - 3 * linear_slop)`.
///
/// Rotation is handled, but fast spinning can make the root finder miss;
/// the result then reports [`ToiState::Failed`] with the best time so far.
pub fn time_of_impact(input: &ToiInput, metrics: &mut ToiMetrics) -> ToiOutput {
    metrics.calls += 1;

    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations can make the root finder fail, so normalize the
    // sweep angles.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut iter = 0;

    // Prepare input for the distance query.
    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: input.proxy_a,
        proxy_b: input.proxy_b,
        transform_a: sweep_a.transform_at(0.0),
        transform_b: sweep_b.transform_at(0.0),
        use_radii: false,
    };

    // The outer loop progressively attempts to compute new separating axes.
    // It terminates when an axis is repeated (no progress is made).
    loop {
        distance_input.transform_a = sweep_a.transform_at(t1);
        distance_input.transform_b = sweep_b.transform_at(t1);

        // Closest features at t1. Radii are accounted for by the target.
        let distance_output = distance(&mut cache, &distance_input);
        metrics.gjk_calls += 1;
        metrics.gjk_iters += distance_output.iterations as u32;
        metrics.gjk_max_iters = metrics.gjk_max_iters.max(distance_output.iterations as u32);

        // Initially overlapping: no time of impact.
        if distance_output.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let (fcn, _) = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point along the axis. Each push-back advances
        // t2 toward t1; at most one per polygon vertex is needed.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (index_a, index_b, mut s2) = fcn.find_min_separation(t2);

            // Final configuration still separated: done.
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Separation within tolerance at t2: advance the sweeps.
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // Root bracketing failed; should be rare.
            if s1 < target - tolerance {
                log::warn!("toi: initial separation {} below target {}", s1, target);
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            // Already touching along this axis at t1.
            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target = 0, alternating bisection and the
            // secant rule.
            let mut root_iter_count = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iter_count & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iter_count += 1;
                metrics.root_iters += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                // Keep the root bracketed.
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter_count == TOI_MAX_ROOT_ITERATIONS {
                    break;
                }
            }
            metrics.max_root_iters = metrics.max_root_iters.max(root_iter_count);

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;
        metrics.iters += 1;

        if done {
            break;
        }

        if iter == TOI_MAX_ITERATIONS {
            log::warn!("toi: root finder did not converge after {} iterations", iter);
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    metrics.max_iters = metrics.max_iters.max(iter);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape, Shape};
    use crate::common::settings::POLYGON_RADIUS;
    use approx::assert_abs_diff_eq;

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn head_on_circles_touch_at_expected_time() {
        let circle = Shape::from(CircleShape::new(0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&circle, 0),
            proxy_b: DistanceProxy::new(&circle, 0),
            sweep_a: linear_sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)),
            sweep_b: linear_sweep(Vec2::new(10.0, 0.0), Vec2::new(-10.0, 0.0)),
            t_max: 1.0,
        };
        let mut metrics = ToiMetrics::default();
        let out = time_of_impact(&input, &mut metrics);
        assert_eq!(out.state, ToiState::Touching);

        // Centers at distance 1 - 3 * slop when the relative motion of 40
        // units has covered 19 + 3 * slop.
        let target = 1.0 - 3.0 * LINEAR_SLOP;
        let expected = (20.0 - target) / 40.0;
        assert!(
            (out.t - expected).abs() * 40.0 < 0.25 * LINEAR_SLOP + 1e-4,
            "t = {}, expected {}",
            out.t,
            expected
        );
        assert_eq!(metrics.calls, 1);
        assert!(metrics.iters >= 1);
    }

    #[test]
    fn diverging_bodies_are_separated() {
        let poly = Shape::from(PolygonShape::new_box(0.5, 0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&poly, 0),
            proxy_b: DistanceProxy::new(&poly, 0),
            sweep_a: linear_sweep(Vec2::new(0.0, 0.0), Vec2::new(-1.0, 0.0)),
            sweep_b: linear_sweep(Vec2::new(2.0, 0.0), Vec2::new(3.0, 0.0)),
            t_max: 1.0,
        };
        let mut metrics = ToiMetrics::default();
        let out = time_of_impact(&input, &mut metrics);
        assert_eq!(out.state, ToiState::Separated);
        assert_abs_diff_eq!(out.t, 1.0);
    }

    #[test]
    fn initially_overlapping_reports_overlap() {
        let poly = Shape::from(PolygonShape::new_box(0.5, 0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&poly, 0),
            proxy_b: DistanceProxy::new(&poly, 0),
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: linear_sweep(Vec2::new(0.5, 0.0), Vec2::new(1.0, 0.0)),
            t_max: 1.0,
        };
        let mut metrics = ToiMetrics::default();
        let out = time_of_impact(&input, &mut metrics);
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn fast_box_stops_at_skin_distance() {
        let poly = Shape::from(PolygonShape::new_box(0.5, 0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&poly, 0),
            proxy_b: DistanceProxy::new(&poly, 0),
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: linear_sweep(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0)),
            t_max: 1.0,
        };
        let mut metrics = ToiMetrics::default();
        let out = time_of_impact(&input, &mut metrics);
        assert_eq!(out.state, ToiState::Touching);

        // Gap between faces at t should equal the target separation.
        let target = LINEAR_SLOP.max(2.0 * POLYGON_RADIUS - 3.0 * LINEAR_SLOP);
        let y = 10.0 - 20.0 * out.t;
        let gap = y - 1.0;
        assert!((gap - target).abs() < 0.25 * LINEAR_SLOP + 1e-4, "gap {}", gap);
    }

    #[test]
    fn rotating_sweep_is_handled() {
        let poly = Shape::from(PolygonShape::new_box(2.0, 0.1));
        let circle = Shape::from(CircleShape::new(0.1));
        let mut sweep_a = linear_sweep(Vec2::ZERO, Vec2::ZERO);
        sweep_a.a = std::f32::consts::FRAC_PI_2;
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&poly, 0),
            proxy_b: DistanceProxy::new(&circle, 0),
            sweep_a,
            sweep_b: linear_sweep(Vec2::new(0.0, 1.5), Vec2::new(0.0, 1.5)),
            t_max: 1.0,
        };
        let mut metrics = ToiMetrics::default();
        let out = time_of_impact(&input, &mut metrics);
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.t > 0.0 && out.t < 1.0, "t = {}", out.t);
    }
}
