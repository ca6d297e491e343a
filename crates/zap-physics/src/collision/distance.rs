//! GJK closest points between convex proxies.
//!
//! The simplex from the previous query can be fed back through
//! [`SimplexCache`] so that coherent queries (contact updates, TOI iterations)
//! usually converge in one or two iterations.

use glam::Vec2;

use crate::collision::shapes::Shape;
use crate::common::math::{cross, cross_sv, cross_vs, Transform};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

const GJK_MAX_ITERATIONS: usize = 20;

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

/// Convex vertex set with a skin radius, extracted from one shape child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl DistanceProxy {
    /// Proxy for child `index` of `shape`.
    pub fn new(shape: &Shape, index: usize) -> Self {
        match shape {
            Shape::Circle(c) => Self::from_vertices(&[c.p], c.radius),
            Shape::Polygon(p) => Self::from_vertices(&p.vertices, p.radius),
            Shape::Edge(e) => Self::from_vertices(&[e.vertex1, e.vertex2], e.radius),
            Shape::Chain(c) => {
                let next = if index + 1 < c.vertices.len() { index + 1 } else { 0 };
                Self::from_vertices(&[c.vertices[index], c.vertices[next]], c.radius)
            }
        }
    }

    pub fn from_vertices(points: &[Vec2], radius: f32) -> Self {
        let count = points.len().min(MAX_POLYGON_VERTICES);
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(&points[..count]);
        Self {
            vertices,
            count,
            radius,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    /// Index of the vertex furthest along `d`.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }
}

// ---------------------------------------------------------------------------
// Cache / IO
// ---------------------------------------------------------------------------

/// Warm-start data for [`distance`]. Zero `count` means no cache.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f32,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// Move the witness points onto the rounded surfaces.
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
    /// GJK iterations used.
    pub iterations: usize,
}

// ---------------------------------------------------------------------------
// Simplex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point in proxy A, world frame.
    wa: Vec2,
    /// Support point in proxy B, world frame.
    wb: Vec2,
    /// `wb - wa`
    w: Vec2,
    /// Barycentric coordinate for the closest point.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut s = Simplex {
            count: cache.count,
            ..Default::default()
        };
        for i in 0..s.count {
            let v = &mut s.v[i];
            v.index_a = cache.index_a[i];
            v.index_b = cache.index_b[i];
            v.wa = xf_a.apply(proxy_a.vertex(v.index_a));
            v.wb = xf_b.apply(proxy_b.vertex(v.index_b));
            v.w = v.wb - v.wa;
            v.a = 0.0;
        }

        // Flush the cache if the simplex changed shape too much.
        if s.count > 1 {
            let metric1 = cache.metric;
            let metric2 = s.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                s.count = 0;
            }
        }

        if s.count == 0 {
            let v = &mut s.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.wa = xf_a.apply(proxy_a.vertex(0));
            v.wb = xf_b.apply(proxy_b.vertex(0));
            v.w = v.wb - v.wa;
            v.a = 1.0;
            s.count = 1;
        }
        s
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn closest_point(&self) -> Vec2 {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].a * self.v[0].w + self.v[1].a * self.v[1].w,
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.wa, v1.wb),
            2 => (
                v1.a * v1.wa + v2.a * v2.wa,
                v1.a * v1.wb + v2.a * v2.wb,
            ),
            3 => {
                let p = v1.a * v1.wa + v2.a * v2.wa + v3.a * v3.wa;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on segment `w1 w2` to the origin, via barycentric
    /// coordinates. Reduces to a vertex when the origin lies in a vertex
    /// region.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region.
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest feature of triangle `w1 w2 w3` to the origin. Vertex regions
    /// first, then edge regions, then the interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        // Edge12
        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        // Edge13
        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        // Edge23
        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }

    fn solve(&mut self) {
        match self.count {
            2 => self.solve2(),
            3 => self.solve3(),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Closest points between two proxies. `cache` is read for warm starting and
/// updated with the final simplex.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = input.transform_a;
    let xf_b = input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, &xf_a, proxy_b, &xf_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < GJK_MAX_ITERATIONS {
        // Remember the simplex so duplicate supports can be detected.
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        simplex.solve();

        // Origin is inside the triangle: overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // Origin is probably contained by a segment or triangle.
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            break;
        }

        let index_a = proxy_a.support(xf_a.q.apply_t(-d));
        let index_b = proxy_b.support(xf_b.q.apply_t(d));
        let vertex = &mut simplex.v[simplex.count];
        vertex.index_a = index_a;
        vertex.wa = xf_a.apply(proxy_a.vertex(index_a));
        vertex.index_b = index_b;
        vertex.wb = xf_b.apply(proxy_b.vertex(index_b));
        vertex.w = vertex.wb - vertex.wa;

        iter += 1;

        // A repeated support point means no further progress.
        let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;

        if dist > r_a + r_b && dist > f32::EPSILON {
            // Shapes are still separated: move witnesses to the surfaces.
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize_or_zero();
            point_a += r_a * normal;
            point_b -= r_b * normal;
        } else {
            // Overlapping: use the midpoint.
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

/// Overlap test for two shape children, including skin radii.
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, index_a),
        proxy_b: DistanceProxy::new(shape_b, index_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < 10.0 * f32::EPSILON
}

// ---------------------------------------------------------------------------
// Shape cast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ShapeCastInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// Translation applied to B over the cast.
    pub translation_b: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCastOutput {
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction of `translation_b` at first contact.
    pub lambda: f32,
    pub iterations: usize,
}

/// Sweep proxy B along `translation_b` against A (GJK raycast). Returns
/// `None` when the shapes never touch or already overlap.
pub fn shape_cast(input: &ShapeCastInput) -> Option<ShapeCastOutput> {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let radius_a = proxy_a.radius.max(POLYGON_RADIUS);
    let radius_b = proxy_b.radius.max(POLYGON_RADIUS);
    let radius = radius_a + radius_b;

    let xf_a = input.transform_a;
    let xf_b = input.transform_b;

    let r = input.translation_b;
    let mut n = Vec2::ZERO;
    let mut lambda = 0.0;

    let mut simplex = Simplex::default();

    // Initial Minkowski-difference vector.
    let index_a = proxy_a.support(xf_a.q.apply_t(-r));
    let wa = xf_a.apply(proxy_a.vertex(index_a));
    let index_b = proxy_b.support(xf_b.q.apply_t(r));
    let wb = xf_b.apply(proxy_b.vertex(index_b));
    let mut v = wa - wb;

    // Target distance to the surface.
    let sigma = POLYGON_RADIUS.max(radius - POLYGON_RADIUS);
    let tolerance = 0.5 * LINEAR_SLOP;

    let mut iter = 0;
    while iter < GJK_MAX_ITERATIONS && v.length() - sigma > tolerance {
        let index_a = proxy_a.support(xf_a.q.apply_t(-v));
        let wa = xf_a.apply(proxy_a.vertex(index_a));
        let index_b = proxy_b.support(xf_b.q.apply_t(v));
        let wb = xf_b.apply(proxy_b.vertex(index_b));
        let p = wa - wb;

        v = v.normalize_or_zero();

        // Intersect the ray with the plane.
        let vp = v.dot(p);
        let vr = v.dot(r);
        if vp - sigma > lambda * vr {
            if vr <= 0.0 {
                return None;
            }
            lambda = (vp - sigma) / vr;
            if lambda > 1.0 {
                return None;
            }
            n = -v;
            simplex.count = 0;
        }

        // The simplex works on B - A, so the vertex roles are reversed.
        let vertex = &mut simplex.v[simplex.count];
        vertex.index_a = index_b;
        vertex.wa = wb + lambda * r;
        vertex.index_b = index_a;
        vertex.wb = wa;
        vertex.w = vertex.wb - vertex.wa;
        vertex.a = 1.0;
        simplex.count += 1;

        simplex.solve();

        // Overlap.
        if simplex.count == 3 {
            return None;
        }

        v = simplex.closest_point();
        iter += 1;
    }

    let (_point_b, point_a) = simplex.witness_points();
    if v.length_squared() > 0.0 {
        n = (-v).normalize_or_zero();
    }

    Some(ShapeCastOutput {
        point: point_a + radius_a * n,
        normal: n,
        lambda,
        iterations: iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape};
    use approx::assert_abs_diff_eq;

    fn box_proxy() -> DistanceProxy {
        DistanceProxy::new(&Shape::from(PolygonShape::new_box(1.0, 1.0)), 0)
    }

    #[test]
    fn separated_boxes_distance() {
        let input = DistanceInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(5.0, 0.5), 0.0),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input);
        assert_abs_diff_eq!(out.distance, 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.point_a.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.point_b.x, 4.0, epsilon = 1e-5);
        assert!(cache.count > 0);
    }

    #[test]
    fn use_radii_moves_witnesses_to_surface() {
        let circle = Shape::from(CircleShape::new(0.5));
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(&circle, 0),
            proxy_b: DistanceProxy::new(&circle, 0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(3.0, 0.0), 0.0),
            use_radii: true,
        };
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input);
        assert_abs_diff_eq!(out.distance, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.point_a.x, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(out.point_b.x, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn overlapping_boxes_report_zero() {
        let input = DistanceInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(0.5, 0.25), 0.3),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input);
        assert!(out.distance < 1e-4, "distance {}", out.distance);
    }

    #[test]
    fn warm_cache_converges_immediately() {
        let mut input = DistanceInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(4.0, 3.0), 0.2),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let cold = distance(&mut cache, &input);

        input.transform_b.p += Vec2::new(0.01, 0.0);
        let warm = distance(&mut cache, &input);
        assert!(warm.iterations <= cold.iterations);
        assert!(warm.distance > cold.distance);
    }

    #[test]
    fn overlap_test_includes_skin() {
        let poly = Shape::from(PolygonShape::new_box(0.5, 0.5));
        let xf_b = Transform::new(Vec2::new(1.015, 0.0), 0.0);
        // Gap of 0.015 is inside the combined skin of 0.02.
        assert!(test_overlap(&poly, 0, &poly, 0, &Transform::IDENTITY, &xf_b));
        let far = Transform::new(Vec2::new(1.1, 0.0), 0.0);
        assert!(!test_overlap(&poly, 0, &poly, 0, &Transform::IDENTITY, &far));
    }

    #[test]
    fn shape_cast_finds_time_of_contact() {
        let input = ShapeCastInput {
            proxy_a: box_proxy(),
            proxy_b: DistanceProxy::new(&Shape::from(CircleShape::new(0.5)), 0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(-5.0, 0.0), 0.0),
            translation_b: Vec2::new(10.0, 0.0),
        };
        let out = shape_cast(&input).expect("cast hits");
        // Contact when the circle center reaches x = -1.5, within tolerance.
        assert_abs_diff_eq!(out.lambda, 0.35, epsilon = 0.01);
        assert_abs_diff_eq!(out.normal.x, -1.0, epsilon = 1e-3);
    }

    #[test]
    fn shape_cast_misses_when_moving_away() {
        let input = ShapeCastInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(5.0, 0.0), 0.0),
            translation_b: Vec2::new(3.0, 0.0),
        };
        assert!(shape_cast(&input).is_none());
    }
}
