//! Collision geometry attached to fixtures.
//!
//! Four shape kinds are supported: solid circles, convex polygons, two-sided
//! line segments (edges) and chains of edges. Chains are the only shape with
//! more than one child; every other shape has exactly one.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::common::math::{cross, cross_vs, Transform};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::error::WorldError;

/// Mass, center of mass (shape-local) and rotational inertia about the
/// shape origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    pub i: f32,
}

/// Discriminant used to pick narrow-phase routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

// ---------------------------------------------------------------------------
// Circle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    /// Center in body-local coordinates.
    #[serde(default)]
    pub p: Vec2,
    pub radius: f32,
}

impl CircleShape {
    pub fn new(radius: f32) -> Self {
        Self { p: Vec2::ZERO, radius }
    }

    pub fn with_position(mut self, p: Vec2) -> Self {
        self.p = p;
        self
    }

    fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let center = xf.apply(self.p);
        (p - center).length_squared() <= self.radius * self.radius
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.apply(self.p);
        let s = input.p1 - position;
        let b = s.length_squared() - self.radius * self.radius;

        // Solve the quadratic for the first intersection.
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.length_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < f32::EPSILON {
            return None;
        }

        let mut a = -(c + sigma.sqrt());
        if 0.0 <= a && a <= input.max_fraction * rr {
            a /= rr;
            return Some(RayCastOutput {
                fraction: a,
                normal: (s + a * r).normalize_or_zero(),
            });
        }
        None
    }

    fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let p = xf.apply(self.p);
        let r = Vec2::splat(self.radius);
        Aabb::new(p - r, p + r)
    }

    fn compute_mass(&self, density: f32) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * std::f32::consts::PI * rr;
        MassData {
            mass,
            center: self.p,
            i: mass * (0.5 * rr + self.p.length_squared()),
        }
    }
}

// ---------------------------------------------------------------------------
// Polygon
// ---------------------------------------------------------------------------

/// Convex polygon with counter-clockwise winding and at most
/// [`MAX_POLYGON_VERTICES`] vertices. Serialized as its vertex list; the hull
/// is recomputed on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonVertices", into = "PolygonVertices")]
pub struct PolygonShape {
    pub centroid: Vec2,
    pub vertices: Vec<Vec2>,
    pub normals: Vec<Vec2>,
    pub radius: f32,
}

#[derive(Serialize, Deserialize)]
struct PolygonVertices {
    vertices: Vec<Vec2>,
}

impl TryFrom<PolygonVertices> for PolygonShape {
    type Error = WorldError;

    fn try_from(value: PolygonVertices) -> Result<Self, Self::Error> {
        PolygonShape::from_points(&value.vertices)
    }
}

impl From<PolygonShape> for PolygonVertices {
    fn from(value: PolygonShape) -> Self {
        Self {
            vertices: value.vertices,
        }
    }
}

impl PolygonShape {
    /// Axis-aligned box centered on the body origin.
    pub fn new_box(hx: f32, hy: f32) -> Self {
        let vertices = vec![
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ];
        let normals = vec![
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
        ];
        Self {
            centroid: Vec2::ZERO,
            vertices,
            normals,
            radius: POLYGON_RADIUS,
        }
    }

    /// Box with the given center and rotation in body coordinates.
    pub fn new_oriented_box(hx: f32, hy: f32, center: Vec2, angle: f32) -> Self {
        let mut shape = Self::new_box(hx, hy);
        let xf = Transform::new(center, angle);
        for v in shape.vertices.iter_mut() {
            *v = xf.apply(*v);
        }
        for n in shape.normals.iter_mut() {
            *n = xf.q.apply(*n);
        }
        shape.centroid = center;
        shape
    }

    /// Convex hull of a point cloud (gift wrapping). Points closer than half
    /// a linear slop are welded. Fails when fewer than three distinct,
    /// non-collinear points remain.
    pub fn from_points(points: &[Vec2]) -> Result<Self, WorldError> {
        let n = points.len().min(MAX_POLYGON_VERTICES);
        if n < 3 {
            return Err(WorldError::InvalidShape(format!(
                "polygon needs at least 3 points, got {}",
                points.len()
            )));
        }

        let weld_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut ps: Vec<Vec2> = Vec::with_capacity(n);
        for &v in &points[..n] {
            if ps.iter().all(|p| v.distance_squared(*p) >= weld_sq) {
                ps.push(v);
            }
        }
        if ps.len() < 3 {
            return Err(WorldError::InvalidShape("polygon points are degenerate".into()));
        }

        // Rightmost point, lowest y on ties, is on the hull.
        let mut i0 = 0;
        let mut x0 = ps[0].x;
        for (i, p) in ps.iter().enumerate().skip(1) {
            if p.x > x0 || (p.x == x0 && p.y < ps[i0].y) {
                i0 = i;
                x0 = p.x;
            }
        }

        let mut hull: Vec<usize> = Vec::with_capacity(ps.len());
        let mut ih = i0;
        loop {
            hull.push(ih);
            let last = ps[ih];
            let mut ie = 0;
            for j in 1..ps.len() {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - last;
                let v = ps[j] - last;
                let c = cross(r, v);
                if c < 0.0 {
                    ie = j;
                }
                // Collinear: keep the farthest.
                if c == 0.0 && v.length_squared() > r.length_squared() {
                    ie = j;
                }
            }
            ih = ie;
            if ie == i0 || hull.len() == ps.len() {
                break;
            }
        }

        if hull.len() < 3 {
            return Err(WorldError::InvalidShape("polygon points are collinear".into()));
        }

        let vertices: Vec<Vec2> = hull.iter().map(|&i| ps[i]).collect();
        let count = vertices.len();
        let mut normals = Vec::with_capacity(count);
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= f32::EPSILON * f32::EPSILON {
                return Err(WorldError::InvalidShape("polygon has a zero-length edge".into()));
            }
            normals.push(cross_vs(edge, 1.0).normalize_or_zero());
        }

        let centroid = compute_centroid(&vertices);
        Ok(Self {
            centroid,
            vertices,
            normals,
            radius: POLYGON_RADIUS,
        })
    }

    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let local = xf.q.apply_t(p - xf.p);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(v, n)| n.dot(local - *v) <= 0.0)
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.apply_t(input.p1 - xf.p);
        let p2 = xf.q.apply_t(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // Entering this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // Leaving this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            fraction: lower,
            normal: xf.q.apply(self.normals[i]),
        })
    }

    fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let mut lower = xf.apply(self.vertices[0]);
        let mut upper = lower;
        for v in &self.vertices[1..] {
            let w = xf.apply(*v);
            lower = lower.min(w);
            upper = upper.max(w);
        }
        Aabb::new(lower, upper).fattened(self.radius)
    }

    fn compute_mass(&self, density: f32) -> MassData {
        let count = self.vertices.len();
        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        // Triangle fan about the first vertex keeps round-off small.
        let s = self.vertices[0];
        const INV3: f32 = 1.0 / 3.0;

        for i in 0..count {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % count] - s;
            let d = cross(e1, e2);

            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += triangle_area * INV3 * (e1 + e2);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        if area > f32::EPSILON {
            center /= area;
        }
        let world_center = center + s;
        // Inertia about the centroid, then shifted to the body origin.
        let i = density * inertia
            + mass * (world_center.length_squared() - center.length_squared());

        MassData {
            mass,
            center: world_center,
            i,
        }
    }
}

fn compute_centroid(vs: &[Vec2]) -> Vec2 {
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    let p_ref = vs[0];
    const INV3: f32 = 1.0 / 3.0;

    for i in 0..vs.len() {
        let p2 = vs[i];
        let p3 = vs[(i + 1) % vs.len()];
        let d = cross(p2 - p_ref, p3 - p_ref);
        let triangle_area = 0.5 * d;
        area += triangle_area;
        c += triangle_area * INV3 * (p_ref + p2 + p3);
    }

    if area > f32::EPSILON {
        c / area
    } else {
        p_ref
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Two-sided line segment. Optional ghost vertices describe the neighbouring
/// segments so that contacts do not snag on internal seams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeShape {
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    #[serde(default)]
    pub vertex0: Option<Vec2>,
    #[serde(default)]
    pub vertex3: Option<Vec2>,
    #[serde(default = "default_polygon_radius")]
    pub radius: f32,
}

fn default_polygon_radius() -> f32 {
    POLYGON_RADIUS
}

impl EdgeShape {
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertex1: v1,
            vertex2: v2,
            vertex0: None,
            vertex3: None,
            radius: POLYGON_RADIUS,
        }
    }

    pub fn with_ghosts(mut self, v0: Option<Vec2>, v3: Option<Vec2>) -> Self {
        self.vertex0 = v0;
        self.vertex3 = v3;
        self
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.apply_t(input.p1 - xf.p);
        let p2 = xf.q.apply_t(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = Vec2::new(e.y, -e.x).normalize_or_zero();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + t * d;

        // q = v1 + s * r
        let r = v2 - v1;
        let rr = r.length_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - v1).dot(r) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let world_normal = xf.q.apply(normal);
        Some(RayCastOutput {
            fraction: t,
            normal: if numerator > 0.0 { -world_normal } else { world_normal },
        })
    }

    fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        Aabb::from_points(v1, v2).fattened(self.radius)
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Polyline of edges. Loops repeat their first vertex at the end so that
/// every child index `i` spans `vertices[i]..vertices[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainShape {
    pub vertices: Vec<Vec2>,
    #[serde(default)]
    pub prev_vertex: Option<Vec2>,
    #[serde(default)]
    pub next_vertex: Option<Vec2>,
    #[serde(default)]
    pub is_loop: bool,
    #[serde(default = "default_polygon_radius")]
    pub radius: f32,
}

impl ChainShape {
    /// Open chain through `points`.
    pub fn new_chain(points: &[Vec2]) -> Result<Self, WorldError> {
        if points.len() < 2 {
            return Err(WorldError::InvalidShape("chain needs at least 2 vertices".into()));
        }
        validate_spacing(points)?;
        Ok(Self {
            vertices: points.to_vec(),
            prev_vertex: None,
            next_vertex: None,
            is_loop: false,
            radius: POLYGON_RADIUS,
        })
    }

    /// Closed loop through `points`; the closing segment is added.
    pub fn new_loop(points: &[Vec2]) -> Result<Self, WorldError> {
        if points.len() < 3 {
            return Err(WorldError::InvalidShape("loop needs at least 3 vertices".into()));
        }
        validate_spacing(points)?;
        let mut vertices = points.to_vec();
        vertices.push(points[0]);
        let count = vertices.len();
        Ok(Self {
            prev_vertex: Some(vertices[count - 2]),
            next_vertex: Some(vertices[1]),
            vertices,
            is_loop: true,
            radius: POLYGON_RADIUS,
        })
    }

    /// Ghost vertex before the first segment of an open chain.
    pub fn with_prev_vertex(mut self, v: Vec2) -> Self {
        self.prev_vertex = Some(v);
        self
    }

    /// Ghost vertex after the last segment of an open chain.
    pub fn with_next_vertex(mut self, v: Vec2) -> Self {
        self.next_vertex = Some(v);
        self
    }

    pub fn child_count(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }

    /// Child segment `index` as an edge with ghost vertices from its
    /// neighbours.
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        let vs = &self.vertices;
        let count = vs.len();
        let vertex0 = if index > 0 {
            Some(vs[index - 1])
        } else {
            self.prev_vertex
        };
        let vertex3 = if index + 2 < count {
            Some(vs[index + 2])
        } else {
            self.next_vertex
        };
        EdgeShape {
            vertex1: vs[index],
            vertex2: vs[index + 1],
            vertex0,
            vertex3,
            radius: self.radius,
        }
    }
}

fn validate_spacing(points: &[Vec2]) -> Result<(), WorldError> {
    let min_sq = LINEAR_SLOP * LINEAR_SLOP;
    for pair in points.windows(2) {
        if pair[0].distance_squared(pair[1]) <= min_sq {
            return Err(WorldError::InvalidShape("chain vertices are too close together".into()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// Geometry owned by a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Circle(CircleShape),
    Polygon(PolygonShape),
    Edge(EdgeShape),
    Chain(ChainShape),
}

impl From<CircleShape> for Shape {
    fn from(s: CircleShape) -> Self {
        Shape::Circle(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Shape::Polygon(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Shape::Edge(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Shape::Chain(s)
    }
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius (circle radius for circles).
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(s) => s.radius,
            Shape::Polygon(s) => s.radius,
            Shape::Edge(s) => s.radius,
            Shape::Chain(s) => s.radius,
        }
    }

    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(s) => s.child_count(),
            _ => 1,
        }
    }

    /// Point containment. Edges and chains have no interior.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        match self {
            Shape::Circle(s) => s.test_point(xf, p),
            Shape::Polygon(s) => s.test_point(xf, p),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(s) => s.ray_cast(input, xf),
            Shape::Polygon(s) => s.ray_cast(input, xf),
            Shape::Edge(s) => s.ray_cast(input, xf),
            Shape::Chain(s) => s.child_edge(child_index).ray_cast(input, xf),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> Aabb {
        match self {
            Shape::Circle(s) => s.compute_aabb(xf),
            Shape::Polygon(s) => s.compute_aabb(xf),
            Shape::Edge(s) => s.compute_aabb(xf),
            Shape::Chain(s) => s.child_edge(child_index).compute_aabb(xf),
        }
    }

    /// Mass properties at the given density. Edges and chains are massless.
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle(s) => s.compute_mass(density),
            Shape::Polygon(s) => s.compute_mass(density),
            Shape::Edge(s) => MassData {
                mass: 0.0,
                center: 0.5 * (s.vertex1 + s.vertex2),
                i: 0.0,
            },
            Shape::Chain(_) => MassData::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hull_drops_interior_points() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let poly = PolygonShape::from_points(&points).expect("valid hull");
        assert_eq!(poly.count(), 4);
        assert_abs_diff_eq!(poly.centroid.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(poly.centroid.y, 1.0, epsilon = 1e-5);
        // Counter-clockwise winding: every vertex is on the inner side of
        // every other edge.
        for i in 0..poly.count() {
            for v in &poly.vertices {
                assert!(poly.normals[i].dot(*v - poly.vertices[i]) <= 1e-5);
            }
        }
    }

    #[test]
    fn hull_rejects_collinear_points() {
        let points = [Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(matches!(
            PolygonShape::from_points(&points),
            Err(WorldError::InvalidShape(_))
        ));
    }

    #[test]
    fn box_mass_matches_closed_form() {
        let poly = PolygonShape::new_box(1.0, 0.5);
        let md = Shape::from(poly).compute_mass(2.0);
        // 2 x 1 box, density 2.
        assert_abs_diff_eq!(md.mass, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(md.center.length(), 0.0, epsilon = 1e-5);
        let expected_i = md.mass * (4.0 + 1.0) / 12.0;
        assert_abs_diff_eq!(md.i, expected_i, epsilon = 1e-4);
    }

    #[test]
    fn offset_box_inertia_uses_parallel_axis() {
        let poly = PolygonShape::new_oriented_box(0.5, 0.5, Vec2::new(2.0, 0.0), 0.0);
        let md = Shape::from(poly).compute_mass(1.0);
        assert_abs_diff_eq!(md.mass, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(md.center.x, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(md.i, 1.0 / 6.0 + 4.0, epsilon = 1e-4);
    }

    #[test]
    fn circle_mass_and_point_test() {
        let circle = CircleShape::new(0.5).with_position(Vec2::new(1.0, 0.0));
        let shape = Shape::from(circle);
        let md = shape.compute_mass(1.0);
        assert_abs_diff_eq!(md.mass, std::f32::consts::PI * 0.25, epsilon = 1e-5);
        assert!(shape.test_point(&Transform::IDENTITY, Vec2::new(1.2, 0.1)));
        assert!(!shape.test_point(&Transform::IDENTITY, Vec2::new(0.0, 0.0)));
    }

    #[test]
    fn polygon_ray_cast_reports_entry_face() {
        let shape = Shape::from(PolygonShape::new_box(1.0, 1.0));
        let xf = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        let input = RayCastInput {
            p1: Vec2::ZERO,
            p2: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = shape.ray_cast(&input, &xf, 0).expect("hit");
        assert_abs_diff_eq!(hit.fraction, 0.4, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn circle_ray_cast_from_inside_misses() {
        let shape = Shape::from(CircleShape::new(1.0));
        let input = RayCastInput {
            p1: Vec2::ZERO,
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        assert!(shape.ray_cast(&input, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn edge_ray_cast_is_two_sided() {
        let shape = Shape::from(EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)));
        let down = RayCastInput {
            p1: Vec2::new(0.0, 1.0),
            p2: Vec2::new(0.0, -1.0),
            max_fraction: 1.0,
        };
        let up = RayCastInput {
            p1: Vec2::new(0.0, -1.0),
            p2: Vec2::new(0.0, 1.0),
            max_fraction: 1.0,
        };
        let hd = shape.ray_cast(&down, &Transform::IDENTITY, 0).expect("hit from above");
        let hu = shape.ray_cast(&up, &Transform::IDENTITY, 0).expect("hit from below");
        assert_abs_diff_eq!(hd.normal.y, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(hu.normal.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn loop_children_wrap_ghosts() {
        let chain = ChainShape::new_loop(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
        ])
        .expect("valid loop");
        assert_eq!(chain.child_count(), 3);
        let first = chain.child_edge(0);
        assert_eq!(first.vertex0, Some(Vec2::new(1.0, 1.0)));
        let last = chain.child_edge(2);
        assert_eq!(last.vertex2, Vec2::new(0.0, 0.0));
        assert_eq!(last.vertex3, Some(Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn shapes_load_from_json() {
        let json = r#"{ "type": "polygon", "vertices": [[0,0],[1,0],[1,1],[0,1]] }"#;
        let shape: Shape = serde_json::from_str(json).expect("parse polygon");
        assert_eq!(shape.shape_type(), ShapeType::Polygon);
        assert_abs_diff_eq!(shape.radius(), POLYGON_RADIUS, epsilon = 1e-6);

        let bad = r#"{ "type": "polygon", "vertices": [[0,0],[1,0]] }"#;
        assert!(serde_json::from_str::<Shape>(bad).is_err());
    }
}
