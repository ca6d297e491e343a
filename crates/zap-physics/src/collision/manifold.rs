//! Contact manifolds and the narrow-phase routines that build them.
//!
//! Manifold points are stored in the local frame of one of the shapes so they
//! stay valid while the bodies move during position correction.

use glam::Vec2;

use crate::collision::shapes::{CircleShape, EdgeShape, PolygonShape};
use crate::common::math::{cross_vs, Transform};
use crate::common::settings::{LINEAR_SLOP, MAX_MANIFOLD_POINTS};

// ---------------------------------------------------------------------------
// Feature ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Identifies which vertex/face pair produced a contact point. Used to carry
/// accumulated impulses from one step to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactFeature {
    /// Packed key; two points match when their keys are equal.
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

// ---------------------------------------------------------------------------
// Manifold
// ---------------------------------------------------------------------------

/// One contact point. `local_point` depends on the manifold type:
/// circles use the center of circle B, face A uses the clip point on B, face
/// B uses the clip point on A.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    pub local_point: Vec2,
    /// Accumulated non-penetration impulse.
    pub normal_impulse: f32,
    /// Accumulated friction impulse.
    pub tangent_impulse: f32,
    pub id: ContactFeature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Up to two contact points sharing a normal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Unused for `Circles`.
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub kind: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }
}

/// Manifold expressed in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Points from A to B.
    pub normal: Vec2,
    /// Midpoints between the two surfaces.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping.
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut wm = WorldManifold::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                wm.normal = Vec2::X;
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    wm.normal = (point_b - point_a).normalize_or_zero();
                }
                let c_a = point_a + radius_a * wm.normal;
                let c_b = point_b - radius_b * wm.normal;
                wm.points[0] = 0.5 * (c_a + c_b);
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldType::FaceA => {
                wm.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(wm.normal)) * wm.normal;
                    let c_b = clip_point - radius_b * wm.normal;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_a - c_b).dot(normal);
                }
                // Keep the normal pointing from A to B.
                wm.normal = -normal;
            }
        }
        wm
    }
}

/// How a manifold point changed between two updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    #[default]
    Null,
    Add,
    Persist,
    Remove,
}

/// Compare two manifolds by feature key. The first array describes the old
/// points (persist or remove), the second the new points (add or persist).
pub fn point_states(
    old: &Manifold,
    new: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p) in old.points().iter().enumerate() {
        let key = p.id.key();
        state1[i] = if new.points().iter().any(|q| q.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    for (i, p) in new.points().iter().enumerate() {
        let key = p.id.key();
        state2[i] = if old.points().iter().any(|q| q.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state1, state2)
}

// ---------------------------------------------------------------------------
// Clipping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ClipVertex {
    pub v: Vec2,
    pub id: ContactFeature,
}

/// Sutherland-Hodgman clipping of a segment against the half-plane
/// `dot(normal, p) <= offset`. Returns the number of output points.
pub(crate) fn clip_segment_to_line(
    v_out: &mut [ClipVertex; 2],
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: u8,
) -> usize {
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // Points on opposite sides: add the intersection.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + interp * (v_in[1].v - v_in[0].v),
            id: ContactFeature {
                index_a: vertex_index_a,
                index_b: v_in[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
    }

    count
}

// ---------------------------------------------------------------------------
// Narrow phase
// ---------------------------------------------------------------------------

pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.p);
    let p_b = xf_b.apply(circle_b.p);
    let radius = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.p;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactFeature::default();
    manifold
}

pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon frame.
    let c = xf_b.apply(circle_b.p);
    let c_local = xf_a.apply_t(c);

    let radius = polygon_a.radius + circle_b.radius;
    let count = polygon_a.count();
    let vertices = &polygon_a.vertices;
    let normals = &polygon_a.normals;

    // Find the minimum separating edge.
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    manifold.kind = ManifoldType::FaceA;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactFeature::default();

    // Center inside the polygon.
    if separation < f32::EPSILON {
        manifold.point_count = 1;
        manifold.local_normal = normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        return manifold;
    }

    // Voronoi regions of the reference face.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return manifold;
        }
        manifold.point_count = 1;
        manifold.local_normal = (c_local - v1).normalize_or_zero();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return manifold;
        }
        manifold.point_count = 1;
        manifold.local_normal = (c_local - v2).normalize_or_zero();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return manifold;
        }
        manifold.point_count = 1;
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold
}

/// Max separation of `poly2` along the edge normals of `poly1`.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    let xf = xf2.mul_t(xf1);

    let mut best_index = 0;
    let mut max_separation = -f32::MAX;
    for (i, (n1, v1)) in poly1.normals.iter().zip(&poly1.vertices).enumerate() {
        // Poly1 normal and vertex in the poly2 frame.
        let n = xf.q.apply(*n1);
        let v1 = xf.apply(*v1);

        let si = poly2
            .vertices
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in the incident frame.
    let normal1 = xf2.q.apply_t(xf1.q.apply(poly1.normals[edge1]));

    // Incident edge is the most anti-parallel one.
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n2) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < poly2.count() { i1 + 1 } else { 0 };

    let feature = |i: usize| ContactFeature {
        index_a: edge1 as u8,
        index_b: i as u8,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };

    [
        ClipVertex {
            v: xf2.apply(poly2.vertices[i1]),
            id: feature(i1),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertices[i2]),
            id: feature(i2),
        },
    ]
}

/// Polygon-polygon contact via the separating axis test and reference-face
/// clipping. The reference face comes from the polygon with the larger
/// separation; A is preferred within a small tolerance to avoid flip-flop.
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    const K_TOL: f32 = 0.1 * LINEAR_SLOP;

    let (poly1, poly2, xf1, xf2, edge1, flip) = if separation_b > separation_a + K_TOL {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, poly_a, xf_b, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, poly_b, xf_a, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.count();
    let iv1 = edge1;
    let iv2 = if edge1 + 1 < count1 { edge1 + 1 } else { 0 };

    let mut v11 = poly1.vertices[iv1];
    let mut v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalize_or_zero();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polygon skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let mut clip_points1 = [ClipVertex::default(); 2];
    let np = clip_segment_to_line(
        &mut clip_points1,
        &incident_edge,
        -tangent,
        side_offset1,
        iv1 as u8,
    );
    if np < 2 {
        return manifold;
    }

    let mut clip_points2 = [ClipVertex::default(); 2];
    let np = clip_segment_to_line(
        &mut clip_points2,
        &clip_points1,
        tangent,
        side_offset2,
        iv2 as u8,
    );
    if np < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in &clip_points2 {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_t(clip.v);
            cp.id = if flip { clip.id.swapped() } else { clip.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

/// Edge-circle contact. Ghost vertices cull hits in the neighbouring
/// segment's Voronoi region so a circle rolling along a chain does not catch
/// on interior vertices.
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the edge frame.
    let q = xf_a.apply_t(xf_b.apply(circle_b.p));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let mut cf = ContactFeature {
        index_b: 0,
        type_b: FeatureType::Vertex,
        ..Default::default()
    };

    let vertex_region = |manifold: &mut Manifold, p: Vec2, cf: ContactFeature| {
        manifold.point_count = 1;
        manifold.kind = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.points[0].id = cf;
        manifold.points[0].local_point = circle_b.p;
    };

    // Region A
    if v <= 0.0 {
        let p = a;
        if q.distance_squared(p) > radius * radius {
            return manifold;
        }
        // Is the circle in region AB of the previous edge?
        if let Some(a1) = edge_a.vertex0 {
            let b1 = a;
            let e1 = b1 - a1;
            if e1.dot(b1 - q) > 0.0 {
                return manifold;
            }
        }
        cf.index_a = 0;
        cf.type_a = FeatureType::Vertex;
        vertex_region(&mut manifold, p, cf);
        return manifold;
    }

    // Region B
    if u <= 0.0 {
        let p = b;
        if q.distance_squared(p) > radius * radius {
            return manifold;
        }
        // Is the circle in region AB of the next edge?
        if let Some(b2) = edge_a.vertex3 {
            let a2 = b;
            let e2 = b2 - a2;
            if e2.dot(q - a2) > 0.0 {
                return manifold;
            }
        }
        cf.index_a = 1;
        cf.type_a = FeatureType::Vertex;
        vertex_region(&mut manifold, p, cf);
        return manifold;
    }

    // Region AB
    let den = e.length_squared();
    if den <= 0.0 {
        return manifold;
    }
    let p = (1.0 / den) * (u * a + v * b);
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    cf.index_a = 0;
    cf.type_a = FeatureType::Face;
    manifold.point_count = 1;
    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n.normalize_or_zero();
    manifold.local_point = a;
    manifold.points[0].id = cf;
    manifold.points[0].local_point = circle_b.p;
    manifold
}

/// Edge-polygon contact. The edge is treated as a two-sided, two-vertex
/// polygon with the edge's skin radius.
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let edge_polygon = edge_as_polygon(edge_a);
    collide_polygons(&edge_polygon, xf_a, polygon_b, xf_b)
}

pub(crate) fn edge_as_polygon(edge: &EdgeShape) -> PolygonShape {
    let n = cross_vs(edge.vertex2 - edge.vertex1, 1.0).normalize_or_zero();
    PolygonShape {
        centroid: 0.5 * (edge.vertex1 + edge.vertex2),
        vertices: vec![edge.vertex1, edge.vertex2],
        normals: vec![n, -n],
        radius: edge.radius,
    }
}
