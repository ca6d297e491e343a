//! Sequential-impulse contact constraints: a velocity pass with friction and
//! restitution, and a non-linear Gauss-Seidel position pass.

use glam::{Mat2, Vec2};

use crate::collision::manifold::{ManifoldType, WorldManifold};
use crate::common::math::{cross, cross_sv, cross_vs, Mat22Ext, Rot, Transform};
use crate::common::settings::{
    BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};
use crate::dynamics::time_step::{Position, TimeStep, Velocity};
use crate::dynamics::world_callbacks::ContactImpulse;
use crate::dynamics::{BodyMap, ContactHandle, ContactMap, FixtureMap};

/// Upper bound on the condition number of the two-point block matrix.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat2,
    k: Mat2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
    pub(crate) contact: ContactHandle,
}

#[derive(Debug, Clone)]
struct ContactPositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    kind: ManifoldType,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

impl ContactPositionConstraint {
    /// World normal, contact point and separation for point `index`.
    fn evaluate(&self, xf_a: &Transform, xf_b: &Transform, index: usize) -> (Vec2, Vec2, f32) {
        debug_assert!(self.point_count > 0);
        match self.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.local_points[0]);
                let normal = (point_b - point_a).normalize_or_zero();
                let point = 0.5 * (point_a + point_b);
                let separation = (point_b - point_a).dot(normal) - self.radius_a - self.radius_b;
                (normal, point, separation)
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.apply(self.local_normal);
                let plane_point = xf_a.apply(self.local_point);
                let clip_point = xf_b.apply(self.local_points[index]);
                let separation = (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                (normal, clip_point, separation)
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(self.local_normal);
                let plane_point = xf_b.apply(self.local_point);
                let clip_point = xf_a.apply(self.local_points[index]);
                let separation = (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                // Keep the normal pointing from A to B.
                (-normal, clip_point, separation)
            }
        }
    }
}

fn body_transform(c: Vec2, a: f32, local_center: Vec2) -> Transform {
    let q = Rot::new(a);
    Transform {
        p: c - q.apply(local_center),
        q,
    }
}

pub(crate) struct ContactSolver {
    pub(crate) velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

impl ContactSolver {
    /// Capture the position-independent data of each contact. Bodies must
    /// already carry their island index.
    pub(crate) fn new(
        step: TimeStep,
        contacts: &[ContactHandle],
        contact_map: &ContactMap,
        fixtures: &FixtureMap,
        bodies: &BodyMap,
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(contacts.len());
        let mut position_constraints = Vec::with_capacity(contacts.len());

        for &handle in contacts {
            let Some(contact) = contact_map.get(handle) else {
                continue;
            };
            let (Some(fa), Some(fb)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b)) else {
                continue;
            };
            let (Some(ba), Some(bb)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                continue;
            };

            let manifold = &contact.manifold;
            let point_count = manifold.point_count;
            debug_assert!(point_count > 0);

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat2::ZERO,
                k: Mat2::ZERO,
                index_a: ba.island_index,
                index_b: bb.island_index,
                inv_mass_a: ba.inv_mass,
                inv_mass_b: bb.inv_mass,
                inv_i_a: ba.inv_inertia,
                inv_i_b: bb.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                point_count,
                contact: handle,
            };

            let mut pc = ContactPositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: ba.island_index,
                index_b: bb.island_index,
                inv_mass_a: ba.inv_mass,
                inv_mass_b: bb.inv_mass,
                local_center_a: ba.sweep.local_center,
                local_center_b: bb.sweep.local_center,
                inv_i_a: ba.inv_inertia,
                inv_i_b: bb.inv_inertia,
                kind: manifold.kind,
                radius_a: fa.shape().radius(),
                radius_b: fb.shape().radius(),
                point_count,
            };

            for (j, cp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * cp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * cp.tangent_impulse;
                }
                pc.local_points[j] = cp.local_point;
            }

            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        Self {
            velocity_constraints,
            position_constraints,
        }
    }

    /// Build Jacobians, effective masses and restitution bias from the
    /// current positions and velocities.
    pub(crate) fn initialize_velocity_constraints(
        &mut self,
        contact_map: &ContactMap,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for (vc, pc) in self.velocity_constraints.iter_mut().zip(&self.position_constraints) {
            let Some(contact) = contact_map.get(vc.contact) else {
                continue;
            };

            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let c_a = positions[vc.index_a].c;
            let a_a = positions[vc.index_a].a;
            let v_a = velocities[vc.index_a].v;
            let w_a = velocities[vc.index_a].w;

            let c_b = positions[vc.index_b].c;
            let a_b = positions[vc.index_b].a;
            let v_b = velocities[vc.index_b].v;
            let w_b = velocities[vc.index_b].w;

            let xf_a = body_transform(c_a, a_a, pc.local_center_a);
            let xf_b = body_transform(c_b, a_b, pc.local_center_b);

            let world_manifold =
                WorldManifold::new(&contact.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);

            vc.normal = world_manifold.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];

                vcp.r_a = world_manifold.points[j] - c_a;
                vcp.r_b = world_manifold.points[j] - c_b;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias from the approach speed.
                vcp.velocity_bias = 0.0;
                let v_rel = vc
                    .normal
                    .dot(v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a));
                if v_rel < -VELOCITY_THRESHOLD {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Two points: try the block solver.
            if vc.point_count == 2 {
                let vcp1 = vc.points[0];
                let vcp2 = vc.points[1];

                let rn1_a = cross(vcp1.r_a, vc.normal);
                let rn1_b = cross(vcp1.r_b, vc.normal);
                let rn2_a = cross(vcp2.r_a, vc.normal);
                let rn2_b = cross(vcp2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse_or_zero();
                } else {
                    // Redundant points; keep the deepest-first one.
                    vc.point_count = 1;
                }
            }
        }
    }

    pub(crate) fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let mut v_a = velocities[vc.index_a].v;
            let mut w_a = velocities[vc.index_a].w;
            let mut v_b = velocities[vc.index_b].v;
            let mut w_b = velocities[vc.index_b].w;

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = vcp.normal_impulse * normal + vcp.tangent_impulse * tangent;
                w_a -= i_a * cross(vcp.r_a, p);
                v_a -= m_a * p;
                w_b += i_b * cross(vcp.r_b, p);
                v_b += m_b * p;
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);
            let point_count = vc.point_count;

            let mut v_a = velocities[vc.index_a].v;
            let mut w_a = velocities[vc.index_a].w;
            let mut v_b = velocities[vc.index_b].v;
            let mut w_b = velocities[vc.index_b].w;

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);
            let friction = vc.friction;

            debug_assert!(point_count == 1 || point_count == 2);

            // Friction first: non-penetration matters more.
            for vcp in &mut vc.points[..point_count] {
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);

                let vt = dv.dot(tangent) - vc.tangent_speed;
                let mut lambda = vcp.tangent_mass * (-vt);

                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                v_a -= m_a * p;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(vcp.r_b, p);
            }

            if point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);

                let vn = dv.dot(normal);
                let mut lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = lambda * normal;
                v_a -= m_a * p;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(vcp.r_b, p);
            } else {
                // Block solver: total enumeration of the 2D LCP
                //   vn = A * x + b, vn >= 0, x >= 0, vn_i * x_i = 0
                // solved incrementally against the accumulated impulse `a`.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);

                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);

                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let mut b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
                b -= vc.k * a;

                let k12 = vc.k.x_axis.y;
                let x = 'solve: {
                    // Case 1: both points active.
                    let x = -(vc.normal_mass * b);
                    if x.x >= 0.0 && x.y >= 0.0 {
                        break 'solve Some(x);
                    }

                    // Case 2: only the first point active.
                    let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
                    let vn2 = k12 * x.x + b.y;
                    if x.x >= 0.0 && vn2 >= 0.0 {
                        break 'solve Some(x);
                    }

                    // Case 3: only the second point active.
                    let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
                    let vn1 = k12 * x.y + b.x;
                    if x.y >= 0.0 && vn1 >= 0.0 {
                        break 'solve Some(x);
                    }

                    // Case 4: both separating.
                    if b.x >= 0.0 && b.y >= 0.0 {
                        break 'solve Some(Vec2::ZERO);
                    }

                    // No solution; leave the impulses alone.
                    None
                };

                if let Some(x) = x {
                    let d = x - a;
                    let p1 = d.x * normal;
                    let p2 = d.y * normal;
                    v_a -= m_a * (p1 + p2);
                    w_a -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += m_b * (p1 + p2);
                    w_b += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));

                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Copy accumulated impulses back to the manifolds for next step's warm
    /// start.
    pub(crate) fn store_impulses(&self, contact_map: &mut ContactMap) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contact_map.get_mut(vc.contact) else {
                continue;
            };
            for (mp, vcp) in contact.manifold.points_mut().iter_mut().zip(&vc.points[..vc.point_count]) {
                mp.normal_impulse = vcp.normal_impulse;
                mp.tangent_impulse = vcp.tangent_impulse;
            }
        }
    }

    /// Impulses of constraint `index`, for post-solve reporting.
    pub(crate) fn impulse(&self, index: usize) -> ContactImpulse {
        let vc = &self.velocity_constraints[index];
        let mut impulse = ContactImpulse {
            count: vc.point_count,
            ..Default::default()
        };
        for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
            impulse.normal_impulses[j] = vcp.normal_impulse;
            impulse.tangent_impulses[j] = vcp.tangent_impulse;
        }
        impulse
    }

    /// One NGS pass. Returns true when the deepest penetration is within
    /// three slops.
    pub(crate) fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let mut min_separation: f32 = 0.0;

        for pc in &self.position_constraints {
            let sep = solve_position_constraint(
                pc,
                positions,
                (pc.inv_mass_a, pc.inv_i_a),
                (pc.inv_mass_b, pc.inv_i_b),
                BAUMGARTE,
            );
            min_separation = min_separation.min(sep);
        }

        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position pass for a TOI sub-step: only the two TOI bodies move.
    pub(crate) fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let mut min_separation: f32 = 0.0;

        for pc in &self.position_constraints {
            let moves = |index: usize| index == toi_index_a || index == toi_index_b;
            let body_a = if moves(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let body_b = if moves(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };

            let sep = solve_position_constraint(pc, positions, body_a, body_b, TOI_BAUMGARTE);
            min_separation = min_separation.min(sep);
        }

        min_separation >= -1.5 * LINEAR_SLOP
    }
}

/// Push the two bodies apart along each manifold point. Returns the
/// smallest separation seen.
fn solve_position_constraint(
    pc: &ContactPositionConstraint,
    positions: &mut [Position],
    (m_a, i_a): (f32, f32),
    (m_b, i_b): (f32, f32),
    baumgarte: f32,
) -> f32 {
    let mut c_a = positions[pc.index_a].c;
    let mut a_a = positions[pc.index_a].a;
    let mut c_b = positions[pc.index_b].c;
    let mut a_b = positions[pc.index_b].a;

    let mut min_separation = f32::MAX;

    for j in 0..pc.point_count {
        let xf_a = body_transform(c_a, a_a, pc.local_center_a);
        let xf_b = body_transform(c_b, a_b, pc.local_center_b);

        let (normal, point, separation) = pc.evaluate(&xf_a, &xf_b, j);

        let r_a = point - c_a;
        let r_b = point - c_b;

        min_separation = min_separation.min(separation);

        // Prevent large corrections and allow slop.
        let c = (baumgarte * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

        let rn_a = cross(r_a, normal);
        let rn_b = cross(r_b, normal);
        let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        let p = impulse * normal;

        c_a -= m_a * p;
        a_a -= i_a * cross(r_a, p);
        c_b += m_b * p;
        a_b += i_b * cross(r_b, p);
    }

    positions[pc.index_a] = Position { c: c_a, a: a_a };
    positions[pc.index_b] = Position { c: c_b, a: a_b };

    min_separation
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::PolygonShape;
    use crate::dynamics::body::{Body, BodyDef};
    use crate::dynamics::contact::Contact;
    use crate::dynamics::fixture::{Fixture, FixtureDef};
    use slotmap::SlotMap;

    struct Stack {
        bodies: BodyMap,
        fixtures: FixtureMap,
        contacts: ContactMap,
        handle: ContactHandle,
        positions: Vec<Position>,
        velocities: Vec<Velocity>,
    }

    /// A unit box resting slightly inside a static ground box, falling at
    /// `speed`.
    fn resting_box(speed: f32, penetration: f32) -> Stack {
        let mut bodies: BodyMap = SlotMap::with_key();
        let mut fixtures: FixtureMap = SlotMap::with_key();
        let mut contacts: ContactMap = SlotMap::with_key();

        let ground = bodies.insert(Body::new(&BodyDef::default()));
        let boxed = bodies.insert(Body::new(
            &BodyDef::dynamic()
                .with_position(Vec2::new(0.0, 1.0 - penetration))
                .with_linear_velocity(Vec2::new(0.0, -speed)),
        ));
        let fg = fixtures.insert(Fixture::new(ground, &FixtureDef::new(PolygonShape::new_box(5.0, 0.5))));
        let fb = fixtures.insert(Fixture::new(
            boxed,
            &FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
        ));

        let md = fixtures[fb].mass_data();
        bodies[boxed].apply_fixture_mass(std::iter::once(md));
        bodies[ground].island_index = 0;
        bodies[boxed].island_index = 1;

        let mut contact =
            Contact::create(fg, &fixtures[fg], 0, fb, &fixtures[fb], 0).expect("polygon pair");
        contact.update(&fixtures, &mut bodies, &mut None);
        assert_eq!(contact.manifold().point_count, 2);
        let handle = contacts.insert(contact);

        let positions = [ground, boxed]
            .iter()
            .map(|&h| Position {
                c: bodies[h].sweep.c,
                a: bodies[h].sweep.a,
            })
            .collect();
        let velocities = [ground, boxed]
            .iter()
            .map(|&h| Velocity {
                v: bodies[h].linear_velocity,
                w: bodies[h].angular_velocity,
            })
            .collect();

        Stack {
            bodies,
            fixtures,
            contacts,
            handle,
            positions,
            velocities,
        }
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    #[test]
    fn velocity_pass_stops_approach() {
        let mut s = resting_box(0.5, 0.0);
        let mut solver = ContactSolver::new(step(), &[s.handle], &s.contacts, &s.fixtures, &s.bodies);
        solver.initialize_velocity_constraints(&s.contacts, &s.positions, &s.velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut s.velocities);
        }
        assert!(s.velocities[1].v.y.abs() < 1e-4, "vy = {}", s.velocities[1].v.y);
        assert!(s.velocities[1].w.abs() < 1e-4);

        solver.store_impulses(&mut s.contacts);
        let impulse = solver.impulse(0);
        assert_eq!(impulse.count, 2);
        let total: f32 = impulse.normal_impulses.iter().sum();
        // Momentum removed equals mass times speed.
        assert!((total - 0.5).abs() < 1e-3, "total = {total}");
        assert_eq!(s.contacts[s.handle].manifold().points[0].normal_impulse, impulse.normal_impulses[0]);
    }

    #[test]
    fn fast_approach_bounces_with_restitution() {
        let mut s = resting_box(4.0, 0.0);
        s.contacts[s.handle].set_restitution(0.5);
        let mut solver = ContactSolver::new(step(), &[s.handle], &s.contacts, &s.fixtures, &s.bodies);
        solver.initialize_velocity_constraints(&s.contacts, &s.positions, &s.velocities);
        for _ in 0..10 {
            solver.solve_velocity_constraints(&mut s.velocities);
        }
        assert!((s.velocities[1].v.y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn position_pass_resolves_penetration() {
        let mut s = resting_box(0.0, 0.05);
        let solver = ContactSolver::new(step(), &[s.handle], &s.contacts, &s.fixtures, &s.bodies);
        assert!(!solver.solve_position_constraints(&mut s.positions));
        for _ in 0..20 {
            if solver.solve_position_constraints(&mut s.positions) {
                break;
            }
        }
        // Ground stays put; the box is pushed up to within the slop.
        assert_eq!(s.positions[0].c, Vec2::ZERO);
        assert!(s.positions[1].c.y > 0.95 + 2.0 * LINEAR_SLOP);
    }

    #[test]
    fn toi_pass_moves_only_toi_bodies() {
        let mut s = resting_box(0.0, 0.05);
        let solver = ContactSolver::new(step(), &[s.handle], &s.contacts, &s.fixtures, &s.bodies);
        let before = s.positions[1];
        // Neither index matches the box: nothing moves.
        solver.solve_toi_position_constraints(&mut s.positions, 0, 0);
        assert_eq!(s.positions[1], before);
        solver.solve_toi_position_constraints(&mut s.positions, 0, 1);
        assert!(s.positions[1].c.y > before.c.y);
    }
}
