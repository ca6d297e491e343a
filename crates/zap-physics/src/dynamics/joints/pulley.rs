use glam::Vec2;

use crate::common::math::{cross, cross_sv, Rot};
use crate::common::settings::{EPSILON, LINEAR_SLOP};
use crate::dynamics::body::Body;
use crate::dynamics::joints::SolverBody;
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Two bodies hung from fixed ground anchors:
/// `length_a + ratio * length_b = constant`.
#[derive(Debug, Clone, PartialEq)]
pub struct PulleyJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub ground_anchor_a: Vec2,
    pub ground_anchor_b: Vec2,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length_a: f32,
    pub length_b: f32,
    pub ratio: f32,
}

impl PulleyJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: true,
            user_data: 0,
            ground_anchor_a: Vec2::new(-1.0, 1.0),
            ground_anchor_b: Vec2::new(1.0, 1.0),
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            length_a: 0.0,
            length_b: 0.0,
            ratio: 1.0,
        }
    }

    /// Ground anchors and body anchors in world coordinates. Lengths are
    /// taken from the current configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        mut self,
        a: &Body,
        b: &Body,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f32,
    ) -> Self {
        self.ground_anchor_a = ground_anchor_a;
        self.ground_anchor_b = ground_anchor_b;
        self.local_anchor_a = a.local_point(anchor_a);
        self.local_anchor_b = b.local_point(anchor_b);
        self.length_a = (anchor_a - ground_anchor_a).length();
        self.length_b = (anchor_b - ground_anchor_b).length();
        debug_assert!(ratio > EPSILON);
        self.ratio = ratio;
        self
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PulleyJoint {
    ground_anchor_a: Vec2,
    ground_anchor_b: Vec2,
    length_a: f32,
    length_b: f32,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    constant: f32,
    ratio: f32,
    impulse: f32,

    a: SolverBody,
    b: SolverBody,
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

/// Unit rope direction, or zero when the rope is shorter than ten slops.
fn rope_direction(u: Vec2) -> (Vec2, f32) {
    let length = u.length();
    if length > 10.0 * LINEAR_SLOP {
        (u * (1.0 / length), length)
    } else {
        (Vec2::ZERO, length)
    }
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> Self {
        debug_assert!(def.ratio != 0.0);
        Self {
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            length_a: def.length_a,
            length_b: def.length_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            constant: def.length_a + def.ratio * def.length_b,
            ratio: def.ratio,
            impulse: 0.0,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn ground_anchor_a(&self) -> Vec2 {
        self.ground_anchor_a
    }

    pub fn ground_anchor_b(&self) -> Vec2 {
        self.ground_anchor_b
    }

    /// Reference length of segment A.
    pub fn length_a(&self) -> f32 {
        self.length_a
    }

    pub fn length_b(&self) -> f32 {
        self.length_b
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn current_length_a(&self, a: &Body) -> f32 {
        (a.world_point(self.local_anchor_a) - self.ground_anchor_a).length()
    }

    pub fn current_length_b(&self, b: &Body) -> f32 {
        (b.world_point(self.local_anchor_b) - self.ground_anchor_b).length()
    }

    pub(crate) fn shift_origin(&mut self, new_origin: Vec2) {
        self.ground_anchor_a -= new_origin;
        self.ground_anchor_b -= new_origin;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (inv_dt * self.impulse) * self.u_b
    }

    /// Inverse effective mass along both rope segments.
    fn inv_effective_mass(&self, r_a: Vec2, u_a: Vec2, r_b: Vec2, u_b: Vec2) -> f32 {
        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);
        let m_a = self.a.inv_mass + self.a.inv_i * ru_a * ru_a;
        let m_b = self.b.inv_mass + self.b.inv_i * ru_b * ru_b;
        m_a + self.ratio * self.ratio * m_b
    }

    fn apply(&self, impulse: f32, data: &mut SolverData) {
        let p_a = -impulse * self.u_a;
        let p_b = (-self.ratio * impulse) * self.u_b;
        let (a, b) = (self.a, self.b);
        data.velocities[a.index].v += a.inv_mass * p_a;
        data.velocities[a.index].w += a.inv_i * cross(self.r_a, p_a);
        data.velocities[b.index].v += b.inv_mass * p_b;
        data.velocities[b.index].w += b.inv_i * cross(self.r_b, p_b);
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: SolverBody, b: SolverBody, data: &mut SolverData) {
        self.a = a;
        self.b = b;

        let c_a = data.positions[a.index].c;
        let a_a = data.positions[a.index].a;
        let c_b = data.positions[b.index].c;
        let a_b = data.positions[b.index].a;

        self.r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        self.r_b = b.arm(Rot::new(a_b), self.local_anchor_b);

        // Get the pulley axes.
        (self.u_a, _) = rope_direction(c_a + self.r_a - self.ground_anchor_a);
        (self.u_b, _) = rope_direction(c_b + self.r_b - self.ground_anchor_b);

        let inv_mass = self.inv_effective_mass(self.r_a, self.u_a, self.r_b, self.u_b);
        self.mass = if inv_mass > 0.0 { 1.0 / inv_mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply(self.impulse, data);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b) = (self.a, self.b);
        let v_a = data.velocities[a.index];
        let v_b = data.velocities[b.index];

        let vp_a = v_a.v + cross_sv(v_a.w, self.r_a);
        let vp_b = v_b.v + cross_sv(v_b.w, self.r_b);

        let cdot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * cdot;
        self.impulse += impulse;

        self.apply(impulse, data);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (a, b) = (self.a, self.b);

        let mut c_a = data.positions[a.index].c;
        let mut a_a = data.positions[a.index].a;
        let mut c_b = data.positions[b.index].c;
        let mut a_b = data.positions[b.index].a;

        let r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        let r_b = b.arm(Rot::new(a_b), self.local_anchor_b);

        let (u_a, length_a) = rope_direction(c_a + r_a - self.ground_anchor_a);
        let (u_b, length_b) = rope_direction(c_b + r_b - self.ground_anchor_b);

        let inv_mass = self.inv_effective_mass(r_a, u_a, r_b, u_b);
        let mass = if inv_mass > 0.0 { 1.0 / inv_mass } else { 0.0 };

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;

        let p_a = -impulse * u_a;
        let p_b = (-self.ratio * impulse) * u_b;

        c_a += a.inv_mass * p_a;
        a_a += a.inv_i * cross(r_a, p_a);
        c_b += b.inv_mass * p_b;
        a_b += b.inv_i * cross(r_b, p_b);

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;

        linear_error < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    #[test]
    fn total_rope_length_is_conserved() {
        let mut rig = Rig::new(&[
            BodyDef::dynamic()
                .with_position(Vec2::new(-1.0, 0.0))
                .with_linear_velocity(Vec2::new(0.0, -1.0)),
            BodyDef::dynamic().with_position(Vec2::new(1.0, 0.0)),
        ]);
        let def = PulleyJointDef::new(rig.handles[0], rig.handles[1]).initialize(
            rig.body(0),
            rig.body(1),
            Vec2::new(-1.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            1.0,
        );
        assert!(def.collide_connected);
        let pulley = PulleyJoint::new(&def);
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], true, 0, JointKind::Pulley(pulley));

        for _ in 0..30 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }

        let JointKind::Pulley(p) = joint.kind() else {
            unreachable!()
        };
        let length_a = p.current_length_a(rig.body(0));
        let length_b = p.current_length_b(rig.body(1));
        assert!((length_a + length_b - 2.0).abs() < 2.0 * LINEAR_SLOP);
        // Balanced masses keep the initial drift.
        assert!(length_a > 1.2);
    }
}
