use glam::Vec2;

use crate::common::math::{cross, cross_sv, Rot};
use crate::common::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::dynamics::joints::{LimitState, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Upper bound on the distance between two anchors. Slack ropes apply no
/// force.
#[derive(Debug, Clone, PartialEq)]
pub struct RopeJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_length: f32,
}

impl RopeJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            max_length: 0.0,
        }
    }

    pub fn with_anchors(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        self.local_anchor_a = local_anchor_a;
        self.local_anchor_b = local_anchor_b;
        self
    }

    pub fn with_max_length(mut self, max_length: f32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RopeJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    max_length: f32,
    length: f32,
    impulse: f32,
    state: LimitState,

    a: SolverBody,
    b: SolverBody,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl RopeJoint {
    pub(crate) fn new(def: &RopeJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_length: def.max_length,
            length: 0.0,
            impulse: 0.0,
            state: LimitState::Inactive,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn max_length(&self) -> f32 {
        self.max_length
    }

    pub fn set_max_length(&mut self, length: f32) {
        self.max_length = length;
    }

    /// `AtUpper` while the rope is taut.
    pub fn limit_state(&self) -> LimitState {
        self.state
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (inv_dt * self.impulse) * self.u
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: SolverBody, b: SolverBody, data: &mut SolverData) {
        self.a = a;
        self.b = b;
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let c_a = data.positions[a.index].c;
        let a_a = data.positions[a.index].a;
        let c_b = data.positions[b.index].c;
        let a_b = data.positions[b.index].a;

        self.r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        self.r_b = b.arm(Rot::new(a_b), self.local_anchor_b);
        self.u = c_b + self.r_b - c_a - self.r_a;

        self.length = self.u.length();

        let c = self.length - self.max_length;
        self.state = if c > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if self.length > LINEAR_SLOP {
            self.u *= 1.0 / self.length;
        } else {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let cr_a = cross(self.r_a, self.u);
        let cr_b = cross(self.r_b, self.u);
        let inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse * self.u;
            data.velocities[a.index].v -= m_a * p;
            data.velocities[a.index].w -= i_a * cross(self.r_a, p);
            data.velocities[b.index].v += m_b * p;
            data.velocities[b.index].w += i_b * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b) = (self.a, self.b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let vp_a = v_a + cross_sv(w_a, self.r_a);
        let vp_b = v_b + cross_sv(w_b, self.r_b);
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(vp_b - vp_a);

        // Predictive constraint.
        if c < 0.0 {
            cdot += data.step.inv_dt * c;
        }

        let mut impulse = -self.mass * cdot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        impulse = self.impulse - old_impulse;

        let p = impulse * self.u;
        v_a -= m_a * p;
        w_a -= i_a * cross(self.r_a, p);
        v_b += m_b * p;
        w_b += i_b * cross(self.r_b, p);

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (a, b) = (self.a, self.b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let mut c_a = data.positions[a.index].c;
        let mut a_a = data.positions[a.index].a;
        let mut c_b = data.positions[b.index].c;
        let mut a_b = data.positions[b.index].a;

        let r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        let r_b = b.arm(Rot::new(a_b), self.local_anchor_b);
        let d = c_b + r_b - c_a - r_a;

        let length = d.length();
        let u = d.normalize_or_zero();
        let c = (length - self.max_length).clamp(0.0, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        c_a -= m_a * p;
        a_a -= i_a * cross(r_a, p);
        c_b += m_b * p;
        a_b += i_b * cross(r_b, p);

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;

        length - self.max_length < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    fn rope(joint: &Joint) -> &RopeJoint {
        match joint.kind() {
            JointKind::Rope(j) => j,
            _ => unreachable!(),
        }
    }

    #[test]
    fn slack_rope_lets_body_fall_until_taut() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_position(Vec2::new(1.0, 0.0)),
        ]);
        let def = RopeJointDef::new(rig.handles[0], rig.handles[1])
            .with_anchors(Vec2::ZERO, Vec2::ZERO)
            .with_max_length(2.0);
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Rope(RopeJoint::new(&def)));

        rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        assert_eq!(rope(&joint).limit_state(), LimitState::Inactive);
        assert_eq!(joint.reaction_force(60.0), Vec2::ZERO);

        for _ in 0..240 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        let length = rig.body(1).position().length();
        assert!(length <= 2.0 + 2.0 * LINEAR_SLOP, "length = {length}");
        assert!(rig.body(1).position().y < -1.0);
    }
}
