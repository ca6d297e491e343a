use glam::{Mat2, Vec2};

use crate::common::math::{cross, cross_sv, Mat22Ext, Rot};
use crate::dynamics::body::Body;
use crate::dynamics::joints::SolverBody;
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Top-down friction: resists relative motion up to a maximum force and
/// torque.
#[derive(Debug, Clone, PartialEq)]
pub struct FrictionJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub max_force: f32,
    pub max_torque: f32,
}

impl FrictionJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_force: 0.0,
            max_torque: 0.0,
        }
    }

    pub fn initialize(mut self, a: &Body, b: &Body, anchor: Vec2) -> Self {
        self.local_anchor_a = a.local_point(anchor);
        self.local_anchor_b = b.local_point(anchor);
        self
    }

    pub fn with_limits(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FrictionJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    linear_impulse: Vec2,
    angular_impulse: f32,
    max_force: f32,
    max_torque: f32,

    a: SolverBody,
    b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat2,
    angular_mass: f32,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            max_force: def.max_force,
            max_torque: def.max_torque,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f32) {
        debug_assert!(force.is_finite() && force >= 0.0);
        self.max_force = force;
    }

    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, torque: f32) {
        debug_assert!(torque.is_finite() && torque >= 0.0);
        self.max_torque = torque;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.linear_impulse
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.angular_impulse
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: SolverBody, b: SolverBody, data: &mut SolverData) {
        self.a = a;
        self.b = b;
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;

        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        self.r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        self.r_b = b.arm(Rot::new(a_b), self.local_anchor_b);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let k = Mat2::from_cols(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        self.linear_mass = k.inverse_or_zero();

        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a -= m_a * p;
            w_a -= i_a * (cross(r_a, p) + self.angular_impulse);
            v_b += m_b * p;
            w_b += i_b * (cross(r_b, p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b) = (self.a, self.b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let h = data.step.dt;

        // Angular friction.
        {
            let cdot = w_b - w_a;
            let mut impulse = -self.angular_mass * cdot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.angular_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Linear friction.
        {
            let cdot = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);

            let impulse = -(self.linear_mass * cdot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.length_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize_or_zero() * max_impulse;
            }

            let impulse = self.linear_impulse - old_impulse;

            v_a -= m_a * impulse;
            w_a -= i_a * cross(r_a, impulse);
            v_b += m_b * impulse;
            w_b += i_b * cross(r_b, impulse);
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    #[test]
    fn decelerates_at_max_force_then_stops() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic()
                .with_linear_velocity(Vec2::new(5.0, 0.0))
                .with_angular_velocity(1.0),
        ]);
        let def = FrictionJointDef::new(rig.handles[0], rig.handles[1]).with_limits(10.0, 3.0);
        let mut joint = Joint::new(
            rig.handles[0],
            rig.handles[1],
            false,
            0,
            JointKind::Friction(FrictionJoint::new(&def)),
        );

        for _ in 0..6 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        // 10 N on a unit mass for 0.1 s.
        assert!((rig.body(1).linear_velocity().x - 4.0).abs() < 1e-3);
        // 3 N·m on unit inertia for 0.1 s.
        assert!((rig.body(1).angular_velocity() - 0.7).abs() < 1e-3);

        for _ in 0..60 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        assert!(rig.body(1).linear_velocity().length() < 1e-4);
        assert!(rig.body(1).angular_velocity().abs() < 1e-4);
    }
}
