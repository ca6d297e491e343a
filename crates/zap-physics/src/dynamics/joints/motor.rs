use glam::{Mat2, Vec2};

use crate::common::math::{cross, cross_sv, Mat22Ext, Rot};
use crate::dynamics::body::Body;
use crate::dynamics::joints::SolverBody;
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Drives body B toward a pose relative to body A, limited by a maximum
/// force and torque.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Target position of body B in body A's frame.
    pub linear_offset: Vec2,
    /// Target angle of body B minus angle of body A.
    pub angular_offset: f32,
    pub max_force: f32,
    pub max_torque: f32,
    /// Position error fraction corrected per step, in `[0, 1]`.
    pub correction_factor: f32,
}

impl MotorJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            linear_offset: Vec2::ZERO,
            angular_offset: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
        }
    }

    /// Use the current relative pose as the target.
    pub fn initialize(mut self, a: &Body, b: &Body) -> Self {
        self.linear_offset = a.local_point(b.position());
        self.angular_offset = b.angle() - a.angle();
        self
    }

    pub fn with_offsets(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_offset = linear;
        self.angular_offset = angular;
        self
    }

    pub fn with_limits(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }

    pub fn with_correction_factor(mut self, factor: f32) -> Self {
        self.correction_factor = factor;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MotorJoint {
    linear_offset: Vec2,
    angular_offset: f32,
    linear_impulse: Vec2,
    angular_impulse: f32,
    max_force: f32,
    max_torque: f32,
    correction_factor: f32,

    a: SolverBody,
    b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    linear_error: Vec2,
    angular_error: f32,
    linear_mass: Mat2,
    angular_mass: f32,
}

impl MotorJoint {
    pub(crate) fn new(def: &MotorJointDef) -> Self {
        Self {
            linear_offset: def.linear_offset,
            angular_offset: def.angular_offset,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            max_force: def.max_force,
            max_torque: def.max_torque,
            correction_factor: def.correction_factor,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_error: Vec2::ZERO,
            angular_error: 0.0,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        }
    }

    pub fn linear_offset(&self) -> Vec2 {
        self.linear_offset
    }

    pub fn set_linear_offset(&mut self, offset: Vec2) {
        self.linear_offset = offset;
    }

    pub fn angular_offset(&self) -> f32 {
        self.angular_offset
    }

    pub fn set_angular_offset(&mut self, offset: f32) {
        self.angular_offset = offset;
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

    pub fn correction_factor(&self) -> f32 {
        self.correction_factor
    }

    pub fn set_correction_factor(&mut self, factor: f32) {
        debug_assert!((0.0..=1.0).contains(&factor));
        self.correction_factor = factor;
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

        let c_a = data.positions[a.index].c;
        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;

        let c_b = data.positions[b.index].c;
        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));

        // Arms from the centers of mass to the body origins.
        self.r_a = q_a.apply(-a.local_center);
        self.r_b = q_b.apply(-b.local_center);
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

        self.linear_error = c_b + r_b - c_a - r_a - q_a.apply(self.linear_offset);
        self.angular_error = a_b - a_a - self.angular_offset;

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
        let inv_h = data.step.inv_dt;

        // Angular.
        {
            let cdot = w_b - w_a + inv_h * self.correction_factor * self.angular_error;
            let mut impulse = -self.angular_mass * cdot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.angular_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Linear.
        {
            let cdot = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a)
                + inv_h * self.correction_factor * self.linear_error;

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
    fn drives_body_to_offset() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = MotorJointDef::new(rig.handles[0], rig.handles[1])
            .with_offsets(Vec2::new(2.0, 0.0), 0.5)
            .with_limits(1000.0, 1000.0);
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Motor(MotorJoint::new(&def)));
        for _ in 0..60 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        assert!((rig.body(1).position() - Vec2::new(2.0, 0.0)).length() < 1e-3);
        assert!((rig.body(1).angle() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn force_is_capped() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = MotorJointDef::new(rig.handles[0], rig.handles[1])
            .with_offsets(Vec2::new(50.0, 0.0), 0.0)
            .with_limits(5.0, 1.0);
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Motor(MotorJoint::new(&def)));
        rig.solve(&mut joint, Vec2::ZERO);
        assert!(joint.reaction_force(60.0).length() <= 5.0 + 1e-3);
        // One step of 5 N on a unit mass.
        assert!((rig.body(1).linear_velocity().x - 5.0 / 60.0).abs() < 1e-4);
    }
}
