use glam::{Mat2, Vec2};

use crate::common::math::{cross, cross_sv, Mat22Ext, Rot};
use crate::dynamics::body::Body;
use crate::dynamics::joints::{soft_constraint, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Soft spring pulling a point on body B toward a world target. Body A is
/// only a placeholder, usually a static ground body.
#[derive(Debug, Clone, PartialEq)]
pub struct MouseJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Initial world target; also picks the grabbed point on body B.
    pub target: Vec2,
    /// Usually a multiple of the body weight.
    pub max_force: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl MouseJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            target,
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MouseJoint {
    pub(crate) local_anchor_b: Vec2,
    pub(crate) target: Vec2,
    frequency_hz: f32,
    damping_ratio: f32,
    beta: f32,

    impulse: Vec2,
    max_force: f32,
    gamma: f32,

    b: SolverBody,
    r_b: Vec2,
    mass: Mat2,
    c: Vec2,
}

impl MouseJoint {
    /// The grabbed point is the target expressed in body B's frame.
    pub(crate) fn new(def: &MouseJointDef, body_b: &Body) -> Self {
        Self {
            local_anchor_b: body_b.transform().apply_t(def.target),
            target: def.target,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            beta: 0.0,
            impulse: Vec2::ZERO,
            max_force: def.max_force,
            gamma: 0.0,
            b: SolverBody::default(),
            r_b: Vec2::ZERO,
            mass: Mat2::ZERO,
            c: Vec2::ZERO,
        }
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// Move the target. Wake body B through `World::joint_mut`.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz;
    }

    pub fn damping_ratio(&self) -> f32 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: f32) {
        self.damping_ratio = ratio;
    }

    pub(crate) fn shift_origin(&mut self, new_origin: Vec2) {
        self.target -= new_origin;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse
    }

    pub(crate) fn init_velocity_constraints(&mut self, b: SolverBody, data: &mut SolverData) {
        self.b = b;

        let c_b = data.positions[b.index].c;
        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let q_b = Rot::new(a_b);
        let mass = if b.inv_mass > 0.0 { 1.0 / b.inv_mass } else { 0.0 };

        let (gamma, beta) = soft_constraint(mass, self.frequency_hz, self.damping_ratio, data.step.dt);
        self.gamma = gamma;
        self.beta = beta;

        self.r_b = b.arm(q_b, self.local_anchor_b);
        let r_b = self.r_b;

        // K = [(1/m) * eye(2) - skew(r) * invI * skew(r)] + gamma * eye(2)
        let k = Mat2::from_cols(
            Vec2::new(b.inv_mass + b.inv_i * r_b.y * r_b.y + self.gamma, -b.inv_i * r_b.x * r_b.y),
            Vec2::new(-b.inv_i * r_b.x * r_b.y, b.inv_mass + b.inv_i * r_b.x * r_b.x + self.gamma),
        );
        self.mass = k.inverse_or_zero();

        self.c = (c_b + r_b - self.target) * self.beta;

        // Cheat with some damping.
        w_b *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b += b.inv_mass * self.impulse;
            w_b += b.inv_i * cross(r_b, self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }

        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let b = self.b;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let cdot = v_b + cross_sv(w_b, self.r_b);
        let mut impulse = self.mass * -(cdot + self.c + self.gamma * self.impulse);

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.length();
        }
        impulse = self.impulse - old_impulse;

        v_b += b.inv_mass * impulse;
        w_b += b.inv_i * cross(self.r_b, impulse);

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
    fn drags_body_toward_target() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = MouseJointDef::new(rig.handles[0], rig.handles[1], Vec2::ZERO).with_max_force(1000.0);
        let mouse = MouseJoint::new(&def, rig.body(1));
        assert_eq!(mouse.local_anchor_b, Vec2::ZERO);

        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Mouse(mouse));
        if let JointKind::Mouse(m) = joint.kind_mut() {
            m.set_target(Vec2::new(3.0, 1.0));
        }
        for _ in 0..180 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        assert!((rig.body(1).position() - Vec2::new(3.0, 1.0)).length() < 0.05);
        assert_eq!(joint.anchor_a(rig.body(0)), Vec2::new(3.0, 1.0));
    }

    #[test]
    fn weak_mouse_cannot_lift_heavy_load() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = MouseJointDef::new(rig.handles[0], rig.handles[1], Vec2::ZERO).with_max_force(5.0);
        let mut joint = Joint::new(
            rig.handles[0],
            rig.handles[1],
            false,
            0,
            JointKind::Mouse(MouseJoint::new(&def, rig.body(1))),
        );
        for _ in 0..60 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        // 5 N against 10 N of weight: net 5 m/s^2 downward.
        assert!(rig.body(1).position().y < -1.0);
        assert!(joint.reaction_force(60.0).length() <= 5.0 + 1e-3);
    }
}
