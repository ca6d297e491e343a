use glam::Vec2;

use crate::common::math::{cross, cross_sv, Rot};
use crate::common::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::dynamics::body::Body;
use crate::dynamics::joints::{soft_constraint, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Keeps two anchor points at a fixed distance, optionally as a spring.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length. Should not be near zero.
    pub length: f32,
    /// Mass-spring-damper frequency in Hz. Zero makes the joint rigid.
    pub frequency_hz: f32,
    /// 0 = no damping, 1 = critical damping.
    pub damping_ratio: f32,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Set anchors from world points; the rest length is their current
    /// distance.
    pub fn initialize(mut self, a: &Body, b: &Body, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        self.local_anchor_a = a.local_point(anchor_a);
        self.local_anchor_b = b.local_point(anchor_b);
        self.length = (anchor_b - anchor_a).length();
        self
    }

    pub fn with_length(mut self, length: f32) -> Self {
        self.length = length;
        self
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length: f32,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: f32,
    bias: f32,
    gamma: f32,

    a: SolverBody,
    b: SolverBody,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            bias: 0.0,
            gamma: 0.0,
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

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
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

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (inv_dt * self.impulse) * self.u
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: SolverBody, b: SolverBody, data: &mut SolverData) {
        self.a = a;
        self.b = b;

        let c_a = data.positions[a.index].c;
        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;

        let c_b = data.positions[b.index].c;
        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));

        self.r_a = a.arm(q_a, self.local_anchor_a);
        self.r_b = b.arm(q_b, self.local_anchor_b);
        self.u = c_b + self.r_b - c_a - self.r_a;

        // Handle singularity.
        let length = self.u.length();
        if length > LINEAR_SLOP {
            self.u *= 1.0 / length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = cross(self.r_a, self.u);
        let cr_bu = cross(self.r_b, self.u);
        let mut inv_mass =
            a.inv_mass + a.inv_i * cr_au * cr_au + b.inv_mass + b.inv_i * cr_bu * cr_bu;

        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let (gamma, bias_factor) =
                soft_constraint(self.mass, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step.
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse * self.u;
            v_a -= a.inv_mass * p;
            w_a -= a.inv_i * cross(self.r_a, p);
            v_b += b.inv_mass * p;
            w_b += b.inv_i * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b) = (self.a, self.b);
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        // Cdot = dot(u, v + cross(w, r))
        let vp_a = v_a + cross_sv(w_a, self.r_a);
        let vp_b = v_b + cross_sv(w_b, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        v_a -= a.inv_mass * p;
        w_a -= a.inv_i * cross(self.r_a, p);
        v_b += b.inv_mass * p;
        w_b += b.inv_i * cross(self.r_b, p);

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        // Springs are soft; no position correction.
        if self.frequency_hz > 0.0 {
            return true;
        }

        let (a, b) = (self.a, self.b);
        let mut c_a = data.positions[a.index].c;
        let mut a_a = data.positions[a.index].a;
        let mut c_b = data.positions[b.index].c;
        let mut a_b = data.positions[b.index].a;

        let r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        let r_b = b.arm(Rot::new(a_b), self.local_anchor_b);
        let d = c_b + r_b - c_a - r_a;

        let length = d.length();
        let u = d.normalize_or_zero();
        let c = (length - self.length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        c_a -= a.inv_mass * p;
        a_a -= a.inv_i * cross(r_a, p);
        c_b += b.inv_mass * p;
        a_b += b.inv_i * cross(r_b, p);

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;

        c.abs() < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    #[test]
    fn rigid_rod_holds_length_under_gravity() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_position(Vec2::new(2.0, 0.0)),
        ]);
        let def = DistanceJointDef::new(rig.handles[0], rig.handles[1]).initialize(
            rig.body(0),
            rig.body(1),
            Vec2::ZERO,
            Vec2::new(2.0, 0.0),
        );
        assert!((def.length - 2.0).abs() < 1e-6);

        let mut joint = Joint::new(
            rig.handles[0],
            rig.handles[1],
            false,
            0,
            JointKind::Distance(DistanceJoint::new(&def)),
        );
        for _ in 0..120 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        let length = rig.body(1).position().length();
        assert!((length - 2.0).abs() < 2.0 * LINEAR_SLOP, "length = {length}");
        // The pendulum swung down.
        assert!(rig.body(1).position().y < -0.5);
    }

    #[test]
    fn spring_skips_position_correction() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_position(Vec2::new(3.0, 0.0)),
        ]);
        let def = DistanceJointDef::new(rig.handles[0], rig.handles[1])
            .with_length(2.0)
            .with_spring(4.0, 0.5);
        let mut joint = DistanceJoint::new(&def);
        let (a, b) = (SolverBody::new(rig.body(0)), SolverBody::new(rig.body(1)));
        let mut data = rig.step_data();
        joint.init_velocity_constraints(a, b, &mut data);
        assert!(joint.gamma > 0.0);
        assert!(joint.solve_position_constraints(&mut data));
        joint.solve_velocity_constraints(&mut data);
        // Stretched spring pulls B back toward A.
        assert!(data.velocities[1].v.x < 0.0);
    }
}
