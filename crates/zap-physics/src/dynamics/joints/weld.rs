use glam::{Mat3, Vec2, Vec3};

use crate::common::math::{cross, cross_sv, Mat33Ext, Rot};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::dynamics::body::Body;
use crate::dynamics::joints::{soft_constraint, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Glues two bodies together. A positive frequency softens the angular part.
#[derive(Debug, Clone, PartialEq)]
pub struct WeldJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WeldJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn initialize(mut self, a: &Body, b: &Body, anchor: Vec2) -> Self {
        self.local_anchor_a = a.local_point(anchor);
        self.local_anchor_b = b.local_point(anchor);
        self.reference_angle = b.angle() - a.angle();
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
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    bias: f32,
    gamma: f32,
    impulse: Vec3,

    a: SolverBody,
    b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat3,
}

/// Point-plus-angle effective mass matrix.
fn block_mass(a: SolverBody, b: SolverBody, r_a: Vec2, r_b: Vec2) -> Mat3 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
    let ex = Vec3::new(
        m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
        -r_a.y * i_a - r_b.y * i_b,
    );
    let ey = Vec3::new(
        ex.y,
        m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
        r_a.x * i_a + r_b.x * i_b,
    );
    let ez = Vec3::new(ex.z, ey.z, i_a + i_b);
    Mat3::from_cols(ex, ey, ez)
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: Vec3::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
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
        inv_dt * Vec2::new(self.impulse.x, self.impulse.y)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.z
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

        let k = block_mass(a, b, self.r_a, self.r_b);

        if self.frequency_hz > 0.0 {
            self.mass = k.inverse22();

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };

            let c = a_b - a_a - self.reference_angle;
            let (gamma, bias_factor) = soft_constraint(m, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_m += self.gamma;
            self.mass.z_axis.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.z_axis.z == 0.0 {
            self.mass = k.inverse22();
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = k.sym_inverse33();
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a -= m_a * p;
            w_a -= i_a * (cross(self.r_a, p) + self.impulse.z);
            v_b += m_b * p;
            w_b += i_b * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
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

        if self.frequency_hz > 0.0 {
            let cdot2 = w_b - w_a;
            let impulse2 = -self.mass.z_axis.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            w_a -= i_a * impulse2;
            w_b += i_b * impulse2;

            let cdot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let impulse1 = -self.mass.mul22(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            v_a -= m_a * impulse1;
            w_a -= i_a * cross(r_a, impulse1);
            v_b += m_b * impulse1;
            w_b += i_b * cross(r_b, impulse1);
        } else {
            let cdot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let cdot2 = w_b - w_a;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let impulse = -(self.mass * cdot);
            self.impulse += impulse;

            let p = Vec2::new(impulse.x, impulse.y);
            v_a -= m_a * p;
            w_a -= i_a * (cross(r_a, p) + impulse.z);
            v_b += m_b * p;
            w_b += i_b * (cross(r_b, p) + impulse.z);
        }

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

        let k = block_mass(a, b, r_a, r_b);
        let c1 = c_b + r_b - c_a - r_a;

        let position_error = c1.length();
        let angular_error;

        if self.frequency_hz > 0.0 {
            angular_error = 0.0;

            let p = -k.solve22(c1);
            c_a -= m_a * p;
            a_a -= i_a * cross(r_a, p);
            c_b += m_b * p;
            a_b += i_b * cross(r_b, p);
        } else {
            let c2 = a_b - a_a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = if k.z_axis.z > 0.0 {
                -k.solve33(Vec3::new(c1.x, c1.y, c2))
            } else {
                let impulse2 = -k.solve22(c1);
                Vec3::new(impulse2.x, impulse2.y, 0.0)
            };

            let p = Vec2::new(impulse.x, impulse.y);
            c_a -= m_a * p;
            a_a -= i_a * (cross(r_a, p) + impulse.z);
            c_b += m_b * p;
            a_b += i_b * (cross(r_b, p) + impulse.z);
        }

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    fn weld(rig: &Rig, def: &WeldJointDef) -> Joint {
        Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Weld(WeldJoint::new(def)))
    }

    #[test]
    fn rigid_weld_holds_cantilever() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_position(Vec2::new(1.0, 0.0)),
        ]);
        let def = WeldJointDef::new(rig.handles[0], rig.handles[1]).initialize(
            rig.body(0),
            rig.body(1),
            Vec2::new(0.5, 0.0),
        );
        let mut joint = weld(&rig, &def);
        for _ in 0..60 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        let body = rig.body(1);
        assert!((body.position() - Vec2::new(1.0, 0.0)).length() < 2.0 * LINEAR_SLOP);
        assert!(body.angle().abs() < ANGULAR_SLOP);
        // Holding a unit mass against gravity.
        assert!((joint.reaction_force(60.0).y - 10.0).abs() < 0.5);
    }

    #[test]
    fn soft_weld_bends_then_recovers() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_angular_velocity(3.0),
        ]);
        let def = WeldJointDef::new(rig.handles[0], rig.handles[1]).with_spring(1.0, 1.0);
        let mut joint = weld(&rig, &def);

        rig.solve(&mut joint, Vec2::ZERO);
        assert!(rig.body(1).angle() > 0.0);

        for _ in 0..240 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        assert!(rig.body(1).angle().abs() < 0.01, "angle = {}", rig.body(1).angle());
    }
}
