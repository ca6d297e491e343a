use glam::{Mat2, Mat3, Vec2, Vec3};

use crate::common::math::{cross, cross_sv, Mat22Ext, Mat33Ext, Rot};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::dynamics::body::Body;
use crate::dynamics::joints::{LimitState, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// One translational degree of freedom along an axis fixed in body A.
/// Relative rotation is locked.
#[derive(Debug, Clone, PartialEq)]
pub struct PrismaticJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Translation axis in body A's frame. Normalized on creation.
    pub local_axis_a: Vec2,
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,
    pub enable_motor: bool,
    pub max_motor_force: f32,
    pub motor_speed: f32,
}

impl PrismaticJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::X,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            max_motor_force: 0.0,
            motor_speed: 0.0,
        }
    }

    /// Anchor at a world point with a world axis.
    pub fn initialize(mut self, a: &Body, b: &Body, anchor: Vec2, axis: Vec2) -> Self {
        self.local_anchor_a = a.local_point(anchor);
        self.local_anchor_b = b.local_point(anchor);
        self.local_axis_a = a.local_vector(axis);
        self.reference_angle = b.angle() - a.angle();
        self
    }

    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_force: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_x_axis_a: Vec2,
    local_y_axis_a: Vec2,
    pub(crate) reference_angle: f32,

    impulse: Vec3,
    motor_impulse: f32,
    lower_translation: f32,
    upper_translation: f32,
    max_motor_force: f32,
    motor_speed: f32,
    enable_limit: bool,
    enable_motor: bool,
    limit_state: LimitState,

    a: SolverBody,
    b: SolverBody,
    axis: Vec2,
    perp: Vec2,
    s1: f32,
    s2: f32,
    a1: f32,
    a2: f32,
    k: Mat3,
    motor_mass: f32,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let axis = def.local_axis_a.normalize_or_zero();
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: axis,
            local_y_axis_a: cross_sv(1.0, axis),
            reference_angle: def.reference_angle,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            max_motor_force: def.max_motor_force,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            enable_motor: def.enable_motor,
            limit_state: LimitState::Inactive,
            a: SolverBody::default(),
            b: SolverBody::default(),
            axis: Vec2::ZERO,
            perp: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Mat3::ZERO,
            motor_mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn local_axis_a(&self) -> Vec2 {
        self.local_x_axis_a
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    /// Signed distance of anchor B from anchor A along the axis.
    pub fn joint_translation(&self, a: &Body, b: &Body) -> f32 {
        let d = b.world_point(self.local_anchor_b) - a.world_point(self.local_anchor_a);
        d.dot(a.world_vector(self.local_x_axis_a))
    }

    pub fn joint_speed(&self, a: &Body, b: &Body) -> f32 {
        let r_a = a.xf.q.apply(self.local_anchor_a - a.sweep.local_center);
        let r_b = b.xf.q.apply(self.local_anchor_b - b.sweep.local_center);
        let d = (b.sweep.c + r_b) - (a.sweep.c + r_a);
        let axis = a.xf.q.apply(self.local_x_axis_a);

        let (v_a, w_a) = (a.linear_velocity, a.angular_velocity);
        let (v_b, w_b) = (b.linear_velocity, b.angular_velocity);

        d.dot(cross_sv(w_a, axis)) + axis.dot(v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a))
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn lower_limit(&self) -> f32 {
        self.lower_translation
    }

    pub fn upper_limit(&self) -> f32 {
        self.upper_translation
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        debug_assert!(lower <= upper);
        if lower != self.lower_translation || upper != self.upper_translation {
            self.lower_translation = lower;
            self.upper_translation = upper;
            self.impulse.z = 0.0;
        }
    }

    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn max_motor_force(&self) -> f32 {
        self.max_motor_force
    }

    pub fn set_max_motor_force(&mut self, force: f32) {
        self.max_motor_force = force;
    }

    pub fn motor_force(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * (self.impulse.x * self.perp + (self.motor_impulse + self.impulse.z) * self.axis)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.y
    }

    /// Lever terms for the axis and its perpendicular: `(axis, a1, a2, perp, s1, s2)`.
    fn geometry(&self, q_a: Rot, d: Vec2, r_a: Vec2, r_b: Vec2) -> (Vec2, f32, f32, Vec2, f32, f32) {
        let axis = q_a.apply(self.local_x_axis_a);
        let a1 = cross(d + r_a, axis);
        let a2 = cross(r_b, axis);
        let perp = q_a.apply(self.local_y_axis_a);
        let s1 = cross(d + r_a, perp);
        let s2 = cross(r_b, perp);
        (axis, a1, a2, perp, s1, s2)
    }

    fn block_mass(&self, a1: f32, a2: f32, s1: f32, s2: f32) -> Mat3 {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
        let k12 = i_a * s1 + i_b * s2;
        let k13 = i_a * s1 * a1 + i_b * s2 * a2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // For bodies with fixed rotation.
            k22 = 1.0;
        }
        let k23 = i_a * a1 + i_b * a2;
        let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
        Mat3::from_cols(
            Vec3::new(k11, k12, k13),
            Vec3::new(k12, k22, k23),
            Vec3::new(k13, k23, k33),
        )
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
        let r_a = a.arm(q_a, self.local_anchor_a);
        let r_b = b.arm(q_b, self.local_anchor_b);
        let d = (c_b - c_a) + r_b - r_a;

        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let (axis, a1, a2, perp, s1, s2) = self.geometry(q_a, d, r_a, r_b);
        self.axis = axis;
        self.a1 = a1;
        self.a2 = a2;
        self.perp = perp;
        self.s1 = s1;
        self.s2 = s2;

        self.motor_mass = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        self.k = self.block_mass(a1, a2, s1, s2);

        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let axial = self.motor_impulse + self.impulse.z;
            let p = self.impulse.x * perp + axial * axis;
            let l_a = self.impulse.x * s1 + self.impulse.y + axial * a1;
            let l_b = self.impulse.x * s2 + self.impulse.y + axial * a2;

            v_a -= m_a * p;
            w_a -= i_a * l_a;
            v_b += m_b * p;
            w_b += i_b * l_b;
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
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

        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        // Motor.
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let cdot = self.axis.dot(v_b - v_a) + self.a2 * w_b - self.a1 * w_a;
            let mut impulse = self.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_force;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            let p = impulse * self.axis;
            v_a -= m_a * p;
            w_a -= i_a * impulse * self.a1;
            v_b += m_b * p;
            w_b += i_b * impulse * self.a2;
        }

        let cdot1 = Vec2::new(
            self.perp.dot(v_b - v_a) + self.s2 * w_b - self.s1 * w_a,
            w_b - w_a,
        );

        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let cdot2 = self.axis.dot(v_b - v_a) + self.a2 * w_b - self.a1 * w_a;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            let df = self.k.solve33(-cdot);
            self.impulse += df;

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(0.0),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(0.0),
                _ => {}
            }

            // Re-solve the first two rows given the clamped axial impulse.
            let ez = Vec2::new(self.k.z_axis.x, self.k.z_axis.y);
            let rhs = -cdot1 - (self.impulse.z - f1.z) * ez;
            let f2r = self.k.solve22(rhs) + Vec2::new(f1.x, f1.y);
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            let df = self.impulse - f1;

            let p = df.x * self.perp + df.z * self.axis;
            let l_a = df.x * self.s1 + df.y + df.z * self.a1;
            let l_b = df.x * self.s2 + df.y + df.z * self.a2;

            v_a -= m_a * p;
            w_a -= i_a * l_a;
            v_b += m_b * p;
            w_b += i_b * l_b;
        } else {
            let df = self.k.solve22(-cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;

            let p = df.x * self.perp;
            let l_a = df.x * self.s1 + df.y;
            let l_b = df.x * self.s2 + df.y;

            v_a -= m_a * p;
            w_a -= i_a * l_a;
            v_b += m_b * p;
            w_b += i_b * l_b;
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (a, b) = (self.a, self.b);
        let mut c_a = data.positions[a.index].c;
        let mut a_a = data.positions[a.index].a;
        let mut c_b = data.positions[b.index].c;
        let mut a_b = data.positions[b.index].a;

        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let r_a = a.arm(q_a, self.local_anchor_a);
        let r_b = b.arm(q_b, self.local_anchor_b);
        let d = c_b + r_b - c_a - r_a;

        let (axis, a1, a2, perp, s1, s2) = self.geometry(q_a, d, r_a, r_b);

        let c1 = Vec2::new(perp.dot(d), a_b - a_a - self.reference_angle);

        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                c2 = (translation - self.lower_translation).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max((translation - self.lower_translation).abs());
                active = true;
            } else if translation <= self.lower_translation {
                // Prevent large linear corrections and allow some slop.
                c2 = (translation - self.lower_translation + LINEAR_SLOP).clamp(-MAX_LINEAR_CORRECTION, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - LINEAR_SLOP).clamp(0.0, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let impulse = if active {
            let k = self.block_mass(a1, a2, s1, s2);
            k.solve33(-Vec3::new(c1.x, c1.y, c2))
        } else {
            let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
            let k12 = i_a * s1 + i_b * s2;
            let mut k22 = i_a + i_b;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
            let impulse1 = k.solve(-c1);
            Vec3::new(impulse1.x, impulse1.y, 0.0)
        };

        let p = impulse.x * perp + impulse.z * axis;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        c_a -= m_a * p;
        a_a -= i_a * l_a;
        c_b += m_b * p;
        a_b += i_b * l_b;

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    fn slider(rig: &Rig, def: PrismaticJointDef) -> Joint {
        Joint::new(
            rig.handles[0],
            rig.handles[1],
            false,
            0,
            JointKind::Prismatic(PrismaticJoint::new(&def)),
        )
    }

    fn prismatic(joint: &Joint) -> &PrismaticJoint {
        match joint.kind() {
            JointKind::Prismatic(j) => j,
            _ => unreachable!(),
        }
    }

    #[test]
    fn gravity_off_axis_is_resisted() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = PrismaticJointDef::new(rig.handles[0], rig.handles[1]).initialize(
            rig.body(0),
            rig.body(1),
            Vec2::ZERO,
            Vec2::X,
        );
        let mut joint = slider(&rig, def);
        for _ in 0..30 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        assert!(rig.body(1).position().y.abs() < 2.0 * LINEAR_SLOP);
        assert!(rig.body(1).angle().abs() < ANGULAR_SLOP);
    }

    #[test]
    fn lower_limit_catches_sliding_body() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = PrismaticJointDef::new(rig.handles[0], rig.handles[1])
            .initialize(rig.body(0), rig.body(1), Vec2::ZERO, Vec2::Y)
            .with_limit(-1.0, 1.0);
        let mut joint = slider(&rig, def);
        for _ in 0..120 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        let translation = prismatic(&joint).joint_translation(rig.body(0), rig.body(1));
        assert!((translation + 1.0).abs() < 2.0 * LINEAR_SLOP, "translation = {translation}");
        assert_eq!(prismatic(&joint).limit_state(), LimitState::AtLower);
    }

    #[test]
    fn motor_drives_along_axis() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = PrismaticJointDef::new(rig.handles[0], rig.handles[1])
            .initialize(rig.body(0), rig.body(1), Vec2::ZERO, Vec2::X)
            .with_motor(1.5, 1000.0);
        let mut joint = slider(&rig, def);
        for _ in 0..5 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        let speed = prismatic(&joint).joint_speed(rig.body(0), rig.body(1));
        assert!((speed - 1.5).abs() < 1e-3, "speed = {speed}");
        assert!(rig.body(1).position().x > 0.0);
    }
}
