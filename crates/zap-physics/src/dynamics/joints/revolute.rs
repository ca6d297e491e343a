use glam::{Mat2, Mat3, Vec2, Vec3};

use crate::common::math::{cross, cross_sv, Mat22Ext, Mat33Ext, Rot};
use crate::common::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION};
use crate::dynamics::body::Body;
use crate::dynamics::joints::{LimitState, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Pins two bodies together at a shared point, leaving relative rotation
/// free, optionally limited and motorized.
#[derive(Debug, Clone, PartialEq)]
pub struct RevoluteJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle in the reference state.
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    /// Target relative angular speed, radians per second.
    pub motor_speed: f32,
    pub max_motor_torque: f32,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    /// Anchor both bodies at a world point, using the current angles as the
    /// reference.
    pub fn initialize(mut self, a: &Body, b: &Body, anchor: Vec2) -> Self {
        self.local_anchor_a = a.local_point(anchor);
        self.local_anchor_b = b.local_point(anchor);
        self.reference_angle = b.angle() - a.angle();
        self
    }

    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,

    impulse: Vec3,
    motor_impulse: f32,

    enable_motor: bool,
    max_motor_torque: f32,
    motor_speed: f32,

    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,

    a: SolverBody,
    b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    /// Effective mass for the point-to-point constraint.
    mass: Mat3,
    /// Effective mass for the motor and limit.
    motor_mass: f32,
    limit_state: LimitState,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            enable_motor: def.enable_motor,
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
            motor_mass: 0.0,
            limit_state: LimitState::Inactive,
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

    /// Current relative angle, in radians.
    pub fn joint_angle(&self, a: &Body, b: &Body) -> f32 {
        b.sweep.a - a.sweep.a - self.reference_angle
    }

    /// Current relative angular speed, in radians per second.
    pub fn joint_speed(&self, a: &Body, b: &Body) -> f32 {
        b.angular_velocity - a.angular_velocity
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
        self.lower_angle
    }

    pub fn upper_limit(&self) -> f32 {
        self.upper_angle
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        debug_assert!(lower <= upper);
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
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

    pub fn max_motor_torque(&self) -> f32 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque;
    }

    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
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

        let a_a = data.positions[a.index].a;
        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;

        let a_b = data.positions[b.index].a;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        self.r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
        self.r_b = b.arm(Rot::new(a_b), self.local_anchor_b);

        // J = [-I -r1_skew I r2_skew]
        //     [ 0       -1 0       1]
        // r_skew = [-ry; rx]
        let (m_a, m_b) = (a.inv_mass, b.inv_mass);
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let fixed_rotation = i_a + i_b == 0.0;

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
        self.mass = Mat3::from_cols(ex, ey, ez);

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = a_b - a_a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step.
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);

            v_a -= m_a * p;
            w_a -= i_a * (cross(r_a, p) + self.motor_impulse + self.impulse.z);

            v_b += m_b * p;
            w_b += i_b * (cross(r_b, p) + self.motor_impulse + self.impulse.z);
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

        let (m_a, m_b) = (a.inv_mass, b.inv_mass);
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let fixed_rotation = i_a + i_b == 0.0;

        // Motor constraint.
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = w_b - w_a - self.motor_speed;
            let mut impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let cdot2 = w_b - w_a;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let mut impulse = -self.mass.solve33(cdot);

            match self.limit_state {
                LimitState::Equal => self.impulse += impulse,
                LimitState::AtLower | LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    let releasing = match self.limit_state {
                        LimitState::AtLower => new_impulse < 0.0,
                        _ => new_impulse > 0.0,
                    };
                    if releasing {
                        let rhs = -cdot1 + self.impulse.z * Vec2::new(self.mass.z_axis.x, self.mass.z_axis.y);
                        let reduced = self.mass.solve22(rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => {}
            }

            let p = Vec2::new(impulse.x, impulse.y);

            v_a -= m_a * p;
            w_a -= i_a * (cross(r_a, p) + impulse.z);

            v_b += m_b * p;
            w_b += i_b * (cross(r_b, p) + impulse.z);
        } else {
            // Point-to-point only.
            let cdot = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let impulse = self.mass.solve22(-cdot);

            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

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

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (a, b) = (self.a, self.b);
        let mut c_a = data.positions[a.index].c;
        let mut a_a = data.positions[a.index].a;
        let mut c_b = data.positions[b.index].c;
        let mut a_b = data.positions[b.index].a;

        let (m_a, m_b) = (a.inv_mass, b.inv_mass);
        let (i_a, i_b) = (a.inv_i, b.inv_i);

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        // Angular limit.
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = a_b - a_a - self.reference_angle;
            let limit_impulse = match self.limit_state {
                LimitState::Equal => {
                    // Prevent large angular corrections.
                    let c = (angle - self.lower_angle).clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION);
                    angular_error = c.abs();
                    -self.motor_mass * c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    // Prevent large angular corrections and allow some slop.
                    let c = (c + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0);
                    -self.motor_mass * c
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    let c = (c - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION);
                    -self.motor_mass * c
                }
                LimitState::Inactive => 0.0,
            };

            a_a -= i_a * limit_impulse;
            a_b += i_b * limit_impulse;
        }

        // Point-to-point.
        let position_error;
        {
            let r_a = a.arm(Rot::new(a_a), self.local_anchor_a);
            let r_b = b.arm(Rot::new(a_b), self.local_anchor_b);

            let c = c_b + r_b - c_a - r_a;
            position_error = c.length();

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

            let impulse = -k.solve(c);

            c_a -= m_a * impulse;
            a_a -= i_a * cross(r_a, impulse);

            c_b += m_b * impulse;
            a_b += i_b * cross(r_b, impulse);
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

    fn hinge(rig: &Rig, def: RevoluteJointDef) -> Joint {
        Joint::new(
            rig.handles[0],
            rig.handles[1],
            false,
            0,
            JointKind::Revolute(RevoluteJoint::new(&def)),
        )
    }

    fn revolute(joint: &Joint) -> &RevoluteJoint {
        match joint.kind() {
            JointKind::Revolute(j) => j,
            _ => unreachable!(),
        }
    }

    #[test]
    fn pendulum_keeps_anchor_together() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_position(Vec2::new(1.0, 0.0)),
        ]);
        let def = RevoluteJointDef::new(rig.handles[0], rig.handles[1]).initialize(
            rig.body(0),
            rig.body(1),
            Vec2::ZERO,
        );
        let mut joint = hinge(&rig, def);
        for _ in 0..60 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }
        let anchor_a = joint.anchor_a(rig.body(0));
        let anchor_b = joint.anchor_b(rig.body(1));
        assert!((anchor_a - anchor_b).length() < 2.0 * LINEAR_SLOP);
    }

    #[test]
    fn motor_reaches_target_speed() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = RevoluteJointDef::new(rig.handles[0], rig.handles[1]).with_motor(2.0, 100.0);
        let mut joint = hinge(&rig, def);
        for _ in 0..10 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        let speed = revolute(&joint).joint_speed(rig.body(0), rig.body(1));
        assert!((speed - 2.0).abs() < 1e-3, "speed = {speed}");
    }

    #[test]
    fn weak_motor_is_torque_limited() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = RevoluteJointDef::new(rig.handles[0], rig.handles[1]).with_motor(10.0, 6.0);
        let mut joint = hinge(&rig, def);
        rig.solve(&mut joint, Vec2::ZERO);
        // Unit inertia: one step of max torque adds 6 * dt.
        let speed = revolute(&joint).joint_speed(rig.body(0), rig.body(1));
        assert!((speed - 0.1).abs() < 1e-4, "speed = {speed}");
    }

    #[test]
    fn upper_limit_stops_rotation() {
        let mut rig = Rig::new(&[
            BodyDef::default(),
            BodyDef::dynamic().with_angular_velocity(5.0),
        ]);
        let def = RevoluteJointDef::new(rig.handles[0], rig.handles[1]).with_limit(-0.25, 0.25);
        let mut joint = hinge(&rig, def);
        for _ in 0..60 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        let angle = revolute(&joint).joint_angle(rig.body(0), rig.body(1));
        assert!(angle <= 0.25 + 2.0 * ANGULAR_SLOP, "angle = {angle}");
        assert_eq!(revolute(&joint).limit_state(), LimitState::AtUpper);
    }
}
