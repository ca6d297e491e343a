use glam::Vec2;

use crate::common::math::{cross, cross_sv, Rot};
use crate::common::settings::LINEAR_SLOP;
use crate::dynamics::body::Body;
use crate::dynamics::joints::{soft_constraint, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::BodyHandle;

/// Point-on-line constraint with a suspension spring along the line and a
/// rotational motor. Models a vehicle wheel.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Suspension axis in body A's frame.
    pub local_axis_a: Vec2,
    pub enable_motor: bool,
    pub max_motor_torque: f32,
    pub motor_speed: f32,
    /// Suspension frequency; zero disables the spring.
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WheelJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::X,
            enable_motor: false,
            max_motor_torque: 0.0,
            motor_speed: 0.0,
            frequency_hz: 2.0,
            damping_ratio: 0.7,
        }
    }

    pub fn initialize(mut self, a: &Body, b: &Body, anchor: Vec2, axis: Vec2) -> Self {
        self.local_anchor_a = a.local_point(anchor);
        self.local_anchor_b = b.local_point(anchor);
        self.local_axis_a = a.local_vector(axis);
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
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
pub struct WheelJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    local_x_axis_a: Vec2,
    local_y_axis_a: Vec2,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: f32,
    motor_impulse: f32,
    spring_impulse: f32,

    max_motor_torque: f32,
    motor_speed: f32,
    enable_motor: bool,

    a: SolverBody,
    b: SolverBody,
    ax: Vec2,
    ay: Vec2,
    s_ax: f32,
    s_bx: f32,
    s_ay: f32,
    s_by: f32,
    mass: f32,
    motor_mass: f32,
    spring_mass: f32,
    bias: f32,
    gamma: f32,
}

impl WheelJoint {
    pub(crate) fn new(def: &WheelJointDef) -> Self {
        let axis = def.local_axis_a.normalize_or_zero();
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: axis,
            local_y_axis_a: cross_sv(1.0, axis),
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            motor_impulse: 0.0,
            spring_impulse: 0.0,
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            enable_motor: def.enable_motor,
            a: SolverBody::default(),
            b: SolverBody::default(),
            ax: Vec2::ZERO,
            ay: Vec2::ZERO,
            s_ax: 0.0,
            s_bx: 0.0,
            s_ay: 0.0,
            s_by: 0.0,
            mass: 0.0,
            motor_mass: 0.0,
            spring_mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
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

    /// Suspension travel along the axis.
    pub fn joint_translation(&self, a: &Body, b: &Body) -> f32 {
        let d = b.world_point(self.local_anchor_b) - a.world_point(self.local_anchor_a);
        d.dot(a.world_vector(self.local_x_axis_a))
    }

    /// Relative angular speed of the wheel.
    pub fn joint_speed(&self, a: &Body, b: &Body) -> f32 {
        b.angular_velocity - a.angular_velocity
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

    pub fn spring_frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_spring_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz;
    }

    pub fn spring_damping_ratio(&self) -> f32 {
        self.damping_ratio
    }

    pub fn set_spring_damping_ratio(&mut self, ratio: f32) {
        self.damping_ratio = ratio;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * (self.impulse * self.ay + self.spring_impulse * self.ax)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
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

        let q_a = Rot::new(a_a);
        let r_a = a.arm(q_a, self.local_anchor_a);
        let r_b = b.arm(Rot::new(a_b), self.local_anchor_b);
        let d = c_b + r_b - c_a - r_a;

        // Point to line.
        self.ay = q_a.apply(self.local_y_axis_a);
        self.s_ay = cross(d + r_a, self.ay);
        self.s_by = cross(r_b, self.ay);

        self.mass = m_a + m_b + i_a * self.s_ay * self.s_ay + i_b * self.s_by * self.s_by;
        if self.mass > 0.0 {
            self.mass = 1.0 / self.mass;
        }

        // Suspension spring.
        self.ax = q_a.apply(self.local_x_axis_a);
        self.s_ax = cross(d + r_a, self.ax);
        self.s_bx = cross(r_b, self.ax);

        self.spring_mass = 0.0;
        self.bias = 0.0;
        self.gamma = 0.0;
        if self.frequency_hz > 0.0 {
            let inv_mass = m_a + m_b + i_a * self.s_ax * self.s_ax + i_b * self.s_bx * self.s_bx;
            if inv_mass > 0.0 {
                let c = d.dot(self.ax);
                let (gamma, bias_factor) =
                    soft_constraint(1.0 / inv_mass, self.frequency_hz, self.damping_ratio, data.step.dt);
                self.gamma = gamma;
                self.bias = c * bias_factor;

                self.spring_mass = inv_mass + self.gamma;
                if self.spring_mass > 0.0 {
                    self.spring_mass = 1.0 / self.spring_mass;
                }
            }
        } else {
            self.spring_impulse = 0.0;
        }

        // Rotational motor.
        if self.enable_motor {
            self.motor_mass = i_a + i_b;
            if self.motor_mass > 0.0 {
                self.motor_mass = 1.0 / self.motor_mass;
            }
        } else {
            self.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.spring_impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = self.impulse * self.ay + self.spring_impulse * self.ax;
            let l_a = self.impulse * self.s_ay + self.spring_impulse * self.s_ax + self.motor_impulse;
            let l_b = self.impulse * self.s_by + self.spring_impulse * self.s_bx + self.motor_impulse;

            v_a -= m_a * p;
            w_a -= i_a * l_a;
            v_b += m_b * p;
            w_b += i_b * l_b;
        } else {
            self.impulse = 0.0;
            self.spring_impulse = 0.0;
            self.motor_impulse = 0.0;
        }

        data.velocities[a.index].v = v_a;
        data.velocities[a.index].w = w_a;
        data.velocities[b.index].v = v_b;
        data.velocities[b.index].w = w_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b) = (self.a, self.b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let mut v_a = data.velocities[a.index].v;
        let mut w_a = data.velocities[a.index].w;
        let mut v_b = data.velocities[b.index].v;
        let mut w_b = data.velocities[b.index].w;

        // Spring.
        {
            let cdot = self.ax.dot(v_b - v_a) + self.s_bx * w_b - self.s_ax * w_a;
            let impulse = -self.spring_mass * (cdot + self.bias + self.gamma * self.spring_impulse);
            self.spring_impulse += impulse;

            let p = impulse * self.ax;
            v_a -= m_a * p;
            w_a -= i_a * impulse * self.s_ax;
            v_b += m_b * p;
            w_b += i_b * impulse * self.s_bx;
        }

        // Motor.
        {
            let cdot = w_b - w_a - self.motor_speed;
            let mut impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Point to line.
        {
            let cdot = self.ay.dot(v_b - v_a) + self.s_by * w_b - self.s_ay * w_a;
            let impulse = -self.mass * cdot;
            self.impulse += impulse;

            let p = impulse * self.ay;
            v_a -= m_a * p;
            w_a -= i_a * impulse * self.s_ay;
            v_b += m_b * p;
            w_b += i_b * impulse * self.s_by;
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

        let q_a = Rot::new(a_a);
        let r_a = a.arm(q_a, self.local_anchor_a);
        let r_b = b.arm(Rot::new(a_b), self.local_anchor_b);
        let d = (c_b - c_a) + r_b - r_a;

        let ay = q_a.apply(self.local_y_axis_a);
        let s_ay = cross(d + r_a, ay);
        let s_by = cross(r_b, ay);

        let c = d.dot(ay);
        let k = m_a + m_b + i_a * s_ay * s_ay + i_b * s_by * s_by;
        let impulse = if k != 0.0 { -c / k } else { 0.0 };

        let p = impulse * ay;
        c_a -= m_a * p;
        a_a -= i_a * impulse * s_ay;
        c_b += m_b * p;
        a_b += i_b * impulse * s_by;

        data.positions[a.index].c = c_a;
        data.positions[a.index].a = a_a;
        data.positions[b.index].c = c_b;
        data.positions[b.index].a = a_b;

        c.abs() <= LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    fn wheel(joint: &Joint) -> &WheelJoint {
        match joint.kind() {
            JointKind::Wheel(j) => j,
            _ => unreachable!(),
        }
    }

    #[test]
    fn suspension_settles_at_spring_equilibrium() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = WheelJointDef::new(rig.handles[0], rig.handles[1])
            .initialize(rig.body(0), rig.body(1), Vec2::ZERO, Vec2::Y)
            .with_spring(2.0, 0.7);
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Wheel(WheelJoint::new(&def)));

        for _ in 0..300 {
            rig.solve(&mut joint, Vec2::new(0.0, -10.0));
        }

        // Unit mass: k = (2 pi f)^2, sag = g / k.
        let k = (2.0 * std::f32::consts::PI * 2.0_f32).powi(2);
        let translation = wheel(&joint).joint_translation(rig.body(0), rig.body(1));
        assert!((translation + 10.0 / k).abs() < 5e-3, "translation = {translation}");
        // The point-on-line constraint holds the lateral position.
        assert!(rig.body(1).position().x.abs() < LINEAR_SLOP);
    }

    #[test]
    fn motor_spins_wheel() {
        let mut rig = Rig::new(&[BodyDef::default(), BodyDef::dynamic()]);
        let def = WheelJointDef::new(rig.handles[0], rig.handles[1])
            .initialize(rig.body(0), rig.body(1), Vec2::ZERO, Vec2::Y)
            .with_motor(-4.0, 500.0);
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Wheel(WheelJoint::new(&def)));
        for _ in 0..4 {
            rig.solve(&mut joint, Vec2::ZERO);
        }
        let speed = wheel(&joint).joint_speed(rig.body(0), rig.body(1));
        assert!((speed + 4.0).abs() < 1e-3, "speed = {speed}");
        assert!(joint.reaction_torque(60.0).abs() <= 500.0 + 1e-3);
    }
}
