use glam::Vec2;

use crate::common::math::{cross, Rot};
use crate::common::settings::LINEAR_SLOP;
use crate::dynamics::joints::{Joint, JointKind, JointType, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::{BodyHandle, BodyMap, JointHandle};
use crate::error::{WorldError, WorldResult};

/// Couples two revolute or prismatic joints:
/// `coordinate1 + ratio * coordinate2 = constant`.
#[derive(Debug, Clone, PartialEq)]
pub struct GearJointDef {
    pub joint1: JointHandle,
    pub joint2: JointHandle,
    pub ratio: f32,
    pub collide_connected: bool,
    pub user_data: u64,
}

impl GearJointDef {
    pub fn new(joint1: JointHandle, joint2: JointHandle, ratio: f32) -> Self {
        Self {
            joint1,
            joint2,
            ratio,
            collide_connected: false,
            user_data: 0,
        }
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

/// Frame data pulled from one of the coupled joints.
#[derive(Debug, Clone, Copy)]
struct Coupling {
    kind: JointType,
    /// Ground-side body (the coupled joint's body A).
    ground: BodyHandle,
    /// Driven body (the coupled joint's body B).
    driven: BodyHandle,
    local_anchor_ground: Vec2,
    local_anchor_driven: Vec2,
    local_axis_ground: Vec2,
    reference_angle: f32,
}

impl Coupling {
    fn of(joint: &Joint) -> WorldResult<Self> {
        let (local_anchor_ground, local_anchor_driven, local_axis_ground, reference_angle) = match joint.kind() {
            JointKind::Revolute(j) => (j.local_anchor_a, j.local_anchor_b, Vec2::ZERO, j.reference_angle),
            JointKind::Prismatic(j) => (j.local_anchor_a, j.local_anchor_b, j.local_x_axis_a, j.reference_angle),
            _ => {
                return Err(WorldError::InvalidJointDef(format!(
                    "gear joints couple revolute or prismatic joints, got {:?}",
                    joint.joint_type()
                )))
            }
        };
        Ok(Self {
            kind: joint.joint_type(),
            ground: joint.body_a(),
            driven: joint.body_b(),
            local_anchor_ground,
            local_anchor_driven,
            local_axis_ground,
            reference_angle,
        })
    }

    /// Joint coordinate from body poses: an angle for revolute, a
    /// translation for prismatic. `(c, a)` are centers and angles.
    fn coordinate(&self, ground: (Vec2, f32, Vec2), driven: (Vec2, f32, Vec2)) -> f32 {
        let (c_g, a_g, lc_g) = ground;
        let (c_d, a_d, lc_d) = driven;
        match self.kind {
            JointType::Revolute => a_d - a_g - self.reference_angle,
            _ => {
                let (q_g, q_d) = (Rot::new(a_g), Rot::new(a_d));
                let p_g = self.local_anchor_ground - lc_g;
                let r_d = q_d.apply(self.local_anchor_driven - lc_d);
                let p_d = q_g.apply_t(r_d + (c_d - c_g));
                (p_d - p_g).dot(self.local_axis_ground)
            }
        }
    }
}

/// Jacobian rows for one side of the gear, already scaled by the ratio.
#[derive(Debug, Clone, Copy, Default)]
struct Side {
    jv: Vec2,
    jw_driven: f32,
    jw_ground: f32,
}

#[derive(Debug, Clone)]
pub struct GearJoint {
    joint1: JointHandle,
    joint2: JointHandle,
    /// Bodies C and D: the ground side of joint1 and joint2.
    pub(crate) extra_bodies: Vec<BodyHandle>,
    coupling1: Coupling,
    coupling2: Coupling,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    ratio: f32,
    constant: f32,
    impulse: f32,

    a: SolverBody,
    b: SolverBody,
    c: SolverBody,
    d: SolverBody,
    side1: Side,
    side2: Side,
    mass: f32,
}

impl GearJoint {
    /// Builds the gear from its two coupled joints. Body A is joint1's body
    /// B and body B is joint2's body B.
    pub(crate) fn new(def: &GearJointDef, joint1: &Joint, joint2: &Joint, bodies: &BodyMap) -> WorldResult<Self> {
        let coupling1 = Coupling::of(joint1)?;
        let coupling2 = Coupling::of(joint2)?;

        let pose = |handle: BodyHandle| -> WorldResult<(Vec2, f32, Vec2)> {
            let body = bodies.get(handle).ok_or(WorldError::InvalidBody)?;
            Ok((body.sweep.c, body.sweep.a, body.sweep.local_center))
        };

        let coordinate_a = coupling1.coordinate(pose(coupling1.ground)?, pose(coupling1.driven)?);
        let coordinate_b = coupling2.coordinate(pose(coupling2.ground)?, pose(coupling2.driven)?);

        Ok(Self {
            joint1: def.joint1,
            joint2: def.joint2,
            extra_bodies: vec![coupling1.ground, coupling2.ground],
            coupling1,
            coupling2,
            local_anchor_a: coupling1.local_anchor_driven,
            local_anchor_b: coupling2.local_anchor_driven,
            ratio: def.ratio,
            constant: coordinate_a + def.ratio * coordinate_b,
            impulse: 0.0,
            a: SolverBody::default(),
            b: SolverBody::default(),
            c: SolverBody::default(),
            d: SolverBody::default(),
            side1: Side::default(),
            side2: Side::default(),
            mass: 0.0,
        })
    }

    pub fn joint1(&self) -> JointHandle {
        self.joint1
    }

    pub fn joint2(&self) -> JointHandle {
        self.joint2
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        debug_assert!(ratio.is_finite());
        self.ratio = ratio;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * (self.impulse * self.side1.jv)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * (self.impulse * self.side1.jw_driven)
    }

    /// Jacobian and effective-mass contribution for one coupled joint.
    fn side(coupling: &Coupling, ratio: f32, driven: SolverBody, ground: SolverBody, a_d: f32, a_g: f32) -> (Side, f32) {
        match coupling.kind {
            JointType::Revolute => {
                let side = Side {
                    jv: Vec2::ZERO,
                    jw_driven: ratio,
                    jw_ground: ratio,
                };
                (side, ratio * ratio * (driven.inv_i + ground.inv_i))
            }
            _ => {
                let (q_d, q_g) = (Rot::new(a_d), Rot::new(a_g));
                let u = q_g.apply(coupling.local_axis_ground);
                let r_g = ground.arm(q_g, coupling.local_anchor_ground);
                let r_d = driven.arm(q_d, coupling.local_anchor_driven);
                let side = Side {
                    jv: ratio * u,
                    jw_driven: ratio * cross(r_d, u),
                    jw_ground: ratio * cross(r_g, u),
                };
                let mass = ratio * ratio * (ground.inv_mass + driven.inv_mass)
                    + ground.inv_i * side.jw_ground * side.jw_ground
                    + driven.inv_i * side.jw_driven * side.jw_driven;
                (side, mass)
            }
        }
    }

    fn apply_velocity(&self, impulse: f32, data: &mut SolverData) {
        let (s1, s2) = (self.side1, self.side2);
        data.velocities[self.a.index].v += (self.a.inv_mass * impulse) * s1.jv;
        data.velocities[self.a.index].w += self.a.inv_i * impulse * s1.jw_driven;
        data.velocities[self.b.index].v += (self.b.inv_mass * impulse) * s2.jv;
        data.velocities[self.b.index].w += self.b.inv_i * impulse * s2.jw_driven;
        data.velocities[self.c.index].v -= (self.c.inv_mass * impulse) * s1.jv;
        data.velocities[self.c.index].w -= self.c.inv_i * impulse * s1.jw_ground;
        data.velocities[self.d.index].v -= (self.d.inv_mass * impulse) * s2.jv;
        data.velocities[self.d.index].w -= self.d.inv_i * impulse * s2.jw_ground;
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        a: SolverBody,
        b: SolverBody,
        bodies: &BodyMap,
        data: &mut SolverData,
    ) {
        self.a = a;
        self.b = b;
        self.c = SolverBody::of(bodies, self.extra_bodies[0]);
        self.d = SolverBody::of(bodies, self.extra_bodies[1]);

        let angle = |body: SolverBody| data.positions[body.index].a;

        let (side1, mass1) = Self::side(&self.coupling1, 1.0, a, self.c, angle(a), angle(self.c));
        let (side2, mass2) = Self::side(&self.coupling2, self.ratio, b, self.d, angle(b), angle(self.d));
        self.side1 = side1;
        self.side2 = side2;

        let mass = mass1 + mass2;
        self.mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };

        if data.step.warm_starting {
            self.apply_velocity(self.impulse, data);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let v = |body: SolverBody| data.velocities[body.index];
        let (v_a, v_b, v_c, v_d) = (v(self.a), v(self.b), v(self.c), v(self.d));
        let (s1, s2) = (self.side1, self.side2);

        let cdot = s1.jv.dot(v_a.v - v_c.v)
            + s2.jv.dot(v_b.v - v_d.v)
            + (s1.jw_driven * v_a.w - s1.jw_ground * v_c.w)
            + (s2.jw_driven * v_b.w - s2.jw_ground * v_d.w);

        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply_velocity(impulse, data);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let pose = |body: SolverBody| {
            let p = data.positions[body.index];
            (p.c, p.a, body.local_center)
        };
        let (pa, pb, pc, pd) = (pose(self.a), pose(self.b), pose(self.c), pose(self.d));

        let coordinate_a = self.coupling1.coordinate(pc, pa);
        let coordinate_b = self.coupling2.coordinate(pd, pb);

        let (s1, mass1) = Self::side(&self.coupling1, 1.0, self.a, self.c, pa.1, pc.1);
        let (s2, mass2) = Self::side(&self.coupling2, self.ratio, self.b, self.d, pb.1, pd.1);
        let mass = mass1 + mass2;

        let c = coordinate_a + self.ratio * coordinate_b - self.constant;
        let impulse = if mass > 0.0 { -c / mass } else { 0.0 };

        let terms = [
            (self.a, s1.jv, s1.jw_driven, 1.0),
            (self.b, s2.jv, s2.jw_driven, 1.0),
            (self.c, s1.jv, s1.jw_ground, -1.0),
            (self.d, s2.jv, s2.jw_ground, -1.0),
        ];
        for (body, jv, jw, sign) in terms {
            let position = &mut data.positions[body.index];
            position.c += (sign * body.inv_mass * impulse) * jv;
            position.a += sign * body.inv_i * impulse * jw;
        }

        c.abs() < LINEAR_SLOP
    }
}
