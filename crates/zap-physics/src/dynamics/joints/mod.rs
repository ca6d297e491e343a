//! Joint constraints. Every joint type follows the same contract:
//! `init_velocity_constraints` captures Jacobians and effective masses and
//! applies the warm-start impulse, `solve_velocity_constraints` runs one
//! sequential-impulse pass, and `solve_position_constraints` runs one
//! non-linear correction pass, returning whether the error is within the
//! slop.

pub mod area;
pub mod distance;
pub mod friction;
pub mod gear;
pub mod motor;
pub mod mouse;
pub mod prismatic;
pub mod pulley;
pub mod revolute;
pub mod rope;
pub mod weld;
pub mod wheel;

use glam::Vec2;

pub use area::{AreaJoint, AreaJointDef};
pub use distance::{DistanceJoint, DistanceJointDef};
pub use friction::{FrictionJoint, FrictionJointDef};
pub use gear::{GearJoint, GearJointDef};
pub use motor::{MotorJoint, MotorJointDef};
pub use mouse::{MouseJoint, MouseJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use pulley::{PulleyJoint, PulleyJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use rope::{RopeJoint, RopeJointDef};
pub use weld::{WeldJoint, WeldJointDef};
pub use wheel::{WheelJoint, WheelJointDef};

use crate::common::math::Rot;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::SolverData;
use crate::dynamics::{BodyHandle, BodyMap, JointHandle};

/// Discriminant of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Distance,
    Revolute,
    Prismatic,
    Gear,
    Wheel,
    Weld,
    Rope,
    Motor,
    Mouse,
    Friction,
    Pulley,
    Area,
}

/// Which side of a limit a joint currently rests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower and upper limits are (nearly) equal.
    Equal,
}

/// Island-local body data captured when a joint initializes.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SolverBody {
    pub(crate) index: usize,
    pub(crate) local_center: Vec2,
    pub(crate) inv_mass: f32,
    pub(crate) inv_i: f32,
}

impl SolverBody {
    pub(crate) fn new(body: &Body) -> Self {
        Self {
            index: body.island_index,
            local_center: body.sweep.local_center,
            inv_mass: body.inv_mass,
            inv_i: body.inv_inertia,
        }
    }

    pub(crate) fn of(bodies: &BodyMap, handle: BodyHandle) -> Self {
        bodies.get(handle).map(Self::new).unwrap_or_default()
    }

    /// Anchor offset from the center of mass, rotated to world frame.
    pub(crate) fn arm(&self, q: Rot, local_anchor: Vec2) -> Vec2 {
        q.apply(local_anchor - self.local_center)
    }
}

/// Spring coefficients `(gamma, bias_factor)` for a soft constraint with
/// effective `mass`, natural frequency and damping ratio, over step `h`.
/// The bias factor multiplies the position error.
pub(crate) fn soft_constraint(mass: f32, frequency_hz: f32, damping_ratio: f32, h: f32) -> (f32, f32) {
    let omega = 2.0 * std::f32::consts::PI * frequency_hz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;

    let mut gamma = h * (d + h * k);
    if gamma != 0.0 {
        gamma = 1.0 / gamma;
    }
    (gamma, h * k * gamma)
}

/// Describes a joint before creation. Gear and area joints derive their
/// bodies from other joints or a body list.
#[derive(Debug, Clone, PartialEq)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Gear(GearJointDef),
    Wheel(WheelJointDef),
    Weld(WeldJointDef),
    Rope(RopeJointDef),
    Motor(MotorJointDef),
    Mouse(MouseJointDef),
    Friction(FrictionJointDef),
    Pulley(PulleyJointDef),
    Area(AreaJointDef),
}

macro_rules! joint_def_from {
    ($($variant:ident => $def:ty),* $(,)?) => {
        $(
            impl From<$def> for JointDef {
                fn from(def: $def) -> Self {
                    JointDef::$variant(def)
                }
            }
        )*
    };
}

joint_def_from! {
    Distance => DistanceJointDef,
    Revolute => RevoluteJointDef,
    Prismatic => PrismaticJointDef,
    Gear => GearJointDef,
    Wheel => WheelJointDef,
    Weld => WeldJointDef,
    Rope => RopeJointDef,
    Motor => MotorJointDef,
    Mouse => MouseJointDef,
    Friction => FrictionJointDef,
    Pulley => PulleyJointDef,
    Area => AreaJointDef,
}

impl JointDef {
    pub fn joint_type(&self) -> JointType {
        match self {
            JointDef::Distance(_) => JointType::Distance,
            JointDef::Revolute(_) => JointType::Revolute,
            JointDef::Prismatic(_) => JointType::Prismatic,
            JointDef::Gear(_) => JointType::Gear,
            JointDef::Wheel(_) => JointType::Wheel,
            JointDef::Weld(_) => JointType::Weld,
            JointDef::Rope(_) => JointType::Rope,
            JointDef::Motor(_) => JointType::Motor,
            JointDef::Mouse(_) => JointType::Mouse,
            JointDef::Friction(_) => JointType::Friction,
            JointDef::Pulley(_) => JointType::Pulley,
            JointDef::Area(_) => JointType::Area,
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(d) => d.collide_connected,
            JointDef::Revolute(d) => d.collide_connected,
            JointDef::Prismatic(d) => d.collide_connected,
            JointDef::Gear(d) => d.collide_connected,
            JointDef::Wheel(d) => d.collide_connected,
            JointDef::Weld(d) => d.collide_connected,
            JointDef::Rope(d) => d.collide_connected,
            JointDef::Motor(d) => d.collide_connected,
            JointDef::Mouse(d) => d.collide_connected,
            JointDef::Friction(d) => d.collide_connected,
            JointDef::Pulley(d) => d.collide_connected,
            JointDef::Area(d) => d.collide_connected,
        }
    }

    pub fn user_data(&self) -> u64 {
        match self {
            JointDef::Distance(d) => d.user_data,
            JointDef::Revolute(d) => d.user_data,
            JointDef::Prismatic(d) => d.user_data,
            JointDef::Gear(d) => d.user_data,
            JointDef::Wheel(d) => d.user_data,
            JointDef::Weld(d) => d.user_data,
            JointDef::Rope(d) => d.user_data,
            JointDef::Motor(d) => d.user_data,
            JointDef::Mouse(d) => d.user_data,
            JointDef::Friction(d) => d.user_data,
            JointDef::Pulley(d) => d.user_data,
            JointDef::Area(d) => d.user_data,
        }
    }

    /// The two attached bodies for joints that name them directly.
    pub(crate) fn direct_bodies(&self) -> Option<(BodyHandle, BodyHandle)> {
        match self {
            JointDef::Distance(d) => Some((d.body_a, d.body_b)),
            JointDef::Revolute(d) => Some((d.body_a, d.body_b)),
            JointDef::Prismatic(d) => Some((d.body_a, d.body_b)),
            JointDef::Wheel(d) => Some((d.body_a, d.body_b)),
            JointDef::Weld(d) => Some((d.body_a, d.body_b)),
            JointDef::Rope(d) => Some((d.body_a, d.body_b)),
            JointDef::Motor(d) => Some((d.body_a, d.body_b)),
            JointDef::Mouse(d) => Some((d.body_a, d.body_b)),
            JointDef::Friction(d) => Some((d.body_a, d.body_b)),
            JointDef::Pulley(d) => Some((d.body_a, d.body_b)),
            JointDef::Gear(_) | JointDef::Area(_) => None,
        }
    }
}

/// Joint-specific state.
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Gear(GearJoint),
    Wheel(WheelJoint),
    Weld(WeldJoint),
    Rope(RopeJoint),
    Motor(MotorJoint),
    Mouse(MouseJoint),
    Friction(FrictionJoint),
    Pulley(PulleyJoint),
    Area(AreaJoint),
}

/// A constraint between two bodies, owned by the world.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    /// Visited by the island search this step.
    pub(crate) island_flag: bool,
    pub user_data: u64,
    pub(crate) kind: JointKind,
}

impl Joint {
    pub(crate) fn new(
        body_a: BodyHandle,
        body_b: BodyHandle,
        collide_connected: bool,
        user_data: u64,
        kind: JointKind,
    ) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected,
            island_flag: false,
            user_data,
            kind,
        }
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Distance(_) => JointType::Distance,
            JointKind::Revolute(_) => JointType::Revolute,
            JointKind::Prismatic(_) => JointType::Prismatic,
            JointKind::Gear(_) => JointType::Gear,
            JointKind::Wheel(_) => JointType::Wheel,
            JointKind::Weld(_) => JointType::Weld,
            JointKind::Rope(_) => JointType::Rope,
            JointKind::Motor(_) => JointType::Motor,
            JointKind::Mouse(_) => JointType::Mouse,
            JointKind::Friction(_) => JointType::Friction,
            JointKind::Pulley(_) => JointType::Pulley,
            JointKind::Area(_) => JointType::Area,
        }
    }

    /// World anchor on body A.
    pub fn anchor_a(&self, body_a: &Body) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Revolute(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Prismatic(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Gear(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Wheel(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Weld(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Rope(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Motor(_) => body_a.position(),
            JointKind::Mouse(j) => j.target,
            JointKind::Friction(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Pulley(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Area(_) => body_a.world_center(),
        }
    }

    /// World anchor on body B.
    pub fn anchor_b(&self, body_b: &Body) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Revolute(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Prismatic(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Gear(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Wheel(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Weld(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Rope(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Motor(_) => body_b.position(),
            JointKind::Mouse(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Friction(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Pulley(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Area(_) => body_b.world_center(),
        }
    }

    /// Constraint force on body B at the anchor, in newtons.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.reaction_force(inv_dt),
            JointKind::Revolute(j) => j.reaction_force(inv_dt),
            JointKind::Prismatic(j) => j.reaction_force(inv_dt),
            JointKind::Gear(j) => j.reaction_force(inv_dt),
            JointKind::Wheel(j) => j.reaction_force(inv_dt),
            JointKind::Weld(j) => j.reaction_force(inv_dt),
            JointKind::Rope(j) => j.reaction_force(inv_dt),
            JointKind::Motor(j) => j.reaction_force(inv_dt),
            JointKind::Mouse(j) => j.reaction_force(inv_dt),
            JointKind::Friction(j) => j.reaction_force(inv_dt),
            JointKind::Pulley(j) => j.reaction_force(inv_dt),
            JointKind::Area(_) => Vec2::ZERO,
        }
    }

    /// Constraint torque on body B, in newton-meters.
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        match &self.kind {
            JointKind::Distance(_) | JointKind::Rope(_) | JointKind::Mouse(_) => 0.0,
            JointKind::Pulley(_) | JointKind::Area(_) => 0.0,
            JointKind::Revolute(j) => j.reaction_torque(inv_dt),
            JointKind::Prismatic(j) => j.reaction_torque(inv_dt),
            JointKind::Gear(j) => j.reaction_torque(inv_dt),
            JointKind::Wheel(j) => j.reaction_torque(inv_dt),
            JointKind::Weld(j) => j.reaction_torque(inv_dt),
            JointKind::Motor(j) => j.reaction_torque(inv_dt),
            JointKind::Friction(j) => j.reaction_torque(inv_dt),
        }
    }

    /// Bodies other than A and B whose island positions the joint reads.
    pub(crate) fn extra_bodies(&self) -> &[BodyHandle] {
        match &self.kind {
            JointKind::Gear(j) => &j.extra_bodies,
            JointKind::Area(j) => &j.bodies,
            _ => &[],
        }
    }

    /// Distance joints owned by an area joint.
    pub(crate) fn owned_joints(&self) -> &[JointHandle] {
        match &self.kind {
            JointKind::Area(j) => &j.joints,
            _ => &[],
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, bodies: &BodyMap, data: &mut SolverData) {
        let a = SolverBody::of(bodies, self.body_a);
        let b = SolverBody::of(bodies, self.body_b);
        match &mut self.kind {
            JointKind::Distance(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Revolute(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Prismatic(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Gear(j) => j.init_velocity_constraints(a, b, bodies, data),
            JointKind::Wheel(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Weld(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Rope(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Motor(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Mouse(j) => j.init_velocity_constraints(b, data),
            JointKind::Friction(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Pulley(j) => j.init_velocity_constraints(a, b, data),
            JointKind::Area(j) => j.init_velocity_constraints(bodies, data),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_velocity_constraints(data),
            JointKind::Revolute(j) => j.solve_velocity_constraints(data),
            JointKind::Prismatic(j) => j.solve_velocity_constraints(data),
            JointKind::Gear(j) => j.solve_velocity_constraints(data),
            JointKind::Wheel(j) => j.solve_velocity_constraints(data),
            JointKind::Weld(j) => j.solve_velocity_constraints(data),
            JointKind::Rope(j) => j.solve_velocity_constraints(data),
            JointKind::Motor(j) => j.solve_velocity_constraints(data),
            JointKind::Mouse(j) => j.solve_velocity_constraints(data),
            JointKind::Friction(j) => j.solve_velocity_constraints(data),
            JointKind::Pulley(j) => j.solve_velocity_constraints(data),
            JointKind::Area(j) => j.solve_velocity_constraints(data),
        }
    }

    /// Returns true when the position error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_position_constraints(data),
            JointKind::Revolute(j) => j.solve_position_constraints(data),
            JointKind::Prismatic(j) => j.solve_position_constraints(data),
            JointKind::Gear(j) => j.solve_position_constraints(data),
            JointKind::Wheel(j) => j.solve_position_constraints(data),
            JointKind::Weld(j) => j.solve_position_constraints(data),
            JointKind::Rope(j) => j.solve_position_constraints(data),
            JointKind::Motor(_) | JointKind::Mouse(_) | JointKind::Friction(_) => true,
            JointKind::Pulley(j) => j.solve_position_constraints(data),
            JointKind::Area(j) => j.solve_position_constraints(data),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A two-body island harness for exercising joints without a world.

    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::time_step::{Position, TimeStep, Velocity};

    pub(crate) struct Rig {
        pub bodies: BodyMap,
        pub handles: Vec<BodyHandle>,
        pub positions: Vec<Position>,
        pub velocities: Vec<Velocity>,
    }

    impl Rig {
        pub fn new(defs: &[BodyDef]) -> Self {
            let mut bodies = BodyMap::with_key();
            let mut handles = Vec::new();
            for (i, def) in defs.iter().enumerate() {
                let mut body = Body::new(def);
                body.island_index = i;
                if def.body_type == crate::dynamics::BodyType::Dynamic {
                    // Unit mass, unit inertia about the center.
                    body.inertia = 1.0;
                    body.inv_inertia = 1.0;
                }
                handles.push(bodies.insert(body));
            }
            let mut rig = Self {
                bodies,
                handles,
                positions: Vec::new(),
                velocities: Vec::new(),
            };
            rig.capture();
            rig
        }

        pub fn body(&self, i: usize) -> &Body {
            &self.bodies[self.handles[i]]
        }

        fn capture(&mut self) {
            self.positions = self
                .handles
                .iter()
                .map(|&h| Position {
                    c: self.bodies[h].sweep.c,
                    a: self.bodies[h].sweep.a,
                })
                .collect();
            self.velocities = self
                .handles
                .iter()
                .map(|&h| Velocity {
                    v: self.bodies[h].linear_velocity,
                    w: self.bodies[h].angular_velocity,
                })
                .collect();
        }

        pub fn step_data(&mut self) -> SolverData<'_> {
            SolverData {
                step: step(),
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            }
        }

        /// Run a full solver step for one joint: init, velocity passes,
        /// integrate, position passes. Writes the result back to the bodies.
        pub fn solve(&mut self, joint: &mut Joint, gravity: Vec2) {
            let h = step().dt;
            for (i, &handle) in self.handles.iter().enumerate() {
                let body = &self.bodies[handle];
                self.velocities[i].v += h * body.inv_mass * (body.mass * gravity);
            }
            {
                let bodies = &self.bodies;
                let mut data = SolverData {
                    step: step(),
                    positions: &mut self.positions,
                    velocities: &mut self.velocities,
                };
                joint.init_velocity_constraints(bodies, &mut data);
                for _ in 0..8 {
                    joint.solve_velocity_constraints(&mut data);
                }
                for i in 0..data.positions.len() {
                    data.positions[i].c += h * data.velocities[i].v;
                    data.positions[i].a += h * data.velocities[i].w;
                }
                for _ in 0..3 {
                    if joint.solve_position_constraints(&mut data) {
                        break;
                    }
                }
            }
            for (i, &handle) in self.handles.iter().enumerate() {
                let body = &mut self.bodies[handle];
                body.sweep.c = self.positions[i].c;
                body.sweep.a = self.positions[i].a;
                body.linear_velocity = self.velocities[i].v;
                body.angular_velocity = self.velocities[i].w;
                body.synchronize_transform();
            }
        }
    }

    pub(crate) fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }
}
