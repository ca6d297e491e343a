use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::shapes::MassData;
use crate::common::math::{cross, cross_sv, Rot, Sweep, Transform};
use crate::dynamics::{BodyHandle, ContactHandle, FixtureHandle, JointHandle};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The kind of rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Zero mass, zero velocity, moved only by the user.
    #[default]
    Static,
    /// Zero mass, velocity set by the user, moved by the solver.
    Kinematic,
    /// Positive mass, velocity determined by forces, moved by the solver.
    Dynamic,
}

/// Builder for describing a body before creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Vec2,
    /// World angle in radians.
    pub angle: f32,
    /// Linear velocity of the body origin.
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Set to false to keep this body awake forever.
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Fast body that should not tunnel through other dynamic bodies.
    pub bullet: bool,
    pub active: bool,
    pub gravity_scale: f32,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// Create a dynamic body description.
    pub fn dynamic() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            ..Default::default()
        }
    }

    /// Create a kinematic body description.
    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Default::default()
        }
    }

    /// Load a body description from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_position(mut self, pos: Vec2) -> Self {
        self.position = pos;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, vel: Vec2) -> Self {
        self.linear_velocity = vel;
        self
    }

    pub fn with_angular_velocity(mut self, w: f32) -> Self {
        self.angular_velocity = w;
        self
    }

    /// Velocity decay; higher values slow the body faster.
    pub fn with_linear_damping(mut self, damping: f32) -> Self {
        self.linear_damping = damping;
        self
    }

    pub fn with_angular_damping(mut self, damping: f32) -> Self {
        self.angular_damping = damping;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// Adjacency entry: a contact touching this body and the body on the other
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEdge {
    pub other: BodyHandle,
    pub contact: ContactHandle,
}

/// Adjacency entry: a joint attached to this body and the body on the
/// other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointEdge {
    pub other: BodyHandle,
    pub joint: JointHandle,
    pub collide_connected: bool,
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// A rigid body. Created and destroyed through the world; state that does
/// not affect the broad phase can be changed through `World::body_mut`.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,

    /// Body origin transform.
    pub(crate) xf: Transform,
    /// Swept motion for continuous collision.
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,

    pub(crate) sleep_time: f32,

    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) active: bool,
    pub(crate) fixed_rotation: bool,
    /// Visited by the island search this step.
    pub(crate) island_flag: bool,

    /// Position in the island being solved.
    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) joint_edges: Vec<JointEdge>,

    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        debug_assert!(def.position.is_finite());
        debug_assert!(def.angle.is_finite());
        debug_assert!(def.angular_damping >= 0.0 && def.linear_damping >= 0.0);

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };

        Self {
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            active: def.active,
            fixed_rotation: def.fixed_rotation,
            island_flag: false,
            island_index: 0,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    /// Ignored for static bodies. Wakes the body for non-zero velocities.
    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Apply a force at a world point. Off-center forces also produce torque.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        // Sleeping bodies ignore forces.
        if self.awake {
            self.force += force;
            self.torque += cross(point - self.sweep.c, force);
        }
    }

    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.force += force;
        }
    }

    pub fn apply_torque(&mut self, torque: f32, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.torque += torque;
        }
    }

    /// Apply an impulse at a world point; changes velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.linear_velocity += self.inv_mass * impulse;
            self.angular_velocity += self.inv_inertia * cross(point - self.sweep.c, impulse);
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.angular_velocity += self.inv_inertia * impulse;
        }
    }

    /// Total mass in kg.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.dot(self.sweep.local_center)
    }

    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            i: self.inertia(),
            center: self.sweep.local_center,
        }
    }

    /// Override the mass properties computed from fixtures. Only affects
    /// dynamic bodies; the next fixture change recomputes them.
    pub fn set_mass_data(&mut self, data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            return;
        }

        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;

        self.mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;

        if data.i > 0.0 && !self.fixed_rotation {
            self.inertia = data.i - self.mass * data.center.dot(data.center);
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        }

        // Move the center of mass, keeping the velocity of the new center.
        let old_center = self.sweep.c;
        self.sweep.local_center = data.center;
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }

    /// Recompute mass from the given fixture mass data (already summed
    /// per fixture). Static and kinematic bodies get zero mass.
    pub(crate) fn apply_fixture_mass(&mut self, fixtures: impl Iterator<Item = MassData>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        // Static and kinematic bodies have zero mass.
        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        // Accumulate mass over all fixtures.
        let mut local_center = Vec2::ZERO;
        for md in fixtures {
            if md.mass == 0.0 {
                continue;
            }
            self.mass += md.mass;
            local_center += md.mass * md.center;
            self.inertia += md.i;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            // Force all dynamic bodies to have a positive mass.
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.fixed_rotation {
            // Center the inertia about the center of mass.
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Move the center of mass.
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.c0 = self.sweep.c;

        // Update the center of mass velocity.
        self.linear_velocity += cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_t(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.apply_t(world_vector)
    }

    /// Velocity of a world point attached to this body.
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping;
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping;
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    /// Bullets get continuous collision against dynamic bodies too.
    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    /// Disallowing sleep wakes the body.
    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.auto_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Putting a body to sleep clears its velocity and accumulated forces.
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            if !self.awake {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    /// At least one body must be dynamic, and a joint between them may
    /// disable collision.
    pub(crate) fn should_collide(&self, other_handle: BodyHandle, other: &Body) -> bool {
        if self.body_type != BodyType::Dynamic && other.body_type != BodyType::Dynamic {
            return false;
        }
        !self
            .joint_edges
            .iter()
            .any(|je| je.other == other_handle && !je.collide_connected)
    }

    /// Transform from the sweep's current pose.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::new(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Move the body to the sweep position at `alpha` and stop there.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.xf.q = Rot::new(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    pub(crate) fn remove_contact_edge(&mut self, contact: ContactHandle) {
        self.contact_edges.retain(|e| e.contact != contact);
    }

    pub(crate) fn remove_joint_edge(&mut self, joint: JointHandle) {
        self.joint_edges.retain(|e| e.joint != joint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dynamic_default_mass_is_one() {
        let body = Body::new(&BodyDef::dynamic());
        assert_eq!(body.mass(), 1.0);
        assert_eq!(body.inv_mass, 1.0);
        let fixed = Body::new(&BodyDef::default());
        assert_eq!(fixed.mass(), 0.0);
    }

    #[test]
    fn sleeping_clears_motion() {
        let mut body = Body::new(&BodyDef::dynamic().with_linear_velocity(Vec2::new(1.0, 2.0)));
        body.apply_force_to_center(Vec2::new(5.0, 0.0), true);
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.force, Vec2::ZERO);
    }

    #[test]
    fn forces_wake_sleeping_bodies() {
        let mut body = Body::new(&BodyDef::dynamic().with_awake(false));
        body.apply_force_to_center(Vec2::new(1.0, 0.0), false);
        assert_eq!(body.force, Vec2::ZERO, "asleep without wake ignores force");
        body.apply_force(Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), true);
        assert!(body.is_awake());
        assert_eq!(body.force, Vec2::new(1.0, 0.0));
        // Force above the center spins the body clockwise.
        assert_abs_diff_eq!(body.torque, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn static_bodies_ignore_velocity() {
        let mut body = Body::new(&BodyDef::default());
        body.set_linear_velocity(Vec2::new(3.0, 0.0));
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
    }

    #[test]
    fn fixture_mass_moves_center() {
        let mut body = Body::new(&BodyDef::dynamic().with_position(Vec2::new(1.0, 0.0)));
        let parts = [
            MassData {
                mass: 1.0,
                center: Vec2::new(-1.0, 0.0),
                i: 1.0 + 1.0,
            },
            MassData {
                mass: 3.0,
                center: Vec2::new(1.0, 0.0),
                i: 3.0 + 3.0,
            },
        ];
        body.apply_fixture_mass(parts.into_iter());
        assert_abs_diff_eq!(body.mass(), 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(body.local_center().x, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(body.world_center().x, 1.5, epsilon = 1e-6);
        // Origin inertia is preserved by the shift.
        assert_abs_diff_eq!(body.inertia(), 8.0, epsilon = 1e-5);
    }

    #[test]
    fn advance_snaps_to_sweep() {
        let mut body = Body::new(&BodyDef::dynamic());
        body.sweep.c = Vec2::new(2.0, 0.0);
        body.sweep.a = 1.0;
        body.advance(0.5);
        assert_abs_diff_eq!(body.position().x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(body.angle(), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(body.sweep.alpha0, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn body_def_from_json() {
        let def = BodyDef::from_json(r#"{ "body_type": "dynamic", "position": [1.0, 2.0], "bullet": true }"#)
            .expect("valid body json");
        assert_eq!(def.body_type, BodyType::Dynamic);
        assert_eq!(def.position, Vec2::new(1.0, 2.0));
        assert!(def.bullet);
        assert!(def.allow_sleep);
        assert_eq!(def.gravity_scale, 1.0);
    }
}
