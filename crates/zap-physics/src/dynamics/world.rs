//! The world owns every body, fixture, joint and contact and advances them
//! through time.
//!
//! A step runs the narrow phase over all contacts, builds islands of awake
//! bodies connected by touching contacts and joints, solves each island, and
//! finally resolves time-of-impact events so fast bodies do not tunnel.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::collision::distance::DistanceProxy;
use crate::collision::time_of_impact::{time_of_impact, ToiInput, ToiMetrics, ToiState};
use crate::common::math::{Sweep, Transform};
use crate::common::settings::{EPSILON, MAX_SUB_STEPS, MAX_TOI_CONTACTS};
use crate::common::timer::Timer;
use crate::dynamics::body::{Body, BodyDef, BodyType, JointEdge};
use crate::dynamics::contact::Contact;
use crate::dynamics::contact_manager::ContactManager;
use crate::dynamics::fixture::{Filter, Fixture, FixtureDef};
use crate::dynamics::island::{Island, IslandContext};
use crate::dynamics::joints::{
    AreaJoint, DistanceJoint, FrictionJoint, GearJoint, Joint, JointDef, JointKind, MotorJoint,
    MouseJoint, PrismaticJoint, PulleyJoint, RevoluteJoint, RopeJoint, WeldJoint, WheelJoint,
};
use crate::dynamics::time_step::{Profile, TimeStep};
use crate::dynamics::world_callbacks::{ContactFilter, ContactListener, DestructionListener};
use crate::dynamics::{
    BodyHandle, BodyMap, ContactHandle, FixtureHandle, FixtureMap, JointHandle, JointMap,
};
use crate::error::{WorldError, WorldResult};

/// Position iterations used to resolve a TOI sub-step.
const TOI_POSITION_ITERATIONS: u32 = 20;

/// World-wide settings. Loadable from JSON; missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldDef {
    pub gravity: Vec2,
    pub allow_sleep: bool,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    /// Stop after the first TOI event of each step (debugging aid).
    pub sub_stepping: bool,
    pub auto_clear_forces: bool,
}

impl Default for WorldDef {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
        }
    }
}

impl WorldDef {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_allow_sleep(mut self, flag: bool) -> Self {
        self.allow_sleep = flag;
        self
    }

    pub fn with_continuous_physics(mut self, flag: bool) -> Self {
        self.continuous_physics = flag;
        self
    }
}

/// A fixture hit by [`World::ray_cast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastHit {
    pub fixture: FixtureHandle,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along the ray, in `[0, 1]`.
    pub fraction: f32,
}

pub struct World {
    pub(crate) bodies: BodyMap,
    /// Body handles in creation order. Slot order stops matching it once
    /// slots are reused.
    pub(crate) body_order: Vec<BodyHandle>,
    pub(crate) fixtures: FixtureMap,
    pub(crate) joints: JointMap,
    pub(crate) contact_manager: ContactManager,
    destruction_listener: Option<Box<dyn DestructionListener>>,

    gravity: Vec2,
    allow_sleep: bool,
    warm_starting: bool,
    continuous_physics: bool,
    sub_stepping: bool,
    auto_clear_forces: bool,

    /// A fixture was added since the last step; search for new contacts.
    new_fixture: bool,
    locked: bool,
    /// False while a sub-stepped TOI pass is unfinished.
    step_complete: bool,
    /// Inverse of the previous step's dt, for warm-start scaling.
    inv_dt0: f32,

    island: Island,
    stack: Vec<BodyHandle>,
    seeds: Vec<BodyHandle>,

    profile: Profile,
    toi_metrics: ToiMetrics,
}

impl Default for World {
    fn default() -> Self {
        Self::from_def(&WorldDef::default())
    }
}

impl World {
    pub fn new(gravity: Vec2) -> Self {
        Self::from_def(&WorldDef::default().with_gravity(gravity))
    }

    pub fn from_def(def: &WorldDef) -> Self {
        log::debug!("world created, gravity {:?}", def.gravity);
        Self {
            bodies: BodyMap::with_key(),
            body_order: Vec::new(),
            fixtures: FixtureMap::with_key(),
            joints: JointMap::with_key(),
            contact_manager: ContactManager::new(),
            destruction_listener: None,
            gravity: def.gravity,
            allow_sleep: def.allow_sleep,
            warm_starting: def.warm_starting,
            continuous_physics: def.continuous_physics,
            sub_stepping: def.sub_stepping,
            auto_clear_forces: def.auto_clear_forces,
            new_fixture: false,
            locked: false,
            step_complete: true,
            inv_dt0: 0.0,
            island: Island::default(),
            stack: Vec::new(),
            seeds: Vec::new(),
            profile: Profile::default(),
            toi_metrics: ToiMetrics::default(),
        }
    }

    fn check_unlocked(&self) -> WorldResult<()> {
        if self.locked {
            Err(WorldError::Locked)
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn set_contact_filter(&mut self, filter: impl ContactFilter + 'static) {
        self.contact_manager.contact_filter = Some(Box::new(filter));
    }

    pub fn set_contact_listener(&mut self, listener: impl ContactListener + 'static) {
        self.contact_manager.contact_listener = Some(Box::new(listener));
    }

    pub fn set_destruction_listener(&mut self, listener: impl DestructionListener + 'static) {
        self.destruction_listener = Some(Box::new(listener));
    }

    // -----------------------------------------------------------------------
    // Bodies
    // -----------------------------------------------------------------------

    pub fn create_body(&mut self, def: &BodyDef) -> WorldResult<BodyHandle> {
        self.check_unlocked()?;
        let handle = self.bodies.insert(Body::new(def));
        self.body_order.push(handle);
        log::debug!("body created {:?} ({:?})", handle, def.body_type);
        Ok(handle)
    }

    /// Destroy a body with its fixtures, contacts and every joint attached
    /// to it. The destruction listener hears about the joints and fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> WorldResult<()> {
        self.check_unlocked()?;
        let body = self.bodies.get(handle).ok_or(WorldError::InvalidBody)?;

        // Joints attached directly, plus gear and area joints that read
        // this body as an extra member.
        let mut joints: Vec<JointHandle> = body.joint_edges.iter().map(|je| je.joint).collect();
        joints.extend(
            self.joints
                .iter()
                .filter(|(_, j)| j.extra_bodies().contains(&handle))
                .map(|(h, _)| h),
        );
        joints.dedup();
        for joint in joints {
            self.destroy_joint_tree(joint, true);
        }

        let contacts: Vec<ContactHandle> = self.bodies[handle].contact_edges.iter().map(|ce| ce.contact).collect();
        for contact in contacts {
            self.contact_manager.destroy(contact, &self.fixtures, &mut self.bodies);
        }

        let fixtures = std::mem::take(&mut self.bodies[handle].fixtures);
        for fixture_handle in fixtures {
            if let Some(listener) = self.destruction_listener.as_mut() {
                listener.fixture_destroyed(fixture_handle);
            }
            if let Some(mut fixture) = self.fixtures.remove(fixture_handle) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }

        self.bodies.remove(handle);
        self.body_order.retain(|&b| b != handle);
        log::debug!("body destroyed {:?}", handle);
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    /// Mutable access for velocities, forces and flags. Changes that touch
    /// the broad phase go through the world (`set_transform`,
    /// `set_body_active`, `set_body_type`).
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    /// Teleport a body. Contacts update on the next step.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f32) -> WorldResult<()> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(WorldError::InvalidBody)?;

        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;

        let xf = body.xf;
        for &fixture_handle in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }

        self.contact_manager.find_new_contacts(&self.fixtures, &mut self.bodies);
        Ok(())
    }

    /// Inactive bodies leave the broad phase and lose their contacts but
    /// keep their fixtures and joints.
    pub fn set_body_active(&mut self, handle: BodyHandle, flag: bool) -> WorldResult<()> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(WorldError::InvalidBody)?;
        if body.active == flag {
            return Ok(());
        }
        body.active = flag;

        if flag {
            let xf = body.xf;
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.create_proxies(fixture_handle, &mut self.contact_manager.broad_phase, &xf);
                }
            }
            // Contacts are created on the next step.
            self.new_fixture = true;
        } else {
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            self.destroy_body_contacts(handle);
        }
        Ok(())
    }

    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> WorldResult<()> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(WorldError::InvalidBody)?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        self.reset_mass_data(handle)?;

        let body = &mut self.bodies[handle];
        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            self.synchronize_fixtures(handle);
        }

        let body = &mut self.bodies[handle];
        body.set_awake(true);
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        self.destroy_body_contacts(handle);

        // Re-pair the proxies against everything they overlap.
        for &fixture_handle in &self.bodies[handle].fixtures {
            if let Some(fixture) = self.fixtures.get(fixture_handle) {
                fixture.touch_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, handle: BodyHandle, flag: bool) -> WorldResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(WorldError::InvalidBody)?;
        if body.fixed_rotation == flag {
            return Ok(());
        }
        body.fixed_rotation = flag;
        body.angular_velocity = 0.0;
        self.reset_mass_data(handle)
    }

    /// Recompute mass, center of mass and inertia from the fixtures.
    pub fn reset_mass_data(&mut self, handle: BodyHandle) -> WorldResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(WorldError::InvalidBody)?;
        let mass: Vec<_> = body
            .fixtures
            .iter()
            .filter_map(|&f| self.fixtures.get(f))
            .map(Fixture::mass_data)
            .collect();
        body.apply_fixture_mass(mass.into_iter());
        Ok(())
    }

    fn destroy_body_contacts(&mut self, handle: BodyHandle) {
        let contacts: Vec<ContactHandle> = self.bodies[handle].contact_edges.iter().map(|ce| ce.contact).collect();
        for contact in contacts {
            self.contact_manager.destroy(contact, &self.fixtures, &mut self.bodies);
        }
    }

    /// Move broad-phase proxies to cover the body's motion this step.
    fn synchronize_fixtures(&mut self, handle: BodyHandle) {
        let body = &self.bodies[handle];
        let xf1 = body.sweep.transform_at(0.0);
        let xf2 = body.xf;
        for &fixture_handle in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf1, &xf2);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    /// Attach a shape to a body. Mass is recomputed when the density is
    /// positive; contacts appear on the next step.
    pub fn create_fixture(&mut self, body_handle: BodyHandle, def: &FixtureDef) -> WorldResult<FixtureHandle> {
        self.check_unlocked()?;
        if !def.density.is_finite() || def.density < 0.0 {
            return Err(WorldError::InvalidShape(format!("density must be non-negative, got {}", def.density)));
        }
        let body = self.bodies.get_mut(body_handle).ok_or(WorldError::InvalidBody)?;

        let handle = self.fixtures.insert(Fixture::new(body_handle, def));
        if body.active {
            let xf = body.xf;
            self.fixtures[handle].create_proxies(handle, &mut self.contact_manager.broad_phase, &xf);
        }
        body.fixtures.push(handle);

        if def.density > 0.0 {
            self.reset_mass_data(body_handle)?;
        }

        self.new_fixture = true;
        log::debug!("fixture created {:?} on {:?}", handle, body_handle);
        Ok(handle)
    }

    /// Detach and destroy a fixture, its contacts and proxies. The body's
    /// mass is recomputed.
    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> WorldResult<()> {
        self.check_unlocked()?;
        let body_handle = self.fixtures.get(handle).ok_or(WorldError::InvalidFixture)?.body;

        let contacts: Vec<ContactHandle> = self.bodies[body_handle]
            .contact_edges
            .iter()
            .map(|ce| ce.contact)
            .filter(|&c| {
                self.contact_manager
                    .contacts
                    .get(c)
                    .is_some_and(|c| c.fixture_a == handle || c.fixture_b == handle)
            })
            .collect();
        for contact in contacts {
            self.contact_manager.destroy(contact, &self.fixtures, &mut self.bodies);
        }

        if let Some(mut fixture) = self.fixtures.remove(handle) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }
        self.bodies[body_handle].fixtures.retain(|&f| f != handle);
        self.reset_mass_data(body_handle)?;

        log::debug!("fixture destroyed {:?}", handle);
        Ok(())
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle)
    }

    /// Material changes only. Use the world for density, filter and sensor
    /// changes so contacts and mass stay consistent.
    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Option<&mut Fixture> {
        self.fixtures.get_mut(handle)
    }

    /// Replace the collision filter and re-filter existing contacts.
    pub fn set_filter_data(&mut self, handle: FixtureHandle, filter: Filter) -> WorldResult<()> {
        let fixture = self.fixtures.get_mut(handle).ok_or(WorldError::InvalidFixture)?;
        fixture.filter = filter;
        let body_handle = fixture.body;

        for ce in &self.bodies[body_handle].contact_edges {
            if let Some(contact) = self.contact_manager.contacts.get_mut(ce.contact) {
                if contact.fixture_a == handle || contact.fixture_b == handle {
                    contact.flag_for_filtering();
                }
            }
        }

        // New pairs may now be allowed.
        self.fixtures[handle].touch_proxies(&mut self.contact_manager.broad_phase);
        Ok(())
    }

    pub fn set_sensor(&mut self, handle: FixtureHandle, flag: bool) -> WorldResult<()> {
        let fixture = self.fixtures.get_mut(handle).ok_or(WorldError::InvalidFixture)?;
        if fixture.is_sensor != flag {
            fixture.is_sensor = flag;
            if let Some(body) = self.bodies.get_mut(fixture.body) {
                body.set_awake(true);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Joints
    // -----------------------------------------------------------------------

    /// Create a joint. Area joints also create the ring of distance joints
    /// they own.
    pub fn create_joint(&mut self, def: &JointDef) -> WorldResult<JointHandle> {
        self.check_unlocked()?;

        let collide_connected = def.collide_connected();
        let user_data = def.user_data();

        let (joint, ring) = match def {
            JointDef::Gear(d) => {
                let joint1 = self.joints.get(d.joint1).ok_or(WorldError::InvalidJoint)?;
                let joint2 = self.joints.get(d.joint2).ok_or(WorldError::InvalidJoint)?;
                let gear = GearJoint::new(d, joint1, joint2, &self.bodies)?;
                let joint = Joint::new(
                    joint1.body_b,
                    joint2.body_b,
                    collide_connected,
                    user_data,
                    JointKind::Gear(gear),
                );
                (joint, Vec::new())
            }
            JointDef::Area(d) => {
                let area = AreaJoint::new(d, &self.bodies)?;
                let ring = area.ring_defs(collide_connected);
                let joint = Joint::new(d.bodies[0], d.bodies[1], collide_connected, user_data, JointKind::Area(area));
                (joint, ring)
            }
            _ => {
                let (a, b) = def
                    .direct_bodies()
                    .ok_or_else(|| WorldError::InvalidJointDef("joint has no body pair".into()))?;
                if a == b {
                    return Err(WorldError::InvalidJointDef("joint bodies must differ".into()));
                }
                let body_b = self.bodies.get(b).ok_or(WorldError::InvalidBody)?;
                if !self.bodies.contains_key(a) {
                    return Err(WorldError::InvalidBody);
                }

                let kind = match def {
                    JointDef::Distance(d) => JointKind::Distance(DistanceJoint::new(d)),
                    JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
                    JointDef::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
                    JointDef::Wheel(d) => JointKind::Wheel(WheelJoint::new(d)),
                    JointDef::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
                    JointDef::Rope(d) => JointKind::Rope(RopeJoint::new(d)),
                    JointDef::Motor(d) => JointKind::Motor(MotorJoint::new(d)),
                    JointDef::Mouse(d) => JointKind::Mouse(MouseJoint::new(d, body_b)),
                    JointDef::Friction(d) => JointKind::Friction(FrictionJoint::new(d)),
                    JointDef::Pulley(d) => JointKind::Pulley(PulleyJoint::new(d)),
                    JointDef::Gear(_) | JointDef::Area(_) => {
                        return Err(WorldError::InvalidJointDef("joint has no body pair".into()))
                    }
                };
                (Joint::new(a, b, collide_connected, user_data, kind), Vec::new())
            }
        };

        // Ring joints first, so a bad ring leaves nothing behind.
        let mut owned = Vec::with_capacity(ring.len());
        for ring_def in ring {
            match self.create_joint(&JointDef::Distance(ring_def)) {
                Ok(h) => owned.push(h),
                Err(err) => {
                    for h in owned {
                        self.destroy_joint_tree(h, false);
                    }
                    return Err(err);
                }
            }
        }

        let handle = self.insert_joint(joint);
        if let Some(Joint {
            kind: JointKind::Area(area),
            ..
        }) = self.joints.get_mut(handle)
        {
            area.joints = owned;
        }

        log::debug!("joint created {:?} ({:?})", handle, def.joint_type());
        Ok(handle)
    }

    /// Link the joint into both bodies' edge lists.
    fn insert_joint(&mut self, joint: Joint) -> JointHandle {
        let (a, b, collide_connected) = (joint.body_a, joint.body_b, joint.collide_connected);
        let handle = self.joints.insert(joint);

        // Newest edges first, like contact edges.
        if let Some(body) = self.bodies.get_mut(a) {
            body.joint_edges.insert(
                0,
                JointEdge {
                    other: b,
                    joint: handle,
                    collide_connected,
                },
            );
        }
        if let Some(body) = self.bodies.get_mut(b) {
            body.joint_edges.insert(
                0,
                JointEdge {
                    other: a,
                    joint: handle,
                    collide_connected,
                },
            );
        }

        // Existing contacts between the two bodies may now be disallowed.
        if !collide_connected {
            self.flag_contacts_between(a, b);
        }
        handle
    }

    fn flag_contacts_between(&mut self, a: BodyHandle, b: BodyHandle) {
        let Some(body) = self.bodies.get(b) else {
            return;
        };
        for ce in body.contact_edges.iter().filter(|ce| ce.other == a) {
            if let Some(contact) = self.contact_manager.contacts.get_mut(ce.contact) {
                contact.flag_for_filtering();
            }
        }
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> WorldResult<()> {
        self.check_unlocked()?;
        if !self.joints.contains_key(handle) {
            return Err(WorldError::InvalidJoint);
        }
        self.destroy_joint_tree(handle, false);
        Ok(())
    }

    /// Remove a joint and any joints it owns. Returns false for a stale
    /// handle.
    fn destroy_joint_tree(&mut self, handle: JointHandle, notify: bool) -> bool {
        let Some(joint) = self.joints.remove(handle) else {
            return false;
        };
        if notify {
            if let Some(listener) = self.destruction_listener.as_mut() {
                listener.joint_destroyed(handle);
            }
        }

        for body_handle in [joint.body_a, joint.body_b].iter().chain(joint.extra_bodies()) {
            if let Some(body) = self.bodies.get_mut(*body_handle) {
                body.set_awake(true);
                body.remove_joint_edge(handle);
            }
        }

        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }

        for &owned in joint.owned_joints() {
            self.destroy_joint_tree(owned, notify);
        }

        log::debug!("joint destroyed {:?}", handle);
        true
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    /// Mutable joint access. Wakes the attached bodies so motor, target and
    /// limit changes take effect.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        let joint = self.joints.get(handle)?;
        for body_handle in [joint.body_a, joint.body_b].iter().chain(joint.extra_bodies()) {
            if let Some(body) = self.bodies.get_mut(*body_handle) {
                body.set_awake(true);
            }
        }
        self.joints.get_mut(handle)
    }

    pub fn joint_bodies(&self, handle: JointHandle) -> Option<(&Body, &Body)> {
        let joint = self.joints.get(handle)?;
        Some((self.bodies.get(joint.body_a)?, self.bodies.get(joint.body_b)?))
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter()
    }

    // -----------------------------------------------------------------------
    // Contacts
    // -----------------------------------------------------------------------

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> {
        self.contact_manager.contacts.iter()
    }

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contacts.get(handle)
    }

    /// For per-contact overrides such as friction or tangent speed.
    pub fn contact_mut(&mut self, handle: ContactHandle) -> Option<&mut Contact> {
        self.contact_manager.contacts.get_mut(handle)
    }

    /// Undo a friction override: mix the fixtures' values again. Returns
    /// false for a stale handle.
    pub fn reset_contact_friction(&mut self, handle: ContactHandle) -> bool {
        let Some(contact) = self.contact_manager.contacts.get_mut(handle) else {
            return false;
        };
        let (Some(fa), Some(fb)) = (self.fixtures.get(contact.fixture_a), self.fixtures.get(contact.fixture_b)) else {
            return false;
        };
        contact.reset_friction(fa, fb);
        true
    }

    /// Undo a restitution override. Returns false for a stale handle.
    pub fn reset_contact_restitution(&mut self, handle: ContactHandle) -> bool {
        let Some(contact) = self.contact_manager.contacts.get_mut(handle) else {
            return false;
        };
        let (Some(fa), Some(fb)) = (self.fixtures.get(contact.fixture_a), self.fixtures.get(contact.fixture_b)) else {
            return false;
        };
        contact.reset_restitution(fa, fb);
        true
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Advance the world by `dt` seconds.
    pub fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) {
        let step_timer = Timer::new();

        // New fixtures need contacts before the narrow phase runs.
        if self.new_fixture {
            self.contact_manager.find_new_contacts(&self.fixtures, &mut self.bodies);
            self.new_fixture = false;
        }

        self.locked = true;

        let step = TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.warm_starting,
        };

        let timer = Timer::new();
        self.contact_manager.collide(&self.fixtures, &mut self.bodies);
        self.profile.collide = timer.milliseconds();

        if self.step_complete && step.dt > 0.0 {
            let timer = Timer::new();
            self.solve(&step);
            self.profile.solve = timer.milliseconds();
        }

        if self.continuous_physics && step.dt > 0.0 {
            let timer = Timer::new();
            self.solve_toi(&step);
            self.profile.solve_toi = timer.milliseconds();
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.auto_clear_forces {
            self.clear_forces();
        }

        self.locked = false;
        self.profile.step = step_timer.milliseconds();
    }

    /// Build and solve islands, then update the broad phase.
    fn solve(&mut self, step: &TimeStep) {
        self.profile.solve_init = 0.0;
        self.profile.solve_velocity = 0.0;
        self.profile.solve_position = 0.0;

        self.island.reserve(
            self.bodies.len(),
            self.contact_manager.contacts.len(),
            self.joints.len(),
        );

        for body in self.bodies.values_mut() {
            body.island_flag = false;
        }
        for contact in self.contact_manager.contacts.values_mut() {
            contact.island_flag = false;
        }
        for joint in self.joints.values_mut() {
            joint.island_flag = false;
        }

        self.seeds.clear();
        // Newest bodies seed islands first.
        self.seeds.extend(self.body_order.iter().rev());
        self.stack.clear();
        self.stack.reserve(self.bodies.len());

        let mut island_count = 0usize;
        for i in 0..self.seeds.len() {
            let seed = self.seeds[i];
            let body = &mut self.bodies[seed];
            if body.island_flag || !body.awake || !body.active {
                continue;
            }
            // Statics only join islands through the bodies they touch.
            if body.body_type == BodyType::Static {
                continue;
            }

            self.island.clear();
            self.stack.push(seed);
            body.island_flag = true;

            // Depth-first search over the constraint graph.
            while let Some(handle) = self.stack.pop() {
                self.island.add_body(handle, &mut self.bodies);

                let body = &mut self.bodies[handle];
                body.set_awake(true);

                // Do not propagate islands across static bodies.
                if body.body_type == BodyType::Static {
                    continue;
                }

                self.flood_contacts(handle);
                self.flood_joints(handle);
            }

            let mut profile = Profile::default();
            self.island.solve(
                &mut profile,
                step,
                self.gravity,
                self.allow_sleep,
                IslandContext {
                    bodies: &mut self.bodies,
                    fixtures: &self.fixtures,
                    contacts: &mut self.contact_manager.contacts,
                    joints: &mut self.joints,
                    listener: &mut self.contact_manager.contact_listener,
                },
            );
            self.profile.solve_init += profile.solve_init;
            self.profile.solve_velocity += profile.solve_velocity;
            self.profile.solve_position += profile.solve_position;
            island_count += 1;

            // Static bodies may take part in other islands.
            for &handle in &self.island.bodies {
                let body = &mut self.bodies[handle];
                if body.body_type == BodyType::Static {
                    body.island_flag = false;
                }
            }
        }
        log::trace!("solved {} islands", island_count);

        let timer = Timer::new();
        for i in 0..self.seeds.len() {
            let handle = self.seeds[i];
            let body = &self.bodies[handle];
            // Only bodies that were in an island moved.
            if !body.island_flag || body.body_type == BodyType::Static {
                continue;
            }
            self.synchronize_fixtures(handle);
        }

        self.contact_manager.find_new_contacts(&self.fixtures, &mut self.bodies);
        self.profile.broadphase = timer.milliseconds();
    }

    /// Push enabled, touching, non-sensor contacts of `handle` and the
    /// bodies across them.
    fn flood_contacts(&mut self, handle: BodyHandle) {
        for i in 0..self.bodies[handle].contact_edges.len() {
            let edge = self.bodies[handle].contact_edges[i];
            let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) else {
                continue;
            };
            if contact.island_flag || !contact.enabled || !contact.touching {
                continue;
            }
            let sensor = self.fixtures.get(contact.fixture_a).is_some_and(|f| f.is_sensor)
                || self.fixtures.get(contact.fixture_b).is_some_and(|f| f.is_sensor);
            if sensor {
                continue;
            }

            contact.island_flag = true;
            self.island.add_contact(edge.contact);

            let other = &mut self.bodies[edge.other];
            if other.island_flag {
                continue;
            }
            other.island_flag = true;
            self.stack.push(edge.other);
        }
    }

    /// Push joints of `handle` whose other side is active, along with every
    /// body those joints read.
    fn flood_joints(&mut self, handle: BodyHandle) {
        for i in 0..self.bodies[handle].joint_edges.len() {
            let edge = self.bodies[handle].joint_edges[i];
            let Some(joint) = self.joints.get_mut(edge.joint) else {
                continue;
            };
            if joint.island_flag {
                continue;
            }
            if !self.bodies.get(edge.other).is_some_and(|b| b.active) {
                continue;
            }

            joint.island_flag = true;
            self.island.add_joint(edge.joint);

            let members = std::iter::once(edge.other).chain(joint.extra_bodies().iter().copied());
            for member in members {
                let Some(body) = self.bodies.get_mut(member) else {
                    continue;
                };
                if body.island_flag || !body.active {
                    continue;
                }
                body.island_flag = true;
                self.stack.push(member);
            }
        }
    }

    /// Find the earliest time of impact among candidate contacts, advance
    /// the pair there and solve a sub-step. Repeats until the step is
    /// consumed.
    fn solve_toi(&mut self, step: &TimeStep) {
        self.island.reserve(2 * MAX_TOI_CONTACTS, MAX_TOI_CONTACTS, 0);

        if self.step_complete {
            for body in self.bodies.values_mut() {
                body.island_flag = false;
                body.sweep.alpha0 = 0.0;
            }
            for contact in self.contact_manager.contacts.values_mut() {
                contact.toi_valid = false;
                contact.island_flag = false;
                contact.toi_count = 0;
                contact.toi = 1.0;
            }
        }

        loop {
            let Some((min_contact, min_alpha)) = self.find_min_toi() else {
                self.step_complete = true;
                break;
            };

            let Some(contact) = self.contact_manager.contacts.get(min_contact) else {
                self.step_complete = true;
                break;
            };
            let (handle_a, handle_b) = (contact.body_a, contact.body_b);

            let backup_a = self.bodies[handle_a].sweep;
            let backup_b = self.bodies[handle_b].sweep;
            self.bodies[handle_a].advance(min_alpha);
            self.bodies[handle_b].advance(min_alpha);

            // The TOI contact likely has new contact points.
            let (enabled, touching) = {
                let Some(contact) = self.contact_manager.contacts.get_mut(min_contact) else {
                    continue;
                };
                contact.update(&self.fixtures, &mut self.bodies, &mut self.contact_manager.contact_listener);
                contact.toi_valid = false;
                contact.toi_count += 1;
                if contact.toi_count > MAX_SUB_STEPS {
                    log::warn!("contact {:?} hit the sub-step cap", min_contact);
                }
                (contact.enabled, contact.touching)
            };
            log::trace!("toi event {:?} at alpha {}", min_contact, min_alpha);

            // Disabled or separated: restore the sweeps and look again.
            if !enabled || !touching {
                if let Some(contact) = self.contact_manager.contacts.get_mut(min_contact) {
                    contact.enabled = false;
                }
                restore_sweep(&mut self.bodies[handle_a], backup_a);
                restore_sweep(&mut self.bodies[handle_b], backup_b);
                continue;
            }

            self.bodies[handle_a].set_awake(true);
            self.bodies[handle_b].set_awake(true);

            self.island.clear();
            self.island.add_body(handle_a, &mut self.bodies);
            self.island.add_body(handle_b, &mut self.bodies);
            self.island.add_contact(min_contact);

            self.bodies[handle_a].island_flag = true;
            self.bodies[handle_b].island_flag = true;
            if let Some(contact) = self.contact_manager.contacts.get_mut(min_contact) {
                contact.island_flag = true;
            }

            for handle in [handle_a, handle_b] {
                if self.bodies[handle].body_type == BodyType::Dynamic {
                    self.gather_toi_contacts(handle, min_alpha);
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
                dt_ratio: 1.0,
                position_iterations: TOI_POSITION_ITERATIONS,
                velocity_iterations: step.velocity_iterations,
                warm_starting: false,
            };
            let toi_index_a = self.bodies[handle_a].island_index;
            let toi_index_b = self.bodies[handle_b].island_index;
            self.island.solve_toi(
                &sub_step,
                toi_index_a,
                toi_index_b,
                IslandContext {
                    bodies: &mut self.bodies,
                    fixtures: &self.fixtures,
                    contacts: &mut self.contact_manager.contacts,
                    joints: &mut self.joints,
                    listener: &mut self.contact_manager.contact_listener,
                },
            );

            // Reset island flags and move proxies of the displaced bodies.
            for i in 0..self.island.bodies.len() {
                let handle = self.island.bodies[i];
                let body = &mut self.bodies[handle];
                body.island_flag = false;
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                self.synchronize_fixtures(handle);

                // Every TOI touching this body is now stale.
                for ce in &self.bodies[handle].contact_edges {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(ce.contact) {
                        contact.toi_valid = false;
                        contact.island_flag = false;
                    }
                }
            }

            // New contacts from the moved proxies are found immediately so
            // the next TOI pass sees them.
            self.contact_manager.find_new_contacts(&self.fixtures, &mut self.bodies);

            if self.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
    }

    /// The contact with the smallest valid TOI, computing stale TOIs on the
    /// way. `None` when nothing impacts before the end of the step.
    fn find_min_toi(&mut self) -> Option<(ContactHandle, f32)> {
        let mut min_contact = None;
        let mut min_alpha = 1.0;

        for (handle, contact) in self.contact_manager.contacts.iter_mut() {
            if !contact.enabled {
                continue;
            }
            // Prevent excessive sub-stepping.
            if contact.toi_count > MAX_SUB_STEPS {
                continue;
            }

            let alpha = if contact.toi_valid {
                contact.toi
            } else {
                let (Some(fa), Some(fb)) = (self.fixtures.get(contact.fixture_a), self.fixtures.get(contact.fixture_b)) else {
                    continue;
                };
                if fa.is_sensor || fb.is_sensor {
                    continue;
                }

                let ba = &self.bodies[contact.body_a];
                let bb = &self.bodies[contact.body_b];
                let active_a = ba.awake && ba.body_type != BodyType::Static;
                let active_b = bb.awake && bb.body_type != BodyType::Static;
                // At least one body must be awake and moving.
                if !active_a && !active_b {
                    continue;
                }

                // Dynamic pairs are continuous only when one is a bullet.
                let collide_a = ba.bullet || ba.body_type != BodyType::Dynamic;
                let collide_b = bb.bullet || bb.body_type != BodyType::Dynamic;
                if !collide_a && !collide_b {
                    continue;
                }

                // Put the sweeps onto the same time interval.
                let alpha0 = align_sweeps(&mut self.bodies, contact.body_a, contact.body_b);
                debug_assert!(alpha0 < 1.0);

                let input = ToiInput {
                    proxy_a: DistanceProxy::new(fa.shape(), contact.child_a),
                    proxy_b: DistanceProxy::new(fb.shape(), contact.child_b),
                    sweep_a: self.bodies[contact.body_a].sweep,
                    sweep_b: self.bodies[contact.body_b].sweep,
                    t_max: 1.0,
                };
                let output = time_of_impact(&input, &mut self.toi_metrics);

                let alpha = match output.state {
                    ToiState::Touching => (alpha0 + (1.0 - alpha0) * output.t).min(1.0),
                    ToiState::Failed => {
                        log::warn!("time of impact failed for {:?}, best t {}", handle, output.t);
                        1.0
                    }
                    _ => 1.0,
                };

                contact.toi = alpha;
                contact.toi_valid = true;
                alpha
            };

            if alpha < min_alpha {
                min_contact = Some(handle);
                min_alpha = alpha;
            }
        }

        match min_contact {
            Some(handle) if min_alpha < 1.0 - 10.0 * EPSILON => Some((handle, min_alpha)),
            _ => None,
        }
    }

    /// Add contacts of a TOI body against static, kinematic and bullet
    /// bodies, tentatively advancing those bodies to the TOI.
    fn gather_toi_contacts(&mut self, handle: BodyHandle, min_alpha: f32) {
        let bullet = self.bodies[handle].bullet;

        for i in 0..self.bodies[handle].contact_edges.len() {
            if self.island.bodies.len() == 2 * MAX_TOI_CONTACTS {
                break;
            }
            if self.island.contacts.len() == MAX_TOI_CONTACTS {
                break;
            }

            let edge = self.bodies[handle].contact_edges[i];
            let Some(contact) = self.contact_manager.contacts.get(edge.contact) else {
                continue;
            };
            if contact.island_flag {
                continue;
            }

            let other = &self.bodies[edge.other];
            if other.body_type == BodyType::Dynamic && !bullet && !other.bullet {
                continue;
            }

            let sensor = self.fixtures.get(contact.fixture_a).is_some_and(|f| f.is_sensor)
                || self.fixtures.get(contact.fixture_b).is_some_and(|f| f.is_sensor);
            if sensor {
                continue;
            }

            let backup = other.sweep;
            if !other.island_flag {
                self.bodies[edge.other].advance(min_alpha);
            }

            let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) else {
                continue;
            };
            contact.update(&self.fixtures, &mut self.bodies, &mut self.contact_manager.contact_listener);

            if !contact.enabled || !contact.touching {
                restore_sweep(&mut self.bodies[edge.other], backup);
                continue;
            }

            contact.island_flag = true;
            self.island.add_contact(edge.contact);

            let other = &mut self.bodies[edge.other];
            if other.island_flag {
                continue;
            }
            other.island_flag = true;
            if other.body_type != BodyType::Static {
                other.set_awake(true);
            }
            self.island.add_body(edge.other, &mut self.bodies);
        }
    }

    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Report every fixture whose fat AABB overlaps `aabb`. Return false
    /// from the callback to stop early.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(FixtureHandle) -> bool) {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy| callback(broad_phase.user_data(proxy).fixture));
    }

    /// Cast a ray from `p1` to `p2`. The callback returns the new maximum
    /// fraction: `-1` ignores the fixture, `0` stops, the hit fraction
    /// clips to the closest hit and `1` continues unclipped.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2, mut callback: impl FnMut(&RayCastHit) -> f32) {
        let broad_phase = &self.contact_manager.broad_phase;
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        broad_phase.ray_cast(&input, |sub_input, proxy| {
            let child = broad_phase.user_data(proxy);
            let Some(fixture) = self.fixtures.get(child.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            match fixture.ray_cast(sub_input, &body.xf, child.child_index) {
                Some(output) => {
                    let fraction = output.fraction;
                    callback(&RayCastHit {
                        fixture: child.fixture,
                        point: (1.0 - fraction) * p1 + fraction * p2,
                        normal: output.normal,
                        fraction,
                    })
                }
                None => sub_input.max_fraction,
            }
        });
    }

    /// Move the world origin. Useful for large worlds: subtracts
    /// `new_origin` from every position.
    pub fn shift_origin(&mut self, new_origin: Vec2) -> WorldResult<()> {
        self.check_unlocked()?;

        for body in self.bodies.values_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }

        for joint in self.joints.values_mut() {
            match &mut joint.kind {
                JointKind::Mouse(j) => j.shift_origin(new_origin),
                JointKind::Pulley(j) => j.shift_origin(new_origin),
                _ => {}
            }
        }

        self.contact_manager.broad_phase.shift_origin(new_origin);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settings and statistics
    // -----------------------------------------------------------------------

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn allow_sleeping(&self) -> bool {
        self.allow_sleep
    }

    /// Disabling sleep wakes every body.
    pub fn set_allow_sleeping(&mut self, flag: bool) {
        if flag == self.allow_sleep {
            return;
        }
        self.allow_sleep = flag;
        if !flag {
            for body in self.bodies.values_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn warm_starting(&self) -> bool {
        self.warm_starting
    }

    pub fn set_warm_starting(&mut self, flag: bool) {
        self.warm_starting = flag;
    }

    pub fn continuous_physics(&self) -> bool {
        self.continuous_physics
    }

    pub fn set_continuous_physics(&mut self, flag: bool) {
        self.continuous_physics = flag;
    }

    pub fn sub_stepping(&self) -> bool {
        self.sub_stepping
    }

    pub fn set_sub_stepping(&mut self, flag: bool) {
        self.sub_stepping = flag;
    }

    pub fn auto_clear_forces(&self) -> bool {
        self.auto_clear_forces
    }

    pub fn set_auto_clear_forces(&mut self, flag: bool) {
        self.auto_clear_forces = flag;
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree_balance()
    }

    /// Sum of node perimeters over the root perimeter; lower is better.
    pub fn tree_quality(&self) -> f32 {
        self.contact_manager.broad_phase.tree_quality()
    }

    /// Timings of the last step.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Accumulated TOI and GJK counters since the world was created.
    pub fn toi_metrics(&self) -> &ToiMetrics {
        &self.toi_metrics
    }

    pub fn reset_toi_metrics(&mut self) {
        self.toi_metrics.reset();
    }
}

/// Advance whichever sweep lags so both start at the same `alpha0`, and
/// return it.
fn align_sweeps(bodies: &mut BodyMap, a: BodyHandle, b: BodyHandle) -> f32 {
    let alpha_a = bodies[a].sweep.alpha0;
    let alpha_b = bodies[b].sweep.alpha0;
    if alpha_a < alpha_b {
        bodies[a].sweep.advance(alpha_b);
        alpha_b
    } else if alpha_b < alpha_a {
        bodies[b].sweep.advance(alpha_a);
        alpha_a
    } else {
        alpha_a
    }
}

fn restore_sweep(body: &mut Body, sweep: Sweep) {
    body.sweep = sweep;
    body.synchronize_transform();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, EdgeShape, PolygonShape};
    use crate::dynamics::joints::{
        AreaJointDef, DistanceJointDef, GearJointDef, PrismaticJointDef, RevoluteJointDef,
    };
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ground(world: &mut World) -> BodyHandle {
        let ground = world.create_body(&BodyDef::default()).unwrap();
        world
            .create_fixture(
                ground,
                &FixtureDef::new(EdgeShape::new(Vec2::new(-40.0, 0.0), Vec2::new(40.0, 0.0))),
            )
            .unwrap();
        ground
    }

    fn ball(world: &mut World, position: Vec2) -> BodyHandle {
        let body = world.create_body(&BodyDef::dynamic().with_position(position)).unwrap();
        world
            .create_fixture(body, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))
            .unwrap();
        body
    }

    #[derive(Default)]
    struct Goodbyes {
        joints: Vec<JointHandle>,
        fixtures: Vec<FixtureHandle>,
    }

    struct Recorder(Rc<RefCell<Goodbyes>>);

    impl DestructionListener for Recorder {
        fn joint_destroyed(&mut self, joint: JointHandle) {
            self.0.borrow_mut().joints.push(joint);
        }
        fn fixture_destroyed(&mut self, fixture: FixtureHandle) {
            self.0.borrow_mut().fixtures.push(fixture);
        }
    }

    #[test]
    fn world_def_loads_from_json() {
        let def = WorldDef::from_json(r#"{ "gravity": [0.0, -9.8], "allow_sleep": false }"#).unwrap();
        assert_eq!(def.gravity, Vec2::new(0.0, -9.8));
        assert!(!def.allow_sleep);
        assert!(def.warm_starting);
        let world = World::from_def(&def);
        assert!(!world.allow_sleeping());
    }

    #[test]
    fn locked_world_rejects_structural_changes() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        world.locked = true;
        assert_eq!(world.create_body(&BodyDef::default()), Err(WorldError::Locked));
        assert_eq!(world.destroy_body(body), Err(WorldError::Locked));
        assert_eq!(
            world.create_fixture(body, &FixtureDef::new(CircleShape::new(1.0))),
            Err(WorldError::Locked)
        );
        world.locked = false;
        assert!(world.destroy_body(body).is_ok());
        assert_eq!(world.destroy_body(body), Err(WorldError::InvalidBody));
    }

    #[test]
    fn fixture_density_sets_mass() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        let fixture = world
            .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(1.0, 1.0)).with_density(2.0))
            .unwrap();
        assert_abs_diff_eq!(world.body(body).unwrap().mass(), 8.0, epsilon = 1e-5);
        assert_eq!(world.proxy_count(), 1);

        world.destroy_fixture(fixture).unwrap();
        // Dynamic bodies never drop below unit mass.
        assert_eq!(world.body(body).unwrap().mass(), 1.0);
        assert_eq!(world.proxy_count(), 0);
    }

    #[test]
    fn contacts_appear_after_a_step() {
        let mut world = World::default();
        ground(&mut world);
        ball(&mut world, Vec2::new(0.0, 0.45));
        assert_eq!(world.contact_count(), 0);
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.contact_count(), 1);
        assert!(world.contacts().all(|(_, c)| c.is_touching()));
    }

    #[test]
    fn destroying_a_body_reports_implicit_destruction() {
        let mut world = World::new(Vec2::ZERO);
        let log = Rc::new(RefCell::new(Goodbyes::default()));
        world.set_destruction_listener(Recorder(log.clone()));

        let a = ball(&mut world, Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(2.0, 0.0));
        let joint = world
            .create_joint(&DistanceJointDef::new(a, b).with_length(2.0).into())
            .unwrap();
        let fixture = world.body(a).unwrap().fixtures()[0];

        world.destroy_body(a).unwrap();
        assert_eq!(log.borrow().joints, vec![joint]);
        assert_eq!(log.borrow().fixtures, vec![fixture]);
        assert_eq!(world.joint_count(), 0);
        assert!(world.body(b).unwrap().joint_edges().is_empty());
    }

    #[test]
    fn explicit_joint_destruction_is_silent() {
        let mut world = World::new(Vec2::ZERO);
        let log = Rc::new(RefCell::new(Goodbyes::default()));
        world.set_destruction_listener(Recorder(log.clone()));
        let a = ball(&mut world, Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(2.0, 0.0));
        let joint = world.create_joint(&DistanceJointDef::new(a, b).into()).unwrap();

        world.destroy_joint(joint).unwrap();
        assert!(log.borrow().joints.is_empty());
        assert_eq!(world.destroy_joint(joint), Err(WorldError::InvalidJoint));
    }

    #[test]
    fn joint_on_one_body_is_rejected() {
        let mut world = World::new(Vec2::ZERO);
        let a = ball(&mut world, Vec2::ZERO);
        assert!(matches!(
            world.create_joint(&RevoluteJointDef::new(a, a).into()),
            Err(WorldError::InvalidJointDef(_))
        ));
    }

    #[test]
    fn joint_without_collide_connected_drops_contact() {
        let mut world = World::new(Vec2::ZERO);
        let a = ball(&mut world, Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(0.9, 0.0));
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.contact_count(), 1);

        world.create_joint(&DistanceJointDef::new(a, b).with_length(0.9).into()).unwrap();
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn area_joint_owns_its_ring() {
        let mut world = World::new(Vec2::ZERO);
        let bodies: Vec<_> = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]
            .iter()
            .map(|&(x, y)| ball(&mut world, Vec2::new(x, y)))
            .collect();
        let area = world
            .create_joint(&AreaJointDef::new(bodies.clone()).with_spring(5.0, 0.5).into())
            .unwrap();
        assert_eq!(world.joint_count(), 5);

        world.destroy_joint(area).unwrap();
        assert_eq!(world.joint_count(), 0);
        assert!(bodies.iter().all(|&b| world.body(b).unwrap().joint_edges().is_empty()));
    }

    #[test]
    fn gear_joint_takes_bodies_from_coupled_joints() {
        let mut world = World::new(Vec2::ZERO);
        let ground = world.create_body(&BodyDef::default()).unwrap();
        let wheel = ball(&mut world, Vec2::ZERO);
        let slider = ball(&mut world, Vec2::new(3.0, 0.0));

        let revolute = {
            let def = RevoluteJointDef::new(ground, wheel).initialize(
                world.body(ground).unwrap(),
                world.body(wheel).unwrap(),
                Vec2::ZERO,
            );
            world.create_joint(&def.into()).unwrap()
        };
        let prismatic = {
            let def = PrismaticJointDef::new(ground, slider).initialize(
                world.body(ground).unwrap(),
                world.body(slider).unwrap(),
                Vec2::new(3.0, 0.0),
                Vec2::X,
            );
            world.create_joint(&def.into()).unwrap()
        };
        let gear = world
            .create_joint(&GearJointDef::new(revolute, prismatic, 1.0).into())
            .unwrap();
        let joint = world.joint(gear).unwrap();
        assert_eq!(joint.body_a(), wheel);
        assert_eq!(joint.body_b(), slider);

        let bad = world.create_joint(&GearJointDef::new(gear, prismatic, 1.0).into());
        assert!(matches!(bad, Err(WorldError::InvalidJointDef(_))));
    }

    #[test]
    fn query_and_ray_cast_find_fixtures() {
        let mut world = World::new(Vec2::ZERO);
        let body = ball(&mut world, Vec2::new(5.0, 0.0));
        let fixture = world.body(body).unwrap().fixtures()[0];

        let mut found = Vec::new();
        world.query_aabb(&Aabb::new(Vec2::new(4.0, -1.0), Vec2::new(6.0, 1.0)), |f| {
            found.push(f);
            true
        });
        assert_eq!(found, vec![fixture]);

        let mut hits = Vec::new();
        world.ray_cast(Vec2::ZERO, Vec2::new(10.0, 0.0), |hit| {
            hits.push(*hit);
            hit.fraction
        });
        assert_eq!(hits.len(), 1);
        assert_abs_diff_eq!(hits[0].point.x, 4.5, epsilon = 1e-4);
        assert_abs_diff_eq!(hits[0].normal.x, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn shift_origin_moves_everything() {
        let mut world = World::new(Vec2::ZERO);
        let body = ball(&mut world, Vec2::new(10.0, 5.0));
        world.shift_origin(Vec2::new(10.0, 0.0)).unwrap();
        assert_abs_diff_eq!(world.body(body).unwrap().position().x, 0.0, epsilon = 1e-6);

        let mut found = false;
        world.query_aabb(&Aabb::new(Vec2::new(-0.1, 4.9), Vec2::new(0.1, 5.1)), |_| {
            found = true;
            false
        });
        assert!(found);
    }

    #[test]
    fn inactive_body_leaves_the_broad_phase() {
        let mut world = World::new(Vec2::ZERO);
        let a = ball(&mut world, Vec2::ZERO);
        ball(&mut world, Vec2::new(0.9, 0.0));
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.contact_count(), 1);

        world.set_body_active(a, false).unwrap();
        assert_eq!(world.contact_count(), 0);
        assert_eq!(world.proxy_count(), 1);

        world.set_body_active(a, true).unwrap();
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.contact_count(), 1);
    }

    #[test]
    fn static_body_type_change_stops_motion() {
        let mut world = World::default();
        let body = ball(&mut world, Vec2::new(0.0, 10.0));
        world.step(1.0 / 60.0, 8, 3);
        assert!(world.body(body).unwrap().linear_velocity().y < 0.0);

        world.set_body_type(body, BodyType::Static).unwrap();
        let y = world.body(body).unwrap().position().y;
        world.step(1.0 / 60.0, 8, 3);
        let body = world.body(body).unwrap();
        assert_eq!(body.mass(), 0.0);
        assert_eq!(body.position().y, y);
    }

    #[test]
    fn forces_clear_after_step() {
        let mut world = World::new(Vec2::ZERO);
        let body = ball(&mut world, Vec2::ZERO);
        world.body_mut(body).unwrap().apply_force_to_center(Vec2::new(60.0, 0.0), true);
        world.step(1.0 / 60.0, 8, 3);
        let b = world.body(body).unwrap();
        assert_eq!(b.force, Vec2::ZERO);
        assert!(b.linear_velocity().x > 0.0);
    }

    #[test]
    fn newest_contact_edge_comes_first() {
        let mut world = World::new(Vec2::ZERO);
        let middle = ball(&mut world, Vec2::ZERO);
        let left = ball(&mut world, Vec2::new(-0.9, 0.0));
        world.step(1.0 / 60.0, 8, 3);
        let right = ball(&mut world, Vec2::new(0.9, 0.0));
        world.step(1.0 / 60.0, 8, 3);

        let others: Vec<BodyHandle> = world.body(middle).unwrap().contact_edges().iter().map(|e| e.other).collect();
        assert_eq!(others, vec![right, left]);
    }

    #[test]
    fn newest_joint_edge_comes_first() {
        let mut world = World::new(Vec2::ZERO);
        let a = world.create_body(&BodyDef::default()).unwrap();
        let b = ball(&mut world, Vec2::new(0.0, 2.0));
        let c = ball(&mut world, Vec2::new(0.0, 4.0));
        let first = world.create_joint(&DistanceJointDef::new(a, b).into()).unwrap();
        let second = world.create_joint(&DistanceJointDef::new(b, c).into()).unwrap();

        let joints: Vec<JointHandle> = world.body(b).unwrap().joint_edges().iter().map(|e| e.joint).collect();
        assert_eq!(joints, vec![second, first]);
    }

    #[test]
    fn islands_are_seeded_newest_body_first() {
        let mut world = World::new(Vec2::ZERO);
        let a = ball(&mut world, Vec2::new(-10.0, 0.0));
        let b = ball(&mut world, Vec2::ZERO);
        let c = ball(&mut world, Vec2::new(10.0, 0.0));
        world.destroy_body(b).unwrap();
        // Takes the freed slot between a and c.
        let d = ball(&mut world, Vec2::new(20.0, 0.0));

        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.seeds, vec![d, c, a]);
    }

    #[test]
    fn sub_stepping_resolves_one_impact_per_step() {
        let mut world = World::new(Vec2::ZERO);
        world.set_sub_stepping(true);
        let wall = world.create_body(&BodyDef::default()).unwrap();
        world
            .create_fixture(wall, &FixtureDef::new(EdgeShape::new(Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0))))
            .unwrap();
        let ball = world
            .create_body(
                &BodyDef::dynamic()
                    .with_position(Vec2::new(-1.5, 0.0))
                    .with_linear_velocity(Vec2::new(119.0, 0.0)),
            )
            .unwrap();
        world
            .create_fixture(ball, &FixtureDef::new(CircleShape::new(0.1)).with_density(1.0))
            .unwrap();

        world.step(1.0 / 60.0, 8, 3);
        assert!(!world.step_complete);
        let toi_count = |world: &World| world.contacts().next().map_or(0, |(_, c)| c.toi_count);
        assert_eq!(toi_count(&world), 1);
        assert!(world.body(ball).unwrap().position().x < 0.0);

        // The unfinished step carries over until no impact remains.
        let mut steps = 0;
        while !world.step_complete {
            let before = toi_count(&world);
            world.step(1.0 / 60.0, 8, 3);
            assert!(toi_count(&world) <= before + 1);
            assert!(world.body(ball).unwrap().position().x < 0.0);
            steps += 1;
            assert!(steps <= MAX_SUB_STEPS + 1, "step never completed");
        }
    }

    #[test]
    fn contact_mixing_can_be_restored_after_an_override() {
        let mut world = World::new(Vec2::ZERO);
        let ground = world.create_body(&BodyDef::default()).unwrap();
        world
            .create_fixture(
                ground,
                &FixtureDef::new(EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)))
                    .with_friction(0.4)
                    .with_restitution(0.1),
            )
            .unwrap();
        let body = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 0.4))).unwrap();
        world
            .create_fixture(
                body,
                &FixtureDef::new(CircleShape::new(0.5))
                    .with_density(1.0)
                    .with_friction(0.9)
                    .with_restitution(0.3),
            )
            .unwrap();
        world.step(1.0 / 60.0, 8, 3);

        let handle = world.contacts().next().map(|(h, _)| h).unwrap();
        let contact = world.contact_mut(handle).unwrap();
        assert_abs_diff_eq!(contact.friction(), 0.6, epsilon = 1e-6);
        contact.set_friction(0.0);
        contact.set_restitution(0.0);

        assert!(world.reset_contact_friction(handle));
        assert!(world.reset_contact_restitution(handle));
        let contact = world.contact(handle).unwrap();
        assert_abs_diff_eq!(contact.friction(), 0.6, epsilon = 1e-6);
        assert_eq!(contact.restitution(), 0.3);

        world.destroy_body(body).unwrap();
        assert!(!world.reset_contact_friction(handle));
        assert!(!world.reset_contact_restitution(handle));
    }
}
