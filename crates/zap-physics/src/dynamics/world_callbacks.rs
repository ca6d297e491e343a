//! Hooks a user can install on the world: contact filtering, contact
//! events and implicit-destruction notices.

use crate::collision::manifold::Manifold;
use crate::common::settings::MAX_MANIFOLD_POINTS;
use crate::dynamics::contact::Contact;
use crate::dynamics::fixture::Fixture;
use crate::dynamics::{FixtureHandle, JointHandle};

/// Decides whether two fixtures may form a contact.
pub trait ContactFilter {
    /// Return `true` when contact calculations should run for this pair.
    /// The default honours collision groups first, then category/mask bits.
    fn should_collide(&mut self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        default_should_collide(fixture_a, fixture_b)
    }
}

/// Filter that applies only the fixture [`Filter`](crate::dynamics::fixture::Filter) data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {}

/// Shared groups always (positive) or never (negative) collide; otherwise
/// each fixture's category must be in the other's mask.
pub fn default_should_collide(fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
    let fa = fixture_a.filter_data();
    let fb = fixture_b.filter_data();

    if fa.group_index == fb.group_index && fa.group_index != 0 {
        return fa.group_index > 0;
    }

    (fa.mask_bits & fb.category_bits) != 0 && (fa.category_bits & fb.mask_bits) != 0
}

/// Impulses applied by the solver to one contact, reported after solving.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Contact events. Callbacks run inside `World::step`, so the world cannot
/// be modified from them; record what you need and act after the step.
pub trait ContactListener {
    /// Two fixtures began touching.
    fn begin_contact(&mut self, _contact: &mut Contact) {}

    /// Two fixtures stopped touching. Also called when a touching contact
    /// is destroyed.
    fn end_contact(&mut self, _contact: &mut Contact) {}

    /// Called after the manifold update and before solving, for touching
    /// non-sensor contacts. Disable the contact here to skip it for this
    /// step.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Solver impulses for a touching contact.
    fn post_solve(&mut self, _contact: &mut Contact, _impulse: &ContactImpulse) {}
}

/// Notified when destroying a body implicitly destroys its joints and
/// fixtures.
pub trait DestructionListener {
    fn joint_destroyed(&mut self, _joint: JointHandle) {}
    fn fixture_destroyed(&mut self, _fixture: FixtureHandle) {}
}
