//! Rigid bodies, contacts, joints and the world that steps them.

pub mod body;
pub mod contact;
pub mod contact_manager;
pub mod contact_solver;
pub mod dump;
pub mod fixture;
pub mod island;
pub mod joints;
pub mod time_step;
pub mod world;
pub mod world_callbacks;

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle to a body owned by a [`World`].
    pub struct BodyHandle;
    /// Stable handle to a fixture owned by a [`World`].
    pub struct FixtureHandle;
    /// Stable handle to a joint owned by a [`World`].
    pub struct JointHandle;
    /// Stable handle to a contact owned by the contact manager.
    pub struct ContactHandle;
}

pub(crate) type BodyMap = SlotMap<BodyHandle, body::Body>;
pub(crate) type FixtureMap = SlotMap<FixtureHandle, fixture::Fixture>;
pub(crate) type JointMap = SlotMap<JointHandle, joints::Joint>;
pub(crate) type ContactMap = SlotMap<ContactHandle, contact::Contact>;

pub use body::{Body, BodyDef, BodyType, ContactEdge, JointEdge};
pub use contact::Contact;
pub use fixture::{Filter, Fixture, FixtureDef};
pub use joints::{Joint, JointDef, JointKind};
pub use time_step::{Profile, TimeStep};
pub use world::{World, WorldDef};
pub use world_callbacks::{
    ContactFilter, ContactImpulse, ContactListener, DefaultContactFilter, DestructionListener,
};
