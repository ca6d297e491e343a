//! Island-based sequential-impulse 2D rigid-body physics with continuous
//! collision.

pub mod collision;
pub mod common;
pub mod dynamics;
pub mod error;

// Re-export key types at crate root for convenience
pub use collision::{Aabb, ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};
pub use common::{Rot, Sweep, Transform};
pub use dynamics::joints::{
    AreaJointDef, DistanceJointDef, FrictionJointDef, GearJointDef, JointType, MotorJointDef, MouseJointDef,
    PrismaticJointDef, PulleyJointDef, RevoluteJointDef, RopeJointDef, WeldJointDef, WheelJointDef,
};
pub use dynamics::world::RayCastHit;
pub use dynamics::{
    Body, BodyDef, BodyHandle, BodyType, Contact, ContactFilter, ContactHandle, ContactImpulse, ContactListener,
    DestructionListener, Filter, Fixture, FixtureDef, FixtureHandle, Joint, JointDef, JointHandle, JointKind,
    Profile, World, WorldDef,
};
pub use error::{WorldError, WorldResult};
