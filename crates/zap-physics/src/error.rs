//! Errors returned by world mutation.

use thiserror::Error;

/// Misuse of the world API. Numerical routines never fail; they degrade to
/// zero vectors or a `Failed` state instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// A structural change was requested while the world is stepping.
    #[error("world is locked during a time step")]
    Locked,

    #[error("body handle is stale or unknown")]
    InvalidBody,

    #[error("fixture handle is stale or unknown")]
    InvalidFixture,

    #[error("joint handle is stale or unknown")]
    InvalidJoint,

    /// The joint definition cannot be built (same body twice, gear joint
    /// referencing a joint of the wrong type, too few area bodies, ...).
    #[error("invalid joint definition: {0}")]
    InvalidJointDef(String),

    #[error("invalid shape: {0}")]
    InvalidShape(String),
}

pub type WorldResult<T> = Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_detail() {
        let err = WorldError::InvalidJointDef("gear needs revolute or prismatic".into());
        assert!(err.to_string().contains("gear needs revolute"));
        assert_eq!(WorldError::Locked.to_string(), "world is locked during a time step");
    }
}
