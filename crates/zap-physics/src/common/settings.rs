//! Global tuning constants.
//!
//! Units are meters-kilograms-seconds. These values are tuned for moving
//! objects between 0.1 and 10 meters and static objects up to 50 meters.

use std::f32::consts::PI;

// ---------------------------------------------------------------------------
// Collision
// ---------------------------------------------------------------------------

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Fattening applied to broad-phase AABBs so proxies can move a little
/// without triggering a tree update.
pub const AABB_EXTENSION: f32 = 0.1;

/// Scales the predicted displacement when fattening a moving proxy.
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Collision and constraint tolerance.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular counterpart of [`LINEAR_SLOP`].
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Skin radius around polygons. Keeps polygons apart so TOI has room to work.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of sub-steps per contact in continuous physics.
pub const MAX_SUB_STEPS: u32 = 8;

// ---------------------------------------------------------------------------
// Dynamics
// ---------------------------------------------------------------------------

/// Maximum number of contacts handled by one TOI mini-island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Relative approach speed below which collisions are inelastic.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Largest linear position correction applied in one iteration.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Largest angular position correction applied in one iteration.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Largest translation of a body in one step.
pub const MAX_TRANSLATION: f32 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Largest rotation of a body in one step.
pub const MAX_ROTATION: f32 = 0.5 * PI;
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// Fraction of overlap resolved per position iteration.
pub const BAUMGARTE: f32 = 0.2;
pub const TOI_BAUMGARTE: f32 = 0.75;

// ---------------------------------------------------------------------------
// Sleep
// ---------------------------------------------------------------------------

/// Time a body must be still before it sleeps.
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Bodies slower than this are candidates for sleep.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Bodies spinning slower than this are candidates for sleep.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

/// Machine epsilon for `f32`.
pub const EPSILON: f32 = f32::EPSILON;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toi_target_exceeds_tolerance() {
        // The TOI target separation must stay above its tolerance band.
        let target = LINEAR_SLOP.max(2.0 * POLYGON_RADIUS - 3.0 * LINEAR_SLOP);
        assert!(target > 0.25 * LINEAR_SLOP);
    }

    #[test]
    fn squared_limits_match() {
        assert!((MAX_TRANSLATION_SQUARED - 4.0).abs() < 1e-6);
        assert!((MAX_ROTATION_SQUARED - MAX_ROTATION * MAX_ROTATION).abs() < 1e-6);
    }
}
