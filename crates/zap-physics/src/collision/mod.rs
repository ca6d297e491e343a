//! Geometry, narrow phase, distance queries and the broad phase.

pub mod aabb;
pub mod broad_phase;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod shapes;
pub mod time_of_impact;

pub use aabb::{Aabb, RayCastInput, RayCastOutput};
pub use broad_phase::BroadPhase;
pub use distance::{
    distance, shape_cast, test_overlap, DistanceInput, DistanceOutput, DistanceProxy,
    ShapeCastInput, ShapeCastOutput, SimplexCache,
};
pub use dynamic_tree::{DynamicTree, ProxyId};
pub use manifold::{
    ContactFeature, FeatureType, Manifold, ManifoldPoint, ManifoldType, PointState, WorldManifold,
};
pub use shapes::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};
pub use time_of_impact::{time_of_impact, ToiInput, ToiMetrics, ToiOutput, ToiState};
