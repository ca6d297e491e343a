use crate::collision::distance::test_overlap;
use crate::collision::manifold::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle,
    collide_polygons, Manifold, WorldManifold,
};
use crate::collision::shapes::{Shape, ShapeType};
use crate::common::math::Transform;
use crate::dynamics::fixture::Fixture;
use crate::dynamics::world_callbacks::ContactListener;
use crate::dynamics::{BodyHandle, BodyMap, FixtureHandle, FixtureMap};

/// Friction mixing: geometric mean, so a zero-friction surface slides on
/// anything.
pub fn mix_friction(friction1: f32, friction2: f32) -> f32 {
    (friction1 * friction2).sqrt()
}

/// Restitution mixing: the bouncier surface wins.
pub fn mix_restitution(restitution1: f32, restitution2: f32) -> f32 {
    restitution1.max(restitution2)
}

/// Shape pairs with a narrow-phase routine, in the order that routine
/// expects them.
fn is_primary_pair(a: ShapeType, b: ShapeType) -> bool {
    use ShapeType::*;
    matches!(
        (a, b),
        (Circle, Circle)
            | (Polygon, Circle)
            | (Polygon, Polygon)
            | (Edge, Circle)
            | (Edge, Polygon)
            | (Chain, Circle)
            | (Chain, Polygon)
    )
}

/// A potentially touching pair of fixture children. Exists while their
/// fat AABBs overlap.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,

    pub(crate) manifold: Manifold,

    /// Skin radii and body transforms of the last evaluation.
    radius_a: f32,
    radius_b: f32,
    xf_a: Transform,
    xf_b: Transform,

    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    pub(crate) filter_pending: bool,
    pub(crate) island_flag: bool,
    pub(crate) toi_valid: bool,
    pub(crate) toi: f32,
    pub(crate) toi_count: u32,
}

impl Contact {
    /// Build a contact for two fixture children, swapping them into the
    /// order the narrow phase expects. Returns `None` for pairs that never
    /// collide (edge or chain against edge or chain).
    pub(crate) fn create(
        fixture_a: FixtureHandle,
        fa: &Fixture,
        child_a: usize,
        fixture_b: FixtureHandle,
        fb: &Fixture,
        child_b: usize,
    ) -> Option<Self> {
        let type_a = fa.shape_type();
        let type_b = fb.shape_type();

        if is_primary_pair(type_a, type_b) {
            Some(Self::new(fixture_a, fa, child_a, fixture_b, fb, child_b))
        } else if is_primary_pair(type_b, type_a) {
            Some(Self::new(fixture_b, fb, child_b, fixture_a, fa, child_a))
        } else {
            None
        }
    }

    fn new(
        fixture_a: FixtureHandle,
        fa: &Fixture,
        child_a: usize,
        fixture_b: FixtureHandle,
        fb: &Fixture,
        child_b: usize,
    ) -> Self {
        Self {
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            body_a: fa.body(),
            body_b: fb.body(),
            manifold: Manifold::default(),
            radius_a: fa.shape().radius(),
            radius_b: fb.shape().radius(),
            xf_a: Transform::IDENTITY,
            xf_b: Transform::IDENTITY,
            friction: mix_friction(fa.friction(), fb.friction()),
            restitution: mix_restitution(fa.restitution(), fb.restitution()),
            tangent_speed: 0.0,
            touching: false,
            enabled: true,
            filter_pending: false,
            island_flag: false,
            toi_valid: false,
            toi: 0.0,
            toi_count: 0,
        }
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// The manifold in world space, using the transforms of the last update.
    pub fn world_manifold(&self) -> WorldManifold {
        WorldManifold::new(
            &self.manifold,
            &self.xf_a,
            self.radius_a,
            &self.xf_b,
            self.radius_b,
        )
    }

    /// Touching means the manifold has points (or, for sensors, the shapes
    /// overlap).
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Disable the contact for the current step. Only meaningful inside
    /// `pre_solve`; the flag is reset on every update.
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Override the mixed friction. Persists until the contact is destroyed.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    /// Surface speed along the tangent, for conveyor belts.
    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    pub(crate) fn reset_friction(&mut self, fa: &Fixture, fb: &Fixture) {
        self.friction = mix_friction(fa.friction(), fb.friction());
    }

    pub(crate) fn reset_restitution(&mut self, fa: &Fixture, fb: &Fixture) {
        self.restitution = mix_restitution(fa.restitution(), fb.restitution());
    }

    /// Flag for re-filtering on the next collide pass.
    pub(crate) fn flag_for_filtering(&mut self) {
        self.filter_pending = true;
    }

    /// Run the narrow phase for the ordered shape pair.
    fn evaluate(&self, shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> Manifold {
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
            (Shape::Chain(a), Shape::Circle(b)) => {
                let edge = a.child_edge(self.child_a);
                collide_edge_and_circle(&edge, xf_a, b, xf_b)
            }
            (Shape::Chain(a), Shape::Polygon(b)) => {
                let edge = a.child_edge(self.child_a);
                collide_edge_and_polygon(&edge, xf_a, b, xf_b)
            }
            _ => Manifold::default(),
        }
    }

    /// Refresh the manifold and touching state, carrying accumulated
    /// impulses over to matching points and firing listener events.
    pub(crate) fn update(
        &mut self,
        fixtures: &FixtureMap,
        bodies: &mut BodyMap,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        let (Some(fa), Some(fb)) = (fixtures.get(self.fixture_a), fixtures.get(self.fixture_b)) else {
            return;
        };
        let (Some(xf_a), Some(xf_b)) = (
            bodies.get(self.body_a).map(|b| b.xf),
            bodies.get(self.body_b).map(|b| b.xf),
        ) else {
            return;
        };

        let old_manifold = self.manifold;

        // Re-enable; the listener may disable it again in pre_solve.
        self.enabled = true;

        let was_touching = self.touching;
        let sensor = fa.is_sensor() || fb.is_sensor();

        self.xf_a = xf_a;
        self.xf_b = xf_b;

        let touching = if sensor {
            self.manifold.point_count = 0;
            test_overlap(fa.shape(), self.child_a, fb.shape(), self.child_b, &xf_a, &xf_b)
        } else {
            self.manifold = self.evaluate(fa.shape(), &xf_a, fb.shape(), &xf_b);
            let touching = self.manifold.point_count > 0;

            // Match new points to old ones by feature id for warm starting.
            for mp2 in self.manifold.points_mut() {
                mp2.normal_impulse = 0.0;
                mp2.tangent_impulse = 0.0;
                let key = mp2.id.key();
                if let Some(mp1) = old_manifold.points().iter().find(|mp1| mp1.id.key() == key) {
                    mp2.normal_impulse = mp1.normal_impulse;
                    mp2.tangent_impulse = mp1.tangent_impulse;
                }
            }

            if touching != was_touching {
                if let Some(body) = bodies.get_mut(self.body_a) {
                    body.set_awake(true);
                }
                if let Some(body) = bodies.get_mut(self.body_b) {
                    body.set_awake(true);
                }
            }
            touching
        };

        self.touching = touching;

        if let Some(listener) = listener.as_mut() {
            if !was_touching && touching {
                listener.begin_contact(self);
            }
            if was_touching && !touching {
                listener.end_contact(self);
            }
            if !sensor && touching {
                listener.pre_solve(self, &old_manifold);
            }
        }
    }
}
