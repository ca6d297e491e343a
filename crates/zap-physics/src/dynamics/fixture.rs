use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::collision::broad_phase::BroadPhase;
use crate::collision::dynamic_tree::ProxyId;
use crate::collision::shapes::{MassData, Shape, ShapeType};
use crate::common::math::Transform;
use crate::dynamics::{BodyHandle, FixtureHandle};

/// Collision filtering data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Category bits this fixture belongs to.
    pub category_bits: u16,
    /// Categories this fixture accepts collisions with.
    pub mask_bits: u16,
    /// Non-zero groups override the bits: positive always collide,
    /// negative never collide.
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

/// Describes a fixture before it is attached to a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDef {
    pub shape: Shape,
    #[serde(default = "default_friction")]
    pub friction: f32,
    #[serde(default)]
    pub restitution: f32,
    /// kg/m^2
    #[serde(default)]
    pub density: f32,
    #[serde(default)]
    pub is_sensor: bool,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub user_data: u64,
}

fn default_friction() -> f32 {
    0.2
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            friction: default_friction(),
            restitution: 0.0,
            density: 0.0,
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Sensors detect overlap but produce no collision response.
    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// Broad-phase user data: one fixture child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureChild {
    pub fixture: FixtureHandle,
    pub child_index: usize,
}

/// Broad-phase registration of one shape child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureProxy {
    /// Swept AABB over the last step.
    pub aabb: Aabb,
    pub child_index: usize,
    pub proxy_id: ProxyId,
}

/// A shape attached to a body, with material and filtering data.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::with_capacity(def.shape.child_count()),
            user_data: def.user_data,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    /// Takes effect on the body's next mass reset.
    pub fn set_density(&mut self, density: f32) {
        debug_assert!(density.is_finite() && density >= 0.0);
        self.density = density;
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Existing contacts keep their mixed friction until recreated.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter_data(&self) -> &Filter {
        &self.filter
    }

    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    /// Tight AABB of child `child_index` as of the last synchronization.
    pub fn aabb(&self, child_index: usize) -> Option<&Aabb> {
        self.proxies.get(child_index).map(|p| &p.aabb)
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    /// Point containment, given the owning body's transform.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    pub(crate) fn create_proxies(
        &mut self,
        handle: FixtureHandle,
        broad_phase: &mut BroadPhase<FixtureChild>,
        xf: &Transform,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(
                &aabb,
                FixtureChild {
                    fixture: handle,
                    child_index,
                },
            );
            self.proxies.push(FixtureProxy {
                aabb,
                child_index,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<FixtureChild>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Move proxies to cover the motion from `xf1` to `xf2`.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<FixtureChild>,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        for proxy in self.proxies.iter_mut() {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = aabb1.combine(&aabb2);

            let displacement = xf2.p - xf1.p;
            broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<FixtureChild>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{ChainShape, CircleShape};
    use crate::dynamics::world_callbacks::default_should_collide;
    use slotmap::SlotMap;

    fn fixture_with(filter: Filter) -> Fixture {
        let mut bodies: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let body = bodies.insert(());
        Fixture::new(body, &FixtureDef::new(CircleShape::new(1.0)).with_filter(filter))
    }

    #[test]
    fn default_filter_collides() {
        let a = fixture_with(Filter::default());
        let b = fixture_with(Filter::default());
        assert!(default_should_collide(&a, &b));
    }

    #[test]
    fn negative_group_never_collides() {
        let f = Filter {
            group_index: -2,
            ..Default::default()
        };
        assert!(!default_should_collide(&fixture_with(f), &fixture_with(f)));
    }

    #[test]
    fn positive_group_overrides_mask() {
        let f = Filter {
            group_index: 3,
            mask_bits: 0,
            ..Default::default()
        };
        assert!(default_should_collide(&fixture_with(f), &fixture_with(f)));
    }

    #[test]
    fn mask_excludes_category() {
        let a = Filter {
            category_bits: 0x0002,
            ..Default::default()
        };
        let b = Filter {
            mask_bits: 0x0001,
            ..Default::default()
        };
        assert!(!default_should_collide(&fixture_with(a), &fixture_with(b)));
    }

    #[test]
    fn proxies_follow_children() {
        let mut bodies: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let mut fixtures: SlotMap<FixtureHandle, ()> = SlotMap::with_key();
        let body = bodies.insert(());
        let handle = fixtures.insert(());

        let chain = ChainShape::new_chain(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.5),
        ])
        .expect("valid chain");
        let mut fixture = Fixture::new(body, &FixtureDef::new(chain));
        let mut bp = BroadPhase::new();
        fixture.create_proxies(handle, &mut bp, &Transform::IDENTITY);
        assert_eq!(fixture.proxies().len(), 2);
        assert_eq!(bp.proxy_count(), 2);

        fixture.destroy_proxies(&mut bp);
        assert!(fixture.proxies().is_empty());
        assert_eq!(bp.proxy_count(), 0);
    }

    #[test]
    fn fixture_def_from_json() {
        let json = r#"{
            "shape": { "type": "circle", "radius": 0.5 },
            "density": 2.0,
            "filter": { "group_index": -1 }
        }"#;
        let def: FixtureDef = serde_json::from_str(json).expect("parse fixture");
        assert_eq!(def.density, 2.0);
        assert!((def.friction - 0.2).abs() < 1e-6);
        assert_eq!(def.filter.group_index, -1);
        assert_eq!(def.filter.mask_bits, 0xFFFF);
    }
}
