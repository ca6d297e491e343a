//! Owns the broad phase and the contact set. New pairs come from the broad
//! phase; `collide` refreshes manifolds and drops pairs whose fat AABBs no
//! longer overlap.

use crate::collision::broad_phase::BroadPhase;
use crate::dynamics::body::{BodyType, ContactEdge};
use crate::dynamics::contact::Contact;
use crate::dynamics::fixture::{Fixture, FixtureChild};
use crate::dynamics::world_callbacks::{default_should_collide, ContactFilter, ContactListener};
use crate::dynamics::{BodyMap, ContactHandle, ContactMap, FixtureMap};

pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<FixtureChild>,
    pub(crate) contacts: ContactMap,
    pub(crate) contact_filter: Option<Box<dyn ContactFilter>>,
    pub(crate) contact_listener: Option<Box<dyn ContactListener>>,
    new_pairs: Vec<(FixtureChild, FixtureChild)>,
    scratch: Vec<ContactHandle>,
}

impl Default for ContactManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactManager {
    pub fn new() -> Self {
        Self {
            broad_phase: BroadPhase::new(),
            contacts: ContactMap::with_key(),
            contact_filter: None,
            contact_listener: None,
            new_pairs: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    fn filter_allows(&mut self, fa: &Fixture, fb: &Fixture) -> bool {
        match self.contact_filter.as_mut() {
            Some(filter) => filter.should_collide(fa, fb),
            None => default_should_collide(fa, fb),
        }
    }

    /// Create contacts for pairs that started overlapping in the broad phase.
    pub(crate) fn find_new_contacts(&mut self, fixtures: &FixtureMap, bodies: &mut BodyMap) {
        let mut pairs = std::mem::take(&mut self.new_pairs);
        pairs.clear();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));

        for &(a, b) in &pairs {
            self.add_pair(a, b, fixtures, bodies);
        }
        self.new_pairs = pairs;
    }

    fn add_pair(&mut self, proxy_a: FixtureChild, proxy_b: FixtureChild, fixtures: &FixtureMap, bodies: &mut BodyMap) {
        let (Some(fa), Some(fb)) = (fixtures.get(proxy_a.fixture), fixtures.get(proxy_b.fixture)) else {
            return;
        };

        let body_a = fa.body();
        let body_b = fb.body();

        // Fixtures on the same body never collide.
        if body_a == body_b {
            return;
        }

        let (Some(ba), Some(bb)) = (bodies.get(body_a), bodies.get(body_b)) else {
            return;
        };

        // Already paired, in either order?
        let exists = bb.contact_edges.iter().filter(|e| e.other == body_a).any(|e| {
            self.contacts.get(e.contact).is_some_and(|c| {
                let forward = c.fixture_a == proxy_a.fixture
                    && c.fixture_b == proxy_b.fixture
                    && c.child_a == proxy_a.child_index
                    && c.child_b == proxy_b.child_index;
                let reverse = c.fixture_a == proxy_b.fixture
                    && c.fixture_b == proxy_a.fixture
                    && c.child_a == proxy_b.child_index
                    && c.child_b == proxy_a.child_index;
                forward || reverse
            })
        });
        if exists {
            return;
        }

        if !bb.should_collide(body_a, ba) {
            return;
        }

        if !self.filter_allows(fa, fb) {
            return;
        }

        let Some(contact) = Contact::create(
            proxy_a.fixture,
            fa,
            proxy_a.child_index,
            proxy_b.fixture,
            fb,
            proxy_b.child_index,
        ) else {
            return;
        };

        // The contact may have swapped its fixtures.
        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let handle = self.contacts.insert(contact);

        // Newest edges first; the island search walks them in this order.
        if let Some(body) = bodies.get_mut(body_a) {
            body.contact_edges.insert(
                0,
                ContactEdge {
                    other: body_b,
                    contact: handle,
                },
            );
        }
        if let Some(body) = bodies.get_mut(body_b) {
            body.contact_edges.insert(
                0,
                ContactEdge {
                    other: body_a,
                    contact: handle,
                },
            );
        }
        log::trace!("contact created {:?}", handle);
    }

    /// Remove a contact, firing `end_contact` if it was touching.
    pub(crate) fn destroy(&mut self, handle: ContactHandle, fixtures: &FixtureMap, bodies: &mut BodyMap) {
        let Some(mut contact) = self.contacts.remove(handle) else {
            return;
        };

        if contact.touching {
            if let Some(listener) = self.contact_listener.as_mut() {
                listener.end_contact(&mut contact);
            }
        }

        let sensor = fixtures.get(contact.fixture_a).is_some_and(|f| f.is_sensor())
            || fixtures.get(contact.fixture_b).is_some_and(|f| f.is_sensor());
        let wake = contact.manifold.point_count > 0 && !sensor;

        for body_handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_handle) {
                if wake {
                    body.set_awake(true);
                }
                body.remove_contact_edge(handle);
            }
        }
    }

    /// Narrow phase over every contact. Drops contacts that are filtered out
    /// or whose proxies stopped overlapping.
    pub(crate) fn collide(&mut self, fixtures: &FixtureMap, bodies: &mut BodyMap) {
        let mut handles = std::mem::take(&mut self.scratch);
        handles.clear();
        handles.extend(self.contacts.keys());

        for &handle in &handles {
            let Some(contact) = self.contacts.get(handle) else {
                continue;
            };
            let (Some(fa), Some(fb)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b)) else {
                continue;
            };
            let (body_a, body_b) = (contact.body_a, contact.body_b);
            let (Some(ba), Some(bb)) = (bodies.get(body_a), bodies.get(body_b)) else {
                continue;
            };

            if contact.filter_pending {
                if !bb.should_collide(body_a, ba) || !self.filter_allows(fa, fb) {
                    self.destroy(handle, fixtures, bodies);
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(handle) {
                    contact.filter_pending = false;
                }
            }

            let active_a = ba.awake && ba.body_type != BodyType::Static;
            let active_b = bb.awake && bb.body_type != BodyType::Static;

            // At least one body must be awake and movable.
            if !active_a && !active_b {
                continue;
            }

            let Some(contact) = self.contacts.get(handle) else {
                continue;
            };
            let overlap = match (fa.proxies.get(contact.child_a), fb.proxies.get(contact.child_b)) {
                (Some(pa), Some(pb)) => self.broad_phase.test_overlap(pa.proxy_id, pb.proxy_id),
                _ => false,
            };

            if !overlap {
                self.destroy(handle, fixtures, bodies);
                continue;
            }

            if let Some(contact) = self.contacts.get_mut(handle) {
                contact.update(fixtures, bodies, &mut self.contact_listener);
            }
        }

        self.scratch = handles;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape};
    use crate::dynamics::body::{Body, BodyDef};
    use crate::dynamics::fixture::FixtureDef;
    use crate::dynamics::FixtureHandle;
    use glam::Vec2;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Scene {
        bodies: BodyMap,
        fixtures: FixtureMap,
        manager: ContactManager,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: SlotMap::with_key(),
                fixtures: SlotMap::with_key(),
                manager: ContactManager::new(),
            }
        }

        fn add(&mut self, def: BodyDef, fixture: FixtureDef) -> FixtureHandle {
            let body = self.bodies.insert(Body::new(&def));
            let handle = self.fixtures.insert(Fixture::new(body, &fixture));
            let xf = self.bodies[body].xf;
            self.fixtures[handle].create_proxies(handle, &mut self.manager.broad_phase, &xf);
            self.bodies[body].fixtures.push(handle);
            handle
        }

        fn step(&mut self) {
            self.manager.find_new_contacts(&self.fixtures, &mut self.bodies);
            self.manager.collide(&self.fixtures, &mut self.bodies);
        }
    }

    #[derive(Default)]
    struct Events {
        begin: usize,
        end: usize,
    }

    struct Recorder(Rc<RefCell<Events>>);

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, _contact: &mut Contact) {
            self.0.borrow_mut().begin += 1;
        }

        fn end_contact(&mut self, _contact: &mut Contact) {
            self.0.borrow_mut().end += 1;
        }
    }

    #[test]
    fn overlapping_fixtures_create_one_contact() {
        let mut scene = Scene::new();
        scene.add(BodyDef::default(), FixtureDef::new(PolygonShape::new_box(5.0, 0.5)));
        let ball = scene.add(
            BodyDef::dynamic().with_position(Vec2::new(0.0, 0.9)),
            FixtureDef::new(CircleShape::new(0.5)),
        );
        scene.step();
        assert_eq!(scene.manager.contact_count(), 1);

        // Re-buffering the same proxy must not duplicate the contact.
        scene.fixtures[ball].touch_proxies(&mut scene.manager.broad_phase);
        scene.step();
        assert_eq!(scene.manager.contact_count(), 1);

        let body = scene.fixtures[ball].body();
        assert_eq!(scene.bodies[body].contact_edges().len(), 1);
    }

    #[test]
    fn static_pairs_are_rejected() {
        let mut scene = Scene::new();
        scene.add(BodyDef::default(), FixtureDef::new(CircleShape::new(1.0)));
        scene.add(BodyDef::default(), FixtureDef::new(CircleShape::new(1.0)));
        scene.step();
        assert_eq!(scene.manager.contact_count(), 0);
    }

    #[test]
    fn separated_contact_is_destroyed_with_events() {
        let events = Rc::new(RefCell::new(Events::default()));
        let mut scene = Scene::new();
        scene.manager.contact_listener = Some(Box::new(Recorder(events.clone())));

        scene.add(BodyDef::default(), FixtureDef::new(PolygonShape::new_box(5.0, 0.5)));
        let ball = scene.add(
            BodyDef::dynamic().with_position(Vec2::new(0.0, 0.9)),
            FixtureDef::new(CircleShape::new(0.5)),
        );
        scene.step();
        assert_eq!(events.borrow().begin, 1);

        // Teleport far away and resync the proxy.
        let body = scene.fixtures[ball].body();
        scene.bodies[body].xf.p = Vec2::new(0.0, 20.0);
        let xf = scene.bodies[body].xf;
        scene.fixtures[ball].synchronize(&mut scene.manager.broad_phase, &xf, &xf);
        scene.step();

        assert_eq!(scene.manager.contact_count(), 0);
        assert_eq!(events.borrow().end, 1);
        assert!(scene.bodies[body].contact_edges().is_empty());
    }

    #[test]
    fn negative_group_filters_pairs() {
        let mut scene = Scene::new();
        let filter = crate::dynamics::fixture::Filter {
            group_index: -1,
            ..Default::default()
        };
        scene.add(
            BodyDef::dynamic(),
            FixtureDef::new(CircleShape::new(1.0)).with_filter(filter),
        );
        scene.add(
            BodyDef::dynamic(),
            FixtureDef::new(CircleShape::new(1.0)).with_filter(filter),
        );
        scene.step();
        assert_eq!(scene.manager.contact_count(), 0);
    }
}
