//! Text dump of a world for bug reports.
//!
//! Bodies and fixtures are written as the JSON definitions that recreate
//! them, in creation order. Joints are summarized as comments because their
//! definitions reference handles that do not survive a reload.

use std::fmt::{self, Write};

use slotmap::SecondaryMap;

use crate::dynamics::body::{Body, BodyDef};
use crate::dynamics::fixture::{Fixture, FixtureDef};
use crate::dynamics::world::World;
use crate::dynamics::BodyHandle;

fn body_def(body: &Body) -> BodyDef {
    BodyDef {
        body_type: body.body_type,
        position: body.xf.p,
        angle: body.sweep.a,
        linear_velocity: body.linear_velocity,
        angular_velocity: body.angular_velocity,
        linear_damping: body.linear_damping,
        angular_damping: body.angular_damping,
        allow_sleep: body.auto_sleep,
        awake: body.awake,
        fixed_rotation: body.fixed_rotation,
        bullet: body.bullet,
        active: body.active,
        gravity_scale: body.gravity_scale,
        user_data: body.user_data,
    }
}

fn fixture_def(fixture: &Fixture) -> FixtureDef {
    FixtureDef {
        shape: fixture.shape.clone(),
        friction: fixture.friction,
        restitution: fixture.restitution,
        density: fixture.density,
        is_sensor: fixture.is_sensor,
        filter: fixture.filter,
        user_data: fixture.user_data,
    }
}

fn json<T: serde::Serialize>(value: &T) -> Result<String, fmt::Error> {
    serde_json::to_string(value).map_err(|_| fmt::Error)
}

impl World {
    /// Write a script that rebuilds this world's bodies and fixtures.
    pub fn dump(&self, out: &mut impl Write) -> fmt::Result {
        if self.is_locked() {
            return Ok(());
        }

        let gravity = self.gravity();
        writeln!(out, "world.set_gravity(Vec2::new({:?}, {:?}));", gravity.x, gravity.y)?;
        writeln!(out, "// bodies: {}, joints: {}", self.bodies.len(), self.joints.len())?;

        let mut indexes: SecondaryMap<BodyHandle, usize> = SecondaryMap::new();
        let bodies = self.body_order.iter().filter_map(|&h| self.bodies.get(h).map(|b| (h, b)));
        for (i, (handle, body)) in bodies.enumerate() {
            indexes.insert(handle, i);
            writeln!(out, "bodies[{i}] = world.create_body(&BodyDef::from_json(r#\"{}\"#)?)?;", json(&body_def(body))?)?;
            for &fixture_handle in &body.fixtures {
                let Some(fixture) = self.fixtures.get(fixture_handle) else {
                    continue;
                };
                writeln!(
                    out,
                    "world.create_fixture(bodies[{i}], &serde_json::from_str(r#\"{}\"#)?)?;",
                    json(&fixture_def(fixture))?
                )?;
            }
        }

        for (i, (_, joint)) in self.joints.iter().enumerate() {
            let (Some(&a), Some(&b)) = (indexes.get(joint.body_a), indexes.get(joint.body_b)) else {
                continue;
            };
            let (body_a, body_b) = (&self.bodies[joint.body_a], &self.bodies[joint.body_b]);
            writeln!(
                out,
                "// joints[{i}]: {:?} bodies[{a}] bodies[{b}] collide_connected={} anchor_a={:?} anchor_b={:?}",
                joint.joint_type(),
                joint.collide_connected,
                joint.anchor_a(body_a),
                joint.anchor_b(body_b),
            )?;
        }
        Ok(())
    }

    /// [`dump`](Self::dump) through `log::info!`, one record per line.
    pub fn dump_to_log(&self) {
        let mut text = String::new();
        if self.dump(&mut text).is_err() {
            log::warn!("world dump failed");
            return;
        }
        for line in text.lines() {
            log::info!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape};
    use crate::dynamics::joints::RevoluteJointDef;
    use glam::Vec2;

    fn sample() -> World {
        let mut world = World::new(Vec2::new(0.0, -9.8));
        let ground = world.create_body(&BodyDef::default()).unwrap();
        world
            .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(10.0, 1.0)))
            .unwrap();
        let ball = world
            .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 4.0)).with_user_data(7))
            .unwrap();
        world
            .create_fixture(ball, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))
            .unwrap();
        let def = RevoluteJointDef::new(ground, ball).initialize(
            world.body(ground).unwrap(),
            world.body(ball).unwrap(),
            Vec2::new(0.0, 4.0),
        );
        world.create_joint(&def.into()).unwrap();
        world
    }

    #[test]
    fn dump_lists_every_object() {
        let world = sample();
        let mut text = String::new();
        world.dump(&mut text).unwrap();

        assert!(text.starts_with("world.set_gravity(Vec2::new(0.0, -9.8));"));
        assert_eq!(text.matches("world.create_body").count(), 2);
        assert_eq!(text.matches("world.create_fixture").count(), 2);
        assert!(text.contains("// joints[0]: Revolute bodies[0] bodies[1]"));
    }

    #[test]
    fn dump_follows_creation_order_after_slot_reuse() {
        let mut world = World::new(Vec2::ZERO);
        world.create_body(&BodyDef::default().with_user_data(1)).unwrap();
        let doomed = world.create_body(&BodyDef::default()).unwrap();
        world.create_body(&BodyDef::default().with_user_data(3)).unwrap();
        world.destroy_body(doomed).unwrap();
        world.create_body(&BodyDef::default().with_user_data(4)).unwrap();

        let mut text = String::new();
        world.dump(&mut text).unwrap();
        let users: Vec<u64> = text
            .lines()
            .filter(|l| l.starts_with("bodies["))
            .map(|l| {
                let json = l.split("r#\"").nth(1).unwrap().split("\"#").next().unwrap();
                BodyDef::from_json(json).unwrap().user_data
            })
            .collect();
        assert_eq!(users, vec![1, 3, 4]);
    }

    #[test]
    fn dumped_definitions_load_back() {
        let world = sample();
        let mut text = String::new();
        world.dump(&mut text).unwrap();

        let body_line = text.lines().find(|l| l.starts_with("bodies[1]")).unwrap();
        let json = body_line.split("r#\"").nth(1).unwrap().split("\"#").next().unwrap();
        let def = BodyDef::from_json(json).unwrap();
        assert_eq!(def.position, Vec2::new(0.0, 4.0));
        assert_eq!(def.user_data, 7);

        let fixture_line = text.lines().filter(|l| l.contains("create_fixture")).nth(1).unwrap();
        let json = fixture_line.split("r#\"").nth(1).unwrap().split("\"#").next().unwrap();
        let def: FixtureDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.density, 1.0);
    }
}
