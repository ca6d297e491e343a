use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use glam::Vec2;

use zap_physics::collision::{time_of_impact, DistanceProxy, ToiInput, ToiMetrics, ToiState};
use zap_physics::common::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use zap_physics::{
    BodyDef, BodyHandle, CircleShape, Contact, ContactImpulse, ContactListener, DistanceJointDef, EdgeShape,
    FixtureDef, JointKind, PolygonShape, RevoluteJointDef, Shape, Sweep, World, WorldDef,
};

const DT: f32 = 1.0 / 60.0;

fn step(world: &mut World) {
    world.step(DT, 8, 3);
}

/// Static box covering y in [0, 1].
fn ground_box(world: &mut World) -> BodyHandle {
    let ground = world
        .create_body(&BodyDef::default().with_position(Vec2::new(0.0, 0.5)))
        .unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(20.0, 0.5)))
        .unwrap();
    ground
}

fn unit_box(world: &mut World, position: Vec2) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic().with_position(position)).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0))
        .unwrap();
    body
}

#[test]
fn falling_box_comes_to_rest_on_ground_and_sleeps() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_box(&mut world);
    let b = unit_box(&mut world, Vec2::new(0.0, 5.5));

    let mut steps = 0;
    while world.body(b).unwrap().is_awake() && steps < 600 {
        step(&mut world);
        steps += 1;
    }

    let body = world.body(b).unwrap();
    assert!(!body.is_awake(), "still awake after {steps} steps");
    assert_eq!(body.linear_velocity(), Vec2::ZERO);

    // Both skins are POLYGON_RADIUS thick and rest about a slop into each
    // other, so the body's own skin sits within a slop of the ground top.
    let skin_bottom = body.position().y - 0.5 - POLYGON_RADIUS;
    assert_abs_diff_eq!(skin_bottom, 1.0, epsilon = LINEAR_SLOP + 1e-4);
    assert_abs_diff_eq!(body.angle(), 0.0, epsilon = 1e-3);
    // Falling takes about a second; sleeping needs half a second at rest.
    assert!(steps as f32 * DT > 1.0);
}

struct Impulses(Rc<RefCell<Vec<f32>>>);

impl ContactListener for Impulses {
    fn post_solve(&mut self, _contact: &mut Contact, impulse: &ContactImpulse) {
        let total = impulse.normal_impulses[..impulse.count].iter().sum();
        self.0.borrow_mut().push(total);
    }
}

#[test]
fn warm_started_impulses_settle_to_a_fixed_point() {
    let mut world = World::from_def(&WorldDef::default().with_allow_sleep(false));
    let impulses = Rc::new(RefCell::new(Vec::new()));
    world.set_contact_listener(Impulses(impulses.clone()));
    ground_box(&mut world);
    unit_box(&mut world, Vec2::new(0.0, 1.5));

    for _ in 0..180 {
        step(&mut world);
    }
    let impulses = impulses.borrow();
    let (last, previous) = (impulses[impulses.len() - 1], impulses[impulses.len() - 2]);
    assert_abs_diff_eq!(last, previous, epsilon = 1e-3);
    // Supports the box's weight: m g dt.
    assert_abs_diff_eq!(last, 10.0 * DT, epsilon = 1e-2);
}

#[test]
fn head_on_circles_touch_at_the_analytic_time() {
    let circle = Shape::from(CircleShape::new(0.5));
    let sweep = |from: Vec2| Sweep {
        c0: from,
        a0: 0.0,
        ..Default::default()
    };
    // Closing speed 4 over the unit interval, centers meet at t = 1.
    let input = ToiInput {
        proxy_a: DistanceProxy::new(&circle, 0),
        proxy_b: DistanceProxy::new(&circle, 0),
        sweep_a: sweep(Vec2::new(-2.0, 0.0)),
        sweep_b: sweep(Vec2::new(2.0, 0.0)),
        t_max: 1.0,
    };
    let mut metrics = ToiMetrics::default();
    let output = time_of_impact(&input, &mut metrics);

    assert_eq!(output.state, ToiState::Touching);
    // Stops at the target separation, three slops inside the radii.
    let target = 1.0 - 3.0 * LINEAR_SLOP;
    let expected = 1.0 - target / 4.0;
    assert_abs_diff_eq!(output.t, expected, epsilon = 1e-3);
    assert_eq!(metrics.calls, 1);
}

#[test]
fn fast_ball_does_not_tunnel_through_thin_wall() {
    let mut world = World::new(Vec2::ZERO);
    let wall = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(EdgeShape::new(Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0))))
        .unwrap();

    let ball = world
        .create_body(
            &BodyDef::dynamic()
                .with_position(Vec2::new(-1.5, 0.0))
                .with_linear_velocity(Vec2::new(119.0, 0.0)),
        )
        .unwrap();
    world
        .create_fixture(ball, &FixtureDef::new(CircleShape::new(0.1)).with_density(1.0))
        .unwrap();

    for _ in 0..10 {
        step(&mut world);
        let x = world.body(ball).unwrap().position().x;
        assert!(x < 0.0, "ball crossed the wall: x = {x}");
    }
    assert!(world.toi_metrics().calls > 0);
}

/// Fast ball heading for a thin dynamic plank at the origin.
fn ball_and_plank(bullet: bool) -> (World, BodyHandle, BodyHandle) {
    let mut world = World::new(Vec2::ZERO);
    let plank = world.create_body(&BodyDef::dynamic()).unwrap();
    world
        .create_fixture(plank, &FixtureDef::new(PolygonShape::new_box(0.05, 2.0)).with_density(1.0))
        .unwrap();
    let ball = world
        .create_body(
            &BodyDef::dynamic()
                .with_position(Vec2::new(-1.5, 0.0))
                .with_linear_velocity(Vec2::new(119.0, 0.0))
                .with_bullet(bullet),
        )
        .unwrap();
    world
        .create_fixture(ball, &FixtureDef::new(CircleShape::new(0.1)).with_density(1.0))
        .unwrap();
    (world, ball, plank)
}

#[test]
fn bullet_stops_at_a_thin_dynamic_body() {
    let (mut world, ball, plank) = ball_and_plank(true);

    for _ in 0..5 {
        step(&mut world);
        let (x, plank_x) = (world.body(ball).unwrap().position().x, world.body(plank).unwrap().position().x);
        assert!(x < plank_x, "bullet passed the plank: {x} vs {plank_x}");
    }
    assert!(world.toi_metrics().calls > 0);
    // The plank took some of the momentum.
    assert!(world.body(plank).unwrap().linear_velocity().x > 0.0);
}

#[test]
fn plain_dynamic_pair_skips_continuous_collision() {
    let (mut world, ball, _) = ball_and_plank(false);

    step(&mut world);
    assert_eq!(world.toi_metrics().calls, 0);
    // Nothing caught it: the ball ends the step on the far side.
    assert!(world.body(ball).unwrap().position().x > 0.15);
}

#[test]
fn free_body_keeps_its_velocity_without_gravity() {
    let mut world = World::new(Vec2::ZERO);
    let body = world
        .create_body(
            &BodyDef::dynamic()
                .with_linear_velocity(Vec2::new(3.0, 1.0))
                .with_angular_velocity(0.5)
                .with_allow_sleep(false),
        )
        .unwrap();
    world
        .create_fixture(body, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))
        .unwrap();

    for _ in 0..120 {
        step(&mut world);
    }
    let body = world.body(body).unwrap();
    assert_abs_diff_eq!(body.linear_velocity().x, 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(body.linear_velocity().y, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(body.angular_velocity(), 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(body.position().x, 6.0, epsilon = 1e-3);
}

#[test]
fn rigid_distance_joint_holds_its_length() {
    let mut world = World::default();
    let anchor = world.create_body(&BodyDef::default().with_position(Vec2::new(0.0, 10.0))).unwrap();
    let bob = world
        .create_body(
            &BodyDef::dynamic()
                .with_position(Vec2::new(2.0, 10.0))
                .with_linear_damping(1.0),
        )
        .unwrap();
    world
        .create_fixture(bob, &FixtureDef::new(CircleShape::new(0.25)).with_density(1.0))
        .unwrap();

    let def = DistanceJointDef::new(anchor, bob).initialize(
        world.body(anchor).unwrap(),
        world.body(bob).unwrap(),
        Vec2::new(0.0, 10.0),
        Vec2::new(2.0, 10.0),
    );
    let joint = world.create_joint(&def.into()).unwrap();

    for _ in 0..600 {
        step(&mut world);
    }

    let (a, b) = world.joint_bodies(joint).unwrap();
    let j = world.joint(joint).unwrap();
    let length = (j.anchor_b(b) - j.anchor_a(a)).length();
    assert_abs_diff_eq!(length, 2.0, epsilon = LINEAR_SLOP);
    // Hanging straight down.
    assert_abs_diff_eq!(b.position().x, 0.0, epsilon = 0.05);
}

#[test]
fn idle_body_falls_asleep_after_time_to_sleep() {
    let mut world = World::new(Vec2::ZERO);
    let body = world.create_body(&BodyDef::dynamic()).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))
        .unwrap();

    // 0.45 s at rest.
    for _ in 0..27 {
        step(&mut world);
    }
    assert!(world.body(body).unwrap().is_awake());

    for _ in 0..10 {
        step(&mut world);
    }
    assert!(!world.body(body).unwrap().is_awake());
}

#[test]
fn waking_one_body_does_not_wake_another_across_the_ground() {
    let mut world = World::default();
    ground_box(&mut world);
    let left = unit_box(&mut world, Vec2::new(-5.0, 1.5));
    let right = unit_box(&mut world, Vec2::new(5.0, 1.5));

    let mut steps = 0;
    while (world.body(left).unwrap().is_awake() || world.body(right).unwrap().is_awake()) && steps < 600 {
        step(&mut world);
        steps += 1;
    }
    assert!(!world.body(right).unwrap().is_awake());

    world.body_mut(left).unwrap().set_awake(true);
    step(&mut world);

    assert!(world.body(left).unwrap().is_awake());
    assert!(!world.body(right).unwrap().is_awake());
}

#[test]
fn revolute_motor_reaches_its_speed() {
    let mut world = World::default();
    let ground = world.create_body(&BodyDef::default()).unwrap();
    let wheel = world
        .create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, 5.0)))
        .unwrap();
    world
        .create_fixture(wheel, &FixtureDef::new(CircleShape::new(1.0)).with_density(1.0))
        .unwrap();

    let def = RevoluteJointDef::new(ground, wheel)
        .initialize(world.body(ground).unwrap(), world.body(wheel).unwrap(), Vec2::new(0.0, 5.0))
        .with_motor(2.0, 1000.0);
    let joint = world.create_joint(&def.into()).unwrap();

    for _ in 0..60 {
        step(&mut world);
    }

    let (a, b) = world.joint_bodies(joint).unwrap();
    let JointKind::Revolute(revolute) = world.joint(joint).unwrap().kind() else {
        panic!("expected a revolute joint");
    };
    assert_abs_diff_eq!(revolute.joint_speed(a, b), 2.0, epsilon = 1e-3);
    // Pinned at its center of mass.
    assert_abs_diff_eq!(b.position().y, 5.0, epsilon = LINEAR_SLOP);
}
