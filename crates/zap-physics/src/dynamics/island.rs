//! A connected group of awake bodies with the contacts and joints between
//! them, solved together.

use glam::Vec2;

use crate::common::settings::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
};
use crate::common::timer::Timer;
use crate::dynamics::body::BodyType;
use crate::dynamics::contact_solver::ContactSolver;
use crate::dynamics::time_step::{Position, Profile, SolverData, TimeStep, Velocity};
use crate::dynamics::world_callbacks::ContactListener;
use crate::dynamics::{
    BodyHandle, BodyMap, ContactHandle, ContactMap, FixtureMap, JointHandle, JointMap,
};

/// World state an island reads and writes while solving.
pub(crate) struct IslandContext<'a> {
    pub bodies: &'a mut BodyMap,
    pub fixtures: &'a FixtureMap,
    pub contacts: &'a mut ContactMap,
    pub joints: &'a mut JointMap,
    pub listener: &'a mut Option<Box<dyn ContactListener>>,
}

#[derive(Debug, Default)]
pub(crate) struct Island {
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
    pub(crate) joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

/// Scale `v` and `w` so one step moves at most `MAX_TRANSLATION` and turns
/// at most `MAX_ROTATION`.
fn clamp_motion(h: f32, v: &mut Vec2, w: &mut f32) {
    let translation = h * *v;
    if translation.length_squared() > MAX_TRANSLATION_SQUARED {
        *v *= MAX_TRANSLATION / translation.length();
    }

    let rotation = h * *w;
    if rotation * rotation > MAX_ROTATION_SQUARED {
        *w *= MAX_ROTATION / rotation.abs();
    }
}

impl Island {
    /// Make room for the largest island possible this step.
    pub(crate) fn reserve(&mut self, bodies: usize, contacts: usize, joints: usize) {
        self.bodies.reserve(bodies.saturating_sub(self.bodies.len()));
        self.contacts.reserve(contacts.saturating_sub(self.contacts.len()));
        self.joints.reserve(joints.saturating_sub(self.joints.len()));
        self.positions.reserve(bodies.saturating_sub(self.positions.len()));
        self.velocities.reserve(bodies.saturating_sub(self.velocities.len()));
    }

    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Append a body and record its island index on it.
    pub(crate) fn add_body(&mut self, handle: BodyHandle, bodies: &mut BodyMap) {
        if let Some(body) = bodies.get_mut(handle) {
            body.island_index = self.bodies.len();
            self.bodies.push(handle);
        }
    }

    pub(crate) fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub(crate) fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    /// Load sweep positions and velocities of every island body.
    fn capture(&mut self, bodies: &BodyMap) {
        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &bodies[handle];
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }
    }

    /// One discrete step of this island: integrate, solve constraints,
    /// report impulses and put resting bodies to sleep.
    pub(crate) fn solve(
        &mut self,
        profile: &mut Profile,
        step: &TimeStep,
        gravity: Vec2,
        allow_sleep: bool,
        ctx: IslandContext<'_>,
    ) {
        let mut timer = Timer::new();
        let h = step.dt;

        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &mut ctx.bodies[handle];

            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            // Store positions for continuous collision.
            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                v += h * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += h * body.inv_inertia * body.torque;

                // Pade approximation of exp(-h * damping), stable for any h.
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        timer.reset();

        let mut contact_solver = ContactSolver::new(*step, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);
        contact_solver.initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);

        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for &handle in &self.joints {
            if let Some(joint) = ctx.joints.get_mut(handle) {
                joint.init_velocity_constraints(ctx.bodies, &mut data);
            }
        }

        profile.solve_init = timer.milliseconds();

        timer.reset();
        for _ in 0..step.velocity_iterations {
            for &handle in &self.joints {
                if let Some(joint) = ctx.joints.get_mut(handle) {
                    joint.solve_velocity_constraints(&mut data);
                }
            }
            contact_solver.solve_velocity_constraints(data.velocities);
        }

        contact_solver.store_impulses(ctx.contacts);
        profile.solve_velocity = timer.milliseconds();

        for (position, velocity) in data.positions.iter_mut().zip(data.velocities.iter_mut()) {
            clamp_motion(h, &mut velocity.v, &mut velocity.w);
            position.c += h * velocity.v;
            position.a += h * velocity.w;
        }

        timer.reset();
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = contact_solver.solve_position_constraints(data.positions);

            let mut joints_okay = true;
            for &handle in &self.joints {
                if let Some(joint) = ctx.joints.get_mut(handle) {
                    joints_okay &= joint.solve_position_constraints(&mut data);
                }
            }

            if contacts_okay && joints_okay {
                position_solved = true;
                break;
            }
        }

        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut ctx.bodies[handle];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }

        profile.solve_position = timer.milliseconds();

        report(&contact_solver, ctx.contacts, ctx.listener);

        if allow_sleep {
            self.update_sleep(h, position_solved, ctx.bodies);
        }
    }

    fn update_sleep(&self, h: f32, position_solved: bool, bodies: &mut BodyMap) {
        let mut min_sleep_time = f32::MAX;

        const LIN_TOL_SQR: f32 = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
        const ANG_TOL_SQR: f32 = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

        for &handle in &self.bodies {
            let body = &mut bodies[handle];
            if body.body_type == BodyType::Static {
                continue;
            }

            if !body.auto_sleep
                || body.angular_velocity * body.angular_velocity > ANG_TOL_SQR
                || body.linear_velocity.length_squared() > LIN_TOL_SQR
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= TIME_TO_SLEEP && position_solved {
            for &handle in &self.bodies {
                bodies[handle].set_awake(false);
            }
        }
    }

    /// Resolve the TOI pair at its time of impact, then integrate the rest
    /// of the sub-step. Only the two TOI bodies are moved by the position
    /// pass; the others act as static.
    pub(crate) fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        toi_index_a: usize,
        toi_index_b: usize,
        ctx: IslandContext<'_>,
    ) {
        debug_assert!(toi_index_a < self.bodies.len());
        debug_assert!(toi_index_b < self.bodies.len());

        self.capture(ctx.bodies);

        let mut contact_solver =
            ContactSolver::new(*sub_step, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);

        for _ in 0..sub_step.position_iterations {
            if contact_solver.solve_toi_position_constraints(&mut self.positions, toi_index_a, toi_index_b) {
                break;
            }
        }

        // The TOI bodies start the remaining sub-step from the resolved pose.
        for index in [toi_index_a, toi_index_b] {
            let body = &mut ctx.bodies[self.bodies[index]];
            body.sweep.c0 = self.positions[index].c;
            body.sweep.a0 = self.positions[index].a;
        }

        // No warm starting: the discrete solve already applied those impulses.
        contact_solver.initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);

        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Impulses are not stored: the sub-step must not disturb warm starting.

        let h = sub_step.dt;
        for (i, &handle) in self.bodies.iter().enumerate() {
            let mut c = self.positions[i].c;
            let mut a = self.positions[i].a;
            let mut v = self.velocities[i].v;
            let mut w = self.velocities[i].w;

            clamp_motion(h, &mut v, &mut w);
            c += h * v;
            a += h * w;

            self.positions[i] = Position { c, a };
            self.velocities[i] = Velocity { v, w };

            let body = &mut ctx.bodies[handle];
            body.sweep.c = c;
            body.sweep.a = a;
            body.linear_velocity = v;
            body.angular_velocity = w;
            body.synchronize_transform();
        }

        report(&contact_solver, ctx.contacts, ctx.listener);
    }
}

fn report(
    contact_solver: &ContactSolver,
    contacts: &mut ContactMap,
    listener: &mut Option<Box<dyn ContactListener>>,
) {
    let Some(listener) = listener.as_mut() else {
        return;
    };

    for (i, vc) in contact_solver.velocity_constraints.iter().enumerate() {
        if let Some(contact) = contacts.get_mut(vc.contact) {
            listener.post_solve(contact, &contact_solver.impulse(i));
        }
    }
}
