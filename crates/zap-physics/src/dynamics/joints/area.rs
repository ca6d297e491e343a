//! Soft-body ring: a loop of bodies whose centers keep their enclosed area.
//! Neighboring bodies are tied by distance springs owned by the area joint.

use glam::Vec2;

use crate::common::math::{cross, cross_vs};
use crate::common::settings::{EPSILON, LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::dynamics::joints::{DistanceJointDef, SolverBody};
use crate::dynamics::time_step::SolverData;
use crate::dynamics::{BodyHandle, BodyMap, JointHandle};
use crate::error::{WorldError, WorldResult};

#[derive(Debug, Clone, PartialEq)]
pub struct AreaJointDef {
    /// Ring members in order. At least three.
    pub bodies: Vec<BodyHandle>,
    /// Stiffness of the perimeter springs.
    pub frequency_hz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
    pub user_data: u64,
}

impl AreaJointDef {
    pub fn new(bodies: Vec<BodyHandle>) -> Self {
        Self {
            bodies,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            collide_connected: false,
            user_data: 0,
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AreaJoint {
    pub(crate) bodies: Vec<BodyHandle>,
    /// Perimeter distance joints, created and destroyed with this joint.
    pub(crate) joints: Vec<JointHandle>,
    frequency_hz: f32,
    damping_ratio: f32,
    target_lengths: Vec<f32>,
    target_area: f32,
    impulse: f32,

    solver: Vec<SolverBody>,
    normals: Vec<Vec2>,
    deltas: Vec<Vec2>,
}

/// Signed area of the polygon through `points`.
fn polygon_area(points: impl ExactSizeIterator<Item = Vec2> + Clone) -> f32 {
    let n = points.len();
    let first = points.clone().take(1);
    let shifted = points.clone().skip(1).chain(first);
    0.5 * points.zip(shifted).take(n).map(|(p, q)| cross(p, q)).sum::<f32>()
}

impl AreaJoint {
    pub(crate) fn new(def: &AreaJointDef, bodies: &BodyMap) -> WorldResult<Self> {
        if def.bodies.len() < 3 {
            return Err(WorldError::InvalidJointDef(format!(
                "area joints need at least 3 bodies, got {}",
                def.bodies.len()
            )));
        }

        let centers = def
            .bodies
            .iter()
            .map(|&h| bodies.get(h).map(|b| b.world_center()).ok_or(WorldError::InvalidBody))
            .collect::<WorldResult<Vec<_>>>()?;

        let n = centers.len();
        let target_lengths = (0..n).map(|i| (centers[(i + 1) % n] - centers[i]).length()).collect();
        let target_area = polygon_area(centers.iter().copied());

        Ok(Self {
            bodies: def.bodies.clone(),
            joints: Vec::with_capacity(n),
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            target_lengths,
            target_area,
            impulse: 0.0,
            solver: vec![SolverBody::default(); n],
            normals: vec![Vec2::ZERO; n],
            deltas: vec![Vec2::ZERO; n],
        })
    }

    /// Distance joints tying each body to the next one around the ring.
    pub(crate) fn ring_defs(&self, collide_connected: bool) -> Vec<DistanceJointDef> {
        let n = self.bodies.len();
        (0..n)
            .map(|i| {
                DistanceJointDef::new(self.bodies[i], self.bodies[(i + 1) % n])
                    .with_length(self.target_lengths[i])
                    .with_spring(self.frequency_hz, self.damping_ratio)
                    .with_collide_connected(collide_connected)
            })
            .collect()
    }

    pub fn bodies(&self) -> &[BodyHandle] {
        &self.bodies
    }

    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    pub fn target_area(&self) -> f32 {
        self.target_area
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn damping_ratio(&self) -> f32 {
        self.damping_ratio
    }

    pub(crate) fn init_velocity_constraints(&mut self, bodies: &BodyMap, data: &mut SolverData) {
        let n = self.bodies.len();
        for (slot, &handle) in self.solver.iter_mut().zip(&self.bodies) {
            *slot = SolverBody::of(bodies, handle);
        }

        for i in 0..n {
            let prev = self.solver[(i + n - 1) % n].index;
            let next = self.solver[(i + 1) % n].index;
            self.deltas[i] = data.positions[next].c - data.positions[prev].c;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            for (body, &delta) in self.solver.iter().zip(&self.deltas) {
                data.velocities[body.index].v += (body.inv_mass * 0.5 * self.impulse) * cross_vs(delta, 1.0);
            }
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let mut dot_mass_sum = 0.0;
        let mut cross_mass_sum = 0.0;

        for (body, &delta) in self.solver.iter().zip(&self.deltas) {
            dot_mass_sum += delta.length_squared() * body.inv_mass;
            cross_mass_sum += cross(data.velocities[body.index].v, delta);
        }

        if dot_mass_sum == 0.0 {
            return;
        }

        let lambda = -2.0 * cross_mass_sum / dot_mass_sum;
        self.impulse += lambda;

        for (body, &delta) in self.solver.iter().zip(&self.deltas) {
            data.velocities[body.index].v += (body.inv_mass * 0.5 * lambda) * cross_vs(delta, 1.0);
        }
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let n = self.bodies.len();

        let mut perimeter = 0.0;
        for i in 0..n {
            let c = data.positions[self.solver[i].index].c;
            let c_next = data.positions[self.solver[(i + 1) % n].index].c;
            let delta = c_next - c;
            let mut dist = delta.length();
            if dist < EPSILON {
                dist = 1.0;
            }
            self.normals[i] = Vec2::new(delta.y / dist, -delta.x / dist);
            perimeter += dist;
        }

        let area = polygon_area(self.solver.iter().map(|b| data.positions[b.index].c));
        let delta_area = self.target_area - area;
        let to_extrude = 0.5 * delta_area / perimeter;

        let mut done = true;
        for i in 0..n {
            let next = (i + 1) % n;
            let mut delta = to_extrude * (self.normals[i] + self.normals[next]);
            let norm_sqrd = delta.length_squared();
            if norm_sqrd > MAX_LINEAR_CORRECTION * MAX_LINEAR_CORRECTION {
                delta *= MAX_LINEAR_CORRECTION / norm_sqrd.sqrt();
            }
            if norm_sqrd > LINEAR_SLOP * LINEAR_SLOP {
                done = false;
            }
            let body = self.solver[next];
            if body.inv_mass > 0.0 {
                data.positions[body.index].c += delta;
            }
        }

        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::dynamics::joints::test_support::Rig;
    use crate::dynamics::joints::{Joint, JointKind};

    fn square() -> Rig {
        Rig::new(&[
            BodyDef::dynamic().with_position(Vec2::new(0.0, 0.0)),
            BodyDef::dynamic().with_position(Vec2::new(1.0, 0.0)),
            BodyDef::dynamic().with_position(Vec2::new(1.0, 1.0)),
            BodyDef::dynamic().with_position(Vec2::new(0.0, 1.0)),
        ])
    }

    #[test]
    fn polygon_area_is_signed() {
        let ccw = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        assert!((polygon_area(ccw.iter().copied()) - 1.0).abs() < 1e-6);
        assert!((polygon_area(ccw.iter().rev().copied()) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn needs_three_bodies() {
        let rig = square();
        let def = AreaJointDef::new(rig.handles[..2].to_vec());
        assert!(matches!(
            AreaJoint::new(&def, &rig.bodies),
            Err(WorldError::InvalidJointDef(_))
        ));
    }

    #[test]
    fn ring_defs_close_the_loop() {
        let rig = square();
        let joint = AreaJoint::new(&AreaJointDef::new(rig.handles.clone()).with_spring(10.0, 1.0), &rig.bodies).unwrap();
        assert!((joint.target_area() - 1.0).abs() < 1e-6);

        let ring = joint.ring_defs(false);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[3].body_a, rig.handles[3]);
        assert_eq!(ring[3].body_b, rig.handles[0]);
        assert!(ring.iter().all(|d| (d.length - 1.0).abs() < 1e-6 && d.frequency_hz == 10.0));
    }

    #[test]
    fn squeezed_ring_restores_area() {
        let mut rig = square();
        let area = AreaJoint::new(&AreaJointDef::new(rig.handles.clone()), &rig.bodies).unwrap();
        let mut joint = Joint::new(rig.handles[0], rig.handles[1], false, 0, JointKind::Area(area));

        // Squeeze inward.
        rig.velocities[1].v = Vec2::new(-1.0, 0.0);
        rig.velocities[2].v = Vec2::new(-1.0, 0.0);
        rig.solve(&mut joint, Vec2::ZERO);

        let centers: Vec<Vec2> = (0..4).map(|i| rig.body(i).position()).collect();
        let restored = polygon_area(centers.iter().copied());
        assert!((restored - 1.0).abs() < 0.02, "area = {restored}");
    }
}
