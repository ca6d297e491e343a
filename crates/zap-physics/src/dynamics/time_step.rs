use glam::Vec2;

/// Per-phase wall-clock timings of the last step, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Profile {
    pub step: f32,
    pub collide: f32,
    pub solve: f32,
    pub solve_init: f32,
    pub solve_velocity: f32,
    pub solve_position: f32,
    pub broadphase: f32,
    pub solve_toi: f32,
}

/// Parameters of one (sub-)step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeStep {
    pub dt: f32,
    /// Zero when `dt` is zero.
    pub inv_dt: f32,
    /// `dt * inv_dt0`: scales warm-start impulses when the step size changes.
    pub dt_ratio: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
}

/// Island-local center-of-mass position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Island-local velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Solver state shared by joints during an island solve.
#[derive(Debug)]
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}
