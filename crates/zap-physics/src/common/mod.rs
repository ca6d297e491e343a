pub mod math;
pub mod settings;
pub mod timer;

pub use math::{cross, cross_sv, cross_vs, Mat22Ext, Mat33Ext, Rot, Sweep, Transform};
pub use timer::Timer;
