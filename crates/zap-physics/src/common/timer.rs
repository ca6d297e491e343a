use std::time::Instant;

/// Wall-clock stopwatch used for step profiling.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Restart the stopwatch.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Elapsed milliseconds since construction or the last reset.
    pub fn milliseconds(&self) -> f32 {
        self.start.elapsed().as_secs_f32() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_monotonic() {
        let t = Timer::new();
        let a = t.milliseconds();
        let b = t.milliseconds();
        assert!(a >= 0.0);
        assert!(b >= a, "timer went backwards: {} then {}", a, b);
    }
}
