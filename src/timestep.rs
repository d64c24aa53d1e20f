//! Fixed-timestep accumulator
//!
//! Render frames arrive at whatever rate the host runs; substeps run at a
//! constant rate so spring stiffness behaves the same at 30 or 144 fps. Frame
//! deltas are clamped, banked into a remainder, and consumed one substep at a
//! time. No interpolation happens between substeps: a renderer sees the state
//! left by the frame's last completed substep.

/// Accumulator that converts variable frame deltas into fixed substeps
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    dt: f32,
    max_frame_delta: f32,
    remainder: f32,
    /// Tracked in f64: the clock grows without bound while the remainder
    /// stays below one frame.
    sim_time: f64,
}

impl FixedTimestep {
    /// Create a driver with the given substep duration and frame-delta clamp
    pub fn new(dt: f32, max_frame_delta: f32) -> Self {
        Self {
            dt,
            max_frame_delta,
            remainder: 0.0,
            sim_time: 0.0,
        }
    }

    /// Substep duration in seconds
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Total simulated time, advanced only by consumed substeps
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Clamp a frame delta and add it to the carried remainder.
    ///
    /// Negative deltas contribute nothing; deltas above the clamp are cut to
    /// it, so a long stall never triggers an unbounded catch-up burst.
    pub fn accumulate(&mut self, frame_delta: f32) {
        self.remainder += frame_delta.clamp(0.0, self.max_frame_delta);
    }

    /// Consume one substep from the remainder if enough time is banked,
    /// advancing the sim clock. Returns false once the remainder is spent.
    pub fn step(&mut self) -> bool {
        if self.remainder < self.dt {
            return false;
        }
        self.remainder -= self.dt;
        self.sim_time += f64::from(self.dt);
        true
    }

    /// Substeps a delta would yield right now, without consuming anything
    pub fn pending_steps(&self, frame_delta: f32) -> u32 {
        let banked = self.remainder + frame_delta.clamp(0.0, self.max_frame_delta);
        (banked / self.dt) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(driver: &mut FixedTimestep) -> u32 {
        let mut steps = 0;
        while driver.step() {
            steps += 1;
        }
        steps
    }

    #[test]
    fn exact_multiple_consumes_cleanly() {
        let mut driver = FixedTimestep::new(1.0 / 256.0, 1.0);
        driver.accumulate(0.125);
        assert_eq!(drain(&mut driver), 32);
        assert!(!driver.step());
    }

    #[test]
    fn remainder_carries_across_frames() {
        let mut driver = FixedTimestep::new(0.25, 1.0);
        driver.accumulate(0.375);
        assert_eq!(drain(&mut driver), 1);
        driver.accumulate(0.125);
        assert_eq!(drain(&mut driver), 1, "carried 0.125 + 0.125 = one substep");
    }

    #[test]
    fn sliced_deltas_match_one_call() {
        // Dyadic dt and deltas keep the arithmetic exact, so the substep
        // counts and final clocks agree without a boundary step.
        let dt = 1.0 / 256.0;

        let mut whole = FixedTimestep::new(dt, 1.0);
        whole.accumulate(0.5);
        let whole_steps = drain(&mut whole);

        let mut sliced = FixedTimestep::new(dt, 1.0);
        let mut sliced_steps = 0;
        for _ in 0..16 {
            sliced.accumulate(0.03125);
            sliced_steps += drain(&mut sliced);
        }

        assert_eq!(whole_steps, sliced_steps);
        assert_eq!(whole_steps, 128);
        assert_eq!(whole.sim_time(), sliced.sim_time());
    }

    #[test]
    fn arbitrary_slicing_stays_within_one_step() {
        let dt = 1.0 / 360.0;
        let total: f32 = 1.0;

        let mut whole = FixedTimestep::new(dt, 2.0);
        whole.accumulate(total);
        let whole_steps = drain(&mut whole);

        let mut sliced = FixedTimestep::new(dt, 2.0);
        let mut sliced_steps = 0;
        for _ in 0..100 {
            sliced.accumulate(total / 100.0);
            sliced_steps += drain(&mut sliced);
        }

        let expected = (total / dt) as i64;
        assert!((whole_steps as i64 - expected).abs() <= 1);
        assert!((sliced_steps as i64 - expected).abs() <= 1);
        assert!((whole_steps as i64 - sliced_steps as i64).abs() <= 1);
    }

    #[test]
    fn clamp_bounds_catch_up() {
        let mut driver = FixedTimestep::new(0.0625, 0.3125);
        driver.accumulate(10.0);
        assert_eq!(drain(&mut driver), 5, "stall clamped to max_frame_delta");
    }

    #[test]
    fn negative_delta_is_ignored() {
        let mut driver = FixedTimestep::new(0.01, 0.05);
        driver.accumulate(-1.0);
        assert_eq!(drain(&mut driver), 0);
        assert_eq!(driver.sim_time(), 0.0);
    }

    #[test]
    fn sim_clock_advances_by_consumed_substeps_only() {
        let mut driver = FixedTimestep::new(0.25, 1.0);
        driver.accumulate(0.6);
        assert_eq!(drain(&mut driver), 2);
        assert_eq!(driver.sim_time(), 0.5);
    }

    #[test]
    fn pending_steps_previews_without_consuming() {
        let mut driver = FixedTimestep::new(0.01, 1.0);
        assert_eq!(driver.pending_steps(0.035), 3);
        assert_eq!(driver.sim_time(), 0.0);
        driver.accumulate(0.035);
        assert_eq!(drain(&mut driver), 3);
    }
}
