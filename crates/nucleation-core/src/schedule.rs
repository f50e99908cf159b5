//! Step clock for the nucleation schedule.
//!
//! The step index is the source of truth. Simulation time is derived as
//! `step * timestep` rather than accumulated, so every worker computes the
//! same time for the same step.

/// Errors raised by the step clock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u32::MAX")]
    StepOverflow,
}

/// Whether the nucleation pipeline runs at `step` when it runs every
/// `skip_steps` steps. A zero interval never fires.
pub const fn is_nucleation_step(step: u32, skip_steps: u32) -> bool {
    matches!(step.checked_rem(skip_steps), Some(0))
}

/// Tracks the current step and derives its simulation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepClock {
    step: u32,
    timestep: f64,
    skip_steps: u32,
}

impl StepClock {
    /// A clock at step 0.
    pub const fn new(timestep: f64, skip_steps: u32) -> Self {
        Self {
            step: 0,
            timestep,
            skip_steps,
        }
    }

    /// Current step index.
    pub const fn step(&self) -> u32 {
        self.step
    }

    /// Simulation time at the current step.
    pub fn time(&self) -> f64 {
        f64::from(self.step) * self.timestep
    }

    /// Whether the nucleation pipeline runs at the current step.
    pub const fn is_nucleation_step(&self) -> bool {
        is_nucleation_step(self.step, self.skip_steps)
    }

    /// Move to the next step and return it.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::StepOverflow`] at `u32::MAX`.
    pub fn advance(&mut self) -> Result<u32, ScheduleError> {
        self.step = self.step.checked_add(1).ok_or(ScheduleError::StepOverflow)?;
        Ok(self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_derived_from_step() {
        let mut clock = StepClock::new(0.01, 10);
        for _ in 0..250 {
            assert!(clock.advance().is_ok());
        }
        assert_eq!(clock.step(), 250);
        assert!((clock.time() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn nucleation_steps_are_multiples_of_skip() {
        let mut clock = StepClock::new(0.1, 3);
        let mut hits = Vec::new();
        for _ in 0..10 {
            if clock.is_nucleation_step() {
                hits.push(clock.step());
            }
            assert!(clock.advance().is_ok());
        }
        assert_eq!(hits, vec![0, 3, 6, 9]);
    }

    #[test]
    fn zero_skip_never_fires() {
        assert!(!StepClock::new(0.1, 0).is_nucleation_step());
        assert!(!is_nucleation_step(0, 0));
    }

    #[test]
    fn free_check_matches_the_clock() {
        let mut clock = StepClock::new(0.1, 4);
        for _ in 0..20 {
            assert_eq!(clock.is_nucleation_step(), is_nucleation_step(clock.step(), 4));
            assert!(clock.advance().is_ok());
        }
    }

    #[test]
    fn overflow_is_an_error() {
        let mut clock = StepClock {
            step: u32::MAX,
            timestep: 1.0,
            skip_steps: 1,
        };
        assert_eq!(clock.advance(), Err(ScheduleError::StepOverflow));
        assert_eq!(clock.step(), u32::MAX);
    }
}
