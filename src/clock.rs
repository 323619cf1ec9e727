use std::time::Instant;

/// Where the clock reads elapsed time from.
#[derive(Debug, Clone, Copy)]
pub enum ClockSource {
    /// Seconds since the given instant.
    Realtime(Instant),
    /// Seconds set explicitly by the host.
    Manual(f32),
}

/// Values produced by one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub time: f32,
    pub delta: f32,
    pub frame: u32,
}

/// Elapsed time and frame counter driving `u_time`, `u_delta` and `u_frame`.
///
/// The frame counter starts at 0 and grows by exactly one per tick. It is
/// only reset by constructing a new clock.
#[derive(Debug, Clone)]
pub struct FrameClock {
    source: ClockSource,
    elapsed: f32,
    last_time: f32,
    frame: u32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::realtime()
    }
}

impl FrameClock {
    pub fn realtime() -> Self {
        Self::with_source(ClockSource::Realtime(Instant::now()))
    }

    /// A clock that only moves when told to, for offline rendering and tests.
    pub fn manual() -> Self {
        Self::with_source(ClockSource::Manual(0.0))
    }

    fn with_source(source: ClockSource) -> Self {
        Self {
            source,
            elapsed: 0.0,
            last_time: 0.0,
            frame: 0,
        }
    }

    /// Pins the elapsed time read by the next tick, switching to a manual source.
    pub fn set_elapsed(&mut self, seconds: f32) {
        self.source = ClockSource::Manual(seconds);
    }

    /// Moves a manual clock forward. A realtime clock is frozen at its
    /// current reading first.
    pub fn advance(&mut self, seconds: f32) {
        let now = self.sample();
        self.source = ClockSource::Manual(now + seconds);
    }

    fn sample(&self) -> f32 {
        match self.source {
            ClockSource::Realtime(start) => start.elapsed().as_secs_f32(),
            ClockSource::Manual(t) => t,
        }
    }

    /// Advances one frame.
    pub fn tick(&mut self) -> FrameTick {
        self.elapsed = self.sample();
        let tick = FrameTick {
            time: self.elapsed,
            delta: self.elapsed - self.last_time,
            frame: self.frame,
        };
        self.frame = self.frame.wrapping_add(1);
        self.last_time = self.elapsed;
        tick
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn last_time(&self) -> f32 {
        self.last_time
    }

    /// Number of ticks so far.
    pub fn frame(&self) -> u32 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_tick_is_frame_zero() {
        let mut clock = FrameClock::manual();
        clock.set_elapsed(0.25);
        let tick = clock.tick();
        assert_eq!(tick.frame, 0);
        assert_eq!(tick.time, 0.25);
        assert_eq!(tick.delta, 0.25);
        assert_eq!(clock.frame(), 1);
    }

    #[test]
    fn advance_accumulates() {
        let mut clock = FrameClock::manual();
        clock.advance(0.5);
        clock.advance(0.5);
        assert_eq!(clock.tick().time, 1.0);
    }

    proptest! {
        #[test]
        fn frames_count_up_and_delta_matches_elapsed(
            steps in prop::collection::vec(0.0f32..0.5, 1..40)
        ) {
            let mut clock = FrameClock::manual();
            let mut t = 0.0f32;
            let mut previous = 0.0f32;
            for (i, step) in steps.iter().enumerate() {
                t += step;
                clock.set_elapsed(t);
                let tick = clock.tick();
                prop_assert_eq!(tick.frame, i as u32);
                prop_assert_eq!(tick.delta, t - previous);
                previous = t;
            }
            prop_assert_eq!(clock.frame(), steps.len() as u32);
        }
    }
}
