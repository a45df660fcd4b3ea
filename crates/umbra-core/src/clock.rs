// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Snapshot of the clock, refreshed once per frame.
#[derive(Clone, Copy, Debug)]
pub struct GameTime {
    current: Instant,
    total: Duration,
    elapsed: Duration,
}

impl Default for GameTime {
    fn default() -> Self {
        Self {
            current: Instant::now(),
            total: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }
}

impl GameTime {
    pub fn current_time(&self) -> Instant {
        self.current
    }

    /// Time since the last clock reset, truncated to whole milliseconds.
    pub fn total_game_time(&self) -> Duration {
        self.total
    }

    /// Time since the previous update, truncated to whole milliseconds.
    pub fn elapsed_game_time(&self) -> Duration {
        self.elapsed
    }

    pub fn total_seconds(&self) -> f32 {
        self.total.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }
}

/// Plain stopwatch driving camera and projector speeds.
#[derive(Debug)]
pub struct GameClock {
    start: Instant,
    current: Instant,
    last: Instant,
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl GameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            current: now,
            last: now,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    pub fn current_time(&self) -> Instant {
        self.current
    }

    pub fn last_time(&self) -> Instant {
        self.last
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn update_game_time(&mut self, time: &mut GameTime) {
        self.update_at(Instant::now(), time);
    }

    fn update_at(&mut self, now: Instant, time: &mut GameTime) {
        // A caller-supplied instant can predate the last tick; saturate instead of panicking.
        self.current = now.max(self.last);
        time.current = self.current;
        time.total = whole_millis(self.current - self.start);
        time.elapsed = whole_millis(self.current - self.last);
        self.last = self.current;
    }
}

fn whole_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_measured_between_updates() {
        let mut clock = GameClock::new();
        let mut time = GameTime::default();
        let t0 = clock.start_time();

        clock.update_at(t0 + Duration::from_millis(16), &mut time);
        assert_eq!(time.elapsed_game_time(), Duration::from_millis(16));
        assert_eq!(time.total_game_time(), Duration::from_millis(16));

        clock.update_at(t0 + Duration::from_millis(50), &mut time);
        assert_eq!(time.elapsed_game_time(), Duration::from_millis(34));
        assert_eq!(time.total_game_time(), Duration::from_millis(50));
        assert_eq!(clock.last_time(), t0 + Duration::from_millis(50));
    }

    #[test]
    fn sub_millisecond_precision_is_truncated() {
        let mut clock = GameClock::new();
        let mut time = GameTime::default();
        let t0 = clock.start_time();

        clock.update_at(t0 + Duration::from_micros(2_900), &mut time);
        assert_eq!(time.elapsed_game_time(), Duration::from_millis(2));
    }

    #[test]
    fn reset_restarts_totals() {
        let mut clock = GameClock::new();
        let mut time = GameTime::default();
        let t0 = clock.start_time();
        clock.update_at(t0 + Duration::from_millis(500), &mut time);

        clock.reset();
        let t1 = clock.start_time();
        clock.update_at(t1 + Duration::from_millis(10), &mut time);
        assert_eq!(time.total_game_time(), Duration::from_millis(10));
    }
}
