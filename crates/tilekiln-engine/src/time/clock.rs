use std::time::{Duration, Instant};

use crate::ids::ClockId;

/// Result of advancing a clock by one frame.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ClockTick {
    /// Scaled delta applied this tick, in milliseconds.
    pub delta_ms: f64,

    /// The clock ran past its loop bound and restarted from the other end.
    pub wrapped: bool,

    /// The interval set with `Clock::set_interval` elapsed during this tick.
    pub interval_elapsed: bool,
}

/// Application timer with a speed multiplier and optional loop bounds.
///
/// Time is kept as milliseconds on an arbitrary epoch chosen by the caller.
/// A positive multiplier runs forward and loops from `end` back to `start`;
/// a negative multiplier runs backward and loops the other way.
#[derive(Debug, Clone)]
pub struct Clock {
    pub name: String,
    pub multiplier: f64,
    pub active: bool,
    id: Option<ClockId>,
    current_ms: f64,
    start_ms: Option<f64>,
    end_ms: Option<f64>,
    delta_ticks: f64,
    interval_ms: Option<f64>,
    interval_start_ms: f64,
    frame_index: u64,
}

impl Clock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multiplier: 1.0,
            active: true,
            id: None,
            current_ms: 0.0,
            start_ms: None,
            end_ms: None,
            delta_ticks: 0.0,
            interval_ms: None,
            interval_start_ms: 0.0,
            frame_index: 0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets loop bounds and clamps the current time into them.
    pub fn with_bounds(mut self, start_ms: f64, end_ms: f64) -> Self {
        debug_assert!(start_ms <= end_ms);
        self.start_ms = Some(start_ms);
        self.end_ms = Some(end_ms);
        self.set_time(self.current_ms);
        self
    }

    /// Id assigned when registered on a context.
    pub fn id(&self) -> Option<ClockId> {
        self.id
    }

    pub(crate) fn attach(&mut self, id: ClockId) {
        self.id = Some(id);
    }

    pub(crate) fn detach(&mut self) {
        self.id = None;
    }

    pub fn time_ms(&self) -> f64 {
        self.current_ms
    }

    /// Last scaled delta, in milliseconds.
    pub fn delta_ticks(&self) -> f64 {
        self.delta_ticks
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Sets the current time, clamped to the loop bounds.
    pub fn set_time(&mut self, ms: f64) {
        let mut t = ms;
        if let Some(start) = self.start_ms {
            t = t.max(start);
        }
        if let Some(end) = self.end_ms {
            t = t.min(end);
        }
        self.current_ms = t;
    }

    /// Jumps back to the loop start, if one is set.
    pub fn reset(&mut self) {
        if let Some(start) = self.start_ms {
            self.current_ms = start;
        }
    }

    /// Reports `interval_elapsed` every `delay` of clock time.
    pub fn set_interval(&mut self, delay: Duration) {
        self.interval_start_ms = self.current_ms;
        self.interval_ms = Some(delay.as_secs_f64() * 1000.0);
    }

    pub fn clear_interval(&mut self) {
        self.interval_ms = None;
        self.interval_start_ms = 0.0;
    }

    /// Advances by a wall-clock delta scaled by the multiplier.
    ///
    /// Inactive clocks record the scaled delta but do not move.
    pub fn tick(&mut self, dt: Duration) -> ClockTick {
        self.delta_ticks = dt.as_secs_f64() * 1000.0 * self.multiplier;
        self.frame_index = self.frame_index.wrapping_add(1);

        let mut out = ClockTick { delta_ms: self.delta_ticks, ..ClockTick::default() };
        if !self.active {
            return out;
        }

        let next = self.current_ms + self.delta_ticks;
        if self.multiplier > 0.0 {
            match (self.end_ms, self.start_ms) {
                (Some(end), start) if next > end => {
                    self.current_ms = start.unwrap_or(0.0);
                    out.wrapped = true;
                }
                _ => self.current_ms = next,
            }
        } else {
            match (self.start_ms, self.end_ms) {
                (Some(start), end) if next < start => {
                    self.current_ms = end.unwrap_or(0.0);
                    out.wrapped = true;
                }
                _ => self.current_ms = next,
            }
        }

        if let Some(delay) = self.interval_ms
            && self.current_ms - self.interval_start_ms >= delay
        {
            self.interval_start_ms = self.current_ms;
            out.interval_elapsed = true;
        }

        out
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new("")
    }
}

/// Wall-clock frame delta source with clamping.
///
/// Delta time is clamped so a stalled process (debugger, suspended machine)
/// does not fast-forward every clock in a single frame.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last: Instant,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::with_clamps(Duration::ZERO, Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self { last: Instant::now(), dt_min, dt_max }
    }

    /// Resets the baseline, e.g. before the first frame of a render loop.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Returns the clamped time since the previous call.
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last).clamp(self.dt_min, self.dt_max);
        self.last = now;
        dt
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    // ── tick ──────────────────────────────────────────────────────────────

    #[test]
    fn tick_scales_by_multiplier() {
        let mut clock = Clock::new("sim").with_multiplier(2.0);
        let tick = clock.tick(ms(10));
        assert_eq!(tick.delta_ms, 20.0);
        assert_eq!(clock.time_ms(), 20.0);
        assert_eq!(clock.frame_index(), 1);
    }

    #[test]
    fn inactive_clock_records_delta_but_holds_time() {
        let mut clock = Clock::new("paused");
        clock.active = false;
        clock.tick(ms(16));
        assert_eq!(clock.delta_ticks(), 16.0);
        assert_eq!(clock.time_ms(), 0.0);
    }

    #[test]
    fn forward_clock_wraps_to_start() {
        let mut clock = Clock::new("loop").with_bounds(100.0, 150.0);
        assert_eq!(clock.time_ms(), 100.0);
        assert!(!clock.tick(ms(40)).wrapped);
        let tick = clock.tick(ms(40));
        assert!(tick.wrapped);
        assert_eq!(clock.time_ms(), 100.0);
    }

    #[test]
    fn backward_clock_wraps_to_end() {
        let mut clock = Clock::new("rewind").with_bounds(0.0, 50.0).with_multiplier(-1.0);
        clock.set_time(10.0);
        let tick = clock.tick(ms(20));
        assert!(tick.wrapped);
        assert_eq!(clock.time_ms(), 50.0);
    }

    // ── interval ──────────────────────────────────────────────────────────

    #[test]
    fn interval_fires_once_per_period() {
        let mut clock = Clock::new("iv");
        clock.set_interval(ms(30));
        assert!(!clock.tick(ms(20)).interval_elapsed);
        assert!(clock.tick(ms(20)).interval_elapsed);
        assert!(!clock.tick(ms(20)).interval_elapsed);
        clock.clear_interval();
        assert!(!clock.tick(ms(100)).interval_elapsed);
    }

    // ── frame timer ───────────────────────────────────────────────────────

    #[test]
    fn frame_timer_clamps_to_max() {
        let mut timer = FrameTimer::with_clamps(Duration::ZERO, Duration::ZERO);
        std::thread::sleep(ms(2));
        assert_eq!(timer.lap(), Duration::ZERO);
    }
}
