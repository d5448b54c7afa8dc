//! Frame driver: the self-rescheduling render loop as an explicit state
//! machine.
//!
//! ```text
//!   Idle --start--> Scheduled(t) --begin(t)--> Running --reschedule--> Scheduled(t')
//!                        |                        |
//!                        +--------stop------------+----> Cancelled
//!                                                 +--halt--> Idle
//! ```
//!
//! A host callback carries the token it was scheduled with; `begin` refuses
//! any token other than the pending one, which makes callbacks that race a
//! cancellation harmless.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::host::{FrameScheduler, FrameToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Scheduled(FrameToken),
    Running,
    /// Terminal; the driver never schedules again.
    Cancelled,
}

/// Elapsed-seconds clock latched on the first sample.
#[derive(Debug, Default)]
pub struct FrameClock {
    start: Option<Instant>,
    last: f32,
}

impl FrameClock {
    /// Seconds since the first sample, never smaller than a previous result.
    pub fn sample(&mut self, now: Instant) -> f32 {
        let start = *self.start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start).as_secs_f32();
        self.last = self.last.max(elapsed);
        self.last
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }
}

/// Rolling frames-per-second counter, reported once a second.
#[derive(Debug, Default)]
pub struct FrameStats {
    last_update: Option<Instant>,
    frames_since_update: u32,
    frames_per_second: f32,
    frame_count: u64,
}

impl FrameStats {
    pub fn record(&mut self, now: Instant, elapsed: f32) {
        self.frame_count += 1;
        self.frames_since_update += 1;
        let last_update = *self.last_update.get_or_insert(now);
        let since = now.saturating_duration_since(last_update);
        if since >= Duration::from_secs(1) {
            self.frames_per_second = self.frames_since_update as f32 / since.as_secs_f32();
            self.frames_since_update = 0;
            self.last_update = Some(now);
            debug!(
                fps = self.frames_per_second.round(),
                frame_count = self.frame_count,
                time = elapsed,
                "render stats"
            );
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frames_per_second(&self) -> f32 {
        self.frames_per_second
    }
}

#[derive(Debug)]
pub struct FrameDriver {
    state: DriverState,
    clock: FrameClock,
    stats: FrameStats,
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDriver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Idle,
            clock: FrameClock::default(),
            stats: FrameStats::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn pending_token(&self) -> Option<FrameToken> {
        match self.state {
            DriverState::Scheduled(token) => Some(token),
            _ => None,
        }
    }

    /// Requests the first frame. Only valid from `Idle`.
    pub fn start<S>(&mut self, scheduler: &mut S) -> Option<FrameToken>
    where
        S: FrameScheduler + ?Sized,
    {
        match self.state {
            DriverState::Idle => {
                let token = scheduler.request_frame();
                trace!(%token, "frame scheduled");
                self.state = DriverState::Scheduled(token);
                Some(token)
            }
            DriverState::Scheduled(token) => Some(token),
            DriverState::Running | DriverState::Cancelled => None,
        }
    }

    /// Liveness check: enters `Running` only for the pending token.
    pub fn begin(&mut self, token: FrameToken) -> bool {
        match self.state {
            DriverState::Scheduled(pending) if pending == token => {
                self.state = DriverState::Running;
                true
            }
            state => {
                trace!(%token, ?state, "ignoring stale frame callback");
                false
            }
        }
    }

    /// Schedules the next frame after a tick.
    pub fn reschedule<S>(&mut self, scheduler: &mut S) -> Option<FrameToken>
    where
        S: FrameScheduler + ?Sized,
    {
        if self.state != DriverState::Running {
            return None;
        }
        let token = scheduler.request_frame();
        trace!(%token, "frame scheduled");
        self.state = DriverState::Scheduled(token);
        Some(token)
    }

    /// Cancels any pending frame and stops for good. Idempotent.
    pub fn stop<S>(&mut self, scheduler: &mut S)
    where
        S: FrameScheduler + ?Sized,
    {
        if let DriverState::Scheduled(token) = self.state {
            scheduler.cancel_frame(token);
            trace!(%token, "frame cancelled");
        }
        if self.state != DriverState::Cancelled {
            debug!(frames = self.stats.frame_count(), "frame driver stopped");
        }
        self.state = DriverState::Cancelled;
    }

    /// Parks a running driver after a fatal frame error.
    pub fn halt(&mut self) {
        if self.state == DriverState::Running {
            self.state = DriverState::Idle;
        }
    }

    /// Elapsed seconds for the running tick.
    pub fn sample_time(&mut self, now: Instant) -> f32 {
        self.clock.sample(now)
    }

    pub fn record_frame(&mut self, now: Instant, elapsed: f32) {
        self.stats.record(now, elapsed);
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scheduler {
        next: u64,
        cancelled: Vec<FrameToken>,
    }

    impl FrameScheduler for Scheduler {
        fn request_frame(&mut self) -> FrameToken {
            self.next += 1;
            FrameToken(self.next)
        }

        fn cancel_frame(&mut self, token: FrameToken) {
            self.cancelled.push(token);
        }
    }

    #[test]
    fn walks_through_tick_cycle() {
        let mut scheduler = Scheduler::default();
        let mut driver = FrameDriver::new();
        assert_eq!(driver.state(), DriverState::Idle);

        let first = driver.start(&mut scheduler).expect("scheduled");
        assert_eq!(driver.state(), DriverState::Scheduled(first));
        assert!(driver.begin(first));
        assert_eq!(driver.state(), DriverState::Running);

        let second = driver.reschedule(&mut scheduler).expect("rescheduled");
        assert_ne!(first, second);
        assert_eq!(driver.pending_token(), Some(second));
    }

    #[test]
    fn rejects_stale_tokens() {
        let mut scheduler = Scheduler::default();
        let mut driver = FrameDriver::new();
        let first = driver.start(&mut scheduler).expect("scheduled");
        assert!(driver.begin(first));
        driver.reschedule(&mut scheduler);

        assert!(!driver.begin(first));
        assert!(matches!(driver.state(), DriverState::Scheduled(_)));
    }

    #[test]
    fn stop_cancels_once_and_is_terminal() {
        let mut scheduler = Scheduler::default();
        let mut driver = FrameDriver::new();
        let token = driver.start(&mut scheduler).expect("scheduled");

        driver.stop(&mut scheduler);
        driver.stop(&mut scheduler);
        assert_eq!(scheduler.cancelled, vec![token]);
        assert_eq!(driver.state(), DriverState::Cancelled);
        assert!(!driver.begin(token));
        assert!(driver.start(&mut scheduler).is_none());
    }

    #[test]
    fn halt_parks_running_driver() {
        let mut scheduler = Scheduler::default();
        let mut driver = FrameDriver::new();
        let token = driver.start(&mut scheduler).expect("scheduled");
        assert!(driver.begin(token));
        driver.halt();
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(driver.reschedule(&mut scheduler).is_none());
    }

    #[test]
    fn clock_latches_on_first_sample_and_never_rewinds() {
        let mut clock = FrameClock::default();
        let base = Instant::now() + Duration::from_secs(10);
        assert!(!clock.is_started());
        assert_eq!(clock.sample(base), 0.0);
        assert!((clock.sample(base + Duration::from_millis(500)) - 0.5).abs() < 1e-6);
        // A timestamp from before the previous sample does not move time back.
        assert!((clock.sample(base + Duration::from_millis(200)) - 0.5).abs() < 1e-6);
        assert!((clock.sample(base + Duration::from_secs(2)) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn stats_report_fps_after_one_second() {
        let mut stats = FrameStats::default();
        let base = Instant::now();
        for frame in 0..=60 {
            stats.record(base + Duration::from_millis(frame * 1000 / 60), 0.0);
        }
        assert_eq!(stats.frame_count(), 61);
        let fps = stats.frames_per_second();
        assert!((55.0..=65.0).contains(&fps), "fps was {fps}");
    }
}
