//! Inspection timing: per-frame accumulators and overtriggering detection.
//!
//! The timer is the one piece of explicitly shared, lock-protected mutable
//! state in the core: worker completion callbacks feed processing durations
//! into it concurrently with the dispatcher thread reading averages for
//! periodic logging and status snapshots. Every other cross-thread handoff
//! goes through [`ProcessingThread`](crate::worker::ProcessingThread)'s own
//! synchronization.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Graded verdict of the inter-trigger time check. Ordered by severity so
/// monotonicity in elapsed time can be asserted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OvertriggeringResult {
    /// Within tolerance.
    EverythingOk,
    /// Approaching the limit; logged, frame still processed.
    Dangerous,
    /// Very close to the limit; the conservative policy decides whether the
    /// frame is pre-emptively skipped or still attempted.
    Critical,
    /// Limit exceeded; the frame must not run the graph.
    Overtriggered,
}

/// Classifies an elapsed inter-trigger time against the expected interval
/// plus tolerance. Pure; `check_overtriggering` wraps it with wall-clock
/// bookkeeping.
///
/// Band edges for expected `d` and tolerance `t`:
/// `Ok <= d + t/2 < Dangerous <= d + 9t/10 < Critical <= d + t < Overtriggered`.
/// The exact fractions are policy; monotonicity in `elapsed` is the
/// contract.
pub fn classify_trigger_interval(
    elapsed: Duration,
    expected: Duration,
    tolerance: Duration,
) -> OvertriggeringResult {
    let e = elapsed.as_nanos();
    let d = expected.as_nanos();
    let t = tolerance.as_nanos();

    if e <= d + t / 2 {
        OvertriggeringResult::EverythingOk
    } else if e <= d + t * 9 / 10 {
        OvertriggeringResult::Dangerous
    } else if e <= d + t {
        OvertriggeringResult::Critical
    } else {
        OvertriggeringResult::Overtriggered
    }
}

/// How many recent per-image durations feed the rolling average.
const RECENT_HISTORY: usize = 10;

#[derive(Debug, Default)]
struct Accumulator {
    total: Duration,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, time: Duration) {
        self.total += time;
        self.count += 1;
    }

    fn last_entry_us(&self, last: Option<Duration>) -> Option<(u32, f64)> {
        last.map(|d| (self.count, d.as_secs_f64() * 1e6))
    }
}

#[derive(Debug, Default)]
struct TimerState {
    last_trigger: Option<Instant>,
    image_processing: Accumulator,
    last_image_time: Option<Duration>,
    sample_processing: Accumulator,
    dispatcher: Accumulator,
    last_dispatcher_time: Option<Duration>,
    recent_image_times: VecDeque<Duration>,
}

/// Tracks per-frame and accumulated timings and evaluates overtriggering.
#[derive(Debug, Default)]
pub struct InspectTimer {
    state: Mutex<TimerState>,
}

impl InspectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates the elapsed wall-clock time since the previous trigger
    /// against `expected` plus `tolerance` and records the arrival.
    ///
    /// Purely a classifier: it never drops frames itself; the dispatcher
    /// decides the consequence per mode. `conservative` only affects how a
    /// `Critical` verdict is logged here; the pre-emptive skip is the
    /// dispatcher's call.
    pub fn check_overtriggering(
        &self,
        expected: Duration,
        image_number: i32,
        conservative: bool,
        tolerance: Duration,
    ) -> OvertriggeringResult {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let previous = state.last_trigger.replace(now);

        let Some(previous) = previous else {
            // first trigger of the seam, nothing to compare against
            return OvertriggeringResult::EverythingOk;
        };

        let elapsed = now.duration_since(previous);
        let verdict = classify_trigger_interval(elapsed, expected, tolerance);
        match verdict {
            OvertriggeringResult::EverythingOk => {}
            OvertriggeringResult::Dangerous => {
                warn!(
                    image_number,
                    elapsed_us = elapsed.as_micros() as u64,
                    expected_us = expected.as_micros() as u64,
                    "trigger interval approaching limit"
                );
            }
            OvertriggeringResult::Critical => {
                warn!(
                    image_number,
                    elapsed_us = elapsed.as_micros() as u64,
                    expected_us = expected.as_micros() as u64,
                    conservative,
                    "trigger interval critical"
                );
            }
            OvertriggeringResult::Overtriggered => {
                warn!(
                    image_number,
                    elapsed_us = elapsed.as_micros() as u64,
                    expected_us = expected.as_micros() as u64,
                    "system too slow for trigger frequency"
                );
            }
        }
        verdict
    }

    /// Records one graph run over an image frame. Called from worker
    /// threads.
    pub fn update_processing_time(&self, time: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.image_processing.add(time);
        state.last_image_time = Some(time);
        if state.recent_image_times.len() == RECENT_HISTORY {
            state.recent_image_times.pop_front();
        }
        state.recent_image_times.push_back(time);
    }

    /// Records one graph run over a sample-only frame.
    pub fn update_sample_processing_time(&self, time: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sample_processing.add(time);
    }

    /// Records time spent inside the dispatcher entry points.
    /// `increase_frame_count` distinguishes calls that actually dispatched
    /// a frame from ones that only queued data.
    pub fn update_dispatcher_time(&self, time: Duration, increase_frame_count: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if increase_frame_count {
            state.dispatcher.add(time);
        } else {
            state.dispatcher.total += time;
        }
        state.last_dispatcher_time = Some(time);
    }

    /// Rolling average graph processing time over the recent history, in
    /// microseconds.
    pub fn processing_time_us(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.recent_image_times.is_empty() {
            return 0;
        }
        let total: Duration = state.recent_image_times.iter().sum();
        (total / state.recent_image_times.len() as u32).as_micros() as u64
    }

    /// (frame count, last image processing time in µs), if any frame has
    /// been processed.
    pub fn last_image_time_us(&self) -> Option<(u32, f64)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.image_processing.last_entry_us(state.last_image_time)
    }

    /// (frame count, last dispatcher time in µs), if any frame has been
    /// dispatched.
    pub fn last_dispatcher_time_us(&self) -> Option<(u32, f64)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.dispatcher.last_entry_us(state.last_dispatcher_time)
    }

    /// Resets all accumulators. Called at the start of each seam.
    pub fn reset_accumulated(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = TimerState::default();
    }

    /// Logs the accumulated timings, typically at seam end.
    pub fn log_accumulated(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let avg = |acc: &Accumulator| {
            if acc.count == 0 {
                0
            } else {
                (acc.total / acc.count).as_micros() as u64
            }
        };
        debug!(
            images = state.image_processing.count,
            image_avg_us = avg(&state.image_processing),
            samples = state.sample_processing.count,
            sample_avg_us = avg(&state.sample_processing),
            dispatcher_frames = state.dispatcher.count,
            dispatcher_avg_us = avg(&state.dispatcher),
            "accumulated seam timings"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: Duration = Duration::from_micros(1000);
    const TOLERANCE: Duration = Duration::from_micros(200);

    fn classify_us(elapsed_us: u64) -> OvertriggeringResult {
        classify_trigger_interval(Duration::from_micros(elapsed_us), EXPECTED, TOLERANCE)
    }

    #[test]
    fn scenario_bands() {
        assert_eq!(classify_us(900), OvertriggeringResult::EverythingOk);
        assert_eq!(classify_us(1150), OvertriggeringResult::Dangerous);
        assert_eq!(classify_us(1190), OvertriggeringResult::Critical);
        assert_eq!(classify_us(1300), OvertriggeringResult::Overtriggered);
    }

    #[test]
    fn band_edges() {
        assert_eq!(classify_us(1100), OvertriggeringResult::EverythingOk);
        assert_eq!(classify_us(1101), OvertriggeringResult::Dangerous);
        assert_eq!(classify_us(1180), OvertriggeringResult::Dangerous);
        assert_eq!(classify_us(1181), OvertriggeringResult::Critical);
        assert_eq!(classify_us(1200), OvertriggeringResult::Critical);
        assert_eq!(classify_us(1201), OvertriggeringResult::Overtriggered);
    }

    #[test]
    fn monotonic_in_elapsed_time() {
        let mut previous = OvertriggeringResult::EverythingOk;
        for elapsed_us in (0..3000).step_by(7) {
            let verdict = classify_us(elapsed_us);
            assert!(
                verdict >= previous,
                "verdict regressed at {elapsed_us}us: {previous:?} -> {verdict:?}"
            );
            previous = verdict;
        }
    }

    #[test]
    fn first_trigger_is_always_ok() {
        let timer = InspectTimer::new();
        assert_eq!(
            timer.check_overtriggering(Duration::from_micros(1), 0, false, Duration::from_micros(1)),
            OvertriggeringResult::EverythingOk
        );
    }

    #[test]
    fn processing_average_uses_recent_history() {
        let timer = InspectTimer::new();
        for _ in 0..20 {
            timer.update_processing_time(Duration::from_micros(100));
        }
        timer.update_processing_time(Duration::from_micros(200));
        let avg = timer.processing_time_us();
        assert!(avg > 100 && avg <= 200, "avg was {avg}");
    }

    #[test]
    fn reset_clears_counts() {
        let timer = InspectTimer::new();
        timer.update_processing_time(Duration::from_micros(50));
        timer.update_dispatcher_time(Duration::from_micros(10), true);
        timer.reset_accumulated();
        assert_eq!(timer.last_image_time_us(), None);
        assert_eq!(timer.last_dispatcher_time_us(), None);
        assert_eq!(timer.processing_time_us(), 0);
    }
}
