//! Device-side kernel timing.

use crate::error::Result;

/// Device timestamps of one submitted command, in nanoseconds.
pub trait ProfilingEvent {
    fn command_start(&self) -> Result<u64>;
    fn command_end(&self) -> Result<u64>;
}

impl<E: ProfilingEvent + ?Sized> ProfilingEvent for &E {
    fn command_start(&self) -> Result<u64> {
        (**self).command_start()
    }

    fn command_end(&self) -> Result<u64> {
        (**self).command_end()
    }
}

/// A queue that can be drained.
pub trait QueueSync {
    /// Blocks until every command submitted so far has completed.
    fn finish(&self) -> Result<()>;
}

/// Start and end of one executed command, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub start_micros: u64,
    pub end_micros: u64,
}

impl CallStats {
    /// Reads the profiling timestamps of `event`.
    pub fn from_event<E: ProfilingEvent + ?Sized>(event: &E) -> Result<Self> {
        Ok(Self {
            start_micros: event.command_start()? / 1000,
            end_micros: event.command_end()? / 1000,
        })
    }

    pub fn duration_micros(&self) -> u64 {
        self.end_micros.saturating_sub(self.start_micros)
    }
}

/// Timing interface used by kernel tuning and benchmarking code.
pub trait Timer {
    fn start_timing(&mut self);
    fn stop_timing(&mut self) -> Result<()>;
    /// Stops and adds the elapsed time to the running total.
    fn accumulate_timing(&mut self) -> Result<()>;
    fn clear_timing(&mut self);
    fn elapsed_micros(&self) -> f64;
    fn accumulated_micros(&self) -> f64;
}

/// Timer reading device timestamps from a profiling event.
///
/// Every enqueue yields a new event, so repeated runs hand theirs over with
/// [`set_event`](Self::set_event); the running total survives the swap.
/// Measures one command at a time; overlapping timers on the same queue
/// are not supported.
pub struct ProfilingTimer<'a, Q: ?Sized, E> {
    queue: &'a Q,
    event: E,
    start_nanos: u64,
    stop_nanos: u64,
    accumulated_micros: f64,
}

impl<'a, Q, E> ProfilingTimer<'a, Q, E>
where
    Q: QueueSync + ?Sized,
    E: ProfilingEvent,
{
    pub fn new(queue: &'a Q, event: E) -> Self {
        Self {
            queue,
            event,
            start_nanos: 0,
            stop_nanos: 0,
            accumulated_micros: 0.0,
        }
    }

    /// Replaces the measured event and returns the previous one.
    pub fn set_event(&mut self, event: E) -> E {
        std::mem::replace(&mut self.event, event)
    }

    fn interval_micros(&self) -> f64 {
        self.stop_nanos.saturating_sub(self.start_nanos) as f64 / 1000.0
    }
}

impl<Q, E> Timer for ProfilingTimer<'_, Q, E>
where
    Q: QueueSync + ?Sized,
    E: ProfilingEvent,
{
    // Device timestamps are recorded at submission.
    fn start_timing(&mut self) {}

    fn stop_timing(&mut self) -> Result<()> {
        self.queue.finish()?;
        self.start_nanos = self.event.command_start()?;
        self.stop_nanos = self.event.command_end()?;
        Ok(())
    }

    fn accumulate_timing(&mut self) -> Result<()> {
        self.stop_timing()?;
        self.accumulated_micros += self.interval_micros();
        Ok(())
    }

    fn clear_timing(&mut self) {
        self.start_nanos = 0;
        self.stop_nanos = 0;
        self.accumulated_micros = 0.0;
    }

    fn elapsed_micros(&self) -> f64 {
        self.interval_micros()
    }

    fn accumulated_micros(&self) -> f64 {
        self.accumulated_micros
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeQueue {
        finishes: Cell<usize>,
    }

    impl FakeQueue {
        fn new() -> Self {
            Self {
                finishes: Cell::new(0),
            }
        }
    }

    impl QueueSync for FakeQueue {
        fn finish(&self) -> Result<()> {
            self.finishes.set(self.finishes.get() + 1);
            Ok(())
        }
    }

    #[derive(Debug, PartialEq)]
    struct FakeEvent {
        start: u64,
        end: u64,
    }

    impl FakeEvent {
        fn new(start: u64, end: u64) -> Self {
            Self { start, end }
        }
    }

    impl ProfilingEvent for FakeEvent {
        fn command_start(&self) -> Result<u64> {
            Ok(self.start)
        }

        fn command_end(&self) -> Result<u64> {
            Ok(self.end)
        }
    }

    #[test]
    fn test_accumulate_two_runs() {
        let queue = FakeQueue::new();
        let mut timer = ProfilingTimer::new(&queue, FakeEvent::new(100, 200));

        timer.start_timing();
        timer.accumulate_timing().unwrap();
        let first = timer.set_event(FakeEvent::new(300, 450));
        timer.start_timing();
        timer.accumulate_timing().unwrap();

        assert_eq!(first, FakeEvent::new(100, 200));
        assert!((timer.accumulated_micros() - 0.25).abs() < 1e-9);
        assert!((timer.elapsed_micros() - 0.15).abs() < 1e-9);
        assert_eq!(queue.finishes.get(), 2);
    }

    #[test]
    fn test_borrowed_events() {
        let queue = FakeQueue::new();
        let runs = [FakeEvent::new(0, 1_000), FakeEvent::new(2_000, 4_000)];
        let mut timer = ProfilingTimer::new(&queue, &runs[0]);

        timer.accumulate_timing().unwrap();
        timer.set_event(&runs[1]);
        timer.accumulate_timing().unwrap();

        assert_eq!(timer.accumulated_micros(), 3.0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let queue = FakeQueue::new();
        let mut timer = ProfilingTimer::new(&queue, FakeEvent::new(1_000, 5_000));

        timer.accumulate_timing().unwrap();
        assert!(timer.accumulated_micros() > 0.0);

        timer.clear_timing();
        assert_eq!(timer.accumulated_micros(), 0.0);
        assert_eq!(timer.elapsed_micros(), 0.0);
    }

    #[test]
    fn test_stop_does_not_accumulate() {
        let queue = FakeQueue::new();
        let mut timer = ProfilingTimer::new(&queue, FakeEvent::new(2_000, 6_000));

        timer.stop_timing().unwrap();
        assert_eq!(timer.elapsed_micros(), 4.0);
        assert_eq!(timer.accumulated_micros(), 0.0);
    }

    #[test]
    fn test_call_stats_truncates_to_micros() {
        let event = FakeEvent::new(1_999, 10_500);
        let stats = CallStats::from_event(&event).unwrap();
        assert_eq!(
            stats,
            CallStats {
                start_micros: 1,
                end_micros: 10
            }
        );
        assert_eq!(stats.duration_micros(), 9);
    }
}
