//! Wall-clock tick generator.
//!
//! The ticker is a thread that, while awake, sleeps until its next deadline
//! and then queues a batch of tick requests. Deadlines advance by one
//! interval per firing and only restart when the ticker wakes up or its rate
//! changes. It never touches circuit state; the propagation worker applies
//! the ticks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use super::requests::RequestQueue;
use crate::error::{GatesimError, Result};

/// Sleep interval and ticks queued per wakeup for a tick frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    pub interval: Duration,
    pub ticks_per_interval: u32,
}

impl TickRate {
    /// Convert a frequency in Hz.
    ///
    /// Up to 1 kHz the ticker wakes every `round(1000 / hz)` ms and queues a
    /// single tick. Above that it wakes every millisecond and queues
    /// `round(hz / 1000)` ticks.
    pub fn from_frequency(hz: f64) -> Result<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(GatesimError::param(format!(
                "tick frequency must be positive and finite, got {hz}"
            )));
        }
        let millis = (1000.0 / hz).round();
        if millis > 0.0 {
            Ok(Self {
                interval: Duration::from_millis(millis as u64),
                ticks_per_interval: 1,
            })
        } else {
            Ok(Self {
                interval: Duration::from_millis(1),
                ticks_per_interval: (hz / 1000.0).round().min(u32::MAX as f64) as u32,
            })
        }
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            ticks_per_interval: 1,
        }
    }
}

#[derive(Debug)]
struct TickerState {
    awake: bool,
    rate: TickRate,
    /// When the next batch fires; `None` restarts the interval from now
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug)]
struct TickerShared {
    state: Mutex<TickerState>,
    wake: Condvar,
    queue: Arc<RequestQueue>,
}

/// Handle to a running ticker thread. Cloning shares the same thread.
#[derive(Debug, Clone)]
pub(crate) struct Ticker {
    shared: Arc<TickerShared>,
}

impl Ticker {
    /// Start the ticker thread, initially asleep.
    pub fn spawn(queue: Arc<RequestQueue>, rate: TickRate) -> Result<(Self, JoinHandle<()>)> {
        let shared = Arc::new(TickerShared {
            state: Mutex::new(TickerState {
                awake: false,
                rate,
                deadline: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
            queue,
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("gatesim-ticker".to_string())
            .spawn(move || run(&worker))
            .map_err(|source| GatesimError::Spawn {
                name: "ticker".to_string(),
                source,
            })?;
        Ok((Self { shared }, handle))
    }

    /// Apply `f` and wake the thread if it reported a change.
    fn update(&self, f: impl FnOnce(&mut TickerState) -> bool) {
        let mut state = self.shared.state.lock();
        let changed = f(&mut state);
        drop(state);
        if changed {
            self.shared.wake.notify_all();
        }
    }

    /// Renewing the current setting is a no-op and keeps the pending deadline.
    pub fn set_awake(&self, awake: bool) {
        self.update(|s| {
            if s.awake == awake {
                return false;
            }
            s.awake = awake;
            s.deadline = None;
            true
        });
    }

    pub fn is_awake(&self) -> bool {
        self.shared.state.lock().awake
    }

    pub fn set_rate(&self, rate: TickRate) {
        self.update(|s| {
            if s.rate == rate {
                return false;
            }
            s.rate = rate;
            s.deadline = None;
            true
        });
    }

    pub fn rate(&self) -> TickRate {
        self.shared.state.lock().rate
    }

    /// Queue a single tick right away.
    pub fn tick_once(&self) -> bool {
        self.shared.queue.request_tick()
    }

    pub fn shutdown(&self) {
        self.update(|s| {
            s.shutdown = true;
            true
        });
    }
}

fn run(shared: &TickerShared) {
    debug!("ticker started");
    let mut state: MutexGuard<'_, TickerState> = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        if !state.awake {
            shared.wake.wait(&mut state);
            continue;
        }
        let rate = state.rate;
        let deadline = *state.deadline.get_or_insert_with(|| Instant::now() + rate.interval);
        shared.wake.wait_until(&mut state, deadline);
        // Settings may have changed while waiting; re-read them
        if state.shutdown || !state.awake || state.deadline != Some(deadline) {
            continue;
        }
        let now = Instant::now();
        if now < deadline {
            continue;
        }
        // Fall back to now when far behind rather than firing a burst
        let next = deadline + rate.interval;
        state.deadline = Some(if next < now { now + rate.interval } else { next });
        let queue = &shared.queue;
        let accepted = MutexGuard::unlocked(&mut state, || {
            (0..rate.ticks_per_interval).filter(|_| queue.request_tick()).count()
        });
        trace!(accepted, "ticker fired");
    }
    debug!("ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_from_low_frequency() {
        let rate = TickRate::from_frequency(1.0).unwrap();
        assert_eq!(rate.interval, Duration::from_millis(1000));
        assert_eq!(rate.ticks_per_interval, 1);

        let rate = TickRate::from_frequency(3.0).unwrap();
        assert_eq!(rate.interval, Duration::from_millis(333));
        assert_eq!(rate.ticks_per_interval, 1);
    }

    #[test]
    fn test_rate_from_high_frequency() {
        let rate = TickRate::from_frequency(4096.0).unwrap();
        assert_eq!(rate.interval, Duration::from_millis(1));
        assert_eq!(rate.ticks_per_interval, 4);

        // 1000 / 1500 rounds to 1 ms, so a single tick
        let rate = TickRate::from_frequency(1500.0).unwrap();
        assert_eq!(rate.interval, Duration::from_millis(1));
        assert_eq!(rate.ticks_per_interval, 1);
    }

    #[test]
    fn test_rate_rejects_bad_frequency() {
        assert!(TickRate::from_frequency(0.0).is_err());
        assert!(TickRate::from_frequency(-2.0).is_err());
        assert!(TickRate::from_frequency(f64::NAN).is_err());
        assert!(TickRate::from_frequency(f64::INFINITY).is_err());
    }

    #[test]
    fn test_ticker_queues_ticks_only_when_awake() {
        let queue = Arc::new(RequestQueue::new(16, true));
        let rate = TickRate {
            interval: Duration::from_millis(5),
            ticks_per_interval: 2,
        };
        let (ticker, handle) = Ticker::spawn(Arc::clone(&queue), rate).unwrap();

        thread::sleep(Duration::from_millis(40));
        assert_eq!(queue.lock().ticks, 0);

        ticker.set_awake(true);
        thread::sleep(Duration::from_millis(60));
        ticker.set_awake(false);
        let ticks = queue.lock().ticks;
        assert!(ticks >= 2, "expected ticks, got {ticks}");
        assert!(ticks <= 16);

        assert!(ticker.tick_once() || ticks == 16);
        ticker.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_repeated_renewals_keep_ticking() {
        let queue = Arc::new(RequestQueue::new(64, true));
        let rate = TickRate::from_frequency(10.0).unwrap();
        let (ticker, handle) = Ticker::spawn(Arc::clone(&queue), rate).unwrap();
        ticker.set_awake(true);

        // Renew the same settings more often than the interval
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(600) {
            ticker.set_awake(true);
            ticker.set_rate(rate);
            thread::sleep(Duration::from_millis(50));
        }
        let ticks = queue.lock().ticks;
        assert!(ticks >= 3, "expected ticks despite renewals, got {ticks}");

        ticker.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_rate_change_restarts_interval() {
        let queue = Arc::new(RequestQueue::new(64, true));
        let slow = TickRate {
            interval: Duration::from_secs(60),
            ticks_per_interval: 1,
        };
        let (ticker, handle) = Ticker::spawn(Arc::clone(&queue), slow).unwrap();
        ticker.set_awake(true);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.lock().ticks, 0);

        ticker.set_rate(TickRate {
            interval: Duration::from_millis(5),
            ticks_per_interval: 1,
        });
        thread::sleep(Duration::from_millis(80));
        assert!(queue.lock().ticks >= 1);
        assert_eq!(ticker.rate().interval, Duration::from_millis(5));

        ticker.shutdown();
        handle.join().unwrap();
    }
}
