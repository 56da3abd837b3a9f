//! Periodic timers
//!
//! A timer runs a tick closure on its own thread, first after an initial
//! delay and then at a fixed rate. Ticks never overlap since a single thread
//! runs them. Stopping a timer from inside its own tick is allowed: the
//! worker is detached instead of joined and exits once the tick returns.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Work run on every tick
pub type Tick = Box<dyn FnMut() + Send>;

const THREAD_NAME: &str = "raspio-timer";

/// Fixed-rate timer
pub trait PeriodicTimer: Send {
    /// Run `tick` after `delay`, then every `interval`
    ///
    /// A running timer is stopped first.
    fn start(&mut self, delay: Duration, interval: Duration, tick: Tick) -> io::Result<()>;

    /// Stop ticking; no-op when stopped
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Timer implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TimerKind {
    /// Sleeps until each deadline
    #[default]
    Standard,
    /// Sleeps most of the way, then spins to the deadline
    HighResolution,
}

impl TimerKind {
    pub fn create(self) -> Box<dyn PeriodicTimer> {
        match self {
            TimerKind::Standard => Box::new(StandardTimer::new()),
            TimerKind::HighResolution => Box::new(HighResolutionTimer::new()),
        }
    }
}

/// Next deadline, skipping ticks that were missed entirely
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next < now {
        now
    } else {
        next
    }
}

/// Join a worker unless called from the worker itself
fn join_worker(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        warn!("timer tick panicked");
    }
}

/// Sleeping timer, woken early through a channel to stop
#[derive(Debug, Default)]
pub struct StandardTimer {
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl StandardTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeriodicTimer for StandardTimer {
    fn start(&mut self, delay: Duration, interval: Duration, mut tick: Tick) -> io::Result<()> {
        self.stop();

        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                let mut deadline = Instant::now() + delay;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            tick();
                            deadline = next_deadline(deadline, interval, Instant::now());
                        }
                        // Stop request, or the timer was dropped
                        _ => break,
                    }
                }
            })?;

        debug!("standard timer started ({interval:?} interval)");
        self.worker = Some((stop, handle));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((stop, handle)) = self.worker.take() {
            let _ = stop.send(());
            join_worker(handle);
            debug!("standard timer stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for StandardTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Timer finishing each wait with a spin loop
///
/// Sleeps until [`SPIN_MARGIN`](Self::SPIN_MARGIN) before the deadline,
/// then spins. Costs one core while spinning in exchange for tick jitter
/// below the scheduler's granularity.
#[derive(Debug, Default)]
pub struct HighResolutionTimer {
    worker: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl HighResolutionTimer {
    pub const SPIN_MARGIN: Duration = Duration::from_millis(1);

    pub fn new() -> Self {
        Self::default()
    }
}

impl PeriodicTimer for HighResolutionTimer {
    fn start(&mut self, delay: Duration, interval: Duration, mut tick: Tick) -> io::Result<()> {
        self.stop();

        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                let mut deadline = Instant::now() + delay;
                'ticks: loop {
                    let now = Instant::now();
                    if deadline > now + Self::SPIN_MARGIN {
                        thread::park_timeout(deadline - now - Self::SPIN_MARGIN);
                        // Woken early by stop or spuriously
                        if Instant::now() + Self::SPIN_MARGIN < deadline {
                            if flag.load(Ordering::Acquire) {
                                break;
                            }
                            continue;
                        }
                    }
                    while Instant::now() < deadline {
                        if flag.load(Ordering::Acquire) {
                            break 'ticks;
                        }
                        std::hint::spin_loop();
                    }
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    tick();
                    deadline = next_deadline(deadline, interval, Instant::now());
                }
            })?;

        debug!("high resolution timer started ({interval:?} interval)");
        self.worker = Some((stopped, handle));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((stopped, handle)) = self.worker.take() {
            stopped.store(true, Ordering::Release);
            handle.thread().unpark();
            join_worker(handle);
            debug!("high resolution timer stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for HighResolutionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn counting_tick(count: &Arc<AtomicUsize>) -> Tick {
        let count = count.clone();
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn check_ticks(mut timer: Box<dyn PeriodicTimer>) {
        let count = Arc::new(AtomicUsize::new(0));
        timer
            .start(Duration::from_millis(5), Duration::from_millis(10), counting_tick(&count))
            .unwrap();
        assert!(timer.is_running());

        thread::sleep(Duration::from_millis(100));
        timer.stop();
        assert!(!timer.is_running());

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 3, "only {ticks} ticks");

        // No ticks after stop returned
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }

    #[test]
    fn test_standard_timer_ticks() {
        check_ticks(TimerKind::Standard.create());
    }

    #[test]
    fn test_high_resolution_timer_ticks() {
        check_ticks(TimerKind::HighResolution.create());
    }

    #[test]
    fn test_initial_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timer = StandardTimer::new();
        timer
            .start(Duration::from_millis(200), Duration::from_millis(10), counting_tick(&count))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        timer.stop();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_from_inside_tick() {
        for kind in [TimerKind::Standard, TimerKind::HighResolution] {
            let timer: Arc<Mutex<Option<Box<dyn PeriodicTimer>>>> = Arc::new(Mutex::new(None));
            let count = Arc::new(AtomicUsize::new(0));

            let handle = timer.clone();
            let ticks = count.clone();
            let mut created = kind.create();
            created
                .start(
                    Duration::from_millis(20),
                    Duration::from_millis(5),
                    Box::new(move || {
                        ticks.fetch_add(1, Ordering::SeqCst);
                        if let Some(timer) = handle.lock().unwrap().as_mut() {
                            timer.stop();
                        }
                    }),
                )
                .unwrap();
            *timer.lock().unwrap() = Some(created);

            thread::sleep(Duration::from_millis(80));
            assert_eq!(count.load(Ordering::SeqCst), 1, "{kind:?}");
            assert!(!timer.lock().unwrap().as_ref().unwrap().is_running());
        }
    }

    #[test]
    fn test_restart_replaces_worker() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut timer = StandardTimer::new();
        timer
            .start(Duration::ZERO, Duration::from_millis(5), counting_tick(&first))
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        timer
            .start(Duration::ZERO, Duration::from_millis(5), counting_tick(&second))
            .unwrap();
        let frozen = first.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        timer.stop();

        assert_eq!(first.load(Ordering::SeqCst), frozen);
        assert!(second.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_missed_deadlines_are_skipped() {
        let start = Instant::now();
        let late = start + Duration::from_millis(100);
        assert_eq!(next_deadline(start, Duration::from_millis(10), late), late);
        assert_eq!(
            next_deadline(start, Duration::from_millis(10), start),
            start + Duration::from_millis(10)
        );
    }
}
