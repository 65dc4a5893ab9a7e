//! Band Scheduler — fixed-rate Control thread plus fire-and-forget
//! background bands, with no inter-band locks.
//!
//! Grounded on `hti/core/scheduler.py`'s `BandScheduler`: Control drives a
//! fixed-period loop on its own OS thread and never joins background
//! threads; on overrun the next deadline resets to `now` instead of
//! accruing debt, so advisory bands keep their CPU share under pressure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Drives one fixed-rate Control thread and any number of fire-and-forget
/// background threads for advisory bands.
pub struct BandScheduler {
    period: Duration,
    stop: Arc<AtomicBool>,
    control_thread: Option<JoinHandle<()>>,
}

impl BandScheduler {
    pub fn new(control_hz: f64) -> Self {
        assert!(control_hz > 0.0, "control_hz must be positive");
        Self {
            period: Duration::from_secs_f64(1.0 / control_hz),
            stop: Arc::new(AtomicBool::new(false)),
            control_thread: None,
        }
    }

    /// Starts the Control band. A panic inside `tick` is caught, logged, and
    /// swallowed — the Shield is responsible for safe actuation on the next
    /// successful tick. No-op if already started.
    pub fn start_control<F>(&mut self, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.control_thread.is_some() {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let period = self.period;

        let handle = std::thread::Builder::new()
            .name("control-band".to_string())
            .spawn(move || {
                let mut next_t = Instant::now();
                while !stop.load(Ordering::SeqCst) {
                    if let Err(_) = catch_unwind(AssertUnwindSafe(|| tick())) {
                        tracing::warn!("control tick panicked; swallowing and continuing");
                    }

                    next_t += period;
                    let now = Instant::now();
                    if next_t > now {
                        std::thread::sleep(next_t - now);
                    } else {
                        // Overran: drop the backlog instead of catching up.
                        next_t = Instant::now();
                    }
                }
            })
            .expect("failed to spawn control-band thread");

        self.control_thread = Some(handle);
    }

    /// Fire-and-forget background band. Control never joins or shares a lock
    /// with this thread.
    pub fn run_background<F>(&self, band: F)
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::spawn(band);
    }

    /// Sets the cancellation flag and joins the Control thread with a bounded
    /// timeout. Background threads are left to terminate with the process.
    pub fn stop(&mut self, timeout: Duration) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.control_thread.take() {
            join_with_timeout(handle, timeout);
        }
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("control-band thread did not stop within the bounded join timeout");
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    let _ = handle.join();
}
