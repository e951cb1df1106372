// Heartbeat - Cancellable periodic task driving the scheduler
//
// Ticks are spaced against absolute deadlines so a slow pass does not push
// every later tick back. A panic inside the callback is caught and logged; the
// loop keeps running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a running heartbeat thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct Heartbeat {
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl Heartbeat {
    /// Spawn a thread calling `tick` every `period`
    pub fn start<F>(period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));
        let running_clone = running.clone();
        let ticks_clone = ticks.clone();

        let handle = thread::Builder::new()
            .name("sequencer-heartbeat".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while running_clone.load(Ordering::Acquire) {
                    if panic::catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                        log::error!(target: "sequencer::heartbeat", "heartbeat callback panicked");
                    }
                    ticks_clone.fetch_add(1, Ordering::Relaxed);

                    deadline += period;
                    let now = Instant::now();
                    if deadline <= now {
                        // Fell behind; resynchronise instead of bursting
                        deadline = now;
                        continue;
                    }
                    thread::park_timeout(deadline - now);
                }
            })?;

        log::debug!(target: "sequencer::heartbeat", "heartbeat armed ({:?})", period);
        Ok(Self {
            running,
            ticks,
            handle: Some(handle),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }

    /// Number of completed ticks
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for the current tick to finish
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!(
                    target: "sequencer::heartbeat",
                    "heartbeat thread terminated abnormally"
                );
            }
            log::debug!(target: "sequencer::heartbeat", "heartbeat disarmed");
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
