//! Periodic background tick
//!
//! A `Ticker` owns one named thread that calls its callback every `period`
//! until stopped. Deadlines advance by whole periods, so a slow callback does
//! not shift the cadence.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a running tick thread; dropping it stops the thread
#[derive(Debug)]
pub(crate) struct Ticker {
    signal: Arc<Signal>,
}

impl Ticker {
    /// Spawn the tick thread. The callback returns `false` to stop ticking.
    pub fn spawn<F>(name: String, period: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let signal = Arc::new(Signal::default());
        let thread_signal = Arc::clone(&signal);

        thread::Builder::new().name(name).spawn(move || {
            let mut stopped = thread_signal.stopped.lock();
            let mut deadline = Instant::now() + period;

            loop {
                while !*stopped {
                    if thread_signal
                        .wake
                        .wait_until(&mut stopped, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                if *stopped {
                    break;
                }

                let keep_going = MutexGuard::unlocked(&mut stopped, &mut tick);
                if !keep_going {
                    break;
                }
                deadline += period;
            }

            debug!("Tick thread exiting");
        })?;

        Ok(Self { signal })
    }

    /// Ask the thread to exit; it wakes immediately and never ticks again
    pub fn stop(&self) {
        let mut stopped = self.signal.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.signal.wake.notify_all();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
