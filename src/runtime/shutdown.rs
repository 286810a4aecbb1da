//! Shutdown signalling for the event loop.
//!
//! The loop only needs a "keep running" flag and a way to be woken from
//! its wait. Signal delivery happens on a separate thread that touches
//! nothing but those two.

use mio::Waker;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Cloneable handle that asks the event loop to stop.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(running: Arc<AtomicBool>, waker: Arc<Waker>) -> Self {
        Self { running, waker }
    }

    /// Clear the running flag and wake the loop so it observes it.
    pub fn trigger(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }
    }
}

/// Trigger `handle` on SIGINT or SIGTERM.
///
/// Spawns a thread that waits for the first signal.
pub fn install_signal_handlers(handle: ShutdownHandle) -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Shutdown signal received");
                handle.trigger();
            }
        })?;

    Ok(())
}
