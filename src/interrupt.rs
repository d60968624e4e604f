//! A cloneable interrupt signal.
//!
//! The Ctrl-C handler runs on its own thread and only sets a flag.  Code that
//! prints in a loop polls [`Interrupt::is_set`]; code that awaits the network
//! races its future against [`Interrupt::triggered`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Shared interrupt flag with async notification.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    /// Creates a cleared interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every task waiting in [`Interrupt::triggered`].
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clears the flag before the next turn.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// True when an interrupt arrived since the last reset.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The underlying flag, for renderers that poll it.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Resolves once the interrupt is set.
    pub async fn triggered(&self) {
        loop {
            // Register before checking so a trigger in between is not lost.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Installs a process-wide Ctrl-C handler that triggers this interrupt.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let interrupt = self.clone();
        ctrlc::set_handler(move || interrupt.trigger())
    }
}
