//! One-shot broadcast signals.
//!
//! A signal fires by dropping the only sender of a zero-capacity channel.
//! Every receiver clone then observes a disconnect, so a fired signal can
//! be waited on by any number of threads and used directly in `select!`.

use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Create a linked trigger/signal pair.
pub(crate) fn signal() -> (Trigger, Signal) {
    let (tx, rx) = bounded::<()>(0);
    (
        Trigger {
            tx: Mutex::new(Some(tx)),
        },
        Signal { rx },
    )
}

/// Firing side. Firing is idempotent; dropping the trigger fires it too.
#[derive(Debug)]
pub(crate) struct Trigger {
    tx: Mutex<Option<Sender<()>>>,
}

impl Trigger {
    pub(crate) fn fire(&self) {
        match self.tx.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }
}

/// Observing side of a one-shot signal.
#[derive(Debug, Clone)]
pub struct Signal {
    rx: Receiver<()>,
}

impl Signal {
    /// Block until the signal fires.
    pub fn wait(&self) {
        // Nothing is ever sent; recv only returns on disconnect.
        let _ = self.rx.recv();
    }

    /// Block until the signal fires or `timeout` elapses. Returns true if
    /// the signal fired.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected) | Ok(())
        )
    }

    /// Non-blocking check.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected) | Ok(()))
    }

    /// Underlying receiver, for use in `crossbeam_channel::select!`. A
    /// `recv` on it completes (with an error) once the signal fires.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
