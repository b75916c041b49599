use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::*;

pub trait CancellationToken: 'static + Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Cancellation token backed by a shared flag.
///
/// Clones observe the same flag.
#[derive(Clone, Default, Debug)]
pub struct CancellationFlag {
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }
}

impl CancellationToken for CancellationFlag {
    fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Failures of a blocking transform step.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum TransformError {
    #[fail(display = "Timed out waiting for {}", stage)]
    Timeout { stage: &'static str },

    #[fail(display = "Cancelled while waiting for {}", stage)]
    Cancelled { stage: &'static str },
}

/// Bounds on how long a busy-wait may spin.
///
/// The default policy spins forever, which assumes the device always finishes
/// a started operation.
#[derive(Clone, Default)]
pub struct PollPolicy {
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<dyn CancellationToken>>,
}

/// Number of spins between checks of the clock and cancellation token.
const CHECK_INTERVAL: usize = 64;

impl PollPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation<C: CancellationToken>(mut self, token: C) -> Self {
        self.cancel = Some(Arc::new(token));
        self
    }

    /// Spins until 'ready' returns true.
    pub fn wait<F: FnMut() -> bool>(&self, stage: &'static str, mut ready: F) -> Result<()> {
        let start = Instant::now();
        let mut spins = 0;

        while !ready() {
            spins += 1;
            if spins % CHECK_INTERVAL != 0 {
                std::hint::spin_loop();
                continue;
            }

            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(TransformError::Cancelled { stage }.into());
                }
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    return Err(TransformError::Timeout { stage }.into());
                }
            }
        }

        Ok(())
    }
}
