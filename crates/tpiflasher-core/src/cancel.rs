//! Cooperative cancellation
//!
//! Protocol loops poll a [`Cancellation`] between discrete steps. A token
//! can be cancelled from another thread (e.g. a Ctrl-C handler) and may
//! carry a deadline, which turns the unbounded NVM busy-wait into a bounded
//! one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared cancellation token
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A token that is only cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Request cancellation of every clone of this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag behind [`cancel`](Self::cancel)
    ///
    /// Setting it from anywhere, e.g. a signal handler, cancels every clone.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Whether the deadline, if any, has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` or `Timeout(operation)` if the caller should stop
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(Error::Timeout(operation));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared() {
        let token = Cancellation::new();
        let clone = token.clone();
        assert!(clone.check("poll").is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check("poll"), Err(Error::Cancelled)));
    }

    #[test]
    fn test_external_flag_cancels() {
        let token = Cancellation::with_timeout(Duration::from_secs(3600));
        let flag = token.flag();
        assert!(token.check("program").is_ok());
        flag.store(true, Ordering::SeqCst);
        assert!(matches!(token.clone().check("program"), Err(Error::Cancelled)));
    }

    #[test]
    fn test_deadline() {
        let token = Cancellation::with_timeout(Duration::ZERO);
        assert!(matches!(token.check("erase"), Err(Error::Timeout("erase"))));
        let token = Cancellation::with_timeout(Duration::from_secs(3600));
        assert!(token.check("erase").is_ok());
    }
}
