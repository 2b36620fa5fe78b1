//! Wall-clock and size limits of one block

use crate::error::SnippetError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Limits checked between statements, at calls and inside data loops
#[derive(Debug, Clone)]
pub(crate) struct Budget {
    deadline: Instant,
    allowed: Duration,
    cancel: Arc<AtomicBool>,
    max_elements: usize,
}

impl Budget {
    pub(crate) fn new(allowed: Duration, cancel: Arc<AtomicBool>, max_elements: usize) -> Self {
        Self {
            deadline: Instant::now() + allowed,
            allowed,
            cancel,
            max_elements,
        }
    }

    /// Fails once the deadline has passed or the runner gave up
    pub(crate) fn check(&self) -> Result<(), SnippetError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SnippetError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(SnippetError::Timeout(self.allowed));
        }
        Ok(())
    }

    /// Fails when a sequence of `len` elements would be built
    pub(crate) fn ensure_len(&self, len: usize) -> Result<(), SnippetError> {
        if len > self.max_elements {
            return Err(SnippetError::TooLarge {
                len,
                limit: self.max_elements,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_expires_immediately() {
        let budget = Budget::new(Duration::ZERO, Arc::new(AtomicBool::new(false)), 10);
        assert_eq!(budget.check(), Err(SnippetError::Timeout(Duration::ZERO)));
    }

    #[test]
    fn cancel_flag_stops_work() {
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = Budget::new(Duration::from_secs(60), Arc::clone(&cancel), 10);
        assert!(budget.check().is_ok());
        cancel.store(true, Ordering::Relaxed);
        assert_eq!(budget.check(), Err(SnippetError::Cancelled));
    }

    #[test]
    fn element_limit() {
        let budget = Budget::new(Duration::from_secs(1), Arc::new(AtomicBool::new(false)), 10);
        assert!(budget.ensure_len(10).is_ok());
        assert!(matches!(budget.ensure_len(11), Err(SnippetError::TooLarge { .. })));
    }
}
