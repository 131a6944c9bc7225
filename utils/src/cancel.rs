use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation check, polled by long running work.
pub trait ShouldCancel: Send + Sync {
    fn should_cancel(&self) -> bool;
}

impl<F> ShouldCancel for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_cancel(&self) -> bool {
        self()
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct NeverCancel;

impl ShouldCancel for NeverCancel {
    #[inline]
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Flag that can be raised from any thread, usually shared through an `Arc`.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl ShouldCancel for CancelFlag {
    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn flag_round_trip() {
        let flag = Arc::new(CancelFlag::new());
        assert!(!flag.should_cancel());
        flag.cancel();
        assert!(flag.should_cancel());
        flag.reset();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn closures_are_cancel_checks() {
        let polls = AtomicU32::new(0);
        let check = || polls.fetch_add(1, Ordering::SeqCst) >= 2;
        assert!(!check.should_cancel());
        assert!(!check.should_cancel());
        assert!(check.should_cancel());
        assert!(!NeverCancel.should_cancel());
    }
}
