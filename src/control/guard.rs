//! Single-flight guard for actions triggered over HTTP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Allows at most one action at a time.
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct ActionGuard {
    busy: Arc<AtomicBool>,
}

impl ActionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard if it is free. The action holds it until the returned
    /// permit is dropped, including on early return or panic.
    pub fn try_acquire(&self) -> Option<ActionPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ActionPermit { busy: Arc::clone(&self.busy) })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the guard.
#[must_use = "the guard is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct ActionPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for ActionPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let guard = ActionGuard::new();

        let permit = guard.try_acquire().expect("free guard");
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
        assert!(guard.clone().try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let guard = ActionGuard::new();
        let inner = guard.clone();

        let result = std::thread::spawn(move || {
            let _permit = inner.try_acquire();
            panic!("action failed");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.is_busy());
    }

    #[test]
    fn test_concurrent_acquire_admits_one() {
        const THREADS: usize = 32;
        let guard = ActionGuard::new();
        let barrier = Arc::new(Barrier::new(THREADS));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let guard = guard.clone();
                let barrier = Arc::clone(&barrier);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    barrier.wait();
                    let permit = guard.try_acquire();
                    if permit.is_some() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    // Hold the permit until every thread has tried.
                    barrier.wait();
                    drop(permit);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
