use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Idle/Running flag of one schedule. At most one [`CycleRun`] exists per guard.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct CycleRun {
    running: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_start(&self) -> Option<CycleRun> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleRun {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for CycleRun {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
