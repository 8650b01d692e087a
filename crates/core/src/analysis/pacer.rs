use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Serializes calls to a rate-limited endpoint and spaces them by a fixed delay.
///
/// Holders of a [`PacerPermit`] have exclusive use of the endpoint. The delay is measured from
/// the moment the previous permit was dropped, i.e. after the previous call completed.
#[derive(Debug, Clone)]
pub struct Pacer {
    delay: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

#[derive(Debug)]
pub struct PacerPermit {
    slot: OwnedMutexGuard<Option<Instant>>,
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until no other call is in flight and the delay since the last one has passed.
    pub async fn acquire(&self) -> PacerPermit {
        let slot = self.next_slot.clone().lock_owned().await;
        if let Some(at) = *slot {
            tokio::time::sleep_until(at).await;
        }
        PacerPermit {
            slot,
            delay: self.delay,
        }
    }
}

impl Drop for PacerPermit {
    fn drop(&mut self) {
        *self.slot = Some(Instant::now() + self.delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let pacer = Pacer::new(Duration::from_secs(1));
        let t0 = Instant::now();
        drop(pacer.acquire().await);
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_overlap_and_are_spaced() {
        let delay = Duration::from_millis(1000);
        let pacer = Pacer::new(delay);
        let spans: Arc<StdMutex<Vec<(Instant, Instant)>>> = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pacer = pacer.clone();
            let spans = spans.clone();
            handles.push(tokio::spawn(async move {
                let _permit = pacer.acquire().await;
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(250)).await;
                spans.lock().unwrap().push((start, Instant::now()));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut spans = spans.lock().unwrap().clone();
        spans.sort();
        assert_eq!(spans.len(), 4);
        for pair in spans.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start >= prev_end + delay);
        }
    }
}
