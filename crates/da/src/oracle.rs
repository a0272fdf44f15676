//! Simulated DA height clock.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Largest single advance of the DA height.
pub const MAX_STEP: u64 = 10;

/// Sole writer of a DA layer's current height.
///
/// Readers observe the height through the [`watch::Receiver`] returned by
/// [`HeightOracle::new`]. Every `block_time` the height advances by a random
/// step in `1..=MAX_STEP`.
pub struct HeightOracle {
    tx: watch::Sender<u64>,
    block_time: Duration,
    rng: StdRng,
}

impl HeightOracle {
    pub fn new(start: u64, block_time: Duration) -> (Self, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(start);
        let oracle = Self {
            tx,
            block_time,
            rng: StdRng::from_entropy(),
        };
        (oracle, rx)
    }

    /// Use a deterministic step sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn block_time(&self) -> Duration {
        self.block_time
    }

    /// Advance by a random step and return the new height.
    pub fn advance(&mut self) -> u64 {
        let step = self.rng.gen_range(1..=MAX_STEP);
        self.advance_by(step)
    }

    /// Advance by `step` and return the new height.
    pub fn advance_by(&mut self, step: u64) -> u64 {
        self.tx.send_modify(|height| *height = height.saturating_add(step));
        self.current()
    }

    /// Advance every `block_time` until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!(
            "Height oracle running: start={}, block_time={}",
            self.current(),
            humantime::format_duration(self.block_time)
        );
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Height oracle stopped at DA height {}", self.current());
                    return;
                }
                _ = tokio::time::sleep(self.block_time) => {
                    let height = self.advance();
                    debug!("DA height advanced to {}", height);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_bounded_and_monotonic() {
        let (mut oracle, rx) = HeightOracle::new(1, Duration::from_secs(3));
        let mut last = *rx.borrow();
        for _ in 0..1_000 {
            let height = oracle.advance();
            let step = height - last;
            assert!((1..=MAX_STEP).contains(&step), "step {} out of range", step);
            assert_eq!(*rx.borrow(), height);
            last = height;
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let (a, _rx_a) = HeightOracle::new(1, Duration::from_secs(1));
        let (b, _rx_b) = HeightOracle::new(1, Duration::from_secs(1));
        let mut a = a.with_seed(42);
        let mut b = b.with_seed(42);
        for _ in 0..20 {
            assert_eq!(a.advance(), b.advance());
        }
    }

    #[test]
    fn test_advance_without_readers() {
        let (mut oracle, rx) = HeightOracle::new(5, Duration::from_secs(1));
        drop(rx);
        assert_eq!(oracle.advance_by(4), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_advances_until_cancelled() {
        let (oracle, mut rx) = HeightOracle::new(1, Duration::from_secs(3));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(oracle.run(cancel.clone()));

        rx.changed().await.unwrap();
        let first = *rx.borrow_and_update();
        assert!((2..=1 + MAX_STEP).contains(&first));

        cancel.cancel();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*rx.borrow(), first);
    }
}
