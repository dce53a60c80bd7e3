use std::sync::atomic::{AtomicI64, Ordering};

/// Signed 64-bit accumulator that can be shared across threads and tasks.
#[derive(Debug, Default)]
pub(crate) struct AtomicCounter {
    value: AtomicI64,
}

impl AtomicCounter {
    #[cfg(test)]
    pub(crate) fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    pub(crate) fn increment(&self, amount: i64) {
        self.value.fetch_add(amount, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub(crate) fn decrement(&self, amount: i64) {
        self.value.fetch_sub(amount, Ordering::SeqCst);
    }

    pub(crate) fn inc(&self) {
        self.increment(1);
    }

    #[cfg(test)]
    pub(crate) fn dec(&self) {
        self.decrement(1);
    }

    pub(crate) fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_initial_value() {
        assert_eq!(AtomicCounter::default().get(), 0);
        assert_eq!(AtomicCounter::new(-7).get(), -7);
    }

    #[test]
    fn increments_and_decrements() {
        let counter = AtomicCounter::default();
        counter.inc();
        counter.increment(41);
        counter.dec();
        counter.decrement(10);
        assert_eq!(counter.get(), 31);
    }

    #[test]
    fn holds_values_past_32_bits() {
        let counter = AtomicCounter::default();
        counter.increment(i64::from(i32::MAX));
        counter.increment(8192);
        assert_eq!(counter.get(), i64::from(i32::MAX) + 8192);
    }

    #[rstest]
    #[case(2, 10_000, 1)]
    #[case(8, 5_000, 3)]
    #[case(16, 1_000, 8192)]
    fn concurrent_increments_are_not_lost(
        #[case] threads: i64,
        #[case] per_thread: i64,
        #[case] amount: i64,
    ) {
        let counter = Arc::new(AtomicCounter::default());
        let handles = (0..threads)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        counter.increment(amount);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), threads * per_thread * amount);
    }

    #[test]
    fn mixed_concurrent_updates_balance_out() {
        let counter = Arc::new(AtomicCounter::new(100));
        let handles = (0..8)
            .map(|i| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        if i % 2 == 0 {
                            counter.increment(5);
                        } else {
                            counter.decrement(5);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_between_tasks() {
        let counter = Arc::new(AtomicCounter::default());
        let tasks = (1..=64)
            .map(|amount| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.increment(amount) })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.get(), (1..=64).sum::<i64>());
    }
}
