//! Per-key debouncing of saves.
//!
//! Text fields fire a change on every keystroke. Each change is scheduled under a key (the
//! entity and field being edited); a repeated call for the same key replaces the pending value
//! and restarts its quiet period, so at most one save per key is ever pending. Time is passed
//! in explicitly (seconds, as reported by the UI clock), which keeps the primitive
//! deterministic under test.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Pending<V> {
    value: V,
    deadline: f64,
}

/// At most one pending value per key, released after a quiet period.
#[derive(Debug, Clone)]
pub struct Debouncer<K, V> {
    delay: f64,
    pending: HashMap<K, Pending<V>>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    /// Creates a debouncer with the given quiet period in seconds.
    pub fn new(delay: f64) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Schedules `value` under `key`, replacing any pending value and restarting its timer.
    pub fn schedule(&mut self, key: K, value: V, now: f64) {
        self.pending.insert(
            key,
            Pending {
                value,
                deadline: now + self.delay,
            },
        );
    }

    /// Like [`schedule`](Self::schedule), but folds the new value into the pending one.
    pub fn schedule_with(&mut self, key: K, value: V, now: f64, merge: impl FnOnce(&mut V, V)) {
        let deadline = now + self.delay;
        match self.pending.get_mut(&key) {
            Some(pending) => {
                merge(&mut pending.value, value);
                pending.deadline = deadline;
            }
            None => {
                self.pending.insert(key, Pending { value, deadline });
            }
        }
    }

    /// Drops the pending value for `key`, if any.
    pub fn cancel(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|p| p.value)
    }

    /// Removes and returns every value whose quiet period has elapsed.
    pub fn poll(&mut self, now: f64) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|p| (k, p.value)))
            .collect()
    }

    /// Removes and returns every pending value regardless of its deadline.
    pub fn flush_all(&mut self) -> Vec<(K, V)> {
        self.pending.drain().map(|(k, p)| (k, p.value)).collect()
    }

    /// Earliest pending deadline, used to schedule the next repaint.
    pub fn next_deadline(&self) -> Option<f64> {
        self.pending.values().map(|p| p.deadline).reduce(f64::min)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_last_value() {
        let mut d = Debouncer::new(0.25);
        d.schedule("label", "a", 0.0);
        d.schedule("label", "ab", 0.125);
        d.schedule("label", "abc", 0.25);

        assert!(d.poll(0.375).is_empty());
        assert_eq!(d.poll(0.5), vec![("label", "abc")]);
        assert!(d.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut d = Debouncer::new(0.25);
        d.schedule(1, "x", 0.0);
        d.schedule(2, "y", 0.25);

        assert_eq!(d.poll(0.25), vec![(1, "x")]);
        assert!(d.is_pending(&2));
        assert_eq!(d.next_deadline(), Some(0.5));
    }

    #[test]
    fn test_schedule_with_merges() {
        let mut d: Debouncer<u8, Vec<u8>> = Debouncer::new(1.0);
        d.schedule_with(0, vec![1], 0.0, |a, b| a.extend(b));
        d.schedule_with(0, vec![2], 0.5, |a, b| a.extend(b));
        assert!(d.poll(1.0).is_empty());
        assert_eq!(d.poll(1.5), vec![(0, vec![1, 2])]);
    }

    #[test]
    fn test_flush_and_cancel() {
        let mut d = Debouncer::new(10.0);
        d.schedule("a", 1, 0.0);
        d.schedule("b", 2, 0.0);
        assert_eq!(d.cancel(&"a"), Some(1));
        assert_eq!(d.flush_all(), vec![("b", 2)]);
        assert_eq!(d.next_deadline(), None);
    }
}
