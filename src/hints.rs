//! hints.rs: in-memory FIFO of item keys currently on screen.
//!
//! Process-local and never persisted: losing it only loses ordering, since
//! the scheduler falls back to scanning the store.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use metrics::gauge;

#[derive(Debug, Default)]
struct Inner {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl Inner {
    fn push_new<I, S>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for key in keys {
            let key = key.into();
            if self.members.insert(key.clone()) {
                self.order.push_back(key);
                added += 1;
            }
        }
        added
    }
}

/// Deduplicated hint queue. Each operation holds the lock across both the
/// membership check and the sequence mutation.
#[derive(Debug, Default)]
pub struct PriorityHints {
    inner: Mutex<Inner>,
}

impl PriorityHints {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Hints carry no data worth failing over; keep going after a panic elsewhere.
        match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Start of a new first-page view: drop all hints, then queue `keys`.
    /// Returns how many keys were queued.
    pub fn reset_and_mark<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut g = self.lock();
        g.order.clear();
        g.members.clear();
        let added = g.push_new(keys);
        gauge!("hint_queue_len").set(g.order.len() as f64);
        added
    }

    /// Later pages of the same session: queue keys not already present.
    pub fn append<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut g = self.lock();
        let added = g.push_new(keys);
        gauge!("hint_queue_len").set(g.order.len() as f64);
        added
    }

    /// Oldest hint, or `None` when the queue is empty.
    pub fn pop_front(&self) -> Option<String> {
        let mut g = self.lock();
        let key = g.order.pop_front()?;
        g.members.remove(&key);
        gauge!("hint_queue_len").set(g.order.len() as f64);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current order, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn pop_on_empty_is_none() {
        let q = PriorityHints::new();
        assert_eq!(q.pop_front(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn append_skips_duplicates() {
        let q = PriorityHints::new();
        assert_eq!(q.append(["a", "b", "a"]), 2);
        assert_eq!(q.append(["b", "c"]), 1);
        assert_eq!(q.snapshot(), vec!["a", "b", "c"]);
    }

    #[test]
    fn reset_replaces_previous_session() {
        let q = PriorityHints::new();
        q.append(["a", "b"]);
        assert_eq!(q.reset_and_mark(["c", "a", "c"]), 2);
        assert_eq!(q.snapshot(), vec!["c", "a"]);
    }

    #[test]
    fn popped_key_can_be_hinted_again() {
        let q = PriorityHints::new();
        q.append(["a", "b"]);
        assert_eq!(q.pop_front().as_deref(), Some("a"));
        assert_eq!(q.append(["a"]), 1);
        assert_eq!(q.snapshot(), vec!["b", "a"]);
    }

    #[test]
    fn concurrent_appends_never_duplicate() {
        let q = Arc::new(PriorityHints::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        // Overlapping key ranges across threads.
                        q.append([format!("k{}", (i + t * 50) % 300)]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = q.snapshot();
        let uniq: HashSet<_> = snap.iter().collect();
        assert_eq!(snap.len(), uniq.len());
        assert_eq!(snap.len(), 300);
    }
}
