// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-windowed deduplication.
//!
//! The first submission for a key opens a window and suspends for the
//! window duration; it is the only caller that ever receives the batch.
//! Submissions arriving while the window is open are appended and return
//! `None` immediately. When the window closes the batch is removed, so the
//! next submission for the same key opens a fresh window.
//!
//! ```text
//! t=0    A: deduplicate(k, a)  -- opens window, sleeps
//! t=50   B: deduplicate(k, b)  -> None
//! t=300  A:                    -> Some([a, b])
//! t=310  C: deduplicate(k, c)  -- opens a new window
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;

/// Keyed, time-windowed collector.
///
/// Keys live in a sharded map, so submissions for different keys do not
/// contend; the per-key critical section covers only the append.
#[derive(Debug)]
pub struct Deduplicator<K, T>
where
    K: Eq + Hash,
{
    window: Duration,
    pending: DashMap<K, Vec<T>>,
}

impl<K, T> Deduplicator<K, T>
where
    K: Eq + Hash + Clone,
{
    /// Create a deduplicator with a fixed window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: DashMap::new(),
        }
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Submit an item.
    ///
    /// Returns `Some` with every item collected for this window, in arrival
    /// order, to the caller that opened it; `None` to everyone else.
    pub async fn deduplicate(&self, key: K, item: T) -> Option<Vec<T>> {
        let opened = match self.pending.entry(key.clone()) {
            Entry::Occupied(mut batch) => {
                batch.get_mut().push(item);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![item]);
                true
            }
        };

        if !opened {
            return None;
        }

        // Only the opener removes this window's batch, also when cancelled.
        let window = OpenWindow {
            pending: &self.pending,
            key: Some(key),
        };
        tokio::time::sleep(self.window).await;
        window.close()
    }

    /// Number of windows currently open.
    pub fn open_windows(&self) -> usize {
        self.pending.len()
    }
}

/// Window held by the opener. Dropping it without `close` discards the
/// batch so the key can open a fresh window.
struct OpenWindow<'a, K, T>
where
    K: Eq + Hash,
{
    pending: &'a DashMap<K, Vec<T>>,
    key: Option<K>,
}

impl<K, T> OpenWindow<'_, K, T>
where
    K: Eq + Hash,
{
    fn close(mut self) -> Option<Vec<T>> {
        let key = self.key.take()?;
        self.pending.remove(&key).map(|(_, batch)| batch)
    }
}

impl<K, T> Drop for OpenWindow<'_, K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.pending.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_single_item_delivered_to_opener() {
        let dedup = Deduplicator::new(Duration::from_millis(20));
        let result = dedup.deduplicate("k", 1).await;
        assert_eq!(result, Some(vec![1]));
        assert_eq!(dedup.open_windows(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_collected_once() {
        let dedup = Arc::new(Deduplicator::new(Duration::from_millis(100)));

        let opener = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.deduplicate("k", 1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut followers = Vec::new();
        for i in 2..=5 {
            let dedup = dedup.clone();
            followers.push(tokio::spawn(async move { dedup.deduplicate("k", i).await }));
        }
        for follower in followers {
            assert_eq!(follower.await.unwrap(), None);
        }

        let batch = opener.await.unwrap().unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0], 1);
        let mut sorted = batch.clone();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_cancelled_opener_releases_key() {
        let dedup = Deduplicator::new(Duration::from_millis(50));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(5), dedup.deduplicate("k", 1)).await;
        assert!(cancelled.is_err());
        assert_eq!(dedup.open_windows(), 0);

        assert_eq!(dedup.deduplicate("k", 2).await, Some(vec![2]));
        assert_eq!(dedup.open_windows(), 0);
    }

    #[tokio::test]
    async fn test_arrival_order_preserved() {
        let dedup = Arc::new(Deduplicator::new(Duration::from_millis(100)));

        let opener = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.deduplicate(7u32, "a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dedup.deduplicate(7, "b").await, None);
        assert_eq!(dedup.deduplicate(7, "c").await, None);

        assert_eq!(opener.await.unwrap(), Some(vec!["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_new_window_after_close() {
        let dedup = Deduplicator::new(Duration::from_millis(20));

        assert_eq!(dedup.deduplicate("k", 1).await, Some(vec![1]));
        assert_eq!(dedup.deduplicate("k", 2).await, Some(vec![2]));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let dedup = Arc::new(Deduplicator::new(Duration::from_millis(50)));

        let a = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.deduplicate("a", 1).await })
        };
        let b = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.deduplicate("b", 2).await })
        };

        assert_eq!(a.await.unwrap(), Some(vec![1]));
        assert_eq!(b.await.unwrap(), Some(vec![2]));
        assert_eq!(dedup.open_windows(), 0);
    }
}
