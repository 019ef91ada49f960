/// "Seen since T" store shared by every alert source.
///
/// A key, once marked, blocks re-alerting until a sweep finds it older than
/// the store's TTL. Sweeps run once per polling cycle, so an entry can
/// outlive its TTL by up to one poll interval. Permanent stores are never
/// swept.
///
/// Pure state, no I/O: the caller passes `now` explicitly.
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// How long a marked key stays suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// For the life of the process.
    Permanent,
    /// Until a sweep at or after `marked + ttl`.
    Ttl(Duration),
}

#[derive(Debug, Clone)]
pub struct SuppressionStore {
    retention: Retention,
    entries: HashMap<String, Instant>,
}

impl SuppressionStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            retention,
            entries: HashMap::new(),
        }
    }

    pub fn permanent() -> Self {
        Self::new(Retention::Permanent)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(Retention::Ttl(ttl))
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    pub fn is_suppressed(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Record that `key` was alerted (or seen) at `now`. Re-marking
    /// refreshes the timestamp.
    pub fn mark_alerted(&mut self, key: impl Into<String>, now: Instant) {
        self.entries.insert(key.into(), now);
    }

    /// Drop every entry whose age has reached the TTL. Returns the removed
    /// keys so callers can discard state tied to them.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let Retention::Ttl(ttl) = self.retention else {
            return Vec::new();
        };
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, marked)| now.saturating_duration_since(**marked) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_suppressed_until_ttl() {
        let t0 = Instant::now();
        let mut store = SuppressionStore::with_ttl(HOUR);
        store.mark_alerted("station-a", t0);

        assert!(store.expire(t0 + HOUR - Duration::from_secs(1)).is_empty());
        assert!(store.is_suppressed("station-a"));

        assert_eq!(store.expire(t0 + HOUR), vec!["station-a".to_string()]);
        assert!(!store.is_suppressed("station-a"));
    }

    #[test]
    fn test_without_sweep_entry_stays() {
        let t0 = Instant::now();
        let mut store = SuppressionStore::with_ttl(Duration::from_secs(1));
        store.mark_alerted("k", t0);
        // Expiry is only evaluated by a sweep.
        assert!(store.is_suppressed("k"));
    }

    #[test]
    fn test_permanent_never_expires() {
        let t0 = Instant::now();
        let mut store = SuppressionStore::permanent();
        store.mark_alerted("N|3", t0);
        assert!(store.expire(t0 + HOUR * 24 * 365).is_empty());
        assert!(store.is_suppressed("N|3"));
        assert_eq!(store.retention(), Retention::Permanent);
    }

    #[test]
    fn test_remark_refreshes() {
        let t0 = Instant::now();
        let mut store = SuppressionStore::with_ttl(HOUR);
        store.mark_alerted("id", t0);
        store.mark_alerted("id", t0 + HOUR / 2);
        assert!(store.expire(t0 + HOUR).is_empty());
        assert_eq!(store.expire(t0 + HOUR + HOUR / 2).len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_only_removes_old_entries() {
        let t0 = Instant::now();
        let mut store = SuppressionStore::with_ttl(HOUR);
        store.mark_alerted("old", t0);
        store.mark_alerted("new", t0 + HOUR / 2);
        assert_eq!(store.expire(t0 + HOUR), vec!["old".to_string()]);
        assert_eq!(store.len(), 1);
        assert!(store.is_suppressed("new"));
    }
}
