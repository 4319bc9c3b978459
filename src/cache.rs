//! Maps a full post id to `(verdict, insert time)`, purged after a TTL.
//! Owned exclusively by the session manager — never shared across threads.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::Verdict;

pub struct VerdictCache {
    ttl: Duration,
    entries: HashMap<String, (Verdict, Instant)>,
}

impl VerdictCache {
    pub fn new(ttl: Duration) -> Self {
        VerdictCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Inserts a verdict for `full_post_id`. A verdict whose label is
    /// `Analyzing…` is never cached.
    pub fn insert(&mut self, full_post_id: impl Into<String>, verdict: Verdict) {
        if verdict.label.is_analyzing() {
            return;
        }
        self.entries
            .insert(full_post_id.into(), (verdict, Instant::now()));
    }

    /// Returns the cached verdict for `full_post_id` if present and not
    /// expired. Expired entries are evicted lazily on lookup.
    pub fn get(&mut self, full_post_id: &str) -> Option<&Verdict> {
        if let Some((_, inserted)) = self.entries.get(full_post_id) {
            if inserted.elapsed() > self.ttl {
                self.entries.remove(full_post_id);
                return None;
            }
        }
        self.entries.get(full_post_id).map(|(v, _)| v)
    }

    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() <= ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifierResult, Severity, Verdict};

    fn real_verdict() -> Verdict {
        Verdict::from_result(
            "post_3_3000",
            ClassifierResult {
                is_ai: false,
                confidence: 0.95,
                severity: Severity::Low,
                reasons: vec![],
            },
        )
    }

    #[test]
    fn analyzing_verdicts_are_never_cached() {
        let mut cache = VerdictCache::new(Duration::from_secs(5));
        cache.insert("post_1_1000", Verdict::analyzing("post_1_1000"));
        assert!(cache.get("post_1_1000").is_none());
    }

    #[test]
    fn resolved_verdicts_are_retrievable_within_ttl() {
        let mut cache = VerdictCache::new(Duration::from_secs(5));
        cache.insert("post_3_3000", real_verdict());
        assert!(cache.get("post_3_3000").is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = VerdictCache::new(Duration::from_millis(1));
        cache.insert("post_3_3000", real_verdict());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("post_3_3000").is_none());
    }
}
