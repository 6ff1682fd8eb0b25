//! Per-conversation compaction state.
//!
//! The store is the single owner of every [`ConversationState`]. Its lock is
//! only ever held for short critical sections with no `.await` inside, so
//! conversations never wait on each other. Exclusive compaction of one
//! conversation is expressed through [`CompactionClaim`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Tracking state for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Last observed `prompt_tokens / context_limit`
    pub usage_ratio: f64,
    /// Set once usage crosses the threshold, cleared by a successful compaction
    pub needs_compaction: bool,
    /// Messages in the last observed request
    pub message_count: usize,
    /// Compactions applied so far
    pub compaction_count: u32,
}

/// Bounds on how much state the store keeps
#[derive(Debug, Clone)]
pub struct StoreLimits {
    /// Conversations kept before the least recently seen is evicted
    pub max_conversations: usize,
    /// Conversations not seen for this long are dropped; a TTL that is not
    /// positive is ignored
    pub idle_ttl: Option<TimeDelta>,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_conversations: 1024,
            idle_ttl: None,
        }
    }
}

struct Entry {
    state: ConversationState,
    last_seen: DateTime<Utc>,
    /// A compaction for this conversation is in flight
    compacting: bool,
}

/// Mapping from conversation id to tracking state
pub struct ConversationStore {
    entries: Mutex<HashMap<String, Entry>>,
    limits: StoreLimits,
}

impl ConversationStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limits: StoreLimits {
                max_conversations: limits.max_conversations.max(1),
                idle_ttl: limits.idle_ttl.filter(|ttl| *ttl > TimeDelta::zero()),
            },
        }
    }

    /// Current state of one conversation
    pub fn get(&self, id: &str) -> Option<ConversationState> {
        self.entries.lock().get(id).map(|e| e.state.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of every conversation's state, ordered by id
    pub fn snapshot(&self) -> BTreeMap<String, ConversationState> {
        self.entries
            .lock()
            .iter()
            .map(|(id, e)| (id.clone(), e.state.clone()))
            .collect()
    }

    /// Record a usage observation, creating the conversation if needed.
    ///
    /// `over_threshold` can only raise `needs_compaction`, never clear it.
    pub(crate) fn record_usage(
        &self,
        id: &str,
        usage_ratio: f64,
        message_count: usize,
        over_threshold: bool,
    ) -> ConversationState {
        self.record_usage_at(id, usage_ratio, message_count, over_threshold, Utc::now())
    }

    fn record_usage_at(
        &self,
        id: &str,
        usage_ratio: f64,
        message_count: usize,
        over_threshold: bool,
        now: DateTime<Utc>,
    ) -> ConversationState {
        let mut entries = self.entries.lock();

        let entry = entries.entry(id.to_string()).or_insert_with(|| Entry {
            state: ConversationState {
                usage_ratio,
                needs_compaction: false,
                message_count,
                compaction_count: 0,
            },
            last_seen: now,
            compacting: false,
        });
        entry.state.usage_ratio = usage_ratio;
        entry.state.message_count = message_count;
        entry.last_seen = now;
        if over_threshold {
            entry.state.needs_compaction = true;
        }
        let state = entry.state.clone();

        self.evict(&mut entries, now);
        state
    }

    /// Claim the right to compact `id`.
    ///
    /// Succeeds only when the conversation needs compaction and no other
    /// compaction for it is in flight. The claim is released when dropped.
    pub fn try_claim(&self, id: &str) -> Option<CompactionClaim<'_>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id)?;
        if !entry.state.needs_compaction || entry.compacting {
            return None;
        }
        entry.compacting = true;

        Some(CompactionClaim {
            store: self,
            id: id.to_string(),
        })
    }

    fn evict(&self, entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) {
        if let Some(ttl) = self.limits.idle_ttl {
            let before = entries.len();
            entries.retain(|_, e| e.compacting || now - e.last_seen <= ttl);
            let dropped = before - entries.len();
            if dropped > 0 {
                tracing::debug!("Dropped {} idle conversations", dropped);
            }
        }

        while entries.len() > self.limits.max_conversations {
            let oldest = entries
                .iter()
                .filter(|(_, e)| !e.compacting)
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    entries.remove(&id);
                    tracing::debug!(conversation_id = %id, "Evicted least recently seen conversation");
                }
                None => break,
            }
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}

/// Exclusive right to compact one conversation.
///
/// Dropping the claim without calling [`complete`](Self::complete) leaves
/// `needs_compaction` set, so a failed, cancelled or timed-out summarization
/// is retried on a later request.
pub struct CompactionClaim<'a> {
    store: &'a ConversationStore,
    id: String,
}

impl CompactionClaim<'_> {
    pub fn conversation_id(&self) -> &str {
        &self.id
    }

    /// Record a successful compaction
    pub fn complete(self) -> Option<ConversationState> {
        let mut entries = self.store.entries.lock();
        let state = entries.get_mut(&self.id).map(|entry| {
            entry.state.needs_compaction = false;
            entry.state.compaction_count += 1;
            entry.state.clone()
        });
        drop(entries);
        state
    }
}

impl Drop for CompactionClaim<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.store.entries.lock().get_mut(&self.id) {
            entry.compacting = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed(store: &ConversationStore, id: &str) {
        store.record_usage(id, 0.9, 4, true);
    }

    #[test]
    fn test_record_creates_then_updates() {
        let store = ConversationStore::default();
        let first = store.record_usage("a", 0.25, 3, false);
        assert_eq!(
            first,
            ConversationState {
                usage_ratio: 0.25,
                needs_compaction: false,
                message_count: 3,
                compaction_count: 0,
            }
        );

        let second = store.record_usage("a", 0.5, 5, false);
        assert_eq!(second.usage_ratio, 0.5);
        assert_eq!(second.message_count, 5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_flag_is_sticky() {
        let store = ConversationStore::default();
        armed(&store, "a");
        store.record_usage("a", 0.1, 6, false);
        assert!(store.get("a").unwrap().needs_compaction);
    }

    #[test]
    fn test_claim_requires_flag() {
        let store = ConversationStore::default();
        store.record_usage("a", 0.1, 2, false);
        assert!(store.try_claim("a").is_none());
        assert!(store.try_claim("unknown").is_none());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = ConversationStore::default();
        armed(&store, "a");
        armed(&store, "b");

        let claim = store.try_claim("a").unwrap();
        assert_eq!(claim.conversation_id(), "a");
        assert!(store.try_claim("a").is_none());
        // Other conversations are unaffected
        assert!(store.try_claim("b").is_some());
        drop(claim);
        assert!(store.try_claim("a").is_some());
    }

    #[test]
    fn test_dropped_claim_keeps_flag() {
        let store = ConversationStore::default();
        armed(&store, "a");
        drop(store.try_claim("a").unwrap());

        let state = store.get("a").unwrap();
        assert!(state.needs_compaction);
        assert_eq!(state.compaction_count, 0);
    }

    #[test]
    fn test_complete_clears_flag_once() {
        let store = ConversationStore::default();
        armed(&store, "a");

        let state = store.try_claim("a").unwrap().complete().unwrap();
        assert!(!state.needs_compaction);
        assert_eq!(state.compaction_count, 1);
        assert!(store.try_claim("a").is_none());
    }

    #[test]
    fn test_capacity_evicts_least_recently_seen() {
        let store = ConversationStore::new(StoreLimits {
            max_conversations: 2,
            idle_ttl: None,
        });
        let t0 = Utc::now();
        store.record_usage_at("a", 0.1, 1, false, t0);
        store.record_usage_at("b", 0.1, 1, false, t0 + TimeDelta::seconds(1));
        store.record_usage_at("a", 0.2, 2, false, t0 + TimeDelta::seconds(2));
        store.record_usage_at("c", 0.1, 1, false, t0 + TimeDelta::seconds(3));

        let ids: Vec<String> = store.snapshot().into_keys().collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_idle_ttl_drops_stale_conversations() {
        let store = ConversationStore::new(StoreLimits {
            max_conversations: 16,
            idle_ttl: Some(TimeDelta::minutes(30)),
        });
        let t0 = Utc::now();
        store.record_usage_at("old", 0.1, 1, false, t0);
        store.record_usage_at("new", 0.1, 1, false, t0 + TimeDelta::hours(1));

        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn test_non_positive_idle_ttl_is_ignored() {
        let store = ConversationStore::new(StoreLimits {
            max_conversations: 16,
            idle_ttl: Some(TimeDelta::minutes(-1)),
        });
        let state = store.record_usage("a", 0.9, 3, true);

        assert!(state.needs_compaction);
        assert!(store.get("a").is_some());
        assert!(store.try_claim("a").is_some());
    }

    #[test]
    fn test_in_flight_conversation_not_evicted() {
        let store = ConversationStore::new(StoreLimits {
            max_conversations: 1,
            idle_ttl: Some(TimeDelta::minutes(1)),
        });
        let t0 = Utc::now();
        store.record_usage_at("busy", 0.9, 4, true, t0);
        let claim = store.try_claim("busy").unwrap();

        store.record_usage_at("other", 0.1, 1, false, t0 + TimeDelta::hours(1));
        assert!(store.get("busy").is_some());
        drop(claim);
    }
}
