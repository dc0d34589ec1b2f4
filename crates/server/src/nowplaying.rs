use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

const TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct NowPlayingEntry {
    pub username: String,
    pub child_id: String,
    pub player_id: String,
    pub player_name: String,
    pub updated_at: Instant,
}

impl NowPlayingEntry {
    pub fn minutes_ago(&self) -> u64 {
        self.updated_at.elapsed().as_secs() / 60
    }
}

/// In-memory now-playing table, one entry per user. Stale entries are
/// evicted lazily when read.
#[derive(Clone, Default)]
pub struct NowPlaying {
    entries: Arc<RwLock<HashMap<String, NowPlayingEntry>>>,
}

impl NowPlaying {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, username: &str, child_id: &str, player_id: &str, player_name: &str) {
        let entry = NowPlayingEntry {
            username: username.to_string(),
            child_id: child_id.to_string(),
            player_id: player_id.to_string(),
            player_name: player_name.to_string(),
            updated_at: Instant::now(),
        };
        self.entries.write().insert(username.to_string(), entry);
    }

    pub fn snapshot(&self) -> Vec<NowPlayingEntry> {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.updated_at.elapsed() < TTL);
        let mut list: Vec<NowPlayingEntry> = entries.values().cloned().collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_entry_per_user_wins() {
        let np = NowPlaying::new();
        np.record("alice", "song1", "p1", "player");
        np.record("alice", "song2", "p1", "player");
        let entries = np.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].child_id, "song2");
    }

    #[test]
    fn stale_entries_evicted_on_read() {
        let np = NowPlaying::new();
        np.record("alice", "song1", "p1", "player");
        {
            let mut entries = np.entries.write();
            if let Some(entry) = entries.get_mut("alice") {
                entry.updated_at = Instant::now() - (TTL + Duration::from_secs(1));
            }
        }
        assert!(np.snapshot().is_empty());
    }
}
