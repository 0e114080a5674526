use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use pastewatch_core::Pasty;

/// How many recently observed pasty IDs each site remembers.
pub const SEEN_CAPACITY: usize = 1000;

struct SeenState {
    order: VecDeque<String>,
    members: HashSet<String>,
}

/// Bounded insertion-order memory of recent pasty IDs with O(1) membership.
/// Discovery workers read it, fetch workers read and update it.
pub struct SeenSet {
    state: StdMutex<SeenState>,
    capacity: usize,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenSet {
    pub fn new() -> Self {
        Self::with_capacity(SEEN_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: StdMutex::new(SeenState {
                order: VecDeque::with_capacity(capacity),
                members: HashSet::with_capacity(capacity),
            }),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.members.contains(id)
    }

    /// Remember an ID, evicting the oldest entry past the bound. Re-inserting
    /// a known ID is a no-op.
    pub fn push_front(&self, id: String) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.members.insert(id.clone()) {
            return;
        }
        state.order.push_front(id);
        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_back() {
                state.members.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-site work queues plus each site's seen-set. One discovery worker
/// produces per queue; that site's fetch-worker pool consumes.
pub struct SiteBoard {
    queues: DashMap<String, Arc<Mutex<VecDeque<Pasty>>>>,
    seen: DashMap<String, Arc<SeenSet>>,
}

impl Default for SiteBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteBoard {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            seen: DashMap::new(),
        }
    }

    fn queue(&self, site: &str) -> Arc<Mutex<VecDeque<Pasty>>> {
        self.queues
            .entry(site.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    pub fn seen(&self, site: &str) -> Arc<SeenSet> {
        self.seen
            .entry(site.to_string())
            .or_insert_with(|| Arc::new(SeenSet::new()))
            .clone()
    }

    pub async fn push(&self, site: &str, pasty: Pasty) {
        let queue = self.queue(site);
        let mut queue = queue.lock().await;
        queue.push_back(pasty);
        debug!(site = %site, depth = queue.len(), "pasty enqueued");
    }

    /// FIFO pop. Non-blocking; callers back off briefly when the queue is
    /// empty.
    pub async fn pop(&self, site: &str) -> Option<Pasty> {
        let queue = self.queues.get(site)?.clone();
        let mut queue = queue.lock().await;
        queue.pop_front()
    }

    pub async fn len(&self, site: &str) -> usize {
        match self.queues.get(site) {
            Some(queue) => queue.lock().await.len(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pastewatch_core::config::AppConfig;
    use pastewatch_core::Site;

    fn demo_site() -> Arc<Site> {
        let app: AppConfig = serde_yaml_config();
        Arc::new(Site::from_config("demo", &app.site["demo"], &app).unwrap())
    }

    fn serde_yaml_config() -> AppConfig {
        let yaml = r#"
archive:
  dir: alerts
  dir-all: archive
site:
  demo:
    enable: true
    download-url: "https://paste.example/raw/{id}"
    archive-url: "https://paste.example/archive"
    archive-regex: '<a href="/(\w+)">'
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_seen_set_membership() {
        let seen = SeenSet::new();
        assert!(!seen.contains("a"));
        seen.push_front("a".into());
        assert!(seen.contains("a"));
        seen.push_front("a".into());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_seen_set_evicts_oldest_past_bound() {
        let seen = SeenSet::with_capacity(3);
        for id in ["a", "b", "c"] {
            seen.push_front(id.into());
        }
        assert_eq!(seen.len(), 3);
        seen.push_front("d".into());
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("d"));
    }

    #[test]
    fn test_seen_set_full_bound() {
        let seen = SeenSet::new();
        for i in 0..SEEN_CAPACITY {
            seen.push_front(format!("id-{}", i));
        }
        assert_eq!(seen.len(), SEEN_CAPACITY);
        seen.push_front("one-more".into());
        assert_eq!(seen.len(), SEEN_CAPACITY);
        assert!(!seen.contains("id-0"));
        assert!(seen.contains("id-1"));
        assert!(seen.contains("one-more"));
    }

    #[tokio::test]
    async fn test_queue_is_fifo_per_site() {
        let board = SiteBoard::new();
        let site = demo_site();
        for id in ["first", "second", "third"] {
            board.push("demo", Pasty::new(site.clone(), id.into())).await;
        }
        assert_eq!(board.len("demo").await, 3);
        assert_eq!(board.pop("demo").await.unwrap().id, "first");
        assert_eq!(board.pop("demo").await.unwrap().id, "second");
        assert_eq!(board.pop("demo").await.unwrap().id, "third");
        assert!(board.pop("demo").await.is_none());
    }

    #[tokio::test]
    async fn test_sites_are_independent() {
        let board = SiteBoard::new();
        let site = demo_site();
        board.push("demo", Pasty::new(site.clone(), "x".into())).await;
        assert_eq!(board.len("other").await, 0);
        assert!(board.pop("other").await.is_none());
        board.seen("demo").push_front("x".into());
        assert!(!board.seen("other").contains("x"));
    }
}
