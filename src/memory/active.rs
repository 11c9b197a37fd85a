//! Active memory: the bounded page tier with LRU eviction.
//!
//! Pages are owned exclusively by this tier. When the page cap is
//! exceeded, the page with the smallest `(last_accessed, -access_count)`
//! is handed to the attached [`EvictionSink`] (normally the orchestrator's
//! archival channel) and removed. Without a sink attached the evicted page
//! is dropped with a warning; the tier itself never fails.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, warn};

use super::page::{Page, PageContent, PageKind};

/// Receives pages evicted from active memory.
///
/// Implementations must not block: the orchestrator's sink forwards pages
/// into a channel drained by an archival task.
pub trait EvictionSink: Send + Sync {
    /// Called exactly once per evicted page, before removal completes.
    fn on_evict(&self, page: Page);
}

/// Bounded set of pages with LRU-by-last-access eviction.
pub struct ActiveMemory {
    pages: Vec<Page>,
    max_pages: usize,
    sink: Option<Arc<dyn EvictionSink>>,
}

impl std::fmt::Debug for ActiveMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveMemory")
            .field("pages", &self.pages.len())
            .field("max_pages", &self.max_pages)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl ActiveMemory {
    /// Creates an empty tier with the given page cap.
    #[must_use]
    pub const fn new(max_pages: usize) -> Self {
        Self {
            pages: Vec::new(),
            max_pages,
            sink: None,
        }
    }

    /// Attaches the eviction sink.
    pub fn set_sink(&mut self, sink: Arc<dyn EvictionSink>) {
        self.sink = Some(sink);
    }

    /// Creates and inserts a new page, evicting if over the cap.
    /// Returns the new page's ID.
    pub fn add_page(&mut self, content: PageContent, kind: PageKind) -> String {
        let page = Page::new(content, kind);
        let id = page.id.clone();
        self.insert(page);
        id
    }

    /// Inserts an existing page (state restore, promotion), evicting if
    /// over the cap.
    pub fn insert(&mut self, page: Page) {
        self.pages.push(page);
        while self.pages.len() > self.max_pages {
            self.evict_one();
        }
    }

    /// Replaces all pages (state restore), keeping the attached sink and
    /// enforcing the cap.
    pub fn replace_pages(&mut self, pages: Vec<Page>) {
        self.pages.clear();
        for page in pages {
            self.insert(page);
        }
    }

    /// Evicts the LRU page, notifying the sink.
    fn evict_one(&mut self) {
        let index = self
            .pages
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| (p.last_accessed, Reverse(p.access_count)))
            .map(|(i, _)| i);

        if let Some(index) = index {
            let page = self.pages.remove(index);
            debug!(page_id = %page.id, kind = page.kind.as_str(), "evicting page");
            if let Some(sink) = &self.sink {
                sink.on_evict(page);
            } else {
                warn!(page_id = %page.id, "evicted page dropped: no eviction sink attached");
            }
        }
    }

    /// Returns a page by ID, recording the access.
    pub fn get_page(&mut self, id: &str) -> Option<&Page> {
        let page = self.pages.iter_mut().find(|p| p.id == id)?;
        page.access();
        Some(&*page)
    }

    /// Records an access on a page without returning it.
    pub fn mark_accessed(&mut self, id: &str) {
        if let Some(page) = self.pages.iter_mut().find(|p| p.id == id) {
            page.access();
        }
    }

    /// The `n` most recently accessed pages, most recent first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Page> {
        let mut sorted: Vec<Page> = self.pages.clone();
        sorted.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        sorted.truncate(n);
        sorted
    }

    /// Case-insensitive substring search over page text. Fallback path for
    /// when embeddings are unavailable; matches record an access.
    pub fn search(&mut self, query: &str) -> Vec<Page> {
        let needle = query.to_lowercase();
        let mut results = Vec::new();
        for page in &mut self.pages {
            if page.content.as_text().to_lowercase().contains(&needle) {
                page.access();
                results.push(page.clone());
            }
        }
        results
    }

    /// All pages, insertion-ordered.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Whether a page with this ID is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pages.iter().any(|p| p.id == id)
    }

    /// Number of pages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the tier holds no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        evicted: Mutex<Vec<Page>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                evicted: Mutex::new(Vec::new()),
            })
        }

        fn ids(&self) -> Vec<String> {
            self.evicted
                .lock()
                .map(|pages| pages.iter().map(|p| p.id.clone()).collect())
                .unwrap_or_default()
        }
    }

    impl EvictionSink for RecordingSink {
        fn on_evict(&self, page: Page) {
            if let Ok(mut pages) = self.evicted.lock() {
                pages.push(page);
            }
        }
    }

    fn text_content(body: &str) -> PageContent {
        PageContent::Text {
            body: body.to_string(),
        }
    }

    #[test]
    fn test_cap_is_enforced() {
        let sink = RecordingSink::new();
        let mut memory = ActiveMemory::new(3);
        memory.set_sink(sink.clone());

        for i in 0..5 {
            memory.add_page(text_content(&format!("page {i}")), PageKind::Conversation);
        }

        assert_eq!(memory.len(), 3);
        assert_eq!(sink.ids().len(), 2);
    }

    #[test]
    fn test_lru_page_goes_first() {
        let sink = RecordingSink::new();
        let mut memory = ActiveMemory::new(2);
        memory.set_sink(sink.clone());

        let first = memory.add_page(text_content("first"), PageKind::Conversation);
        let second = memory.add_page(text_content("second"), PageKind::Conversation);

        // Touch the first page so the second becomes least recently used.
        memory.mark_accessed(&first);

        memory.add_page(text_content("third"), PageKind::Conversation);
        assert_eq!(sink.ids(), vec![second]);
        assert!(memory.contains(&first));
    }

    #[test]
    fn test_eviction_fires_once_per_page() {
        let sink = RecordingSink::new();
        let mut memory = ActiveMemory::new(1);
        memory.set_sink(sink.clone());

        memory.add_page(text_content("a"), PageKind::Conversation);
        memory.add_page(text_content("b"), PageKind::Conversation);
        memory.add_page(text_content("c"), PageKind::Conversation);

        let ids = sink.ids();
        assert_eq!(ids.len(), 2);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_no_sink_is_graceful() {
        let mut memory = ActiveMemory::new(1);
        memory.add_page(text_content("a"), PageKind::Conversation);
        memory.add_page(text_content("b"), PageKind::Conversation);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_get_page_marks_access() {
        let mut memory = ActiveMemory::new(5);
        let id = memory.add_page(text_content("hello"), PageKind::Conversation);

        let count = memory.get_page(&id).map_or(0, |p| p.access_count);
        assert_eq!(count, 1);
        assert!(memory.get_page("missing").is_none());
    }

    #[test]
    fn test_substring_search_matches_and_accesses() {
        let mut memory = ActiveMemory::new(5);
        memory.add_page(text_content("the scheduler uses queues"), PageKind::Conversation);
        memory.add_page(text_content("unrelated content"), PageKind::Conversation);

        let results = memory.search("SCHEDULER");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].access_count, 1);
    }

    #[test]
    fn test_recent_orders_by_access() {
        let mut memory = ActiveMemory::new(5);
        let a = memory.add_page(text_content("a"), PageKind::Conversation);
        let _b = memory.add_page(text_content("b"), PageKind::Conversation);
        memory.mark_accessed(&a);

        let recent = memory.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, a);
    }
}
