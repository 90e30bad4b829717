use crate::message::HistoryEntry;

/// Ordered, append-only log of every broadcast entry since start-up.
///
/// Entries are never evicted: memory grows with traffic for the life of the
/// process, and a restart forgets everything.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Copy of the log at this instant. Content is reference counted, so
    /// large image payloads are shared rather than duplicated.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
