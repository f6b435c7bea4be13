use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::note::Note;

/// Composite key identifying a request by endpoint, method and body.
pub fn request_key(endpoint: &str, method: &str, body: &str) -> String {
    format!("url:{endpoint}||method:{method}||body:{body}")
}

/// Key under which a note's read response is cached.
pub fn note_read_key(id: &str) -> String {
    request_key(&format!("/notes/{id}"), "GET", "")
}

/// In-memory store of prior note reads.
///
/// Writes never populate it; they only evict, so the next read goes back
/// to the server. Clones share one set of entries, so a handle kept by
/// the caller stays connected to the pipeline it was handed to.
#[derive(Debug, Clone, Default)]
pub struct ReadCache {
    entries: Arc<Mutex<HashMap<String, Note>>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Note> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, note: Note) {
        self.entries.lock().unwrap().insert(key.into(), note);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().unwrap().remove(key).is_some()
    }

    /// Evict the cached read for a note id, if any.
    pub fn invalidate_note(&self, id: &str) -> bool {
        self.invalidate(&note_read_key(id))
    }
}
