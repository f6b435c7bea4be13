use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use reqwest::StatusCode;
use tokio::sync::Notify;

use super::SyncError;
use super::api::{NoteApi, NoteMeta};
use crate::core::note::Note;

/// One recorded call against [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApiCall {
    Fetch {
        id: String,
    },
    Create {
        id: Option<String>,
        meta: NoteMeta,
        content: Option<String>,
    },
    UpdateContent {
        id: String,
        content: String,
    },
    UpdateMeta {
        id: String,
        meta: NoteMeta,
    },
    Delete {
        id: String,
    },
}

/// Canned note server for pipeline and scheduler tests.
///
/// Records every call, answers from an in-memory note table, and can be
/// told to fail the next N calls or park them until the caller is
/// aborted.
#[derive(Default)]
pub(crate) struct RecordingApi {
    calls: Mutex<Vec<ApiCall>>,
    notes: Mutex<HashMap<String, Note>>,
    assigned_ids: Mutex<VecDeque<String>>,
    date_counter: AtomicU64,
    id_counter: AtomicU64,
    fail_remaining: AtomicU32,
    hang_remaining: AtomicU32,
    hang_gate: Notify,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_note(&self, note: Note) {
        self.notes.lock().unwrap().insert(note.id.clone(), note);
    }

    pub fn note(&self, id: &str) -> Option<Note> {
        self.notes.lock().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Id the next create should hand back instead of echoing the
    /// client's placeholder.
    pub fn queue_assigned_id(&self, id: &str) {
        self.assigned_ids
            .lock()
            .unwrap()
            .push_back(id.to_string());
    }

    /// Fail the next `n` calls with a 500.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Park the next `n` calls forever; only an abort gets them back.
    pub fn hang_next(&self, n: u32) {
        self.hang_remaining.store(n, Ordering::SeqCst);
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_date(&self) -> String {
        format!("T{}", self.date_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn gate(&self) -> Result<(), SyncError> {
        if self.hang_remaining.load(Ordering::SeqCst) > 0 {
            self.hang_remaining.fetch_sub(1, Ordering::SeqCst);
            self.hang_gate.notified().await;
        }
        if self.fail_remaining.load(Ordering::SeqCst) > 0 {
            self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::Remote {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl NoteApi for RecordingApi {
    async fn fetch_note(&self, id: &str) -> Result<Note, SyncError> {
        self.record(ApiCall::Fetch { id: id.to_string() });
        self.gate().await?;
        self.note(id).ok_or_else(|| SyncError::NotFound {
            id: id.to_string(),
        })
    }

    async fn create_note(
        &self,
        id: Option<&str>,
        meta: &NoteMeta,
        content: Option<&str>,
    ) -> Result<Note, SyncError> {
        self.record(ApiCall::Create {
            id: id.map(str::to_string),
            meta: meta.clone(),
            content: content.map(str::to_string),
        });
        self.gate().await?;

        let assigned = self
            .assigned_ids
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| id.map(str::to_string))
            .unwrap_or_else(|| {
                format!("srv{}", self.id_counter.fetch_add(1, Ordering::SeqCst) + 1)
            });
        let mut note = Note::new(assigned);
        note.title = meta.title.clone().unwrap_or_default();
        note.pid = meta.pid.clone();
        note.pic = meta.pic.clone();
        note.cid = meta.cid.clone();
        note.content = content.map(str::to_string);
        note.date = Some(self.next_date());
        self.insert_note(note.clone());
        Ok(note)
    }

    async fn update_content(&self, id: &str, content: &str) -> Result<Note, SyncError> {
        self.record(ApiCall::UpdateContent {
            id: id.to_string(),
            content: content.to_string(),
        });
        self.gate().await?;

        let mut note = self.note(id).unwrap_or_else(|| Note::new(id));
        note.content = Some(content.to_string());
        note.date = Some(self.next_date());
        self.insert_note(note.clone());
        Ok(note)
    }

    async fn update_meta(&self, id: &str, meta: &NoteMeta) -> Result<Note, SyncError> {
        self.record(ApiCall::UpdateMeta {
            id: id.to_string(),
            meta: meta.clone(),
        });
        self.gate().await?;

        let mut note = self.note(id).unwrap_or_else(|| Note::new(id));
        if let Some(title) = &meta.title {
            note.title = title.clone();
        }
        if meta.pid.is_some() {
            note.pid = meta.pid.clone();
        }
        if meta.pic.is_some() {
            note.pic = meta.pic.clone();
        }
        if meta.cid.is_some() {
            note.cid = meta.cid.clone();
        }
        note.date = Some(self.next_date());
        self.insert_note(note.clone());
        Ok(note)
    }

    async fn delete_note(&self, id: &str) -> Result<(), SyncError> {
        self.record(ApiCall::Delete { id: id.to_string() });
        self.gate().await?;
        self.notes.lock().unwrap().remove(id);
        Ok(())
    }
}
