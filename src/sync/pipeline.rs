use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering;

use tokio::sync::broadcast;

use super::api::{NoteApi, NoteMeta};
use super::cache::{ReadCache, note_read_key};
use super::{SyncError, SyncEvent};
use crate::core::note::{Note, NotePatch, ROOT_ID};
use crate::core::tree::{TreeError, TreeIndex};
use crate::mirror::MirrorHandle;
use crate::store::SessionState;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Outcome of a dispatched save, not yet applied locally.
#[derive(Debug, Clone)]
pub(crate) struct SaveOutcome {
    pub note: Note,
    pub created: bool,
}

/// Runs the consistency steps around every remote note operation.
///
/// For a save that is: structural validation, cache invalidation,
/// the classified server call, then the server-response overlay. The
/// dispatch and apply halves are split so a caller can drop a response
/// that arrived after it was superseded.
pub(crate) struct SyncPipeline<A: NoteApi> {
    api: Arc<A>,
    cache: ReadCache,
    tree: Mutex<TreeIndex>,
    state: Arc<SessionState>,
    mirror: MirrorHandle,
    events: broadcast::Sender<SyncEvent>,
}

impl<A: NoteApi> SyncPipeline<A> {
    /// Wire a pipeline around its collaborators. The cache and tree are
    /// passed in rather than built here, so callers can seed or share
    /// them.
    pub fn new(
        api: Arc<A>,
        cache: ReadCache,
        tree: TreeIndex,
        state: Arc<SessionState>,
        mirror: MirrorHandle,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            cache,
            tree: Mutex::new(tree),
            state,
            mirror,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn children(&self, pid: &str) -> Vec<String> {
        self.tree.lock().unwrap().children(pid).to_vec()
    }

    /// Fetch a note and make it current, serving repeat opens from the
    /// read cache. Absent or empty content comes back as a single
    /// newline so the editor always has something to bind to.
    pub async fn load(&self, id: &str) -> Result<Note, SyncError> {
        let key = note_read_key(id);
        if let Some(note) = self.cache.get(&key) {
            log::debug!("serving note {} from cache", id);
            self.make_current(&note);
            return Ok(note);
        }

        let mut note = self.api.fetch_note(id).await?;
        if note.content.as_deref().is_none_or(str::is_empty) {
            note.content = Some("\n".to_string());
        }
        self.cache.put(key, note.clone());
        self.index_note(&note);
        self.make_current(&note);
        Ok(note)
    }

    /// Push one merged mutation for `id` to the server.
    ///
    /// New-note context wins over content presence when classifying the
    /// call. Local state is untouched until [`commit`](Self::commit);
    /// the caller decides whether the response still applies.
    pub async fn save(
        &self,
        id: &str,
        patch: &NotePatch,
        is_new: bool,
    ) -> Result<SaveOutcome, SyncError> {
        let mut patch = patch.clone();
        patch.clamp_title();

        if let Some(pid) = &patch.pid {
            self.tree.lock().unwrap().validate_move(id, pid)?;
        }

        let base = {
            let current = self.state.current.lock().unwrap();
            match current.as_ref() {
                Some(note) if note.id == id => note.clone(),
                _ => Note::new(id),
            }
        };
        let base = patch.apply_to(&base);

        self.cache.invalidate_note(id);

        let response = if is_new {
            self.api
                .create_note(Some(id), &NoteMeta::from(&patch), patch.content.as_deref())
                .await?
        } else if let Some(content) = &patch.content {
            self.api.update_content(id, content).await?
        } else {
            self.api.update_meta(id, &NoteMeta::from(&patch)).await?
        };

        Ok(SaveOutcome {
            note: base.merged_with(&response),
            created: is_new,
        })
    }

    /// Apply an acknowledged save: current note, tree, mirror, event.
    ///
    /// The current note keeps only metadata; the mirror worker gets the
    /// full copy. `prev_id` is the id the save was addressed to, which
    /// differs from the merged id when the server assigned one on create.
    pub fn commit(&self, prev_id: &str, outcome: SaveOutcome) {
        let note = &outcome.note;
        {
            let mut current = self.state.current.lock().unwrap();
            let matches = current
                .as_ref()
                .is_some_and(|n| n.id == prev_id || n.id == note.id);
            if matches {
                *current = Some(note.without_content());
                if outcome.created {
                    self.state.draft.store(false, Ordering::SeqCst);
                }
            }
        }
        self.index_note(note);
        self.mirror.save_note(note);
        let _ = self.events.send(SyncEvent::Saved {
            note: note.clone(),
            created: outcome.created,
        });
    }

    pub fn emit_save_failed(&self, id: &str, attempts: u32, error: &SyncError) {
        log::error!("save of note {} failed after {} attempts: {}", id, attempts, error);
        let _ = self.events.send(SyncEvent::SaveFailed {
            id: id.to_string(),
            attempts,
            error: error.to_string(),
        });
    }

    /// Immediate metadata write for moves and renames driven by the
    /// tree view. Same sequence as a save, without the quiet window.
    pub async fn update_meta(&self, id: &str, meta: NoteMeta) -> Result<Note, SyncError> {
        if let Some(pid) = &meta.pid {
            self.tree.lock().unwrap().validate_move(id, pid)?;
        }

        let base = {
            let current = self.state.current.lock().unwrap();
            match current.as_ref() {
                Some(note) if note.id == id => note.clone(),
                _ => Note::new(id),
            }
        };

        self.cache.invalidate_note(id);
        let response = self.api.update_meta(id, &meta).await?;
        let merged = base.merged_with(&response);
        self.commit(
            id,
            SaveOutcome {
                note: merged.clone(),
                created: false,
            },
        );
        Ok(merged)
    }

    /// Delete a note remotely and locally. The mirror copy goes through
    /// the worker; the startup sweep backstops a worker that never got
    /// to it.
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        self.cache.invalidate_note(id);
        self.api.delete_note(id).await?;

        if !self.tree.lock().unwrap().remove(id) {
            log::debug!("removed note {} was not indexed", id);
        }
        {
            let mut current = self.state.current.lock().unwrap();
            if current.as_ref().is_some_and(|n| n.id == id) {
                *current = None;
            }
        }
        self.mirror.remove_note(id);
        let _ = self.events.send(SyncEvent::Removed { id: id.to_string() });
        Ok(())
    }

    /// Index a note, falling back to the root when its parent has not
    /// been loaded in this session.
    fn index_note(&self, note: &Note) {
        let mut tree = self.tree.lock().unwrap();
        match tree.upsert_note(note) {
            Ok(()) => {}
            Err(TreeError::UnknownParent { id, pid }) => {
                log::warn!("parent {} of {} not indexed yet, attaching under root", pid, id);
                if let Err(e) = tree.upsert(&note.id, ROOT_ID) {
                    log::error!("cannot index note {}: {}", note.id, e);
                }
            }
            Err(e) => log::error!("refusing to index note {}: {}", note.id, e),
        }
    }

    fn make_current(&self, note: &Note) {
        *self.state.current.lock().unwrap() = Some(note.clone());
        self.state.draft.store(false, Ordering::SeqCst);
    }
}
