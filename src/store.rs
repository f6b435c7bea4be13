use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::core::note::{Note, NotePatch};
use crate::core::tree::TreeIndex;
use crate::mirror::store::MirrorStore;
use crate::sync::api::{NoteApi, NoteMeta};
use crate::sync::cache::ReadCache;
use crate::sync::pipeline::SyncPipeline;
use crate::sync::scheduler::DebounceScheduler;
use crate::sync::{SyncError, SyncEvent};

/// Session-scoped note state shared between the store facade and the
/// sync pipeline.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub current: Mutex<Option<Note>>,
    pub loading: AtomicBool,
    /// Set while the current note has never been persisted.
    pub draft: AtomicBool,
}

/// One editing session over the note server.
///
/// Owns the debounce scheduler and the mirror worker; the embedding
/// view layer stages edits here and listens on [`subscribe`] for the
/// results. Dropping the store aborts scheduled saves and the worker.
///
/// [`subscribe`]: NoteStore::subscribe
pub struct NoteStore<A: NoteApi> {
    state: Arc<SessionState>,
    pipeline: Arc<SyncPipeline<A>>,
    scheduler: DebounceScheduler<A>,
    worker: JoinHandle<()>,
}

impl<A: NoteApi> NoteStore<A> {
    /// Build a session store. Must be called on a Tokio runtime; the
    /// mirror worker starts immediately and is asked to reconcile the
    /// mirror directory against the server.
    pub fn new(api: Arc<A>, config: &SyncConfig) -> std::io::Result<Self> {
        config.ensure_dirs()?;
        let mirror_store = MirrorStore::open(&config.mirror_dir)?;
        let (mirror, worker) = crate::mirror::spawn(mirror_store, api.clone());
        mirror.check_all_notes();

        let state = Arc::new(SessionState::default());
        let pipeline = Arc::new(SyncPipeline::new(
            api,
            ReadCache::new(),
            TreeIndex::new(),
            state.clone(),
            mirror,
        ));
        let scheduler = DebounceScheduler::new(
            pipeline.clone(),
            config.quiet_window(),
            config.max_save_attempts,
        );
        Ok(Self {
            state,
            pipeline,
            scheduler,
            worker,
        })
    }

    /// Fetch a note and make it the current one.
    pub async fn open(&self, id: &str) -> Result<Note, SyncError> {
        self.state.loading.store(true, Ordering::SeqCst);
        let result = self.pipeline.load(id).await;
        self.state.loading.store(false, Ordering::SeqCst);
        result
    }

    /// Start a new unsaved note under `pid`, returning the draft that
    /// became current. Nothing goes to the server until the first
    /// staged save.
    pub fn open_draft(&self, pid: Option<&str>) -> Note {
        let draft = Note::draft(pid);
        *self.state.current.lock().unwrap() = Some(draft.clone());
        self.state.draft.store(true, Ordering::SeqCst);
        draft
    }

    /// Stage a debounced save against the current note. With no current
    /// note a fresh draft is opened first, so stray editor input is not
    /// dropped. Results arrive as [`SyncEvent`]s.
    pub fn save_note(&self, patch: NotePatch) {
        let current_id = self
            .state
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|note| note.id.clone());
        let (id, is_new) = match current_id {
            Some(id) => (id, self.state.draft.load(Ordering::SeqCst)),
            None => (self.open_draft(None).id, true),
        };
        self.scheduler.stage(&id, patch, is_new);
    }

    /// Write note metadata immediately, without debouncing. Used for
    /// moves and renames driven by the tree view.
    pub async fn update_note_meta(&self, id: &str, meta: NoteMeta) -> Result<Note, SyncError> {
        self.pipeline.update_meta(id, meta).await
    }

    /// Delete a note on the server and everywhere locally.
    pub async fn remove_note(&self, id: &str) -> Result<(), SyncError> {
        self.pipeline.remove(id).await
    }

    pub fn current(&self) -> Option<Note> {
        self.state.current.lock().unwrap().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.pipeline.subscribe()
    }

    /// Child ids under `pid`, in sidebar order.
    pub fn children(&self, pid: &str) -> Vec<String> {
        self.pipeline.children(pid)
    }
}

impl<A: NoteApi> Drop for NoteStore<A> {
    fn drop(&mut self) {
        self.scheduler.abort_all();
        self.worker.abort();
    }
}
