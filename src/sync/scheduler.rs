use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::AbortHandle;

use super::api::NoteApi;
use super::pipeline::SyncPipeline;
use crate::core::note::NotePatch;

/// Per-note debounce state.
#[derive(Default)]
struct PendingEdit {
    patch: NotePatch,
    is_new: bool,
    generation: u64,
    timer: Option<AbortHandle>,
    in_flight: Option<AbortHandle>,
}

struct Inner<A: NoteApi> {
    pipeline: Arc<SyncPipeline<A>>,
    quiet_window: Duration,
    max_attempts: u32,
    entries: Mutex<HashMap<String, PendingEdit>>,
    // Placeholder id -> id the server assigned on create. Edits staged
    // behind a placeholder keep working after the switch.
    aliases: Mutex<HashMap<String, String>>,
}

/// Debounces edits per note and owns their in-flight sync calls.
///
/// Every staged patch folds into the note's pending edit and restarts
/// its quiet window. When the window elapses the merged patch becomes
/// one sync call. A window elapsing while an older call for the same
/// note is still in flight aborts that call before the new one starts,
/// so a note never has two calls racing and a response that was
/// superseded mid-flight is never applied.
pub(crate) struct DebounceScheduler<A: NoteApi> {
    inner: Arc<Inner<A>>,
}

impl<A: NoteApi> Clone for DebounceScheduler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: NoteApi> DebounceScheduler<A> {
    pub fn new(pipeline: Arc<SyncPipeline<A>>, quiet_window: Duration, max_attempts: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                quiet_window,
                max_attempts: max_attempts.max(1),
                entries: Mutex::new(HashMap::new()),
                aliases: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fold a patch into the note's pending edit and restart its quiet
    /// window. Empty patches are dropped here.
    pub fn stage(&self, id: &str, patch: NotePatch, is_new: bool) {
        if patch.is_empty() {
            return;
        }
        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries.entry(id.to_string()).or_default();
        entry.patch.merge(patch);
        entry.is_new |= is_new;
        entry.generation += 1;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }

        let scheduler = self.clone();
        let note_id = id.to_string();
        let generation = entry.generation;
        let quiet = self.inner.quiet_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            scheduler.fire(note_id, generation);
        });
        entry.timer = Some(timer.abort_handle());
    }

    /// Quiet window elapsed: take the pending patch and issue its sync
    /// call, aborting any call still in flight for this note first.
    fn fire(&self, id: String, generation: u64) {
        let mut entries = self.inner.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        if entry.generation != generation {
            // A newer edit restarted the window.
            return;
        }
        entry.timer = None;
        if entry.patch.is_empty() {
            return;
        }
        let patch = std::mem::take(&mut entry.patch);
        let is_new = entry.is_new;
        if let Some(in_flight) = entry.in_flight.take() {
            log::debug!("aborting in-flight sync for {}", id);
            in_flight.abort();
        }

        let scheduler = self.clone();
        let task = tokio::spawn(async move {
            scheduler.run_sync(id, patch, is_new, generation).await;
        });
        entry.in_flight = Some(task.abort_handle());
    }

    async fn run_sync(&self, id: String, patch: NotePatch, is_new: bool, generation: u64) {
        let target = self.resolve(&id);
        // A resolved alias means the note was created while these edits
        // were queued; they go out as plain updates.
        let is_new = is_new && target == id;

        let mut attempt = 1;
        loop {
            match self.inner.pipeline.save(&target, &patch, is_new).await {
                Ok(outcome) => {
                    let server_id = outcome.note.id.clone();
                    if self.is_current(&id, generation) {
                        self.inner.pipeline.commit(&target, outcome);
                    } else {
                        log::debug!("discarding superseded sync result for {}", target);
                    }
                    if is_new {
                        self.adopt_server_id(&id, &server_id);
                    }
                    self.finish(&id, generation);
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.inner.max_attempts => {
                    log::warn!(
                        "sync attempt {} for {} failed, retrying: {}",
                        attempt,
                        target,
                        e
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.inner.pipeline.emit_save_failed(&target, attempt, &e);
                    self.finish(&id, generation);
                    return;
                }
            }
        }
    }

    /// Whether no newer edit for this note has been staged since.
    fn is_current(&self, id: &str, generation: u64) -> bool {
        self.inner
            .entries
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Drop the note's entry once its call chain is done, unless newer
    /// edits queued up behind it.
    fn finish(&self, id: &str, generation: u64) {
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get(id) {
            if entry.generation == generation && entry.patch.is_empty() {
                entries.remove(id);
            }
        }
    }

    fn resolve(&self, id: &str) -> String {
        self.inner
            .aliases
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn adopt_server_id(&self, placeholder: &str, server_id: &str) {
        if placeholder == server_id {
            return;
        }
        log::debug!(
            "note {} persisted as {}, re-keying staged edits",
            placeholder,
            server_id
        );
        self.inner
            .aliases
            .lock()
            .unwrap()
            .insert(placeholder.to_string(), server_id.to_string());
        if let Some(entry) = self.inner.entries.lock().unwrap().get_mut(placeholder) {
            entry.is_new = false;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.inner.quiet_window * 2_u32.saturating_pow(attempt - 1)
    }

    /// Abort every timer and in-flight call. Called when the owning
    /// session shuts down.
    pub fn abort_all(&self) {
        let mut entries = self.inner.entries.lock().unwrap();
        for (_, entry) in entries.drain() {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
            if let Some(task) = entry.in_flight {
                task.abort();
            }
        }
    }
}
