pub mod store;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::note::Note;
use crate::sync::SyncError;
use crate::sync::api::NoteApi;
use store::MirrorStore;

/// Work sent to the mirror worker. Commands are applied in the order
/// they were sent.
#[derive(Debug, Clone)]
pub(crate) enum MirrorCommand {
    SaveNote { note: Note },
    RemoveNote { id: String },
    CheckAllNotes,
}

/// Sending side of the mirror worker's queue.
///
/// Sends never block and never surface errors to the caller; mirror
/// trouble is the worker's to log, not the save path's to fail on.
#[derive(Debug, Clone)]
pub(crate) struct MirrorHandle {
    tx: mpsc::UnboundedSender<MirrorCommand>,
}

impl MirrorHandle {
    pub fn save_note(&self, note: &Note) {
        let _ = self.tx.send(MirrorCommand::SaveNote { note: note.clone() });
    }

    pub fn remove_note(&self, id: &str) {
        let _ = self.tx.send(MirrorCommand::RemoveNote { id: id.to_string() });
    }

    pub fn check_all_notes(&self) {
        let _ = self.tx.send(MirrorCommand::CheckAllNotes);
    }
}

/// Counts from one pass over the mirror directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepStats {
    pub kept: usize,
    pub refreshed: usize,
    pub dropped: usize,
}

/// Start the mirror worker on the current runtime.
pub(crate) fn spawn<A: NoteApi>(store: MirrorStore, api: Arc<A>) -> (MirrorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(store, api, rx));
    (MirrorHandle { tx }, task)
}

async fn run<A: NoteApi>(
    store: MirrorStore,
    api: Arc<A>,
    mut rx: mpsc::UnboundedReceiver<MirrorCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            MirrorCommand::SaveNote { note } => {
                if let Err(e) = store.save(&note) {
                    log::warn!("mirror save failed for {}: {}", note.id, e);
                }
            }
            MirrorCommand::RemoveNote { id } => {
                if let Err(e) = store.remove(&id) {
                    log::warn!("mirror remove failed for {}: {}", id, e);
                }
            }
            MirrorCommand::CheckAllNotes => {
                let stats = sweep(&store, api.as_ref()).await;
                log::info!(
                    "mirror sweep: {} kept, {} refreshed, {} dropped",
                    stats.kept,
                    stats.refreshed,
                    stats.dropped
                );
            }
        }
    }
    log::debug!("mirror worker stopped");
}

/// Reconcile every mirrored note against the server.
///
/// Unparseable files and notes deleted on the server are dropped, notes
/// whose server copy has a different date are refreshed, and notes the
/// server cannot be asked about right now are left alone.
pub(crate) async fn sweep<A: NoteApi>(store: &MirrorStore, api: &A) -> SweepStats {
    let mut stats = SweepStats::default();
    let ids = match store.ids() {
        Ok(ids) => ids,
        Err(e) => {
            log::warn!(
                "mirror sweep skipped, cannot list {}: {}",
                store.dir().display(),
                e
            );
            return stats;
        }
    };

    for id in ids {
        let entry = match store.load(&id) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("dropping unreadable mirror entry {}: {}", id, e);
                let _ = store.remove(&id);
                stats.dropped += 1;
                continue;
            }
        };
        match api.fetch_note(&id).await {
            Ok(remote) => {
                if remote.date != entry.note.date {
                    match store.save(&remote) {
                        Ok(()) => stats.refreshed += 1,
                        Err(e) => {
                            log::warn!("mirror refresh failed for {}: {}", id, e);
                            stats.kept += 1;
                        }
                    }
                } else {
                    stats.kept += 1;
                }
            }
            Err(SyncError::NotFound { .. }) => {
                log::debug!("dropping mirror entry {} deleted on server", id);
                let _ = store.remove(&id);
                stats.dropped += 1;
            }
            Err(e) => {
                log::debug!("mirror sweep: {} unreachable, keeping local copy: {}", id, e);
                stats.kept += 1;
            }
        }
    }
    stats
}
