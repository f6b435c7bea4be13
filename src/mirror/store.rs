use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::note::Note;

/// One mirrored note on disk, stamped with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub saved_at: DateTime<Utc>,
    pub note: Note,
}

/// Directory of per-note JSON files holding the last full copy of each
/// synced note, content included. The in-memory current note drops its
/// content after a save; this is where the full copy lives.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    dir: PathBuf,
}

impl MirrorStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Note ids come from the server; refuse anything that could leave
    // the mirror directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return None;
        }
        Some(self.dir.join(format!("{id}.json")))
    }

    pub fn save(&self, note: &Note) -> io::Result<()> {
        let Some(path) = self.path_for(&note.id) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable note id: {:?}", note.id),
            ));
        };
        let entry = MirrorEntry {
            saved_at: Utc::now(),
            note: note.clone(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    pub fn load(&self, id: &str) -> io::Result<MirrorEntry> {
        let Some(path) = self.path_for(id) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable note id: {id:?}"),
            ));
        };
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Delete a mirrored note. Missing files are fine.
    pub fn remove(&self, id: &str) -> io::Result<()> {
        let Some(path) = self.path_for(id) else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ids of every mirrored note, sorted.
    pub fn ids(&self) -> io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::ROOT_ID;

    fn make_note(id: &str) -> Note {
        let mut note = Note::new(id);
        note.title = "Groceries".to_string();
        note.pid = Some(ROOT_ID.to_string());
        note.content = Some("- milk\n".to_string());
        note.date = Some("2024-01-01T00:00:00Z".to_string());
        note
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::open(dir.path()).unwrap();
        let note = make_note("n1");

        store.save(&note).unwrap();
        let entry = store.load("n1").unwrap();
        assert_eq!(entry.note, note);
        assert!(entry.saved_at <= Utc::now());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::open(dir.path()).unwrap();
        store.save(&make_note("n1")).unwrap();

        store.remove("n1").unwrap();
        store.remove("n1").unwrap();
        assert!(store.load("n1").is_err());
    }

    #[test]
    fn ids_lists_only_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::open(dir.path()).unwrap();
        store.save(&make_note("b")).unwrap();
        store.save(&make_note("a")).unwrap();
        fs::write(dir.path().join("stray.txt"), "ignore me").unwrap();

        assert_eq!(store.ids().unwrap(), ["a", "b"]);
    }

    #[test]
    fn rejects_path_escaping_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::open(dir.path()).unwrap();

        let err = store.save(&make_note("../escape")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(store.load("a/b").is_err());
        assert!(store.remove("a/b").is_ok());
    }

    #[test]
    fn load_rejects_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let err = store.load("bad").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
