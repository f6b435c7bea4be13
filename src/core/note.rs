use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel parent id for notes at the top level of the tree.
pub const ROOT_ID: &str = "root";

/// Hard cap on title length in UTF-16 units, matching the editor's
/// input limit.
pub const MAX_TITLE_LEN: usize = 128;

/// A note as the server knows it.
///
/// `content` is only populated on full reads and saves; the in-memory
/// current note drops it after a save and the mirror keeps the full copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Note {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            pid: None,
            content: None,
            pic: None,
            cid: None,
            date: None,
        }
    }

    /// An unsaved note with a placeholder id. The server is free to assign
    /// a different id on create; the response overlay picks it up.
    pub fn draft(pid: Option<&str>) -> Self {
        let mut note = Self::new(Uuid::new_v4().to_string());
        note.pid = pid.map(str::to_string);
        note
    }

    pub fn parent_or_root(&self) -> &str {
        self.pid.as_deref().unwrap_or(ROOT_ID)
    }

    /// Overlay a server response on this note. Fields the server sent win;
    /// fields it left out keep their local value, so partial responses
    /// (a create that only echoes `id` and `date`) still merge correctly.
    pub fn merged_with(&self, server: &Note) -> Note {
        Note {
            id: if server.id.is_empty() {
                self.id.clone()
            } else {
                server.id.clone()
            },
            title: if server.title.is_empty() {
                self.title.clone()
            } else {
                server.title.clone()
            },
            pid: server.pid.clone().or_else(|| self.pid.clone()),
            content: server.content.clone().or_else(|| self.content.clone()),
            pic: server.pic.clone().or_else(|| self.pic.clone()),
            cid: server.cid.clone().or_else(|| self.cid.clone()),
            date: server.date.clone().or_else(|| self.date.clone()),
        }
    }

    /// Copy with `content` dropped, for the in-memory current note.
    pub fn without_content(&self) -> Note {
        let mut note = self.clone();
        note.content = None;
        note
    }
}

/// A partial note mutation. Fields left as `None` are untouched by the
/// save; a field staged twice within one quiet window keeps the later
/// value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub pid: Option<String>,
    pub content: Option<String>,
    pub pic: Option<String>,
    pub cid: Option<Vec<String>>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.pid.is_none()
            && self.content.is_none()
            && self.pic.is_none()
            && self.cid.is_none()
    }

    /// Fold a later patch into this one, field by field.
    pub fn merge(&mut self, later: NotePatch) {
        if later.title.is_some() {
            self.title = later.title;
        }
        if later.pid.is_some() {
            self.pid = later.pid;
        }
        if later.content.is_some() {
            self.content = later.content;
        }
        if later.pic.is_some() {
            self.pic = later.pic;
        }
        if later.cid.is_some() {
            self.cid = later.cid;
        }
    }

    /// The note as it should look once this patch is acknowledged.
    pub fn apply_to(&self, base: &Note) -> Note {
        Note {
            id: base.id.clone(),
            title: self.title.clone().unwrap_or_else(|| base.title.clone()),
            pid: self.pid.clone().or_else(|| base.pid.clone()),
            content: self.content.clone().or_else(|| base.content.clone()),
            pic: self.pic.clone().or_else(|| base.pic.clone()),
            cid: self.cid.clone().or_else(|| base.cid.clone()),
            date: base.date.clone(),
        }
    }

    /// Trim an over-long title down to the editor's limit.
    ///
    /// The limit counts UTF-16 units, the unit the editor's input field
    /// enforces; a character is never split, so a title can come out one
    /// unit short.
    pub fn clamp_title(&mut self) {
        if let Some(title) = &mut self.title {
            let mut units = 0;
            let mut cut = None;
            for (at, ch) in title.char_indices() {
                units += ch.len_utf16();
                if units > MAX_TITLE_LEN {
                    cut = Some(at);
                    break;
                }
            }
            if let Some(at) = cut {
                title.truncate(at);
            }
        }
    }
}
