use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::SyncError;
use crate::core::note::{Note, NotePatch};

/// Metadata subset of a note accepted by the meta endpoints. Absent
/// fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Vec<String>>,
}

impl From<&NotePatch> for NoteMeta {
    fn from(patch: &NotePatch) -> Self {
        Self {
            title: patch.title.clone(),
            pid: patch.pid.clone(),
            pic: patch.pic.clone(),
            cid: patch.cid.clone(),
        }
    }
}

#[derive(Serialize)]
struct CreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    meta: &'a NoteMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

#[derive(Serialize)]
struct ContentBody<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// Remote note operations, kept behind a trait so the pipeline and the
/// mirror sweep can run against a canned server in tests.
pub trait NoteApi: Send + Sync + 'static {
    fn fetch_note(&self, id: &str) -> impl Future<Output = Result<Note, SyncError>> + Send;

    fn create_note(
        &self,
        id: Option<&str>,
        meta: &NoteMeta,
        content: Option<&str>,
    ) -> impl Future<Output = Result<Note, SyncError>> + Send;

    fn update_content(
        &self,
        id: &str,
        content: &str,
    ) -> impl Future<Output = Result<Note, SyncError>> + Send;

    fn update_meta(
        &self,
        id: &str,
        meta: &NoteMeta,
    ) -> impl Future<Output = Result<Note, SyncError>> + Send;

    fn delete_note(&self, id: &str) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Client for the note server's JSON interface.
pub struct HttpNoteApi {
    base_url: String,
    http: Client,
}

impl HttpNoteApi {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let http = Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn note_response(resp: reqwest::Response, id: &str) -> Result<Note, SyncError> {
        match resp.status() {
            status if status.is_success() => Ok(resp.json::<Note>().await?),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound { id: id.to_string() }),
            status => Err(SyncError::Remote {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Upload an attachment, returning the URL the server stored it under.
    pub async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<String, SyncError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .http
            .post(self.url("/file/upload"))
            .multipart(form)
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(resp.json::<UploadResponse>().await?.url),
            status => Err(SyncError::Remote {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

impl NoteApi for HttpNoteApi {
    async fn fetch_note(&self, id: &str) -> Result<Note, SyncError> {
        let resp = self
            .http
            .get(self.url(&format!("/notes/{id}")))
            .send()
            .await?;
        Self::note_response(resp, id).await
    }

    async fn create_note(
        &self,
        id: Option<&str>,
        meta: &NoteMeta,
        content: Option<&str>,
    ) -> Result<Note, SyncError> {
        let body = CreateBody { id, meta, content };
        let resp = self
            .http
            .post(self.url("/notes"))
            .json(&body)
            .send()
            .await?;
        Self::note_response(resp, id.unwrap_or_default()).await
    }

    async fn update_content(&self, id: &str, content: &str) -> Result<Note, SyncError> {
        let resp = self
            .http
            .post(self.url(&format!("/notes/{id}")))
            .json(&ContentBody { content })
            .send()
            .await?;
        Self::note_response(resp, id).await
    }

    async fn update_meta(&self, id: &str, meta: &NoteMeta) -> Result<Note, SyncError> {
        let resp = self
            .http
            .post(self.url(&format!("/notes/{id}/meta")))
            .json(meta)
            .send()
            .await?;
        Self::note_response(resp, id).await
    }

    async fn delete_note(&self, id: &str) -> Result<(), SyncError> {
        let resp = self
            .http
            .delete(self.url(&format!("/notes/{id}")))
            .send()
            .await?;
        match resp.status() {
            // Deleting an already-gone note is not an error.
            status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(()),
            status => Err(SyncError::Remote {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_note_parses_note() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/notes/n1");
                then.status(200).json_body(json!({
                    "id": "n1",
                    "title": "Groceries",
                    "pid": "root",
                    "content": "- milk\n",
                    "date": "2024-01-01T00:00:00Z",
                }));
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let note = api.fetch_note("n1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(note.id, "n1");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.pid.as_deref(), Some("root"));
        assert_eq!(note.content.as_deref(), Some("- milk\n"));
    }

    #[tokio::test]
    async fn fetch_note_maps_missing_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/notes/ghost");
                then.status(404);
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let err = api.fetch_note("ghost").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { id } if id == "ghost"));
    }

    #[tokio::test]
    async fn create_posts_full_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/notes").json_body(json!({
                    "id": "draft-1",
                    "meta": { "title": "Untitled", "pid": "root" },
                    "content": "\n",
                }));
                then.status(200).json_body(json!({
                    "id": "n1",
                    "title": "Untitled",
                    "pid": "root",
                    "date": "2024-01-01T00:00:00Z",
                }));
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let meta = NoteMeta {
            title: Some("Untitled".to_string()),
            pid: Some("root".to_string()),
            ..NoteMeta::default()
        };
        let note = api
            .create_note(Some("draft-1"), &meta, Some("\n"))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(note.id, "n1");
    }

    #[tokio::test]
    async fn update_content_posts_to_note_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/notes/n1")
                    .json_body(json!({ "content": "new body" }));
                then.status(200)
                    .json_body(json!({ "id": "n1", "title": "Groceries" }));
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let note = api.update_content("n1", "new body").await.unwrap();
        mock.assert_async().await;
        assert_eq!(note.id, "n1");
    }

    #[tokio::test]
    async fn update_meta_posts_to_meta_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/notes/n1/meta")
                    .json_body(json!({ "title": "Renamed" }));
                then.status(200)
                    .json_body(json!({ "id": "n1", "title": "Renamed" }));
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let meta = NoteMeta {
            title: Some("Renamed".to_string()),
            ..NoteMeta::default()
        };
        let note = api.update_meta("n1", &meta).await.unwrap();
        mock.assert_async().await;
        assert_eq!(note.title, "Renamed");
    }

    #[tokio::test]
    async fn delete_tolerates_already_gone_note() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/notes/n1");
                then.status(404);
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        assert!(api.delete_note("n1").await.is_ok());
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/notes/n1");
                then.status(500).body("disk full");
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let err = api.update_content("n1", "x").await.unwrap_err();
        match err {
            SyncError::Remote { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_returns_stored_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/file/upload");
                then.status(200).json_body(json!({ "url": "/files/pic.png" }));
            })
            .await;

        let api = HttpNoteApi::new(&server.base_url()).unwrap();
        let url = api
            .upload_file("pic.png", b"\x89PNG".to_vec())
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(url, "/files/pic.png");
    }
}
