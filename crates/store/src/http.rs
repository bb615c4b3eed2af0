//! HTTP implementation of [`NoteStore`].
//!
//! Talks JSON to the backend's note endpoints through a shared `ureq` agent
//! with a bounded per-request timeout, so a stalled backend surfaces as a
//! recoverable error instead of hanging the editor.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::{Note, NoteId, NoteStore, SaveNoteRequest, StoreError};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpNoteStore {
    agent: ureq::Agent,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpNoteStore {
    /// Create a client for a backend base URL such as
    /// `https://api.example.com/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self { agent, base_url: base_url.into().trim_end_matches('/').to_owned(), auth_token: None }
    }

    /// Attach a bearer token to every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn notes_url(&self) -> String {
        format!("{}/notes", self.base_url)
    }

    fn note_url(&self, id: NoteId) -> String {
        format!("{}/notes/{}", self.base_url, id)
    }

    fn prepare(&self, request: ureq::Request) -> ureq::Request {
        let request = request.set("Accept", "application/json");
        match &self.auth_token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: ureq::Request,
        body: Option<String>,
        not_found: Option<NoteId>,
    ) -> Result<T, StoreError> {
        let request = self.prepare(request);
        let result = match body {
            Some(json) => request.set("Content-Type", "application/json").send_string(&json),
            None => request.call(),
        };
        let response = result.map_err(|err| map_error(err, not_found))?;
        let text = response
            .into_string()
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }
}

fn map_error(err: ureq::Error, not_found: Option<NoteId>) -> StoreError {
    match (err, not_found) {
        (ureq::Error::Status(404, _), Some(id)) => StoreError::NoteNotFound(id),
        (ureq::Error::Status(status, response), _) => {
            let message = response.into_string().unwrap_or_default();
            let message = message.chars().take(200).collect();
            StoreError::Api { status, message }
        }
        (ureq::Error::Transport(transport), _) => StoreError::Network(transport.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default = "default_true")]
    success: bool,
}

fn default_true() -> bool {
    true
}

impl NoteStore for HttpNoteStore {
    fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> =
            self.send_json(self.agent.get(&self.notes_url()), None, None)?;
        notes.sort_by_key(|n| std::cmp::Reverse(n.updated_at));
        Ok(notes)
    }

    fn create_note(&self, title: &str, document_id: Option<Uuid>) -> Result<Note, StoreError> {
        let body = serde_json::json!({
            "title": title,
            "document_id": document_id,
        });
        self.send_json(self.agent.post(&self.notes_url()), Some(body.to_string()), None)
    }

    fn save_note(&self, request: &SaveNoteRequest) -> Result<Note, StoreError> {
        let body = serde_json::to_string(request)?;
        log::debug!(
            "saving note {} ({} bytes content, snapshot: {})",
            request.id,
            request.content.len(),
            request.snapshot_png.as_ref().map(Vec::len).unwrap_or(0),
        );
        self.send_json(
            self.agent.put(&self.note_url(request.id)),
            Some(body),
            Some(request.id),
        )
    }

    fn delete_note(&self, id: NoteId) -> Result<bool, StoreError> {
        let response: DeleteResponse =
            self.send_json(self.agent.delete(&self.note_url(id)), None, Some(id))?;
        Ok(response.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_normalized() {
        let store = HttpNoteStore::new("https://api.example.com/v1/");
        assert_eq!(store.notes_url(), "https://api.example.com/v1/notes");
        let id = Uuid::nil();
        assert_eq!(
            store.note_url(id),
            "https://api.example.com/v1/notes/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn delete_response_defaults_to_success() {
        let parsed: DeleteResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.success);
        let parsed: DeleteResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!parsed.success);
    }
}
