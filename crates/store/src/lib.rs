//! Note store: the remote persistence collaborator for Quillpad notebooks.
//!
//! The backend owns durable note state; this crate defines the entity types,
//! the [`NoteStore`] operations the editor needs (list, create, save,
//! delete), an HTTP implementation, a local JSON implementation for offline
//! use, and an in-memory implementation that records call order for tests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod http;
pub mod local;
pub mod memory;

pub use http::HttpNoteStore;
pub use local::LocalNoteStore;
pub use memory::{MemoryNoteStore, StoreOp};

/// Unique identifier for a note.
pub type NoteId = Uuid;

/// Error type for note store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("note not found: {0}")]
    NoteNotFound(NoteId),
    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// A persisted note record.
///
/// `content` is the serialized rich-text markup, `ink` the vector stroke
/// list as JSON, and `snapshot_png` the flattened ink raster. The snapshot
/// travels base64-encoded inside JSON bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Source document (PDF) this note is associated with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub snapshot_png: Option<Vec<u8>>,
    pub updated_at: i64,
}

impl Note {
    /// A freshly created empty note.
    pub fn empty(title: impl Into<String>, document_id: Option<Uuid>, updated_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            document_id,
            content: String::new(),
            ink: None,
            snapshot_png: None,
            updated_at,
        }
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot_png.as_ref().is_some_and(|png| !png.is_empty())
    }
}

/// Payload of a save operation. Rename is a save carrying the current
/// content under the new title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveNoteRequest {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub snapshot_png: Option<Vec<u8>>,
}

/// The remote note store, as seen by the editor.
///
/// Implementations are blocking; the editor treats each call as a
/// synchronous suspension point, matching its single save-in-flight
/// scheduling discipline.
pub trait NoteStore {
    /// All notes for the current user, most recently updated first.
    fn list_notes(&self) -> Result<Vec<Note>, StoreError>;

    /// Create a new empty note.
    fn create_note(&self, title: &str, document_id: Option<Uuid>) -> Result<Note, StoreError>;

    /// Persist title, content, ink and snapshot in one request.
    fn save_note(&self, request: &SaveNoteRequest) -> Result<Note, StoreError>;

    /// Delete a note. Returns whether the note existed.
    fn delete_note(&self, id: NoteId) -> Result<bool, StoreError>;
}

impl<T: NoteStore + ?Sized> NoteStore for std::sync::Arc<T> {
    fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        (**self).list_notes()
    }

    fn create_note(&self, title: &str, document_id: Option<Uuid>) -> Result<Note, StoreError> {
        (**self).create_note(title, document_id)
    }

    fn save_note(&self, request: &SaveNoteRequest) -> Result<Note, StoreError> {
        (**self).save_note(request)
    }

    fn delete_note(&self, id: NoteId) -> Result<bool, StoreError> {
        (**self).delete_note(id)
    }
}

/// Current Unix timestamp in seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Base64 (de)serialization for optional binary payloads in JSON bodies.
mod b64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
