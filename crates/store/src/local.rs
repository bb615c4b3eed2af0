//! Local filesystem implementation of [`NoteStore`].
//!
//! Keeps the whole note collection in one versioned JSON envelope under the
//! platform data directory, written atomically (temp file + rename). Used
//! when no backend is configured, so the editor works offline with the same
//! persistence contract.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{unix_now, Note, NoteId, NoteStore, SaveNoteRequest, StoreError};

const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NotesEnvelope {
    version: u32,
    notes: Vec<Note>,
}

#[derive(Debug, Clone)]
pub struct LocalNoteStore {
    root: PathBuf,
}

impl LocalNoteStore {
    pub fn from_default_project() -> Result<Self, StoreError> {
        let dirs =
            ProjectDirs::from("dev", "Quillpad", "Quillpad").ok_or(StoreError::NoDataDirectory)?;
        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn notes_path(&self) -> PathBuf {
        self.root.join("notes.json")
    }

    fn load(&self) -> Result<Vec<Note>, StoreError> {
        let path = self.notes_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path)?;
        let envelope: NotesEnvelope = serde_json::from_slice(&bytes)?;
        Ok(envelope.notes)
    }

    fn save(&self, notes: Vec<Note>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let envelope = NotesEnvelope { version: STORE_SCHEMA_VERSION, notes };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let path = self.notes_path();
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

impl NoteStore for LocalNoteStore {
    fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes = self.load()?;
        notes.sort_by_key(|n| std::cmp::Reverse(n.updated_at));
        Ok(notes)
    }

    fn create_note(&self, title: &str, document_id: Option<Uuid>) -> Result<Note, StoreError> {
        let mut notes = self.load()?;
        let note = Note::empty(title, document_id, unix_now());
        notes.push(note.clone());
        self.save(notes)?;
        Ok(note)
    }

    fn save_note(&self, request: &SaveNoteRequest) -> Result<Note, StoreError> {
        let mut notes = self.load()?;
        let note = notes
            .iter_mut()
            .find(|n| n.id == request.id)
            .ok_or(StoreError::NoteNotFound(request.id))?;
        note.title = request.title.clone();
        note.content = request.content.clone();
        note.document_id = request.document_id;
        note.ink = request.ink.clone();
        note.snapshot_png = request.snapshot_png.clone();
        note.updated_at = unix_now();
        let updated = note.clone();
        self.save(notes)?;
        Ok(updated)
    }

    fn delete_note(&self, id: NoteId) -> Result<bool, StoreError> {
        let mut notes = self.load()?;
        let before = notes.len();
        notes.retain(|n| n.id != id);
        let removed = notes.len() != before;
        if removed {
            self.save(notes)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_lists_nothing() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = LocalNoteStore::with_root(temp.path());
        assert!(store.list_notes().unwrap().is_empty());
    }

    #[test]
    fn notes_survive_reopening_the_store() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = LocalNoteStore::with_root(temp.path());

        let note = store.create_note("Persistent", None).unwrap();
        let request = SaveNoteRequest {
            id: note.id,
            title: "Persistent".to_owned(),
            content: "<p>kept</p>".to_owned(),
            document_id: None,
            ink: Some("[]".to_owned()),
            snapshot_png: Some(vec![9, 9, 9]),
        };
        store.save_note(&request).unwrap();

        let reopened = LocalNoteStore::with_root(temp.path());
        let notes = reopened.list_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "<p>kept</p>");
        assert_eq!(notes[0].snapshot_png, Some(vec![9, 9, 9]));
    }

    #[test]
    fn delete_removes_note_from_disk() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = LocalNoteStore::with_root(temp.path());

        let note = store.create_note("Doomed", None).unwrap();
        assert!(store.delete_note(note.id).unwrap());
        assert!(!store.delete_note(note.id).unwrap());
        assert!(store.list_notes().unwrap().is_empty());
    }

    #[test]
    fn saving_unknown_note_fails() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = LocalNoteStore::with_root(temp.path());
        let request = SaveNoteRequest {
            id: Uuid::new_v4(),
            title: "ghost".to_owned(),
            content: String::new(),
            document_id: None,
            ink: None,
            snapshot_png: None,
        };
        assert!(matches!(store.save_note(&request), Err(StoreError::NoteNotFound(_))));
    }
}
