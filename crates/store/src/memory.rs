//! In-memory implementation of [`NoteStore`] for tests.
//!
//! Records every operation in call order so tests can assert scheduling
//! properties (e.g. that a dirty note is saved before the next note loads),
//! and can be switched into a failing mode to exercise error containment.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::{Note, NoteId, NoteStore, SaveNoteRequest, StoreError};

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List,
    Create(String),
    Save(NoteId),
    Delete(NoteId),
}

#[derive(Default)]
struct Inner {
    notes: HashMap<NoteId, Note>,
    ops: Vec<StoreOp>,
    saved: Vec<SaveNoteRequest>,
    fail_saves: bool,
    /// Logical clock so "most recently updated" ordering is deterministic
    /// even when operations happen within the same wall-clock second.
    clock: i64,
}

#[derive(Default)]
pub struct MemoryNoteStore {
    inner: Mutex<Inner>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail with a network error.
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Every operation performed so far, in call order.
    pub fn recorded_ops(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    /// Every save payload accepted so far, in call order.
    pub fn saved_requests(&self) -> Vec<SaveNoteRequest> {
        self.lock().saved.clone()
    }

    /// Current server-side state of a note.
    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.lock().notes.get(&id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.lock().notes.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }
}

impl NoteStore for MemoryNoteStore {
    fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let mut inner = self.lock();
        inner.ops.push(StoreOp::List);
        let mut notes: Vec<Note> = inner.notes.values().cloned().collect();
        notes.sort_by_key(|n| std::cmp::Reverse(n.updated_at));
        Ok(notes)
    }

    fn create_note(&self, title: &str, document_id: Option<Uuid>) -> Result<Note, StoreError> {
        let mut inner = self.lock();
        inner.ops.push(StoreOp::Create(title.to_owned()));
        let updated_at = inner.tick();
        let note = Note::empty(title, document_id, updated_at);
        inner.notes.insert(note.id, note.clone());
        Ok(note)
    }

    fn save_note(&self, request: &SaveNoteRequest) -> Result<Note, StoreError> {
        let mut inner = self.lock();
        inner.ops.push(StoreOp::Save(request.id));
        if inner.fail_saves {
            return Err(StoreError::Network("simulated failure".to_owned()));
        }
        if !inner.notes.contains_key(&request.id) {
            return Err(StoreError::NoteNotFound(request.id));
        }
        inner.saved.push(request.clone());
        let updated_at = inner.tick();
        let note = inner
            .notes
            .get_mut(&request.id)
            .expect("checked above");
        note.title = request.title.clone();
        note.content = request.content.clone();
        note.document_id = request.document_id;
        note.ink = request.ink.clone();
        note.snapshot_png = request.snapshot_png.clone();
        note.updated_at = updated_at;
        Ok(note.clone())
    }

    fn delete_note(&self, id: NoteId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        inner.ops.push(StoreOp::Delete(id));
        Ok(inner.notes.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_save_list_delete_cycle() {
        let store = MemoryNoteStore::new();
        let note = store.create_note("First", None).unwrap();

        let request = SaveNoteRequest {
            id: note.id,
            title: "First (edited)".to_owned(),
            content: "<p>text</p>".to_owned(),
            document_id: None,
            ink: None,
            snapshot_png: Some(vec![1, 2, 3]),
        };
        let saved = store.save_note(&request).unwrap();
        assert_eq!(saved.title, "First (edited)");
        assert!(saved.has_snapshot());

        let listed = store.list_notes().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "<p>text</p>");

        assert!(store.delete_note(note.id).unwrap());
        assert!(!store.delete_note(note.id).unwrap());
    }

    #[test]
    fn list_orders_by_most_recently_updated() {
        let store = MemoryNoteStore::new();
        let a = store.create_note("a", None).unwrap();
        let b = store.create_note("b", None).unwrap();
        assert_eq!(store.list_notes().unwrap()[0].id, b.id);

        let request = SaveNoteRequest {
            id: a.id,
            title: "a".to_owned(),
            content: String::new(),
            document_id: None,
            ink: None,
            snapshot_png: None,
        };
        store.save_note(&request).unwrap();
        assert_eq!(store.list_notes().unwrap()[0].id, a.id);
    }

    #[test]
    fn failing_saves_surface_errors_and_record_calls() {
        let store = MemoryNoteStore::new();
        let note = store.create_note("x", None).unwrap();
        store.fail_saves(true);

        let request = SaveNoteRequest {
            id: note.id,
            title: "x".to_owned(),
            content: String::new(),
            document_id: None,
            ink: None,
            snapshot_png: None,
        };
        assert!(matches!(store.save_note(&request), Err(StoreError::Network(_))));
        assert_eq!(
            store.recorded_ops(),
            vec![StoreOp::Create("x".to_owned()), StoreOp::Save(note.id)]
        );
        assert!(store.saved_requests().is_empty());
    }

    #[test]
    fn saving_missing_note_reports_not_found() {
        let store = MemoryNoteStore::new();
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
