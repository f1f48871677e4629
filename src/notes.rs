/// Free-text notes attached to profiles

use crate::error::{Error, Result};
use crate::listeners::Subscription;
use crate::mirror::Mirror;
use crate::platform::{Clock, Millis};
use crate::store::{DocumentStore, update_document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use uuid::Uuid;

pub const NOTES_DOCUMENT: &str = "notes";
const MAX_NOTE_LEN: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub text: String,
    pub created_at: Millis,
    pub updated_at: Millis,
}

/// Profile id -> notes, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteBook {
    #[serde(default)]
    pub notes: BTreeMap<String, Vec<Note>>,
}

fn clean_text(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("note is empty".to_string()));
    }
    if text.chars().count() > MAX_NOTE_LEN {
        return Err(Error::InvalidInput(format!(
            "note longer than {} characters",
            MAX_NOTE_LEN
        )));
    }
    Ok(text.to_string())
}

impl NoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_note(&mut self, profile_id: &str, id: &str, text: &str, now: Millis) -> Result<Note> {
        if profile_id.is_empty() {
            return Err(Error::InvalidInput("profile id is empty".to_string()));
        }
        let note = Note {
            id: id.to_string(),
            text: clean_text(text)?,
            created_at: now,
            updated_at: now,
        };

        let notes = self.notes.entry(profile_id.to_string()).or_default();
        // A retried write may find its own note already in place
        notes.retain(|n| n.id != id);
        notes.push(note.clone());
        Ok(note)
    }

    pub fn update_note(&mut self, note_id: &str, text: &str, now: Millis) -> Result<Note> {
        let text = clean_text(text)?;
        let note = self
            .notes
            .values_mut()
            .flat_map(|notes| notes.iter_mut())
            .find(|n| n.id == note_id)
            .ok_or_else(|| Error::NoteNotFound(note_id.to_string()))?;

        note.text = text;
        note.updated_at = now;
        Ok(note.clone())
    }

    pub fn delete_note(&mut self, note_id: &str) -> Result<Note> {
        let (profile_id, index) = self
            .notes
            .iter()
            .find_map(|(profile_id, notes)| {
                notes
                    .iter()
                    .position(|n| n.id == note_id)
                    .map(|i| (profile_id.clone(), i))
            })
            .ok_or_else(|| Error::NoteNotFound(note_id.to_string()))?;

        let notes = self
            .notes
            .get_mut(&profile_id)
            .ok_or_else(|| Error::NoteNotFound(note_id.to_string()))?;
        let removed = notes.remove(index);
        if notes.is_empty() {
            self.notes.remove(&profile_id);
        }
        Ok(removed)
    }

    pub fn notes_for(&self, profile_id: &str) -> &[Note] {
        self.notes.get(profile_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Mirror of `users/{uid}/notes` with compare-and-swap edits
pub struct Notes {
    mirror: Mirror<NoteBook>,
    store: Rc<dyn DocumentStore>,
    clock: Rc<dyn Clock>,
    attempts: u32,
}

impl Notes {
    pub fn new(store: Rc<dyn DocumentStore>, clock: Rc<dyn Clock>, attempts: u32) -> Self {
        Notes {
            mirror: Mirror::new(store.clone(), NOTES_DOCUMENT),
            store,
            clock,
            attempts,
        }
    }

    pub fn mirror(&self) -> &Mirror<NoteBook> {
        &self.mirror
    }

    pub fn notes_for(&self, profile_id: &str) -> Vec<Note> {
        self.mirror
            .snapshot()
            .map(|book| book.notes_for(profile_id).to_vec())
            .unwrap_or_default()
    }

    pub fn on_change(&self, listener: impl Fn(&NoteBook) + 'static) -> Subscription {
        self.mirror
            .on_change(move |book| listener(&book.clone().unwrap_or_default()))
    }

    async fn update<R>(&self, mutate: impl FnMut(&mut NoteBook) -> Result<R>) -> Result<R> {
        let path = self.mirror.require_path()?;
        let (_, outcome) = update_document(self.store.as_ref(), &path, self.attempts, mutate).await?;
        Ok(outcome)
    }

    pub async fn add_note(&self, profile_id: &str, text: &str) -> Result<Note> {
        let id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        self.update(|book| book.add_note(profile_id, &id, text, now))
            .await
    }

    pub async fn update_note(&self, note_id: &str, text: &str) -> Result<Note> {
        let now = self.clock.now();
        self.update(|book| book.update_note(note_id, text, now)).await
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<Note> {
        self.update(|book| book.delete_note(note_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;
    use crate::testing::{ManualClock, T0};
    use futures::executor::block_on;

    fn create_test_book() -> NoteBook {
        let mut book = NoteBook::new();
        book.add_note("jane-doe", "n1", "Met at RustConf", T0).unwrap();
        book.add_note("jane-doe", "n2", "Follow up in May", T0 + 1).unwrap();
        book.add_note("john-roe", "n3", "Hiring manager", T0 + 2).unwrap();
        book
    }

    fn create_test_notes() -> (Rc<MemoryDocumentStore>, Rc<ManualClock>, Notes) {
        let store = Rc::new(MemoryDocumentStore::new());
        let clock = Rc::new(ManualClock::new(T0));
        let notes = Notes::new(store.clone(), clock.clone(), 5);
        notes.mirror().attach("u1").unwrap();
        (store, clock, notes)
    }

    #[test]
    fn test_add_note() {
        let book = create_test_book();

        let texts: Vec<&str> = book
            .notes_for("jane-doe")
            .iter()
            .map(|n| n.text.as_str())
            .collect();
        assert_eq!(texts, vec!["Met at RustConf", "Follow up in May"]);
        assert!(book.notes_for("nobody").is_empty());
    }

    #[test]
    fn test_add_empty_note() {
        let mut book = create_test_book();

        let result = book.add_note("jane-doe", "n4", "   \n", T0);

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(book, create_test_book());
    }

    #[test]
    fn test_add_note_is_idempotent_per_id() {
        let mut book = create_test_book();

        book.add_note("john-roe", "n3", "Hiring manager", T0 + 2).unwrap();

        assert_eq!(book.notes_for("john-roe").len(), 1);
    }

    #[test]
    fn test_update_note() {
        let mut book = create_test_book();

        let note = book.update_note("n2", "Follow up in June", T0 + 50).unwrap();

        assert_eq!(note.text, "Follow up in June");
        assert_eq!(note.created_at, T0 + 1);
        assert_eq!(note.updated_at, T0 + 50);
        assert_eq!(book.notes_for("jane-doe")[1], note);
        assert_eq!(
            book.update_note("missing", "x", T0),
            Err(Error::NoteNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_delete_note() {
        let mut book = create_test_book();

        book.delete_note("n3").unwrap();
        book.delete_note("n1").unwrap();

        assert!(!book.notes.contains_key("john-roe"));
        assert_eq!(book.notes_for("jane-doe").len(), 1);
        assert!(book.delete_note("n1").is_err());
    }

    #[test]
    fn test_service_round_trip() {
        let (_store, clock, notes) = create_test_notes();

        let note = block_on(notes.add_note("jane-doe", "Met at RustConf")).unwrap();
        clock.advance_secs(60);
        block_on(notes.update_note(&note.id, "Met at RustConf 2024")).unwrap();

        let stored = notes.notes_for("jane-doe");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "Met at RustConf 2024");
        assert_eq!(stored[0].updated_at, T0 + 60_000);

        block_on(notes.delete_note(&note.id)).unwrap();
        assert!(notes.notes_for("jane-doe").is_empty());
    }

    #[test]
    fn test_service_rejects_empty_without_writing() {
        let (store, _clock, notes) = create_test_notes();

        let result = block_on(notes.add_note("jane-doe", ""));

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.writes.get(), 0);
    }
}
