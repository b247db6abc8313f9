use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Mutex,
};

use futures::future::BoxFuture;

use super::{
    api::AnkiBackend,
    types::{
        CanAddDetail,
        NotePayload,
    },
};
use crate::core::ReaderError;

type Handler<T> = Box<dyn Fn(&[NotePayload]) -> Result<T, ReaderError> + Send + Sync>;
type AddHandler = Box<dyn Fn(&NotePayload) -> Result<Option<u64>, ReaderError> + Send + Sync>;

/// Scriptable in-memory AnkiConnect. Unscripted calls succeed with "can add" answers.
#[derive(Default)]
pub struct FakeAnki {
    detailed: Mutex<Option<Handler<Vec<CanAddDetail>>>>,
    can_add: Mutex<Option<Handler<Vec<bool>>>>,
    find_ids: Mutex<Option<Handler<Vec<Vec<u64>>>>>,
    add: Mutex<Option<AddHandler>>,
    sync_error: Mutex<Option<String>>,

    detailed_requests: Mutex<Vec<Vec<NotePayload>>>,
    can_add_requests: Mutex<Vec<Vec<NotePayload>>>,
    find_ids_requests: Mutex<Vec<Vec<NotePayload>>>,
    added: Mutex<Vec<NotePayload>>,
    decks: Mutex<Vec<String>>,
    syncs: AtomicUsize,
}

impl FakeAnki {
    pub fn set_detailed<F>(&self, handler: F)
    where
        F: Fn(&[NotePayload]) -> Result<Vec<CanAddDetail>, ReaderError> + Send + Sync + 'static,
    {
        *self.detailed.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn set_can_add<F>(&self, handler: F)
    where
        F: Fn(&[NotePayload]) -> Result<Vec<bool>, ReaderError> + Send + Sync + 'static,
    {
        *self.can_add.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn set_find_ids<F>(&self, handler: F)
    where
        F: Fn(&[NotePayload]) -> Result<Vec<Vec<u64>>, ReaderError> + Send + Sync + 'static,
    {
        *self.find_ids.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn set_add<F>(&self, handler: F)
    where
        F: Fn(&NotePayload) -> Result<Option<u64>, ReaderError> + Send + Sync + 'static,
    {
        *self.add.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn fail_sync(&self, message: &str) {
        *self.sync_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn detailed_requests(&self) -> Vec<Vec<NotePayload>> {
        self.detailed_requests.lock().unwrap().clone()
    }

    pub fn can_add_calls(&self) -> usize {
        self.can_add_requests.lock().unwrap().len()
    }

    pub fn find_ids_requests(&self) -> Vec<Vec<NotePayload>> {
        self.find_ids_requests.lock().unwrap().clone()
    }

    pub fn added_notes(&self) -> Vec<NotePayload> {
        self.added.lock().unwrap().clone()
    }

    pub fn created_decks(&self) -> Vec<String> {
        self.decks.lock().unwrap().clone()
    }

    pub fn sync_calls(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.detailed_requests.lock().unwrap().len()
            + self.can_add_calls()
            + self.find_ids_requests.lock().unwrap().len()
            + self.added.lock().unwrap().len()
            + self.decks.lock().unwrap().len()
            + self.sync_calls()
    }
}

impl AnkiBackend for FakeAnki {
    fn create_deck<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), ReaderError>> {
        self.decks.lock().unwrap().push(name.to_string());
        Box::pin(async move { Ok(()) })
    }

    fn add_note<'a>(
        &'a self,
        note: &'a NotePayload,
    ) -> BoxFuture<'a, Result<Option<u64>, ReaderError>> {
        self.added.lock().unwrap().push(note.clone());
        let result = match self.add.lock().unwrap().as_ref() {
            Some(handler) => handler(note),
            None => Ok(Some(1_700_000_000_000)),
        };
        Box::pin(async move { result })
    }

    fn can_add_notes_with_error_detail<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<CanAddDetail>, ReaderError>> {
        self.detailed_requests.lock().unwrap().push(notes.to_vec());
        let result = match self.detailed.lock().unwrap().as_ref() {
            Some(handler) => handler(notes),
            None => Ok(notes.iter().map(|_| CanAddDetail { can_add: true, error: None }).collect()),
        };
        Box::pin(async move { result })
    }

    fn can_add_notes<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<bool>, ReaderError>> {
        self.can_add_requests.lock().unwrap().push(notes.to_vec());
        let result = match self.can_add.lock().unwrap().as_ref() {
            Some(handler) => handler(notes),
            None => Ok(notes.iter().map(|_| true).collect()),
        };
        Box::pin(async move { result })
    }

    fn find_note_ids<'a>(
        &'a self,
        notes: &'a [NotePayload],
    ) -> BoxFuture<'a, Result<Vec<Vec<u64>>, ReaderError>> {
        self.find_ids_requests.lock().unwrap().push(notes.to_vec());
        let result = match self.find_ids.lock().unwrap().as_ref() {
            Some(handler) => handler(notes),
            None => Ok(notes.iter().map(|_| Vec::new()).collect()),
        };
        Box::pin(async move { result })
    }

    fn sync(&self) -> BoxFuture<'_, Result<(), ReaderError>> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        let result = match self.sync_error.lock().unwrap().clone() {
            Some(message) => Err(ReaderError::Custom(message)),
            None => Ok(()),
        };
        Box::pin(async move { result })
    }
}
