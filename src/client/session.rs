use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use tracing::warn;

use crate::model::LetterResponse;

/// Key the committed letter is mirrored under.
pub const SESSION_KEY: &str = "santaLetter";

/// Session-scoped key/value storage, shaped like the browser's `sessionStorage`.
pub trait SessionStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: String);
    fn remove_item(&self, key: &str);
}

/// Process-local store; lives as long as the controller that owns it.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove_item(&self, key: &str) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: String) {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

pub fn save_letter(store: &impl SessionStore, letter: &LetterResponse) -> serde_json::Result<()> {
    let raw = serde_json::to_string(letter)?;
    store.set_item(SESSION_KEY, raw);
    Ok(())
}

/// The stored letter, if there is a usable one. Corrupt or empty snapshots
/// are skipped.
pub fn load_letter(store: &impl SessionStore) -> Option<LetterResponse> {
    let raw = store.get_item(SESSION_KEY)?;
    match serde_json::from_str::<LetterResponse>(&raw) {
        Ok(letter) if letter.is_valid() => Some(letter),
        Ok(_) => {
            warn!("stored letter is empty, ignoring");
            None
        }
        Err(err) => {
            warn!("could not restore letter from session storage: {err}");
            None
        }
    }
}

pub fn clear_letter(store: &impl SessionStore) {
    store.remove_item(SESSION_KEY);
}
