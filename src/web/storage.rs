use super::window;
use crate::storage::Storage;

/// [`Storage`] over the browser's `localStorage`.
///
/// `localStorage` may be missing (private browsing, sandboxed frames) or
/// full: the selection is then simply not remembered.
#[derive(Clone, Default)]
pub struct LocalStorage {
    storage: Option<web_sys::Storage>,
}

impl LocalStorage {
    pub fn new() -> Self {
        let storage = window()
            .and_then(|window| window.local_storage().ok())
            .flatten();

        if storage.is_none() {
            log::warn!("localStorage is not available, the wallet selection won't be remembered");
        }
        Self { storage }
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_some()
    }
}

impl Storage for LocalStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let storage = self.storage.as_ref()?;
        storage.get_item(key).unwrap_or_else(|error| {
            log::warn!("couldn't read `{key}' from localStorage: {error:?}");
            None
        })
    }

    fn set_item(&self, key: &str, value: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(error) = storage.set_item(key, value) {
            log::warn!("couldn't write `{key}' to localStorage: {error:?}");
        }
    }

    fn remove_item(&self, key: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(error) = storage.remove_item(key) {
            log::warn!("couldn't remove `{key}' from localStorage: {error:?}");
        }
    }
}
