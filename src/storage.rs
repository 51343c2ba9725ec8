use std::{cell::RefCell, collections::HashMap, rc::Rc};

/// A durable string key-value slot, `localStorage` in a browser.
///
/// Implementations never fail: a storage that cannot be written to simply
/// forgets (and should log why).
pub trait Storage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
}

/// In memory [`Storage`], for tests and non browser hosts.
#[derive(Debug, Default)]
pub struct MemoryStorage(RefCell<HashMap<String, String>>);

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.0.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.0.borrow_mut().insert(key.to_owned(), value.to_owned());
    }

    fn remove_item(&self, key: &str) {
        self.0.borrow_mut().remove(key);
    }
}

/// The name of the last wallet the user selected, JSON encoded.
///
/// The storage is shared with the rest of the page so the value is not
/// trusted: anything that does not decode is removed and read as no
/// selection.
#[derive(Clone)]
pub struct PersistedSelection {
    storage: Rc<dyn Storage>,
    key: String,
}

impl PersistedSelection {
    pub fn new(storage: Rc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Option<String> {
        let raw = self.storage.get_item(&self.key)?;

        match serde_json::from_str::<Option<String>>(&raw) {
            Ok(name) => name,
            Err(error) => {
                log::warn!(
                    "clearing invalid wallet selection stored under `{}': {error}",
                    self.key
                );
                self.storage.remove_item(&self.key);
                None
            }
        }
    }

    pub fn store(&self, name: Option<&str>) {
        let Some(name) = name else {
            self.storage.remove_item(&self.key);
            return;
        };

        match serde_json::to_string(name) {
            Ok(value) => self.storage.set_item(&self.key, &value),
            Err(error) => log::warn!("couldn't encode wallet selection `{name}': {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> (Rc<MemoryStorage>, PersistedSelection) {
        let storage = Rc::new(MemoryStorage::new());
        let selection = PersistedSelection::new(storage.clone(), "walletName");
        (storage, selection)
    }

    #[test]
    fn stores_json_strings() {
        let (storage, selection) = selection();

        selection.store(Some("Phantom"));
        assert_eq!(
            storage.get_item("walletName").as_deref(),
            Some("\"Phantom\"")
        );
        assert_eq!(selection.load().as_deref(), Some("Phantom"));

        selection.store(None);
        assert_eq!(storage.get_item("walletName"), None);
        assert_eq!(selection.load(), None);
    }

    #[test]
    fn null_is_no_selection() {
        let (storage, selection) = selection();
        storage.set_item("walletName", "null");
        assert_eq!(selection.load(), None);
        assert_eq!(storage.get_item("walletName").as_deref(), Some("null"));
    }

    #[test]
    fn foreign_values_are_cleared() {
        let (storage, selection) = selection();

        for foreign in ["Phantom", "{\"name\":\"Phantom\"}", "42", ""] {
            storage.set_item("walletName", foreign);
            assert_eq!(selection.load(), None, "{foreign:?}");
            assert_eq!(storage.get_item("walletName"), None);
        }
    }
}
