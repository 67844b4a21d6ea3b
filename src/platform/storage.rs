//! Key/value string storage backends
//!
//! - `MemoryStorage`: in-process map (tests, ephemeral sessions)
//! - `FileStorage`: one file per key in a directory (native)
//! - `LocalStorage`: browser `window.localStorage` (wasm32)
//!
//! Gateways never panic and never return errors: a failed read is `None`,
//! a failed write is `false`.

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Raw string persistence used by the store and the migration engine
pub trait StorageGateway {
    /// Read the blob under `key`
    fn read(&self, key: &str) -> Option<String>;
    /// Write `value` under `key`, returning whether it was persisted
    fn write(&self, key: &str, value: &str) -> bool;
    /// Remove `key` (missing keys are ignored)
    fn remove(&self, key: &str);
}

impl<T: StorageGateway + ?Sized> StorageGateway for &T {
    fn read(&self, key: &str) -> Option<String> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> bool {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }
}

impl StorageGateway for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> bool {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        true
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::StorageGateway;

    /// Directory-backed storage: each key is a `<key>.json` file, with
    /// unsafe bytes in the key percent-escaped.
    ///
    /// Writes go to a temp file first and are renamed into place.
    #[derive(Debug, Clone)]
    pub struct FileStorage {
        dir: PathBuf,
    }

    impl FileStorage {
        /// Use `dir`, creating it if needed
        pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
            let dir = dir.into();
            fs::create_dir_all(&dir)?;
            Ok(Self { dir })
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }

        /// Keys map to distinct file names: bytes outside `[A-Za-z0-9_-]`
        /// are written as `%XX`.
        fn path_for(&self, key: &str) -> PathBuf {
            let mut name = String::with_capacity(key.len());
            for byte in key.bytes() {
                if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                    name.push(char::from(byte));
                } else {
                    name.push_str(&format!("%{byte:02X}"));
                }
            }
            self.dir.join(format!("{name}.json"))
        }
    }

    impl StorageGateway for FileStorage {
        fn read(&self, key: &str) -> Option<String> {
            fs::read_to_string(self.path_for(key)).ok()
        }

        fn write(&self, key: &str, value: &str) -> bool {
            let target = self.path_for(key);
            let tmp = target.with_extension("json.tmp");
            let result = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, &target));
            match result {
                Ok(()) => true,
                Err(e) => {
                    log::warn!(target: "save_vault::storage", "Failed to write {}: {}", target.display(), e);
                    let _ = fs::remove_file(&tmp);
                    false
                }
            }
        }

        fn remove(&self, key: &str) {
            let _ = fs::remove_file(self.path_for(key));
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use local::LocalStorage;

#[cfg(target_arch = "wasm32")]
mod local {
    use super::StorageGateway;

    /// Browser LocalStorage
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LocalStorage;

    impl LocalStorage {
        pub fn new() -> Self {
            Self
        }

        fn storage() -> Option<web_sys::Storage> {
            web_sys::window()
                .and_then(|w| w.local_storage().ok())
                .flatten()
        }
    }

    impl StorageGateway for LocalStorage {
        fn read(&self, key: &str) -> Option<String> {
            Self::storage()?.get_item(key).ok()?
        }

        fn write(&self, key: &str, value: &str) -> bool {
            match Self::storage() {
                Some(storage) => storage.set_item(key, value).is_ok(),
                None => false,
            }
        }

        fn remove(&self, key: &str) {
            if let Some(storage) = Self::storage() {
                let _ = storage.remove_item(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("missing"), None);
        assert!(storage.write("save", "{\"version\":3}"));
        assert_eq!(storage.read("save").as_deref(), Some("{\"version\":3}"));
        storage.remove("save");
        assert!(storage.is_empty());
        // Removing again is harmless
        storage.remove("save");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("nested")).unwrap();
        assert_eq!(storage.read("save_vault_data"), None);
        assert!(storage.write("save_vault_data", "{}"));
        assert_eq!(storage.read("save_vault_data").as_deref(), Some("{}"));
        assert!(storage.dir().join("save_vault_data.json").exists());

        // Keys are escaped into file names without collisions
        assert!(storage.write("odd/key", "1"));
        assert!(storage.write("odd_key", "2"));
        assert!(storage.write("odd.key", "3"));
        assert_eq!(storage.read("odd/key").as_deref(), Some("1"));
        assert_eq!(storage.read("odd_key").as_deref(), Some("2"));
        assert_eq!(storage.read("odd.key").as_deref(), Some("3"));
        assert!(storage.dir().join("odd%2Fkey.json").exists());

        storage.remove("save_vault_data");
        assert_eq!(storage.read("save_vault_data"), None);
    }
}
