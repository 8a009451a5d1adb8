//! Process-wide vendor library search paths.
//!
//! The DCAM-API runtime is located through a global `library -> directory` table.
//! A driver registers its configured directory on activation and holds the returned
//! [`DllRegistration`]; dropping it removes the entry again.
//!
//! The table is global state. Two drivers registering the same key overwrite each
//! other (last writer wins) and the first to drop removes the entry for both.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Key under which the DCAM-API runtime directory is registered.
pub const DCAMAPI: &str = "dcamapi";

static DLL_PATHS: Mutex<Option<HashMap<String, PathBuf>>> = Mutex::new(None);

/// Register `dir` as the location of `library`.
pub fn register(library: &str, dir: impl Into<PathBuf>) -> DllRegistration {
    let dir = dir.into();
    let previous = DLL_PATHS
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(library.to_string(), dir.clone());
    if let Some(prev) = previous.filter(|p| *p != dir) {
        tracing::warn!(
            "Replacing registered path for '{}': {} -> {}",
            library,
            prev.display(),
            dir.display()
        );
    } else {
        tracing::debug!("Registered '{}' at {}", library, dir.display());
    }
    DllRegistration {
        library: library.to_string(),
    }
}

/// Registered directory for `library`, if any.
pub fn lookup(library: &str) -> Option<PathBuf> {
    DLL_PATHS
        .lock()
        .as_ref()
        .and_then(|paths| paths.get(library).cloned())
}

/// Entry in the library path table; removed on drop.
#[derive(Debug)]
#[must_use = "the path is unregistered when this guard is dropped"]
pub struct DllRegistration {
    library: String,
}

impl DllRegistration {
    /// Registered library key.
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Directory currently registered under this key.
    pub fn path(&self) -> Option<PathBuf> {
        lookup(&self.library)
    }
}

impl Drop for DllRegistration {
    fn drop(&mut self) {
        if let Some(paths) = DLL_PATHS.lock().as_mut() {
            paths.remove(&self.library);
        }
        tracing::debug!("Unregistered '{}'", self.library);
    }
}

/// Full path of a library file inside a registered directory.
pub fn library_file(library: &str, file_name: &Path) -> Option<PathBuf> {
    lookup(library).map(|dir| dir.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_removed_on_drop() {
        let key = "test_lib_drop";
        {
            let reg = register(key, "/opt/vendor");
            assert_eq!(reg.library(), key);
            assert_eq!(lookup(key), Some(PathBuf::from("/opt/vendor")));
        }
        assert_eq!(lookup(key), None);
    }

    #[test]
    fn last_writer_wins() {
        let key = "test_lib_overwrite";
        let first = register(key, "/a");
        let second = register(key, "/b");
        assert_eq!(first.path(), Some(PathBuf::from("/b")));
        drop(first);
        assert_eq!(lookup(key), None);
        drop(second);
    }

    #[test]
    fn library_file_joins_directory() {
        let key = "test_lib_file";
        let _reg = register(key, "/opt/dcam");
        assert_eq!(
            library_file(key, Path::new("dcamapi.dll")),
            Some(PathBuf::from("/opt/dcam/dcamapi.dll"))
        );
    }
}
