//! Store directory layout and locking.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ data00000.tar     # Sealed container
//! ├─ data00001.tar     # Active container
//! └─ journal.log       # One line per journal update
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";
const CONTAINER_PREFIX: &str = "data";
const CONTAINER_SUFFIX: &str = ".tar";

/// An exclusively locked store directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (or creates) the directory and takes its lock.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    pub(crate) fn container_path(&self, number: u32) -> PathBuf {
        self.path
            .join(format!("{CONTAINER_PREFIX}{number:05}{CONTAINER_SUFFIX}"))
    }

    /// Lists container numbers present on disk, ascending.
    pub(crate) fn container_numbers(&self) -> CoreResult<Vec<u32>> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let number = name
                .strip_prefix(CONTAINER_PREFIX)
                .and_then(|rest| rest.strip_suffix(CONTAINER_SUFFIX))
                .and_then(|digits| digits.parse::<u32>().ok());
            if let Some(number) = number {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let _first = StoreDir::open(dir.path(), true).unwrap();
        assert!(matches!(
            StoreDir::open(dir.path(), true),
            Err(CoreError::StoreLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(StoreDir::open(dir.path(), true).unwrap());
        assert!(StoreDir::open(dir.path(), true).is_ok());
    }

    #[test]
    fn missing_directory_without_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent");
        assert!(StoreDir::open(&path, false).is_err());
        assert!(StoreDir::open(&path, true).is_ok());
    }

    #[test]
    fn container_numbers_sorted() {
        let dir = tempdir().unwrap();
        let store_dir = StoreDir::open(dir.path(), true).unwrap();
        for n in [2, 0, 10] {
            File::create(store_dir.container_path(n)).unwrap();
        }
        File::create(dir.path().join("data-x.tar")).unwrap();
        assert_eq!(store_dir.container_numbers().unwrap(), vec![0, 2, 10]);
        assert!(store_dir
            .container_path(2)
            .ends_with("data00002.tar"));
    }
}
