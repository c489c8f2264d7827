//! Directory-based document backend for persistent repositories.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                       # Advisory lock for single-writer
//! ├─ NEXT_ID                    # Id counter (decimal text)
//! └─ <collection>/
//!    └─ <entity_id>_<version>.doc   # insert-type tag byte + encoded body
//! ```

use crate::backend::{DocumentBackend, DocumentKey, InsertType, StoredDocument};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const ID_FILE: &str = "NEXT_ID";
const ID_TEMP: &str = "NEXT_ID.tmp";
const DOC_EXTENSION: &str = "doc";
const FIRST_ID: u64 = 2;

/// A document backend that keeps one file per document under a repository
/// directory.
///
/// # Thread Safety
///
/// The backend holds an exclusive lock on the repository directory, so
/// only one process writes at a time. Within the process, id allocation is
/// serialized by an internal mutex.
///
/// # Example
///
/// ```no_run
/// use strata_storage::{DocumentBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("repo")).unwrap();
/// backend.ensure_collection("project").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    next_id: Mutex<u64>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a repository directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    /// - The id counter is unreadable
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(StorageError::Corrupted(format!(
                "repository path is not a directory: {}",
                root.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let next_id = match fs::read_to_string(root.join(ID_FILE)) {
            Ok(text) => text.trim().parse::<u64>().map_err(|_| {
                StorageError::Corrupted(format!("invalid id counter: {:?}", text.trim()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => FIRST_ID,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root: root.to_path_buf(),
            next_id: Mutex::new(next_id),
            _lock_file: lock_file,
        })
    }

    /// Returns the repository directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> StorageResult<PathBuf> {
        let valid = !collection.is_empty()
            && collection != "."
            && collection != ".."
            && !collection.contains(['/', '\\'])
            && collection != LOCK_FILE
            && collection != ID_FILE;
        if !valid {
            return Err(StorageError::InvalidCollection(collection.to_string()));
        }
        Ok(self.root.join(collection))
    }

    fn document_path(dir: &Path, key: DocumentKey) -> PathBuf {
        dir.join(format!("{}_{}.{DOC_EXTENSION}", key.entity_id, key.version))
    }

    fn read_document(path: &Path, key: DocumentKey) -> StorageResult<Option<StoredDocument>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some((&tag, body)) = data.split_first() else {
            return Err(StorageError::Corrupted(format!("empty document file for {key}")));
        };
        let insert_type = InsertType::from_tag(tag).ok_or_else(|| {
            StorageError::Corrupted(format!("unknown insert type {tag} for {key}"))
        })?;
        Ok(Some(StoredDocument {
            key,
            insert_type,
            body: body.to_vec(),
        }))
    }

    fn remove_document(path: &Path) -> StorageResult<u64> {
        match fs::remove_file(path) {
            Ok(()) => Ok(1),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the id counter using write-then-rename.
    fn save_next_id(&self, next: u64) -> StorageResult<()> {
        let temp_path = self.root.join(ID_TEMP);
        let mut file = File::create(&temp_path)?;
        file.write_all(next.to_string().as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, self.root.join(ID_FILE))?;
        Ok(())
    }
}

impl DocumentBackend for FileBackend {
    fn ping(&self) -> StorageResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Unreachable(format!(
                "repository directory is gone: {}",
                self.root.display()
            )))
        }
    }

    fn ensure_collection(&self, collection: &str) -> StorageResult<()> {
        fs::create_dir_all(self.collection_dir(collection)?)?;
        Ok(())
    }

    fn insert_many(&self, collection: &str, documents: Vec<StoredDocument>) -> StorageResult<()> {
        let dir = self.collection_dir(collection)?;
        fs::create_dir_all(&dir)?;
        let count = documents.len();
        for document in documents {
            let mut data = Vec::with_capacity(document.body.len() + 1);
            data.push(document.insert_type.tag());
            data.extend_from_slice(&document.body);
            fs::write(Self::document_path(&dir, document.key), data)?;
        }
        debug!(collection, count, "inserted documents");
        Ok(())
    }

    fn find_one(
        &self,
        collection: &str,
        key: DocumentKey,
    ) -> StorageResult<Option<StoredDocument>> {
        let dir = self.collection_dir(collection)?;
        Self::read_document(&Self::document_path(&dir, key), key)
    }

    fn find_any(
        &self,
        collection: &str,
        keys: &[DocumentKey],
    ) -> StorageResult<Vec<StoredDocument>> {
        let dir = self.collection_dir(collection)?;
        let mut found = Vec::with_capacity(keys.len());
        for &key in keys {
            if let Some(document) = Self::read_document(&Self::document_path(&dir, key), key)? {
                found.push(document);
            }
        }
        Ok(found)
    }

    fn delete_one(&self, collection: &str, key: DocumentKey) -> StorageResult<u64> {
        let dir = self.collection_dir(collection)?;
        Self::remove_document(&Self::document_path(&dir, key))
    }

    fn delete_any(&self, collection: &str, keys: &[DocumentKey]) -> StorageResult<u64> {
        let dir = self.collection_dir(collection)?;
        let mut removed = 0;
        for &key in keys {
            removed += Self::remove_document(&Self::document_path(&dir, key))?;
        }
        Ok(removed)
    }

    fn allocate_ids(&self, count: usize) -> StorageResult<Vec<u64>> {
        let mut next = self.next_id.lock();
        let first = *next;
        let end = first + count as u64;
        self.save_next_id(end)?;
        *next = end;
        Ok((first..end).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let key = DocumentKey::new(7, 8);
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            let doc = StoredDocument::new(key, vec![1, 2, 3])
                .with_insert_type(InsertType::FileStorage);
            backend.insert_many("project", vec![doc]).unwrap();
        }

        let backend = FileBackend::open(dir.path()).unwrap();
        let found = backend.find_one("project", key).unwrap().unwrap();
        assert_eq!(found.body, vec![1, 2, 3]);
        assert_eq!(found.insert_type, InsertType::FileStorage);
    }

    #[test]
    fn id_counter_is_persistent() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            assert_eq!(backend.allocate_ids(2).unwrap(), vec![2, 3]);
        }
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.allocate_ids(1).unwrap(), vec![4]);
    }

    #[test]
    fn lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let _first = FileBackend::open(dir.path()).unwrap();
        assert!(matches!(
            FileBackend::open(dir.path()),
            Err(StorageError::Locked)
        ));
    }

    #[test]
    fn rejects_path_like_collections() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        for name in ["", "..", "a/b", "LOCK"] {
            assert!(matches!(
                backend.ensure_collection(name),
                Err(StorageError::InvalidCollection(_))
            ));
        }
    }

    #[test]
    fn batch_delete_counts_removed() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let keys = [DocumentKey::new(2, 3), DocumentKey::new(4, 5)];
        backend
            .insert_many(
                "c",
                keys.iter().map(|&k| StoredDocument::new(k, vec![0xa0])).collect(),
            )
            .unwrap();

        let missing = DocumentKey::new(9, 9);
        assert_eq!(backend.delete_any("c", &[keys[0], keys[1], missing]).unwrap(), 2);
        assert!(backend.find_any("c", &keys).unwrap().is_empty());
    }
}
