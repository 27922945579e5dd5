//! JSON-file implementation of `DocumentStore`.
//!
//! The whole table lives in one JSON file. Every operation takes an OS-level
//! lock on a sidecar `.lock` file (shared for reads, exclusive for writes),
//! reloads the table, applies the change and writes it back through a
//! temporary file and rename. Several CLI processes can therefore share one
//! file without losing updates or breaking exclusivity.

use async_trait::async_trait;
use fd_lock::RwLock;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{DocumentStore, DocumentTable, StoreError};
use crate::document::{DocumentId, ReviewDocument};
use crate::lifecycle::state::DocumentState;

#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    path: PathBuf,
    lock_path: PathBuf,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl FileDocumentStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Ok(Self {
            path,
            lock_path: PathBuf::from(lock_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_table<T, F>(&self, access: Access, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut DocumentTable) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            let mut lock = RwLock::new(lock_file);

            match access {
                Access::Read => {
                    let _guard = lock.read()?;
                    let mut table = load_table(&path)?;
                    op(&mut table)
                }
                Access::Write => {
                    let _guard = lock.write()?;
                    let mut table = load_table(&path)?;
                    let out = op(&mut table)?;
                    persist_table(&path, &table)?;
                    Ok(out)
                }
            }
        })
        .await
        .map_err(|e| StoreError::Backend(format!("file store task failed: {e}")))?
    }
}

fn load_table(path: &Path) -> Result<DocumentTable, StoreError> {
    if !path.exists() {
        return Ok(DocumentTable::new());
    }
    let raw = fs::read(path)?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(DocumentTable::new());
    }
    Ok(serde_json::from_slice(&raw)?)
}

fn persist_table(path: &Path, table: &DocumentTable) -> Result<(), StoreError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let json = serde_json::to_vec_pretty(table)?;
    fs::write(&tmp_path, json)?;
    File::open(&tmp_path)?.sync_all()?;
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), documents = table.len(), "Persisted document table");
    Ok(())
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<ReviewDocument>, StoreError> {
        let id = id.clone();
        self.with_table(Access::Read, move |table| Ok(table.get(&id)))
            .await
    }

    async fn find_all_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Vec<ReviewDocument>, StoreError> {
        let system_code = system_code.to_string();
        let states = states.to_vec();
        self.with_table(Access::Read, move |table| {
            Ok(table.find_all_in(&system_code, &states))
        })
        .await
    }

    async fn find_first_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Option<ReviewDocument>, StoreError> {
        Ok(self
            .find_all_by_system_code_and_states_in(system_code, states)
            .await?
            .into_iter()
            .next())
    }

    async fn find_all_by_system_code(&self, system_code: &str) -> Result<Vec<ReviewDocument>, StoreError> {
        let system_code = system_code.to_string();
        self.with_table(Access::Read, move |table| Ok(table.history(&system_code)))
            .await
    }

    async fn insert(&self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError> {
        self.with_table(Access::Write, move |table| table.insert(doc))
            .await
    }

    async fn save(&self, doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError> {
        self.with_table(Access::Write, move |table| table.save(doc, expected_revision))
            .await
    }

    async fn supersede(
        &self,
        predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError> {
        self.with_table(Access::Write, move |table| {
            table.supersede(predecessor, expected_revision, successor)
        })
        .await
    }

    async fn delete(&self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError> {
        let id = id.clone();
        self.with_table(Access::Write, move |table| table.delete(&id, expected_revision))
            .await
    }
}
