//! SQLite implementation of `DocumentStore`.
//!
//! Exclusivity is backed by the partial unique index
//! `review_documents_one_open_per_system`, so the database itself refuses a
//! second open document for a system code no matter how callers interleave.
//! Updates are compare-and-swap on the `revision` column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite};
use tracing::{info, warn};

use super::{DocumentIds, DocumentStore, StoreError};
use crate::document::{DocumentDetails, DocumentId, ReviewDocument, StoredDocument};
use crate::lifecycle::state::DocumentState;

const SELECT_COLUMNS: &str = "id, system_code, state, version, revision, title, summary, \
                              created_by, created_at, last_modified_by, last_modified_at";

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Connect (creating the database if needed) and optionally run migrations
    pub async fn connect(database_url: &str, max_connections: u32, auto_migrate: bool) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        if !in_memory && !Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        // Every connection to :memory: opens its own empty database.
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }

    async fn open_document_ids(&self, system_code: &str) -> Vec<DocumentId> {
        match self
            .find_all_by_system_code_and_states_in(system_code, &DocumentState::EXCLUSIVE)
            .await
        {
            Ok(docs) => docs.into_iter().map(|d| d.id().clone()).collect(),
            Err(e) => {
                warn!(system.code = %system_code, "Could not list conflicting documents: {}", e);
                Vec::new()
            }
        }
    }

    async fn map_write_error(&self, err: sqlx::Error, doc: &ReviewDocument) -> StoreError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                if db_err.message().contains("review_documents.id") {
                    return StoreError::DuplicateId(doc.id().clone());
                }
                let conflicting = self
                    .open_document_ids(doc.system_code())
                    .await
                    .into_iter()
                    .filter(|id| id != doc.id())
                    .collect();
                return StoreError::ExclusivityConflict {
                    system_code: doc.system_code().to_string(),
                    conflicting: DocumentIds(conflicting),
                };
            }
        }
        StoreError::from(err)
    }

    async fn current_revision(&self, id: &DocumentId) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT revision FROM review_documents WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| -> Result<u64, StoreError> {
            let revision: i64 = r.try_get("revision")?;
            u64::try_from(revision).map_err(|e| StoreError::Corrupt(e.to_string()))
        })
        .transpose()
    }
}

fn placeholders(count: usize, first: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn row_to_document(row: &SqliteRow) -> Result<ReviewDocument, StoreError> {
    let state: String = row.try_get("state")?;
    let state = state
        .parse::<DocumentState>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let version: i64 = row.try_get("version")?;
    let revision: i64 = row.try_get("revision")?;
    let created_at: String = row.try_get("created_at")?;
    let last_modified_at: String = row.try_get("last_modified_at")?;

    Ok(ReviewDocument::from_stored(StoredDocument {
        id: DocumentId::from(row.try_get::<String, _>("id")?),
        system_code: row.try_get("system_code")?,
        state,
        version: u32::try_from(version).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        revision: u64::try_from(revision).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        details: DocumentDetails {
            title: row.try_get("title")?,
            summary: row.try_get("summary")?,
        },
        created_by: row.try_get("created_by")?,
        created_at: parse_timestamp(&created_at)?,
        last_modified_by: row.try_get("last_modified_by")?,
        last_modified_at: parse_timestamp(&last_modified_at)?,
    }))
}

async fn insert_row<'e, E>(executor: E, doc: &ReviewDocument) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO review_documents (
            id, system_code, state, version, revision, title, summary,
            created_by, created_at, last_modified_by, last_modified_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(doc.id().as_str())
    .bind(doc.system_code())
    .bind(doc.state().as_str())
    .bind(i64::from(doc.version()))
    .bind(doc.revision() as i64)
    .bind(&doc.details().title)
    .bind(doc.details().summary.as_deref())
    .bind(doc.created_by())
    .bind(doc.created_at().to_rfc3339())
    .bind(doc.last_modified_by())
    .bind(doc.last_modified_at().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

async fn update_row<'e, E>(executor: E, doc: &ReviewDocument, expected_revision: u64) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE review_documents
        SET state = ?1, title = ?2, summary = ?3, revision = revision + 1,
            last_modified_by = ?4, last_modified_at = ?5
        WHERE id = ?6 AND revision = ?7
        "#,
    )
    .bind(doc.state().as_str())
    .bind(&doc.details().title)
    .bind(doc.details().summary.as_deref())
    .bind(doc.last_modified_by())
    .bind(doc.last_modified_at().to_rfc3339())
    .bind(doc.id().as_str())
    .bind(expected_revision as i64)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<ReviewDocument>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM review_documents WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn find_all_by_system_code_and_states_in(
        &self,
        system_code: &str,
        states: &[DocumentState],
    ) -> Result<Vec<ReviewDocument>, StoreError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM review_documents \
             WHERE system_code = ?1 AND state IN ({}) \
             ORDER BY version ASC, created_at ASC",
            placeholders(states.len(), 2)
        );
        let mut query = sqlx::query(&sql).bind(system_code);
        for state in states {
            query = query.bind(state.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
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
        self.find_all_by_system_code_and_states_in(system_code, &DocumentState::ALL)
            .await
    }

    async fn insert(&self, doc: ReviewDocument) -> Result<ReviewDocument, StoreError> {
        match insert_row(&self.pool, &doc).await {
            Ok(()) => Ok(doc),
            Err(e) => Err(self.map_write_error(e, &doc).await),
        }
    }

    async fn save(&self, mut doc: ReviewDocument, expected_revision: u64) -> Result<ReviewDocument, StoreError> {
        let affected = match update_row(&self.pool, &doc, expected_revision).await {
            Ok(affected) => affected,
            Err(e) => return Err(self.map_write_error(e, &doc).await),
        };
        if affected == 0 {
            return Err(StoreError::RevisionMismatch {
                id: doc.id().clone(),
                expected: expected_revision,
                found: self.current_revision(doc.id()).await?,
            });
        }
        doc.set_revision(expected_revision + 1);
        Ok(doc)
    }

    async fn supersede(
        &self,
        predecessor: ReviewDocument,
        expected_revision: u64,
        successor: ReviewDocument,
    ) -> Result<ReviewDocument, StoreError> {
        let mut tx = self.pool.begin().await?;

        let affected = match update_row(&mut *tx, &predecessor, expected_revision).await {
            Ok(affected) => affected,
            Err(e) => {
                drop(tx);
                return Err(self.map_write_error(e, &predecessor).await);
            }
        };
        if affected == 0 {
            tx.rollback().await?;
            return Err(StoreError::RevisionMismatch {
                id: predecessor.id().clone(),
                expected: expected_revision,
                found: self.current_revision(predecessor.id()).await?,
            });
        }

        if let Err(e) = insert_row(&mut *tx, &successor).await {
            drop(tx);
            return Err(self.map_write_error(e, &successor).await);
        }

        tx.commit().await?;
        Ok(successor)
    }

    async fn delete(&self, id: &DocumentId, expected_revision: u64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM review_documents WHERE id = ?1 AND revision = ?2")
            .bind(id.as_str())
            .bind(expected_revision as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RevisionMismatch {
                id: id.clone(),
                expected: expected_revision,
                found: self.current_revision(id).await?,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NewReview;
    use std::sync::Arc;

    async fn memory_store() -> SqliteDocumentStore {
        SqliteDocumentStore::connect("sqlite::memory:", 1, true)
            .await
            .unwrap()
    }

    fn draft(code: &str) -> ReviewDocument {
        ReviewDocument::new_draft(
            NewReview {
                system_code: code.to_string(),
                details: DocumentDetails::titled("Review"),
                created_by: "alice".to_string(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_partial_unique_index_rejects_second_open_document() {
        let store = memory_store().await;
        let first = store.insert(draft("SYS-1")).await.unwrap();

        match store.insert(draft("SYS-1")).await.unwrap_err() {
            StoreError::ExclusivityConflict { conflicting, .. } => {
                assert_eq!(conflicting.0, vec![first.id().clone()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.insert(draft("SYS-2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_save_is_compare_and_swap() {
        let store = memory_store().await;
        let mut doc = store.insert(draft("SYS-1")).await.unwrap();
        doc.apply_state(DocumentState::Submitted, "bob", Utc::now());

        let saved = store.save(doc.clone(), 0).await.unwrap();
        assert_eq!(saved.revision(), 1);

        match store.save(doc, 0).await.unwrap_err() {
            StoreError::RevisionMismatch { expected, found, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(found, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }

        let reloaded = store.find_by_id(saved.id()).await.unwrap().unwrap();
        assert_eq!(reloaded.state(), DocumentState::Submitted);
        assert_eq!(reloaded.last_modified_by(), "bob");
        assert_eq!(reloaded.created_by(), "alice");
    }

    async fn file_store(dir: &tempfile::TempDir) -> SqliteDocumentStore {
        let url = format!("sqlite://{}", dir.path().join("reviews.db").display());
        SqliteDocumentStore::connect(&url, 8, true).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_inserts_are_settled_by_the_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(file_store(&dir).await);

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.insert(draft("SYS-1")).await })
        });
        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err, StoreError::ExclusivityConflict { .. }),
                "unexpected failure: {err}"
            );
        }
        let open = store
            .find_all_by_system_code_and_states_in("SYS-1", &DocumentState::EXCLUSIVE)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);

        store.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_saves_have_one_winner() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(file_store(&dir).await);
        let doc = store.insert(draft("SYS-1")).await.unwrap();

        let tasks = (0..8).map(|i| {
            let store = Arc::clone(&store);
            let mut doc = doc.clone();
            doc.apply_state(DocumentState::Submitted, &format!("user-{i}"), Utc::now());
            tokio::spawn(async move { store.save(doc, 0).await })
        });
        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err, StoreError::RevisionMismatch { found: Some(1), .. }),
                "unexpected failure: {err}"
            );
        }
        let stored = store.find_by_id(doc.id()).await.unwrap().unwrap();
        assert_eq!(stored.revision(), 1);

        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_supersede_rolls_back_on_conflict() {
        let store = memory_store().await;
        let mut active = draft("SYS-1");
        active.apply_state(DocumentState::Active, "alice", Utc::now());
        let active = store.insert(active).await.unwrap();

        let successor = ReviewDocument::successor_of(&active, "bob", Utc::now());
        let mut retired = active.clone();
        retired.apply_state(DocumentState::Outdated, "bob", Utc::now());

        assert!(store.supersede(retired.clone(), 5, successor.clone()).await.is_err());
        let still = store.find_by_id(active.id()).await.unwrap().unwrap();
        assert_eq!(still.state(), DocumentState::Active);

        let stored = store.supersede(retired, 0, successor).await.unwrap();
        assert_eq!(stored.version(), 2);
        assert_eq!(store.find_all_by_system_code("SYS-1").await.unwrap().len(), 2);
    }
}
