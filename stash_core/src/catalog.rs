//! The metadata catalog: file names mapped to ordered chunk digests.
//!
//! Backed by a SQLite database with three tables:
//!
//! - `hashes` — one row per distinct chunk digest
//! - `files` — one row per cataloged file name
//! - `filemap` — (file, hash, sequence) rows giving reconstruction order
//!
//! A digest is orphaned when no filemap row references it; orphan
//! detection runs inside `remove_file` so the caller can purge the
//! corresponding blobs.

use crate::error::{Error, Result};
use crate::hash::Digest;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default file name of the catalog database inside a repository.
pub const DEFAULT_CATALOG_NAME: &str = "metadata";

/// Durable file-to-digest metadata with dedup bookkeeping.
///
/// The pool holds a single connection, so the multi-statement mutating
/// operations (`add_file`, `remove_file`) each run in one transaction
/// that readers observe atomically.
#[derive(Debug)]
pub struct Catalog {
    pool: SqlitePool,
    path: PathBuf,
}

impl Catalog {
    /// Attach to the catalog database at `path`.
    ///
    /// With `validate` set, fails with `InvalidMetadata` when the
    /// database file does not exist or lacks the expected tables; this
    /// is how an uninitialized repository is detected. Without it, the
    /// database file is created if missing (the `init` path).
    pub async fn open<P: AsRef<Path>>(path: P, validate: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), validate, "opening catalog");

        if validate && !path.exists() {
            return Err(Error::invalid_metadata(
                &path,
                "catalog database does not exist",
            ));
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(!validate);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let catalog = Self { pool, path };

        if validate {
            catalog.validate_schema().await?;
        }

        Ok(catalog)
    }

    /// Close the catalog connection.
    pub async fn close(&self) {
        debug!(path = %self.path.display(), "closing catalog");
        self.pool.close().await;
    }

    /// Create the three catalog tables; safe to call on an already
    /// initialized database.
    pub async fn create_schema(&self) -> Result<()> {
        debug!("creating catalog schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hashes (
                id INTEGER PRIMARY KEY,
                hash TEXT UNIQUE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY,
                file TEXT UNIQUE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS filemap (
                file INTEGER NOT NULL,
                hash INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                FOREIGN KEY (file) REFERENCES files(id),
                FOREIGN KEY (hash) REFERENCES hashes(id),
                PRIMARY KEY (file, hash, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Check that the expected tables are present.
    async fn validate_schema(&self) -> Result<()> {
        for table in ["hashes", "files", "filemap"] {
            let row =
                sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_optional(&self.pool)
                    .await?;

            if row.is_none() {
                return Err(Error::invalid_metadata(
                    &self.path,
                    format!("missing catalog table: {}", table),
                ));
            }
        }

        Ok(())
    }

    /// Whether `name` is cataloged.
    pub async fn file_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM files WHERE file = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Register a file and its ordered chunk digests.
    ///
    /// Runs in one transaction: the file row, any new hash rows, and the
    /// filemap rows (sequence 0..n-1) commit together. An already
    /// cataloged name fails with `DuplicateFile` and modifies nothing.
    pub async fn add_file(&self, name: &str, digests: &[Digest]) -> Result<()> {
        debug!(name, chunks = digests.len(), "adding file to catalog");

        let mut tx = self.pool.begin().await?;

        let insert = sqlx::query("INSERT INTO files (file) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await;

        let file_id = match insert {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(Error::duplicate_file(name));
            }
            Err(e) => return Err(e.into()),
        };

        let mut hash_ids = Vec::with_capacity(digests.len());
        for digest in digests {
            let hex = digest.to_hex();

            let existing = sqlx::query("SELECT id FROM hashes WHERE hash = ?")
                .bind(&hex)
                .fetch_optional(&mut *tx)
                .await?;

            let hash_id = match existing {
                Some(row) => row.get::<i64, _>("id"),
                None => {
                    sqlx::query("INSERT INTO hashes (hash) VALUES (?)")
                        .bind(&hex)
                        .execute(&mut *tx)
                        .await?
                        .last_insert_rowid()
                }
            };

            hash_ids.push(hash_id);
        }

        for (sequence, hash_id) in hash_ids.iter().enumerate() {
            sqlx::query("INSERT INTO filemap (file, hash, sequence) VALUES (?, ?, ?)")
                .bind(file_id)
                .bind(hash_id)
                .bind(sequence as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove a file and return the digests left with no references.
    ///
    /// Runs in one transaction: the file row and its filemap rows are
    /// deleted, then hash rows with no remaining filemap references are
    /// deleted and returned so the caller can purge their blobs. A
    /// missing name returns the empty vec.
    pub async fn remove_file(&self, name: &str) -> Result<Vec<Digest>> {
        debug!(name, "removing file from catalog");

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id FROM files WHERE file = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

        let file_id = match row {
            Some(row) => row.get::<i64, _>("id"),
            None => return Ok(Vec::new()),
        };

        // The filemap rows reference the file row, so they go first or
        // the foreign key constraint rejects the file delete.
        sqlx::query("DELETE FROM filemap WHERE file = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        // Hashes with no remaining filemap rows are orphans. Adds only
        // ever create referenced hashes, so any unreferenced hash was
        // orphaned by this removal.
        let orphan_rows = sqlx::query(
            r#"
            SELECT hashes.id AS hashid, hashes.hash AS hash
            FROM hashes
            LEFT JOIN filemap ON hashes.id = filemap.hash
            WHERE filemap.hash IS NULL
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut orphans = Vec::with_capacity(orphan_rows.len());
        for row in &orphan_rows {
            sqlx::query("DELETE FROM hashes WHERE id = ?")
                .bind(row.get::<i64, _>("hashid"))
                .execute(&mut *tx)
                .await?;

            orphans.push(Digest::from_hex(row.get::<&str, _>("hash"))?);
        }

        tx.commit().await?;

        debug!(name, orphans = orphans.len(), "file removed");
        Ok(orphans)
    }

    /// The ordered digest list for a file, or `None` when the name is
    /// not cataloged.
    ///
    /// An empty (zero-chunk) file yields `Some` with an empty vec, which
    /// is distinct from absence.
    pub async fn get_file(&self, name: &str) -> Result<Option<Vec<Digest>>> {
        let row = sqlx::query("SELECT id FROM files WHERE file = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let file_id = match row {
            Some(row) => row.get::<i64, _>("id"),
            None => return Ok(None),
        };

        let rows = sqlx::query(
            r#"
            SELECT hashes.hash AS hash
            FROM hashes
            INNER JOIN filemap ON hashes.id = filemap.hash
            WHERE filemap.file = ?
            ORDER BY filemap.sequence
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let mut digests = Vec::with_capacity(rows.len());
        for row in rows {
            digests.push(Digest::from_hex(row.get::<&str, _>("hash"))?);
        }

        Ok(Some(digests))
    }

    /// All cataloged file names, in no particular order.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT file FROM files")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("file"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_catalog(temp_dir: &TempDir) -> Catalog {
        let catalog = Catalog::open(temp_dir.path().join(DEFAULT_CATALOG_NAME), false)
            .await
            .unwrap();
        catalog.create_schema().await.unwrap();
        catalog
    }

    fn digests(contents: &[&[u8]]) -> Vec<Digest> {
        contents.iter().map(|c| Digest::hash_bytes(c)).collect()
    }

    #[tokio::test]
    async fn test_open_validate_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let result = Catalog::open(temp_dir.path().join("metadata"), true).await;
        assert!(matches!(result, Err(Error::InvalidMetadata { .. })));
    }

    #[tokio::test]
    async fn test_open_validate_missing_schema() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metadata");

        // Create a database file without the catalog tables.
        let catalog = Catalog::open(&path, false).await.unwrap();
        catalog.close().await;

        let result = Catalog::open(&path, true).await;
        assert!(matches!(result, Err(Error::InvalidMetadata { .. })));
    }

    #[tokio::test]
    async fn test_open_validate_after_init() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metadata");

        let catalog = Catalog::open(&path, false).await.unwrap();
        catalog.create_schema().await.unwrap();
        catalog.close().await;

        let catalog = Catalog::open(&path, true).await.unwrap();
        assert!(catalog.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_schema_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        catalog
            .add_file("kept.txt", &digests(&[b"chunk"]))
            .await
            .unwrap();

        // Re-running schema creation must not discard existing rows.
        catalog.create_schema().await.unwrap();
        assert!(catalog.file_exists("kept.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_and_get_file() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        let chunks = digests(&[b"one", b"two", b"three"]);
        catalog.add_file("a.txt", &chunks).await.unwrap();

        assert!(catalog.file_exists("a.txt").await.unwrap());
        assert_eq!(catalog.get_file("a.txt").await.unwrap().unwrap(), chunks);
    }

    #[tokio::test]
    async fn test_get_file_preserves_sequence_order() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        // Digests deliberately not in sorted order; sequence must win.
        let chunks = digests(&[b"z", b"a", b"m"]);
        catalog.add_file("ordered.bin", &chunks).await.unwrap();

        assert_eq!(
            catalog.get_file("ordered.bin").await.unwrap().unwrap(),
            chunks
        );
    }

    #[tokio::test]
    async fn test_get_file_missing_vs_empty() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        catalog.add_file("empty.txt", &[]).await.unwrap();

        // A zero-chunk file is present with no digests; an unknown name
        // is absent entirely.
        assert_eq!(
            catalog.get_file("empty.txt").await.unwrap(),
            Some(Vec::new())
        );
        assert_eq!(catalog.get_file("missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_duplicate_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        let original = digests(&[b"first"]);
        catalog.add_file("dup.txt", &original).await.unwrap();

        let result = catalog.add_file("dup.txt", &digests(&[b"second"])).await;
        assert!(matches!(result, Err(Error::DuplicateFile { .. })));

        // The stored digest sequence is untouched.
        assert_eq!(catalog.get_file("dup.txt").await.unwrap().unwrap(), original);
    }

    #[tokio::test]
    async fn test_remove_file_returns_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        let chunks = digests(&[b"solo-1", b"solo-2"]);
        catalog.add_file("only.txt", &chunks).await.unwrap();

        let mut orphans = catalog.remove_file("only.txt").await.unwrap();
        orphans.sort();
        let mut expected = chunks.clone();
        expected.sort();
        assert_eq!(orphans, expected);

        assert!(!catalog.file_exists("only.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_file_keeps_shared_digests() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        let shared = Digest::hash_bytes(b"shared");
        let unique = Digest::hash_bytes(b"unique");
        catalog.add_file("a.txt", &[shared, unique]).await.unwrap();
        catalog.add_file("b.txt", &[shared]).await.unwrap();

        // Removing a.txt orphans only the digest b.txt does not hold.
        let orphans = catalog.remove_file("a.txt").await.unwrap();
        assert_eq!(orphans, vec![unique]);

        // Removing b.txt orphans the shared digest.
        let orphans = catalog.remove_file("b.txt").await.unwrap();
        assert_eq!(orphans, vec![shared]);
    }

    #[tokio::test]
    async fn test_remove_commits_with_mapped_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        // A file with filemap rows referencing it: removal must satisfy
        // the foreign keys and commit, freeing the name for re-use.
        let chunks = digests(&[b"one", b"two"]);
        catalog.add_file("cycle.bin", &chunks).await.unwrap();
        catalog.remove_file("cycle.bin").await.unwrap();

        assert!(!catalog.file_exists("cycle.bin").await.unwrap());
        catalog.add_file("cycle.bin", &chunks).await.unwrap();
        assert_eq!(
            catalog.get_file("cycle.bin").await.unwrap().unwrap(),
            chunks
        );
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        let orphans = catalog.remove_file("missing.txt").await.unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn test_list_files() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        assert!(catalog.list_files().await.unwrap().is_empty());

        catalog.add_file("b.txt", &[]).await.unwrap();
        catalog.add_file("a.txt", &[]).await.unwrap();

        let mut names = catalog.list_files().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_repeated_chunk_within_one_file() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = test_catalog(&temp_dir).await;

        // The same content appearing at several positions maps to one
        // hash row referenced at each sequence.
        let repeated = Digest::hash_bytes(b"repeat");
        let other = Digest::hash_bytes(b"other");
        let chunks = vec![repeated, other, repeated];
        catalog.add_file("echo.bin", &chunks).await.unwrap();

        assert_eq!(catalog.get_file("echo.bin").await.unwrap().unwrap(), chunks);

        // Removing the file orphans both digests exactly once.
        let mut orphans = catalog.remove_file("echo.bin").await.unwrap();
        orphans.sort();
        let mut expected = vec![repeated, other];
        expected.sort();
        assert_eq!(orphans, expected);
    }
}
