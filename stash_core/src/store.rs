//! Store orchestration: add/get/remove/list over the chunker, blob
//! store, and catalog.

use crate::blob::{BlobStore, DEFAULT_PATH_BREAK};
use crate::catalog::{Catalog, DEFAULT_CATALOG_NAME};
use crate::chunking::{Chunker, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::hash::Digest;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Tunable parameters of a repository.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Chunk size in bytes.
    pub chunk_size: usize,
    /// Width of a digest path segment in the blob store.
    pub path_break: usize,
    /// File name of the catalog database inside the repository.
    pub catalog_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            path_break: DEFAULT_PATH_BREAK,
            catalog_name: DEFAULT_CATALOG_NAME.to_string(),
        }
    }
}

/// What happened to one name in a batch operation.
///
/// `Duplicate` and `NotFound` are business-as-usual conditions; only
/// `Failed` carries an unexpected storage-layer error.
#[derive(Debug)]
pub enum Outcome {
    /// The file was chunked, stored, and cataloged.
    Added,
    /// The file was reconstructed at its destination.
    Retrieved,
    /// The file and its orphaned blobs were deleted.
    Removed,
    /// The name is already cataloged; nothing was modified.
    Duplicate,
    /// The name is not cataloged.
    NotFound,
    /// An unexpected error; the rest of the batch still ran.
    Failed(Error),
}

/// Per-name result of a batch operation.
#[derive(Debug)]
pub struct Report {
    pub name: String,
    pub outcome: Outcome,
}

/// A deduplicating file store: a catalog plus a blob store under one
/// repository root.
#[derive(Debug)]
pub struct Store {
    catalog: Catalog,
    blobs: BlobStore,
    chunk_size: usize,
}

impl Store {
    /// Initialize a repository at `root`; idempotent.
    ///
    /// Creates the catalog schema and the `data/` directory. Existing
    /// catalog data is never discarded.
    pub async fn init<P: AsRef<Path>>(root: P, config: StoreConfig) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;

        let catalog = Catalog::open(root.join(&config.catalog_name), false).await?;
        catalog.create_schema().await?;

        let blobs = BlobStore::new(root.join("data"), config.path_break);
        blobs.ensure_root()?;

        info!(root = %root.display(), "repository initialized");

        Ok(Self {
            catalog,
            blobs,
            chunk_size: config.chunk_size,
        })
    }

    /// Open an existing repository at `root`.
    ///
    /// Fails with `InvalidMetadata` when the repository was never
    /// initialized.
    pub async fn open<P: AsRef<Path>>(root: P, config: StoreConfig) -> Result<Self> {
        let root = root.as_ref();
        let catalog = Catalog::open(root.join(&config.catalog_name), true).await?;
        let blobs = BlobStore::new(root.join("data"), config.path_break);

        Ok(Self {
            catalog,
            blobs,
            chunk_size: config.chunk_size,
        })
    }

    /// Release the catalog connection.
    pub async fn close(&self) {
        self.catalog.close().await;
    }

    /// Add files to the store.
    ///
    /// Each path is processed independently: an already-cataloged name
    /// reports `Duplicate`, an I/O failure reports `Failed`, and in both
    /// cases the rest of the batch still runs.
    pub async fn add(&self, paths: &[PathBuf]) -> Vec<Report> {
        let mut reports = Vec::with_capacity(paths.len());

        for path in paths {
            let name = match catalog_name(path) {
                Ok(name) => name,
                Err(e) => {
                    reports.push(failed(path.display().to_string(), e));
                    continue;
                }
            };

            let outcome = match self.add_one(&name, path).await {
                Ok(outcome) => outcome,
                Err(Error::DuplicateFile { .. }) => Outcome::Duplicate,
                Err(e) => {
                    error!(name = %name, error = %e, "failed to add file");
                    Outcome::Failed(e)
                }
            };

            reports.push(Report { name, outcome });
        }

        reports
    }

    async fn add_one(&self, name: &str, path: &Path) -> Result<Outcome> {
        if self.catalog.file_exists(name).await? {
            return Err(Error::duplicate_file(name));
        }

        debug!(name, path = %path.display(), "chunking file");

        let source = fs::File::open(path)?;
        let mut digests = Vec::new();

        for chunk in Chunker::new(source, self.chunk_size) {
            let chunk = chunk?;
            let digest = Digest::hash_bytes(&chunk);
            // put() is a no-op for an already-stored digest, which is
            // where dedup across and within files happens.
            self.blobs.put(&digest, &chunk)?;
            digests.push(digest);
        }

        self.catalog.add_file(name, &digests).await?;
        info!(name, chunks = digests.len(), "file added");

        Ok(Outcome::Added)
    }

    /// Reconstruct files from the store.
    ///
    /// Each path's basename is looked up in the catalog and its blobs
    /// are concatenated in sequence order into a file at the path as
    /// given. Unknown names report `NotFound` without aborting the
    /// batch.
    pub async fn get(&self, paths: &[PathBuf]) -> Vec<Report> {
        let mut reports = Vec::with_capacity(paths.len());

        for path in paths {
            let name = match catalog_name(path) {
                Ok(name) => name,
                Err(e) => {
                    reports.push(failed(path.display().to_string(), e));
                    continue;
                }
            };

            let outcome = match self.get_one(&name, path).await {
                Ok(outcome) => outcome,
                Err(Error::FileNotFound { .. }) => Outcome::NotFound,
                Err(e) => {
                    error!(name = %name, error = %e, "failed to get file");
                    Outcome::Failed(e)
                }
            };

            reports.push(Report { name, outcome });
        }

        reports
    }

    async fn get_one(&self, name: &str, dest: &Path) -> Result<Outcome> {
        let digests = match self.catalog.get_file(name).await? {
            Some(digests) => digests,
            None => return Err(Error::file_not_found(name)),
        };

        debug!(name, chunks = digests.len(), dest = %dest.display(), "reconstructing file");

        // The writer is scoped so the destination is flushed and closed
        // on every exit path, including a blob read failing mid-stream.
        let mut writer = BufWriter::new(fs::File::create(dest)?);
        for digest in &digests {
            let chunk = self.blobs.get(digest)?;
            writer.write_all(&chunk)?;
        }
        writer.flush()?;

        Ok(Outcome::Retrieved)
    }

    /// Remove files from the store.
    ///
    /// Each name's catalog entry is deleted and any digests left with
    /// zero references have their blobs purged. Unknown names report
    /// `NotFound` without aborting the batch.
    pub async fn remove(&self, paths: &[PathBuf]) -> Vec<Report> {
        let mut reports = Vec::with_capacity(paths.len());

        for path in paths {
            let name = match catalog_name(path) {
                Ok(name) => name,
                Err(e) => {
                    reports.push(failed(path.display().to_string(), e));
                    continue;
                }
            };

            let outcome = match self.remove_one(&name).await {
                Ok(outcome) => outcome,
                Err(Error::FileNotFound { .. }) => Outcome::NotFound,
                Err(e) => {
                    error!(name = %name, error = %e, "failed to remove file");
                    Outcome::Failed(e)
                }
            };

            reports.push(Report { name, outcome });
        }

        reports
    }

    async fn remove_one(&self, name: &str) -> Result<Outcome> {
        if !self.catalog.file_exists(name).await? {
            return Err(Error::file_not_found(name));
        }

        let orphans = self.catalog.remove_file(name).await?;
        for digest in &orphans {
            self.blobs.delete(digest)?;
        }

        info!(name, purged = orphans.len(), "file removed");
        Ok(Outcome::Removed)
    }

    /// All cataloged names, sorted lexicographically.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = self.catalog.list_files().await?;
        names.sort();
        Ok(names)
    }

    /// The blob store backing this repository.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }
}

/// The catalog name for a path: its final component.
fn catalog_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path has no usable file name: {}", path.display()),
                ),
            }
        })
}

fn failed(name: String, error: Error) -> Report {
    Report {
        name,
        outcome: Outcome::Failed(error),
    }
}
