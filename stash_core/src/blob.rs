//! Content-addressed blob storage on the filesystem.
//!
//! Each distinct chunk is stored once, at a path derived from its
//! digest. The digest's hex string is split into fixed-width segments
//! that become nested directory levels, which bounds the fan-out of any
//! single directory.

use crate::error::{Error, Result};
use crate::hash::Digest;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default width of a digest path segment.
pub const DEFAULT_PATH_BREAK: usize = 4;

/// Split a digest string into `path_break`-wide path segments.
///
/// Any remainder shorter than `path_break` becomes the final component,
/// so the joined segments always spell out the whole input.
pub fn shard_path(digest: &str, path_break: usize) -> PathBuf {
    assert!(path_break > 0, "path segment width must be non-zero");

    // Split on characters, not bytes: digests are hex in practice, but
    // this is public over any string and must not cut into a multi-byte
    // character.
    let chars: Vec<char> = digest.chars().collect();
    let mut path = PathBuf::new();

    for segment in chars.chunks(path_break) {
        path.push(segment.iter().collect::<String>());
    }

    path
}

/// Content-addressed persistent chunk storage.
#[derive(Debug)]
pub struct BlobStore {
    root: PathBuf,
    path_break: usize,
}

impl BlobStore {
    /// Create a blob store rooted at `root` (typically `<repo>/data`).
    pub fn new<P: AsRef<Path>>(root: P, path_break: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            path_break,
        }
    }

    /// Create the blob root directory; idempotent.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Get the root directory of the blob store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The storage path for a digest.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(shard_path(&digest.to_hex(), self.path_break))
    }

    /// Whether a blob exists for the digest.
    pub fn exists(&self, digest: &Digest) -> bool {
        self.blob_path(digest).exists()
    }

    /// Store a chunk under its digest; a no-op when already present.
    ///
    /// This is the deduplication point: callers put every chunk and
    /// identical content lands on the same path. The write goes through
    /// a temp file in the final directory and is persisted atomically,
    /// so two writers racing on the same digest cannot corrupt it.
    pub fn put(&self, digest: &Digest, data: &[u8]) -> Result<()> {
        let path = self.blob_path(digest);

        if path.exists() {
            debug!(digest = %digest, "blob already present, skipping write");
            return Ok(());
        }

        // create_dir_all tolerates the directory already existing, which
        // covers concurrent creation of a shared path prefix.
        let parent = path.parent().expect("blob path has a parent");
        fs::create_dir_all(parent)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(data)?;
        temp_file.flush()?;
        temp_file.persist(&path)?;

        debug!(digest = %digest, bytes = data.len(), "blob written");
        Ok(())
    }

    /// Retrieve a blob by digest.
    pub fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = self.blob_path(digest);

        if !path.exists() {
            return Err(Error::blob_not_found(digest.to_hex()));
        }

        Ok(fs::read(&path)?)
    }

    /// Delete the blob for a digest.
    ///
    /// Callers only delete digests the catalog reported as orphaned, so
    /// a missing blob is an error rather than a no-op.
    pub fn delete(&self, digest: &Digest) -> Result<()> {
        let path = self.blob_path(digest);

        if !path.exists() {
            return Err(Error::blob_not_found(digest.to_hex()));
        }

        fs::remove_file(&path)?;
        debug!(digest = %digest, "blob deleted");
        Ok(())
    }
}
