//! # Stash Core
//!
//! A deduplicating, content-addressed file store.
//!
//! Files are split into fixed-size chunks, each chunk is stored once on
//! disk keyed by its SHA-256 digest, and a SQLite catalog maps logical
//! file names to the ordered digest sequence needed to reconstruct
//! them. Chunks shared between files are stored physically once and
//! reclaimed when the last referencing file is removed.
//!
//! ## Example
//!
//! ```no_run
//! use stash_core::{Store, StoreConfig};
//! use std::path::PathBuf;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize a repository
//! let store = Store::init("./my-repo", StoreConfig::default()).await?;
//!
//! // Add files (deduplicated against everything already stored)
//! store.add(&[PathBuf::from("./report.pdf")]).await;
//!
//! // Reconstruct them later, byte-for-byte
//! store.get(&[PathBuf::from("./restored/report.pdf")]).await;
//!
//! // See what is stored
//! for name in store.list().await? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

mod blob;
mod catalog;
mod chunking;
mod error;
mod hash;
mod store;

pub use blob::{shard_path, BlobStore, DEFAULT_PATH_BREAK};
pub use catalog::{Catalog, DEFAULT_CATALOG_NAME};
pub use chunking::{Chunker, DEFAULT_CHUNK_SIZE};
pub use error::{Error, Result};
pub use hash::{Digest, DIGEST_SIZE};
pub use store::{Outcome, Report, Store, StoreConfig};
