//! Fixed-size chunking of byte streams.

use crate::error::Result;
use std::io::Read;

/// Default chunk size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Splits a byte stream into fixed-size chunks.
///
/// Lazy and single-pass: chunks are read from the underlying reader on
/// demand and the iterator cannot be restarted once consumed. Every
/// chunk is exactly `chunk_size` bytes except possibly the last, which
/// may be shorter but never empty; an empty input yields zero chunks.
pub struct Chunker<R: Read> {
    reader: R,
    chunk_size: usize,
    done: bool,
}

impl<R: Read> Chunker<R> {
    /// Create a chunker over `reader` producing `chunk_size`-byte chunks.
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            reader,
            chunk_size,
            done: false,
        }
    }

    /// Read until the buffer holds `chunk_size` bytes or the stream ends.
    ///
    /// `Read::read` may return short counts, so a single call is not
    /// enough to fill a chunk.
    fn fill_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;

        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        buf.truncate(filled);
        Ok(buf)
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.fill_chunk() {
            Ok(chunk) => {
                if chunk.len() < self.chunk_size {
                    self.done = true;
                }
                if chunk.is_empty() {
                    None
                } else {
                    Some(Ok(chunk))
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_all(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        Chunker::new(data, chunk_size)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunks = chunk_all(b"", 4);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        let chunks = chunk_all(b"abcdefgh", 4);
        assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec()]);
    }

    #[test]
    fn test_short_last_chunk() {
        let chunks = chunk_all(b"abcdefghij", 4);
        assert_eq!(
            chunks,
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]
        );
    }

    #[test]
    fn test_input_smaller_than_chunk() {
        let chunks = chunk_all(b"abc", 1024);
        assert_eq!(chunks, vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_one_byte_past_boundary() {
        let data = vec![7u8; 4097];
        let chunks = chunk_all(&data, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn test_short_reads_are_refilled() {
        // A reader that returns one byte at a time.
        struct OneByte<'a>(&'a [u8]);
        impl Read for OneByte<'_> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }

        let chunks: Vec<Vec<u8>> = Chunker::new(OneByte(b"abcdefgh"), 4)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec()]);
    }

    #[test]
    fn test_read_error_ends_iteration() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk on fire"))
            }
        }

        let mut chunker = Chunker::new(Failing, 4);
        assert!(chunker.next().unwrap().is_err());
        assert!(chunker.next().is_none());
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        /// Concatenating the chunks reproduces the input exactly
        #[test]
        fn prop_chunks_concat_to_input(
            data in prop::collection::vec(any::<u8>(), 0..10_000),
            chunk_size in 1usize..512,
        ) {
            let chunks = chunk_all(&data, chunk_size);
            let rejoined: Vec<u8> = chunks.concat();
            prop_assert_eq!(rejoined, data);
        }

        /// All chunks are full-size except possibly the last, and none is empty
        #[test]
        fn prop_chunk_sizes(
            data in prop::collection::vec(any::<u8>(), 0..10_000),
            chunk_size in 1usize..512,
        ) {
            let chunks = chunk_all(&data, chunk_size);
            if let Some((last, rest)) = chunks.split_last() {
                for chunk in rest {
                    prop_assert_eq!(chunk.len(), chunk_size);
                }
                prop_assert!(!last.is_empty());
                prop_assert!(last.len() <= chunk_size);
            } else {
                prop_assert!(data.is_empty());
            }
        }
    }
}
