//! Re-fragmentation of the output payload into bounded chunks.

use bytes::Bytes;

use crate::message::OutputChunk;

/// Maximum output chunk size of the reference chunk size policy.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Lazy, ordered iterator of [`OutputChunk`]s over one output payload.
///
/// Chunks are zero-copy slices of the payload. For a payload of length `L`
/// and chunk size `M` it yields `ceil(L / M)` chunks (none when `L == 0`),
/// all of length `M` except possibly the last.
#[derive(Debug, Clone)]
pub struct ChunkEmitter {
    payload: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl ChunkEmitter {
    /// Create an emitter over `payload`.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(payload: Bytes, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be greater than zero");
        Self {
            payload,
            chunk_size,
            offset: 0,
        }
    }

    /// Create an emitter with [`DEFAULT_CHUNK_SIZE`].
    pub fn with_default_size(payload: Bytes) -> Self {
        Self::new(payload, DEFAULT_CHUNK_SIZE)
    }

    /// Total number of chunks this payload splits into.
    pub fn chunk_count(&self) -> usize {
        self.payload.len().div_ceil(self.chunk_size)
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Iterator for ChunkEmitter {
    type Item = OutputChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            return None;
        }

        let end = usize::min(self.offset + self.chunk_size, self.payload.len());
        let content = self.payload.slice(self.offset..end);
        self.offset = end;

        Some(OutputChunk { content })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.payload.len() - self.offset).div_ceil(self.chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkEmitter {}

impl std::iter::FusedIterator for ChunkEmitter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(payload: &'static [u8], size: usize) -> Vec<Bytes> {
        ChunkEmitter::new(Bytes::from_static(payload), size)
            .map(|c| c.content)
            .collect()
    }

    #[test]
    fn test_uneven_split() {
        let chunks = collect(b"AAAABBBB", 3);
        assert_eq!(chunks, vec![&b"AAA"[..], &b"ABB"[..], &b"BB"[..]]);
    }

    #[test]
    fn test_even_split_has_full_last_chunk() {
        let chunks = collect(b"abcdef", 2);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn test_empty_payload_yields_nothing() {
        let emitter = ChunkEmitter::with_default_size(Bytes::new());
        assert_eq!(emitter.chunk_count(), 0);
        assert_eq!(emitter.count(), 0);
    }

    #[test]
    fn test_count_and_reconstruction_across_sizes() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let payload = Bytes::from(payload);

        for size in [1, 7, 2047, DEFAULT_CHUNK_SIZE, 2049, 5000, 10_000] {
            let emitter = ChunkEmitter::new(payload.clone(), size);
            let expected = payload.len().div_ceil(size);
            assert_eq!(emitter.chunk_count(), expected);
            assert_eq!(emitter.len(), expected);

            let chunks: Vec<OutputChunk> = emitter.collect();
            assert_eq!(chunks.len(), expected);
            assert!(chunks.iter().all(|c| c.len() <= size && !c.is_empty()));

            let rebuilt: Vec<u8> = chunks.iter().flat_map(|c| c.content.to_vec()).collect();
            assert_eq!(rebuilt, payload);
        }
    }

    #[test]
    fn test_chunks_share_payload_memory() {
        let payload = Bytes::from(vec![7u8; 4096]);
        let first = ChunkEmitter::with_default_size(payload.clone())
            .next()
            .unwrap();
        assert_eq!(first.content.as_ptr(), payload.as_ptr());
    }

    #[test]
    fn test_restart_from_payload() {
        let emitter = ChunkEmitter::new(Bytes::from_static(b"hello world"), 4);
        let mut partial = emitter.clone();
        partial.next();

        assert_eq!(partial.len(), 2);
        assert_eq!(emitter.count(), 3);
    }

    #[test]
    #[should_panic(expected = "chunk size must be greater than zero")]
    fn test_zero_chunk_size_panics() {
        let _ = ChunkEmitter::new(Bytes::new(), 0);
    }
}
