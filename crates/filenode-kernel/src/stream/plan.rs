//! Pure stream planning.

use serde::Serialize;

/// Chunk size used when the request leaves it unset.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Largest chunk a single read may produce.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Requested lengths up to this are previews; longer ones are ranges.
pub const MAX_PREVIEW_SIZE: u64 = 5 * 1024 * 1024;

/// Why the client is reading. Advisory only: every mode delivers bytes the
/// same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Offset to end of file.
    Download,
    /// A short look at the file.
    Preview,
    /// An explicit large slice.
    Range,
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Download => "download",
            Self::Preview => "preview",
            Self::Range => "range",
        })
    }
}

/// Resolved parameters of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    pub mode: StreamMode,
    pub offset: u64,
    /// Bytes to deliver, already clamped to what the file holds.
    pub length: u64,
    pub chunk_size: usize,
}

impl StreamPlan {
    /// Offset one past the last planned byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Compute the plan for reading `requested_length` bytes at `offset` from a
/// file of `file_size` bytes.
///
/// `offset` must already be validated against `file_size`. A zero length
/// means "to end of file".
pub fn plan(offset: u64, requested_length: u64, file_size: u64, requested_chunk: i64) -> StreamPlan {
    let remaining = file_size.saturating_sub(offset);

    let (mode, length) = match requested_length {
        0 => (StreamMode::Download, remaining),
        n if n <= MAX_PREVIEW_SIZE => (StreamMode::Preview, n.min(remaining)),
        n => (StreamMode::Range, n.min(remaining)),
    };

    let chunk_size = match usize::try_from(requested_chunk) {
        Ok(0) | Err(_) => DEFAULT_CHUNK_SIZE,
        Ok(n) => n.min(MAX_CHUNK_SIZE),
    };

    StreamPlan {
        mode,
        offset,
        length,
        chunk_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_download() {
        let p = plan(100, 0, 1000, 0);
        assert_eq!(p.mode, StreamMode::Download);
        assert_eq!(p.length, 900);
        assert_eq!(p.end(), 1000);
        assert_eq!(p.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_preview_clamped_to_file() {
        let p = plan(0, 5, 51, 0);
        assert_eq!(p.mode, StreamMode::Preview);
        assert_eq!(p.length, 5);

        let p = plan(40, 5 * MIB, 51, 0);
        assert_eq!(p.mode, StreamMode::Preview);
        assert_eq!(p.length, 11);
    }

    #[test]
    fn test_range() {
        let p = plan(0, 5 * MIB + 1, 10 * MIB, 0);
        assert_eq!(p.mode, StreamMode::Range);
        assert_eq!(p.length, 5 * MIB + 1);
    }

    #[test]
    fn test_chunk_size_clamping() {
        assert_eq!(plan(0, 0, 10, -4).chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(plan(0, 0, 10, 4096).chunk_size, 4096);
        assert_eq!(plan(0, 0, 10, 64 * MIB as i64).chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_offset_at_end() {
        let p = plan(10, 0, 10, 0);
        assert_eq!(p.length, 0);
    }
}
