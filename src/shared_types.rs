use std::time::Duration;

use indicatif::HumanCount;

pub(crate) type ByteCount = u64;

pub(crate) const DEFAULT_CHUNK_SIZE: usize = 8192;
pub(crate) const DEFAULT_PROCESS_DELAY: Duration = Duration::from_millis(100);

/// Half-open byte range `[start, end)` of a chunk within the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkRange {
    pub(crate) start: ByteCount,
    pub(crate) end: ByteCount,
}

impl ChunkRange {
    pub(crate) fn len(&self) -> ByteCount {
        self.end - self.start
    }
}

/// One update per processed chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkProgress {
    /// 1-based chunk ordinal.
    pub(crate) ordinal: u64,
    pub(crate) range: ChunkRange,
    /// Running byte total, this chunk included.
    pub(crate) total: ByteCount,
}

impl ChunkProgress {
    pub(crate) fn line(&self) -> String {
        format!(
            "Processed[{:>4}]:{:>6}B / {:>10}B",
            HumanCount(self.ordinal).to_string(),
            HumanCount(self.range.len()).to_string(),
            HumanCount(self.total).to_string()
        )
    }
}
