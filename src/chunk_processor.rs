use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::atomic_counter::AtomicCounter;
use crate::shared_types::{
    ByteCount, ChunkProgress, ChunkRange, DEFAULT_CHUNK_SIZE, DEFAULT_PROCESS_DELAY,
};

#[derive(Error, Debug)]
pub(crate) enum ProcessError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("'{}' is not a file", .0.display())]
    NotAFile(PathBuf),
    #[error("Permission denied accessing file: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("Error processing file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Chunk size must be a positive number of bytes")]
    InvalidChunkSize,
    #[error("Processing cancelled after {chunks} chunks")]
    Cancelled { chunks: u64 },
}

impl ProcessError {
    fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_owned()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_owned()),
            _ => Self::Io {
                path: path.to_owned(),
                source: e,
            },
        }
    }
}

/// Work applied to every chunk before the next one is read.
pub(crate) trait ChunkHook {
    async fn handle(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Stand-in for real per-chunk work: suspends for a fixed delay.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimulatedWork {
    delay: Duration,
}

impl SimulatedWork {
    pub(crate) fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ChunkHook for SimulatedWork {
    async fn handle(&mut self, _chunk: &[u8]) -> io::Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessorConfig {
    pub(crate) chunk_size: usize,
    pub(crate) process_delay: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            process_delay: DEFAULT_PROCESS_DELAY,
        }
    }
}

/// Read-only view of a processor's counters. Cloning shares the same counters.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkMetrics {
    chunks: Arc<AtomicCounter>,
    bytes: Arc<AtomicCounter>,
}

impl ChunkMetrics {
    pub(crate) fn chunks(&self) -> u64 {
        self.chunks.get().max(0) as u64
    }

    pub(crate) fn bytes(&self) -> ByteCount {
        self.bytes.get().max(0) as ByteCount
    }

    fn record(&self, len: ByteCount) -> ChunkProgress {
        self.bytes.increment(len as i64);
        self.chunks.inc();
        let total = self.bytes();
        ChunkProgress {
            ordinal: self.chunks(),
            range: ChunkRange {
                start: total - len,
                end: total,
            },
            total,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessSummary {
    pub(crate) chunks: u64,
    pub(crate) bytes: ByteCount,
    pub(crate) elapsed: Duration,
}

impl ProcessSummary {
    /// Average bytes per second over the whole run.
    pub(crate) fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives the read/process/report loop for a single file.
///
/// `process` consumes the processor, so every run starts from zeroed counters.
pub(crate) struct ChunkProcessor<H = SimulatedWork> {
    metrics: ChunkMetrics,
    chunk_size: usize,
    hook: H,
    s_progress: Option<mpsc::Sender<ChunkProgress>>,
}

impl ChunkProcessor<SimulatedWork> {
    pub(crate) fn new(config: ProcessorConfig) -> Result<Self, ProcessError> {
        if config.chunk_size == 0 {
            return Err(ProcessError::InvalidChunkSize);
        }
        Ok(Self {
            metrics: ChunkMetrics::default(),
            chunk_size: config.chunk_size,
            hook: SimulatedWork::new(config.process_delay),
            s_progress: None,
        })
    }
}

impl<H: ChunkHook> ChunkProcessor<H> {
    #[cfg(test)]
    pub(crate) fn with_hook<T: ChunkHook>(self, hook: T) -> ChunkProcessor<T> {
        ChunkProcessor {
            metrics: self.metrics,
            chunk_size: self.chunk_size,
            hook,
            s_progress: self.s_progress,
        }
    }

    /// Sends progress updates to `s_progress` instead of printing them directly.
    pub(crate) fn with_progress(mut self, s_progress: mpsc::Sender<ChunkProgress>) -> Self {
        self.s_progress = Some(s_progress);
        self
    }

    pub(crate) fn metrics(&self) -> ChunkMetrics {
        self.metrics.clone()
    }

    pub(crate) async fn process(
        mut self,
        path: impl AsRef<Path>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<ProcessSummary, ProcessError> {
        let path = path.as_ref();
        let result = self.run(path, &mut shutdown).await;
        match &result {
            Ok(summary) => debug!("finished {}: {:?}", path.display(), summary),
            Err(e) => debug!("aborted {}: {e}", path.display()),
        }
        result
    }

    async fn run(
        &mut self,
        path: &Path,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<ProcessSummary, ProcessError> {
        let started = Instant::now();
        let size = inspect_target(path).await?;
        debug!(
            "processing {} ({size} bytes) in chunks of {} bytes",
            path.display(),
            self.chunk_size
        );

        let mut file = File::open(path)
            .await
            .map_err(|e| ProcessError::from_io(path, e))?;
        let mut buffer = BytesMut::with_capacity(self.chunk_size);

        loop {
            if cancel_requested(shutdown) {
                return Err(ProcessError::Cancelled {
                    chunks: self.metrics.chunks(),
                });
            }

            let read = read_chunk(&mut file, &mut buffer, self.chunk_size)
                .await
                .map_err(|e| ProcessError::from_io(path, e))?;
            if read == 0 {
                break;
            }

            self.hook
                .handle(&buffer)
                .await
                .map_err(|e| ProcessError::from_io(path, e))?;

            let progress = self.metrics.record(read as ByteCount);
            self.report(progress).await;
        }

        Ok(ProcessSummary {
            chunks: self.metrics.chunks(),
            bytes: self.metrics.bytes(),
            elapsed: started.elapsed(),
        })
    }

    async fn report(&self, progress: ChunkProgress) {
        match &self.s_progress {
            Some(s_progress) => {
                if s_progress.send(progress).await.is_err() {
                    debug!("progress receiver dropped, chunk {} unreported", progress.ordinal);
                }
            }
            None => println!("{}", progress.line()),
        }
    }
}

/// Checks that `path` names a regular file and returns its length.
pub(crate) async fn inspect_target(path: &Path) -> Result<ByteCount, ProcessError> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| ProcessError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(ProcessError::NotAFile(path.to_owned()));
    }
    Ok(metadata.len())
}

fn cancel_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) => true,
        // a closed channel can never deliver a signal
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
    }
}

/// Fills `buffer` with up to `chunk_size` bytes; fewer only at end of file.
async fn read_chunk(file: &mut File, buffer: &mut BytesMut, chunk_size: usize) -> io::Result<usize> {
    buffer.clear();
    buffer.reserve(chunk_size);
    while buffer.len() < chunk_size {
        let remaining = (chunk_size - buffer.len()) as u64;
        if (&mut *file).take(remaining).read_buf(buffer).await? == 0 {
            break;
        }
    }
    Ok(buffer.len())
}
