use std::sync::Arc;
use std::time::Duration;

use circular_buffer::CircularBuffer;

use indicatif::{MultiProgress, ProgressBar, ProgressState, ProgressStyle};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::chunk_processor::{ProcessError, ProcessSummary};
use crate::shared_types::{ByteCount, ChunkProgress};

const SPEED_WINDOW: usize = 50;
const UPDATE_INTERVAL: Duration = Duration::from_millis(500);
const MIB: f64 = 1024.0 * 1024.0;

/// Prints per-chunk progress lines and keeps a throughput bar up to date.
pub(crate) struct ProgressReporter {
    rx_progress: mpsc::Receiver<ChunkProgress>,
    total_size: Option<ByteCount>,
    multi_progress: MultiProgress,
}

impl ProgressReporter {
    pub(crate) fn new(
        rx_progress: mpsc::Receiver<ChunkProgress>,
        total_size: Option<ByteCount>,
        multi_progress: MultiProgress,
    ) -> Self {
        Self {
            rx_progress,
            total_size,
            multi_progress,
        }
    }

    /// Runs until every sender is dropped. The bar is handed back unfinished;
    /// close it with [`finish_report`] once the run's outcome is known.
    pub(crate) fn spawn(self) -> JoinHandle<ProgressBar> {
        spawn_progress_reporter(self.total_size, self.rx_progress, self.multi_progress)
    }
}

pub(crate) fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec > MIB {
        format!("{:.1} MB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.1} kB/s", bytes_per_sec / 1024.0)
    }
}

type ProgressPoint = (ByteCount, Instant);

/// Bytes per second between two samples, `None` when they span no bytes or no time.
fn window_speed(oldest: ProgressPoint, latest: ProgressPoint) -> Option<f64> {
    let window = latest.1.duration_since(oldest.1);
    if latest.0 == oldest.0 || window.is_zero() {
        return None;
    }
    Some((latest.0 - oldest.0) as f64 / window.as_secs_f64())
}

/// Leaves the average speed on the bar after a successful run and clears it
/// otherwise, so a failed run shows no partial totals.
pub(crate) fn finish_report(pb: &ProgressBar, result: &Result<ProcessSummary, ProcessError>) {
    match result {
        Ok(summary) => pb.finish_with_message(format_speed(summary.throughput())),
        Err(_) => {
            pb.set_message("");
            pb.finish_and_clear();
        }
    }
}

fn spawn_progress_reporter(
    total_size: Option<ByteCount>,
    mut rx_progress: mpsc::Receiver<ChunkProgress>,
    multi: MultiProgress,
) -> JoinHandle<ProgressBar> {
    tokio::spawn(async move {
        let mut progress: ByteCount = 0;
        let progress_q = Arc::new(RwLock::new(
            CircularBuffer::<SPEED_WINDOW, ProgressPoint>::new(),
        ));
        let pb = total_size.map_or_else(ProgressBar::new_spinner, ProgressBar::new);
        let pb = multi.add(pb);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta}) ({msg})",
        ) {
            pb.set_style(
                style
                    .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                        let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                    })
                    .progress_chars("#>-"),
            );
        }

        // windowed speed, refreshed independently of chunk arrival
        let speed_updater = {
            let progress_q = progress_q.clone();
            let pb = pb.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(UPDATE_INTERVAL).await;
                    let q = progress_q.read().await;
                    if let (
                        Some((latest_byte, latest_instant)),
                        Some((oldest_byte, oldest_instant)),
                    ) = (q.back(), q.front())
                    {
                        if let Some(speed) = window_speed(
                            (*oldest_byte, *oldest_instant),
                            (*latest_byte, *latest_instant),
                        ) {
                            pb.set_message(format_speed(speed));
                        }
                    }
                }
            })
        };

        while let Some(update) = rx_progress.recv().await {
            multi.suspend(|| println!("{}", update.line()));
            progress = update.total;
            pb.set_position(progress);
            let mut q = progress_q.write().await;
            q.push_back((progress, Instant::now()));
        }
        speed_updater.abort();
        debug!("progress reporter done at {progress} bytes");
        pb
    })
}
