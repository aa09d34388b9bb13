//! 📊 progress.rs — "Are we there yet?" — every sweep, every time, forever.
//!
//! A live bar on stderr: objects finished out of objects launched, bytes S3 chewed
//! through, and how fast it's chewing. Purely cosmetic. The numbers that matter are
//! folded from worker receipts at the end (see `report.rs`); this is the speedometer,
//! not the odometer.
//!
//! ⚠️ Watching this progress bar will not make it go faster. We've tried.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::report::MIB;

/// ⏱️ MM:SS, or HH:MM:SS if you should probably go call your mom.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

/// 🪟 How far back the MiB/s figure looks. Long enough to smooth out one object's
/// stats event landing all at once, short enough to notice a stall.
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📈 MiB/s over the last `RATE_WINDOW`.
///
/// Samples older than the window are evicted from the front, the current total is pushed
/// on the back, and the rate is the byte delta against the oldest sample still standing.
fn windowed_rate(samples: &mut VecDeque<(Instant, u64)>, now: Instant, total_bytes: u64) -> f64 {
    while let Some(&(timestamp, _)) = samples.front() {
        if now.duration_since(timestamp) > RATE_WINDOW {
            samples.pop_front();
        } else {
            break;
        }
    }
    samples.push_back((now, total_bytes));

    match samples.front() {
        Some(&(oldest_time, oldest_bytes)) => {
            let the_elapsed = now.duration_since(oldest_time).as_secs_f64();
            if the_elapsed > 0.0 {
                mib(total_bytes.saturating_sub(oldest_bytes)) / the_elapsed
            } else {
                // -- 💤 one sample is not a trend
                0.0
            }
        }
        None => 0.0,
    }
}

/// 🎨 The live bar. Clones share the same bar and the same byte counter.
#[derive(Clone)]
pub(crate) struct RunProgress {
    bar: ProgressBar,
    bytes_processed: Arc<AtomicU64>,
    started: Instant,
    rate_samples: Arc<Mutex<VecDeque<(Instant, u64)>>>,
}

impl std::fmt::Debug for RunProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and won't Debug. we describe it instead.
        f.debug_struct("RunProgress")
            .field("objects_finished", &self.bar.position())
            .field("bytes_processed", &self.bytes_processed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RunProgress {
    /// 🚀 `enabled = false` gives a hidden bar: same API, draws nothing.
    pub(crate) fn new(total_objects: u64, enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::with_draw_target(Some(total_objects), ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        let the_style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}] {pos}/{len} objects")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(the_style);

        let the_progress = Self {
            bar,
            bytes_processed: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
            rate_samples: Arc::new(Mutex::new(VecDeque::new())),
        };
        the_progress.render();
        the_progress
    }

    /// 📦 S3 says it processed more bytes. Count them for the display.
    pub(crate) fn record_bytes(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.render();
    }

    /// ✅ one more worker is home
    pub(crate) fn object_finished(&self) {
        self.bar.inc(1);
        self.render();
    }

    /// 🤫 Hide the bar, run `f` (usually a println), redraw.
    pub(crate) fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.bar.suspend(f)
    }

    pub(crate) fn finish(&self) {
        self.render();
        self.bar.finish_and_clear();
    }

    fn render(&self) {
        let the_bytes = self.bytes_processed.load(Ordering::Relaxed);
        let the_elapsed = self.started.elapsed();
        let the_rate = match self.rate_samples.lock() {
            Ok(mut samples) => windowed_rate(&mut samples, Instant::now(), the_bytes),
            // -- 🎨 a poisoned speedometer just reads zero. the totals live elsewhere.
            Err(_) => 0.0,
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB processed", mib(the_bytes)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} MiB/s", the_rate)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} elapsed", format_duration(the_elapsed)))
                .set_alignment(CellAlignment::Right),
        ]);

        self.bar.set_message(table.to_string());
    }
}
