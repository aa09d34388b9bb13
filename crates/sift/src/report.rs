//! 🧮 Report — per-object tallies and the grand total at the end of the run.
//!
//! 🎬 *[every worker walks up to the counter and hands in a receipt.]*
//! *[nobody touches anybody else's receipt. nobody races. it is very civilized.]*
//!
//! 🧠 Knowledge graph:
//! - Each `QueryWorker` owns one `ObjectTally` and returns it when done
//! - `RunSummary::fold` adds them up at the join point, single-threaded, after everyone is home
//! - `render()` turns the totals into a comfy-table for stdout

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use crate::query::{BucketKey, RowMode};

// -- 📏 one mebibyte. the summary calls it "megabytes" because the summary is old and set in its ways.
pub(crate) const MIB: u64 = 1024 * 1024;

/// 🏁 How one object's query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    Completed,
    /// 💀 submission or stream failure. logged already; counted here.
    Failed,
}

/// 🧾 Everything one worker learned about one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTally {
    pub key: BucketKey,
    pub bytes_processed: u64,
    pub over_threshold: u64,
    pub under_threshold: u64,
    pub rows_printed: u64,
    pub outcome: ObjectOutcome,
}

impl ObjectTally {
    pub(crate) fn new(key: BucketKey) -> Self {
        Self {
            key,
            bytes_processed: 0,
            over_threshold: 0,
            under_threshold: 0,
            rows_printed: 0,
            outcome: ObjectOutcome::Completed,
        }
    }

    pub(crate) fn mark_failed(&mut self) {
        self.outcome = ObjectOutcome::Failed;
    }
}

/// 📊 Totals for the whole sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub mode: RowMode,
    pub bytes_processed: u64,
    pub objects_processed: u64,
    pub objects_failed: u64,
    pub over_threshold: u64,
    pub under_threshold: u64,
    pub rows_printed: u64,
}

impl RunSummary {
    pub fn empty(mode: RowMode) -> Self {
        Self {
            mode,
            bytes_processed: 0,
            objects_processed: 0,
            objects_failed: 0,
            over_threshold: 0,
            under_threshold: 0,
            rows_printed: 0,
        }
    }

    /// 🔄 Fold one worker's receipt into the totals.
    pub(crate) fn absorb(&mut self, tally: &ObjectTally) {
        self.objects_processed += 1;
        self.bytes_processed += tally.bytes_processed;
        self.over_threshold += tally.over_threshold;
        self.under_threshold += tally.under_threshold;
        self.rows_printed += tally.rows_printed;
        if tally.outcome == ObjectOutcome::Failed {
            self.objects_failed += 1;
        }
    }

    /// 💥 A worker that never came back (panicked). Still an object. Still failed.
    pub(crate) fn absorb_lost_worker(&mut self) {
        self.objects_processed += 1;
        self.objects_failed += 1;
    }

    pub fn fold<'a>(mode: RowMode, tallies: impl IntoIterator<Item = &'a ObjectTally>) -> Self {
        let mut the_summary = Self::empty(mode);
        for tally in tallies {
            the_summary.absorb(tally);
        }
        the_summary
    }

    /// 📏 Whole mebibytes, rounded down. 1048575 bytes is 0 megabytes. Harsh but fair.
    pub fn megabytes_processed(&self) -> u64 {
        self.bytes_processed / MIB
    }

    /// 🍽️ The summary block as a borderless two-column table.
    pub fn render(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let mut rows: Vec<(&str, u64)> = vec![
            ("Total Megabytes Processed:", self.megabytes_processed()),
            ("Total Objects Processed:", self.objects_processed),
            ("Failed Objects:", self.objects_failed),
        ];
        match self.mode {
            RowMode::Classify => {
                rows.push(("Total Number of Analytics Over Threshold:", self.over_threshold));
                rows.push(("Total Number of Analytics Under Threshold:", self.under_threshold));
            }
            RowMode::Print => rows.push(("Total Rows Printed:", self.rows_printed)),
        }

        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}
