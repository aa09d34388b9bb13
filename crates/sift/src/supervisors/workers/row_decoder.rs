//! 🧾 Row decoder — the blocking half of the per-object pipe.
//!
//! 🎬 *[record chunks arrive one at a time through a channel the size of a mail slot.]*
//! *[on the other side, a CSV reader waits. it does not know about async. it does not care.]*
//!
//! 🧠 Knowledge graph:
//! - `ChannelReader`: `std::io::Read` over an `async_channel::Receiver<Vec<u8>>`. Blocks on
//!   `recv_blocking()`, so it must live on the blocking pool (`spawn_blocking`), never on a
//!   runtime worker thread. Channel closed = EOF.
//! - `RowDecoder::decode`: `csv` crate over that reader. Chunks may split a row (or a quoted
//!   field) anywhere; the CSV reader stitches them back together.
//! - Rows are either classified (`ThresholdClassifier`) or printed, per `RowMode`.
//! - Field delimiter, quote and record delimiter all come from the query's output
//!   serialization, so the decoder splits rows exactly where S3 put them.

use std::io::{self, Read};

use anyhow::{Result, bail};
use async_channel::Receiver;
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::warn;

use crate::classify::{RowVerdict, ThresholdClassifier};
use crate::console::Console;
use crate::query::{QueryConfig, RowMode};

/// 🚰 Turns a channel of byte chunks back into a byte stream.
pub(crate) struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    cursor: usize,
}

impl ChannelReader {
    pub(crate) fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            cursor: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.cursor >= self.chunk.len() {
            match self.rx.recv_blocking() {
                Ok(next_chunk) => {
                    self.chunk = next_chunk;
                    self.cursor = 0;
                }
                // -- 🏁 sender dropped. that's EOF, not an error.
                Err(_) => return Ok(0),
            }
        }
        let the_remaining = &self.chunk[self.cursor..];
        let n = the_remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&the_remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}

/// 📊 What the decoder saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RowTally {
    pub(crate) over_threshold: u64,
    pub(crate) under_threshold: u64,
    pub(crate) rows_printed: u64,
    pub(crate) rows_skipped: u64,
}

#[derive(Debug, Clone, Copy)]
enum RowHandling {
    Classify(ThresholdClassifier),
    Print,
}

/// 🔧 Decoding settings resolved from the query config. Cheap to copy into each worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowDecoder {
    handling: RowHandling,
    delimiter: u8,
    quote: Option<u8>,
    terminator: Terminator,
}

impl RowDecoder {
    /// 🏗️ 💀 Fails on non-ASCII delimiters or quotes, and on record delimiters that aren't
    /// one ASCII byte (or `\r\n`); the CSV reader works in bytes.
    pub(crate) fn from_query_config(query: &QueryConfig) -> Result<Self> {
        let delimiter = ascii_byte(query.output.field_delimiter, "query.output.field_delimiter")?;
        let terminator = record_terminator(&query.output.record_delimiter)?;
        let quote = query
            .output
            .quote_character
            .map(|c| ascii_byte(c, "query.output.quote_character"))
            .transpose()?;
        let handling = match query.mode {
            RowMode::Classify => RowHandling::Classify(ThresholdClassifier::new(query.threshold)),
            RowMode::Print => RowHandling::Print,
        };
        Ok(Self {
            handling,
            delimiter,
            quote,
            terminator,
        })
    }

    /// 🔄 Read rows until EOF. Blocking. Runs on the blocking pool.
    pub(crate) fn decode<R: Read>(&self, reader: R, console: &Console) -> RowTally {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .terminator(self.terminator);
        if let Some(quote) = self.quote {
            builder.quote(quote);
        }
        let mut csv_reader = builder.from_reader(reader);

        let mut tally = RowTally::default();
        let mut record = StringRecord::new();
        loop {
            match csv_reader.read_record(&mut record) {
                Ok(true) => self.handle_row(&record, console, &mut tally),
                Ok(false) => break,
                Err(err) if err.is_io_error() => {
                    warn!("⚠️ record pipe failed mid-read, stopping this object: {}", err);
                    break;
                }
                Err(err) => {
                    warn!("⚠️ skipping a row the CSV reader couldn't make sense of: {}", err);
                    tally.rows_skipped += 1;
                }
            }
        }
        tally
    }

    fn handle_row(&self, record: &StringRecord, console: &Console, tally: &mut RowTally) {
        match self.handling {
            RowHandling::Classify(classifier) => match classifier.classify(record) {
                RowVerdict::Over(value) => {
                    console.line(classifier.trip_message(value));
                    tally.over_threshold += 1;
                }
                RowVerdict::Under(_) => tally.under_threshold += 1,
                RowVerdict::NotNumeric => tally.rows_skipped += 1,
            },
            RowHandling::Print => match self.reencode(record) {
                Ok(line) => {
                    console.line(line);
                    tally.rows_printed += 1;
                }
                Err(err) => {
                    warn!("⚠️ couldn't write a row back out as CSV, skipping it: {:#}", err);
                    tally.rows_skipped += 1;
                }
            },
        }
    }

    /// 🖨️ Write the row back out as CSV with the same delimiter and quote, so a quoted
    /// field that holds a delimiter prints quoted instead of looking like two fields.
    fn reencode(&self, record: &StringRecord) -> Result<String> {
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(self.delimiter)
            .terminator(Terminator::Any(b'\n'));
        if let Some(quote) = self.quote {
            builder.quote(quote);
        }
        let mut writer = builder.from_writer(Vec::new());
        writer.write_record(record)?;
        let mut the_bytes = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("csv writer refused to hand back its buffer: {}", err))?;
        if the_bytes.last() == Some(&b'\n') {
            the_bytes.pop();
        }
        Ok(String::from_utf8(the_bytes)?)
    }
}

/// 📏 `\n` and `\r\n` both map to the reader's CRLF mode (which accepts either);
/// any other single ASCII byte is taken literally.
fn record_terminator(record_delimiter: &str) -> Result<Terminator> {
    match record_delimiter.as_bytes() {
        b"\n" | b"\r\n" => Ok(Terminator::CRLF),
        [byte] if byte.is_ascii() => Ok(Terminator::Any(*byte)),
        _ => bail!(
            "💀 query.output.record_delimiter must be a single ASCII character or \\r\\n, got {:?}",
            record_delimiter
        ),
    }
}

fn ascii_byte(c: char, field: &str) -> Result<u8> {
    if !c.is_ascii() {
        bail!("💀 {} must be a single ASCII character, got {:?}", field, c);
    }
    Ok(c as u8)
}
