//! 🎬 *[one object. one query. one worker, staring at an event stream.]*
//! *[somewhere upstream, S3 is gunzipping a CSV so we don't have to.]*
//!
//! 🔎 The QueryWorker — submits a select for one key, pipes the record chunks into a
//! blocking CSV decoder, counts what S3 says it processed, and hands back an `ObjectTally`.
//!
//! 🧠 Knowledge graph:
//! ```text
//!   backend.select() ──▶ forward_events (tokio task) ──chan(1)──▶ RowDecoder (blocking pool)
//!                              │ Stats → bytes + "Processed N megabytes"      │ rows → over/under/print
//!                              ▼                                              ▼
//!                          Forwarded ─────────────── joined ───────────── RowTally
//!                                                      ▼
//!                                                 ObjectTally
//! ```
//! - Submission failure: logged, tally marked failed, worker still returns.
//! - Stream failure: logged after the pipe drains, bytes seen so far are kept.
//! - The concurrency permit (if any) is held until the tally is ready.

use anyhow::anyhow;
use async_channel::Sender;
use futures::StreamExt;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::Worker;
use super::row_decoder::{ChannelReader, RowDecoder, RowTally};
use crate::backends::{Backend, SelectBackend, SelectEvent, SelectEventStream};
use crate::console::Console;
use crate::progress::RunProgress;
use crate::query::QueryRequest;
use crate::report::{MIB, ObjectTally};

/// 🔎 One object, start to finish.
#[derive(Debug)]
pub(crate) struct QueryWorker {
    backend: Backend,
    request: QueryRequest,
    decoder: RowDecoder,
    console: Console,
    progress: RunProgress,
    permit: Option<OwnedSemaphorePermit>,
}

impl QueryWorker {
    pub(crate) fn new(
        backend: Backend,
        request: QueryRequest,
        decoder: RowDecoder,
        console: Console,
        progress: RunProgress,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            backend,
            request,
            decoder,
            console,
            progress,
            permit,
        }
    }

    async fn run(self) -> ObjectTally {
        let QueryWorker {
            backend,
            request,
            decoder,
            console,
            progress,
            permit,
        } = self;
        let the_label = request.label();
        let mut tally = ObjectTally::new(request.key.clone());

        let the_stream = match backend.select(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                error!("💀 failed making API request for {}, {:#}", the_label, err);
                tally.mark_failed();
                progress.object_finished();
                drop(permit);
                return tally;
            }
        };

        // 📮 capacity 1: the forwarder waits for the decoder to take each chunk
        let (tx, rx) = async_channel::bounded::<Vec<u8>>(1);
        let the_forwarder = tokio::spawn(forward_events(
            the_stream,
            tx,
            console.clone(),
            progress.clone(),
        ));
        let the_decoder_console = console.clone();
        let the_decoding = tokio::task::spawn_blocking(move || {
            decoder.decode(ChannelReader::new(rx), &the_decoder_console)
        });

        let the_rows = match the_decoding.await {
            Ok(rows) => rows,
            Err(join_err) => {
                error!("💀 row decoder for {} died: {}", the_label, join_err);
                tally.mark_failed();
                RowTally::default()
            }
        };
        let the_forwarded = match the_forwarder.await {
            Ok(forwarded) => forwarded,
            Err(join_err) => Forwarded {
                error: Some(anyhow!("event forwarder died: {}", join_err)),
                ..Forwarded::default()
            },
        };

        tally.bytes_processed = the_forwarded.bytes_processed;
        tally.over_threshold = the_rows.over_threshold;
        tally.under_threshold = the_rows.under_threshold;
        tally.rows_printed = the_rows.rows_printed;

        if let Some(err) = the_forwarded.error {
            error!("💀 reading from event stream failed for {}, {:#}", the_label, err);
            tally.mark_failed();
        } else if !the_forwarded.saw_end {
            warn!(
                "⚠️ event stream for {} closed without an End event; its rows may be incomplete",
                the_label
            );
        }
        debug!(
            "🏁 {} done: {} bytes processed, {} over, {} under, {} skipped",
            the_label,
            tally.bytes_processed,
            tally.over_threshold,
            tally.under_threshold,
            the_rows.rows_skipped
        );

        progress.object_finished();
        drop(permit);
        tally
    }
}

impl Worker for QueryWorker {
    type Output = ObjectTally;

    fn start(self) -> JoinHandle<ObjectTally> {
        tokio::spawn(self.run())
    }
}

/// 📦 What the forwarding side learned from the event stream.
#[derive(Debug, Default)]
struct Forwarded {
    bytes_processed: u64,
    saw_end: bool,
    error: Option<anyhow::Error>,
}

/// 🚚 Drain the event stream. Record chunks go down the pipe untouched, stats get counted.
/// Dropping `tx` on return is what tells the decoder the object is finished.
async fn forward_events(
    mut stream: SelectEventStream,
    tx: Sender<Vec<u8>>,
    console: Console,
    progress: RunProgress,
) -> Forwarded {
    let mut forwarded = Forwarded::default();
    while let Some(item) = stream.next().await {
        match item {
            Ok(SelectEvent::Records(payload)) => {
                if payload.is_empty() {
                    continue;
                }
                trace!("📦 forwarding {} record bytes", payload.len());
                if tx.send(payload).await.is_err() {
                    forwarded.error = Some(anyhow!("row decoder hung up before the stream ended"));
                    break;
                }
            }
            Ok(SelectEvent::Stats(stats)) => {
                forwarded.bytes_processed += stats.bytes_processed;
                progress.record_bytes(stats.bytes_processed);
                console.line(format!(
                    "Processed {} megabytes",
                    stats.bytes_processed / MIB
                ));
            }
            Ok(SelectEvent::Progress(progress_so_far)) => {
                debug!(
                    "⏳ query progress: {} bytes processed so far",
                    progress_so_far.bytes_processed
                );
            }
            Ok(SelectEvent::End) => forwarded.saw_end = true,
            Err(err) => {
                forwarded.error = Some(err);
                break;
            }
        }
    }
    forwarded
}
