//! 🔌 Backends — where the real I/O happens (and where we politely make S3 do the work).
//!
//! 🚰 A backend can list a bucket one page at a time and open a select query on an
//! object. The query comes back as a stream of [`SelectEvent`]s. Everything past that
//! point (pipes, CSV, counting) is the worker's problem, not ours.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`S3Backend`, test-only `InMemoryBackend`) → `Backend` enum
//! - `SelectEvent` is a closed enum. New event kind? Add a variant, rustc shows you every match.
//! - The SDK's own event type is mapped in `s3.rs` and never leaks past this module.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::query::{BucketKey, QueryRequest};

pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod in_mem;

pub(crate) use s3::S3Backend;
#[cfg(test)]
pub(crate) use in_mem::{InMemoryBackend, ScriptedObject};

/// 📈 Byte counters the service reports about a running (or finished) query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressNotification {
    pub bytes_scanned: u64,
    pub bytes_processed: u64,
    pub bytes_returned: u64,
}

/// 📡 One item off a select query's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectEvent {
    /// 📦 a chunk of output rows. opaque bytes; may split a row anywhere.
    Records(Vec<u8>),
    /// 📊 byte counters for the query. these are what the totals add up.
    Stats(ProgressNotification),
    /// ⏳ periodic cumulative counters, only sent when progress reporting is requested
    Progress(ProgressNotification),
    /// 🏁 the service says it is done. a stream that closes without this was cut short.
    End,
}

/// 🌊 The event stream for one query. `'static` so it can move into a forwarding task.
pub type SelectEventStream = BoxStream<'static, Result<SelectEvent>>;

/// 📄 One page of a bucket listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    pub keys: Vec<BucketKey>,
    /// 🔖 `Some` when the service has more pages to give
    pub next_token: Option<String>,
}

/// 🪣 Anything that can list a bucket and run select queries against its objects.
///
/// # Contract 📜
/// - `list_page` returns one page. Paging policy belongs to the enumerator.
/// - `select` returns `Err` if the request could not be submitted at all. Errors that
///   happen after submission arrive as `Err` items inside the stream.
#[async_trait]
pub(crate) trait SelectBackend: std::fmt::Debug + Send + Sync {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    async fn select(&self, request: &QueryRequest) -> Result<SelectEventStream>;
}

/// 🎭 The many faces of a backend. Callers hold this and never care which one it is.
#[derive(Debug, Clone)]
pub(crate) enum Backend {
    S3(S3Backend),
    #[cfg(test)]
    InMemory(InMemoryBackend),
}

#[async_trait]
impl SelectBackend for Backend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        match self {
            Backend::S3(s3) => s3.list_page(bucket, prefix, continuation_token).await,
            #[cfg(test)]
            Backend::InMemory(mem) => mem.list_page(bucket, prefix, continuation_token).await,
        }
    }

    async fn select(&self, request: &QueryRequest) -> Result<SelectEventStream> {
        match self {
            Backend::S3(s3) => s3.select(request).await,
            #[cfg(test)]
            Backend::InMemory(mem) => mem.select(request).await,
        }
    }
}
