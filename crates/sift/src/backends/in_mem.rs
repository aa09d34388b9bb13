//! 🧪 In-memory backend — a bucket that lives in RAM and a select service that reads from a script.
//!
//! ⚠️ This is NOT for production. This is for tests. It is compiled only under `cfg(test)`
//! so nobody accidentally points a sweep at it and wonders why the bucket is so small.
//!
//! Each object gets a `ScriptedObject`: either the submission is rejected outright, or the
//! stream plays back a fixed list of events (and errors). Call counters let tests check
//! that nobody called `select` when they shouldn't have.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use futures::StreamExt;

use crate::backends::{
    ListPage, ProgressNotification, SelectBackend, SelectEvent, SelectEventStream,
};
use crate::query::{BucketKey, QueryRequest};

/// 🎬 What happens when someone selects from this object.
#[derive(Debug, Clone)]
pub(crate) enum ScriptedObject {
    /// 📼 play these back in order. `Err(msg)` items become stream errors.
    Events(Vec<Result<SelectEvent, String>>),
    /// 🚫 the request never makes it past the front desk
    RejectSubmission(String),
}

impl ScriptedObject {
    /// 🧾 The happy path: CSV chunks, one stats event, a clean end.
    pub(crate) fn csv(chunks: &[&str], bytes_processed: u64) -> Self {
        let mut the_events: Vec<Result<SelectEvent, String>> = chunks
            .iter()
            .map(|chunk| Ok(SelectEvent::Records(chunk.as_bytes().to_vec())))
            .collect();
        the_events.push(Ok(SelectEvent::Stats(ProgressNotification {
            bytes_scanned: bytes_processed,
            bytes_processed,
            bytes_returned: chunks.iter().map(|c| c.len() as u64).sum(),
        })));
        the_events.push(Ok(SelectEvent::End));
        Self::Events(the_events)
    }
}

#[derive(Debug, Default)]
struct Calls {
    list: AtomicUsize,
    select: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct InMemoryBackend {
    bucket: String,
    objects: Arc<BTreeMap<BucketKey, ScriptedObject>>,
    page_size: usize,
    listing_error: Option<String>,
    calls: Arc<Calls>,
}

impl InMemoryBackend {
    pub(crate) fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::new(BTreeMap::new()),
            page_size: 1000,
            listing_error: None,
            calls: Arc::new(Calls::default()),
        }
    }

    pub(crate) fn with_object(mut self, key: &str, script: ScriptedObject) -> Self {
        Arc::make_mut(&mut self.objects).insert(BucketKey::new(key), script);
        self
    }

    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub(crate) fn with_listing_error(mut self, message: &str) -> Self {
        self.listing_error = Some(message.to_string());
        self
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.calls.list.load(Ordering::SeqCst)
    }

    pub(crate) fn select_calls(&self) -> usize {
        self.calls.select.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SelectBackend for InMemoryBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.listing_error {
            bail!("💀 listing '{}' failed: {}", bucket, message);
        }
        if bucket != self.bucket {
            bail!("💀 NoSuchBucket: '{}'", bucket);
        }

        // 🔖 the token is just the offset. very secure. much opaque.
        let the_offset: usize = match continuation_token {
            Some(token) => token
                .parse()
                .map_err(|_| anyhow!("💀 bogus continuation token '{}'", token))?,
            None => 0,
        };

        let the_matching: Vec<BucketKey> = self
            .objects
            .keys()
            .filter(|key| prefix.is_none_or(|p| key.as_str().starts_with(p)))
            .cloned()
            .collect();

        let the_end = (the_offset + self.page_size).min(the_matching.len());
        let keys = the_matching
            .get(the_offset..the_end)
            .map(<[BucketKey]>::to_vec)
            .unwrap_or_default();
        let next_token = (the_end < the_matching.len()).then(|| the_end.to_string());

        Ok(ListPage { keys, next_token })
    }

    async fn select(&self, request: &QueryRequest) -> Result<SelectEventStream> {
        self.calls.select.fetch_add(1, Ordering::SeqCst);
        let the_script = self
            .objects
            .get(&request.key)
            .ok_or_else(|| anyhow!("💀 NoSuchKey: {}", request.label()))?;

        match the_script {
            ScriptedObject::RejectSubmission(message) => {
                bail!("💀 SelectObjectContent was rejected for {}: {}", request.label(), message)
            }
            ScriptedObject::Events(events) => {
                let the_events: Vec<Result<SelectEvent>> = events
                    .iter()
                    .cloned()
                    .map(|event| event.map_err(|message| anyhow!(message)))
                    .collect();
                Ok(futures::stream::iter(the_events).boxed())
            }
        }
    }
}
