//! 🎬 *[camera pans across a bucket with four thousand objects in it]*
//! 🎬 "In a world where every object needs a query..."
//! 🎬 "One supervisor dared to launch them all. (Sixteen at a time. It has boundaries now.)"
//!
//! 📦 The Supervisor — enumerates the bucket, launches one `QueryWorker` per key behind
//! a semaphore, waits for every single one, and folds their receipts into the summary.
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB. Like Fight Club, but for async tasks.

mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::app_config::AppConfig;
use crate::backends::Backend;
use crate::console::Console;
use crate::enumerator::enumerate;
use crate::progress::RunProgress;
use crate::query::QueryRequest;
use crate::report::RunSummary;
use workers::{QueryWorker, RowDecoder, Worker};

/// 📦 Hovers over the workers asking "is it done yet?" until it is.
pub(crate) struct Supervisor {
    app_config: AppConfig,
    backend: Backend,
    /// 🧪 replaces stdout when set
    console: Option<Console>,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig, backend: Backend) -> Self {
        Self {
            app_config,
            backend,
            console: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_console(mut self, console: Console) -> Self {
        self.console = Some(console);
        self
    }

    /// 🧵 The whole run: enumerate → fan out → join → fold → print.
    ///
    /// 💀 Returns `Err` only for fatal problems (bad decoder settings, failed listing).
    /// Per-object failures are inside the summary's `objects_failed`.
    pub(crate) async fn sweep(&self) -> Result<RunSummary> {
        let the_config = &self.app_config;
        let the_decoder = RowDecoder::from_query_config(&the_config.query)
            .context("💀 The query output settings can't be decoded locally")?;

        let the_keys = enumerate(&self.backend, &the_config.listing, &the_config.bucket).await?;

        let the_progress = RunProgress::new(
            the_keys.len() as u64,
            the_config.runtime.show_progress && self.console.is_none(),
        );
        let the_console = self
            .console
            .clone()
            .unwrap_or_else(|| Console::Stdout(the_progress.clone()));

        // 🚦 0 = no limit, the way it used to be. anything else = that many queries in flight.
        let the_limiter = match the_config.runtime.max_concurrent_queries {
            0 => None,
            limit => Some(Arc::new(Semaphore::new(limit))),
        };
        info!(
            "🚀 launching {} queries against '{}' ({} at a time)",
            the_keys.len(),
            the_config.bucket,
            match the_config.runtime.max_concurrent_queries {
                0 => "all".to_string(),
                limit => limit.to_string(),
            }
        );

        let mut the_handles = Vec::with_capacity(the_keys.len());
        for key in the_keys {
            the_console.line(key.as_str());
            let the_permit = match &the_limiter {
                Some(limiter) => Some(
                    limiter
                        .clone()
                        .acquire_owned()
                        .await
                        .context("💀 the concurrency limiter was closed mid-sweep")?,
                ),
                None => None,
            };
            let the_request = QueryRequest::for_key(&the_config.bucket, key, &the_config.query);
            let the_worker = QueryWorker::new(
                self.backend.clone(),
                the_request,
                the_decoder,
                the_console.clone(),
                the_progress.clone(),
                the_permit,
            );
            the_handles.push(the_worker.start());
        }

        // ⏳ everyone comes home before anyone counts anything
        let mut the_summary = RunSummary::empty(the_config.query.mode);
        for outcome in futures::future::join_all(the_handles).await {
            match outcome {
                Ok(tally) => the_summary.absorb(&tally),
                Err(join_err) => {
                    error!("💀 a query worker vanished without a receipt: {}", join_err);
                    the_summary.absorb_lost_worker();
                }
            }
        }

        the_progress.finish();
        the_console.line(the_summary.render().to_string());
        Ok(the_summary)
    }
}
