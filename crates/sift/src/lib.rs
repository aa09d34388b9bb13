//! 🔎 sift — point it at a bucket, it asks S3 Select the same question about every object
//! at once (well, sixteen at once), and tells you how many answers were too big.
//!
//! 🧠 Knowledge graph:
//! ```text
//!   app_config ──▶ run() ──▶ S3Backend::connect ──▶ Supervisor::sweep
//!                                                     ├─ enumerator (ListObjectsV2)
//!                                                     ├─ QueryWorker × N (SelectObjectContent)
//!                                                     │    └─ RowDecoder (csv, blocking pool)
//!                                                     └─ report (RunSummary)
//! ```

pub mod app_config;
pub mod enumerator;
pub mod query;
pub mod report;

mod backends;
mod classify;
mod console;
mod progress;
mod supervisors;

use anyhow::{Context, Result};
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::{Backend, S3Backend};
use crate::supervisors::Supervisor;

pub use crate::backends::s3::S3ClientConfig;
pub use crate::report::RunSummary;

/// 🚀 One full sweep: build the client, enumerate, query everything, print the summary.
///
/// 💀 `Err` means the run never got going (no region, bad client config, listing failed).
/// Objects that fail on their own are counted in `RunSummary::objects_failed` instead.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    let the_backend = S3Backend::connect(&app_config.s3)
        .await
        .context("💀 Could not set up the S3 client. Check REGION, credentials, and s3.endpoint_url.")?;
    info!("🪣 sweeping bucket '{}'", app_config.bucket);

    Supervisor::new(app_config, Backend::S3(the_backend))
        .sweep()
        .await
}
