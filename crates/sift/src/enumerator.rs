//! 📜 Bucket enumerator — who's in the bucket?
//!
//! Two modes, and the choice is yours, not ours:
//! - `FirstPage` (default): one listing call, whatever comes back is the roster. Buckets with
//!   more than a page of objects get a warning, not a silent fix.
//! - `All`: follow continuation tokens until the service runs out of pages.
//!
//! 💀 Any listing error is fatal for the run. No keys, no workers, no summary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backends::SelectBackend;
use crate::query::BucketKey;

/// 📄 How far down the listing we go.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingMode {
    #[default]
    FirstPage,
    All,
}

/// 🔧 Listing knobs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ListingConfig {
    #[serde(default)]
    pub mode: ListingMode,
    /// 🎯 only keys starting with this
    #[serde(default)]
    pub prefix: Option<String>,
}

/// 🚀 List the bucket according to `listing`.
pub(crate) async fn enumerate<B: SelectBackend + ?Sized>(
    backend: &B,
    listing: &ListingConfig,
    bucket: &str,
) -> Result<Vec<BucketKey>> {
    let mut the_keys = Vec::new();
    let mut the_token: Option<String> = None;
    let mut the_page_count = 0usize;

    loop {
        let the_page = backend
            .list_page(bucket, listing.prefix.as_deref(), the_token.take())
            .await
            .with_context(|| {
                format!(
                    "💀 Could not enumerate bucket '{}' (page {}). Nothing gets queried without a roster.",
                    bucket,
                    the_page_count + 1
                )
            })?;
        the_page_count += 1;
        debug!(
            "📄 page {} of '{}' brought {} keys",
            the_page_count,
            bucket,
            the_page.keys.len()
        );
        the_keys.extend(the_page.keys);

        match (listing.mode, the_page.next_token) {
            (_, None) => break,
            (ListingMode::All, Some(token)) => the_token = Some(token),
            (ListingMode::FirstPage, Some(_)) => {
                warn!(
                    "⚠️ bucket '{}' has more than one page of objects; only the first {} keys will be queried. \
                     Set `listing.mode = \"all\"` (or pass --enumerate-all) to sweep everything.",
                    bucket,
                    the_keys.len()
                );
                break;
            }
        }
    }

    info!(
        "📜 enumerated {} keys in '{}' across {} page(s)",
        the_keys.len(),
        bucket,
        the_page_count
    );
    Ok(the_keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryBackend, ScriptedObject};

    fn five_object_bucket() -> InMemoryBackend {
        ["a.csv.gz", "b.csv.gz", "c.csv.gz", "logs/d.csv.gz", "logs/e.csv.gz"]
            .iter()
            .fold(InMemoryBackend::new("nmon"), |backend, key| {
                backend.with_object(key, ScriptedObject::csv(&[], 0))
            })
            .with_page_size(2)
    }

    #[tokio::test]
    async fn the_one_where_first_page_mode_stops_after_one_call() {
        let the_backend = five_object_bucket();
        let the_keys = enumerate(&the_backend, &ListingConfig::default(), "nmon")
            .await
            .expect("💀 first-page listing should work");

        assert_eq!(the_keys, vec![BucketKey::new("a.csv.gz"), BucketKey::new("b.csv.gz")]);
        assert_eq!(the_backend.list_calls(), 1);
    }

    #[tokio::test]
    async fn the_one_where_all_mode_follows_every_token_to_the_end() {
        let the_backend = five_object_bucket();
        let the_listing = ListingConfig {
            mode: ListingMode::All,
            prefix: None,
        };

        let the_keys = enumerate(&the_backend, &the_listing, "nmon")
            .await
            .expect("💀 full listing should work");

        assert_eq!(the_keys.len(), 5);
        assert_eq!(the_backend.list_calls(), 3);
    }

    #[tokio::test]
    async fn the_one_where_the_prefix_narrows_the_roster() {
        let the_backend = five_object_bucket();
        let the_listing = ListingConfig {
            mode: ListingMode::All,
            prefix: Some("logs/".to_string()),
        };

        let the_keys = enumerate(&the_backend, &the_listing, "nmon")
            .await
            .expect("💀 prefixed listing should work");

        assert_eq!(
            the_keys,
            vec![BucketKey::new("logs/d.csv.gz"), BucketKey::new("logs/e.csv.gz")]
        );
    }

    #[tokio::test]
    async fn the_one_where_an_empty_bucket_is_a_valid_empty_roster() {
        let the_backend = InMemoryBackend::new("empty");
        let the_keys = enumerate(&the_backend, &ListingConfig::default(), "empty")
            .await
            .expect("💀 empty buckets are not errors");
        assert!(the_keys.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_listing_failure_is_fatal_and_says_which_bucket() {
        let the_backend = InMemoryBackend::new("nmon").with_listing_error("AccessDenied");

        let the_error = enumerate(&the_backend, &ListingConfig::default(), "nmon")
            .await
            .expect_err("💀 a failed listing must not look like an empty bucket");

        let the_chain = format!("{:#}", the_error);
        assert!(the_chain.contains("Could not enumerate bucket 'nmon'"));
        assert!(the_chain.contains("AccessDenied"));
    }
}
