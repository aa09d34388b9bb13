//! 🪣📡 S3 Backend — list the bucket, fire S3 Select, translate the event stream.
//!
//! COLD OPEN — EXT. us-east-1 — 3:47 AM
//!
//! A bucket full of gzipped NMON exports. Nobody wants to download them. Nobody
//! wants to gunzip them. Somebody remembered that S3 can run SQL on objects where
//! they sit and stream back only the rows that match. The somebody was right.
//!
//! 🧠 Knowledge graph:
//! - `S3ClientConfig`: region / endpoint / path-style, co-located with the backend that uses it
//! - Transport: `ListObjectsV2` for pages, `SelectObjectContent` for queries
//! - The SDK's `SelectObjectContentEventStream` is mapped to our `SelectEvent` in `map_event()`
//!   and never escapes this file
//! - SDK errors are rendered with `DisplayErrorContext` so the actual cause shows up,
//!   not just "service error" (thanks, very helpful)

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{
    CompressionType, CsvInput, CsvOutput, ExpressionType, FileHeaderInfo as S3FileHeaderInfo,
    InputSerialization, OutputSerialization, SelectObjectContentEventStream,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backends::{ListPage, ProgressNotification, SelectBackend, SelectEvent, SelectEventStream};
use crate::query::{BucketKey, Compression, CsvInputConfig, CsvOutputConfig, FileHeaderInfo, QueryRequest};

/// 🔧 How to reach S3.
///
/// `region` is usually filled from the `REGION` env var by the config layer. Leave
/// everything else alone unless you're pointing at LocalStack or MinIO.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct S3ClientConfig {
    #[serde(default)]
    pub region: Option<String>,
    /// 🧪 custom endpoint (LocalStack, MinIO, a wiremock in a test)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

/// 🪣 The real thing. Holds one SDK client; clones are cheap (it's `Arc`s all the way down).
#[derive(Debug, Clone)]
pub(crate) struct S3Backend {
    client: Client,
}

impl S3Backend {
    /// 🚀 Build the client from the ambient AWS environment plus our overrides.
    ///
    /// 💀 Fails if no region can be resolved. Without one every call would fail anyway,
    /// so we'd rather say so before listing anything.
    pub(crate) async fn connect(config: &S3ClientConfig) -> Result<Self> {
        let mut the_loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            the_loader = the_loader.region(Region::new(region.clone()));
        }
        let the_sdk_config = the_loader.load().await;

        if the_sdk_config.region().is_none() {
            bail!(
                "💀 No AWS region resolved. Set REGION (or AWS_REGION, or `s3.region` in the config). \
                 S3 needs to know which continent to disappoint."
            );
        }

        let mut the_builder = aws_sdk_s3::config::Builder::from(&the_sdk_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            the_builder = the_builder.endpoint_url(endpoint);
        }

        debug!(
            "🪣 S3 client ready (region: {:?}, endpoint: {:?})",
            the_sdk_config.region(),
            config.endpoint_url
        );
        Ok(Self::from_client(Client::from_conf(the_builder.build())))
    }

    pub(crate) fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SelectBackend for S3Backend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let the_response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "💀 ListObjectsV2 failed for bucket '{}'. Check the bucket name, region and credentials: {}",
                    bucket,
                    DisplayErrorContext(&err)
                )
            })?;

        let keys = the_response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(BucketKey::new)
            .collect();

        let next_token = if the_response.is_truncated().unwrap_or(false) {
            the_response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    async fn select(&self, request: &QueryRequest) -> Result<SelectEventStream> {
        let the_label = request.label();
        let the_output = self
            .client
            .select_object_content()
            .bucket(&request.bucket)
            .key(request.key.as_str())
            .expression(&request.expression)
            .expression_type(ExpressionType::Sql)
            .input_serialization(input_serialization(&request.input))
            .output_serialization(output_serialization(&request.output))
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "💀 SelectObjectContent was rejected for {}: {}",
                    the_label,
                    DisplayErrorContext(&err)
                )
            })?;

        // 🔄 EventReceiver → Stream. One recv() per poll, unmapped events skipped,
        // and the first error ends the stream (the receiver is dropped with it).
        let the_stream = futures::stream::unfold(
            Some((the_output.payload, the_label)),
            |state| async move {
                let (mut receiver, label) = state?;
                loop {
                    match receiver.recv().await {
                        Ok(Some(event)) => {
                            if let Some(mapped) = map_event(event) {
                                return Some((Ok(mapped), Some((receiver, label))));
                            }
                        }
                        Ok(None) => return None,
                        Err(err) => {
                            let the_error = anyhow!(
                                "💀 event stream for {} broke mid-flight: {}",
                                label,
                                DisplayErrorContext(&err)
                            );
                            return Some((Err(the_error), None));
                        }
                    }
                }
            },
        );

        Ok(the_stream.boxed())
    }
}

/// 🔁 SDK event → our event. `None` means "nothing the worker needs to see".
pub(crate) fn map_event(event: SelectObjectContentEventStream) -> Option<SelectEvent> {
    match event {
        SelectObjectContentEventStream::Records(records) => Some(SelectEvent::Records(
            records.payload.map(|blob| blob.into_inner()).unwrap_or_default(),
        )),
        SelectObjectContentEventStream::Stats(stats) => {
            let the_details = stats.details();
            Some(SelectEvent::Stats(ProgressNotification {
                bytes_scanned: counter(the_details.and_then(|d| d.bytes_scanned())),
                bytes_processed: counter(the_details.and_then(|d| d.bytes_processed())),
                bytes_returned: counter(the_details.and_then(|d| d.bytes_returned())),
            }))
        }
        SelectObjectContentEventStream::Progress(progress) => {
            let the_details = progress.details();
            Some(SelectEvent::Progress(ProgressNotification {
                bytes_scanned: counter(the_details.and_then(|d| d.bytes_scanned())),
                bytes_processed: counter(the_details.and_then(|d| d.bytes_processed())),
                bytes_returned: counter(the_details.and_then(|d| d.bytes_returned())),
            }))
        }
        SelectObjectContentEventStream::End(_) => Some(SelectEvent::End),
        // -- 💓 keep-alive. S3 is just checking we're still here. we are.
        SelectObjectContentEventStream::Cont(_) => {
            trace!("💓 continuation event");
            None
        }
        other => {
            debug!("🤷 ignoring an event kind this build doesn't know: {:?}", other);
            None
        }
    }
}

// 📏 S3 counters are i64 on the wire. negative byte counts are not a thing we entertain.
fn counter(raw: Option<i64>) -> u64 {
    raw.and_then(|value| u64::try_from(value).ok()).unwrap_or(0)
}

fn input_serialization(input: &CsvInputConfig) -> InputSerialization {
    let the_header_info = match input.file_header_info {
        FileHeaderInfo::None => S3FileHeaderInfo::None,
        FileHeaderInfo::Ignore => S3FileHeaderInfo::Ignore,
        FileHeaderInfo::Use => S3FileHeaderInfo::Use,
    };
    let the_compression = match input.compression {
        Compression::None => CompressionType::None,
        Compression::Gzip => CompressionType::Gzip,
        Compression::Bzip2 => CompressionType::Bzip2,
    };

    let the_csv = CsvInput::builder()
        .file_header_info(the_header_info)
        .quote_character(&input.quote_character)
        .allow_quoted_record_delimiter(input.allow_quoted_record_delimiter)
        .set_field_delimiter(input.field_delimiter.clone())
        .set_record_delimiter(input.record_delimiter.clone())
        .set_comments(input.comments.clone())
        .build();

    InputSerialization::builder()
        .csv(the_csv)
        .compression_type(the_compression)
        .build()
}

fn output_serialization(output: &CsvOutputConfig) -> OutputSerialization {
    let the_csv = CsvOutput::builder()
        .field_delimiter(output.field_delimiter.to_string())
        .record_delimiter(&output.record_delimiter)
        .set_quote_character(output.quote_character.map(|c| c.to_string()))
        .build();

    OutputSerialization::builder().csv(the_csv).build()
}
