//! 🧾 Query model — what we ask S3 Select, and how we describe the bytes on both ends.
//!
//! 🎬 *[a gzipped CSV sits in a bucket. it has no header. it has opinions about quotes.]*
//! *[somewhere, a SQL expression waits to be sent across the wire.]*
//!
//! 🧠 Knowledge graph:
//! - `BucketKey`: one object key, produced by the enumerator, consumed by exactly one worker
//! - `QueryConfig`: the knobs (expression, mode, threshold, serialization) from `sift.toml`
//! - `QueryRequest`: one per key, read-only after `for_key()`. The backend turns it into SDK calls.
//!
//! 🦆 The duck does not speak SQL. It nods politely anyway.

use serde::{Deserialize, Serialize};

/// 🗝️ An object key inside the bucket. Immutable, owned, and consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 🎭 What a worker does with each decoded row.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowMode {
    /// 📊 parse the row as a number and bucket it over/under the threshold
    #[default]
    Classify,
    /// 🖨️ just print the row. no math. no judgement.
    Print,
}

/// 🫁 How the stored objects are squished.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Bzip2,
}

/// 📋 Whether the first line of each object is a header, and what S3 should do about it.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileHeaderInfo {
    /// 🙈 no header. columns are `_1`, `_2`, ... like anonymous witnesses.
    #[default]
    None,
    Ignore,
    Use,
}

/// 📥 Input side of the select: what the stored CSV looks like.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CsvInputConfig {
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub file_header_info: FileHeaderInfo,
    #[serde(default = "default_input_quote_character")]
    pub quote_character: String,
    #[serde(default = "default_allow_quoted_record_delimiter")]
    pub allow_quoted_record_delimiter: bool,
    #[serde(default)]
    pub field_delimiter: Option<String>,
    #[serde(default)]
    pub record_delimiter: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

// 🧷 single quote. the NMON exports that started all of this quote with `'`, so we do too.
fn default_input_quote_character() -> String {
    "'".to_string()
}

fn default_allow_quoted_record_delimiter() -> bool {
    true
}

impl Default for CsvInputConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            file_header_info: FileHeaderInfo::default(),
            quote_character: default_input_quote_character(),
            allow_quoted_record_delimiter: default_allow_quoted_record_delimiter(),
            field_delimiter: None,
            record_delimiter: None,
            comments: None,
        }
    }
}

/// 📤 Output side of the select: how S3 should hand the matching rows back.
///
/// The row decoder reads with the same `field_delimiter`, so whatever you pick
/// here is what the worker splits on. One knob, two ends of the pipe.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CsvOutputConfig {
    #[serde(default = "default_output_field_delimiter")]
    pub field_delimiter: char,
    #[serde(default = "default_output_record_delimiter")]
    pub record_delimiter: String,
    #[serde(default)]
    pub quote_character: Option<char>,
}

fn default_output_field_delimiter() -> char {
    ','
}

fn default_output_record_delimiter() -> String {
    "\n".to_string()
}

impl Default for CsvOutputConfig {
    fn default() -> Self {
        Self {
            field_delimiter: default_output_field_delimiter(),
            record_delimiter: default_output_record_delimiter(),
            quote_character: None,
        }
    }
}

/// 🔧 Everything about the query that isn't "which object".
///
/// Defaults reproduce the classic sweep: pull column 4 of every `NET` row out of
/// gzipped headerless CSV, then count values above 100.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueryConfig {
    #[serde(default = "default_expression")]
    pub expression: String,
    #[serde(default)]
    pub mode: RowMode,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub input: CsvInputConfig,
    #[serde(default)]
    pub output: CsvOutputConfig,
}

pub(crate) const DEFAULT_EXPRESSION: &str = "SELECT s._4 from S3Object AS s WHERE s._1 = 'NET'";

fn default_expression() -> String {
    DEFAULT_EXPRESSION.to_string()
}

// -- 💯 the line between "fine" and "Analytics Tripped". chosen by someone, long ago, for reasons.
fn default_threshold() -> f64 {
    100.0
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            expression: default_expression(),
            mode: RowMode::default(),
            threshold: default_threshold(),
            input: CsvInputConfig::default(),
            output: CsvOutputConfig::default(),
        }
    }
}

/// 📨 One select request, fully resolved for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub bucket: String,
    pub key: BucketKey,
    pub expression: String,
    pub input: CsvInputConfig,
    pub output: CsvOutputConfig,
}

impl QueryRequest {
    /// 🏗️ Stamp out the request for one key. Config is cloned in, never shared mutably.
    pub fn for_key(bucket: &str, key: BucketKey, query_config: &QueryConfig) -> Self {
        Self {
            bucket: bucket.to_string(),
            key,
            expression: query_config.expression.clone(),
            input: query_config.input.clone(),
            output: query_config.output.clone(),
        }
    }

    /// 🏷️ `s3://bucket/key`, for humans and log lines.
    pub fn label(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
