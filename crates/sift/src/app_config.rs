//! 🔧 App Configuration — env, TOML, and flags, layered like a lasagna nobody asked for.
//!
//! 📡 "Which region are we in?" "The one in the `REGION` env var." "And if it's not set?"
//! "Then we fail loudly, before a single byte leaves the building." 🦆
//!
//! 🧠 Knowledge graph (later layers win):
//! ```text
//!   REGION ──▶ s3.region
//!   SIFT_*  (SIFT_QUERY__THRESHOLD=250 → query.threshold)
//!   sift.toml (optional)
//!   CLI flags (ConfigOverrides)
//! ```

use std::path::Path;

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backends::s3::S3ClientConfig;
use crate::enumerator::{ListingConfig, ListingMode};
use crate::query::{QueryConfig, RowMode};

/// 📦 Everything one sweep needs to know about itself.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// 🪣 the bucket to sweep
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub s3: S3ClientConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🚦 How hard we lean on the service.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 🔢 queries in flight at once. 0 = one per object, all at the same time.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// 📊 progress bar on stderr
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            show_progress: default_show_progress(),
        }
    }
}

fn default_bucket() -> String {
    "seselect-test".to_string()
}

fn default_max_concurrent_queries() -> usize {
    16
}

fn default_show_progress() -> bool {
    true
}

/// 🎛️ Command-line overrides. `None`/`false` means "the flag wasn't passed, leave it alone".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub expression: Option<String>,
    pub enumerate_all: bool,
    pub max_concurrent_queries: Option<usize>,
    pub mode: Option<RowMode>,
    pub no_progress: bool,
}

impl ConfigOverrides {
    fn layer_onto(&self, figment: Figment) -> Figment {
        let mut figment = figment;
        if let Some(bucket) = &self.bucket {
            figment = figment.merge(Serialized::default("bucket", bucket));
        }
        if let Some(prefix) = &self.prefix {
            figment = figment.merge(Serialized::default("listing.prefix", prefix));
        }
        if let Some(expression) = &self.expression {
            figment = figment.merge(Serialized::default("query.expression", expression));
        }
        if self.enumerate_all {
            figment = figment.merge(Serialized::default("listing.mode", ListingMode::All));
        }
        if let Some(limit) = self.max_concurrent_queries {
            figment = figment.merge(Serialized::default("runtime.max_concurrent_queries", limit));
        }
        if let Some(mode) = self.mode {
            figment = figment.merge(Serialized::default("query.mode", mode));
        }
        if self.no_progress {
            figment = figment.merge(Serialized::default("runtime.show_progress", false));
        }
        figment
    }
}

/// 🚀 Load the config: env, then the optional TOML file, then CLI flags.
///
/// 📐 No file → env + flags only. The CLI decides whether `sift.toml` exists before
/// handing it over, so a missing default file is not an error here.
///
/// 💀 Unparseable input, an empty bucket name, or a threshold that isn't a number
/// all fail before any client gets built.
pub fn load_config(
    config_file_name: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new()
        .merge(Env::raw().only(&["REGION"]).map(|_| "s3.region".into()))
        .merge(Env::prefixed("SIFT_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };
    let config = overrides.layer_onto(config);

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables (REGION, SIFT_*) \
             and command-line flags.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (REGION, SIFT_*) \
                 and command-line flags. No file was provided."
            .to_string(),
    };
    let app_config: AppConfig = config.extract().context(context_msg)?;
    validate(&app_config)?;
    Ok(app_config)
}

fn validate(app_config: &AppConfig) -> anyhow::Result<()> {
    if app_config.bucket.trim().is_empty() {
        bail!("💀 No bucket configured. Set `bucket` in the config file, SIFT_BUCKET, or --bucket.");
    }
    if app_config.query.expression.trim().is_empty() {
        bail!("💀 The query expression is empty. S3 will not guess what you meant.");
    }
    if !app_config.query.threshold.is_finite() {
        bail!(
            "💀 query.threshold must be a finite number, got {}",
            app_config.query.threshold
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Compression, DEFAULT_EXPRESSION};
    use figment::Jail;

    #[test]
    fn the_one_where_nothing_is_configured_and_the_defaults_hold_the_fort() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let app_config = load_config(None, &ConfigOverrides::default())
                .expect("💀 defaults alone should be a valid config");

            assert_eq!(app_config.bucket, "seselect-test");
            assert_eq!(app_config.s3.region, None);
            assert_eq!(app_config.listing.mode, ListingMode::FirstPage);
            assert_eq!(app_config.query.expression, DEFAULT_EXPRESSION);
            assert_eq!(app_config.query.input.compression, Compression::Gzip);
            assert_eq!(app_config.runtime, RuntimeConfig::default());
            assert_eq!(app_config.runtime.max_concurrent_queries, 16);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_region_comes_from_plain_old_region() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("REGION", "eu-west-1");
            jail.set_env("SIFT_QUERY__THRESHOLD", "250");
            jail.set_env("SIFT_BUCKET", "nmon-archive");

            let app_config = load_config(None, &ConfigOverrides::default())
                .expect("💀 env-only config should parse");

            assert_eq!(app_config.s3.region.as_deref(), Some("eu-west-1"));
            assert_eq!(app_config.query.threshold, 250.0);
            assert_eq!(app_config.bucket, "nmon-archive");
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_file_beats_env_and_the_flags_beat_the_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SIFT_BUCKET", "from-env");
            jail.create_file(
                "sift.toml",
                r#"
                bucket = "from-file"

                [s3]
                region = "us-east-2"
                endpoint_url = "http://localhost:9000"
                force_path_style = true

                [listing]
                mode = "first_page"
                prefix = "2024/"

                [query]
                mode = "print"

                [runtime]
                max_concurrent_queries = 4
                "#,
            )?;

            let the_overrides = ConfigOverrides {
                expression: Some("SELECT * FROM S3Object".to_string()),
                enumerate_all: true,
                no_progress: true,
                ..ConfigOverrides::default()
            };
            let app_config = load_config(Some(Path::new("sift.toml")), &the_overrides)
                .expect("💀 file + flags should parse");

            assert_eq!(app_config.bucket, "from-file");
            assert_eq!(app_config.s3.endpoint_url.as_deref(), Some("http://localhost:9000"));
            assert!(app_config.s3.force_path_style);
            assert_eq!(app_config.listing.prefix.as_deref(), Some("2024/"));
            assert_eq!(app_config.listing.mode, ListingMode::All);
            assert_eq!(app_config.query.mode, RowMode::Print);
            assert_eq!(app_config.query.expression, "SELECT * FROM S3Object");
            assert_eq!(app_config.runtime.max_concurrent_queries, 4);
            assert!(!app_config.runtime.show_progress);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_every_flag_gets_its_say() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let the_overrides = ConfigOverrides {
                bucket: Some("flag-bucket".to_string()),
                prefix: Some("host-".to_string()),
                max_concurrent_queries: Some(0),
                mode: Some(RowMode::Print),
                ..ConfigOverrides::default()
            };

            let app_config = load_config(None, &the_overrides).expect("💀 flags should parse");

            assert_eq!(app_config.bucket, "flag-bucket");
            assert_eq!(app_config.listing.prefix.as_deref(), Some("host-"));
            assert_eq!(app_config.runtime.max_concurrent_queries, 0);
            assert_eq!(app_config.query.mode, RowMode::Print);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_an_empty_bucket_name_is_sent_home_early() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let the_overrides = ConfigOverrides {
                bucket: Some("   ".to_string()),
                ..ConfigOverrides::default()
            };

            let the_error = load_config(None, &the_overrides)
                .expect_err("💀 a blank bucket is not a bucket");
            assert!(the_error.to_string().contains("No bucket configured"));
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_toml_is_garbage_and_the_error_says_which_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("broken.toml", "[runtime]\nmax_concurrent_queries = \"lots\"\n")?;

            let the_error = load_config(Some(Path::new("broken.toml")), &ConfigOverrides::default())
                .expect_err("💀 'lots' is not a usize");
            assert!(format!("{:#}", the_error).contains("broken.toml"));
            Ok(())
        });
    }
}
