//! 🚀 sift-cli — the front door. Parses flags, loads config, sets up logging,
//! then hands the bucket over to the library and waits for the verdict.
//!
//! 🎬 *[narrator voice]* "Somewhere in a bucket, an NMON file was about to be judged..."
//! 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sift::app_config::ConfigOverrides;
use sift::query::RowMode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🔎 Run an S3 Select query against every object in a bucket and tally the results.
#[derive(Debug, Parser)]
#[command(name = "sift", version, about)]
struct Args {
    /// 📄 TOML config file. Used only if it exists.
    #[arg(long, default_value = "sift.toml")]
    config: PathBuf,

    /// 🪣 Bucket to sweep (overrides `bucket`)
    #[arg(long)]
    bucket: Option<String>,

    /// 🔖 Only objects whose key starts with this
    #[arg(long)]
    prefix: Option<String>,

    /// 🧾 SQL expression sent with every select request
    #[arg(long)]
    expression: Option<String>,

    /// 📚 Follow listing pages until the bucket runs out, instead of stopping at the first
    #[arg(long)]
    enumerate_all: bool,

    /// 🚦 Queries in flight at once (0 = no limit)
    #[arg(long)]
    max_concurrent_queries: Option<usize>,

    /// 🎛️ What to do with each returned row
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// 🔇 Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// count rows over/under the threshold
    Classify,
    /// print every row as-is
    Print,
}

impl From<ModeArg> for RowMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Classify => RowMode::Classify,
            ModeArg::Print => RowMode::Print,
        }
    }
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            expression: self.expression.clone(),
            enumerate_all: self.enumerate_all,
            max_concurrent_queries: self.max_concurrent_queries,
            mode: self.mode.map(RowMode::from),
            no_progress: self.no_progress,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 logs go to stderr. stdout belongs to the report.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let the_result = sweep(&args).await;
    if let Err(err) = the_result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("dispatch failure")
                || cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like S3 isn't reachable. Check REGION, your network, and \
                 `s3.endpoint_url` if you're pointing at MinIO or LocalStack \
                 (`docker ps` is your friend). ☕"
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn sweep(args: &Args) -> Result<()> {
    // 🔒 a missing default config file is fine; a config path we can't even check is not
    let the_config_file = args.config.try_exists().context(format!(
        "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
        args.config.display()
    ))?;
    let the_config_file = the_config_file.then_some(args.config.as_path());

    let app_config = sift::app_config::load_config(the_config_file, &args.overrides())
        .context("💀 Couldn't load the configuration. Check the config file, SIFT_* env vars, and flags.")?;

    let the_summary = sift::run(app_config).await?;
    info!(
        "✅ swept {} objects ({} failed), {} MiB processed",
        the_summary.objects_processed,
        the_summary.objects_failed,
        the_summary.megabytes_processed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_flags_become_overrides() {
        let the_args = Args::parse_from([
            "sift",
            "--bucket",
            "nmon",
            "--enumerate-all",
            "--max-concurrent-queries",
            "4",
            "--mode",
            "print",
            "--no-progress",
        ]);

        let the_overrides = the_args.overrides();

        assert_eq!(the_args.config, PathBuf::from("sift.toml"));
        assert_eq!(the_overrides.bucket.as_deref(), Some("nmon"));
        assert!(the_overrides.enumerate_all);
        assert_eq!(the_overrides.max_concurrent_queries, Some(4));
        assert_eq!(the_overrides.mode, Some(RowMode::Print));
        assert!(the_overrides.no_progress);
        assert_eq!(the_overrides.prefix, None);
    }

    #[test]
    fn the_one_where_no_flags_means_no_opinions() {
        let the_overrides = Args::parse_from(["sift"]).overrides();
        assert!(the_overrides.bucket.is_none());
        assert!(the_overrides.mode.is_none());
        assert!(!the_overrides.enumerate_all);
    }
}
