//! Command-line interface definitions and argument parsing

use crate::data::{TimestampPolicy, DEFAULT_SEED};
use crate::pipeline::ControlState;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Customer churn dashboard: RFM profiles, churn threshold, charts and export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transaction CSV file
    #[arg(short, long, default_value = "data/processed_rfm.csv")]
    pub input: PathBuf,

    /// Directory for the charts and the filtered export
    #[arg(short, long, default_value = "dashboard")]
    pub output_dir: PathBuf,

    /// Churn threshold in days (default: 75th percentile of recency)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<i64>,

    /// Lower end of the recency filter in days (default: observed minimum)
    #[arg(long, allow_negative_numbers = true)]
    pub min_recency: Option<i64>,

    /// Upper end of the recency filter in days (default: observed maximum)
    #[arg(long, allow_negative_numbers = true)]
    pub max_recency: Option<i64>,

    /// Seed for simulated purchase timestamps
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Draw simulated timestamps from OS entropy (recency varies per run)
    #[arg(long, conflicts_with = "seed")]
    pub unseeded: bool,

    /// Always simulate purchase timestamps, ignoring the source column
    #[arg(long)]
    pub simulate_timestamps: bool,

    /// Seconds a loaded dataset stays cached
    #[arg(long, default_value = "3600")]
    pub cache_ttl_secs: u64,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Read control events (threshold, range, export, ...) from stdin
    #[arg(long)]
    pub interactive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn timestamp_policy(&self) -> TimestampPolicy {
        TimestampPolicy {
            seed: (!self.unseeded).then_some(self.seed),
            force_simulation: self.simulate_timestamps,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Initial control values requested on the command line
    pub fn controls(&self) -> crate::Result<ControlState> {
        if let (Some(low), Some(high)) = (self.min_recency, self.max_recency) {
            if low > high {
                anyhow::bail!("--min-recency ({low}) must not exceed --max-recency ({high})");
            }
        }
        Ok(ControlState {
            threshold: self.threshold,
            min_recency: self.min_recency,
            max_recency: self.max_recency,
        })
    }
}
