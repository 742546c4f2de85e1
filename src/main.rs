//! churnscope: churn dashboard CLI over RFM customer profiles
//!
//! This is the main entrypoint that wires logging, the cached data source and
//! either a one-shot report or an interactive control session.

use anyhow::Result;
use churnscope::pipeline::write_outputs;
use churnscope::session::{run_session, SessionOptions};
use churnscope::{Args, Dashboard};
use clap::Parser;
use std::io;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        println!("churnscope - Customer Churn Dashboard");
        println!("=====================================\n");
    }

    let controls = args.controls()?;
    let mut dashboard =
        Dashboard::new(&args.input, args.timestamp_policy(), args.cache_ttl()).with_controls(controls);

    if args.interactive {
        run_interactive(&args, &mut dashboard)
    } else {
        run_report(&args, &mut dashboard)
    }
}

/// Logs go to stderr so stdout stays the report; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Run the full pipeline once and write every output
fn run_report(args: &Args, dashboard: &mut Dashboard) -> Result<()> {
    println!("=== Churn Dashboard ===\n");

    let start_time = Instant::now();

    if args.verbose {
        println!("Step 1: Loading transactions");
        println!("  Input file: {}", args.input.display());
    }
    let dataset = dashboard.dataset()?;
    println!("✓ Data loaded: {} transactions", dataset.frame.height());
    if dataset.synthesized_timestamps {
        println!("  Purchase timestamps were simulated; recency is illustrative only");
    }

    if args.verbose {
        println!("\nStep 2: Computing RFM profiles and churn labels");
    }
    let view = dashboard.refresh()?;
    println!("✓ {} customer profiles\n", view.profiles.len());

    println!("=== Summary Stats ===");
    print!("{view}");

    if args.verbose {
        println!("\nStep 3: Writing outputs");
        println!("  Output directory: {}", args.output_dir.display());
    }
    let outputs = write_outputs(&view, &args.output_dir, !args.no_charts, true)?;

    println!("\n=== Outputs ===");
    if let Some(charts) = &outputs.charts {
        for path in charts.all() {
            println!("Chart saved to: {}", path.display());
        }
    }
    if let Some(export) = &outputs.export {
        println!("Filtered data saved to: {}", export.display());
    }

    println!(
        "\nTotal processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Read control events from stdin until `quit`
fn run_interactive(args: &Args, dashboard: &mut Dashboard) -> Result<()> {
    let options = SessionOptions {
        output_dir: args.output_dir.clone(),
        render_charts: !args.no_charts,
    };
    let stdin = io::stdin();
    run_session(dashboard, stdin.lock(), io::stdout(), &options)
}
