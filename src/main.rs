mod clock;
mod config;
mod console;
mod escalation;
mod export;
mod harness;
mod milestone;
mod report;
mod run_spec;
mod session;
mod signals;
mod supervisor;
mod watchdog;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Run a long extraction job under supervision: stream its output with
/// timings, flag progress milestones, and kill it if it goes silent for too
/// long. Sizes run in order and stop at the first failure.
#[derive(Parser, Debug)]
#[command(name = "stallwatch", version, about)]
pub struct Cli {
    /// Problem sizes to run in order (default: from config)
    #[arg(value_name = "SIZES")]
    sizes: Vec<u32>,

    /// Config file path
    #[arg(short, long, default_value = "stallwatch.toml")]
    config: PathBuf,

    /// Stall timeout in seconds of silence (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Grace period in seconds between SIGTERM and SIGKILL (overrides config)
    #[arg(long)]
    grace: Option<u64>,

    /// Write each run's report as JSON into this directory (overrides config)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (poll decisions, signal delivery)
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the live output stream, only status lines
    #[arg(short, long)]
    quiet: bool,

    /// Print each run's full timeline after the sequence ends
    #[arg(long)]
    timeline: bool,
}

fn resolve_config(cli: &Cli) -> Result<config::StallwatchConfig, String> {
    let mut config = config::StallwatchConfig::load(&cli.config).map_err(|e| e.to_string())?;
    if !cli.sizes.is_empty() {
        config.harness.sizes = cli.sizes.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.watchdog.stall_timeout_secs = timeout;
    }
    if let Some(grace) = cli.grace {
        config.watchdog.grace_period_secs = grace;
    }
    if let Some(dir) = &cli.report_dir {
        config.harness.report_dir = Some(dir.clone());
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn print_dry_run(config: &config::StallwatchConfig) {
    println!("Dry run: config validated, not running.");
    println!(
        "Stall timeout: {}s, grace period: {}s, poll interval: {}ms",
        config.watchdog.stall_timeout_secs,
        config.watchdog.grace_period_secs,
        config.watchdog.poll_interval_ms
    );
    if let Some(dir) = &config.job.working_dir {
        println!("Working dir: {}", dir.display());
    }
    for (name, value) in &config.job.env {
        println!("Env: {name}={value}");
    }
    for size in &config.harness.sizes {
        let spec = harness::build_run_spec(config, *size);
        println!("Size {size}: {}", spec.command_line());
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}error:{} {e}", console::RED, console::NC);
            std::process::exit(1);
        }
    };

    if cli.dry_run {
        print_dry_run(&config);
        return;
    }

    let interrupt = match signals::Interrupt::install() {
        Ok(interrupt) => interrupt,
        Err(e) => {
            eprintln!("{}error:{} failed to install signal handlers: {e}", console::RED, console::NC);
            std::process::exit(1);
        }
    };

    println!("=== stallwatch v{} ===", env!("CARGO_PKG_VERSION"));
    println!(
        "Sizes: {:?}, stall timeout: {}s of silence",
        config.harness.sizes, config.watchdog.stall_timeout_secs
    );

    let mut observer = console::ConsoleObserver::new(cli.quiet);
    let summary =
        match harness::run_sizes(&config, &config.harness.sizes, &interrupt, &mut observer).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "supervised run could not start");
                eprintln!("{}error:{} {e}", console::RED, console::NC);
                std::process::exit(1);
            }
        };

    if cli.timeline {
        for run in &summary.runs {
            console::print_timeline(run.size, &run.report);
        }
    }
    if !summary.skipped.is_empty() {
        println!("Skipped sizes: {:?}", summary.skipped);
    }
    if summary.success() {
        println!("{}All runs completed successfully.{}", console::GREEN, console::NC);
        std::process::exit(0);
    }
    println!("{}Run sequence failed.{}", console::RED, console::NC);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stallwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("missing.toml");
        let cli = parse(&[
            "--config",
            config_path.to_str().unwrap(),
            "--timeout",
            "5",
            "--grace",
            "1",
            "--report-dir",
            "/tmp/reports",
            "20",
            "21",
            "22",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.harness.sizes, vec![20, 21, 22]);
        assert_eq!(config.watchdog.stall_timeout_secs, 5);
        assert_eq!(config.watchdog.grace_period_secs, 1);
        assert_eq!(config.harness.report_dir, Some(PathBuf::from("/tmp/reports")));
    }

    #[test]
    fn test_cli_defaults_keep_config_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("missing.toml");
        let cli = parse(&["--config", config_path.to_str().unwrap()]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.harness.sizes, vec![20, 21]);
        assert!(!cli.dry_run && !cli.quiet && !cli.verbose && !cli.timeline);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("missing.toml");
        let cli = parse(&["--config", config_path.to_str().unwrap(), "--timeout", "0"]);
        let err = resolve_config(&cli).unwrap_err();
        assert!(err.contains("stall_timeout_secs"));
    }
}
