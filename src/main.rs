use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use colored::*;
use std::fs::OpenOptions;
use std::io::Write;
use std::process;
use std::sync::Arc;

use tcpsweep::{
    config::{ScanConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_HOSTS_PER_RANGE, DEFAULT_TIMEOUT_SECS},
    output::{JsonLinesSink, LogSink, TeeSink},
    scanner::{RunSummary, ScanCoordinator},
};

fn build_cli() -> Command {
    Command::new("tcpsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multithreaded TCP connect sweeper for hosts and CIDR ranges")
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("COUNT")
                .help("Number of hosts scanned concurrently")
                .value_parser(clap::value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("TCP connect timeout in seconds")
                .value_parser(clap::value_parser!(f64))
                .default_value("0.5"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Target file with tcp_ports and ip_ranges (YAML, JSON or TOML by extension)")
                .default_value("config.yaml"),
        )
        .arg(
            Arg::new("logfile")
                .short('l')
                .long("logfile")
                .value_name("FILE")
                .help("Path to the log file, '-' for stderr")
                .default_value("tcp_scan.log"),
        )
        .arg(
            Arg::new("max-hosts")
                .long("max-hosts")
                .value_name("COUNT")
                .help("Reject CIDR ranges with more usable hosts than this")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Also stream events to stdout as JSON lines")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log every connection attempt")
                .action(ArgAction::SetTrue),
        )
}

/// Route `log` output to the log file with a `<timestamp> <message>` layout
fn init_logging(logfile: &str, verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "trace" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.args()
        )
    });

    if logfile != "-" {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(logfile)
            .with_context(|| format!("Failed to open log file {}", logfile))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Failed to initialize logging")?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {} hosts scanned in {:.2?} ({:.1} hosts/s)",
        "[~]".bright_blue(),
        summary.completed.to_string().bright_cyan().bold(),
        summary.elapsed,
        summary.scan_rate()
    );

    if summary.hosts_with_open_ports > 0 {
        println!(
            "{} {} hosts with {} open ports",
            "[+]".bright_green(),
            summary.hosts_with_open_ports.to_string().bright_green().bold(),
            summary.open_ports
        );
    }

    if summary.failed > 0 {
        println!(
            "{} {} host scans failed, see the log for details",
            "[!]".bright_red(),
            summary.failed
        );
    }

    if summary.invalid_specs > 0 {
        println!(
            "{} {} address specs were skipped as invalid",
            "[!]".bright_yellow(),
            summary.invalid_specs
        );
    }
}

async fn run() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let threads = matches
        .get_one::<usize>("threads")
        .copied()
        .unwrap_or(DEFAULT_CONCURRENCY);
    let timeout = matches
        .get_one::<f64>("timeout")
        .copied()
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let max_hosts = matches
        .get_one::<u64>("max-hosts")
        .copied()
        .unwrap_or(DEFAULT_MAX_HOSTS_PER_RANGE);
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.yaml");
    let logfile = matches
        .get_one::<String>("logfile")
        .map(String::as_str)
        .unwrap_or("tcp_scan.log");
    let json = matches.get_flag("json");
    let verbose = matches.get_flag("verbose");

    init_logging(logfile, verbose)?;

    let config = ScanConfig::from_file(config_path)?
        .with_concurrency(threads)
        .with_timeout_secs(timeout)
        .with_max_hosts_per_range(max_hosts);

    let mut sink = TeeSink::new().with(Arc::new(LogSink));
    if json {
        sink = sink.with(Arc::new(
            JsonLinesSink::new(std::io::stdout()).with_trace(verbose),
        ));
    }

    let coordinator = ScanCoordinator::new(&config, Arc::new(sink))?;
    let summary = coordinator.run().await;

    if !json {
        print_summary(&summary);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "[!] ERROR:".bright_red(), e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let matches = build_cli().try_get_matches_from(["tcpsweep"]).unwrap();
        assert_eq!(matches.get_one::<usize>("threads"), Some(&10));
        assert_eq!(matches.get_one::<f64>("timeout"), Some(&0.5));
        assert_eq!(
            matches.get_one::<String>("config").map(String::as_str),
            Some("config.yaml")
        );
        assert_eq!(
            matches.get_one::<String>("logfile").map(String::as_str),
            Some("tcp_scan.log")
        );
        assert!(!matches.get_flag("json"));
    }

    #[test]
    fn test_cli_overrides() {
        let matches = build_cli()
            .try_get_matches_from([
                "tcpsweep",
                "-t",
                "64",
                "--timeout",
                "1.5",
                "-c",
                "targets.json",
                "-v",
            ])
            .unwrap();
        assert_eq!(matches.get_one::<usize>("threads"), Some(&64));
        assert_eq!(matches.get_one::<f64>("timeout"), Some(&1.5));
        assert!(matches.get_flag("verbose"));
    }

    #[test]
    fn test_cli_rejects_non_numeric_threads() {
        assert!(build_cli().try_get_matches_from(["tcpsweep", "-t", "many"]).is_err());
    }
}
