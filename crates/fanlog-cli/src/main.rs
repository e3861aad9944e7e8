use anyhow::{Context, Result};
use clap::Parser;
use fanlog_core::{Config, Level};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::FmtSubscriber;

/// fanlog - emit demo records through every configured sink
#[derive(Parser, Debug)]
#[command(name = "fanlog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Global threshold (overrides config)
    #[arg(short, long)]
    level: Option<Level>,

    /// Milliseconds between records
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,

    /// Stop after this many records instead of waiting for Ctrl-C
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Enable verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// Emit record number `n`, cycling through every level
fn emit(n: u64) {
    let level = Level::ALL[(n % Level::ALL.len() as u64) as usize];
    fanlog_dispatch::log_with_fields!(level, format!("demo record {}", n),
        "seq" => n,
        "pid" => std::process::id(),
    );
}

/// Diagnostics shown on stderr
///
/// The outgoing-message echo of queued sinks configured with `debug = true`
/// is always shown, whatever the verbosity.
fn diagnostics_filter(verbose: bool) -> Targets {
    let default = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    Targets::new()
        .with_default(default)
        .with_target(fanlog_output::ECHO_TARGET, tracing::Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::default().to_toml()?);
        return Ok(());
    }

    FmtSubscriber::builder()
        .with_max_level(tracing::Level::TRACE)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish()
        .with(diagnostics_filter(args.verbose))
        .init();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(level) = args.level {
        config.general.level = level.as_str().to_lowercase();
    }

    // Sinks may open blocking HTTP clients, so keep them off the runtime
    let report = tokio::task::spawn_blocking(move || {
        fanlog_dispatch::register_from_config(fanlog_dispatch::global(), &config)
    })
    .await?;
    for (sink, e) in &report.failed {
        eprintln!("Sink '{}' failed to start: {}", sink, e);
    }
    if report.registered == 0 {
        eprintln!("Warning: No sinks enabled. Enable console, file, loghub or kafka in config.");
        return Ok(());
    }
    info!(sinks = report.registered, "Emitting demo records");

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval.max(1)));
    let mut emitted: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let n = emitted;
                tokio::task::spawn_blocking(move || emit(n)).await?;
                emitted += 1;
                if args.count.is_some_and(|count| emitted >= count) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!(emitted, "Shutting down");
    if let Err(e) = tokio::task::spawn_blocking(fanlog_dispatch::close).await? {
        eprintln!("Close error: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_shown_without_verbose() {
        let filter = diagnostics_filter(false);
        assert!(filter.would_enable(fanlog_output::ECHO_TARGET, &tracing::Level::INFO));
        assert!(!filter.would_enable("fanlog_output::queued", &tracing::Level::INFO));
        assert!(filter.would_enable("fanlog_output::queued", &tracing::Level::WARN));
    }

    #[test]
    fn test_verbose_shows_debug() {
        let filter = diagnostics_filter(true);
        assert!(filter.would_enable("fanlog_dispatch::dispatcher", &tracing::Level::DEBUG));
        assert!(!filter.would_enable("fanlog_dispatch::dispatcher", &tracing::Level::TRACE));
    }
}
