use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use recipedump::book::RecipeBook;
use recipedump::config::{DumpConfig, DUMP_VERSION, PROGRESS_INTERVAL_MS};
use recipedump::dumper::{RecipeDumper, RunOutcome};
use recipedump::notify::{LogNotifier, Notification, Notifier, ProgressBarNotifier};
use recipedump::registry::{ExtractorRegistry, ProductionSourceRegistry};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "recipedump")]
#[command(about = "Stream crafting-recipe dumps to JSON with an interned stack catalog")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump every recipe producing each catalog item
    Dump(DumpArgs),
}

#[derive(Args)]
struct DumpArgs {
    /// Recipe book describing crafting handlers and (optionally) the item catalog
    #[arg(short, long)]
    book: PathBuf,

    /// Primary dump file; the stack catalog is written next to it
    #[arg(short, long)]
    output: PathBuf,

    /// Dump mode (0 or 1); both write the streaming JSON dump
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    mode: u8,

    /// Query threads (1 = sequential)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Keep catalog order when querying on several threads
    #[arg(long)]
    preserve_order: bool,

    /// Pretty-print query records
    #[arg(long)]
    pretty: bool,

    /// Progress report interval in milliseconds
    #[arg(
        long,
        default_value_t = PROGRESS_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    progress_interval_ms: u64,

    /// Version string written into the dump
    #[arg(long, default_value = DUMP_VERSION)]
    dump_version: String,
}

/// Logs every notification and mirrors it on the progress bar.
struct CliNotifier {
    bar: ProgressBarNotifier,
}

impl Notifier for CliNotifier {
    fn notify(&self, notification: Notification) {
        LogNotifier.notify(notification.clone());
        self.bar.notify(notification);
    }
}

fn run_dump(args: DumpArgs) -> Result<()> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }

    let book = RecipeBook::load(&args.book)?;
    let catalog = book.catalog()?;

    let mut sources = ProductionSourceRegistry::new();
    book.register(&mut sources);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let config = DumpConfig {
        version: args.dump_version,
        threads: args.threads,
        preserve_order: args.preserve_order,
        pretty: args.pretty,
        progress_interval: Duration::from_millis(args.progress_interval_ms),
    };

    let dumper = RecipeDumper::new(
        catalog,
        Arc::new(sources),
        Arc::new(ExtractorRegistry::with_default_extractors()),
        Arc::new(CliNotifier {
            bar: ProgressBarNotifier::new(),
        }),
        config,
    );

    let summary = match dumper.start_with_mode(&args.output, args.mode)?.join() {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::Failed(e) => return Err(e),
    };

    println!();
    println!("=== Summary ===");
    println!("Dump file:          {}", summary.target.display());
    println!("Stack catalog:      {}", summary.stacks_path.display());
    println!("Queries written:    {}", summary.completed);
    println!("Distinct stacks:    {}", summary.stacks);
    println!("Total time:         {:.2}s", summary.elapsed_secs);
    if !summary.stacks_written {
        println!("Stack catalog could not be written, see log for details");
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Dump(args) => run_dump(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Cli, clap::Error> {
        let mut argv = vec!["recipedump", "dump", "--book", "b.json", "--output", "o.json"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv)
    }

    #[test]
    fn zero_progress_interval_is_rejected() {
        assert!(parse(&["--progress-interval-ms", "0"]).is_err());
        let Commands::Dump(args) = parse(&["--progress-interval-ms", "5"]).unwrap().command;
        assert_eq!(args.progress_interval_ms, 5);
    }

    #[test]
    fn mode_outside_range_is_rejected() {
        assert!(parse(&["--mode", "2"]).is_err());
        let Commands::Dump(args) = parse(&[]).unwrap().command;
        assert_eq!(args.mode, 1);
        assert_eq!(args.progress_interval_ms, PROGRESS_INTERVAL_MS);
    }
}
