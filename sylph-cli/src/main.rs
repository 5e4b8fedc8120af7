//! Sylph Replay CLI Application
//!
//! Replays a scripted sequence of transport and channel events through the
//! sylph-bridge dispatcher, as a native engine would report them, and shows
//! what the host side receives:
//! - Printed events (text or JSON)
//! - Optional C host library loaded at runtime
//! - Sequential or parallel (one task per transport) replay

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sylph_bridge::{Dispatcher, RegistryBuilder};

mod config;
mod host;
mod replay;

use host::{HostLibrary, OutputFormat, PrintSink};

/// Sylph Replay - Drive the event bridge from a scenario script
#[derive(Parser, Debug)]
#[command(name = "sylph-replay")]
#[command(about = "Replay transport/channel events through the Sylph bridge", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the scenario script (TOML)
    #[arg(short, long, value_name = "FILE")]
    script: PathBuf,

    /// C host library exporting sylph_on_* callbacks
    #[arg(short, long, value_name = "FILE")]
    library: Option<PathBuf>,

    /// Output format for printed events and the summary
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Replay transports concurrently
    #[arg(long)]
    parallel: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    log::info!("Sylph Replay v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using bridge library v{}", sylph_bridge::VERSION);

    let scenario = config::load_scenario(&args.script)?;
    log::debug!("Scenario loaded: {} transport(s)", scenario.transports.len());

    // Declared before the dispatcher so it is dropped after it.
    let library = args.library.as_deref().map(HostLibrary::load).transpose()?;

    let identifiers = Arc::new(sylph_bridge::Identifiers::new());
    let mut builder = RegistryBuilder::new();
    if !args.quiet {
        let printer = PrintSink::new(args.format, Arc::clone(&identifiers));
        builder = builder.with_sink(Arc::new(printer));
    }
    if let Some(library) = &library {
        // Library callbacks win over printing for the kinds it exports.
        builder = builder.with_c_callbacks(&library.callbacks);
    }

    let dispatcher = Dispatcher::with_config(builder.build(), scenario.bridge.clone())
        .with_identifiers(identifiers);
    let summary = replay::replay(&scenario, &dispatcher, args.parallel);
    drop(dispatcher);

    if !args.quiet {
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text => print_summary(&summary),
        }
    }

    Ok(())
}

fn print_summary(summary: &replay::ReplaySummary) {
    println!("\nReplay summary");
    println!("──────────────");
    for transport in &summary.transports {
        println!(
            "  {:<20} transport#{:<6} {} events, {} rejected",
            transport.label, transport.transport, transport.emitted, transport.rejected
        );
    }
    println!("  Delivered:    {}", summary.stats.delivered);
    println!("  Unregistered: {}", summary.stats.unregistered);
    println!("  Rejected:     {}", summary.stats.rejected);
    if summary.stats.panicked > 0 {
        println!("  Panicked:     {}", summary.stats.panicked);
    }
    if let (Some(transports), Some(channels)) = (summary.live_transports, summary.live_channels) {
        println!("  Still open:   {} transport(s), {} channel(s)", transports, channels);
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
