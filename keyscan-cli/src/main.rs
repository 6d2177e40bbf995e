mod layout;
mod script;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use keyscan_driver::{
    attach_with, AttachOptions, ChannelSink, Config, CycleOutcome, Diagnostic, KeyEvent,
    Session, SessionError,
};
use keyscan_keymap::{layouts, KeyMapping};
use tracing_subscriber::EnvFilter;

use crate::script::Script;

#[derive(Parser)]
#[command(name = "keyscan")]
#[command(about = "Matrix keyboard scan driver tools")]
struct Cli {
    /// Log driver activity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a configuration file
    Check {
        /// Path to the TOML configuration
        config: PathBuf,
    },
    /// Print the key mapping as a grid
    Layout {
        /// Path to the TOML configuration (built-in macropad if omitted)
        config: Option<PathBuf>,
    },
    /// Run a sample script through a scan session and print the events
    Replay {
        /// Path to the sample script
        script: PathBuf,
        /// Path to the TOML configuration (derived from the script if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Attach a live session at the configured scan interval
        #[arg(long)]
        realtime: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Check { config } => {
            let config = load_config(&config)?;
            let mapping = config.validate().context("invalid configuration")?;
            println!("Matrix: {}x{}", mapping.rows(), mapping.columns());
            println!(
                "Debounce: {} samples every {} ms ({:?} policy)",
                config.debounce_threshold, config.scan_interval_millis, config.sync_policy
            );
            if let Some(timeout) = config.sample_timeout() {
                println!("Sample timeout: {} ms", timeout.as_millis());
            }
            println!(
                "Shortest reliably detected press: {} ms",
                config.min_press_duration().as_millis()
            );
        }
        Command::Layout { config } => {
            let mapping = match config {
                Some(path) => load_config(&path)?
                    .validate()
                    .context("invalid configuration")?,
                None => layouts::macropad_4x5(),
            };
            print!("{}", layout::render(&mapping));
        }
        Command::Replay {
            script,
            config,
            realtime,
        } => {
            let contents = fs::read_to_string(&script)
                .with_context(|| format!("reading {}", script.display()))?;
            let script = script::parse_script(&contents).context("parsing sample script")?;
            let config = match config {
                Some(path) => load_config(&path)?,
                None => config_for(&script)?,
            };
            if (config.rows, config.columns) != (script.rows, script.columns) {
                bail!(
                    "script frames are {}x{}, configuration expects {}x{}",
                    script.rows,
                    script.columns,
                    config.rows,
                    config.columns
                );
            }

            if realtime {
                replay_realtime(&config, script)?;
            } else {
                replay_stepped(&config, script)?;
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Defaults sized to the script. Anything but the macropad gets keys in
/// usage order.
fn config_for(script: &Script) -> Result<Config> {
    let config = Config::new(script.rows, script.columns);
    if (script.rows, script.columns) == (4, 5) {
        return Ok(config);
    }
    let mapping = KeyMapping::sequential(script.rows, script.columns)
        .context("no default key mapping for this matrix; pass --config")?;
    Ok(config.with_mapping(&mapping))
}

fn format_event(event: &KeyEvent) -> String {
    match event {
        KeyEvent::Key(t) => format!(
            "#{:<4} {:<7} {} {}",
            t.sequence, t.direction, t.position, t.symbol
        ),
        KeyEvent::Sync { cycle } => format!("--- sync (cycle {cycle})"),
    }
}

/// One cycle per script entry, as fast as possible.
fn replay_stepped(config: &Config, script: Script) -> Result<()> {
    let total = script.len();
    // Large enough for a full frame plus its sync, so a cycle never blocks.
    let (sink, events) = ChannelSink::bounded(script.rows * script.columns + 1);
    let mut session =
        Session::new(config, script.into_sampler(), sink).context("starting session")?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} cycles")?
            .progress_chars("=> "),
    );
    pb.set_message("Scanning");

    let mut skipped = 0;
    for _ in 0..total {
        match session.run_cycle().context("scan cycle failed")? {
            CycleOutcome::Completed { .. } => {}
            CycleOutcome::Skipped(err) => {
                skipped += 1;
                pb.println(format!("--- skipped: {err}"));
            }
        }
        for event in events.try_iter() {
            pb.println(format_event(&event));
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    println!(
        "{} cycles, {} skipped, {} transitions, {} keys held",
        session.cycles(),
        skipped,
        session.sequence(),
        session.snapshot().count_pressed()
    );
    Ok(())
}

/// Attach a live session and print events until the script runs out.
fn replay_realtime(config: &Config, script: Script) -> Result<()> {
    let (sink, events) = ChannelSink::bounded(64);
    let options = AttachOptions::default().diagnostics(|diagnostic| match diagnostic {
        Diagnostic::CycleSkipped(err) => eprintln!("--- skipped: {err}"),
        Diagnostic::Overrun { cycle, elapsed } => {
            tracing::warn!(cycle, ?elapsed, "scan cycle overran the interval")
        }
    });
    let handle =
        attach_with(config, script.into_sampler(), sink, options).context("attaching session")?;

    // The session owns the sender, so this ends once it detaches.
    for event in events {
        println!("{}", format_event(&event));
    }

    match handle.wait() {
        None | Some(SessionError::SamplerFatal(_)) => {
            println!("Script finished, session {:?}", handle.state());
            Ok(())
        }
        Some(err) => Err(err).context("session ended"),
    }
}
