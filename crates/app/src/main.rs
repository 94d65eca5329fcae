use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use mala_counter_core::{
    format_duration, load_or_synthesize, mantra_text, AdvanceOutcome, AppConfig, ChantLog,
    MalaSession, RetreatOutcome, SimulatedPlayback, MANTRA_WORDS,
};
use tracing_subscriber::EnvFilter;

fn main() -> mala_counter_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chant => run_chant(config),
        Commands::Auto {
            seconds,
            interval_ms,
        } => run_auto(config, seconds, interval_ms),
        Commands::Sync { track, positions } => run_sync(config, track, &positions),
        Commands::Format { millis } => {
            println!("{}", format_duration(Duration::from_millis(millis)));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> mala_counter_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn run_chant(config: AppConfig) -> mala_counter_core::Result<()> {
    let recitation = Duration::from_millis(
        config
            .sync
            .word_duration_ms
            .saturating_mul(MANTRA_WORDS.len() as u64),
    );
    let session = MalaSession::new(config)?;
    session.load_timing_track();
    session.start_playback(Arc::new(SimulatedPlayback::new(recitation)), false)?;

    println!("{}", mantra_text());
    println!("[+/enter] bead  [-] back  [a] auto  [l] logs  [q] quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line?.trim() {
            "" | "+" => match session.tap_forward()? {
                AdvanceOutcome::Suppressed => println!("auto-advance is running"),
                AdvanceOutcome::Advanced(advance) => {
                    if let Some(log) = advance.completed {
                        println!("{log}");
                    }
                    print_status(&session, "");
                }
            },
            "-" => match session.tap_back()? {
                RetreatOutcome::Suppressed => println!("auto-advance is running"),
                RetreatOutcome::AtStart => println!("already at the first bead"),
                RetreatOutcome::Retreated { .. } => print_status(&session, "back"),
            },
            "a" => {
                let enabled = session.toggle_auto_advance()?;
                println!("auto-advance {}", if enabled { "on" } else { "off" });
            }
            "l" => print_logs(&session.snapshot().logs),
            "q" => break,
            other => println!("unknown command `{other}`"),
        }
        io::stdout().flush()?;
    }

    session.stop_auto_advance()?;
    session.stop_playback()?;
    print_logs(&session.snapshot().logs);
    Ok(())
}

fn run_auto(
    mut config: AppConfig,
    seconds: u64,
    interval_ms: Option<u64>,
) -> mala_counter_core::Result<()> {
    if let Some(interval_ms) = interval_ms {
        config.auto_advance.interval_ms = interval_ms;
    }
    tracing::info!(seconds, interval_ms = config.auto_advance.interval_ms, "running auto-advance");

    let session = MalaSession::new(config)?;
    session.start_auto_advance()?;
    thread::sleep(Duration::from_secs(seconds));
    session.stop_auto_advance()?;

    let snapshot = session.snapshot();
    println!(
        "bead {}/{}  malas {}  total {}",
        snapshot.count,
        snapshot.round_length,
        snapshot.mala_number,
        format_duration(snapshot.cumulative_time)
    );
    print_logs(&snapshot.logs);
    Ok(())
}

fn run_sync(
    config: AppConfig,
    track: Option<PathBuf>,
    positions: &[u64],
) -> mala_counter_core::Result<()> {
    let path = track.or(config.sync.track_path);
    let track = load_or_synthesize(
        path.as_deref(),
        MANTRA_WORDS.len(),
        Duration::from_millis(config.sync.word_duration_ms),
    );
    println!("{} timing entries", track.len());

    for &position in positions {
        match track.word_index_at(position) {
            Some(index) => {
                let word = MANTRA_WORDS.get(index).copied().unwrap_or("?");
                println!("{position} ms -> {index} {word}");
            }
            None => println!("{position} ms -> -1"),
        }
    }
    Ok(())
}

fn print_status(session: &MalaSession, note: &str) {
    let snapshot = session.snapshot();
    let classification = session.counter().classification();
    let [r, g, b] = classification.color.rgb();
    println!(
        "bead {:>3}/{}  mala {}  word {:>2}  \x1b[38;2;{r};{g};{b}m{}\x1b[0m  {note}",
        snapshot.count,
        snapshot.round_length,
        snapshot.mala_number,
        session.current_word_index(),
        classification.feedback,
    );
}

fn print_logs(logs: &[ChantLog]) {
    for log in logs {
        println!("{log}");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Mala chant counter", long_about = None)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count beads interactively from standard input.
    Chant,
    /// Let the auto-advance timer count for a while and print the result.
    Auto {
        /// How long to run, in seconds.
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,
        /// Override the configured interval between beads.
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },
    /// Show which mantra word is active at the given playback positions.
    Sync {
        /// Timing track in `timestamp,wordIndex` format.
        #[arg(short, long)]
        track: Option<PathBuf>,
        /// Playback positions in milliseconds.
        positions: Vec<u64>,
    },
    /// Print a duration in the counter's readable format.
    Format {
        /// Duration in milliseconds.
        millis: u64,
    },
}
