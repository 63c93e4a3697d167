// Strata composer CLI entry point.
//
// Composes a piece and writes it to MIDI. The pipeline: settings (JSON file
// and/or flags) → motif pool, keys and themes → arrangement → MIDI output.
//
// Usage:
//   cargo run -p strata_music -- [output.mid] [--length N] [--strictness 1-5]
//     [--instrument PROGRAM] [--seed N] [--tempo BPM] [--ticks-per-quarter N]
//     [--config settings.json]
//
// Flags override values from the config file. Set RUST_LOG=debug to trace
// individual motif and theme concretizations.

use clap::Parser;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use strata_music::midi::write_midi;
use strata_music::piece::{PieceConfig, compose_piece};
use strata_music::scale::pitch_name;
use strata_music::strictness::Strictness;
use strata_music::track::Instrument;
use strata_prng::RandomStream;
use tracing_subscriber::EnvFilter;

const DEFAULT_LENGTH: u32 = 20;
const DEFAULT_STRICTNESS: u8 = 3;

/// Compose a piece of music from motifs and themes and write it as MIDI
#[derive(Parser, Debug)]
#[command(name = "generate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Output MIDI file
    #[arg(default_value = "output.mid")]
    output: PathBuf,

    /// Piece length in whole notes
    #[arg(short, long)]
    length: Option<u32>,

    /// 1 (loosest) to 5 (most tonal and repetitive)
    #[arg(short, long)]
    strictness: Option<u8>,

    /// General MIDI program number
    #[arg(short, long)]
    instrument: Option<u8>,

    /// Seed for the random stream (defaults to the system clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Playback tempo in beats per minute
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=1000))]
    tempo: u32,

    /// Time division of the output
    #[arg(long)]
    ticks_per_quarter: Option<u32>,

    /// JSON file with piece settings
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<PieceConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            println!("  Reading settings from {}", path.display());
            PieceConfig::from_json(&std::fs::read_to_string(path)?)?
        }
        None => PieceConfig::new(DEFAULT_LENGTH, Strictness::new(DEFAULT_STRICTNESS)?)?,
    };

    if let Some(length) = cli.length {
        config.length = length;
    }
    if let Some(level) = cli.strictness {
        config.strictness = Strictness::new(level)?;
    }
    if let Some(program) = cli.instrument {
        config.instrument = Instrument::new(program);
    }
    if let Some(tpq) = cli.ticks_per_quarter {
        config.ticks_per_quarter = tpq;
    }
    config.validate()?;
    Ok(config)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Strata Composer ===");
    println!("Output: {}", cli.output.display());
    println!("Tempo: {} BPM", cli.tempo);
    println!();

    println!("[1/3] Loading settings...");
    let config = load_config(cli)?;
    let seed = cli.seed.unwrap_or_else(clock_seed);
    println!("  Length: {} whole notes", config.length);
    println!("  Strictness: {}", config.strictness.level());
    println!("  Instrument: program {}", config.instrument.program());
    println!("  Ticks per quarter: {}", config.ticks_per_quarter);
    println!("  Seed: {} (pass --seed {} to reproduce)", seed, seed);

    println!("[2/3] Composing...");
    let mut rng = RandomStream::new(seed);
    let piece = compose_piece(&config, &mut rng)?;
    let mut keys: Vec<String> = Vec::new();
    for placed in piece.themes() {
        let name = pitch_name(placed.key.tonic());
        if !keys.contains(&name) {
            keys.push(name);
        }
    }
    println!(
        "  {} themes placed, {} notes, key type {:?}",
        piece.themes().len(),
        piece.track().len(),
        piece.key_type()
    );
    println!("  Keys used: {}", keys.join(", "));

    println!("[3/3] Writing MIDI to {}...", cli.output.display());
    write_midi(&piece, &cli.output, cli.tempo)?;
    let quarters = piece.total_ticks() as f64 / piece.ticks_per_quarter() as f64;
    let duration_seconds = quarters * 60.0 / cli.tempo as f64;
    println!(
        "  Done! Duration: {:.0}s ({:.1} bars of 4/4)",
        duration_seconds,
        quarters / 4.0
    );

    println!();
    println!("Play with: timidity {} (or any MIDI player)", cli.output.display());
    Ok(())
}
