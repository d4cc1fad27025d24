//! vibe-sampler - inspect soundfonts and render them offline.
//!
//! - `vibe-sampler info <FILE>` prints the presets, samples and load
//!   diagnostics of an SF2 or SFZ file.
//! - `vibe-sampler render <FILE> -o out.wav` plays a note list through the
//!   sampler engine and writes a 32-bit float stereo WAV.

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vibelang_soundfont::{LoadOptions, PcmDecoder, Sound};

/// Soundfont sampler
#[derive(Parser, Debug)]
#[command(name = "vibe-sampler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect SF2/SFZ soundfonts and render them to WAV", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show presets, samples and diagnostics of a soundfont
    Info {
        /// SF2 or SFZ file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Fail on the first invalid key or velocity range
        #[arg(long)]
        strict: bool,
    },

    /// Render a note list to a WAV file
    Render(RenderArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// SF2 or SFZ file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "OUT")]
    pub output: PathBuf,

    /// Preset index to play
    #[arg(long, default_value_t = 0)]
    pub preset: usize,

    /// Notes as `note:velocity:start:length`, comma separated (seconds)
    #[arg(long, default_value = "60:100:0:1")]
    pub notes: String,

    /// Seconds rendered after the last note ends
    #[arg(long, default_value_t = 1.0)]
    pub tail: f32,

    /// Sampler config file (defaults to the user config, if any)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Info { file, strict } => info(&file, strict),
        Commands::Render(args) => render::render(args),
    }
}

/// Load a soundfont, attaching the path to any error.
pub fn load_sound(file: &Path, strict: bool) -> Result<Sound> {
    let options = LoadOptions {
        strict,
        ..LoadOptions::default()
    };
    Sound::load_file(file, &options, &mut PcmDecoder::new())
        .with_context(|| format!("Failed to load soundfont: {}", file.display()))
}

fn info(file: &Path, strict: bool) -> Result<()> {
    let sound = load_sound(file, strict)?;

    println!("{} ({})", sound.name(), sound.format());
    println!("  file:    {}", file.display());
    println!("  regions: {}", sound.regions().len());
    println!(
        "  samples: {} referenced, {} loaded",
        sound.sample_refs().len(),
        sound.loaded_sample_count()
    );
    println!();

    println!("{:>5}  {:>4}  {:>7}  {:>7}  name", "index", "bank", "program", "regions");
    for (index, preset) in sound.presets().iter().enumerate() {
        println!(
            "{:>5}  {:>4}  {:>7}  {:>7}  {}",
            index,
            preset.bank,
            preset.program,
            preset.regions.len(),
            preset.name
        );
    }

    let diagnostics = sound.diagnostics();
    if !diagnostics.is_empty() {
        println!();
        println!("{} diagnostics:", diagnostics.len());
        for diagnostic in diagnostics {
            println!("  {}", diagnostic);
        }
    }
    Ok(())
}
