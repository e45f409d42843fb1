//! Magnon CLI: live sessions, offline rendering, script checking.

use clap::{Parser, Subcommand};
use magnon::live::LiveSession;
use magnon::render::{render_to_file, RenderConfig};
use magnon::script::eval_script;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "magnon")]
#[command(about = "Live coding music engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a script, watching it for changes
    Live {
        /// Script file to watch and auto-reload
        script: PathBuf,

        /// Directory of sample banks (one subdirectory per bank)
        #[arg(long)]
        samples: Option<PathBuf>,
    },

    /// Render a script to a WAV file
    Render {
        /// Script file to render
        script: PathBuf,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Duration in seconds
        #[arg(short, long, default_value = "8.0")]
        duration: f64,

        /// Sample rate in Hz
        #[arg(long, default_value = "44100")]
        sample_rate: u32,

        /// Block size for processing
        #[arg(long, default_value = "512")]
        block_size: usize,

        /// Directory of sample banks
        #[arg(long)]
        samples: Option<PathBuf>,
    },

    /// Parse and evaluate a script, reporting errors
    Check {
        /// Script file to check
        script: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Live { script, samples } => {
            let session = LiveSession::new(&script, samples)?;
            session.run()
        }
        Commands::Render {
            script,
            output,
            duration,
            sample_rate,
            block_size,
            samples,
        } => {
            let source = std::fs::read_to_string(&script)
                .map_err(|e| format!("cannot read {}: {}", script.display(), e))?;
            let config = RenderConfig {
                sample_rate,
                block_size,
                duration,
                samples_path: samples,
            };
            let stats = render_to_file(&source, &output, &config)?;
            println!(
                "wrote {} ({} frames, peak {:.3})",
                output.display(),
                stats.frames,
                stats.peak
            );
            Ok(())
        }
        Commands::Check { script } => {
            let source = std::fs::read_to_string(&script)
                .map_err(|e| format!("cannot read {}: {}", script.display(), e))?;
            let script = eval_script(&source).map_err(|e| e.to_string())?;
            println!(
                "ok: {} track(s){}",
                script.track_names.len(),
                match script.cps {
                    Some(cps) => format!(", cps {}", cps),
                    None => String::new(),
                }
            );
            Ok(())
        }
    }
}
