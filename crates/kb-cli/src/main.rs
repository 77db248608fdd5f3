//! CLI frontend for the Knucklebone dice and combat engine.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knucklebone — dice resolution and combat simulation",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log debug events to stderr (overridden by KB_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll a dice expression such as 4d6kh3 or 1d20adv+5
    Roll {
        /// Dice notation
        notation: String,

        /// Roll from a seeded, reproducible source
        #[arg(short, long, conflicts_with = "trusted")]
        seed: Option<u64>,

        /// Trusted entropy provider: `os` or an http(s) URL (default: os)
        #[arg(short, long)]
        trusted: Option<String>,

        /// Per-fetch timeout for trusted providers, in milliseconds
        #[arg(long, default_value = "2000")]
        timeout_ms: u64,

        /// Retry a failed trusted fetch this many times
        #[arg(long, default_value = "0")]
        retries: u32,

        /// Fall back to a seeded source with this seed when trusted
        /// entropy is unavailable (recorded in the audit trail)
        #[arg(long)]
        degrade_seed: Option<u64>,

        /// Number of times to roll
        #[arg(short = 'n', long, default_value = "1")]
        times: usize,

        /// Print the audit trail
        #[arg(short, long)]
        audit: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate dice notation and print its canonical form
    Check {
        /// Dice notation
        notation: String,
    },

    /// Re-run the pinned seeded vectors and report whether they reproduce
    Verify {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run a Monte Carlo simulation of an encounter file
    Simulate {
        /// Encounter file (JSON)
        encounter: PathBuf,

        /// Number of trials
        #[arg(short = 'n', long)]
        trials: Option<u64>,

        /// Run-level seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Round cap per trial
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Metric: rounds, damage, damage:<side>, survivors:<side>, health:<side>
        #[arg(short, long)]
        metric: Option<String>,

        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Simulation config file (JSON); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("KB_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Roll {
            notation,
            seed,
            trusted,
            timeout_ms,
            retries,
            degrade_seed,
            times,
            audit,
            json,
        } => commands::roll::run(
            &notation,
            &commands::roll::RollOptions {
                seed,
                trusted,
                timeout_ms,
                retries,
                degrade_seed,
                times,
                audit,
                json,
            },
        ),
        Commands::Check { notation } => commands::check::run(&notation),
        Commands::Verify { json } => commands::verify::run(json),
        Commands::Simulate {
            encounter,
            trials,
            seed,
            max_rounds,
            metric,
            workers,
            config,
            json,
        } => commands::simulate::run(
            &encounter,
            &commands::simulate::SimulateOptions {
                trials,
                seed,
                max_rounds,
                metric,
                workers,
                config,
                json,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
