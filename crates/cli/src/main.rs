mod check;
mod config;
mod script;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run constraint scripts through the flow solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve a constraint script and report its diagnostics
    Check {
        /// Path to the script (TOML)
        script: PathBuf,

        /// Solver configuration; defaults to the nearest flowsolve.toml
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Override the maximum dispatch depth
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
        max_depth: Option<u32>,

        /// Only print diagnostics
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> miette::Result<()> {
    env_logger::init();

    let args = Cli::parse();

    match args.command {
        Command::Check {
            script,
            config,
            max_depth,
            quiet,
        } => {
            let summary = check::run_check(&script, config.as_deref(), max_depth, quiet)?;
            if summary.diagnostics > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
