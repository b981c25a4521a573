//! `halite`: operational tool over a coin database directory.
//!
//! Every command prints one JSON object on stdout: the command's report on
//! success, `{"ok": false, "err": "..."}` on failure.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use halite_store::Backend;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::commands::{CliError, Context};

#[derive(Parser, Debug)]
#[command(name = "halite", version, about = "Inspect and maintain a halite coin database")]
struct Cli {
    /// Root data directory; each network uses its own subdirectory.
    #[arg(long, short = 'd', value_name = "PATH", default_value = "./halite-data")]
    datadir: PathBuf,

    /// main, testnet, regtest, stake-main or stake-regtest.
    #[arg(long, value_name = "NAME", default_value = "regtest")]
    network: String,

    /// Storage backend: redb, or fjall when built with `--features fjall`.
    #[arg(long, value_name = "BACKEND", default_value = "redb")]
    backend: Backend,

    /// `tracing` filter used when RUST_LOG is unset.
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record the genesis block as the tip of an empty database.
    Init,
    /// Print the current tip.
    Tip,
    /// Dump unspent coins in outpoint order.
    Coins {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the undo record stored for a height.
    RewindData { height: u32 },
    /// Undo blocks from the tip.
    Rewind {
        #[arg(long, default_value_t = 1)]
        blocks: u32,
    },
    /// Print network parameters and the tip.
    Info,
}

#[derive(Serialize)]
struct Failure {
    ok: bool,
    err: String,
}

fn init_logging(level: &str) {
    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("encode output: {e}"),
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let ctx = Context::new(&cli.network, &cli.datadir, cli.backend)?;
    match &cli.command {
        Command::Init => print_json(&commands::init(&ctx)?),
        Command::Tip => print_json(&commands::tip(&ctx)?),
        Command::Coins { limit } => print_json(&commands::coins(&ctx, *limit)?),
        Command::RewindData { height } => print_json(&commands::rewind_data(&ctx, *height)?),
        Command::Rewind { blocks } => print_json(&commands::rewind(&ctx, *blocks)?),
        Command::Info => print_json(&commands::info(&ctx)?),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_json(&Failure {
                ok: false,
                err: e.to_string(),
            });
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_subcommands_parse() {
        let cli = Cli::try_parse_from([
            "halite",
            "--datadir",
            "/tmp/h",
            "--network",
            "stake-regtest",
            "--backend",
            "redb",
            "rewind",
            "--blocks",
            "3",
        ])
        .expect("parse");
        assert_eq!(cli.datadir, PathBuf::from("/tmp/h"));
        assert_eq!(cli.network, "stake-regtest");
        assert_eq!(cli.backend, Backend::Redb);
        assert!(matches!(cli.command, Command::Rewind { blocks: 3 }));
    }

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from(["halite", "rewind-data", "7"]).expect("parse");
        assert_eq!(cli.network, "regtest");
        assert_eq!(cli.backend, Backend::Redb);
        assert_eq!(cli.log_level, "warn");
        assert!(matches!(cli.command, Command::RewindData { height: 7 }));
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        assert!(Cli::try_parse_from(["halite", "--backend", "lmdb", "tip"]).is_err());
    }
}
