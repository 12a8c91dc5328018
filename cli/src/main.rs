mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{deserialize::DeserializeCommand, ls::LsCommand, serialize::SerializeCommand};
use config::{ConfigFile, Settings};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "kser",
    version,
    about = "Archive files together with their Windows and POSIX permissions",
    long_about = "kser packs a file or directory tree into a single archive that records, for every \
                  entry, both the Windows access mask of the current user and the POSIX mode bits. \
                  Re-archiving into an existing archive keeps the permissions recorded on the other \
                  operating system."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "KSER_CONFIG", help = "Configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "KSER_PATH_ENCODING",
        help = "Encoding of paths inside archives (native, utf8, utf16le)"
    )]
    path_encoding: Option<String>,

    #[arg(short = 'y', long, global = true, help = "Overwrite existing archives without asking")]
    yes: bool,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Archive a file or directory")]
    Serialize(SerializeCommand),

    #[command(about = "Recreate the archived tree with its permissions")]
    Deserialize(DeserializeCommand),

    #[command(about = "List the entries of an archive")]
    Ls(LsCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let file = ConfigFile::discover(cli.config.as_deref())?;
    let settings = Settings::resolve(file, cli.path_encoding.as_deref(), cli.yes, !cli.quiet)?;
    debug!("Settings: {:?}", settings);

    match cli.command {
        Commands::Serialize(ref cmd) => cmd.run(&settings),
        Commands::Deserialize(ref cmd) => cmd.run(&settings),
        Commands::Ls(ref cmd) => cmd.run(&settings),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kser={0},kser_core={0}", level)));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}
