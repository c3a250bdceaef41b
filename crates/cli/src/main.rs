mod cmd;
mod output;
mod prompts;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::LockCommand;
use output::{OutputFormat, print_error};

/// rudi - install stacks, runtimes, binaries, agents and prompts
#[derive(Parser)]
#[command(name = "rudi")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text", global = true)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Install a package and its missing dependencies
  Install {
    /// Package identifier (e.g. "runtime:python", "notes", "pkg:cowsay")
    id: String,

    /// Reinstall even if already installed and skip version checks
    #[arg(short, long)]
    force: bool,

    /// Allow npm lifecycle scripts to run
    #[arg(long)]
    allow_scripts: bool,
  },

  /// Remove an installed package, its shims and its lock record
  Uninstall {
    /// Package identifier
    id: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    force: bool,
  },

  /// Resolve a package and report its dependencies
  Info {
    /// Package identifier
    id: String,
  },

  /// List installed packages
  List,

  /// List published shims
  Shims {
    /// Check that every shim still points at an existing target
    #[arg(long)]
    check: bool,
  },

  /// Inspect or clean lock records
  Lock {
    #[command(subcommand)]
    command: LockCommand,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Install {
      id,
      force,
      allow_scripts,
    } => cmd::cmd_install(&id, force, allow_scripts, cli.output),
    Commands::Uninstall { id, force } => cmd::cmd_uninstall(&id, force, cli.output),
    Commands::Info { id } => cmd::cmd_info(&id, cli.output),
    Commands::List => cmd::cmd_list(cli.output),
    Commands::Shims { check } => cmd::cmd_shims(check, cli.output),
    Commands::Lock { command } => cmd::cmd_lock(command, cli.output),
  }
}
