use std::path::PathBuf;

use anyhow::Result;
use chatdomain_cli::cli::{run, CliConfig, Command, DomainReport};
use chatdomain_cli::tracing_setup;
use chatdomain_core::{CoreConfig, Environment, UserId};
use clap::{Parser, Subcommand};

const PASSCODE_ENV: &str = "CHATDOMAIN_PASSCODE";

#[derive(Parser)]
#[command(name = "chatdomain")]
#[command(about = "Manage the accounts of a chat client installation")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (contains dataDir, dataName)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Data directory, overrides the config file and CHATDOMAIN_DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Local passcode (falls back to CHATDOMAIN_PASSCODE)
    #[arg(long)]
    passcode: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all accounts
    List,

    /// Add an account
    Add {
        /// production or test
        #[arg(long, short = 'e', default_value = "production")]
        environment: Environment,
    },

    /// Make an account the active one
    Activate {
        /// Account index
        index: u32,
    },

    /// Log an account in as a user
    Login {
        /// Account index
        index: u32,
        /// User id
        user_id: UserId,
    },

    /// Log an account out
    Logout {
        /// Account index
        index: u32,
    },

    /// Set the local passcode (empty string removes it)
    SetPasscode {
        /// New passcode
        passcode: String,
    },

    /// Forgot the passcode: drop every account and start over
    Reset,
}

fn main() {
    let cli = Cli::parse();
    tracing_setup::init_tracing();

    let config = core_config(&cli);
    let passcode = cli
        .passcode
        .clone()
        .or_else(|| std::env::var(PASSCODE_ENV).ok())
        .unwrap_or_default();

    let command = match cli.command {
        Commands::List => Command::List,
        Commands::Add { environment } => Command::Add { environment },
        Commands::Activate { index } => Command::Activate { index },
        Commands::Login { index, user_id } => Command::Login { index, user_id },
        Commands::Logout { index } => Command::Logout { index },
        Commands::SetPasscode { passcode } => Command::SetPasscode { passcode },
        Commands::Reset => Command::Reset,
    };

    let result =
        run(&command, &config, &passcode).and_then(|report| print_report(&report, cli.pretty));
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Resolve data location: flag > config file > environment > default
fn core_config(cli: &Cli) -> CoreConfig {
    let mut config = CoreConfig::from_env();

    if let Some(ref path) = cli.config {
        match CliConfig::load(path) {
            Ok(file) => config = file.apply(config),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    config
}

fn print_report(report: &DomainReport, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    println!("{}", json);
    Ok(())
}
