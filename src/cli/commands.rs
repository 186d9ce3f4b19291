use clap::{Parser, Subcommand};
use tollgate::core::Amount;

/// `Tollgate` - intent-driven task runner that pays machines over x402.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author = "theonlyhennygod")]
#[command(version)]
#[command(about = "Turn plain-language requests into paid machine actions.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task from a natural-language request
    Run {
        /// What you want done, e.g. "unlock smart_lock_01"
        intent: String,

        /// Ask before paying even when autonomous payments are enabled
        #[arg(long)]
        attended: bool,

        /// Approve a payment quote without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage autonomous payments
    Autonomy {
        #[command(subcommand)]
        autonomy_command: AutonomyCommands,
    },

    /// Show recently finished tasks
    History {
        /// Maximum number of entries to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List a machine's devices and telemetry
    Devices {
        /// Machine id from the directory (default machine URL when omitted)
        #[arg(short, long)]
        machine: Option<String>,

        /// Keep polling until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },

    /// Resolve a machine's name-service domain
    Resolve {
        /// Machine id from the directory
        machine_id: String,
    },

    /// Show configuration and spending status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum AutonomyCommands {
    /// Allow payments without confirmation up to a daily limit
    Enable {
        /// Daily limit in the native token, e.g. 0.1
        #[arg(long)]
        daily_limit: Option<Amount>,
    },
    /// Require confirmation for every payment
    Disable,
    /// Show the daily budget
    Status,
}
