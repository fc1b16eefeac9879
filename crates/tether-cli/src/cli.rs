use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tether_core::{OperationType, ResolutionStrategy};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Queue offline changes and sync them with the server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for API and tenant configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a local create, update or delete
    Queue {
        #[arg(value_enum)]
        operation: OperationKind,
        /// Entity table (lowercase snake_case)
        table: String,
        /// Entity id
        id: String,
        /// Row payload as JSON (required for create/update)
        data: Option<String>,
        /// Only queue; do not sync afterwards
        #[arg(long)]
        offline: bool,
    },
    /// Run one sync cycle
    Sync {
        /// Keep syncing while the server reports more changes
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync periodically and print applied changes until interrupted
    Watch {
        /// Seconds between cycles (profile value when omitted)
        #[arg(short, long, value_name = "SECONDS")]
        interval: Option<u64>,
    },
    /// Show local queue, checkpoint and conflict status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List materialized records
    Records {
        /// Table to list (all tables with counts when omitted)
        table: Option<String>,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Records to skip
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl From<OperationKind> for OperationType {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Create => Self::Create,
            OperationKind::Update => Self::Update,
            OperationKind::Delete => Self::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    ServerWins,
    ClientWins,
    Manual,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::ServerWins => Self::ServerWins,
            StrategyArg::ClientWins => Self::ClientWins,
            StrategyArg::Manual => Self::Manual,
        }
    }
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List recorded conflicts
    List {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict on the server and sync
    Resolve {
        /// Conflict ID
        id: String,
        #[arg(value_enum)]
        strategy: StrategyArg,
        /// Resolved value as JSON (required for manual)
        value: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Sync API base URL (e.g. <https://app.example.com/api>)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Tenant to sync
        #[arg(long, value_name = "ID")]
        tenant_id: Option<String>,
        /// Bearer token sent with every request
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// Operations per upload request
        #[arg(long, value_name = "N")]
        upload_batch_size: Option<usize>,
        /// Changes per download request
        #[arg(long, value_name = "N")]
        download_limit: Option<usize>,
        /// Seconds between `watch` cycles
        #[arg(long, value_name = "SECONDS")]
        auto_sync_interval: Option<u64>,
        /// Strategy applied to conflicts the server leaves open
        #[arg(long, value_enum)]
        conflict_resolution: Option<StrategyArg>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the effective profile (environment overrides applied)
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
