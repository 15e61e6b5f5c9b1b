use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldwork_core::models::{ConflictStrategy, OperationStatus, OperationType, Priority};

#[derive(Parser)]
#[command(name = "fieldwork")]
#[command(about = "Capture field data offline and sync it when connectivity returns")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a local mutation for delivery
    #[command(alias = "enqueue")]
    Stage {
        /// Mutation kind
        #[arg(value_enum)]
        op_type: StageOp,
        /// Logical entity kind, e.g. "appraisal"
        data_type: String,
        /// Identifier of the entity
        resource_id: String,
        /// Inline JSON payload
        #[arg(long, value_name = "JSON", conflicts_with = "file")]
        payload: Option<String>,
        /// Read the JSON payload from a file
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Delivery priority
        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,
    },
    /// Inspect and manage the operation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Deliver everything currently eligible to the configured server
    Flush {
        /// Concurrent in-flight deliveries
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Inspect the local record cache
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued operations
    List {
        /// Filter by status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Number of operations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue depth by status
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-arm a failed operation for delivery
    Retry {
        /// Operation ID
        id: String,
    },
    /// Withdraw a pending operation before it syncs
    Cancel {
        /// Operation ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List open conflicts
    List {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Include resolved and dismissed conflicts
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a conflict field by field
    Show {
        /// Conflict ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict with a strategy or a hand-built payload
    Resolve {
        /// Conflict ID
        id: String,
        /// Automatic resolution strategy
        #[arg(long, value_enum, conflicts_with_all = ["payload", "file"])]
        strategy: Option<StrategyArg>,
        /// Inline JSON payload for manual resolution
        #[arg(long, value_name = "JSON", conflicts_with = "file")]
        payload: Option<String>,
        /// Read the manual resolution payload from a file
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Dismiss a conflict without reconciling it
    Dismiss {
        /// Conflict ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Show the cached snapshot of a resource
    Show {
        /// Logical entity kind
        data_type: String,
        /// Identifier of the entity
        resource_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StageOp {
    Create,
    Update,
    Delete,
}

impl From<StageOp> for OperationType {
    fn from(op: StageOp) -> Self {
        match op {
            StageOp::Create => Self::Create,
            StageOp::Update => Self::Update,
            StageOp::Delete => Self::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => Self::Low,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::High => Self::High,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    InFlight,
    Failed,
    Conflicted,
}

impl From<StatusArg> for OperationStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => Self::Pending,
            StatusArg::InFlight => Self::InFlight,
            StatusArg::Failed => Self::Failed,
            StatusArg::Conflicted => Self::Conflicted,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    ClientWins,
    ServerWins,
    LastModifiedWins,
    Merge,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::ClientWins => Self::ClientWins,
            StrategyArg::ServerWins => Self::ServerWins,
            StrategyArg::LastModifiedWins => Self::LastModifiedWins,
            StrategyArg::Merge => Self::Merge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
