use clap::{Parser, Subcommand};
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
taskbridge - task-store routing for a multi-tenant kanban backend

Project metadata lives in one metadata store. Tasks live in task stores:
one per organization with a dedicated database, one per user without an
organization, and the shared admin store for everything else.

Routing order for a request:
  1. project given      -> the project's organization (or its owner's store)
  2. organization given -> that organization's store
  3. user given         -> the user's organization, else the user's store
  4. nothing            -> admin store

Environment:
  TASKBRIDGE_DATA_DIR, TASKBRIDGE_HOST, TASKBRIDGE_PORT,
  TASKBRIDGE_CACHE_TTL_SECS, TASKBRIDGE_ADMIN_FALLBACK,
  TASKBRIDGE_OUTBOX_MAX_ATTEMPTS, TASKBRIDGE_OUTBOX_INTERVAL_MS,
  TASKBRIDGE_LOG_LEVEL, TASKBRIDGE_LOG_JSON, TASKBRIDGE_LOG_FILE
"#;

#[derive(Parser, Clone)]
#[command(name = "taskbridge")]
#[command(about = "Route kanban tasks across organization, user and admin task stores")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Root directory of all databases (overrides TASKBRIDGE_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the HTTP API with the outbox worker
    Serve {
        /// Bind address (overrides TASKBRIDGE_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides TASKBRIDGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage organizations
    #[command(subcommand)]
    Org(OrgCommands),

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Manage project metadata
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Show which task store and collection a request would use
    ///
    /// Examples:
    ///   taskbridge resolve --project 9YcDq2vK1mPz0aLxT4bN
    ///   taskbridge resolve --user 3fQ8wLk0ZpTnY7cVb2Rs
    Resolve {
        #[arg(long = "org")]
        organization: Option<String>,

        #[arg(long)]
        user: Option<String>,

        /// Project ID from either ID space
        #[arg(long)]
        project: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Inspect and drive the outbox
    #[command(subcommand)]
    Outbox(OutboxCommands),

    /// Compare metadata with the task stores
    Reconcile {
        /// Fix links and requeue missing mirrors
        #[arg(long)]
        repair: bool,

        /// With --repair, also delete orphan mirrors
        #[arg(long, requires = "repair")]
        prune: bool,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum OrgCommands {
    /// Register an organization
    ///
    /// Examples:
    ///   taskbridge org add "Acme"
    ///   taskbridge org add "Globex" --database-url sqlite:///srv/globex/tasks.db
    Add {
        name: String,

        /// Dedicated task store; omit to use the admin store
        #[arg(long)]
        database_url: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List organizations
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Point an organization at a different task store
    SetDb {
        id: String,

        /// New location; omit to move back to the admin store
        #[arg(long)]
        database_url: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    /// Register a user
    Add {
        email: String,

        /// Display name (defaults to the local part of the email)
        #[arg(long)]
        name: Option<String>,

        #[arg(long = "org")]
        organization: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ProjectCommands {
    /// Create a project and mirror it into its task store
    Create {
        name: String,

        /// Owning user ID
        #[arg(long)]
        owner: String,

        #[arg(long = "org")]
        organization: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show a project by either ID
    Show {
        id: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List projects
    List {
        #[arg(long = "org")]
        organization: Option<String>,

        #[arg(long)]
        owner: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum OutboxCommands {
    /// Deliver due entries now
    Flush {
        #[arg(long, default_value = "100")]
        limit: i64,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show counts and entries
    Status {
        /// Only entries with this status (pending, done, failed)
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value = "20")]
        limit: i64,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Move failed entries back to pending
    Retry {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "taskbridge",
            "org",
            "list",
            "--data-dir",
            "/tmp/tb",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/tb")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Org(OrgCommands::List { .. })));
    }

    #[test]
    fn test_prune_requires_repair() {
        assert!(Cli::try_parse_from(["taskbridge", "reconcile", "--prune"]).is_err());
        assert!(Cli::try_parse_from(["taskbridge", "reconcile", "--repair", "--prune"]).is_ok());
    }
}
