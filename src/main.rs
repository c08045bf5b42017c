//! # Task Context CLI (`tctx`)
//!
//! The `tctx` binary manages a task forest, its dependency graph, and the
//! documents attached to tasks, and assembles scoped context for questions
//! about a task.
//!
//! ## Usage
//!
//! ```bash
//! tctx --config ./config/tctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tctx init` | Create the SQLite database and run schema migrations |
//! | `tctx task ...` | Create, inspect, move, update, and delete tasks |
//! | `tctx dep ...` | Manage and analyze dependency edges |
//! | `tctx resource ...` | Add documents and assign them to tasks |
//! | `tctx stats` | Database overview |
//! | `tctx context <CODE>` | Show the context assembled for a task |
//! | `tctx ask <CODE> "<question>"` | Answer a question using a task's context |
//!
//! ## Examples
//!
//! ```bash
//! tctx init
//! tctx task add "Build API" --code API
//! tctx task add "Auth endpoints" --code API-AUTH --parent API
//! tctx dep add API-AUTH DB-SCHEMA
//! tctx resource add "OAuth2 notes ..." --source https://example.com/oauth
//! tctx resource assign 1 API
//! tctx resource inherit API-AUTH
//! tctx context API-AUTH --scope inherit
//! tctx ask API-AUTH "What should I build first?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use task_context::resource_cmd;
use task_context::task_cmd::{self, TaskAddArgs, TaskUpdateArgs};
use task_context::{config, context_cmd, dep_cmd, migrate, stats};

/// Task Context CLI: hierarchical tasks, dependencies, and document context.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tctx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tctx",
    about = "Task Context: hierarchical tasks, dependency graphs, and scoped document context",
    version,
    long_about = "Task Context organizes work as a forest of tasks with dependency edges and \
    attached documents. Documents assigned to a task are inherited by its subtasks, and \
    questions about a task are answered from context gathered across the hierarchy."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tctx.toml")]
    config: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (`RUST_LOG` still wins).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent: running it multiple times is safe.
    Init,

    /// Manage tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage dependency edges between tasks.
    Dep {
        #[command(subcommand)]
        action: DepAction,
    },

    /// Manage documents and their task assignments.
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Show database statistics.
    Stats,

    /// Show the context assembled for a task.
    Context {
        /// Task code.
        code: String,

        /// self | subtasks | inherit | tree (default from config).
        #[arg(long)]
        scope: Option<String>,

        /// Maximum number of documents.
        #[arg(long)]
        limit: Option<usize>,

        /// Query for the general-document top-up (defaults to the task's
        /// title and description).
        #[arg(long)]
        question: Option<String>,

        /// Print counts and suggested scopes only.
        #[arg(long)]
        preview: bool,
    },

    /// Answer a question using a task's context.
    ///
    /// Requires `[answer] provider` to be configured.
    Ask {
        /// Task code.
        code: String,

        /// The question.
        question: String,

        /// self | subtasks | inherit | tree (default from config).
        #[arg(long)]
        scope: Option<String>,

        /// Maximum number of documents.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task.
    Add(TaskAddArgs),

    /// Show a task with its hierarchy, dependencies, and resources.
    Show { code: String },

    /// List tasks ordered by path.
    List {
        /// new | in_progress | blocked | done
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        owner: Option<String>,

        /// Only top-level tasks.
        #[arg(long)]
        roots: bool,
    },

    /// Print the task tree, from one task or from every root.
    Tree { code: Option<String> },

    /// Re-parent a task and its whole subtree.
    Move {
        code: String,

        /// New parent code.
        #[arg(long, conflicts_with = "root", required_unless_present = "root")]
        parent: Option<String>,

        /// Make the task a root.
        #[arg(long)]
        root: bool,
    },

    /// Set a task's progress (0-100); ancestors are recomputed.
    Progress { code: String, progress: i64 },

    /// Update descriptive fields of a task.
    Update(TaskUpdateArgs),

    /// Delete a task.
    Delete {
        code: String,

        /// Delete the whole subtree.
        #[arg(long)]
        cascade: bool,
    },
}

#[derive(Subcommand)]
enum DepAction {
    /// Record that DEPENDENT depends on PREREQUISITE.
    Add {
        dependent: String,
        prerequisite: String,

        /// blocks | related | subtask
        #[arg(long = "type", default_value = "blocks")]
        kind: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Remove the edge DEPENDENT -> PREREQUISITE.
    Remove {
        dependent: String,
        prerequisite: String,
    },

    /// List every edge, or one task's prerequisites and dependents.
    List { code: Option<String> },

    /// Build the dependency graph, optionally around some tasks.
    Graph {
        /// Task codes to restrict the graph to.
        codes: Vec<String>,
    },

    /// Report cycles, roots, leaves, and the longest chain.
    Analyze,
}

#[derive(Subcommand)]
enum ResourceAction {
    /// Add a document.
    Add {
        /// Document text (or use --file).
        text: Option<String>,

        /// Read the text from a file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Where the document came from (URL, path, ...).
        #[arg(long)]
        source: String,

        #[arg(long = "type", default_value = "web")]
        source_type: String,

        #[arg(long)]
        summary: Option<String>,
    },

    /// Assign a document to one or more tasks.
    Assign {
        id: i64,
        #[arg(required = true)]
        codes: Vec<String>,
        #[arg(long)]
        by: Option<String>,
    },

    /// Assign several documents to one task.
    BulkAssign {
        code: String,
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        by: Option<String>,
    },

    /// Remove a document from a task.
    Unassign { id: i64, code: String },

    /// List documents, newest first.
    List {
        /// unassigned | assigned | archived
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the tasks a document is attached to.
    Tasks { id: i64 },

    /// Copy every ancestor's documents onto a task.
    Inherit {
        code: String,
        #[arg(long)]
        by: Option<String>,
    },

    /// Hide a document from context assembly.
    Archive { id: i64 },

    /// Undo `archive`.
    Restore { id: i64 },
}

fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose { "debug" } else { level };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level, cli.verbose);
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Task { action } => match action {
            TaskAction::Add(args) => task_cmd::run_add(&cfg, args, json).await?,
            TaskAction::Show { code } => task_cmd::run_show(&cfg, &code, json).await?,
            TaskAction::List {
                status,
                owner,
                roots,
            } => task_cmd::run_list(&cfg, status, owner, roots, json).await?,
            TaskAction::Tree { code } => task_cmd::run_tree(&cfg, code, json).await?,
            TaskAction::Move { code, parent, .. } => {
                task_cmd::run_move(&cfg, &code, parent, json).await?
            }
            TaskAction::Progress { code, progress } => {
                task_cmd::run_progress(&cfg, &code, progress, json).await?
            }
            TaskAction::Update(args) => task_cmd::run_update(&cfg, args, json).await?,
            TaskAction::Delete { code, cascade } => {
                task_cmd::run_delete(&cfg, &code, cascade, json).await?
            }
        },
        Commands::Dep { action } => match action {
            DepAction::Add {
                dependent,
                prerequisite,
                kind,
                description,
            } => dep_cmd::run_add(&cfg, &dependent, &prerequisite, &kind, description, json).await?,
            DepAction::Remove {
                dependent,
                prerequisite,
            } => dep_cmd::run_remove(&cfg, &dependent, &prerequisite, json).await?,
            DepAction::List { code } => dep_cmd::run_list(&cfg, code, json).await?,
            DepAction::Graph { codes } => dep_cmd::run_graph(&cfg, codes, json).await?,
            DepAction::Analyze => dep_cmd::run_analyze(&cfg, json).await?,
        },
        Commands::Resource { action } => match action {
            ResourceAction::Add {
                text,
                file,
                source,
                source_type,
                summary,
            } => {
                resource_cmd::run_add(&cfg, text, file, &source, &source_type, summary, json)
                    .await?
            }
            ResourceAction::Assign { id, codes, by } => {
                resource_cmd::run_assign(&cfg, id, codes, by, json).await?
            }
            ResourceAction::BulkAssign { code, ids, by } => {
                resource_cmd::run_bulk_assign(&cfg, &code, ids, by, json).await?
            }
            ResourceAction::Unassign { id, code } => {
                resource_cmd::run_unassign(&cfg, id, &code, json).await?
            }
            ResourceAction::List { status, limit } => {
                resource_cmd::run_list(&cfg, status, limit, json).await?
            }
            ResourceAction::Tasks { id } => resource_cmd::run_tasks(&cfg, id, json).await?,
            ResourceAction::Inherit { code, by } => {
                resource_cmd::run_inherit(&cfg, &code, by, json).await?
            }
            ResourceAction::Archive { id } => {
                resource_cmd::run_set_archived(&cfg, id, true, json).await?
            }
            ResourceAction::Restore { id } => {
                resource_cmd::run_set_archived(&cfg, id, false, json).await?
            }
        },
        Commands::Stats => stats::run_stats(&cfg, json).await?,
        Commands::Context {
            code,
            scope,
            limit,
            question,
            preview,
        } => context_cmd::run_context(&cfg, &code, scope, limit, question, preview, json).await?,
        Commands::Ask {
            code,
            question,
            scope,
            limit,
        } => context_cmd::run_ask(&cfg, &code, &question, scope, limit, json).await?,
    }

    Ok(())
}
