pub mod commands;
pub mod context;
pub mod output;
pub mod tree;

pub use context::Context;

use crate::errors::Result;
use crate::forge::MergeMethod;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "stk")]
#[command(about = "Manage stacks of dependent Git branches")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new stack
    Init {
        /// Name of the stack
        name: String,
        /// Base branch (auto-detected when omitted)
        #[arg(long, short)]
        base: Option<String>,
    },

    /// Show the current stack
    #[command(alias = "st")]
    Status {
        /// Show commit SHAs
        #[arg(long)]
        sha: bool,
    },

    /// List all stacks
    #[command(alias = "ls")]
    List,

    /// Switch to a different stack
    #[command(alias = "sw")]
    Switch {
        /// Name of the stack to switch to
        name: String,
    },

    /// Delete a stack definition (git branches are kept)
    Delete {
        /// Name of the stack to delete
        name: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Rename a stack
    Rename {
        old_name: String,
        new_name: String,
    },

    /// Validate stack integrity
    Doctor {
        /// Drop a snapshot left behind by an interrupted rebase
        #[arg(long)]
        clear_snapshot: bool,
    },

    /// Show the stack as a tree with SHAs and PRs
    Log,

    /// Create a new branch at HEAD and add it to the stack
    #[command(alias = "br")]
    Branch {
        /// Name of the new branch
        name: String,
    },

    /// Add an existing branch to the stack
    Add {
        /// Name of the branch to add
        name: String,
        /// Insert after this branch instead of appending
        #[arg(long)]
        after: Option<String>,
    },

    /// Remove a branch from the stack (the git branch is kept)
    Remove {
        /// Name of the branch to remove
        name: String,
    },

    /// Move a branch to a new position in the stack
    Move {
        /// Name of the branch to move
        name: String,
        /// Place it after this branch (the base branch means the front)
        #[arg(long)]
        after: String,
    },

    /// Checkout the parent branch
    Up,

    /// Checkout the child branch
    Down,

    /// Checkout the base branch
    Top,

    /// Checkout the last branch in the stack
    #[command(alias = "bot")]
    Bottom,

    /// Checkout the nth branch (0 is the base)
    #[command(alias = "go")]
    Goto {
        /// Position in the stack
        position: usize,
    },

    /// Show the current branch's position in the stack
    Which,

    /// Rebase every branch onto its parent, atomically by default
    Rebase {
        /// Start from this branch
        #[arg(long)]
        from: Option<String>,
        /// Stop at this branch
        #[arg(long)]
        to: Option<String>,
        /// Keep partial progress instead of rolling back on failure
        #[arg(long)]
        no_atomic: bool,
    },

    /// Interactive rebase of one branch's commits onto its parent
    Edit {
        /// Branch to edit (defaults to the current branch)
        branch: Option<String>,
    },

    /// Reconcile the stack with remote PR state and rebase; never pushes
    Sync {
        /// Skip fetching from the remote
        #[arg(long)]
        no_fetch: bool,
        /// Skip pulling the base branch
        #[arg(long)]
        no_update_base: bool,
        /// Skip refreshing and reconciling PRs
        #[arg(long)]
        no_prs: bool,
        /// Skip the final stack rebase
        #[arg(long)]
        no_rebase: bool,
        /// Delete local branches whose PRs were merged
        #[arg(long)]
        delete_branches: bool,
    },

    /// Push all branches and create or update PRs
    Submit {
        /// Title for newly created PRs (defaults to the branch name)
        #[arg(long, short)]
        title: Option<String>,
        /// Create new PRs as drafts
        #[arg(long)]
        draft: bool,
        /// Add reviewers to new PRs
        #[arg(long = "reviewer")]
        reviewers: Vec<String>,
        /// Push only; don't create new PRs
        #[arg(long)]
        no_create_prs: bool,
        /// Don't rewrite existing PR descriptions
        #[arg(long)]
        no_update_prs: bool,
        /// Submit even when the base branch is behind the remote
        #[arg(long)]
        force: bool,
    },

    /// Pull request operations
    Pr {
        #[command(subcommand)]
        action: PrAction,
    },
}

#[derive(Subcommand)]
pub enum PrAction {
    /// Show PR status for all branches
    #[command(alias = "st")]
    Status {
        /// Refresh PR state from the forge
        #[arg(long)]
        refresh: bool,
    },

    /// Open a PR in the browser
    View {
        /// Branch whose PR to open (defaults to the current branch)
        branch: Option<String>,
    },

    /// Create PRs for branches that lack one
    Create {
        /// Create a PR for this branch only
        branch: Option<String>,
        /// Create PRs as drafts
        #[arg(long)]
        draft: bool,
        /// Add reviewers
        #[arg(long = "reviewer")]
        reviewers: Vec<String>,
        /// PR title (defaults to the branch name)
        #[arg(long, short)]
        title: Option<String>,
    },

    /// Rewrite PR descriptions with the current stack section
    Update {
        /// Update this branch's PR only
        branch: Option<String>,
    },

    /// Close a PR without merging
    Close {
        /// Branch whose PR to close
        branch: String,
    },

    /// Merge a PR and update the stack
    Merge {
        /// Branch to merge (defaults to the first open PR)
        branch: Option<String>,
        /// Merge method
        #[arg(long, value_enum, default_value = "merge")]
        method: MergeMethodArg,
        /// Delete the remote branch after merging
        #[arg(long)]
        delete: bool,
        /// Keep the branch in the stack after merging
        #[arg(long)]
        keep_in_stack: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MergeMethodArg {
    Merge,
    Squash,
    Rebase,
}

impl From<MergeMethodArg> for MergeMethod {
    fn from(arg: MergeMethodArg) -> Self {
        match arg {
            MergeMethodArg::Merge => MergeMethod::Merge,
            MergeMethodArg::Squash => MergeMethod::Squash,
            MergeMethodArg::Rebase => MergeMethod::Rebase,
        }
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        self.setup_logging();
        if self.no_color {
            console::set_colors_enabled(false);
        }

        match self.command {
            Commands::Init { name, base } => commands::init::run(&name, base),
            Commands::Status { sha } => commands::stack::status(sha),
            Commands::List => commands::stack::list(),
            Commands::Switch { name } => commands::stack::switch(&name),
            Commands::Delete { name, force } => commands::stack::delete(&name, force),
            Commands::Rename { old_name, new_name } => {
                commands::stack::rename(&old_name, &new_name)
            }
            Commands::Doctor { clear_snapshot } => commands::stack::doctor(clear_snapshot),
            Commands::Log => commands::stack::log(),

            Commands::Branch { name } => commands::branch::branch(&name),
            Commands::Add { name, after } => commands::branch::add(&name, after.as_deref()),
            Commands::Remove { name } => commands::branch::remove(&name),
            Commands::Move { name, after } => commands::branch::move_branch(&name, &after),
            Commands::Up => commands::branch::up(),
            Commands::Down => commands::branch::down(),
            Commands::Top => commands::branch::top(),
            Commands::Bottom => commands::branch::bottom(),
            Commands::Goto { position } => commands::branch::goto(position),
            Commands::Which => commands::branch::which(),

            Commands::Rebase { from, to, no_atomic } => {
                commands::rebase::rebase(from, to, no_atomic)
            }
            Commands::Edit { branch } => commands::rebase::edit(branch.as_deref()),

            Commands::Sync {
                no_fetch,
                no_update_base,
                no_prs,
                no_rebase,
                delete_branches,
            } => commands::sync::run(commands::sync::SyncOptions {
                no_fetch,
                no_update_base,
                no_prs,
                no_rebase,
                delete_branches,
            }),

            Commands::Submit {
                title,
                draft,
                reviewers,
                no_create_prs,
                no_update_prs,
                force,
            } => commands::submit::run(commands::submit::SubmitOptions {
                title,
                draft,
                reviewers,
                no_create: no_create_prs,
                no_update: no_update_prs,
                force,
            }),

            Commands::Pr { action } => match action {
                PrAction::Status { refresh } => commands::pr::status(refresh),
                PrAction::View { branch } => commands::pr::view(branch.as_deref()),
                PrAction::Create {
                    branch,
                    draft,
                    reviewers,
                    title,
                } => commands::pr::create(branch.as_deref(), draft, reviewers, title),
                PrAction::Update { branch } => commands::pr::update(branch.as_deref()),
                PrAction::Close { branch } => commands::pr::close(&branch),
                PrAction::Merge {
                    branch,
                    method,
                    delete,
                    keep_in_stack,
                } => commands::pr::merge(branch.as_deref(), method.into(), delete, keep_in_stack),
            },
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
