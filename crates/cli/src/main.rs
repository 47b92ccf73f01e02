//! chatmend
//!
//! Rebuilds chat session indexes and panel caches from the session records
//! on disk. The editor must be closed while a repair runs.

mod cmd_list;
mod cmd_merge;
mod cmd_repair;
mod logging;
mod paths;
mod prompt;

use std::path::PathBuf;

use anyhow::Result;
use chatmend_engine::{RepairOptions, Variant};
use clap::{Parser, Subcommand};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "chatmend", version, about = "Repair chat session history for VS Code workspaces")]
struct Cli {
    /// Use VS Code Insiders storage
    #[arg(long, global = true)]
    insiders: bool,

    /// Workspace storage directory (overrides CHATMEND_STORAGE_ROOT)
    #[arg(long, global = true, value_name = "PATH")]
    storage_root: Option<PathBuf>,

    /// Show what would change without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Drop index entries whose session file no longer exists
    #[arg(long, global = true)]
    remove_orphans: bool,

    /// Copy orphaned sessions back from other workspaces before repairing
    #[arg(long, global = true)]
    recover_orphans: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List workspaces that have chat sessions
    List {
        /// Include workspaces that need no repair
        #[arg(long)]
        all: bool,
    },
    /// Repair one workspace, or every workspace that needs it
    Repair {
        /// Workspace storage id (directory name)
        namespace_id: Option<String>,
    },
    /// Merge sessions from duplicate workspaces of the same project
    Merge,
}

impl Cli {
    fn variant(&self) -> Variant {
        if self.insiders {
            Variant::Insiders
        } else {
            Variant::Stable
        }
    }

    fn repair_options(&self) -> RepairOptions {
        RepairOptions {
            remove_orphans: self.remove_orphans,
            recover_orphans: self.recover_orphans,
            dry_run: self.dry_run,
        }
    }

    /// Writes need a yes unless nothing will be written.
    fn confirm_mode(&self) -> prompt::Confirm {
        if self.yes || self.dry_run {
            prompt::Confirm::Skip
        } else {
            prompt::Confirm::Ask
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logging = logging::init_logging(cli.log_file.as_deref())?;
    let config = paths::storage_config(cli.storage_root.as_deref(), cli.variant())?;

    match &cli.command {
        Commands::List { all } => cmd_list::run(&config, *all),
        Commands::Repair { namespace_id } => cmd_repair::run(
            &config,
            namespace_id.as_deref(),
            cli.repair_options(),
            cli.confirm_mode(),
        ),
        Commands::Merge => cmd_merge::run(&config, cli.dry_run, cli.confirm_mode()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = Cli::parse_from([
            "chatmend",
            "repair",
            "abc123",
            "--dry-run",
            "--remove-orphans",
            "--insiders",
        ]);
        assert_eq!(cli.variant(), Variant::Insiders);
        assert_eq!(
            cli.repair_options(),
            RepairOptions {
                remove_orphans: true,
                recover_orphans: false,
                dry_run: true,
            }
        );
        assert_eq!(cli.confirm_mode(), prompt::Confirm::Skip);
        match cli.command {
            Commands::Repair { namespace_id } => assert_eq!(namespace_id.as_deref(), Some("abc123")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn writes_ask_for_confirmation_by_default() {
        let cli = Cli::parse_from(["chatmend", "merge"]);
        assert_eq!(cli.confirm_mode(), prompt::Confirm::Ask);
        let cli = Cli::parse_from(["chatmend", "-y", "merge"]);
        assert_eq!(cli.confirm_mode(), prompt::Confirm::Skip);
    }
}
