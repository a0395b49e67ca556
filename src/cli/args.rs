//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    cache::CacheCommands, employee::EmployeeCommands, init::InitArgs, report::ReportCommands,
    status::StatusArgs, sync::SyncArgs, tool::ToolCommands,
};
use crate::core::Role;

#[derive(Parser)]
#[command(name = "campo")]
#[command(author, version, about = "Field tool custody for construction sites")]
#[command(long_about = "Tracks which tools left the warehouse with whom, via numbered \
check-out reports with offline-tolerant conflict detection.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Site id (default: from config or CAMPO_SITE)
    #[arg(long, global = true)]
    pub site: Option<String>,

    /// Operating user (default: $USER)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Session role
    #[arg(long, global = true, default_value = "field")]
    pub role: Role,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Workspace root (default: auto-detect by finding .campo/)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new campo workspace
    Init(InitArgs),

    /// Check-out report management
    #[command(subcommand)]
    Report(ReportCommands),

    /// Tool lookup and inventory
    #[command(subcommand)]
    Tool(ToolCommands),

    /// Cached employee roster
    #[command(subcommand)]
    Employee(EmployeeCommands),

    /// Manage the reference cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Pull the record store's change feed into the custody ledger
    Sync(SyncArgs),

    /// Show workspace status dashboard
    Status(StatusArgs),
}
