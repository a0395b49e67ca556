//! `campo cache` command - Manage the reference cache
//!
//! The cache holds the site's tool and employee lists in a local
//! SQLite database. Entries age out by TTL but are still served when
//! stale; refresh pulls from the remote catalog and only rewrites an
//! entry whose content actually changed.

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::{helpers, GlobalOpts};
use crate::core::RefreshOutcome;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Fetch fresh tool and employee lists from the catalog
    Refresh,

    /// Show what is cached and how old it is
    Status,

    /// Drop the cached lists for this site
    Clear,
}

pub fn run(cmd: CacheCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CacheCommands::Refresh => run_refresh(global),
        CacheCommands::Status => run_status(global),
        CacheCommands::Clear => run_clear(global),
    }
}

fn run_refresh(global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let cache = helpers::open_cache(&ctx)?;
    let catalog = helpers::catalog(&ctx)?;

    println!("{} Refreshing reference lists...", style("→").blue());

    let tools = cache
        .refresh_tools(ctx.site(), &catalog)
        .map_err(|e| miette::miette!("tool refresh failed: {}", e))?;
    print_outcome("tools", tools);

    let employees = cache
        .refresh_employees(ctx.site(), &catalog)
        .map_err(|e| miette::miette!("employee refresh failed: {}", e))?;
    print_outcome("employees", employees);

    Ok(())
}

fn print_outcome(what: &str, outcome: RefreshOutcome) {
    match outcome {
        RefreshOutcome::Updated => {
            println!("{} {} updated", style("✓").green(), what)
        }
        RefreshOutcome::Unchanged => {
            println!("{} {} unchanged (TTL renewed)", style("✓").green(), what)
        }
    }
}

fn run_status(global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let cache = helpers::open_cache(&ctx)?;

    println!("Cache for site {}", style(ctx.site()).cyan());

    match cache.tools(ctx.site()).map_err(|e| miette::miette!("{}", e))? {
        Some(cached) => print_entry("tools", cached.payload.len(), cached.fetched_at, cached.stale),
        None => println!("  tools:     {}", style("not cached").yellow()),
    }
    match cache
        .employees(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?
    {
        Some(cached) => {
            print_entry("employees", cached.payload.len(), cached.fetched_at, cached.stale)
        }
        None => println!("  employees: {}", style("not cached").yellow()),
    }
    Ok(())
}

fn print_entry(what: &str, count: usize, fetched_at: chrono::DateTime<chrono::Utc>, stale: bool) {
    let freshness = if stale {
        style("stale").yellow().to_string()
    } else {
        style("fresh").green().to_string()
    };
    println!(
        "  {:<10}{} entries, fetched {} ({})",
        format!("{}:", what),
        count,
        fetched_at.format("%Y-%m-%d %H:%M"),
        freshness
    );
}

fn run_clear(global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let cache = helpers::open_cache(&ctx)?;

    cache
        .reset(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?;
    println!(
        "{} Cleared cached lists for site {}",
        style("✓").green(),
        style(ctx.site()).cyan()
    );
    Ok(())
}
