//! `campo status` command - workspace dashboard

use chrono::Utc;
use console::style;
use miette::Result;

use crate::cli::{helpers, GlobalOpts};
use crate::core::{aging, Aging, LedgerSnapshot, ReportState};
use crate::core::store::RecordStore;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {}

pub fn run(_args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;

    println!(
        "Site {} ({} as {})",
        style(ctx.site()).cyan(),
        style(&ctx.session.user).cyan(),
        ctx.session.role
    );
    println!();

    // Reference cache
    let cache = helpers::open_cache(&ctx)?;
    let tools = cache.tools(ctx.site()).map_err(|e| miette::miette!("{}", e))?;
    let employees = cache
        .employees(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?;
    println!("Reference cache:");
    println!("  tools:     {}", cache_line(&tools));
    println!("  employees: {}", cache_line(&employees));
    println!();

    // Custody ledger
    let ledger = helpers::open_ledger(&ctx)?;
    print!("Custody ledger: ");
    match ledger
        .snapshot(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?
    {
        LedgerSnapshot::Unknown => {
            println!("{} (run 'campo sync')", style("never synced").yellow())
        }
        LedgerSnapshot::Ready(entries) => {
            let synced = ledger
                .last_synced(ctx.site())
                .map_err(|e| miette::miette!("{}", e))?
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("{} tool(s) in the field, synced {}", entries.len(), synced);
        }
    }
    println!();

    // Open reports with aging buckets
    let store = helpers::open_store(&ctx)?;
    let reports = store
        .reports_for_site(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?;
    let now = Utc::now();
    let (mut open, mut late, mut critical) = (0usize, 0usize, 0usize);
    for report in reports.iter().filter(|r| r.state == ReportState::Open) {
        open += 1;
        match aging(report.opened_at, now).1 {
            Aging::OnTime => {}
            Aging::Late => late += 1,
            Aging::Critical => critical += 1,
        }
    }
    println!("Reports: {} open", open);
    if late > 0 {
        println!("  {} {} late (7+ days)", style("!").yellow(), late);
    }
    if critical > 0 {
        println!("  {} {} critical (14+ days)", style("✗").red(), critical);
    }

    Ok(())
}

fn cache_line<T>(entry: &Option<crate::core::Cached<Vec<T>>>) -> String {
    match entry {
        None => style("not cached").yellow().to_string(),
        Some(cached) => {
            let freshness = if cached.stale {
                style("stale").yellow().to_string()
            } else {
                style("fresh").green().to_string()
            };
            format!(
                "{} entries, fetched {} ({})",
                cached.payload.len(),
                cached.fetched_at.format("%Y-%m-%d %H:%M"),
                freshness
            )
        }
    }
}
