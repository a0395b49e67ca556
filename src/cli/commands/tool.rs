//! `campo tool` command - search the catalog and see who holds what

use chrono::Utc;
use clap::Subcommand;
use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::{helpers, GlobalOpts};
use crate::core::{aging, search, Aging, LedgerSnapshot, LocalCatalog};

#[derive(Subcommand, Debug)]
pub enum ToolCommands {
    /// Look a tool up by patrimony or serial
    Search(SearchArgs),

    /// List every tool currently out in the field
    Inventory,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Patrimony or serial, as scanned or typed
    pub term: String,
}

pub fn run(cmd: ToolCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ToolCommands::Search(args) => run_search(args, global),
        ToolCommands::Inventory => run_inventory(global),
    }
}

fn run_search(args: SearchArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let cache = helpers::open_cache(&ctx)?;
    let ledger = helpers::open_ledger(&ctx)?;

    // Read through the cache when a catalog is configured; a stale or
    // missing list is refreshed in place, and a stale copy still serves
    // through an outage.
    let remote = helpers::catalog_if_configured(&ctx)?;
    let cached = match &remote {
        Some(catalog) => cache
            .tools_through(ctx.site(), catalog)
            .map_err(|e| miette::miette!("{}", e))?,
        None => cache
            .tools(ctx.site())
            .map_err(|e| miette::miette!("{}", e))?
            .ok_or_else(|| {
                miette::miette!("no cached tool list for this site. Run 'campo cache refresh'")
            })?,
    };
    if cached.stale && !global.quiet {
        eprintln!(
            "{} tool list is stale (fetched {})",
            style("!").yellow(),
            cached.fetched_at.format("%Y-%m-%d %H:%M")
        );
    }

    let catalog = LocalCatalog::new(cached.payload, Vec::new());
    let found = search(&catalog, &args.term).map_err(|e| miette::miette!("{}", e))?;
    let snapshot = ledger
        .snapshot(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?;
    let battery_categories = ctx.config.battery_categories();

    for tool in &found {
        let identity = tool.identity().map_err(|e| miette::miette!("{}", e))?;
        println!(
            "{}  {}",
            style(&identity).cyan(),
            style(&tool.description).bold()
        );
        println!("  Category: {}", tool.category_code);
        if !tool.catalog_status.is_empty() {
            println!("  Catalog:  {}", tool.catalog_status);
        }

        match &snapshot {
            LedgerSnapshot::Unknown => {
                println!(
                    "  Custody:  {} (ledger never synced; run 'campo sync')",
                    style("unknown").yellow()
                );
            }
            LedgerSnapshot::Ready(entries) => {
                let is_battery = |code: &str| battery_categories.iter().any(|c| c == code);
                match entries.iter().find(|e| {
                    let battery = is_battery(&tool.category_code) || is_battery(&e.category_code);
                    identity.matches(&e.identity, battery)
                }) {
                    Some(holder) => println!(
                        "  Custody:  {} with {} since {} (report #{})",
                        style("in the field").red(),
                        holder.employee,
                        holder.opened_at.format("%Y-%m-%d"),
                        holder.report_number
                    ),
                    None => println!("  Custody:  {}", style("in the warehouse").green()),
                }
            }
        }
        println!();
    }
    Ok(())
}

fn run_inventory(global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let ledger = helpers::open_ledger(&ctx)?;

    let entries = match ledger
        .snapshot(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?
    {
        LedgerSnapshot::Unknown => {
            return Err(miette::miette!(
                "the custody ledger has never synced for this site. Run 'campo sync'"
            ));
        }
        LedgerSnapshot::Ready(entries) => entries,
    };

    if entries.is_empty() {
        println!(
            "Nothing out in the field for site {}",
            style(ctx.site()).cyan()
        );
        return Ok(());
    }

    let now = Utc::now();
    let mut builder = Builder::default();
    builder.push_record(["Tool", "Description", "With", "Report", "Out for"]);
    for entry in &entries {
        let (days, bucket) = aging(entry.opened_at, now);
        let age = match bucket {
            Aging::OnTime => helpers::days_label(days),
            Aging::Late => format!("{} {}", helpers::days_label(days), style("late").yellow()),
            Aging::Critical => {
                format!("{} {}", helpers::days_label(days), style("CRITICAL").red())
            }
        };
        builder.push_record([
            entry.identity.to_string(),
            entry.description.clone(),
            entry.employee.clone(),
            format!("#{}", entry.report_number),
            age,
        ]);
    }

    println!("{}", builder.build().with(Style::markdown()));
    if !global.quiet {
        println!();
        println!("{} tool(s) in the field", entries.len());
    }
    Ok(())
}
