//! `campo report` command - open, list, show and close check-out reports

use chrono::Utc;
use clap::Subcommand;
use console::style;
use dialoguer::Confirm;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::{helpers, GlobalOpts};
use crate::core::{
    aging, search, Aging, CatalogTool, ConflictDetector, Disposition, Employee, LocalCatalog,
    Report, ReportDraft, ReportLifecycle, ReportState,
};
use crate::core::identity::normalize_search_term;
use crate::core::store::RecordStore;

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Open a new check-out report
    New(NewArgs),

    /// List reports for the site
    List(ListArgs),

    /// Show one report in full
    Show(ShowArgs),

    /// Return or write off one tool on a report
    Close(CloseArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Employee membership id taking the tools
    #[arg(long, short = 'e')]
    pub employee: String,

    /// Tool to check out (patrimony or serial; repeatable)
    #[arg(long, short = 't')]
    pub tool: Vec<String>,

    /// Uncataloged tool as "patrimony:serial:description" (repeatable)
    #[arg(long)]
    pub manual: Vec<String>,

    /// Opening signature image ref
    #[arg(long, short = 's')]
    pub signature: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Include closed reports
    #[arg(long)]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Report number
    pub number: u32,
}

#[derive(clap::Args, Debug)]
pub struct CloseArgs {
    /// Report number
    pub number: u32,

    /// Tool to close (patrimony or serial)
    #[arg(long, short = 't')]
    pub tool: String,

    /// Mark the tool as lost instead of returned
    #[arg(long)]
    pub lost: bool,

    /// Note for the record (required with --lost)
    #[arg(long, default_value = "")]
    pub note: String,

    /// Photo ref to attach to the record (repeatable)
    #[arg(long)]
    pub photo: Vec<String>,

    /// Closing signature image ref (required for the last open record)
    #[arg(long, short = 's')]
    pub signature: Option<String>,

    /// Skip the confirmation prompt for --lost
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(cmd: ReportCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ReportCommands::New(args) => run_new(args, global),
        ReportCommands::List(args) => run_list(args, global),
        ReportCommands::Show(args) => run_show(args, global),
        ReportCommands::Close(args) => run_close(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    if args.tool.is_empty() && args.manual.is_empty() {
        return Err(miette::miette!(
            "nothing to check out. Pass at least one --tool or --manual"
        ));
    }

    let ctx = helpers::context(global)?;
    let store = helpers::open_store(&ctx)?;
    let ledger = helpers::open_ledger(&ctx)?;

    // Keeping the mirror current before conflict checks; a failure here
    // is only fatal if the ledger has never synced, and then the
    // detector refuses on its own.
    if let Err(e) = ledger.sync(ctx.site(), &store) {
        if !global.quiet {
            eprintln!("{} ledger sync failed: {}", style("!").yellow(), e);
        }
    }
    let snapshot = ledger.snapshot(ctx.site()).map_err(|e| miette::miette!("{}", e))?;

    let (tools, employees) = load_reference(&ctx, global)?;
    let employee = resolve_employee(&employees, &args.employee)?.clone();
    let catalog = LocalCatalog::new(tools, employees);
    let detector = ConflictDetector::new(ctx.config.battery_categories());

    let mut draft = ReportDraft::new(ctx.site());
    draft.set_employee(employee);

    for term in &args.tool {
        let tool = resolve_tool(&catalog, term)?;
        draft
            .add_tool(&tool, &detector, &snapshot)
            .map_err(|e| miette::miette!("{}: {}", style(term).cyan(), e))?;
    }
    for entry in &args.manual {
        let (patrimony, serial, description) = parse_manual(entry)?;
        draft
            .add_manual(patrimony, serial, description, &detector, &snapshot)
            .map_err(|e| miette::miette!("{}: {}", style(entry).cyan(), e))?;
    }

    let lifecycle = ReportLifecycle::new(&store);
    let count = draft.records().len();
    let report = lifecycle
        .commit(draft, &args.signature)
        .map_err(|e| miette::miette!("{}", e))?;

    // Fold the fresh commit into the mirror right away.
    let _ = ledger.sync(ctx.site(), &store);

    println!(
        "{} Opened report {} for {} with {} tool(s)",
        style("✓").green(),
        style(format!("#{}", report.report_number)).cyan(),
        style(&report.employee).cyan(),
        count
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let store = helpers::open_store(&ctx)?;
    let reports = store
        .reports_for_site(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?;

    let now = Utc::now();
    let mut builder = Builder::default();
    builder.push_record(["#", "Employee", "Opened", "Age", "Tools", "State"]);

    let mut shown = 0;
    for report in &reports {
        if !args.all && report.state == ReportState::Closed {
            continue;
        }
        let (days, bucket) = aging(report.opened_at, now);
        let open = report.open_records().count();
        builder.push_record([
            report.report_number.to_string(),
            report.employee.clone(),
            report.opened_at.format("%Y-%m-%d").to_string(),
            age_label(days, bucket, report.state),
            format!("{}/{} out", open, report.custom_tools.len()),
            report.state.to_string(),
        ]);
        shown += 1;
    }

    if shown == 0 {
        println!("No reports for site {}", style(ctx.site()).cyan());
        return Ok(());
    }

    println!("{}", builder.build().with(Style::markdown()));
    if !global.quiet {
        println!();
        println!("{} report(s)", shown);
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let store = helpers::open_store(&ctx)?;
    let report = find_report(&store, ctx.site(), args.number)?;

    let (days, bucket) = aging(report.opened_at, Utc::now());
    println!(
        "Report {} ({})",
        style(format!("#{}", report.report_number)).cyan(),
        report.state
    );
    println!("  Employee: {} ({})", report.employee, report.membership_id);
    println!(
        "  Opened:   {} ({})",
        report.opened_at.format("%Y-%m-%d %H:%M"),
        age_label(days, bucket, report.state)
    );
    if let Some(closed_at) = report.closed_at {
        println!("  Closed:   {}", closed_at.format("%Y-%m-%d %H:%M"));
    }
    println!();

    let mut builder = Builder::default();
    builder.push_record(["Tool", "Description", "State", "Closed", "Note"]);
    for record in &report.custom_tools {
        builder.push_record([
            record.identity.to_string(),
            record.description.clone(),
            record.state.to_string(),
            record
                .closed_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            record.note.clone(),
        ]);
    }
    println!("{}", builder.build().with(Style::markdown()));
    Ok(())
}

fn run_close(args: CloseArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let store = helpers::open_store(&ctx)?;
    let ledger = helpers::open_ledger(&ctx)?;
    let mut report = find_report(&store, ctx.site(), args.number)?;

    // A bare battery number matches its B-prefixed tag, but a manually
    // entered record may carry the bare number as its patrimony, so the
    // raw term has to match too.
    let raw = args.tool.trim().to_uppercase();
    let normalized = normalize_search_term(&args.tool);
    let identity = report
        .open_records()
        .map(|r| r.identity.clone())
        .find(|id| {
            id.patrimony == raw
                || id.serial == raw
                || id.patrimony == normalized
                || id.serial == normalized
        })
        .ok_or_else(|| {
            miette::miette!(
                "no open record matching {} on report #{}",
                style(&args.tool).cyan(),
                args.number
            )
        })?;

    let disposition = if args.lost {
        if !args.yes {
            let confirmed = Confirm::new()
                .with_prompt(format!("Write off {} as lost?", identity))
                .default(false)
                .interact()
                .into_diagnostic()?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
        }
        Disposition::Lost
    } else {
        Disposition::Returned
    };

    let lifecycle = ReportLifecycle::new(&store);
    let closed_report = lifecycle
        .close_record(
            &mut report,
            &identity,
            disposition,
            &args.note,
            &args.photo,
            args.signature.as_deref(),
        )
        .map_err(|e| miette::miette!("{}", e))?;

    let _ = ledger.sync(ctx.site(), &store);

    let verb = match disposition {
        Disposition::Returned => "returned",
        Disposition::Lost => "written off",
    };
    println!("{} {} {}", style("✓").green(), style(identity).cyan(), verb);
    if closed_report {
        println!(
            "{} Report {} is now closed",
            style("✓").green(),
            style(format!("#{}", report.report_number)).cyan()
        );
    }
    Ok(())
}

/// Load the reference lists read-through: a configured catalog freshens
/// stale or missing entries, and a cached copy survives a catalog
/// outage. Without a catalog only the cache is consulted.
fn load_reference(
    ctx: &helpers::CliContext,
    global: &GlobalOpts,
) -> Result<(Vec<CatalogTool>, Vec<Employee>)> {
    let cache = helpers::open_cache(ctx)?;
    let remote = helpers::catalog_if_configured(ctx)?;

    let (tools, employees) = match &remote {
        Some(catalog) => {
            let tools = cache
                .tools_through(ctx.site(), catalog)
                .map_err(|e| miette::miette!("{}", e))?;
            let employees = cache
                .employees_through(ctx.site(), catalog)
                .map_err(|e| miette::miette!("{}", e))?;
            (tools, employees)
        }
        None => {
            let tools = cache
                .tools(ctx.site())
                .map_err(|e| miette::miette!("{}", e))?
                .ok_or_else(|| {
                    miette::miette!("no cached tool list for this site. Run 'campo cache refresh'")
                })?;
            let employees = cache
                .employees(ctx.site())
                .map_err(|e| miette::miette!("{}", e))?
                .ok_or_else(|| {
                    miette::miette!(
                        "no cached employee list for this site. Run 'campo cache refresh'"
                    )
                })?;
            (tools, employees)
        }
    };

    if !global.quiet {
        if tools.stale {
            eprintln!(
                "{} tool list is stale (fetched {})",
                style("!").yellow(),
                tools.fetched_at.format("%Y-%m-%d %H:%M")
            );
        }
        if employees.stale {
            eprintln!(
                "{} employee list is stale (fetched {})",
                style("!").yellow(),
                employees.fetched_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok((tools.payload, employees.payload))
}

fn resolve_employee<'a>(employees: &'a [Employee], membership_id: &str) -> Result<&'a Employee> {
    let wanted = membership_id.trim();
    employees
        .iter()
        .find(|e| e.membership_id == wanted)
        .ok_or_else(|| {
            miette::miette!(
                "no employee with membership id {} on this site. See 'campo employee list'",
                style(wanted).cyan()
            )
        })
}

fn resolve_tool(catalog: &LocalCatalog, term: &str) -> Result<CatalogTool> {
    let mut found = search(catalog, term).map_err(|e| miette::miette!("{}", e))?;
    if found.len() > 1 {
        let tags: Vec<String> = found
            .iter()
            .map(|t| {
                if t.patrimony.is_empty() {
                    t.serial.clone()
                } else {
                    t.patrimony.clone()
                }
            })
            .collect();
        return Err(miette::miette!(
            "{} matches {} tools ({}); use the full patrimony or serial",
            style(term).cyan(),
            found.len(),
            tags.join(", ")
        ));
    }
    Ok(found.remove(0))
}

fn parse_manual(entry: &str) -> Result<(&str, &str, &str)> {
    let mut parts = entry.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(patrimony), Some(serial), Some(description)) if !description.trim().is_empty() => {
            Ok((patrimony, serial, description))
        }
        _ => Err(miette::miette!(
            "manual tool must be \"patrimony:serial:description\" (got {:?})",
            entry
        )),
    }
}

fn find_report(store: &crate::core::SqliteStore, site: &str, number: u32) -> Result<Report> {
    store
        .reports_for_site(site)
        .map_err(|e| miette::miette!("{}", e))?
        .into_iter()
        .find(|r| r.report_number == number)
        .ok_or_else(|| miette::miette!("no report #{} for site {}", number, site))
}

fn age_label(days: i64, bucket: Aging, state: ReportState) -> String {
    if state == ReportState::Closed {
        return helpers::days_label(days);
    }
    match bucket {
        Aging::OnTime => helpers::days_label(days),
        Aging::Late => format!("{} {}", helpers::days_label(days), style("late").yellow()),
        Aging::Critical => format!("{} {}", helpers::days_label(days), style("CRITICAL").red()),
    }
}
