//! `campo employee` command - cached employee roster

use clap::Subcommand;
use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::{helpers, GlobalOpts};

#[derive(Subcommand, Debug)]
pub enum EmployeeCommands {
    /// List the cached employees for the site
    List,
}

pub fn run(cmd: EmployeeCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        EmployeeCommands::List => run_list(global),
    }
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let cache = helpers::open_cache(&ctx)?;

    let cached = cache
        .employees(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?
        .ok_or_else(|| {
            miette::miette!("no cached employee list for this site. Run 'campo cache refresh'")
        })?;
    if cached.stale && !global.quiet {
        eprintln!(
            "{} employee list is stale (fetched {})",
            style("!").yellow(),
            cached.fetched_at.format("%Y-%m-%d %H:%M")
        );
    }

    if cached.payload.is_empty() {
        println!("No employees cached for site {}", style(ctx.site()).cyan());
        return Ok(());
    }

    let mut builder = Builder::default();
    builder.push_record(["Membership", "Name"]);
    for employee in &cached.payload {
        builder.push_record([employee.membership_id.clone(), employee.name.clone()]);
    }

    println!("{}", builder.build().with(Style::markdown()));
    if !global.quiet {
        println!();
        println!("{} employee(s)", cached.payload.len());
    }
    Ok(())
}
