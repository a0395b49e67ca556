//! `campo sync` command - fold the record store's change feed into the
//! custody ledger mirror

use console::style;
use miette::Result;

use crate::cli::{helpers, GlobalOpts};
use crate::core::LedgerSnapshot;

#[derive(clap::Args, Debug)]
pub struct SyncArgs {}

pub fn run(_args: SyncArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = helpers::context(global)?;
    let store = helpers::open_store(&ctx)?;
    let ledger = helpers::open_ledger(&ctx)?;

    let applied = ledger
        .sync(ctx.site(), &store)
        .map_err(|e| miette::miette!("{}", e))?;

    let in_field = match ledger
        .snapshot(ctx.site())
        .map_err(|e| miette::miette!("{}", e))?
    {
        LedgerSnapshot::Ready(entries) => entries.len(),
        LedgerSnapshot::Unknown => 0,
    };

    println!(
        "{} Applied {} change(s); {} tool(s) in the field for site {}",
        style("✓").green(),
        applied,
        in_field,
        style(ctx.site()).cyan()
    );
    Ok(())
}
