//! Shared command plumbing: workspace/session resolution and store handles

use miette::Result;

use crate::cli::GlobalOpts;
use crate::core::{
    Config, CustodyLedger, ReferenceCache, RestCatalog, SessionContext, SqliteStore, Workspace,
};

/// Everything a command needs to get going.
pub struct CliContext {
    pub workspace: Workspace,
    pub config: Config,
    pub session: SessionContext,
}

impl CliContext {
    pub fn site(&self) -> &str {
        &self.session.site
    }
}

/// Resolve workspace, config and session for a command invocation.
pub fn context(global: &GlobalOpts) -> Result<CliContext> {
    let workspace = match &global.workspace {
        Some(path) => Workspace::discover_from(path),
        None => Workspace::discover(),
    }
    .map_err(|e| miette::miette!("{}", e))?;

    let config = Config::load();

    let site = global
        .site
        .clone()
        .or_else(|| config.site.clone())
        .ok_or_else(|| {
            miette::miette!(
                "no site configured. Set `site:` in .campo/config.yaml, export CAMPO_SITE, or pass --site"
            )
        })?;
    let user = global
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());

    let session = SessionContext::new(&site, &user, global.role)
        .map_err(|e| miette::miette!("{}", e))?;

    Ok(CliContext {
        workspace,
        config,
        session,
    })
}

pub fn open_store(ctx: &CliContext) -> Result<SqliteStore> {
    SqliteStore::open(&ctx.workspace.records_db()).map_err(|e| miette::miette!("{}", e))
}

pub fn open_ledger(ctx: &CliContext) -> Result<CustodyLedger> {
    CustodyLedger::open(&ctx.workspace.ledger_db()).map_err(|e| miette::miette!("{}", e))
}

pub fn open_cache(ctx: &CliContext) -> Result<ReferenceCache> {
    ReferenceCache::open(
        &ctx.workspace.cache_db(),
        ctx.config.tools_ttl(),
        ctx.config.employees_ttl(),
    )
    .map_err(|e| miette::miette!("{}", e))
}

/// Remote catalog client; an unset URL is an error.
pub fn catalog(ctx: &CliContext) -> Result<RestCatalog> {
    catalog_if_configured(ctx)?.ok_or_else(|| {
        miette::miette!(
            "no catalog configured. Set `api_base:` in .campo/config.yaml or export CAMPO_API_BASE"
        )
    })
}

/// Remote catalog client for commands that can also run cache-only.
pub fn catalog_if_configured(ctx: &CliContext) -> Result<Option<RestCatalog>> {
    match ctx.config.api_base.as_deref() {
        Some(base) => {
            let catalog = RestCatalog::new(base).map_err(|e| miette::miette!("{}", e))?;
            Ok(Some(catalog))
        }
        None => Ok(None),
    }
}

/// "3d" / "today" style age rendering for tables.
pub fn days_label(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "1 day".to_string(),
        n => format!("{} days", n),
    }
}
