//! `campo init` command - Initialize a new workspace

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::core::workspace::{Workspace, WorkspaceError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Site id to write into the new config
    #[arg(long)]
    pub site: Option<String>,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        println!(
            "{} Created directory {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    match Workspace::init(&path) {
        Ok(workspace) => {
            if let Some(site) = &args.site {
                let config_path = workspace.campo_dir().join("config.yaml");
                let mut contents = std::fs::read_to_string(&config_path).into_diagnostic()?;
                contents.push_str(&format!("\nsite: \"{}\"\n", site));
                std::fs::write(&config_path, contents).into_diagnostic()?;
            }

            println!(
                "{} Initialized campo workspace at {}",
                style("✓").green(),
                style(workspace.root().display()).cyan()
            );
            println!();
            println!("Next steps:");
            println!(
                "  {} Set site and catalog URL",
                style("edit .campo/config.yaml").yellow()
            );
            println!(
                "  {} Fetch tool and employee lists",
                style("campo cache refresh").yellow()
            );
            println!(
                "  {} Mirror open custody",
                style("campo sync").yellow()
            );
            Ok(())
        }
        Err(WorkspaceError::AlreadyExists(path)) => {
            println!(
                "{} campo workspace already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}
