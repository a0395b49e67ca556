use campo::cli::{Cli, Commands};
use clap::Parser;
use miette::Result;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    // Install miette's fancy error handler for readable diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    match cli.command {
        Commands::Init(args) => campo::cli::commands::init::run(args),
        Commands::Report(cmd) => campo::cli::commands::report::run(cmd, &global),
        Commands::Tool(cmd) => campo::cli::commands::tool::run(cmd, &global),
        Commands::Employee(cmd) => campo::cli::commands::employee::run(cmd, &global),
        Commands::Cache(cmd) => campo::cli::commands::cache::run(cmd, &global),
        Commands::Sync(args) => campo::cli::commands::sync::run(args, &global),
        Commands::Status(args) => campo::cli::commands::status::run(args, &global),
    }
}
