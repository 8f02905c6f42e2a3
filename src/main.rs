use anyhow::Result;
use clap::Parser;
use birdhouse::cli::{AppContext, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    birdhouse::infra::logging::init(cli.verbose, cli.quiet, cli.no_color);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
        project_dir: cli.project_dir,
    };

    match cli.command {
        Commands::Init(args) => birdhouse::infra::config::init(args, &ctx),
        Commands::UpdateConfig => birdhouse::infra::config::update(&ctx),
        Commands::RootCopy(args) => birdhouse::core::root_copy_run(args, &ctx),
        Commands::Icons(args) => birdhouse::core::icons_run(args, &ctx),
        Commands::Info => birdhouse::core::info_run(&ctx),
        Commands::Release(args) => birdhouse::core::release_run(args, &ctx),
    }
}
