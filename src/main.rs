mod archive;
mod cli;
mod config;
mod drivers;
mod error;
mod marker;
mod ops;
mod storage;
mod utils;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load_settings(cli.config.as_deref())?;
    utils::logger::init(cli.log_level.as_deref().unwrap_or(&settings.log_level))?;

    match cli.command {
        Commands::Mark { root, policy, max_entries, exclude } => {
            ops::do_mark(&settings, &root, policy, max_entries, exclude)?;
        }
        Commands::MarkPaths { paths } => {
            ops::do_mark_paths(&settings, &paths)?;
        }
        Commands::Unmark { root } => {
            ops::do_unmark(&settings, &root)?;
        }
        Commands::List { root } => {
            ops::do_list(&settings, &root)?;
        }
        Commands::Full { args } => {
            ops::do_full(settings, args)?;
        }
        Commands::Diff { args, bases } => {
            ops::do_diff(settings, args, bases)?;
        }
        Commands::Version => {
            ops::do_version();
        }
    }

    Ok(())
}
