mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{aggregate, disaggregate, map, verify};

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp(None)
        .init();

    match &cli.command {
        Commands::Map(args) => map::run(&cli, args),
        Commands::Disaggregate(args) => disaggregate::run(&cli, args),
        Commands::Aggregate(args) => aggregate::run(&cli, args),
        Commands::Verify(args) => verify::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
