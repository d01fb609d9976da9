use std::path::PathBuf;

use anyhow::Result;
use crosswalk::{io, Aggregator};
use log::info;

use super::{field_filter, key_selector, load_config, load_renamer};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::AggregateArgs) -> Result<()> {
    let config = load_config(cli)?;
    let filter = field_filter(&config)?;
    let renamer = load_renamer(&args.renames)?;
    let out_path = args.output.clone().unwrap_or_else(|| PathBuf::from("./aggregated.geojson"));

    info!("[aggregate] loading fine table from {}", args.fine.display());
    let fine = io::read_table(&args.fine, &key_selector(&args.fine_key))?;
    let assignment = io::read_assignment(&args.assignment)?;

    let mut aggregator = Aggregator::new(&config, &filter);
    if let Some(renamer) = &renamer {
        aggregator = aggregator.with_renamer(renamer);
    }
    let result = aggregator.aggregate(&fine, &assignment);

    info!("[aggregate] writing {} coarse units to {}", result.table.len(), out_path.display());
    io::write_table(&out_path, &result.table, &args.id_property)?;

    if cli.verbose > 0 {
        for (name, total) in &result.report.totals {
            eprintln!("[aggregate] {name}: {total} over {} units", result.report.counts[name]);
        }
    }
    Ok(())
}
