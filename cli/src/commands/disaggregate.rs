use std::path::PathBuf;

use anyhow::Result;
use crosswalk::{io, Disaggregator, Verifier};
use log::info;

use super::{field_filter, key_selector, load_config, load_renamer, print_verification};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::DisaggregateArgs) -> Result<()> {
    let config = load_config(cli)?;
    let filter = field_filter(&config)?;
    let renamer = load_renamer(&args.renames)?;
    let out_path = args.output.clone().unwrap_or_else(|| PathBuf::from("./disaggregated.geojson"));

    info!("[disaggregate] loading coarse table from {}", args.coarse.display());
    let coarse = io::read_table(&args.coarse, &key_selector(&args.coarse_key))?;
    let assignment = io::read_assignment(&args.assignment)?;
    let weights = io::read_weights(&args.weights, &args.weight_id, &config.weight_field)?;

    let mut disaggregator = Disaggregator::new(&config, &filter);
    if let Some(renamer) = &renamer {
        disaggregator = disaggregator.with_renamer(renamer);
    }
    let result = disaggregator.disaggregate(&coarse, &assignment, &weights);

    info!("[disaggregate] writing {} fine units to {}", result.table.len(), out_path.display());
    io::write_table(&out_path, &result.table, &args.id_property)?;

    if args.verify {
        let mut verifier = Verifier::new(&config, &filter);
        if let Some(renamer) = &renamer {
            verifier = verifier.with_renamer(renamer);
        }
        print_verification(&verifier.verify(&coarse, &result.table));
    }
    Ok(())
}
