pub mod aggregate;
pub mod disaggregate;
pub mod map;
pub mod verify;

use anyhow::Result;
use crosswalk::{DefaultFieldFilter, FieldRenamer, KeySelector, RenameTable, RunConfig, Verification};

use crate::cli::{Cli, RenameArgs};

/// Run configuration from `--config`, or the defaults.
pub(crate) fn load_config(cli: &Cli) -> Result<RunConfig> {
    match &cli.config {
        Some(path) => RunConfig::from_json_file(path),
        None => Ok(RunConfig::default()),
    }
}

/// Field filter described by the run configuration.
pub(crate) fn field_filter(config: &RunConfig) -> Result<DefaultFieldFilter> {
    DefaultFieldFilter::new(&config.filter)
}

/// Id selector for an optional `--*-key` argument.
pub(crate) fn key_selector(key: &Option<String>) -> KeySelector {
    match key {
        Some(name) => KeySelector::field(name),
        None => KeySelector::Index,
    }
}

/// Field renamer from `--renames`, narrowed to `--state` / `--year`.
pub(crate) fn load_renamer(args: &RenameArgs) -> Result<Option<FieldRenamer>> {
    let Some(path) = &args.renames else { return Ok(None) };
    let table = RenameTable::from_json_file(path)?;
    Ok(Some(table.for_run(args.state.as_deref(), args.year)))
}

/// Print per-field differences to stdout.
pub(crate) fn print_verification(verification: &Verification) {
    println!("{:<24} {:>16} {:>16} {:>12}", "field", "original", "redistributed", "difference");
    for (name, diff) in &verification.diffs {
        let flag = if diff.abs() >= verification.tolerance { " *" } else { "" };
        println!(
            "{:<24} {:>16.3} {:>16.3} {:>12.3}{flag}",
            name, verification.original[name], verification.round_tripped[name], diff,
        );
    }
    for name in &verification.missing {
        println!("{:<24} {:>16.3} {:>16} {:>12}", name, verification.original[name], "-", "missing");
    }
}
