use std::path::PathBuf;

use anyhow::Result;
use crosswalk::{compute_containment, derive_final_assignment, io, ContainmentMap, PrefixFallback, UnmatchedPolicy};
use log::info;

use super::{key_selector, load_config};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::MapArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    if args.unmatched_prefix.is_some() {
        config.unmatched_prefix = args.unmatched_prefix;
    }
    let out_path = args.output.clone().unwrap_or_else(|| PathBuf::from("./assignment.json"));

    let compute = || -> Result<ContainmentMap> {
        info!("[map] loading coarser layer from {}", args.coarser.display());
        let (coarser, _) = io::read_layer(&args.coarser, &key_selector(&args.coarse_key))?;
        info!("[map] loading finer layer from {}", args.finer.display());
        let (finer, _) = io::read_layer(&args.finer, &key_selector(&args.fine_key))?;
        Ok(compute_containment(&coarser, &finer, &config)?.map)
    };
    let containment = match &args.containment {
        Some(cache) => io::cached_containment(cache, &[args.coarser.as_path(), args.finer.as_path()], compute)?,
        None => compute()?,
    };

    let fallback = config.unmatched_prefix.map(|len| PrefixFallback { len });
    let assignment = derive_final_assignment(&containment, fallback.as_ref().map(|f| f as &dyn UnmatchedPolicy));

    info!("[map] writing assignment to {}", out_path.display());
    io::write_assignment(&out_path, &assignment.map)?;

    if cli.verbose > 0 {
        eprintln!(
            "[map] {} assigned, {} unmatched, {} coarse units without members -> {}",
            assignment.stats.assigned, assignment.stats.unmatched, assignment.stats.coarse_unassigned, out_path.display(),
        );
    }
    Ok(())
}
