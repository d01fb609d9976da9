use anyhow::Result;
use crosswalk::{io, Verifier};

use super::{field_filter, key_selector, load_config, load_renamer, print_verification};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::VerifyArgs) -> Result<()> {
    let config = load_config(cli)?;
    let filter = field_filter(&config)?;
    let renamer = load_renamer(&args.renames)?;

    let original = io::read_table(&args.original, &key_selector(&args.original_key))?;
    let redistributed = io::read_table(&args.redistributed, &key_selector(&args.redistributed_key))?;

    let mut verifier = Verifier::new(&config, &filter);
    if let Some(renamer) = &renamer {
        verifier = verifier.with_renamer(renamer);
    }
    let verification = verifier.verify(&original, &redistributed);
    print_verification(&verification);

    if !verification.is_clean() {
        eprintln!("[verify] {} fields differ beyond {}", verification.exceeding().len() + verification.missing.len(), verification.tolerance);
    }
    Ok(())
}
