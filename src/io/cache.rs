use std::{fs, path::Path, time::SystemTime};

use anyhow::{Context, Result};
use log::info;

use super::json::{read_containment_map, write_containment_map};
use crate::map::ContainmentMap;

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("[io::cache] Failed to stat {}", path.display()))
}

/// Whether `cached` is missing or older than any of `sources`.
pub fn is_stale(cached: &Path, sources: &[&Path]) -> Result<bool> {
    if !cached.exists() { return Ok(true) }
    let cached_at = modified(cached)?;
    for source in sources {
        if modified(source)? > cached_at { return Ok(true) }
    }
    Ok(false)
}

/// Load the containment map cached at `cached`, or compute and store it when the cache
/// is missing or older than any of `sources` (the two layer files).
pub fn cached_containment<F>(cached: &Path, sources: &[&Path], compute: F) -> Result<ContainmentMap>
where
    F: FnOnce() -> Result<ContainmentMap>,
{
    if !is_stale(cached, sources)? {
        info!("[io::cache] reusing containment map {}", cached.display());
        return read_containment_map(cached);
    }

    let map = compute()?;
    write_containment_map(cached, &map)?;
    info!("[io::cache] stored containment map {}", cached.display());
    Ok(map)
}
