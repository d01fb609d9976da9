use std::{fs, io::{BufWriter, Write}, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;

/// Write-then-rename wrapper so a failed run never leaves a half-written output behind.
pub(crate) struct PendingWrite {
    target: PathBuf,
    tmp: BufWriter<NamedTempFile>,
}

impl PendingWrite {
    pub(crate) fn open(target: &Path) -> Result<Self> {
        if target == Path::new("-") {
            bail!("[io] stdout is not supported; provide a real file path");
        }
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)
                    .with_context(|| format!("[io] Failed to create directory {}", parent.display()))?;
                parent
            }
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("[io] Failed to create temporary file in {}", dir.display()))?;

        Ok(Self { target: target.to_path_buf(), tmp: BufWriter::new(tmp) })
    }

    pub(crate) fn writer(&mut self) -> &mut impl Write { &mut self.tmp }

    /// Flush and move the temporary file over the target.
    pub(crate) fn finalize(self) -> Result<()> {
        let tmp = self.tmp.into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("[io] Failed to flush {}", self.target.display()))?;
        tmp.as_file().sync_all().ok();
        tmp.persist(&self.target)
            .with_context(|| format!("[io] Failed to rename output to {}", self.target.display()))?;
        Ok(())
    }
}

/// Serialize `value` as JSON to `path`, atomically.
pub(crate) fn write_json(path: &Path, value: &serde_json::Value, pretty: bool) -> Result<()> {
    let mut pending = PendingWrite::open(path)?;
    if pretty {
        serde_json::to_writer_pretty(pending.writer(), value)
    } else {
        serde_json::to_writer(pending.writer(), value)
    }.with_context(|| format!("[io] Failed to write JSON to {}", path.display()))?;
    pending.finalize()
}
