use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::policy::FilterConfig;

/// Settings for one mapping / disaggregation / aggregation run.
/// Constructed once per run and read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Overlap fractions at or below this are recorded but flagged as very small.
    pub small_overlap: f64,
    /// Sub-field of a structured population weight used for apportionment.
    pub weight_field: String,
    /// Sub-field of a structured population weight used to detect lost population.
    pub population_field: String,
    /// Largest per-field total difference the verifier treats as rounding noise.
    pub tolerance: f64,
    /// Decimal places kept when splitting non-integer values.
    pub decimals: u32,
    /// Assign unmatched fine units to the coarse unit whose id is this long a prefix of theirs.
    pub unmatched_prefix: Option<usize>,
    /// Field eligibility rules.
    pub filter: FilterConfig,
    /// Unit ids starting with any of these prefixes get per-unit debug logging.
    pub trace_prefixes: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            small_overlap: 0.001,
            weight_field: "TOT18".to_string(),
            population_field: "TOT".to_string(),
            tolerance: 1.0,
            decimals: 3,
            unmatched_prefix: None,
            filter: FilterConfig::default(),
            trace_prefixes: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Load a run configuration from a JSON file; absent keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Whether per-unit decisions for `id` should be logged.
    #[inline]
    pub fn traces(&self, id: &str) -> bool {
        self.trace_prefixes.iter().any(|prefix| id.starts_with(prefix.as_str()))
    }
}
