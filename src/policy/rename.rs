use std::{fs::File, io::BufReader, path::Path};

use ahash::AHashMap;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One relabeling rule: within `dataset` ("" for top-level fields), field `raw` is reported
/// as `canonical`. Rules without a state or year apply to every state or year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRule {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub dataset: String,
    pub raw: String,
    pub canonical: String,
}

/// Every relabeling rule known for every state and year, e.g. election contest codes that
/// change spelling between vintages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenameTable {
    rules: Vec<RenameRule>,
}

impl RenameTable {
    pub fn new(rules: Vec<RenameRule>) -> Self { Self { rules } }

    /// Load a JSON array of rules.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open rename table: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse rename table: {}", path.display()))
    }

    /// Narrow the table to the rules applying to one run.
    /// More specific rules (state and year given) win over generic ones.
    pub fn for_run(&self, state: Option<&str>, year: Option<u32>) -> FieldRenamer {
        let applies = |rule: &RenameRule| {
            rule.state.as_deref().is_none_or(|s| state.is_some_and(|state| s.eq_ignore_ascii_case(state)))
                && rule.year.is_none_or(|y| year == Some(y))
        };
        let specificity = |rule: &RenameRule| rule.state.is_some() as u8 + rule.year.is_some() as u8;

        let mut rules = self.rules.iter().filter(|rule| applies(rule)).collect::<Vec<_>>();
        rules.sort_by_key(|rule| specificity(rule));

        let mut renamer = FieldRenamer::default();
        for rule in rules {
            renamer.insert(&rule.dataset, &rule.raw, &rule.canonical);
        }
        renamer
    }
}

/// Field-name rewriting for one run: (dataset, raw name) -> canonical name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRenamer {
    names: AHashMap<String, AHashMap<String, String>>, // dataset -> raw -> canonical
}

impl FieldRenamer {
    pub fn insert(&mut self, dataset: &str, raw: &str, canonical: &str) {
        self.names.entry(dataset.to_string()).or_default()
            .insert(raw.to_string(), canonical.to_string());
    }

    /// Canonical name of `raw` within `dataset`, if a rule exists.
    pub fn lookup(&self, dataset: &str, raw: &str) -> Option<&str> {
        self.names.get(dataset)?.get(raw).map(String::as_str)
    }

    /// Canonical name of `raw` within `dataset`, or `raw` itself.
    #[inline]
    pub fn rename<'a>(&'a self, dataset: &str, raw: &'a str) -> &'a str {
        self.lookup(dataset, raw).unwrap_or(raw)
    }

    #[inline] pub fn is_empty(&self) -> bool { self.names.is_empty() }
}
