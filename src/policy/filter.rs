use anyhow::{Context, Result};
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::types::FieldValue;

/// Decides which fields are aggregable: summed by aggregation and split by disaggregation.
/// Everything else (identifiers, names, percentages, areas) is metadata and never touched.
pub trait FieldFilter {
    /// Whether a field with this name may be aggregable at all, regardless of its value.
    /// Fields that pass this check but fail [`FieldFilter::accepts`] are reported as failed.
    fn accepts_name(&self, name: &str) -> bool {
        let _ = name;
        true
    }

    /// Whether this (name, value) pair is aggregable.
    fn accepts(&self, name: &str, value: &FieldValue) -> bool;
}

impl<F> FieldFilter for F where F: Fn(&str, &FieldValue) -> bool {
    fn accepts(&self, name: &str, value: &FieldValue) -> bool { self(name, value) }
}

/// Settings for [`DefaultFieldFilter`]. Name matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Field names starting with any of these prefixes are metadata.
    pub exclude_prefixes: Vec<String>,
    /// Field names equal to any of these are metadata.
    pub exclude_names: Vec<String>,
    /// Field names matching any of these regular expressions are metadata.
    pub exclude_patterns: Vec<String>,
    /// Require values to parse as integers (otherwise any number is accepted).
    pub require_integer: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let strings = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            exclude_prefixes: strings(&[
                "name", "county", "precinct", "area", "fips", "cty", "ward", "geoid", "logrec", "correct",
            ]),
            exclude_names: strings(&[
                "id", "objectid", "pct", "district", "blkgrp", "state", "sumlevel", "tract", "vtd_name",
                "geometry",
            ]),
            exclude_patterns: Vec::new(),
            require_integer: true,
        }
    }
}

/// Prefix/name/pattern based filter, built from a [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct DefaultFieldFilter {
    prefixes: Vec<String>,
    names: Vec<String>,
    patterns: RegexSet,
    require_integer: bool,
}

impl DefaultFieldFilter {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let lower = |names: &[String]| names.iter().map(|s| s.to_lowercase()).collect();
        let patterns = RegexSet::new(config.exclude_patterns.iter().map(|p| format!("(?i){p}")))
            .with_context(|| format!("invalid field exclusion pattern in {:?}", config.exclude_patterns))?;

        Ok(Self {
            prefixes: lower(&config.exclude_prefixes),
            names: lower(&config.exclude_names),
            patterns,
            require_integer: config.require_integer,
        })
    }
}

impl Default for DefaultFieldFilter {
    fn default() -> Self {
        Self {
            prefixes: FilterConfig::default().exclude_prefixes,
            names: FilterConfig::default().exclude_names,
            patterns: RegexSet::empty(),
            require_integer: true,
        }
    }
}

impl FieldFilter for DefaultFieldFilter {
    fn accepts_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        !self.prefixes.iter().any(|prefix| lower.starts_with(prefix.as_str()))
            && !self.names.iter().any(|excluded| *excluded == lower)
            && !self.patterns.is_match(name)
    }

    fn accepts(&self, name: &str, value: &FieldValue) -> bool {
        self.accepts_name(name) && match value {
            // Sub-fields of a dataset are filtered individually.
            FieldValue::Group(_) => true,
            value if self.require_integer => value.as_integer().is_some(),
            value => value.number().is_some(),
        }
    }
}
