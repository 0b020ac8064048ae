//! Category labels and the presentation order of result tables.
//!
//! The statistical engine only keys results by the raw label string; parsing
//! and ordering live here and are applied by the output step.

use std::cmp::Ordering;
use std::sync::OnceLock;

use polars::prelude::{col, lit, Expr};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::CategoryAggregate;

/// Spellings of the synonymous class seen in consequence columns.
pub const SYNONYMOUS_LABELS: [&str; 2] = ["synonymous_variant", "Synonymous"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Consequence {
    Synonymous,
    Missense,
    Nonsense,
}

impl Consequence {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            l if SYNONYMOUS_LABELS.contains(&l) => Some(Consequence::Synonymous),
            "missense_variant" | "Missense" => Some(Consequence::Missense),
            "stop_gained" | "Nonsense" => Some(Consequence::Nonsense),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Consequence::Synonymous => "Synonymous",
            Consequence::Missense => "Missense",
            Consequence::Nonsense => "Nonsense",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpliceRegion {
    Acceptor,
    Donor,
}

impl SpliceRegion {
    pub fn name(&self) -> &'static str {
        match self {
            SpliceRegion::Acceptor => "Acceptor",
            SpliceRegion::Donor => "Donor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CategoryLabel {
    Consequence(Consequence),
    /// `acceptor_-3`, `donor_5`: offset from the exon boundary.
    SpliceSite { region: SpliceRegion, offset: i64 },
    /// Bare signed offset, e.g. relative to a branchpoint.
    Offset(i64),
    Other(String),
}

fn splice_site_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(acceptor|donor)_([+-]?\d+)$").expect("valid regex"))
}

fn offset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d+$").expect("valid regex"))
}

impl CategoryLabel {
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        if let Some(csq) = Consequence::from_label(label) {
            return CategoryLabel::Consequence(csq);
        }
        if let Some(caps) = splice_site_re().captures(label) {
            let region = if caps[1].eq_ignore_ascii_case("acceptor") {
                SpliceRegion::Acceptor
            } else {
                SpliceRegion::Donor
            };
            if let Ok(offset) = caps[2].parse() {
                return CategoryLabel::SpliceSite { region, offset };
            }
        }
        if offset_re().is_match(label) {
            if let Ok(offset) = label.parse() {
                return CategoryLabel::Offset(offset);
            }
        }
        CategoryLabel::Other(label.to_string())
    }

    pub fn is_synonymous(&self) -> bool {
        matches!(self, CategoryLabel::Consequence(Consequence::Synonymous))
    }

    /// Region the label itself implies, if any.
    pub fn implied_region(&self) -> Option<&'static str> {
        match self {
            CategoryLabel::Consequence(_) => Some("Coding"),
            CategoryLabel::SpliceSite { region, .. } => Some(region.name()),
            _ => None,
        }
    }

    /// Short label used on plot axes: "Missense", "A -3", "2".
    pub fn display(&self) -> String {
        match self {
            CategoryLabel::Consequence(c) => c.name().to_string(),
            CategoryLabel::SpliceSite { region, offset } => {
                format!("{} {}", &region.name()[..1], offset)
            }
            CategoryLabel::Offset(offset) => offset.to_string(),
            CategoryLabel::Other(s) => s.clone(),
        }
    }

    fn rank(&self) -> (u8, i64, &str) {
        match self {
            CategoryLabel::Consequence(c) => (0, *c as i64, ""),
            CategoryLabel::SpliceSite { region, offset } => (1, *offset, region.name()),
            CategoryLabel::Offset(offset) => (1, *offset, ""),
            CategoryLabel::Other(s) => (2, 0, s.as_str()),
        }
    }
}

impl PartialOrd for CategoryLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CategoryLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Row filter selecting synonymous variants in a label column.
pub fn synonymous_expr(column: &str) -> Expr {
    SYNONYMOUS_LABELS
        .iter()
        .map(|l| col(column).eq(lit(*l)))
        .reduce(|a, b| a.or(b))
        .unwrap_or_else(|| lit(false))
}

/// Record region first, then whatever the label implies, then the fallback.
pub fn resolve_region(record_region: Option<&str>, label: &CategoryLabel, fallback: &str) -> String {
    record_region
        .filter(|r| !r.is_empty())
        .or_else(|| label.implied_region())
        .unwrap_or(fallback)
        .to_string()
}

/// Explicit ordering of regions and subsets for output tables. Anything not
/// listed sorts after the listed values, alphabetically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationOrder {
    pub regions: Vec<String>,
    pub subsets: Vec<String>,
}

impl Default for PresentationOrder {
    fn default() -> Self {
        Self {
            regions: ["Coding", "Acceptor", "Donor", "Branchpoint"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            subsets: vec!["all".to_string(), "85".to_string()],
        }
    }
}

fn listed_position<'a>(listed: &[String], value: &'a str) -> (usize, &'a str) {
    match listed.iter().position(|v| v == value) {
        Some(i) => (i, ""),
        None => (listed.len(), value),
    }
}

impl PresentationOrder {
    pub fn compare(
        &self,
        a: (&str, &str, &CategoryLabel),
        b: (&str, &str, &CategoryLabel),
    ) -> Ordering {
        listed_position(&self.regions, a.0)
            .cmp(&listed_position(&self.regions, b.0))
            .then_with(|| listed_position(&self.subsets, a.1).cmp(&listed_position(&self.subsets, b.1)))
            .then_with(|| a.2.cmp(b.2))
    }

    pub fn sort_aggregates(&self, rows: &mut [CategoryAggregate]) {
        rows.sort_by_cached_key(|r| {
            (
                listed_position(&self.regions, &r.region).0,
                r.region.clone(),
                listed_position(&self.subsets, &r.subset).0,
                r.subset.clone(),
                CategoryLabel::parse(&r.category),
            )
        });
    }
}
