use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data_handling::allele_counts::VariantColumns;
use crate::error::MapsResult;
use crate::helper_functions::resolve_path;
use crate::labels::PresentationOrder;
use crate::maps::Subset;
use crate::significance::Baseline;

/// A per-position score table to summarise by (region, site).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInput {
    pub path: PathBuf,
    /// Score column; ignored for SpliceAI tables, where the delta scores are
    /// combined instead.
    #[serde(default = "default_score_column")]
    pub score_column: String,
    /// Column compared against the high-impact threshold, if any.
    #[serde(default)]
    pub subset_column: Option<String>,
}

fn default_score_column() -> String {
    "phylop".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub allele_counts: PathBuf,
    pub mutation_rates: PathBuf,
    pub output_dir: PathBuf,
    pub columns: VariantColumns,
    /// Region for categories whose label and record carry none.
    pub default_region: String,
    /// Second subset run alongside `all`; `None` disables it.
    pub high_impact: Option<Subset>,
    /// Categories that must have variants in every subset.
    pub required_categories: Vec<String>,
    /// Previously saved model; when set the fit is skipped.
    pub model: Option<PathBuf>,
    /// Fixed synonymous counts. Derived from the `all` subset when absent.
    pub baseline: Option<Baseline>,
    pub order: PresentationOrder,
    pub phylop: Option<ProfileInput>,
    pub spliceai: Option<ProfileInput>,
    pub reference_bases: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            allele_counts: PathBuf::from("outputs/unaff_parents_allele_counts.tsv"),
            mutation_rates: PathBuf::from("data/forSanger_1KG_mutation_rate_table.txt"),
            output_dir: PathBuf::from("stats"),
            columns: VariantColumns::default(),
            default_region: "Branchpoint".to_string(),
            high_impact: Some(Subset::min_score("85", 0.85)),
            required_categories: Vec::new(),
            model: None,
            baseline: None,
            order: PresentationOrder::default(),
            phylop: None,
            spliceai: None,
            reference_bases: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> MapsResult<Self> {
        info!("Reading run configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Anchors every relative path at the project root.
    pub fn resolved(mut self) -> Self {
        self.allele_counts = resolve_path(&self.allele_counts);
        self.mutation_rates = resolve_path(&self.mutation_rates);
        self.output_dir = resolve_path(&self.output_dir);
        for input in [&mut self.phylop, &mut self.spliceai].into_iter().flatten() {
            input.path = resolve_path(&input.path);
        }
        for p in [&mut self.reference_bases, &mut self.model].into_iter().flatten() {
            *p = resolve_path(p);
        }
        self
    }

    pub fn write(&self, path: &Path) -> MapsResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn subsets(&self) -> Vec<Subset> {
        let mut subsets = vec![Subset::all()];
        subsets.extend(self.high_impact.clone());
        subsets
    }
}
