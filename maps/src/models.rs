use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Anything that can be read into a `DataFrame` from disk.
pub trait Dataset {
    fn load(&self) -> PolarsResult<DataFrame>;
}

/// Variants joined to their mutation rate, one row per variant, with the
/// columns `category`, `context`, `alt`, `alt_context`, `ac`, `region`,
/// `score` and `mu_snp`. Built by the allele-count loader, read-only after.
#[derive(Debug, Clone)]
pub struct RatedVariants {
    df: DataFrame,
}

impl RatedVariants {
    pub(crate) fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn lazy(&self) -> LazyFrame {
        self.df.clone().lazy()
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Whether any variant carries a functional-impact score.
    pub fn has_scores(&self) -> bool {
        self.frame()
            .column("score")
            .map(|c| c.null_count() < c.len())
            .unwrap_or(false)
    }
}

/// MAPS statistics for one (category, subset) pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub region: String,
    pub subset: String,
    pub category: String,
    pub label: String,
    pub n_singletons: u64,
    pub n_alleles: u64,
    pub ps_raw: f64,
    pub se: f64,
    pub mu_snp: f64,
    pub ps_pred: f64,
    pub maps: f64,
    pub ci_upper: f64,
    pub ci_lower: f64,
}

/// Chi-squared comparison of one category against the synonymous baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceResult {
    pub aggregate: CategoryAggregate,
    pub maps_norm: f64,
    pub ns_norm: u64,
    pub chi_sq: f64,
    pub chi_sq_p: f64,
}

#[cfg(test)]
impl RatedVariants {
    /// `(category, context, alt, ac, mu_snp)` rows with no region or score.
    pub fn from_rows(rows: &[(&str, &str, &str, i64, f64)]) -> Self {
        let n = rows.len();
        let alt_context: Vec<String> = rows
            .iter()
            .map(|r| format!("{}{}{}", &r.1[..1], r.2, &r.1[2..]))
            .collect();
        let df = DataFrame::new(vec![
            Column::new("category".into(), rows.iter().map(|r| r.0).collect::<Vec<&str>>()),
            Column::new("context".into(), rows.iter().map(|r| r.1).collect::<Vec<&str>>()),
            Column::new("alt".into(), rows.iter().map(|r| r.2).collect::<Vec<&str>>()),
            Column::new("alt_context".into(), alt_context),
            Column::new("ac".into(), rows.iter().map(|r| r.3).collect::<Vec<i64>>()),
            Column::new("region".into(), vec![None::<&str>; n]),
            Column::new("score".into(), vec![None::<f64>; n]),
            Column::new("mu_snp".into(), rows.iter().map(|r| r.4).collect::<Vec<f64>>()),
        ])
        .unwrap();
        Self { df }
    }

    pub fn with_scores(mut self, scores: &[Option<f64>]) -> Self {
        self.df
            .with_column(Column::new("score".into(), scores.to_vec()))
            .unwrap();
        self
    }

    pub fn with_regions(mut self, regions: &[Option<&str>]) -> Self {
        self.df
            .with_column(Column::new("region".into(), regions.to_vec()))
            .unwrap();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_detected_per_frame() {
        let rows = [("synonymous_variant", "ACA", "G", 1, 1e-8), ("-2", "TGT", "A", 2, 5e-8)];
        let variants = RatedVariants::from_rows(&rows);
        assert_eq!(variants.height(), 2);
        assert!(!variants.has_scores());
        assert!(variants.with_scores(&[None, Some(0.9)]).has_scores());
    }

    #[test]
    fn alt_context_swaps_middle_base() {
        let variants = RatedVariants::from_rows(&[("synonymous_variant", "ACA", "G", 1, 1e-8)]);
        let alt_context = variants.frame().column("alt_context").unwrap().str().unwrap().get(0);
        assert_eq!(alt_context, Some("AGA"));
    }
}
