//! maps.rs - mutability-adjusted proportion of singletons per category
//!
//! `aggregate` groups variants by category label and compares each group's
//! observed singleton proportion with what the fitted mutability model
//! expects at the group's mean mutation rate.

use std::collections::HashMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MapsError, MapsResult};
use crate::helper_functions::{f64_values, i64_values, round_to, str_values};
use crate::labels::{resolve_region, CategoryLabel, PresentationOrder};
use crate::models::{CategoryAggregate, RatedVariants};
use crate::mutability_model::FittedModel;

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.96;
/// MAPS scores are published, compared and tested at this precision.
pub const MAPS_DECIMALS: i32 = 6;

/// A named row subset, e.g. every variant or only those at high-impact
/// positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    pub name: String,
    pub min_score: Option<f64>,
}

impl Subset {
    pub fn all() -> Self {
        Self {
            name: "all".to_string(),
            min_score: None,
        }
    }

    pub fn min_score(name: &str, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            min_score: Some(threshold),
        }
    }

    /// Rows without a score never pass a score threshold.
    pub fn passes(&self, score: Option<f64>) -> bool {
        match self.min_score {
            None => true,
            Some(t) => score.map_or(false, |s| s >= t),
        }
    }

    /// Row filter over the `score` column; null scores are dropped.
    pub fn filter_expr(&self) -> Option<Expr> {
        self.min_score.map(|t| col("score").gt_eq(lit(t)))
    }
}

/// Aggregates keyed by (category, subset), in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MapsTable {
    rows: Vec<CategoryAggregate>,
    index: HashMap<(String, String), usize>,
}

impl MapsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: CategoryAggregate) -> MapsResult<()> {
        let key = (row.category.clone(), row.subset.clone());
        if self.index.contains_key(&key) {
            return Err(MapsError::invariant(
                &row.category,
                format!("duplicate result for subset '{}'", row.subset),
            ));
        }
        self.index.insert(key, self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, category: &str, subset: &str) -> Option<&CategoryAggregate> {
        self.index
            .get(&(category.to_string(), subset.to_string()))
            .map(|&i| &self.rows[i])
    }

    /// The synonymous row of a subset, whatever spelling the input used.
    pub fn synonymous(&self, subset: &str) -> Option<&CategoryAggregate> {
        self.rows
            .iter()
            .find(|r| r.subset == subset && CategoryLabel::parse(&r.category).is_synonymous())
    }

    pub fn rows(&self) -> &[CategoryAggregate] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn union(mut self, other: MapsTable) -> MapsResult<MapsTable> {
        for row in other.rows {
            self.push(row)?;
        }
        Ok(self)
    }

    /// Rows in presentation order; the keyed lookup is untouched.
    pub fn ordered(&self, order: &PresentationOrder) -> Vec<CategoryAggregate> {
        let mut rows = self.rows().to_vec();
        order.sort_aggregates(&mut rows);
        rows
    }
}

/// Singleton and allele counts of one category within a subset.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCounts {
    pub category: String,
    /// Region of the first variant in the category, if it had one.
    pub region: Option<String>,
    pub n_singletons: u64,
    pub n_alleles: u64,
    /// Row mean: each context weighs by how often it occurs in the category.
    pub mu_snp: f64,
}

impl CategoryCounts {
    pub fn empty(category: &str) -> Self {
        Self {
            category: category.to_string(),
            region: None,
            n_singletons: 0,
            n_alleles: 0,
            mu_snp: f64::NAN,
        }
    }
}

/// Groups the subset's variants by category, in category order.
pub fn category_counts(variants: &RatedVariants, subset: &Subset) -> MapsResult<Vec<CategoryCounts>> {
    let mut lf = variants.lazy();
    if let Some(filter) = subset.filter_expr() {
        lf = lf.filter(filter);
    }
    let df = lf
        .group_by_stable([col("category")])
        .agg([
            col("ac").eq(lit(1i64)).sum().alias("n_singletons"),
            len().alias("n_alleles"),
            col("mu_snp").mean().alias("mu_snp"),
            col("region").first().alias("region"),
        ])
        .sort_by_exprs([col("category")], SortMultipleOptions::default())
        .collect()?;

    let category = str_values(&df, "category")?;
    let region = str_values(&df, "region")?;
    let n_singletons = i64_values(&df, "n_singletons")?;
    let n_alleles = i64_values(&df, "n_alleles")?;
    let mu_snp = f64_values(&df, "mu_snp")?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(category), Some(ns), Some(n), Some(mu)) =
            (category[i].clone(), n_singletons[i], n_alleles[i], mu_snp[i])
        else {
            return Err(MapsError::invariant(
                &subset.name,
                format!("null in category group {}", i),
            ));
        };
        out.push(CategoryCounts {
            category,
            region: region[i].clone(),
            n_singletons: ns as u64,
            n_alleles: n as u64,
            mu_snp: mu,
        });
    }
    Ok(out)
}

/// MAPS statistics for a single category. An empty category is an error, not
/// a row of NaNs.
pub fn summarise_category(
    counts: &CategoryCounts,
    region: &str,
    subset: &str,
    model: &FittedModel,
) -> MapsResult<CategoryAggregate> {
    let CategoryCounts {
        category,
        n_singletons,
        n_alleles,
        mu_snp,
        ..
    } = counts;
    let (n_singletons, n_alleles, mu_snp) = (*n_singletons, *n_alleles, *mu_snp);
    if n_alleles == 0 {
        return Err(MapsError::insufficient(
            category,
            format!("zero alleles in subset '{}'", subset),
        ));
    }

    let ps_raw = n_singletons as f64 / n_alleles as f64;
    let se = ((ps_raw * (1.0 - ps_raw)) / n_alleles as f64).sqrt();
    let ps_pred = model.predict(mu_snp);
    let maps = round_to(ps_raw - ps_pred, MAPS_DECIMALS);

    Ok(CategoryAggregate {
        region: region.to_string(),
        subset: subset.to_string(),
        category: category.to_string(),
        label: CategoryLabel::parse(category).display(),
        n_singletons,
        n_alleles,
        ps_raw,
        se,
        mu_snp,
        ps_pred,
        maps,
        ci_upper: maps + Z_95 * se,
        ci_lower: maps - Z_95 * se,
    })
}

/// MAPS for every category present in the subset (all categories, not just
/// synonymous). The region of a category is taken from its first variant.
pub fn aggregate(
    variants: &RatedVariants,
    model: &FittedModel,
    subset: &Subset,
    default_region: &str,
) -> MapsResult<MapsTable> {
    let mut table = MapsTable::new();
    for counts in category_counts(variants, subset)? {
        let label = CategoryLabel::parse(&counts.category);
        let region = resolve_region(counts.region.as_deref(), &label, default_region);
        let row = summarise_category(&counts, &region, &subset.name, model)?;
        debug!(
            "{:<24} {:<6} n={:<8} ps_raw={:.4} maps={:.6}",
            row.category, subset.name, row.n_alleles, row.ps_raw, row.maps
        );
        table.push(row)?;
    }
    info!("MAPS computed for {} categories in subset '{}'", table.len(), subset.name);
    Ok(table)
}

/// Like [`aggregate`], but every category in `expected` must be present;
/// one that has no variants in the subset is reported instead of skipped.
pub fn aggregate_expected(
    variants: &RatedVariants,
    model: &FittedModel,
    subset: &Subset,
    default_region: &str,
    expected: &[&str],
) -> MapsResult<MapsTable> {
    let table = aggregate(variants, model, subset, default_region)?;
    for category in expected {
        if table.get(category, &subset.name).is_none() {
            let label = CategoryLabel::parse(category);
            let region = resolve_region(None, &label, default_region);
            summarise_category(&CategoryCounts::empty(category), &region, &subset.name, model)?;
        }
    }
    Ok(table)
}

/// Runs [`aggregate_expected`] once per subset with the same model and
/// unions the results.
pub fn aggregate_subsets(
    variants: &RatedVariants,
    model: &FittedModel,
    subsets: &[Subset],
    default_region: &str,
    required: &[&str],
) -> MapsResult<MapsTable> {
    let mut table = MapsTable::new();
    for subset in subsets {
        table = table.union(aggregate_expected(variants, model, subset, default_region, required)?)?;
    }
    Ok(table)
}
