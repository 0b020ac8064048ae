//! mutability_model.rs - singleton proportion as a linear function of mutability
//!
//! Variants in highly mutable contexts are more often recurrent and therefore
//! less often singletons, independently of selection. The model is fitted on
//! synonymous variants only, grouped by (context, alt_context), and is then
//! passed by value to the aggregator.

use std::path::Path;

use log::info;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MapsError, MapsResult};
use crate::helper_functions::{f64_values, i64_values, str_values};
use crate::labels::synonymous_expr;
use crate::models::RatedVariants;

/// `ps_raw = intercept + slope · mu_snp`, fitted by weighted least squares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub intercept: f64,
    pub slope: f64,
    pub n_groups: usize,
    pub total_alleles: u64,
}

impl FittedModel {
    pub fn predict(&self, mu_snp: f64) -> f64 {
        self.intercept + self.slope * mu_snp
    }

    pub fn save(&self, path: &Path) -> MapsResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved mutability model to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> MapsResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Singleton counts for one substitution type.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextGroup {
    pub context: String,
    pub alt_context: String,
    pub n_singletons: u64,
    pub n_alleles: u64,
    pub ps_raw: f64,
    pub mu_snp: f64,
}

/// Synonymous variants grouped by (context, alt_context), sorted by key.
/// The rate is single-valued per group after an exact join; the max is
/// taken so a per-row rate column is tolerated.
pub fn context_groups(variants: &RatedVariants) -> MapsResult<Vec<ContextGroup>> {
    let df = variants
        .lazy()
        .filter(synonymous_expr("category"))
        .group_by([col("context"), col("alt_context")])
        .agg([
            col("ac").eq(lit(1i64)).sum().alias("n_singletons"),
            len().alias("n_alleles"),
            col("mu_snp").max().alias("mu_snp"),
        ])
        .sort_by_exprs(
            [col("context"), col("alt_context")],
            SortMultipleOptions::default(),
        )
        .collect()?;

    let context = str_values(&df, "context")?;
    let alt_context = str_values(&df, "alt_context")?;
    let n_singletons = i64_values(&df, "n_singletons")?;
    let n_alleles = i64_values(&df, "n_alleles")?;
    let mu_snp = f64_values(&df, "mu_snp")?;

    let mut groups = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(context), Some(alt_context), Some(ns), Some(n), Some(mu)) = (
            context[i].clone(),
            alt_context[i].clone(),
            n_singletons[i],
            n_alleles[i],
            mu_snp[i],
        ) else {
            return Err(MapsError::invariant("synonymous", format!("null in context group {}", i)));
        };
        groups.push(ContextGroup {
            context,
            alt_context,
            n_singletons: ns as u64,
            n_alleles: n as u64,
            ps_raw: ns as f64 / n as f64,
            mu_snp: mu,
        });
    }
    Ok(groups)
}

/// Closed-form weighted least squares for `y ~ 1 + x`.
///
/// The predictor is centred on its weighted mean before solving the normal
/// equations; rates sit around 1e-8 and the raw `XᵀWX` loses most of its
/// precision to cancellation otherwise. Returns `(intercept, slope)`.
fn weighted_least_squares(
    x: &Array1<f64>,
    y: &Array1<f64>,
    w: &Array1<f64>,
) -> MapsResult<(f64, f64)> {
    let n = x.len();
    let total_w = w.sum();
    let x_bar = (w * x).sum() / total_w;

    let mut design = Array2::<f64>::ones((n, 2));
    design.column_mut(1).assign(&x.mapv(|v| v - x_bar));

    let mut weighted = design.clone();
    for (mut row, &wi) in weighted.rows_mut().into_iter().zip(w.iter()) {
        row *= wi;
    }

    let xtwx = design.t().dot(&weighted);
    let xtwy = weighted.t().dot(y);

    let det = xtwx[[0, 0]] * xtwx[[1, 1]] - xtwx[[0, 1]] * xtwx[[1, 0]];
    if !det.is_finite() || det <= 0.0 {
        return Err(MapsError::NumericalDegeneracy(format!(
            "XᵀWX is singular (det = {:e})",
            det
        )));
    }

    let b0 = (xtwx[[1, 1]] * xtwy[0] - xtwx[[0, 1]] * xtwy[1]) / det;
    let b1 = (xtwx[[0, 0]] * xtwy[1] - xtwx[[1, 0]] * xtwy[0]) / det;

    Ok((b0 - b1 * x_bar, b1))
}

/// Fits the mutability model on the synonymous rows of `variants`.
pub fn fit(variants: &RatedVariants) -> MapsResult<FittedModel> {
    let groups = context_groups(variants)?;
    if groups.len() < 2 {
        return Err(MapsError::insufficient(
            "synonymous",
            format!("{} mutation-rate group(s), need at least 2", groups.len()),
        ));
    }
    if let Some(g) = groups.iter().find(|g| g.n_alleles == 0) {
        return Err(MapsError::insufficient(
            format!("{}>{}", g.context, g.alt_context),
            "group has zero alleles",
        ));
    }

    let first_mu = groups[0].mu_snp;
    if groups.iter().all(|g| g.mu_snp == first_mu) {
        return Err(MapsError::NumericalDegeneracy(format!(
            "all {} groups share mutation rate {:e}",
            groups.len(),
            first_mu
        )));
    }

    let x: Array1<f64> = groups.iter().map(|g| g.mu_snp).collect();
    let y: Array1<f64> = groups.iter().map(|g| g.ps_raw).collect();
    let w: Array1<f64> = groups.iter().map(|g| g.n_alleles as f64).collect();

    let (intercept, slope) = weighted_least_squares(&x, &y, &w)?;
    let total_alleles = groups.iter().map(|g| g.n_alleles).sum();

    info!("=== Mutability model ===");
    info!("groups       {:>12}", groups.len());
    info!("alleles      {:>12}", total_alleles);
    info!("intercept    {:>12.6}", intercept);
    info!("slope        {:>12.6e}", slope);

    Ok(FittedModel {
        intercept,
        slope,
        n_groups: groups.len(),
        total_alleles,
    })
}
