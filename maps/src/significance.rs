//! significance.rs - chi-squared test of each category against synonymous
//!
//! A MAPS score is moved onto the synonymous scale (`maps + ps_raw(syn)`),
//! converted back to an implied singleton count and compared with the
//! synonymous counts by a two-sample test of equal proportions.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{info, warn};

use crate::error::{MapsError, MapsResult};
use crate::labels::CategoryLabel;
use crate::maps::MapsTable;
use crate::models::{CategoryAggregate, SignificanceResult};

/// Synonymous singleton/allele counts for the whole cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub n_singletons: u64,
    pub n_alleles: u64,
}

impl Baseline {
    pub fn new(n_singletons: u64, n_alleles: u64) -> MapsResult<Self> {
        if n_alleles == 0 {
            return Err(MapsError::insufficient("baseline", "zero alleles"));
        }
        if n_singletons > n_alleles {
            return Err(MapsError::invariant(
                "baseline",
                format!("{} singletons out of {} alleles", n_singletons, n_alleles),
            ));
        }
        Ok(Self {
            n_singletons,
            n_alleles,
        })
    }

    pub fn from_aggregate(row: &CategoryAggregate) -> MapsResult<Self> {
        Self::new(row.n_singletons, row.n_alleles)
    }

    /// Takes the synonymous row of `subset` from a table computed on the same
    /// records, so the baseline cannot drift from the data it is tested on.
    pub fn from_table(table: &MapsTable, subset: &str) -> MapsResult<Self> {
        let row = table.synonymous(subset).ok_or_else(|| {
            MapsError::insufficient("synonymous", format!("no synonymous row in subset '{}'", subset))
        })?;
        Self::from_aggregate(row)
    }

    pub fn ps_raw(&self) -> f64 {
        self.n_singletons as f64 / self.n_alleles as f64
    }
}

/// Pearson chi-squared test of equal proportions for two samples, without
/// continuity correction. Returns `(statistic, p_value)`.
pub fn proportions_chisquare(count: [u64; 2], nobs: [u64; 2]) -> MapsResult<(f64, f64)> {
    for (&c, &n) in count.iter().zip(nobs.iter()) {
        if n == 0 {
            return Err(MapsError::insufficient("chi-squared", "sample with zero observations"));
        }
        if c > n {
            return Err(MapsError::invariant(
                "chi-squared",
                format!("count {} exceeds observations {}", c, n),
            ));
        }
    }

    let total_n = (nobs[0] + nobs[1]) as f64;
    let pooled = (count[0] + count[1]) as f64 / total_n;
    if pooled <= 0.0 || pooled >= 1.0 {
        return Err(MapsError::NumericalDegeneracy(format!(
            "pooled proportion {} leaves an empty margin",
            pooled
        )));
    }

    let mut stat = 0.0;
    for (&c, &n) in count.iter().zip(nobs.iter()) {
        let n = n as f64;
        let observed = [c as f64, n - c as f64];
        let expected = [n * pooled, n * (1.0 - pooled)];
        for (o, e) in observed.iter().zip(expected.iter()) {
            stat += (o - e) * (o - e) / e;
        }
    }

    let dist = ChiSquared::new(1.0).map_err(|e| MapsError::NumericalDegeneracy(e.to_string()))?;
    Ok((stat, dist.sf(stat)))
}

/// Tests one category against the baseline.
pub fn test(aggregate: &CategoryAggregate, baseline: &Baseline) -> MapsResult<SignificanceResult> {
    if aggregate.n_alleles == 0 {
        return Err(MapsError::insufficient(&aggregate.category, "zero alleles"));
    }
    if baseline.n_alleles == 0 {
        return Err(MapsError::insufficient("baseline", "zero alleles"));
    }

    let maps_norm = aggregate.maps + baseline.ps_raw();
    let implied = (maps_norm * aggregate.n_alleles as f64).round_ties_even();
    if !implied.is_finite() || implied < 0.0 {
        return Err(MapsError::invariant(
            &aggregate.category,
            format!("implied singleton count {} is negative (maps_norm {})", implied, maps_norm),
        ));
    }
    let ns_norm = implied as u64;
    if ns_norm > aggregate.n_alleles {
        return Err(MapsError::invariant(
            &aggregate.category,
            format!(
                "implied singleton count {} exceeds {} alleles (maps_norm {})",
                ns_norm, aggregate.n_alleles, maps_norm
            ),
        ));
    }

    let (chi_sq, chi_sq_p) = proportions_chisquare(
        [ns_norm, baseline.n_singletons],
        [aggregate.n_alleles, baseline.n_alleles],
    )
    .map_err(|e| match e {
        MapsError::NumericalDegeneracy(detail) => {
            MapsError::NumericalDegeneracy(format!("{}: {}", aggregate.category, detail))
        }
        other => other,
    })?;

    Ok(SignificanceResult {
        aggregate: aggregate.clone(),
        maps_norm,
        ns_norm,
        chi_sq,
        chi_sq_p,
    })
}

/// Tests every non-synonymous row independently, keeping row order.
/// No multiple-testing correction is applied.
pub fn test_table(rows: &[CategoryAggregate], baseline: &Baseline) -> MapsResult<Vec<SignificanceResult>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if CategoryLabel::parse(&row.category).is_synonymous() {
            continue;
        }
        let result = test(row, baseline)?;
        if result.chi_sq_p < 0.05 {
            info!(
                "{} [{}] differs from synonymous (p = {:.3e})",
                row.category, row.subset, result.chi_sq_p
            );
        }
        out.push(result);
    }
    if out.is_empty() {
        warn!("No non-synonymous categories to test");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::Normal;

    fn row(category: &str, n_singletons: u64, n_alleles: u64, maps: f64) -> CategoryAggregate {
        let ps_raw = n_singletons as f64 / n_alleles as f64;
        CategoryAggregate {
            region: "Branchpoint".to_string(),
            subset: "all".to_string(),
            category: category.to_string(),
            label: category.to_string(),
            n_singletons,
            n_alleles,
            ps_raw,
            se: 0.0,
            mu_snp: 1e-8,
            ps_pred: ps_raw - maps,
            maps,
            ci_upper: maps,
            ci_lower: maps,
        }
    }

    /// Shortcut formula for a 2x2 table: N(ad - bc)² / (r1 r2 c1 c2).
    fn hand_chi_sq(a: f64, n1: f64, c: f64, n2: f64) -> f64 {
        let (b, d) = (n1 - a, n2 - c);
        let total = n1 + n2;
        total * (a * d - b * c).powi(2) / (n1 * n2 * (a + c) * (b + d))
    }

    #[test]
    fn chi_square_matches_hand_computation() {
        let (stat, p) = proportions_chisquare([30, 50], [100, 100]).unwrap();
        assert!((stat - hand_chi_sq(30.0, 100.0, 50.0, 100.0)).abs() < 1e-9);
        assert!((stat - 25.0 / 3.0).abs() < 1e-9);

        // One degree of freedom: the statistic is a squared standard normal.
        let normal = Normal::new(0.0, 1.0).unwrap();
        let p_normal = 2.0 * normal.sf(stat.sqrt());
        assert!((p - p_normal).abs() < 1e-9);
    }

    #[test]
    fn normalises_against_baseline() {
        let baseline = Baseline::new(481_163, 914_195).unwrap();
        let agg = row("-2", 700, 1000, 0.1);
        let result = test(&agg, &baseline).unwrap();

        let maps_norm = 0.1 + 481_163.0 / 914_195.0;
        assert!((result.maps_norm - maps_norm).abs() < 1e-15);
        assert_eq!(result.ns_norm, (maps_norm * 1000.0).round() as u64);

        let expected = hand_chi_sq(result.ns_norm as f64, 1000.0, 481_163.0, 914_195.0);
        assert!((result.chi_sq - expected).abs() < 1e-9);
        assert!(result.chi_sq_p < 1e-6);
    }

    #[test]
    fn implied_count_rounds_half_to_even() {
        let baseline = Baseline::new(50, 100).unwrap();
        // maps_norm · n_alleles lands exactly on .5 in both cases.
        let down = test(&row("-1", 3, 4, 0.125), &baseline).unwrap();
        assert_eq!(down.maps_norm, 0.625);
        assert_eq!(down.ns_norm, 2);
        let up = test(&row("-1", 3, 4, 0.375), &baseline).unwrap();
        assert_eq!(up.ns_norm, 4);
    }

    #[test]
    fn implied_count_above_alleles_is_fatal() {
        let baseline = Baseline::new(50, 100).unwrap();
        let agg = row("-1", 10, 10, 0.6);
        assert!(matches!(test(&agg, &baseline), Err(MapsError::InvariantViolation { .. })));

        let agg = row("-1", 0, 10, -0.9);
        assert!(matches!(test(&agg, &baseline), Err(MapsError::InvariantViolation { .. })));
    }

    #[test]
    fn zero_alleles_are_rejected() {
        assert!(matches!(Baseline::new(0, 0), Err(MapsError::InsufficientData { .. })));
        assert!(matches!(
            proportions_chisquare([0, 5], [0, 10]),
            Err(MapsError::InsufficientData { .. })
        ));
    }

    #[test]
    fn synonymous_rows_are_not_tested() {
        let baseline = Baseline::new(50, 100).unwrap();
        let rows = vec![
            row("synonymous_variant", 50, 100, 0.0),
            row("stop_gained", 60, 100, 0.1),
            row("3", 55, 100, 0.05),
        ];
        let results = test_table(&rows, &baseline).unwrap();
        let tested: Vec<&str> = results.iter().map(|r| r.aggregate.category.as_str()).collect();
        assert_eq!(tested, vec!["stop_gained", "3"]);
    }

    #[test]
    fn baseline_from_table() {
        let mut table = MapsTable::new();
        table.push(row("synonymous_variant", 481, 914, 0.0)).unwrap();
        let baseline = Baseline::from_table(&table, "all").unwrap();
        assert_eq!(baseline, Baseline { n_singletons: 481, n_alleles: 914 });
        assert!(Baseline::from_table(&table, "85").is_err());
    }
}
