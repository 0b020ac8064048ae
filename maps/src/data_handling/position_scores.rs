use std::collections::BTreeMap;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{error, info};

use crate::error::{MapsError, MapsResult};
use crate::helper_functions::{f64_values, has_column, i64_values, read_tsv, str_values};
use crate::models::Dataset;

/// SpliceAI delta-score columns: acceptor gain/loss, donor gain/loss.
pub const DELTA_SCORE_COLUMNS: [&str; 4] = ["DS_AG", "DS_AL", "DS_DG", "DS_DL"];

/// Any tab-separated per-position table (phyloP scores, tidied SpliceAI
/// scores, reference bases at each site).
pub struct PositionTable {
    pub path: PathBuf,
}

impl Dataset for PositionTable {
    fn load(&self) -> PolarsResult<DataFrame> {
        info!("Reading position table from {}", self.path.display());
        read_tsv(&self.path).map_err(|e| {
            error!("Failed to read {}: {}", self.path.display(), e);
            e
        })
    }
}

/// One scored genomic position, labelled by region and signed site offset.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionScore {
    pub region: String,
    pub site: String,
    pub score: f64,
    /// Score used for subsetting (e.g. branchpoint prediction confidence).
    pub subset_score: Option<f64>,
}

fn regions(df: &DataFrame, default_region: &str) -> MapsResult<Vec<String>> {
    if has_column(df, "region") {
        Ok(str_values(df, "region")?
            .into_iter()
            .map(|r| r.unwrap_or_else(|| default_region.to_string()))
            .collect())
    } else {
        Ok(vec![default_region.to_string(); df.height()])
    }
}

fn subset_scores(df: &DataFrame, column: Option<&str>) -> MapsResult<Vec<Option<f64>>> {
    match column {
        Some(c) if has_column(df, c) => f64_values(df, c),
        _ => Ok(vec![None; df.height()]),
    }
}

/// Rows with a null score are positions the track has no value for; they
/// are dropped, not treated as zero.
pub fn position_scores_from_frame(
    df: &DataFrame,
    score_column: &str,
    subset_column: Option<&str>,
    default_region: &str,
) -> MapsResult<Vec<PositionScore>> {
    let region = regions(df, default_region)?;
    let site = str_values(df, "site")?;
    let score = f64_values(df, score_column)?;
    let subset = subset_scores(df, subset_column)?;

    let mut out = Vec::with_capacity(df.height());
    let mut missing = 0usize;
    for row in 0..df.height() {
        let site = site[row].clone().ok_or_else(|| MapsError::InvalidRecord {
            row,
            detail: "null site".to_string(),
        })?;
        match score[row] {
            Some(s) if s.is_finite() => out.push(PositionScore {
                region: region[row].clone(),
                site,
                score: s,
                subset_score: subset[row],
            }),
            _ => missing += 1,
        }
    }
    if missing > 0 {
        info!("Skipped {} positions without a '{}' value", missing, score_column);
    }
    Ok(out)
}

/// Probability that a variant alters splicing in any of the four ways,
/// treating the delta scores as independent.
pub fn ds_any(delta_scores: [f64; 4]) -> f64 {
    1.0 - delta_scores.iter().map(|d| 1.0 - d).product::<f64>()
}

/// Per-variant SpliceAI scores collapsed to per-position scores: the
/// largest `ds_any` of any alternate allele at the position.
pub fn spliceai_position_scores(
    df: &DataFrame,
    subset_column: Option<&str>,
    default_region: &str,
) -> MapsResult<Vec<PositionScore>> {
    let region = regions(df, default_region)?;
    let site = str_values(df, "site")?;
    let chrom = str_values(df, "chrom")?;
    let pos = i64_values(df, "pos")?;
    let ref_base = str_values(df, "ref")?;
    let subset = subset_scores(df, subset_column)?;
    let deltas = DELTA_SCORE_COLUMNS
        .iter()
        .map(|c| f64_values(df, c))
        .collect::<MapsResult<Vec<_>>>()?;

    let mut best: BTreeMap<(String, String, String, i64, String), (f64, Option<f64>)> = BTreeMap::new();
    for row in 0..df.height() {
        let mut ds = [0.0; 4];
        for (k, column) in deltas.iter().enumerate() {
            ds[k] = column[row].ok_or_else(|| MapsError::InvalidRecord {
                row,
                detail: format!("null {}", DELTA_SCORE_COLUMNS[k]),
            })?;
        }
        let key = (
            region[row].clone(),
            site[row].clone().ok_or_else(|| MapsError::InvalidRecord {
                row,
                detail: "null site".to_string(),
            })?,
            chrom[row].clone().unwrap_or_default(),
            pos[row].ok_or_else(|| MapsError::InvalidRecord {
                row,
                detail: "null pos".to_string(),
            })?,
            ref_base[row].clone().unwrap_or_default(),
        );
        let score = ds_any(ds);
        best.entry(key)
            .and_modify(|e| e.0 = e.0.max(score))
            .or_insert((score, subset[row]));
    }

    Ok(best
        .into_iter()
        .map(|((region, site, _, _, _), (score, subset_score))| PositionScore {
            region,
            site,
            score,
            subset_score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ds_any_combines_independent_scores() {
        assert_eq!(ds_any([0.0; 4]), 0.0);
        assert!((ds_any([0.5, 0.5, 0.0, 0.0]) - 0.75).abs() < 1e-15);
        assert!((ds_any([1.0, 0.2, 0.0, 0.0]) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn spliceai_takes_max_per_position() {
        let df = polars::df![
            "chrom" => &["chr1", "chr1", "chr1"],
            "pos" => &[10i64, 10, 20],
            "ref" => &["A", "A", "G"],
            "site" => &["-2", "-2", "0"],
            "DS_AG" => &[0.1, 0.0, 0.0],
            "DS_AL" => &[0.0, 0.6, 0.0],
            "DS_DG" => &[0.0, 0.0, 0.3],
            "DS_DL" => &[0.0, 0.0, 0.0],
            "branch_score" => &[0.9, 0.9, 0.5],
        ]
        .unwrap();
        let scores = spliceai_position_scores(&df, Some("branch_score"), "Branchpoint").unwrap();
        assert_eq!(scores.len(), 2);
        let first = scores.iter().find(|s| s.site == "-2").unwrap();
        assert!((first.score - 0.6).abs() < 1e-15);
        assert_eq!(first.subset_score, Some(0.9));
        assert_eq!(first.region, "Branchpoint");
    }

    #[test]
    fn null_scores_are_skipped() {
        let df = polars::df![
            "region" => &["Acceptor", "Donor"],
            "site" => &[-3i64, 2],
            "phylop" => &[Some(1.5), None],
        ]
        .unwrap();
        let scores = position_scores_from_frame(&df, "phylop", None, "Branchpoint").unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].site, "-3");
        assert_eq!(scores[0].subset_score, None);
    }

    #[test]
    fn null_site_is_rejected_in_both_readers() {
        let df = polars::df![
            "chrom" => &["chr1", "chr1"],
            "pos" => &[10i64, 11],
            "ref" => &["A", "C"],
            "site" => &[Some("-2"), None],
            "phylop" => &[1.0, 2.0],
            "DS_AG" => &[0.1, 0.1],
            "DS_AL" => &[0.0, 0.0],
            "DS_DG" => &[0.0, 0.0],
            "DS_DL" => &[0.0, 0.0],
        ]
        .unwrap();
        assert!(matches!(
            spliceai_position_scores(&df, None, "Branchpoint"),
            Err(MapsError::InvalidRecord { row: 1, .. })
        ));
        assert!(matches!(
            position_scores_from_frame(&df, "phylop", None, "Branchpoint"),
            Err(MapsError::InvalidRecord { row: 1, .. })
        ));
    }
}
