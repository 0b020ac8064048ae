use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::info;

use crate::error::MapsResult;
use crate::helper_functions::{has_column, i64_values, str_values};
use crate::labels::{CategoryLabel, PresentationOrder};

pub const PWM_BASES: [&str; 4] = ["A", "C", "G", "T"];

/// Reference-base counts at one (region, site).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwmRow {
    pub region: String,
    pub site: String,
    /// Counts in `PWM_BASES` order.
    pub counts: [u64; 4],
}

/// Counts reference bases per (region, site). Only forward-strand rows are
/// used when a `strand` column is present; bases outside ACGT are ignored.
/// Tables without a `region` column are all in `default_region`.
pub fn position_weight_matrix(
    df: &DataFrame,
    default_region: &str,
    order: &PresentationOrder,
) -> MapsResult<Vec<PwmRow>> {
    let mut lf = df
        .clone()
        .lazy()
        .with_column(col("site").cast(DataType::String));
    if !has_column(df, "region") {
        lf = lf.with_column(lit(default_region).alias("region"));
    }
    if has_column(df, "strand") {
        lf = lf.filter(col("strand").eq(lit("+")));
    }
    let counts = lf
        .group_by([col("region"), col("site"), col("ref")])
        .agg([len().alias("count")])
        .collect()?;

    let region = str_values(&counts, "region")?;
    let site = str_values(&counts, "site")?;
    let ref_base = str_values(&counts, "ref")?;
    let n = i64_values(&counts, "count")?;

    let mut matrix: BTreeMap<(String, String), [u64; 4]> = BTreeMap::new();
    for i in 0..counts.height() {
        let (Some(region), Some(site), Some(base), Some(n)) =
            (region[i].clone(), site[i].clone(), ref_base[i].as_deref(), n[i])
        else {
            continue;
        };
        let entry = matrix.entry((region, site)).or_insert([0; 4]);
        if let Some(k) = PWM_BASES.iter().position(|b| b.eq_ignore_ascii_case(base)) {
            entry[k] += n as u64;
        }
    }

    let mut rows: Vec<PwmRow> = matrix
        .into_iter()
        .map(|((region, site), counts)| PwmRow { region, site, counts })
        .collect();
    rows.sort_by(|a, b| {
        let la = CategoryLabel::parse(&a.site);
        let lb = CategoryLabel::parse(&b.site);
        order.compare((&a.region, "", &la), (&b.region, "", &lb))
    });
    info!("Position-weight matrix over {} sites", rows.len());
    Ok(rows)
}
