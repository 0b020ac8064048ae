use std::path::PathBuf;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::data_handling::mutation_rates::MutationRateTable;
use crate::error::{MapsError, MapsResult};
use crate::helper_functions::{has_column, read_tsv};
use crate::models::{Dataset, RatedVariants};

/// Column names of the per-variant allele-count table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantColumns {
    pub category: String,
    pub context: String,
    pub alt: String,
    pub ac: String,
    pub region: String,
    pub score: String,
}

impl Default for VariantColumns {
    fn default() -> Self {
        Self {
            category: "csq".to_string(),
            context: "context".to_string(),
            alt: "alt".to_string(),
            ac: "ac".to_string(),
            region: "region".to_string(),
            score: "score".to_string(),
        }
    }
}

/// Allele counts of every SNV seen in the unaffected reference cohort.
pub struct AlleleCountDataset {
    pub path: PathBuf,
    pub columns: VariantColumns,
}

impl Dataset for AlleleCountDataset {
    fn load(&self) -> PolarsResult<DataFrame> {
        info!("Reading allele counts from {}", self.path.display());
        let df = match read_tsv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read allele-count table: {}", e);
                return Err(e);
            }
        };
        debug!("Loaded {} rows, {} cols", df.shape().0, df.shape().1);
        Ok(df)
    }
}

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

fn required<T>(value: Option<T>, row: usize, name: &str) -> MapsResult<T> {
    value.ok_or_else(|| MapsError::InvalidRecord {
        row,
        detail: format!("null in required column '{}'", name),
    })
}

/// Selects the configured columns under their standard names. Region and
/// score are optional and come through as nulls when the table has neither.
pub fn standard_columns(df: &DataFrame, cols: &VariantColumns) -> MapsResult<LazyFrame> {
    for name in [&cols.category, &cols.context, &cols.alt, &cols.ac] {
        if !has_column(df, name) {
            return Err(MapsError::MissingColumn(name.clone()));
        }
    }
    let region = if has_column(df, &cols.region) {
        col(cols.region.as_str()).cast(DataType::String)
    } else {
        lit(NULL).cast(DataType::String)
    };
    let score = if has_column(df, &cols.score) {
        col(cols.score.as_str()).cast(DataType::Float64)
    } else {
        lit(NULL).cast(DataType::Float64)
    };

    Ok(df.clone().lazy().select([
        col(cols.category.as_str()).cast(DataType::String).alias("category"),
        col(cols.context.as_str()).cast(DataType::String).alias("context"),
        col(cols.alt.as_str()).cast(DataType::String).alias("alt"),
        col(cols.ac.as_str()).cast(DataType::Int64).alias("ac"),
        region.alias("region"),
        score.alias("score"),
    ]))
}

/// Shape of one substitution: a trinucleotide context in ACGT and a single
/// alternate base that differs from the middle one.
pub fn check_substitution(context: &str, alt: &str, row: usize) -> MapsResult<()> {
    let ctx: Vec<char> = context.chars().collect();
    if ctx.len() != 3 || !ctx.iter().all(|c| BASES.contains(c)) {
        return Err(MapsError::InvalidRecord {
            row,
            detail: format!("context '{}' is not a trinucleotide", context),
        });
    }
    let alt: Vec<char> = alt.chars().collect();
    if alt.len() != 1 || !BASES.contains(&alt[0]) {
        return Err(MapsError::InvalidRecord {
            row,
            detail: format!("alt '{}' is not a single base", alt.iter().collect::<String>()),
        });
    }
    if alt[0] == ctx[1] {
        return Err(MapsError::InvalidRecord {
            row,
            detail: format!("alt '{}' equals the reference base of '{}'", alt[0], context),
        });
    }
    Ok(())
}

/// Walks the standardised frame once and reports the first bad row. Nulls in
/// required columns and malformed substitutions are `InvalidRecord`; a
/// negative allele count is an `InvariantViolation`.
pub fn validate_variants(df: &DataFrame, cols: &VariantColumns) -> MapsResult<()> {
    let category = df.column("category")?.str()?;
    let context = df.column("context")?.str()?;
    let alt = df.column("alt")?.str()?;
    let ac = df.column("ac")?.i64()?;

    for (row, (((category, context), alt), ac)) in category
        .into_iter()
        .zip(context)
        .zip(alt)
        .zip(ac)
        .enumerate()
    {
        let category = required(category, row, &cols.category)?;
        let context = required(context, row, &cols.context)?;
        let alt = required(alt, row, &cols.alt)?;
        let ac = required(ac, row, &cols.ac)?;
        check_substitution(context, alt, row)?;
        if ac < 0 {
            return Err(MapsError::invariant(
                category,
                format!("negative allele count {} at row {}", ac, row),
            ));
        }
    }
    Ok(())
}

/// `context` with its middle base replaced by `alt`.
pub fn alt_context_expr() -> Expr {
    concat_str(
        [
            col("context").str().slice(lit(0), lit(1)),
            col("alt"),
            col("context").str().slice(lit(2), lit(1)),
        ],
        "",
        false,
    )
}

/// Left-joins every variant to its mutation rate on (context, alt_context).
/// The first variant without a rate aborts the join with `InputJoin`.
pub fn join_rates(variants: DataFrame, rates: &MutationRateTable) -> MapsResult<RatedVariants> {
    let joined = variants
        .lazy()
        .with_row_index("row", None)
        .with_column(alt_context_expr().alias("alt_context"))
        .join(
            rates.frame().clone().lazy(),
            [col("context"), col("alt_context")],
            [col("from"), col("to")],
            JoinArgs::new(JoinType::Left),
        )
        .sort_by_exprs([col("row")], SortMultipleOptions::default())
        .collect()?;

    let mu = joined.column("mu_snp")?.f64()?;
    if let Some(row) = mu.into_iter().position(|m| m.is_none()) {
        let context = joined.column("context")?.str()?.get(row).unwrap_or_default();
        let alt_context = joined.column("alt_context")?.str()?.get(row).unwrap_or_default();
        return Err(MapsError::InputJoin {
            context: context.to_string(),
            alt_context: alt_context.to_string(),
            row,
        });
    }

    let joined = joined.drop("row")?;
    info!("Joined {} variants to mutation rates", joined.height());
    Ok(RatedVariants::new(joined))
}

impl AlleleCountDataset {
    pub fn load_rated(&self, rates: &MutationRateTable) -> MapsResult<RatedVariants> {
        let df = self.load()?;
        let variants = standard_columns(&df, &self.columns)?.collect()?;
        validate_variants(&variants, &self.columns)?;
        join_rates(variants, rates)
    }
}
