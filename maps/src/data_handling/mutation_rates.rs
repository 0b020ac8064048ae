use std::collections::HashMap;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{error, info};

use crate::error::{MapsError, MapsResult};
use crate::helper_functions::{f64_values, has_column, read_delimited, str_values};
use crate::models::Dataset;

/// Rate column names seen in the published tables, in order of preference.
const RATE_COLUMNS: [&str; 2] = ["mu_snp", "rate"];

/// Space-delimited trinucleotide mutation-rate table (`from to mu_snp`).
pub struct MutationRateDataset {
    pub path: PathBuf,
}

impl Dataset for MutationRateDataset {
    fn load(&self) -> PolarsResult<DataFrame> {
        info!("Reading mutation rates from {}", self.path.display());
        match read_delimited(&self.path, b' ') {
            Ok(df) => Ok(df),
            Err(e) => {
                error!("Failed to read mutation-rate table: {}", e);
                Err(e)
            }
        }
    }
}

/// Trinucleotide substitution rates as a `from`, `to`, `mu_snp` frame with
/// exactly one row per (context, alt_context). Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct MutationRateTable {
    frame: DataFrame,
}

impl MutationRateTable {
    pub fn from_entries<I>(entries: I) -> MapsResult<Self>
    where
        I: IntoIterator<Item = (String, String, f64)>,
    {
        let mut seen: HashMap<(String, String), f64> = HashMap::new();
        let (mut from_col, mut to_col, mut rate_col) = (Vec::new(), Vec::new(), Vec::new());
        for (row, (from, to, rate)) in entries.into_iter().enumerate() {
            if !rate.is_finite() || rate < 0.0 {
                return Err(MapsError::InvalidRecord {
                    row,
                    detail: format!("rate {} for {}>{} is not a non-negative number", rate, from, to),
                });
            }
            match seen.get(&(from.clone(), to.clone())) {
                Some(&existing) if existing != rate => {
                    return Err(MapsError::InvalidRecord {
                        row,
                        detail: format!(
                            "{}>{} listed with two rates ({} and {})",
                            from, to, existing, rate
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert((from.clone(), to.clone()), rate);
                    from_col.push(from);
                    to_col.push(to);
                    rate_col.push(rate);
                }
            }
        }
        let frame = DataFrame::new(vec![
            Column::new("from".into(), from_col),
            Column::new("to".into(), to_col),
            Column::new("mu_snp".into(), rate_col),
        ])?;
        Ok(Self { frame })
    }

    pub fn from_frame(df: &DataFrame) -> MapsResult<Self> {
        let rate_col = RATE_COLUMNS
            .iter()
            .copied()
            .find(|c| has_column(df, c))
            .ok_or_else(|| MapsError::MissingColumn(RATE_COLUMNS.join("|")))?;

        let from = str_values(df, "from")?;
        let to = str_values(df, "to")?;
        let rate = f64_values(df, rate_col)?;

        let mut entries = Vec::with_capacity(df.height());
        for (row, ((f, t), r)) in from.into_iter().zip(to).zip(rate).enumerate() {
            match (f, t, r) {
                (Some(f), Some(t), Some(r)) => entries.push((f, t, r)),
                _ => {
                    return Err(MapsError::InvalidRecord {
                        row,
                        detail: "null in mutation-rate table".to_string(),
                    })
                }
            }
        }
        let table = Self::from_entries(entries)?;
        if table.is_empty() {
            return Err(MapsError::insufficient("mutation rates", "table has no entries"));
        }
        info!("Loaded {} mutation-rate entries", table.len());
        Ok(table)
    }

    pub fn load(dataset: &MutationRateDataset) -> MapsResult<Self> {
        Self::from_frame(&dataset.load()?)
    }

    /// Right-hand side of the variant join.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rate_of(table: &MutationRateTable, from: &str, to: &str) -> Option<f64> {
        let df = table.frame();
        let f = df.column("from").unwrap().str().unwrap();
        let t = df.column("to").unwrap().str().unwrap();
        let r = df.column("mu_snp").unwrap().f64().unwrap();
        (0..df.height())
            .find(|&i| f.get(i) == Some(from) && t.get(i) == Some(to))
            .and_then(|i| r.get(i))
    }

    #[test]
    fn loads_space_delimited_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mu.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "from to mu_snp").unwrap();
        writeln!(f, "ACA AGA 1e-08").unwrap();
        writeln!(f, "TGT TAT 5e-08").unwrap();
        drop(f);

        let table = MutationRateTable::load(&MutationRateDataset { path }).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(rate_of(&table, "ACA", "AGA"), Some(1e-8));
        assert_eq!(rate_of(&table, "TGT", "TAT"), Some(5e-8));
        assert_eq!(rate_of(&table, "ACA", "ATA"), None);
    }

    #[test]
    fn repeated_identical_entries_collapse() {
        let entries = vec![
            ("ACA".to_string(), "AGA".to_string(), 1e-8),
            ("ACA".to_string(), "AGA".to_string(), 1e-8),
        ];
        assert_eq!(MutationRateTable::from_entries(entries).unwrap().len(), 1);
    }

    #[test]
    fn conflicting_duplicates_are_rejected() {
        let entries = vec![
            ("ACA".to_string(), "AGA".to_string(), 1e-8),
            ("ACA".to_string(), "AGA".to_string(), 1e-8),
            ("ACA".to_string(), "AGA".to_string(), 2e-8),
        ];
        assert!(matches!(
            MutationRateTable::from_entries(entries),
            Err(MapsError::InvalidRecord { row: 2, .. })
        ));
    }

    #[test]
    fn empty_table_is_insufficient() {
        let df = polars::df![
            "from" => Vec::<&str>::new(),
            "to" => Vec::<&str>::new(),
            "mu_snp" => Vec::<f64>::new(),
        ]
        .unwrap();
        assert!(matches!(
            MutationRateTable::from_frame(&df),
            Err(MapsError::InsufficientData { .. })
        ));
    }

    #[test]
    fn accepts_rate_column_name() {
        let df = polars::df![
            "from" => &["ACA"],
            "to" => &["ATA"],
            "rate" => &[3e-9],
        ]
        .unwrap();
        let table = MutationRateTable::from_frame(&df).unwrap();
        assert_eq!(rate_of(&table, "ACA", "ATA"), Some(3e-9));
    }
}
