use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{MapsError, MapsResult};

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Absolute paths pass through, relative ones hang off the project root.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root().join(path)
    }
}

/// Reads a delimited table with a header row. The schema is inferred from the
/// whole file so mixed label columns ("-3", "synonymous_variant") stay strings.
pub fn read_delimited(file_path: &Path, separator: u8) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()
}

pub fn read_tsv(file_path: &Path) -> PolarsResult<DataFrame> {
    read_delimited(file_path, b'\t')
}

pub fn dataframe_to_tsv(df: &mut DataFrame, path: &Path) -> PolarsResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .finish(df)
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> MapsResult<&'a Column> {
    df.column(name)
        .map_err(|_| MapsError::MissingColumn(name.to_string()))
}

pub fn str_values(df: &DataFrame, name: &str) -> MapsResult<Vec<Option<String>>> {
    let col = column(df, name)?.cast(&DataType::String)?;
    Ok(col
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

pub fn i64_values(df: &DataFrame, name: &str) -> MapsResult<Vec<Option<i64>>> {
    let col = column(df, name)?.cast(&DataType::Int64)?;
    Ok(col.i64()?.into_iter().collect())
}

pub fn f64_values(df: &DataFrame, name: &str) -> MapsResult<Vec<Option<f64>>> {
    let col = column(df, name)?.cast(&DataType::Float64)?;
    Ok(col.f64()?.into_iter().collect())
}

/// Decimal rounding with ties to even, the convention of the tabular
/// tooling the published numbers were produced with.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round_ties_even() / scale
}
