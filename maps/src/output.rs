use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::helper_functions::dataframe_to_tsv;
use crate::models::{CategoryAggregate, SignificanceResult};
use crate::profiles::ScoreProfile;
use crate::pwm::{PwmRow, PWM_BASES};

fn maps_columns(rows: &[&CategoryAggregate]) -> Vec<Column> {
    let strs = |f: fn(&CategoryAggregate) -> &str| -> Vec<String> {
        rows.iter().map(|r| f(r).to_string()).collect()
    };
    let ints = |f: fn(&CategoryAggregate) -> u64| -> Vec<u64> { rows.iter().map(|r| f(r)).collect() };
    let floats = |f: fn(&CategoryAggregate) -> f64| -> Vec<f64> { rows.iter().map(|r| f(r)).collect() };

    vec![
        Column::new("region".into(), strs(|r| &r.region)),
        Column::new("subset".into(), strs(|r| &r.subset)),
        Column::new("category".into(), strs(|r| &r.category)),
        Column::new("label".into(), strs(|r| &r.label)),
        Column::new("n_singletons".into(), ints(|r| r.n_singletons)),
        Column::new("n_alleles".into(), ints(|r| r.n_alleles)),
        Column::new("ps_raw".into(), floats(|r| r.ps_raw)),
        Column::new("se".into(), floats(|r| r.se)),
        Column::new("mu_snp".into(), floats(|r| r.mu_snp)),
        Column::new("ps_pred".into(), floats(|r| r.ps_pred)),
        Column::new("maps".into(), floats(|r| r.maps)),
        Column::new("ci_upper".into(), floats(|r| r.ci_upper)),
        Column::new("ci_lower".into(), floats(|r| r.ci_lower)),
    ]
}

pub fn maps_frame(rows: &[CategoryAggregate]) -> PolarsResult<DataFrame> {
    let refs: Vec<&CategoryAggregate> = rows.iter().collect();
    DataFrame::new(maps_columns(&refs))
}

/// MAPS columns followed by the normalised score and the test result.
pub fn significance_frame(results: &[SignificanceResult]) -> PolarsResult<DataFrame> {
    let refs: Vec<&CategoryAggregate> = results.iter().map(|r| &r.aggregate).collect();
    let mut columns = maps_columns(&refs);
    columns.push(Column::new(
        "maps_norm".into(),
        results.iter().map(|r| r.maps_norm).collect::<Vec<f64>>(),
    ));
    columns.push(Column::new(
        "ns_norm".into(),
        results.iter().map(|r| r.ns_norm).collect::<Vec<u64>>(),
    ));
    columns.push(Column::new(
        "chi_sq".into(),
        results.iter().map(|r| r.chi_sq).collect::<Vec<f64>>(),
    ));
    columns.push(Column::new(
        "chi_sq_p".into(),
        results.iter().map(|r| r.chi_sq_p).collect::<Vec<f64>>(),
    ));
    DataFrame::new(columns)
}

pub fn profile_frame(rows: &[ScoreProfile]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new("region".into(), rows.iter().map(|r| r.region.clone()).collect::<Vec<String>>()),
        Column::new("subset".into(), rows.iter().map(|r| r.subset.clone()).collect::<Vec<String>>()),
        Column::new("site".into(), rows.iter().map(|r| r.site.clone()).collect::<Vec<String>>()),
        Column::new("count".into(), rows.iter().map(|r| r.count).collect::<Vec<u64>>()),
        Column::new("mean".into(), rows.iter().map(|r| r.mean).collect::<Vec<f64>>()),
        Column::new("std".into(), rows.iter().map(|r| r.std).collect::<Vec<Option<f64>>>()),
        Column::new("sem".into(), rows.iter().map(|r| r.sem).collect::<Vec<Option<f64>>>()),
        Column::new("ci_upper".into(), rows.iter().map(|r| r.ci_upper).collect::<Vec<Option<f64>>>()),
        Column::new("ci_lower".into(), rows.iter().map(|r| r.ci_lower).collect::<Vec<Option<f64>>>()),
    ])
}

pub fn pwm_frame(rows: &[PwmRow]) -> PolarsResult<DataFrame> {
    let mut columns = vec![
        Column::new("region".into(), rows.iter().map(|r| r.region.clone()).collect::<Vec<String>>()),
        Column::new("site".into(), rows.iter().map(|r| r.site.clone()).collect::<Vec<String>>()),
    ];
    for (k, base) in PWM_BASES.iter().enumerate() {
        columns.push(Column::new(
            (*base).into(),
            rows.iter().map(|r| r.counts[k]).collect::<Vec<u64>>(),
        ));
    }
    DataFrame::new(columns)
}

pub fn write_frame(mut df: DataFrame, path: &Path) -> PolarsResult<()> {
    dataframe_to_tsv(&mut df, path)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::read_tsv;

    fn aggregate() -> CategoryAggregate {
        CategoryAggregate {
            region: "Branchpoint".to_string(),
            subset: "85".to_string(),
            category: "-2".to_string(),
            label: "-2".to_string(),
            n_singletons: 6,
            n_alleles: 10,
            ps_raw: 0.6,
            se: 0.15,
            mu_snp: 2e-8,
            ps_pred: 0.55,
            maps: 0.05,
            ci_upper: 0.344,
            ci_lower: -0.244,
        }
    }

    #[test]
    fn significance_table_extends_maps_table() {
        let result = SignificanceResult {
            aggregate: aggregate(),
            maps_norm: 0.55,
            ns_norm: 6,
            chi_sq: 0.4,
            chi_sq_p: 0.52,
        };
        let maps = maps_frame(&[aggregate()]).unwrap();
        let sig = significance_frame(&[result]).unwrap();
        assert_eq!(maps.width(), 13);
        assert_eq!(sig.width(), 17);
        let sig_names: Vec<String> = sig.get_column_names().iter().map(|c| c.to_string()).collect();
        let maps_names: Vec<String> = maps.get_column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(sig_names[..13], maps_names[..]);
        assert_eq!(sig_names[16], "chi_sq_p");
    }

    #[test]
    fn written_tables_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.tsv");
        write_frame(maps_frame(&[aggregate()]).unwrap(), &path).unwrap();

        let df = read_tsv(&path).unwrap();
        assert_eq!(df.height(), 1);
        let maps = df.column("maps").unwrap().f64().unwrap().get(0).unwrap();
        assert!((maps - 0.05).abs() < 1e-12);
        let subset = df.column("subset").unwrap().cast(&DataType::String).unwrap();
        assert_eq!(subset.str().unwrap().get(0), Some("85"));
    }

    #[test]
    fn pwm_columns_follow_base_order() {
        let rows = vec![PwmRow {
            region: "Donor".to_string(),
            site: "1".to_string(),
            counts: [1, 2, 3, 4],
        }];
        let df = pwm_frame(&rows).unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["region", "site", "A", "C", "G", "T"]);
    }
}
