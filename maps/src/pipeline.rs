//! End-to-end batch run: join, fit, aggregate, test, summarise, write.

use std::fs;

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::data_handling::allele_counts::AlleleCountDataset;
use crate::data_handling::mutation_rates::{MutationRateDataset, MutationRateTable};
use crate::data_handling::position_scores::{position_scores_from_frame, spliceai_position_scores, PositionTable};
use crate::error::{MapsError, MapsResult};
use crate::maps::{aggregate_subsets, MapsTable, Subset};
use crate::models::{Dataset, RatedVariants, SignificanceResult};
use crate::mutability_model::{fit, FittedModel};
use crate::output::{maps_frame, profile_frame, pwm_frame, significance_frame, write_frame};
use crate::profiles::{score_profile, sort_profiles};
use crate::pwm::position_weight_matrix;
use crate::significance::{test_table, Baseline};

pub const MAPS_OUTPUT: &str = "maps_output.tsv";
pub const SIGNIFICANCE_OUTPUT: &str = "maps_chi_square_test.tsv";
pub const MODEL_OUTPUT: &str = "maps_model.json";
pub const PHYLOP_OUTPUT: &str = "phylop_profile.tsv";
pub const SPLICEAI_OUTPUT: &str = "spliceai_profile.tsv";
pub const PWM_OUTPUT: &str = "pwm.tsv";
pub const CONFIG_OUTPUT: &str = "run_config.json";

/// What a run produced, for callers that want more than the files.
#[derive(Debug)]
pub struct RunSummary {
    pub model: FittedModel,
    pub table: MapsTable,
    pub baseline: Baseline,
    pub significance: Vec<SignificanceResult>,
}

/// Score-threshold subsets only make sense when the variants carry scores.
fn runnable_subsets(variants: &RatedVariants, config: &RunConfig) -> Vec<Subset> {
    let scored = variants.has_scores();
    config
        .subsets()
        .into_iter()
        .filter(|s| {
            let keep = s.min_score.is_none() || scored;
            if !keep {
                info!("No variant carries a score; skipping subset '{}'", s.name);
            }
            keep
        })
        .collect()
}

/// Fits on synonymous variants, then aggregates and tests every subset.
pub fn compute(variants: &RatedVariants, config: &RunConfig) -> MapsResult<RunSummary> {
    let model = match &config.model {
        Some(path) => {
            info!("Using saved mutability model {}", path.display());
            FittedModel::load(path)?
        }
        None => {
            info!("Fitting mutability model on {} variants", variants.height());
            fit(variants)?
        }
    };

    let required: Vec<&str> = config.required_categories.iter().map(String::as_str).collect();
    let table = aggregate_subsets(
        variants,
        &model,
        &runnable_subsets(variants, config),
        &config.default_region,
        &required,
    )?;
    if table.is_empty() {
        return Err(MapsError::insufficient("all", "no variants in any subset"));
    }

    let baseline = match config.baseline {
        Some(b) => {
            let b = Baseline::new(b.n_singletons, b.n_alleles)?;
            if let Some(derived) = table.synonymous("all") {
                if (derived.n_singletons, derived.n_alleles) != (b.n_singletons, b.n_alleles) {
                    warn!(
                        "Configured baseline {}/{} differs from this dataset's synonymous counts {}/{}",
                        b.n_singletons, b.n_alleles, derived.n_singletons, derived.n_alleles
                    );
                }
            }
            b
        }
        None => Baseline::from_table(&table, "all")?,
    };
    info!(
        "Baseline: {} singletons / {} alleles (ps_raw = {:.6})",
        baseline.n_singletons,
        baseline.n_alleles,
        baseline.ps_raw()
    );

    let ordered = table.ordered(&config.order);
    let significance = test_table(&ordered, &baseline)?;

    Ok(RunSummary {
        model,
        table,
        baseline,
        significance,
    })
}

fn write_profiles(config: &RunConfig) -> MapsResult<()> {
    let subsets = config.subsets();
    let out = &config.output_dir;

    if let Some(input) = &config.phylop {
        let df = PositionTable { path: input.path.clone() }.load()?;
        let scores = position_scores_from_frame(
            &df,
            &input.score_column,
            input.subset_column.as_deref(),
            &config.default_region,
        )?;
        let mut rows = score_profile(&scores, &subsets);
        sort_profiles(&mut rows, &config.order);
        write_frame(profile_frame(&rows)?, &out.join(PHYLOP_OUTPUT))?;
    }

    if let Some(input) = &config.spliceai {
        let df = PositionTable { path: input.path.clone() }.load()?;
        let scores = spliceai_position_scores(&df, input.subset_column.as_deref(), &config.default_region)?;
        let mut rows = score_profile(&scores, &subsets);
        sort_profiles(&mut rows, &config.order);
        write_frame(profile_frame(&rows)?, &out.join(SPLICEAI_OUTPUT))?;
    }

    if let Some(path) = &config.reference_bases {
        let df = PositionTable { path: path.clone() }.load()?;
        let rows = position_weight_matrix(&df, &config.default_region, &config.order)?;
        write_frame(pwm_frame(&rows)?, &out.join(PWM_OUTPUT))?;
    }
    Ok(())
}

pub fn run(config: &RunConfig) -> MapsResult<RunSummary> {
    fs::create_dir_all(&config.output_dir)?;

    let rates = MutationRateTable::load(&MutationRateDataset {
        path: config.mutation_rates.clone(),
    })?;
    let variants = AlleleCountDataset {
        path: config.allele_counts.clone(),
        columns: config.columns.clone(),
    }
    .load_rated(&rates)?;

    let summary = compute(&variants, config)?;
    let out = &config.output_dir;

    summary.model.save(&out.join(MODEL_OUTPUT))?;
    write_frame(maps_frame(&summary.table.ordered(&config.order))?, &out.join(MAPS_OUTPUT))?;
    write_frame(significance_frame(&summary.significance)?, &out.join(SIGNIFICANCE_OUTPUT))?;

    write_profiles(config)?;

    config.write(&out.join(CONFIG_OUTPUT))?;
    info!("Run complete; outputs in {}", out.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::{read_tsv, str_values};
    use std::io::Write;
    use std::path::Path;

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut f = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
    }

    fn fixture(dir: &Path) -> RunConfig {
        write_lines(
            &dir.join("mu.txt"),
            &["from to mu_snp", "ACA AGA 1e-08", "TGT TAT 5e-08"],
        );
        write_lines(
            &dir.join("ac.tsv"),
            &[
                "csq\tac\tcontext\talt\tregion\tscore",
                "synonymous_variant\t1\tACA\tG\tCoding\t0.1",
                "synonymous_variant\t2\tACA\tG\tCoding\t0.1",
                "synonymous_variant\t1\tACA\tG\tCoding\t0.1",
                "synonymous_variant\t1\tTGT\tA\tCoding\t0.1",
                "synonymous_variant\t1\tTGT\tA\tCoding\t0.1",
                "-2\t1\tACA\tG\tBranchpoint\t0.9",
                "-2\t3\tTGT\tA\tBranchpoint\t0.9",
                "-2\t1\tTGT\tA\tBranchpoint\t0.5",
                "0\t1\tACA\tG\tBranchpoint\t0.95",
                "0\t1\tACA\tG\tBranchpoint\t0.2",
            ],
        );
        write_lines(
            &dir.join("bases.tsv"),
            &["region\tsite\tref\tstrand", "Branchpoint\t0\tA\t+", "Branchpoint\t-2\tT\t+"],
        );

        RunConfig {
            allele_counts: dir.join("ac.tsv"),
            mutation_rates: dir.join("mu.txt"),
            output_dir: dir.join("stats"),
            reference_bases: Some(dir.join("bases.tsv")),
            ..RunConfig::default()
        }
    }

    #[test]
    fn end_to_end_run_writes_every_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let summary = run(&config).unwrap();

        // Two substitution groups: the fit passes through both.
        assert!((summary.model.predict(1e-8) - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.model.predict(5e-8) - 1.0).abs() < 1e-9);
        assert_eq!(summary.baseline, Baseline { n_singletons: 4, n_alleles: 5 });

        let maps = read_tsv(&config.output_dir.join(MAPS_OUTPUT)).unwrap();
        let subsets = str_values(&maps, "subset").unwrap();
        let categories = str_values(&maps, "category").unwrap();
        let keys: Vec<(String, String)> = subsets
            .into_iter()
            .zip(categories)
            .map(|(s, c)| (s.unwrap(), c.unwrap()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("all".to_string(), "synonymous_variant".to_string()),
                ("all".to_string(), "-2".to_string()),
                ("all".to_string(), "0".to_string()),
                ("85".to_string(), "-2".to_string()),
                ("85".to_string(), "0".to_string()),
            ]
        );

        let sig = read_tsv(&config.output_dir.join(SIGNIFICANCE_OUTPUT)).unwrap();
        assert_eq!(sig.height(), 4);
        assert!(config.output_dir.join(MODEL_OUTPUT).exists());
        assert!(config.output_dir.join(PWM_OUTPUT).exists());
        assert!(config.output_dir.join(CONFIG_OUTPUT).exists());
    }

    #[test]
    fn explicit_baseline_is_used_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.baseline = Some(Baseline { n_singletons: 481_163, n_alleles: 914_195 });
        config.high_impact = Some(Subset::min_score("85", 0.85));
        let summary = run(&config).unwrap();
        assert_eq!(summary.baseline.n_alleles, 914_195);
    }

    #[test]
    fn unmatched_context_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        write_lines(
            &dir.path().join("ac.tsv"),
            &["csq\tac\tcontext\talt", "synonymous_variant\t1\tGGG\tA"],
        );
        assert!(matches!(
            run(&config),
            Err(MapsError::InputJoin { .. })
        ));
    }

    #[test]
    fn unscored_input_runs_only_the_full_subset() {
        let variants = RatedVariants::from_rows(&[
            ("synonymous_variant", "ACA", "G", 1, 1e-8),
            ("synonymous_variant", "ACA", "G", 2, 1e-8),
            ("synonymous_variant", "TGT", "A", 1, 5e-8),
            ("-2", "ACA", "G", 1, 1e-8),
        ]);
        let config = RunConfig {
            required_categories: vec!["synonymous_variant".to_string()],
            ..RunConfig::default()
        };
        let summary = compute(&variants, &config).unwrap();
        assert_eq!(summary.table.len(), 2);
        assert!(summary.table.rows().iter().all(|r| r.subset == "all"));
        assert_eq!(summary.baseline, Baseline { n_singletons: 2, n_alleles: 3 });
        assert_eq!(summary.significance.len(), 1);
    }

    #[test]
    fn saved_model_replaces_the_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        let model_path = dir.path().join("model.json");
        FittedModel {
            intercept: 0.8,
            slope: 0.0,
            n_groups: 2,
            total_alleles: 10,
        }
        .save(&model_path)
        .unwrap();
        config.model = Some(model_path);
        let summary = run(&config).unwrap();
        assert_eq!(summary.model.intercept, 0.8);
        let syn = summary.table.synonymous("all").unwrap();
        assert!((syn.ps_pred - 0.8).abs() < 1e-12);
    }

    #[test]
    fn missing_required_category_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.required_categories = vec!["missense_variant".to_string()];
        assert!(matches!(
            run(&config),
            Err(MapsError::InsufficientData { .. })
        ));
    }
}
