//! Per-site summaries of conservation and splice-impact scores, reported next
//! to MAPS so the three constraint signals can be compared site by site.

use std::collections::BTreeMap;

use statrs::statistics::Statistics;
use tracing::info;

use crate::data_handling::position_scores::PositionScore;
use crate::labels::{CategoryLabel, PresentationOrder};
use crate::maps::{Subset, Z_95};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreProfile {
    pub region: String,
    pub subset: String,
    pub site: String,
    pub count: u64,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single position.
    pub std: Option<f64>,
    pub sem: Option<f64>,
    pub ci_upper: Option<f64>,
    pub ci_lower: Option<f64>,
}

fn finite(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

/// Groups positions by (region, site) within each subset.
pub fn score_profile(scores: &[PositionScore], subsets: &[Subset]) -> Vec<ScoreProfile> {
    let mut out = Vec::new();
    for subset in subsets {
        let mut groups: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
        for s in scores.iter().filter(|s| subset.passes(s.subset_score)) {
            groups
                .entry((s.region.as_str(), s.site.as_str()))
                .or_default()
                .push(s.score);
        }

        for ((region, site), values) in groups {
            let count = values.len() as u64;
            let mean = values.iter().mean();
            let std = finite(values.iter().std_dev());
            let sem = std.map(|sd| sd / (count as f64).sqrt());
            out.push(ScoreProfile {
                region: region.to_string(),
                subset: subset.name.clone(),
                site: site.to_string(),
                count,
                mean,
                std,
                sem,
                ci_upper: sem.map(|e| mean + Z_95 * e),
                ci_lower: sem.map(|e| mean - Z_95 * e),
            });
        }
    }
    info!("Summarised {} (region, site, subset) groups", out.len());
    out
}

pub fn sort_profiles(rows: &mut [ScoreProfile], order: &PresentationOrder) {
    rows.sort_by(|a, b| {
        let la = CategoryLabel::parse(&a.site);
        let lb = CategoryLabel::parse(&b.site);
        order.compare((&a.region, &a.subset, &la), (&b.region, &b.subset, &lb))
    });
}
