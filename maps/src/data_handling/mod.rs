pub mod allele_counts;
pub mod mutation_rates;
pub mod position_scores;
