use std::cmp::Ordering;

use super::allele::Allele;
use super::site_caller::SiteEvaluation;

/// Ranking key of a kept site.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityScoreRecord {
    /// Index of the site within its locus.
    pub site_index: usize,
    /// Fraction of inbred taxa with a call, in `[0, 1]`.
    pub inbred_coverage: f64,
    /// Observed over expected heterozygosity in the inbred subset.
    pub inbred_het_score: f64,
    /// Retained alleles, deepest first.
    pub kept_alleles: Vec<Allele>,
    /// Genomic coordinate of the site.
    pub genomic_position: i32,
}

impl QualityScoreRecord {
    /// Record for a kept evaluation; `None` for a rejected one.
    pub fn from_evaluation(evaluation: &SiteEvaluation, genomic_position: i32) -> Option<Self> {
        let call = evaluation.call()?;
        Some(Self {
            site_index: evaluation.site_index,
            inbred_coverage: evaluation.statistics.inbred_coverage,
            inbred_het_score: evaluation.statistics.inbred_het_score,
            kept_alleles: call.kept_alleles.clone(),
            genomic_position,
        })
    }

    fn priority(&self, other: &Self) -> Ordering {
        other
            .inbred_coverage
            .total_cmp(&self.inbred_coverage)
            .then_with(|| self.inbred_het_score.total_cmp(&other.inbred_het_score))
            .then_with(|| self.site_index.cmp(&other.site_index))
    }
}

/// Order kept sites by write-back priority.
///
/// Better inbred coverage first, then lower heterozygosity score, then sites
/// nearer the start of the tag.
pub fn rank(mut records: Vec<QualityScoreRecord>) -> Vec<QualityScoreRecord> {
    records.sort_by(QualityScoreRecord::priority);
    records
}

/// Split ranked records into those that fit `capacity` and the overflow.
pub fn select(
    mut ranked: Vec<QualityScoreRecord>,
    capacity: usize,
) -> (Vec<QualityScoreRecord>, Vec<QualityScoreRecord>) {
    let dropped = ranked.split_off(capacity.min(ranked.len()));
    (ranked, dropped)
}
