//! Per-site statistical filtering and genotype resolution.
//!
//! A site moves through a fixed sequence of checks (invariance, minor-allele
//! thresholds, gap policy, inbreeding F, allele-set finalisation) and ends
//! either [`SiteOutcome::Kept`] with per-taxon genotypes or
//! [`SiteOutcome::Rejected`] with the first reason that applied. Rejection is
//! an ordinary result, never an error.

use std::fmt;

use bitvec::prelude::*;

use super::allele::{Allele, Genotype, NUM_ALLELES};
use super::genotype::GenotypePolicy;
use super::tag_locus::AlleleDepthMatrix;
use crate::config::DiscoveryConfig;

/// Upper bound on alleles retained at one site.
pub const MAX_KEPT_ALLELES: usize = 4;

/// Which alleles a kept site carries forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllelePolicy {
    /// Every observed allele by descending depth, capped at four.
    All,
    /// The two deepest alleles.
    MajorMinorOnly,
    /// The two deepest nucleotides plus the gap allele when observed.
    BiallelicWithGap,
}

/// How a failed inbreeding test affects a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterMode {
    /// Reject the site.
    #[default]
    Immediate,
    /// Keep the site and record the failure in its pass flag.
    Deferred,
}

/// Reason a site was not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteRejection {
    /// Fewer than two alleles carry reads.
    Invariant,
    /// Neither the frequency nor the count threshold is met.
    BelowMinorThresholds,
    /// A gap is among the called alleles while gaps are disallowed.
    GapInMajorAlleles,
    /// Observed F below the configured minimum.
    FailedInbreeding,
    /// Fewer than two alleles survive genotype calling.
    InvariantAfterFiltering,
}

impl SiteRejection {
    /// Label used in the site log.
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteRejection::Invariant => "invariant",
            SiteRejection::BelowMinorThresholds => "belowMinorThresholds",
            SiteRejection::GapInMajorAlleles => "gapInMajorAlleles",
            SiteRejection::FailedInbreeding => "failedInbreeding",
            SiteRejection::InvariantAfterFiltering => "invariantAfterFiltering",
        }
    }
}

impl fmt::Display for SiteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retained site with its per-taxon calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteCall {
    /// Index of the site within the locus depth matrix.
    pub site_index: usize,
    /// Distance of the site from the locus minimum start.
    pub position_in_locus: i32,
    /// Retained alleles in locus orientation, deepest first.
    pub kept_alleles: Vec<Allele>,
    /// One genotype per taxon, in locus orientation.
    pub genotypes: Vec<Genotype>,
}

impl SiteCall {
    /// Whether `allele` was retained.
    pub fn retains(&self, allele: Allele) -> bool {
        self.kept_alleles.contains(&allele)
    }
}

/// Terminal state of one site.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    /// The site passed every check.
    Kept(SiteCall),
    /// The site failed a check.
    Rejected(SiteRejection),
}

/// Coverage and heterozygosity figures gathered while evaluating a site.
///
/// Figures after the rejection point keep their neutral defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SiteStatistics {
    /// Alleles with reads, deepest first.
    pub alleles: Vec<Allele>,
    /// Taxa with at least one read at the site.
    pub taxa_covered: usize,
    /// Inbred-subset taxa with a called genotype.
    pub inbred_taxa_covered: usize,
    /// `inbred_taxa_covered` over the subset size.
    pub inbred_coverage: f64,
    /// Heterozygous fraction among covered subset taxa.
    pub prop_hets: f64,
    /// `prop_hets` over its Hardy-Weinberg expectation, 0 without variation.
    pub inbred_het_score: f64,
    /// Observed inbreeding coefficient over the subset.
    pub observed_f: f64,
    /// Minor allele frequency from summed read depths.
    pub maf: f64,
    /// Reads supporting the minor allele.
    pub minor_count: u64,
    /// Whether the inbreeding test passed (or was disabled).
    pub passes_f: bool,
}

/// Full record of a site evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteEvaluation {
    /// Index of the site within the locus depth matrix.
    pub site_index: usize,
    /// Distance from the locus minimum start.
    pub position_in_locus: i32,
    /// Terminal state.
    pub outcome: SiteOutcome,
    /// Figures gathered on the way.
    pub statistics: SiteStatistics,
}

impl SiteEvaluation {
    /// Kept call, if any.
    pub fn call(&self) -> Option<&SiteCall> {
        match &self.outcome {
            SiteOutcome::Kept(call) => Some(call),
            SiteOutcome::Rejected(_) => None,
        }
    }

    /// Kept and passing the inbreeding test.
    pub fn passes(&self) -> bool {
        self.call().is_some() && self.statistics.passes_f
    }

    /// Label for the site log status column.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            SiteOutcome::Kept(_) => "kept",
            SiteOutcome::Rejected(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug, Default)]
struct InbredSummary {
    covered: usize,
    coverage: f64,
    prop_hets: f64,
    het_score: f64,
    observed_f: f64,
}

/// Applies the site checks with a pluggable genotype rule.
#[derive(Debug, Clone)]
pub struct SiteCaller<G> {
    min_maf: f64,
    min_mac: u64,
    minimum_f: Option<f64>,
    include_gaps: bool,
    policy: AllelePolicy,
    filter_mode: FilterMode,
    inbred: Option<BitVec>,
    genotyper: G,
}

impl<G: GenotypePolicy> SiteCaller<G> {
    /// Caller with thresholds and policies taken from `config`.
    pub fn new(config: &DiscoveryConfig, genotyper: G) -> Self {
        Self {
            min_maf: config.min_minor_allele_freq,
            min_mac: u64::from(config.min_minor_allele_count),
            minimum_f: config.f_test_enabled().then_some(config.minimum_f),
            include_gaps: config.include_gaps,
            policy: config.allele_policy(),
            filter_mode: config.filter_mode,
            inbred: None,
            genotyper,
        }
    }

    /// Restrict the inbreeding test to the taxa set in `mask`.
    pub fn with_inbred_mask(mut self, mask: BitVec) -> Self {
        self.inbred = Some(mask);
        self
    }

    /// Allele policy in effect.
    pub fn policy(&self) -> AllelePolicy {
        self.policy
    }

    /// Evaluate every site of a locus matrix.
    pub fn call_locus(&self, matrix: &AlleleDepthMatrix) -> Vec<SiteEvaluation> {
        (0..matrix.site_count())
            .map(|site| self.evaluate(matrix, site))
            .collect()
    }

    /// Evaluate one site.
    pub fn evaluate(&self, matrix: &AlleleDepthMatrix, site: usize) -> SiteEvaluation {
        let mut statistics = SiteStatistics {
            passes_f: true,
            observed_f: 1.0,
            ..SiteStatistics::default()
        };
        let outcome = self.run(matrix, site, &mut statistics);
        SiteEvaluation {
            site_index: site,
            position_in_locus: matrix.positions()[site],
            outcome,
            statistics,
        }
    }

    fn run(
        &self,
        matrix: &AlleleDepthMatrix,
        site: usize,
        statistics: &mut SiteStatistics,
    ) -> SiteOutcome {
        let totals = matrix.allele_totals(site);
        let observed = alleles_by_depth(&totals);
        statistics.alleles = observed.clone();
        statistics.taxa_covered = (0..matrix.taxa_count())
            .filter(|&taxon| matrix.site_depths(site, taxon).iter().any(|&n| n > 0))
            .count();

        if observed.len() < 2 {
            return SiteOutcome::Rejected(SiteRejection::Invariant);
        }

        let major = totals[observed[0].index()];
        let minor = totals[observed[1].index()];
        statistics.maf = ratio(minor, major + minor);
        statistics.minor_count = minor;
        if statistics.maf < self.min_maf && minor < self.min_mac {
            return SiteOutcome::Rejected(SiteRejection::BelowMinorThresholds);
        }

        let Some(kept) = self.candidate_alleles(&observed) else {
            return SiteOutcome::Rejected(SiteRejection::GapInMajorAlleles);
        };

        let genotypes: Vec<Genotype> = (0..matrix.taxa_count())
            .map(|taxon| self.genotyper.resolve(&matrix.site_depths(site, taxon), &kept))
            .collect();

        let inbred = self.inbred_summary(&genotypes);
        statistics.inbred_taxa_covered = inbred.covered;
        statistics.inbred_coverage = inbred.coverage;
        statistics.prop_hets = inbred.prop_hets;
        statistics.inbred_het_score = inbred.het_score;
        statistics.observed_f = inbred.observed_f;

        if let Some(minimum_f) = self.minimum_f {
            if inbred.observed_f < minimum_f {
                statistics.passes_f = false;
                if self.filter_mode == FilterMode::Immediate {
                    return SiteOutcome::Rejected(SiteRejection::FailedInbreeding);
                }
            }
        }

        let called: Vec<Allele> = kept
            .iter()
            .copied()
            .filter(|&allele| genotypes.iter().any(|g| g.copies_of(allele) > 0))
            .collect();
        if called.len() < 2 {
            return SiteOutcome::Rejected(SiteRejection::InvariantAfterFiltering);
        }

        SiteOutcome::Kept(SiteCall {
            site_index: site,
            position_in_locus: matrix.positions()[site],
            kept_alleles: called,
            genotypes,
        })
    }

    /// Alleles carried into genotyping, or `None` when the gap rule fails.
    fn candidate_alleles(&self, observed: &[Allele]) -> Option<Vec<Allele>> {
        match self.policy {
            AllelePolicy::BiallelicWithGap => {
                let mut kept: Vec<Allele> = observed
                    .iter()
                    .copied()
                    .filter(|&a| a != Allele::Gap)
                    .take(2)
                    .collect();
                if kept.len() < 2 {
                    return None;
                }
                if observed.contains(&Allele::Gap) {
                    kept.push(Allele::Gap);
                }
                Some(kept)
            }
            AllelePolicy::MajorMinorOnly | AllelePolicy::All => {
                if !self.include_gaps && observed[..2].contains(&Allele::Gap) {
                    return None;
                }
                let limit = match self.policy {
                    AllelePolicy::All => MAX_KEPT_ALLELES,
                    _ => 2,
                };
                Some(
                    observed
                        .iter()
                        .copied()
                        .filter(|&a| self.include_gaps || a != Allele::Gap)
                        .take(limit)
                        .collect(),
                )
            }
        }
    }

    fn in_subset(&self, taxon: usize) -> bool {
        self.inbred
            .as_ref()
            .map_or(true, |mask| mask.get(taxon).is_some_and(|bit| *bit))
    }

    fn inbred_summary(&self, genotypes: &[Genotype]) -> InbredSummary {
        let subset: Vec<&Genotype> = genotypes
            .iter()
            .enumerate()
            .filter(|(taxon, _)| self.in_subset(*taxon))
            .map(|(_, g)| g)
            .collect();
        let called: Vec<&Genotype> = subset.iter().copied().filter(|g| g.is_called()).collect();
        let hets = called.iter().filter(|g| g.is_heterozygous()).count();

        let mut copies = [0usize; NUM_ALLELES];
        for genotype in &called {
            for allele in Allele::ALL {
                copies[allele.index()] += genotype.copies_of(allele) as usize;
            }
        }
        let total_copies = 2 * called.len();
        let major_copies = copies.iter().copied().max().unwrap_or(0);
        let q = 1.0 - ratio(major_copies as u64, total_copies as u64);
        let expected_hets = 2.0 * q * (1.0 - q);

        let prop_hets = ratio(hets as u64, called.len() as u64);
        let (het_score, observed_f) = if expected_hets > 0.0 {
            let score = prop_hets / expected_hets;
            (score, 1.0 - score)
        } else {
            (0.0, 1.0)
        };

        InbredSummary {
            covered: called.len(),
            coverage: ratio(called.len() as u64, subset.len() as u64),
            prop_hets,
            het_score,
            observed_f,
        }
    }
}

/// Alleles with non-zero depth, deepest first; ties keep code order.
fn alleles_by_depth(totals: &[u64; NUM_ALLELES]) -> Vec<Allele> {
    let mut alleles: Vec<Allele> = Allele::ALL
        .into_iter()
        .filter(|a| totals[a.index()] > 0)
        .collect();
    alleles.sort_by(|a, b| totals[b.index()].cmp(&totals[a.index()]));
    alleles
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::DepthRatioGenotyper;

    fn row(pairs: &[(Allele, u16)]) -> [u16; NUM_ALLELES] {
        let mut depths = [0; NUM_ALLELES];
        for &(allele, n) in pairs {
            depths[allele.index()] = n;
        }
        depths
    }

    fn matrix(taxa: Vec<[u16; NUM_ALLELES]>) -> AlleleDepthMatrix {
        AlleleDepthMatrix::from_rows(vec![2], &[taxa])
    }

    fn caller(config: DiscoveryConfig) -> SiteCaller<DepthRatioGenotyper> {
        let genotyper = DepthRatioGenotyper::new(config.average_sequencing_error_rate);
        SiteCaller::new(&config, genotyper)
    }

    #[test]
    fn frequency_alone_is_enough() {
        let m = matrix(vec![row(&[(Allele::C, 2), (Allele::T, 1)])]);
        let eval = caller(DiscoveryConfig::default()).evaluate(&m, 0);
        let call = eval.call().expect("site kept");
        assert_eq!(call.kept_alleles, vec![Allele::C, Allele::T]);
        assert_eq!(call.genotypes, vec![Genotype::Heterozygous(Allele::C, Allele::T)]);
        assert!((eval.statistics.maf - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(eval.statistics.minor_count, 1);
    }

    #[test]
    fn both_thresholds_missed_rejects() {
        let m = matrix(vec![row(&[(Allele::A, 200), (Allele::G, 1)])]);
        let config = DiscoveryConfig::default().with_min_minor_allele_freq(0.05);
        let eval = caller(config).evaluate(&m, 0);
        assert_eq!(eval.outcome, SiteOutcome::Rejected(SiteRejection::BelowMinorThresholds));
    }

    #[test]
    fn single_allele_is_invariant() {
        let m = matrix(vec![row(&[(Allele::A, 5)]), row(&[(Allele::A, 3)])]);
        let eval = caller(DiscoveryConfig::default()).evaluate(&m, 0);
        assert_eq!(eval.outcome, SiteOutcome::Rejected(SiteRejection::Invariant));
        assert_eq!(eval.statistics.taxa_covered, 2);
    }

    #[test]
    fn gap_among_top_two_rejects_without_gap_modes() {
        let m = matrix(vec![row(&[(Allele::A, 10), (Allele::Gap, 8)])]);
        let eval = caller(DiscoveryConfig::default()).evaluate(&m, 0);
        assert_eq!(eval.outcome, SiteOutcome::Rejected(SiteRejection::GapInMajorAlleles));
    }

    #[test]
    fn minor_gap_is_dropped_and_nulled() {
        let m = matrix(vec![
            row(&[(Allele::A, 20)]),
            row(&[(Allele::T, 20)]),
            row(&[(Allele::A, 20), (Allele::T, 15)]),
            row(&[(Allele::Gap, 5)]),
        ]);
        let eval = caller(DiscoveryConfig::default()).evaluate(&m, 0);
        let call = eval.call().expect("site kept");
        assert_eq!(call.kept_alleles, vec![Allele::A, Allele::T]);
        assert_eq!(call.genotypes[3], Genotype::Missing);
        assert!(call.genotypes.iter().all(|g| g.copies_of(Allele::Gap) == 0));
    }

    #[test]
    fn biallelic_with_gap_retains_third_allele() {
        let m = matrix(vec![
            row(&[(Allele::A, 20)]),
            row(&[(Allele::Gap, 30)]),
            row(&[(Allele::T, 12)]),
        ]);
        let config = DiscoveryConfig {
            biallelic_with_gap: true,
            ..DiscoveryConfig::default()
        };
        let eval = caller(config).evaluate(&m, 0);
        let call = eval.call().expect("site kept");
        assert_eq!(call.kept_alleles, vec![Allele::A, Allele::T, Allele::Gap]);
        assert_eq!(call.genotypes[1], Genotype::Homozygous(Allele::Gap));
    }

    #[test]
    fn rare_alleles_are_capped_at_four() {
        let m = matrix(vec![
            row(&[(Allele::A, 40)]),
            row(&[(Allele::C, 30)]),
            row(&[(Allele::G, 20)]),
            row(&[(Allele::T, 10)]),
            row(&[(Allele::Gap, 50)]),
        ]);
        let config = DiscoveryConfig {
            include_rare_alleles: true,
            include_gaps: true,
            ..DiscoveryConfig::default()
        };
        let eval = caller(config).evaluate(&m, 0);
        let call = eval.call().expect("site kept");
        assert_eq!(
            call.kept_alleles,
            vec![Allele::Gap, Allele::A, Allele::C, Allele::G]
        );
        assert_eq!(call.genotypes[3], Genotype::Missing);
    }

    #[test]
    fn homozygous_calls_only_leave_site_invariant() {
        let m = matrix(vec![row(&[(Allele::A, 200), (Allele::C, 1)])]);
        let config = DiscoveryConfig::default().with_min_minor_allele_count(1);
        let eval = caller(config).evaluate(&m, 0);
        assert_eq!(
            eval.outcome,
            SiteOutcome::Rejected(SiteRejection::InvariantAfterFiltering)
        );
    }

    fn outbred_site() -> AlleleDepthMatrix {
        matrix(vec![
            row(&[(Allele::A, 10), (Allele::G, 10)]),
            row(&[(Allele::A, 10), (Allele::G, 9)]),
            row(&[(Allele::A, 12)]),
            row(&[(Allele::G, 12)]),
        ])
    }

    #[test]
    fn heterozygous_excess_fails_inbreeding() {
        let config = DiscoveryConfig::default().with_minimum_f(0.5);
        let eval = caller(config).evaluate(&outbred_site(), 0);
        assert_eq!(eval.outcome, SiteOutcome::Rejected(SiteRejection::FailedInbreeding));
        assert!((eval.statistics.prop_hets - 0.5).abs() < 1e-12);
        assert!((eval.statistics.observed_f - 0.0).abs() < 1e-12);
        assert!(!eval.statistics.passes_f);
    }

    #[test]
    fn deferred_mode_flags_instead_of_rejecting() {
        let config = DiscoveryConfig::default()
            .with_minimum_f(0.5)
            .with_filter_mode(FilterMode::Deferred);
        let eval = caller(config).evaluate(&outbred_site(), 0);
        assert!(eval.call().is_some());
        assert!(!eval.passes());
    }

    #[test]
    fn inbred_subset_without_variation_is_neutral() {
        let config = DiscoveryConfig::default().with_minimum_f(0.99);
        let eval = caller(config)
            .with_inbred_mask(bitvec![0, 0, 1, 0])
            .evaluate(&outbred_site(), 0);
        assert!(eval.passes());
        assert_eq!(eval.statistics.observed_f, 1.0);
        assert_eq!(eval.statistics.inbred_het_score, 0.0);
        assert_eq!(eval.statistics.inbred_taxa_covered, 1);
        assert!((eval.statistics.inbred_coverage - 1.0).abs() < 1e-12);
    }
}
