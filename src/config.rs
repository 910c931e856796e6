//! Run configuration for SNP discovery.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::genomics::{AllelePolicy, FilterMode, LocusPolicy};

/// Theoretical lower bound of the inbreeding coefficient; thresholds at or
/// below it disable the F test.
pub const F_FLOOR: f64 = -1.0;

/// Errors produced by [`DiscoveryConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A numeric parameter lies outside its allowed range.
    #[error("{name} = {value} is outside {range}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Human-readable allowed range.
        range: &'static str,
    },
    /// `include_gaps` and `biallelic_with_gap` were both requested.
    #[error("include_gaps and biallelic_with_gap are mutually exclusive")]
    ConflictingGapModes,
    /// The chromosome range is empty.
    #[error("empty chromosome range {start}..={end}")]
    EmptyChromosomeRange {
        /// First chromosome.
        start: i32,
        /// Last chromosome.
        end: i32,
    },
}

/// Thresholds and policies for a discovery run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DiscoveryConfig {
    /// Minimum minor allele frequency for a site to pass.
    pub min_minor_allele_freq: f64,
    /// Minimum minor allele read count for a site to pass.
    pub min_minor_allele_count: u32,
    /// Fraction of taxa that must have reads at a locus.
    pub min_locus_coverage: f64,
    /// Minimum inbreeding coefficient; values `<= -1` disable the test.
    pub minimum_f: f64,
    /// Average per-base sequencing error rate used for genotype calls.
    pub average_sequencing_error_rate: f64,
    /// Keep every observed allele instead of the top two.
    pub include_rare_alleles: bool,
    /// Allow the gap allele among the called alleles.
    pub include_gaps: bool,
    /// Call the top two nucleotides and retain a gap as a third allele.
    pub biallelic_with_gap: bool,
    /// Fuzzy locus window in bases; zero groups tags by exact start.
    pub fuzzy_locus_window: u32,
    /// Chromosomes to scan (inclusive); `None` scans all.
    pub chromosome_range: Option<RangeInclusive<i32>>,
    /// Pedigree F at or above which a taxon counts as inbred.
    pub inbred_threshold: f64,
    /// Whether the F test rejects sites or only flags them.
    pub filter_mode: FilterMode,
    /// Scan chromosomes on the rayon thread pool.
    pub parallel: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_minor_allele_freq: 0.01,
            min_minor_allele_count: 10,
            min_locus_coverage: 0.1,
            minimum_f: -2.0,
            average_sequencing_error_rate: 0.01,
            include_rare_alleles: false,
            include_gaps: false,
            biallelic_with_gap: false,
            fuzzy_locus_window: 0,
            chromosome_range: None,
            inbred_threshold: 0.8,
            filter_mode: FilterMode::Immediate,
            parallel: false,
        }
    }
}

impl DiscoveryConfig {
    /// Set the minor allele frequency threshold.
    pub fn with_min_minor_allele_freq(mut self, maf: f64) -> Self {
        self.min_minor_allele_freq = maf;
        self
    }

    /// Set the minor allele count threshold.
    pub fn with_min_minor_allele_count(mut self, mac: u32) -> Self {
        self.min_minor_allele_count = mac;
        self
    }

    /// Set the minimum locus coverage fraction.
    pub fn with_min_locus_coverage(mut self, coverage: f64) -> Self {
        self.min_locus_coverage = coverage;
        self
    }

    /// Set the minimum inbreeding coefficient.
    pub fn with_minimum_f(mut self, f: f64) -> Self {
        self.minimum_f = f;
        self
    }

    /// Set the fuzzy locus window.
    pub fn with_fuzzy_locus_window(mut self, window: u32) -> Self {
        self.fuzzy_locus_window = window;
        self
    }

    /// Restrict scanning to a chromosome range.
    pub fn with_chromosome_range(mut self, range: RangeInclusive<i32>) -> Self {
        self.chromosome_range = Some(range);
        self
    }

    /// Choose immediate or deferred F filtering.
    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    /// Enable chromosome-level parallelism.
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Check ranges and option conflicts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("min_minor_allele_freq", self.min_minor_allele_freq, 0.0, 1.0, "[0, 1]")?;
        check_range("min_locus_coverage", self.min_locus_coverage, 0.0, 1.0, "[0, 1]")?;
        check_range(
            "average_sequencing_error_rate",
            self.average_sequencing_error_rate,
            0.0,
            0.5,
            "[0, 0.5]",
        )?;
        check_range("inbred_threshold", self.inbred_threshold, -1.0, 1.0, "[-1, 1]")?;
        if self.minimum_f.is_nan() || self.minimum_f > 1.0 {
            return Err(ConfigError::OutOfRange {
                name: "minimum_f",
                value: self.minimum_f,
                range: "(-inf, 1]",
            });
        }
        if self.include_gaps && self.biallelic_with_gap {
            return Err(ConfigError::ConflictingGapModes);
        }
        if let Some(range) = &self.chromosome_range {
            if range.is_empty() {
                return Err(ConfigError::EmptyChromosomeRange {
                    start: *range.start(),
                    end: *range.end(),
                });
            }
        }
        Ok(())
    }

    /// Whether the inbreeding test is active.
    pub fn f_test_enabled(&self) -> bool {
        self.minimum_f > F_FLOOR
    }

    /// Allele-set policy selected by the rare-allele and gap flags.
    pub fn allele_policy(&self) -> AllelePolicy {
        if self.biallelic_with_gap {
            AllelePolicy::BiallelicWithGap
        } else if self.include_rare_alleles {
            AllelePolicy::All
        } else {
            AllelePolicy::MajorMinorOnly
        }
    }

    /// Locus grouping rule selected by the fuzzy window.
    pub fn locus_policy(&self) -> LocusPolicy {
        LocusPolicy::from_window(self.fuzzy_locus_window)
    }

    /// Taxa that must be covered for a locus to be called.
    pub fn min_taxa_with_locus(&self, total_taxa: usize) -> usize {
        (total_taxa as f64 * self.min_locus_coverage).round() as usize
    }

    /// Whether `chromosome` lies inside the configured range.
    pub fn includes_chromosome(&self, chromosome: i32) -> bool {
        self.chromosome_range
            .as_ref()
            .map_or(true, |range| range.contains(&chromosome))
    }
}

fn check_range(
    name: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    range: &'static str,
) -> Result<(), ConfigError> {
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, range })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.f_test_enabled());
        assert_eq!(config.allele_policy(), AllelePolicy::MajorMinorOnly);
        assert_eq!(config.locus_policy(), LocusPolicy::Exact);
    }

    #[test]
    fn gap_modes_conflict() {
        let config = DiscoveryConfig {
            include_gaps: true,
            biallelic_with_gap: true,
            ..DiscoveryConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ConflictingGapModes));
    }

    #[test]
    fn min_taxa_rounds() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.min_taxa_with_locus(100), 10);
        assert_eq!(config.min_taxa_with_locus(14), 1);
        assert_eq!(config.min_taxa_with_locus(15), 2);
    }

    #[test]
    fn out_of_range_is_reported() {
        let config = DiscoveryConfig::default().with_min_minor_allele_freq(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "min_minor_allele_freq", .. })
        ));
    }

    #[test]
    fn chromosome_range_filters() {
        let config = DiscoveryConfig::default().with_chromosome_range(2..=4);
        assert!(!config.includes_chromosome(1));
        assert!(config.includes_chromosome(4));
    }
}
