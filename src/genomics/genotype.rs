use super::allele::{Allele, Genotype, NUM_ALLELES};

/// Decides a taxon's diploid genotype from its per-allele read depths.
pub trait GenotypePolicy: Send + Sync {
    /// Resolve a call restricted to `alleles` (site alleles, most common first).
    fn resolve(&self, depths: &[u16; NUM_ALLELES], alleles: &[Allele]) -> Genotype;
}

/// Binomial depth-ratio genotyper parameterised by the sequencing error rate.
///
/// Compares the likelihood of the observed major/minor depths under a
/// homozygote (minor reads are errors, probability `e`) and a heterozygote
/// (each read is either allele with probability 0.5). The higher the error
/// rate, the more minor-allele reads a heterozygous call needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRatioGenotyper {
    error_rate: f64,
}

impl DepthRatioGenotyper {
    /// Create a genotyper; the rate is clamped into `[1e-6, 0.5]`.
    pub fn new(error_rate: f64) -> Self {
        Self {
            error_rate: error_rate.clamp(1e-6, 0.5),
        }
    }

    /// Average per-base sequencing error rate in use.
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }
}

impl GenotypePolicy for DepthRatioGenotyper {
    fn resolve(&self, depths: &[u16; NUM_ALLELES], alleles: &[Allele]) -> Genotype {
        let mut major: Option<(Allele, u16)> = None;
        let mut minor: Option<(Allele, u16)> = None;
        for &allele in alleles {
            let depth = depths[allele.index()];
            if depth == 0 {
                continue;
            }
            match major {
                Some((_, best)) if depth <= best => {
                    if minor.map_or(true, |(_, second)| depth > second) {
                        minor = Some((allele, depth));
                    }
                }
                _ => {
                    minor = major;
                    major = Some((allele, depth));
                }
            }
        }

        let Some((major_allele, a)) = major else {
            return Genotype::Missing;
        };
        let Some((minor_allele, b)) = minor else {
            return Genotype::Homozygous(major_allele);
        };

        let (a, b) = (f64::from(a), f64::from(b));
        let e = self.error_rate;
        let homozygous = a * (1.0 - e).ln() + b * e.ln();
        let heterozygous = (a + b) * 0.5f64.ln();

        if heterozygous >= homozygous {
            Genotype::Heterozygous(major_allele, minor_allele)
        } else {
            Genotype::Homozygous(major_allele)
        }
    }
}
