use std::fmt;

/// Number of distinct alleles tracked per site (A, C, G, T, gap).
pub const NUM_ALLELES: usize = 5;

/// Byte used on disk and in genotype codes for an absent allele.
pub const MISSING_CODE: u8 = 0xFF;

/// A nucleotide allele observed in an aligned tag column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Allele {
    /// Adenine.
    A,
    /// Cytosine.
    C,
    /// Guanine.
    G,
    /// Thymine.
    T,
    /// Tag ended before this column (shorter than its locus siblings).
    Gap,
}

impl Allele {
    /// All alleles in index order.
    pub const ALL: [Allele; NUM_ALLELES] = [Allele::A, Allele::C, Allele::G, Allele::T, Allele::Gap];

    /// Dense index used by depth matrices (`0..NUM_ALLELES`).
    pub fn index(self) -> usize {
        match self {
            Allele::A => 0,
            Allele::C => 1,
            Allele::G => 2,
            Allele::T => 3,
            Allele::Gap => 4,
        }
    }

    /// Inverse of [`Allele::index`].
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// On-disk byte code. Code 4 is reserved for insertions.
    pub fn code(self) -> u8 {
        match self {
            Allele::A => 0,
            Allele::C => 1,
            Allele::G => 2,
            Allele::T => 3,
            Allele::Gap => 5,
        }
    }

    /// Parse an on-disk byte code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Allele::A),
            1 => Some(Allele::C),
            2 => Some(Allele::G),
            3 => Some(Allele::T),
            5 => Some(Allele::Gap),
            _ => None,
        }
    }

    /// Parse a human-readable allele character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' | 'a' => Some(Allele::A),
            'C' | 'c' => Some(Allele::C),
            'G' | 'g' => Some(Allele::G),
            'T' | 't' => Some(Allele::T),
            '-' => Some(Allele::Gap),
            _ => None,
        }
    }

    /// Human-readable allele character.
    pub fn as_char(self) -> char {
        match self {
            Allele::A => 'A',
            Allele::C => 'C',
            Allele::G => 'G',
            Allele::T => 'T',
            Allele::Gap => '-',
        }
    }

    /// Watson-Crick complement; a gap stays a gap.
    pub fn complement(self) -> Self {
        match self {
            Allele::A => Allele::T,
            Allele::C => Allele::G,
            Allele::G => Allele::C,
            Allele::T => Allele::A,
            Allele::Gap => Allele::Gap,
        }
    }

    /// Encode an optional allele, using [`MISSING_CODE`] for `None`.
    pub fn code_or_missing(allele: Option<Self>) -> u8 {
        allele.map(Allele::code).unwrap_or(MISSING_CODE)
    }
}

impl fmt::Display for Allele {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Diploid genotype call for one taxon at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Genotype {
    /// No informative reads.
    #[default]
    Missing,
    /// Both copies carry the same allele.
    Homozygous(Allele),
    /// Two different alleles, the more deeply covered one first.
    Heterozygous(Allele, Allele),
}

impl Genotype {
    /// Packed byte form: `(first << 4) | second`, `0xFF` when missing.
    pub fn code(self) -> u8 {
        match self {
            Genotype::Missing => MISSING_CODE,
            Genotype::Homozygous(a) => (a.code() << 4) | a.code(),
            Genotype::Heterozygous(a, b) => (a.code() << 4) | b.code(),
        }
    }

    /// Returns `true` unless the call is missing.
    pub fn is_called(self) -> bool {
        !matches!(self, Genotype::Missing)
    }

    /// Returns `true` for heterozygous calls.
    pub fn is_heterozygous(self) -> bool {
        matches!(self, Genotype::Heterozygous(..))
    }

    /// Number of copies of `allele` carried (0, 1 or 2).
    pub fn copies_of(self, allele: Allele) -> u32 {
        match self {
            Genotype::Missing => 0,
            Genotype::Homozygous(a) => 2 * u32::from(a == allele),
            Genotype::Heterozygous(a, b) => u32::from(a == allele) + u32::from(b == allele),
        }
    }

    /// Return the call with every allele complemented.
    pub fn complement(self) -> Self {
        match self {
            Genotype::Missing => Genotype::Missing,
            Genotype::Homozygous(a) => Genotype::Homozygous(a.complement()),
            Genotype::Heterozygous(a, b) => Genotype::Heterozygous(a.complement(), b.complement()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for allele in Allele::ALL {
            assert_eq!(Allele::from_code(allele.code()), Some(allele));
            assert_eq!(Allele::from_index(allele.index()), Some(allele));
            assert_eq!(Allele::from_char(allele.as_char()), Some(allele));
        }
        assert_eq!(Allele::from_code(4), None);
        assert_eq!(Allele::from_code(MISSING_CODE), None);
    }

    #[test]
    fn genotype_codes() {
        assert_eq!(Genotype::Missing.code(), 0xFF);
        assert_eq!(Genotype::Homozygous(Allele::C).code(), 0x11);
        assert_eq!(Genotype::Heterozygous(Allele::A, Allele::T).code(), 0x03);
        assert_eq!(Genotype::Heterozygous(Allele::G, Allele::A).copies_of(Allele::A), 1);
        assert_eq!(Genotype::Homozygous(Allele::G).copies_of(Allele::G), 2);
    }

    #[test]
    fn complement_is_involution() {
        for allele in Allele::ALL {
            assert_eq!(allele.complement().complement(), allele);
        }
        assert_eq!(Allele::Gap.complement(), Allele::Gap);
    }
}
