use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::info;

use super::allele::Allele;
use super::physical_map::Strand;

/// Errors raised while reading a reference genome.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A FASTA header does not name a numeric chromosome.
    #[error("cannot parse chromosome id from FASTA header '{0}'")]
    ChromosomeName(String),
    /// Sequence data before the first header.
    #[error("sequence data before the first FASTA header")]
    MissingHeader,
}

/// Chromosome sequences keyed by numeric chromosome id (1-based coordinates).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceGenome {
    chromosomes: HashMap<i32, Vec<u8>>,
}

impl ReferenceGenome {
    /// Empty genome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a chromosome sequence.
    pub fn insert(&mut self, chromosome: i32, sequence: impl Into<Vec<u8>>) {
        let mut sequence = sequence.into();
        sequence.make_ascii_uppercase();
        self.chromosomes.insert(chromosome, sequence);
    }

    /// Parse FASTA whose headers read `>N` or `>chrN`.
    pub fn from_fasta<R: BufRead>(reader: R) -> Result<Self, ReferenceError> {
        let mut genome = Self::new();
        let mut current: Option<(i32, Vec<u8>)> = None;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if let Some(header) = line.strip_prefix('>') {
                if let Some((chromosome, sequence)) = current.take() {
                    genome.insert(chromosome, sequence);
                }
                current = Some((parse_chromosome(header)?, Vec::new()));
            } else if !line.is_empty() {
                let (_, sequence) = current.as_mut().ok_or(ReferenceError::MissingHeader)?;
                sequence.extend_from_slice(line.as_bytes());
            }
        }
        if let Some((chromosome, sequence)) = current {
            genome.insert(chromosome, sequence);
        }
        Ok(genome)
    }

    /// Read a FASTA file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let genome = Self::from_fasta(BufReader::new(File::open(path)?))?;
        info!(path = %path.display(), chromosomes = genome.chromosomes.len(), "loaded reference genome");
        Ok(genome)
    }

    /// Forward-strand base at a 1-based coordinate.
    pub fn base(&self, chromosome: i32, position: i32) -> Option<Allele> {
        let sequence = self.chromosomes.get(&chromosome)?;
        let idx = usize::try_from(position.checked_sub(1)?).ok()?;
        sequence
            .get(idx)
            .and_then(|&b| Allele::from_char(char::from(b)))
    }

    /// Base in `strand` orientation: complemented on the minus strand.
    pub fn oriented_base(&self, chromosome: i32, position: i32, strand: Strand) -> Option<Allele> {
        let base = self.base(chromosome, position)?;
        Some(match strand {
            Strand::Forward => base,
            Strand::Reverse => base.complement(),
        })
    }

    /// Returns `true` if the chromosome is present.
    pub fn contains(&self, chromosome: i32) -> bool {
        self.chromosomes.contains_key(&chromosome)
    }
}

fn parse_chromosome(header: &str) -> Result<i32, ReferenceError> {
    let name = header.split_whitespace().next().unwrap_or_default();
    let digits = name
        .strip_prefix("chr")
        .or_else(|| name.strip_prefix("Chr"))
        .unwrap_or(name);
    digits
        .parse()
        .map_err(|_| ReferenceError::ChromosomeName(header.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_fasta_and_orients_bases() {
        let fasta = ">chr1 assembled\nACGT\nacca\n>2\nTT\n";
        let genome = ReferenceGenome::from_fasta(Cursor::new(fasta)).unwrap();
        assert_eq!(genome.base(1, 1), Some(Allele::A));
        assert_eq!(genome.base(1, 5), Some(Allele::A));
        assert_eq!(genome.base(1, 9), None);
        assert_eq!(genome.base(1, 0), None);
        assert_eq!(genome.oriented_base(1, 2, Strand::Reverse), Some(Allele::G));
        assert!(genome.contains(2));
    }

    #[test]
    fn rejects_non_numeric_names() {
        let err = ReferenceGenome::from_fasta(Cursor::new(">chrX\nAC\n")).unwrap_err();
        assert!(matches!(err, ReferenceError::ChromosomeName(_)));
    }
}
