use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use bitvec::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

const TAXON_COLUMN: &str = "Taxon";
const F_COLUMN: &str = "F";

/// Errors raised while reading a pedigree file.
#[derive(Debug, Error)]
pub enum PedigreeError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The header lacks a required column.
    #[error("pedigree file is missing required column '{0}'")]
    MissingColumn(&'static str),
    /// A row could not be parsed.
    #[error("pedigree line {line}: {reason}")]
    Row {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

/// Per-taxon inbreeding coefficients used to pick the known-inbred subset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pedigree {
    inbreeding: HashMap<String, f64>,
}

impl Pedigree {
    /// Build from `(taxon, F)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            inbreeding: pairs.into_iter().map(|(t, f)| (t.into(), f)).collect(),
        }
    }

    /// Parse a tab-delimited pedigree with `Taxon` and `F` columns.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, PedigreeError> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(PedigreeError::MissingColumn(TAXON_COLUMN)),
        };
        let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
        let taxon_idx = columns
            .iter()
            .position(|c| *c == TAXON_COLUMN)
            .ok_or(PedigreeError::MissingColumn(TAXON_COLUMN))?;
        let f_idx = columns
            .iter()
            .position(|c| *c == F_COLUMN)
            .ok_or(PedigreeError::MissingColumn(F_COLUMN))?;

        let mut inbreeding = HashMap::new();
        for (idx, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let row_error = |reason: String| PedigreeError::Row {
                line: idx + 2,
                reason,
            };
            let taxon = fields
                .get(taxon_idx)
                .ok_or_else(|| row_error("missing taxon".into()))?;
            let f = fields
                .get(f_idx)
                .ok_or_else(|| row_error("missing F".into()))?
                .trim()
                .parse::<f64>()
                .map_err(|e| row_error(format!("bad F value: {e}")))?;
            inbreeding.insert(taxon.trim().to_string(), f);
        }

        Ok(Self { inbreeding })
    }

    /// Read a pedigree from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PedigreeError> {
        let path = path.as_ref();
        let pedigree = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!(path = %path.display(), taxa = pedigree.len(), "loaded pedigree");
        Ok(pedigree)
    }

    /// Number of taxa listed.
    pub fn len(&self) -> usize {
        self.inbreeding.len()
    }

    /// Returns `true` when no taxa are listed.
    pub fn is_empty(&self) -> bool {
        self.inbreeding.is_empty()
    }

    /// Inbreeding coefficient of a taxon.
    pub fn inbreeding(&self, taxon: &str) -> Option<f64> {
        self.inbreeding.get(taxon).copied()
    }

    /// Mask over `taxa` marking those with `F >= threshold`.
    ///
    /// Taxa absent from the pedigree are not considered inbred.
    pub fn inbred_mask(&self, taxa: &[String], threshold: f64) -> BitVec {
        let mask: BitVec = taxa
            .iter()
            .map(|taxon| self.inbreeding(taxon).is_some_and(|f| f >= threshold))
            .collect();
        if mask.not_any() {
            warn!(threshold, "no taxa in the pedigree reach the inbreeding threshold");
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn builds_inbred_mask() {
        let text = "Taxon\tParent1\tF\nB73\tx\t0.99\nMo17\tx\t0.95\nHyb\tx\t0.1\n";
        let pedigree = Pedigree::from_reader(Cursor::new(text)).unwrap();
        let taxa = vec!["B73".to_string(), "Hyb".to_string(), "Unknown".to_string(), "Mo17".to_string()];
        let mask = pedigree.inbred_mask(&taxa, 0.8);
        assert_eq!(mask, bitvec![1, 0, 0, 1]);
    }

    #[test]
    fn missing_f_column_is_fatal() {
        let text = "Taxon\tParent1\nB73\tx\n";
        let err = Pedigree::from_reader(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, PedigreeError::MissingColumn("F")));
    }
}
