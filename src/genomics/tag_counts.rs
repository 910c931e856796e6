//! Taxa-by-tag read counts.
//!
//! Production runs keep these in an external columnar store; the scan only
//! needs per-taxon counts for a tag, expressed by [`TagCountSource`]. The
//! in-memory [`TagCountTable`] reads a tab-delimited export.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::info;

use super::packed_sequence::{PackedSequence, PackedSequenceError};

/// Errors raised while reading a tag count table.
#[derive(Debug, Error)]
pub enum TagCountError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Missing or malformed header line.
    #[error("invalid tag count header: {0}")]
    Header(String),
    /// A data row could not be parsed.
    #[error("line {line}: {reason}")]
    Row {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
    /// A row has a different number of counts than there are taxa.
    #[error("tag has {got} counts but the table has {expected} taxa")]
    WrongWidth {
        /// Number of taxa.
        expected: usize,
        /// Counts supplied.
        got: usize,
    },
    /// The same tag appears twice.
    #[error("duplicate tag {0}")]
    DuplicateTag(String),
    /// A tag sequence could not be packed.
    #[error(transparent)]
    Sequence(#[from] PackedSequenceError),
}

/// Source of per-taxon read counts for tags.
pub trait TagCountSource: Sync {
    /// Taxon names, in count column order.
    fn taxa(&self) -> &[String];

    /// Per-taxon counts for a tag, `None` if the tag was never observed.
    fn counts(&self, sequence: &PackedSequence) -> Option<&[u16]>;

    /// Number of taxa.
    fn taxa_count(&self) -> usize {
        self.taxa().len()
    }
}

/// Dense in-memory taxa-by-tag count table.
#[derive(Debug, Clone, Default)]
pub struct TagCountTable {
    taxa: Vec<String>,
    rows: HashMap<PackedSequence, usize>,
    counts: Vec<u16>,
}

impl TagCountTable {
    /// Empty table over the given taxa.
    pub fn new(taxa: Vec<String>) -> Self {
        Self {
            taxa,
            rows: HashMap::new(),
            counts: Vec::new(),
        }
    }

    /// Number of tags in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when no tags are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a tag's counts; values above `u16::MAX` saturate.
    pub fn insert(&mut self, sequence: PackedSequence, counts: &[u32]) -> Result<(), TagCountError> {
        if counts.len() != self.taxa.len() {
            return Err(TagCountError::WrongWidth {
                expected: self.taxa.len(),
                got: counts.len(),
            });
        }
        if self.rows.contains_key(&sequence) {
            return Err(TagCountError::DuplicateTag(sequence.to_string()));
        }
        let row = self.rows.len();
        self.counts
            .extend(counts.iter().map(|&c| u16::try_from(c).unwrap_or(u16::MAX)));
        self.rows.insert(sequence, row);
        Ok(())
    }

    /// Parse `Tag\t<taxon>...` followed by `SEQUENCE\t<count>...` rows.
    pub fn from_reader<R: BufRead>(reader: R, words_per_tag: usize) -> Result<Self, TagCountError> {
        let mut lines = reader.lines();
        let header = lines
            .next()
            .ok_or_else(|| TagCountError::Header("empty file".into()))??;
        let mut columns = header.split('\t');
        match columns.next() {
            Some(first) if first.eq_ignore_ascii_case("tag") => {}
            other => {
                return Err(TagCountError::Header(format!(
                    "first column must be 'Tag', found {other:?}"
                )))
            }
        }
        let mut table = Self::new(columns.map(str::to_string).collect());

        for (idx, line) in lines.enumerate() {
            let line = line?;
            let line_no = idx + 2;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let sequence = fields.next().unwrap_or_default();
            let packed = PackedSequence::encode(sequence.as_bytes(), words_per_tag).map_err(|e| {
                TagCountError::Row {
                    line: line_no,
                    reason: e.to_string(),
                }
            })?;
            let counts = fields
                .map(|field| field.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| TagCountError::Row {
                    line: line_no,
                    reason: format!("bad count: {e}"),
                })?;
            table.insert(packed, &counts)?;
        }

        Ok(table)
    }

    /// Read a table from `path`.
    pub fn load<P: AsRef<Path>>(path: P, words_per_tag: usize) -> Result<Self, TagCountError> {
        let path = path.as_ref();
        let table = Self::from_reader(BufReader::new(File::open(path)?), words_per_tag)?;
        info!(
            path = %path.display(),
            tags = table.len(),
            taxa = table.taxa.len(),
            "loaded tag counts"
        );
        Ok(table)
    }
}

impl TagCountSource for TagCountTable {
    fn taxa(&self) -> &[String] {
        &self.taxa
    }

    fn counts(&self, sequence: &PackedSequence) -> Option<&[u16]> {
        let row = *self.rows.get(sequence)?;
        let width = self.taxa.len();
        Some(&self.counts[row * width..(row + 1) * width])
    }
}
