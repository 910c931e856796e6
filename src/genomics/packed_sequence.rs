use std::fmt;

use thiserror::Error;

/// Number of bases encoded per `u64` word.
pub const BASES_PER_WORD: usize = 32;
/// Bits used to encode a single DNA base (A/C/G/T).
const BITS_PER_BASE: usize = 2;
/// Longest tag representable; 255 is kept free as the missing-offset sentinel.
pub const MAX_TAG_LENGTH: usize = 254;
/// Mask selecting the low bit of every 2-bit base group.
const LOW_BITS: u64 = 0x5555_5555_5555_5555;

/// Errors that can occur while packing a nucleotide sequence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackedSequenceError {
    /// Encountered a character outside `{A, C, G, T, N}`.
    #[error("invalid base '{0}' at position {1}")]
    InvalidBase(char, usize),
    /// The sequence does not fit in the requested number of words.
    #[error("sequence of {len} bases exceeds capacity of {capacity} bases")]
    TooLong {
        /// Length of the offending sequence.
        len: usize,
        /// Bases available in the packed representation.
        capacity: usize,
    },
}

/// Tag sequence packed at two bits per base into fixed-width words.
///
/// The first base occupies the most significant bits of the first word, so
/// comparing the word vectors orders sequences lexicographically. Bases past
/// `len` are filled with `A`; `N` has no representation of its own and is
/// stored as the filler as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedSequence {
    words: Vec<u64>,
    len: u8,
}

impl PackedSequence {
    /// Pack an ASCII sequence into `words` words.
    pub fn encode(sequence: &[u8], words: usize) -> Result<Self, PackedSequenceError> {
        let capacity = (words * BASES_PER_WORD).min(MAX_TAG_LENGTH);
        if sequence.len() > capacity {
            return Err(PackedSequenceError::TooLong {
                len: sequence.len(),
                capacity,
            });
        }

        let mut data = vec![0u64; words];
        for (idx, &base) in sequence.iter().enumerate() {
            let code = encode_base(base)
                .ok_or(PackedSequenceError::InvalidBase(base as char, idx))?;
            let (word_idx, shift) = word_position(idx);
            data[word_idx] |= u64::from(code) << shift;
        }

        Ok(Self {
            words: data,
            len: sequence.len() as u8,
        })
    }

    /// Rebuild a sequence from packed words read off disk.
    pub fn from_words(words: Vec<u64>, len: u8) -> Result<Self, PackedSequenceError> {
        let capacity = (words.len() * BASES_PER_WORD).min(MAX_TAG_LENGTH);
        if usize::from(len) > capacity {
            return Err(PackedSequenceError::TooLong {
                len: usize::from(len),
                capacity,
            });
        }
        Ok(Self { words, len })
    }

    /// Number of meaningful bases.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Returns `true` when the sequence has no bases.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Access the packed words.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Total bases the words can hold, including padding.
    pub fn capacity(&self) -> usize {
        self.words.len() * BASES_PER_WORD
    }

    /// Base at `idx` as an uppercase ASCII byte.
    pub fn base_at(&self, idx: usize) -> Option<u8> {
        if idx >= self.len() {
            return None;
        }
        let (word_idx, shift) = word_position(idx);
        Some(decode_base((self.words[word_idx] >> shift) as u8))
    }

    /// Decode into uppercase ASCII, dropping the padding.
    pub fn decode(&self) -> String {
        self.iter().map(char::from).collect()
    }

    /// Iterate over decoded bases.
    pub fn iter(&self) -> PackedSequenceIter<'_> {
        PackedSequenceIter {
            seq: self,
            index: 0,
        }
    }

    /// Count mismatched bases among the first `compare_len` positions.
    ///
    /// Works directly on the packed words and stops as soon as
    /// `max_to_report` mismatches have been seen, returning `max_to_report`.
    pub fn divergence(&self, other: &Self, compare_len: u16, max_to_report: u16) -> u16 {
        let limit = usize::from(compare_len)
            .min(self.capacity())
            .min(other.capacity());
        let mut mismatches = 0u32;

        for (word_idx, (&a, &b)) in self.words.iter().zip(&other.words).enumerate() {
            let first_base = word_idx * BASES_PER_WORD;
            if first_base >= limit {
                break;
            }
            let bases = (limit - first_base).min(BASES_PER_WORD);
            let diff = a ^ b;
            let folded = (diff | (diff >> 1)) & LOW_BITS & leading_bases_mask(bases);
            mismatches += folded.count_ones();
            if mismatches >= u32::from(max_to_report) {
                return max_to_report;
            }
        }

        mismatches as u16
    }
}

impl fmt::Display for PackedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.decode())
    }
}

/// Iterator over decoded bases of a [`PackedSequence`].
#[derive(Debug)]
pub struct PackedSequenceIter<'a> {
    seq: &'a PackedSequence,
    index: usize,
}

impl Iterator for PackedSequenceIter<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.seq.base_at(self.index)?;
        self.index += 1;
        Some(base)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.seq.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PackedSequenceIter<'_> {}

fn encode_base(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' | b'N' | b'n' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

fn decode_base(code: u8) -> u8 {
    match code & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b10 => b'G',
        _ => b'T',
    }
}

fn word_position(idx: usize) -> (usize, usize) {
    let word_idx = idx / BASES_PER_WORD;
    let offset = idx % BASES_PER_WORD;
    let shift = 64 - BITS_PER_BASE * (offset + 1);
    (word_idx, shift)
}

/// Mask covering the first `bases` bases (most significant bits) of a word.
fn leading_bases_mask(bases: usize) -> u64 {
    match bases {
        0 => 0,
        b if b >= BASES_PER_WORD => u64::MAX,
        b => u64::MAX << (64 - BITS_PER_BASE * b),
    }
}
