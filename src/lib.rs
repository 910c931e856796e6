//! # Tag-based SNP discovery
//!
//! This library calls single-nucleotide polymorphisms from short sequence
//! tags that an external aligner has already placed on a reference genome.
//!
//! ## Core Pipeline
//!
//! 1. **Packed tags**: sequences stored as 2-bit codes, 32 bases per `u64`
//! 2. **Physical map**: tag placement plus fixed variant slots, sorted by position
//! 3. **Loci**: tags sharing (or nearly sharing) a start, aligned by offset
//! 4. **Site calling**: frequency, gap and inbreeding filters, then genotypes
//! 5. **Ranking**: best-supported sites claim the limited variant slots
//!
//! ## Usage Example
//!
//! ```ignore
//! use tagsnp::{DiscoveryConfig, ScanDriver};
//! use tagsnp::genomics::{DepthRatioGenotyper, NullAudit, PhysicalMap, TagCountTable};
//!
//! let mut map = PhysicalMap::load("tags.topm")?;
//! let counts = TagCountTable::load("counts.txt", map.words_per_tag())?;
//! let driver = ScanDriver::new(DiscoveryConfig::default(), &counts, DepthRatioGenotyper::new(0.01))?;
//! let summary = driver.scan(&mut map, &mut NullAudit)?;
//! map.write_binary_file("tags.called.topm")?;
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod config; // Run configuration and validation
pub mod discovery; // Chromosome scan driver
pub mod genomics; // Tag codec, map, loci, site calling

pub use config::{ConfigError, DiscoveryConfig};
pub use discovery::{ProgressEvent, ScanDriver, ScanSummary, VariantCommit};

use std::io;

use thiserror::Error;

use genomics::{MapError, PackedSequenceError, PedigreeError, ReferenceError, TagCountError};

/// Errors that abort a discovery run.
///
/// Statistical rejections of loci and sites are not errors; they are
/// reported through the audit logs.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Physical map could not be read, written or updated.
    #[error("physical map: {0}")]
    Map(#[from] MapError),

    /// Tag count table is malformed.
    #[error("tag counts: {0}")]
    TagCounts(#[from] TagCountError),

    /// Pedigree file is malformed.
    #[error("pedigree: {0}")]
    Pedigree(#[from] PedigreeError),

    /// Reference genome is malformed.
    #[error("reference genome: {0}")]
    Reference(#[from] ReferenceError),

    /// Configuration is invalid.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// A tag sequence could not be packed.
    #[error("tag sequence: {0}")]
    Sequence(#[from] PackedSequenceError),

    /// Writing an audit log failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
