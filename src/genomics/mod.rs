//! Genomics building blocks for tag-based SNP discovery.
//!
//! This module exposes the packed tag codec, the physical map, locus
//! aggregation, site calling and ranking, plus the small readers and writers
//! (counts, pedigree, reference, logs, VCF) the scan driver depends on.

mod allele;
mod audit;
mod genotype;
mod packed_sequence;
mod pedigree;
mod physical_map;
mod quality;
mod reference;
mod site_caller;
mod tag_counts;
mod tag_locus;
mod vcf;

pub use allele::{Allele, Genotype, MISSING_CODE, NUM_ALLELES};
pub use audit::{
    format_locus, format_site, AuditLogs, AuditSink, LocusRecord, LocusStatus, NullAudit,
    SiteRecord,
};
pub use genotype::{DepthRatioGenotyper, GenotypePolicy};
pub use packed_sequence::{
    PackedSequence, PackedSequenceError, PackedSequenceIter, BASES_PER_WORD, MAX_TAG_LENGTH,
};
pub use pedigree::{Pedigree, PedigreeError};
pub use physical_map::{
    MapEntry, MapError, PhysicalMap, PlacedTag, PositionIndex, Strand, TagPosition, VariantSlot,
    SIZE_HEADER,
};
pub use quality::{rank, select, QualityScoreRecord};
pub use reference::{ReferenceError, ReferenceGenome};
pub use site_caller::{
    AllelePolicy, FilterMode, SiteCall, SiteCaller, SiteEvaluation, SiteOutcome, SiteRejection,
    SiteStatistics, MAX_KEPT_ALLELES,
};
pub use tag_counts::{TagCountError, TagCountSource, TagCountTable};
pub use tag_locus::{AlleleDepthMatrix, LocusPolicy, LocusStats, TagLocus};
pub use vcf::{render_vcf, write_vcf, DiscoveredSite};
