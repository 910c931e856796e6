//! Chromosome scan driver.
//!
//! Walks the position-sorted physical map one chromosome at a time, closes a
//! locus whenever the next tag falls outside it, calls and ranks the locus
//! sites, and turns the written sites into variant-slot commits. Scanning
//! only reads the map; every commit is applied afterwards by a single writer
//! in chromosome order, so the parallel and sequential paths produce the same
//! map. The writer empties the slots of every tag on a scanned chromosome
//! before committing, so calls from an earlier run never survive.

use std::fmt;
use std::sync::mpsc::Sender;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DiscoveryConfig};
use crate::genomics::{
    rank, select, Allele, AuditSink, DiscoveredSite, GenotypePolicy, LocusRecord, LocusStatus,
    Pedigree, PhysicalMap, PositionIndex, QualityScoreRecord, ReferenceGenome, SiteCaller,
    SiteRecord, Strand, TagCountSource, TagLocus,
};
use crate::DiscoveryError;

/// Progress notifications emitted during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A chromosome scan began.
    ChromosomeStarted {
        /// Chromosome id.
        chromosome: i32,
        /// Tags placed on the chromosome.
        tags: usize,
    },
    /// A chromosome scan completed.
    ChromosomeFinished {
        /// Chromosome id.
        chromosome: i32,
        /// Loci closed on the chromosome.
        loci: usize,
        /// Sites kept on the chromosome.
        kept_sites: usize,
    },
    /// All chromosomes were scanned and commits applied.
    ScanFinished {
        /// Chromosomes scanned.
        chromosomes: usize,
        /// Variant slots written.
        commits: usize,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::ChromosomeStarted { chromosome, tags } => {
                write!(f, "chromosome {chromosome}: scanning {tags} tags")
            }
            ProgressEvent::ChromosomeFinished {
                chromosome,
                loci,
                kept_sites,
            } => write!(f, "chromosome {chromosome}: {loci} loci, {kept_sites} kept sites"),
            ProgressEvent::ScanFinished {
                chromosomes,
                commits,
            } => write!(f, "scanned {chromosomes} chromosomes, wrote {commits} variant slots"),
        }
    }
}

/// One pending variant-slot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantCommit {
    /// Map entry to update.
    pub entry: usize,
    /// Slot index, the site's write-back rank within its locus.
    pub slot: usize,
    /// Offset of the site within the tag.
    pub offset: u8,
    /// Forward-strand allele, `None` when the tag's allele was not retained.
    pub allele: Option<Allele>,
}

/// Totals and discovered sites of a completed scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    /// Chromosomes scanned.
    pub chromosomes: usize,
    /// Loci closed.
    pub loci: usize,
    /// Loci with called sites.
    pub accepted_loci: usize,
    /// Loci rejected as invariant.
    pub invariant_loci: usize,
    /// Loci rejected for low coverage.
    pub too_few_taxa_loci: usize,
    /// Sites evaluated by the caller.
    pub evaluated_sites: usize,
    /// Sites kept by the caller.
    pub kept_sites: usize,
    /// Kept sites that did not fit the variant slots.
    pub dropped_sites: usize,
    /// Variant slots written.
    pub commits: usize,
    /// Written sites in forward orientation, ordered by position.
    pub sites: Vec<DiscoveredSite>,
}

#[derive(Debug, Default)]
struct ChromosomeScan {
    loci: Vec<LocusRecord>,
    site_records: Vec<SiteRecord>,
    commits: Vec<VariantCommit>,
    discovered: Vec<DiscoveredSite>,
    kept_sites: usize,
    dropped_sites: usize,
}

/// Drives discovery over a physical map.
#[derive(Debug)]
pub struct ScanDriver<'a, C, G> {
    config: DiscoveryConfig,
    counts: &'a C,
    caller: SiteCaller<G>,
    reference: Option<&'a ReferenceGenome>,
    progress: Option<Sender<ProgressEvent>>,
}

impl<'a, C: TagCountSource, G: GenotypePolicy> ScanDriver<'a, C, G> {
    /// Validate `config` and build a driver over `counts`.
    pub fn new(config: DiscoveryConfig, counts: &'a C, genotyper: G) -> Result<Self, ConfigError> {
        config.validate()?;
        let caller = SiteCaller::new(&config, genotyper);
        Ok(Self {
            config,
            counts,
            caller,
            reference: None,
            progress: None,
        })
    }

    /// Restrict the inbreeding test to pedigree taxa at or above the threshold.
    pub fn with_pedigree(mut self, pedigree: &Pedigree) -> Self {
        let mask = pedigree.inbred_mask(self.counts.taxa(), self.config.inbred_threshold);
        self.caller = self.caller.with_inbred_mask(mask);
        self
    }

    /// Align a reference genome with every locus.
    pub fn with_reference(mut self, reference: &'a ReferenceGenome) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Send progress events on `sender`.
    pub fn with_progress(mut self, sender: Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Scan every selected chromosome, then rewrite the variant slots of its
    /// tags in `map`.
    pub fn scan(
        &self,
        map: &mut PhysicalMap,
        audit: &mut dyn AuditSink,
    ) -> Result<ScanSummary, DiscoveryError> {
        let index = map.sort_by_position();
        let chromosomes: Vec<i32> = map
            .chromosomes()
            .into_iter()
            .filter(|&c| self.config.includes_chromosome(c))
            .collect();
        info!(
            chromosomes = chromosomes.len(),
            tags = map.len(),
            taxa = self.counts.taxa_count(),
            parallel = self.config.parallel,
            "starting scan"
        );

        let scans: Vec<ChromosomeScan> = {
            let map: &PhysicalMap = map;
            if self.config.parallel {
                chromosomes
                    .par_iter()
                    .map(|&c| self.scan_chromosome(map, &index, c))
                    .collect()
            } else {
                chromosomes
                    .iter()
                    .map(|&c| self.scan_chromosome(map, &index, c))
                    .collect()
            }
        };

        let mut summary = ScanSummary {
            chromosomes: chromosomes.len(),
            ..ScanSummary::default()
        };
        for (&chromosome, scan) in chromosomes.iter().zip(scans) {
            for &entry in index.chromosome_block(chromosome) {
                map.clear_variants(entry)?;
            }
            for record in &scan.loci {
                audit.locus(record)?;
                summary.loci += 1;
                match record.status {
                    LocusStatus::Accepted => summary.accepted_loci += 1,
                    LocusStatus::Invariant => summary.invariant_loci += 1,
                    LocusStatus::TooFewTaxa => summary.too_few_taxa_loci += 1,
                }
            }
            for record in &scan.site_records {
                audit.site(record)?;
            }
            for commit in &scan.commits {
                map.set_variant(commit.entry, commit.slot, commit.offset, commit.allele)?;
            }
            summary.evaluated_sites += scan.site_records.len();
            summary.kept_sites += scan.kept_sites;
            summary.dropped_sites += scan.dropped_sites;
            summary.commits += scan.commits.len();
            summary.sites.extend(scan.discovered);
        }
        summary
            .sites
            .sort_by_key(|site| (site.chromosome, site.position));

        info!(
            loci = summary.loci,
            kept_sites = summary.kept_sites,
            dropped_sites = summary.dropped_sites,
            commits = summary.commits,
            "scan finished"
        );
        self.emit(ProgressEvent::ScanFinished {
            chromosomes: summary.chromosomes,
            commits: summary.commits,
        });
        Ok(summary)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }

    fn scan_chromosome(
        &self,
        map: &PhysicalMap,
        index: &PositionIndex,
        chromosome: i32,
    ) -> ChromosomeScan {
        let block = index.chromosome_block(chromosome);
        self.emit(ProgressEvent::ChromosomeStarted {
            chromosome,
            tags: block.len(),
        });

        let mut scan = ChromosomeScan::default();
        let policy = self.config.locus_policy();
        let taxa = self.counts.taxa_count();
        let mut unknown = 0usize;
        let mut open: Option<TagLocus<'_>> = None;

        for &entry in block {
            let Some(tag) = map.placed(entry) else {
                continue;
            };
            let counts = self.counts.counts(tag.sequence);
            if counts.is_none() {
                unknown += 1;
            }
            match &mut open {
                Some(locus) if locus.accepts(&tag) => locus.add_tag(tag, counts),
                slot => {
                    if let Some(done) = slot.replace(TagLocus::open(policy, taxa, tag, counts)) {
                        self.close_locus(map, done, &mut scan);
                    }
                }
            }
        }
        if let Some(done) = open.take() {
            self.close_locus(map, done, &mut scan);
        }

        if unknown > 0 {
            warn!(chromosome, unknown, "tags missing from the count table contribute no reads");
        }
        info!(
            chromosome,
            loci = scan.loci.len(),
            kept_sites = scan.kept_sites,
            commits = scan.commits.len(),
            "chromosome scanned"
        );
        self.emit(ProgressEvent::ChromosomeFinished {
            chromosome,
            loci: scan.loci.len(),
            kept_sites: scan.kept_sites,
        });
        scan
    }

    fn close_locus(&self, map: &PhysicalMap, mut locus: TagLocus<'_>, scan: &mut ChromosomeScan) {
        let chromosome = locus.chromosome();
        let strand = locus.strand();
        let reference_tag_present = self
            .reference
            .is_some_and(|genome| locus.add_reference(genome));
        let stats = locus.stats();
        let min_taxa = self.config.min_taxa_with_locus(self.counts.taxa_count());
        let mut record = LocusRecord {
            chromosome,
            stats,
            min_taxa_required: min_taxa,
            status: LocusStatus::Invariant,
            variable_site_positions: Vec::new(),
            kept_site_positions: Vec::new(),
            reference_tag_present,
        };

        if locus.len() < 2 {
            scan.loci.push(record);
            return;
        }
        if record.stats.taxa_covered < min_taxa {
            debug!(
                chromosome,
                start = record.stats.start,
                covered = record.stats.taxa_covered,
                min_taxa,
                "too few taxa"
            );
            record.status = LocusStatus::TooFewTaxa;
            scan.loci.push(record);
            return;
        }

        let matrix = locus.build_depth_matrix();
        record.variable_site_positions = matrix
            .positions()
            .iter()
            .map(|&d| locus.genomic_position(d))
            .collect();
        if matrix.site_count() == 0 {
            scan.loci.push(record);
            return;
        }
        record.status = LocusStatus::Accepted;

        let evaluations = self.caller.call_locus(&matrix);
        for evaluation in &evaluations {
            scan.site_records.push(SiteRecord {
                chromosome,
                position: locus.genomic_position(evaluation.position_in_locus),
                statistics: evaluation.statistics.clone(),
                status: evaluation.status(),
                pass: evaluation.passes(),
            });
        }

        let candidates: Vec<QualityScoreRecord> = evaluations
            .iter()
            .filter_map(|e| {
                QualityScoreRecord::from_evaluation(e, locus.genomic_position(e.position_in_locus))
            })
            .collect();
        record.kept_site_positions = candidates.iter().map(|r| r.genomic_position).collect();
        scan.kept_sites += candidates.len();

        let (written, dropped) = select(rank(candidates), map.max_variants());
        if !dropped.is_empty() {
            warn!(
                chromosome,
                start = record.stats.start,
                dropped = dropped.len(),
                capacity = map.max_variants(),
                "kept sites exceed variant slots; lowest-ranked sites not written"
            );
            scan.dropped_sites += dropped.len();
        }

        for (slot, ranked) in written.iter().enumerate() {
            let evaluation = &evaluations[ranked.site_index];
            let Some(call) = evaluation.call() else {
                continue;
            };
            for (entry, offset, allele) in locus.calls_at(call.position_in_locus) {
                scan.commits.push(VariantCommit {
                    entry,
                    slot,
                    offset,
                    allele: call.retains(allele).then(|| forward(allele, strand)),
                });
            }
            scan.discovered.push(DiscoveredSite {
                chromosome,
                position: ranked.genomic_position,
                reference: matrix
                    .reference_allele(ranked.site_index)
                    .map(|a| forward(a, strand)),
                alleles: call.kept_alleles.iter().map(|&a| forward(a, strand)).collect(),
                genotypes: call
                    .genotypes
                    .iter()
                    .map(|&g| match strand {
                        Strand::Forward => g,
                        Strand::Reverse => g.complement(),
                    })
                    .collect(),
                pass: evaluation.passes(),
            });
        }

        debug!(
            chromosome,
            start = record.stats.start,
            tags = record.stats.tag_count,
            variable = record.variable_site_positions.len(),
            kept = record.kept_site_positions.len(),
            "locus accepted"
        );
        scan.loci.push(record);
    }
}

fn forward(allele: Allele, strand: Strand) -> Allele {
    match strand {
        Strand::Forward => allele,
        Strand::Reverse => allele.complement(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{
        AuditLogs, DepthRatioGenotyper, MapEntry, NullAudit, PackedSequence, TagCountTable,
        VariantSlot,
    };
    use std::sync::mpsc;

    fn tag(s: &str) -> PackedSequence {
        PackedSequence::encode(s.as_bytes(), 1).unwrap()
    }

    fn fixture() -> (PhysicalMap, TagCountTable) {
        let mut map = PhysicalMap::new(1, 4);
        let mut counts = TagCountTable::new(vec!["t0".into(), "t1".into()]);
        for (seq, chrom, start, reads) in [
            ("AACGT", 2, 500, [6u32, 0]),
            ("AATGT", 2, 500, [0, 6]),
            ("CACGT", 1, 1000, [0, 0]),
            ("GACGT", 1, 1000, [5, 0]),
            ("GATGT", 1, 1000, [0, 7]),
        ] {
            let sequence = tag(seq);
            map.push(MapEntry::placed(sequence.clone(), chrom, Strand::Forward, start, 4))
                .unwrap();
            if reads.iter().any(|&n| n > 0) {
                counts.insert(sequence, &reads).unwrap();
            }
        }
        (map, counts)
    }

    fn driver(counts: &TagCountTable) -> ScanDriver<'_, TagCountTable, DepthRatioGenotyper> {
        ScanDriver::new(DiscoveryConfig::default(), counts, DepthRatioGenotyper::new(0.01)).unwrap()
    }

    #[test]
    fn commits_forward_alleles_into_slots() {
        let (mut map, counts) = fixture();
        let summary = driver(&counts).scan(&mut map, &mut NullAudit).unwrap();
        assert_eq!(summary.chromosomes, 2);
        assert_eq!(summary.accepted_loci, 2);
        assert_eq!(summary.kept_sites, 2);

        let slot = map.entry(1).unwrap().variants()[0].unwrap();
        assert_eq!((slot.offset, slot.allele), (2, Some(Allele::T)));
        let chr1: Vec<i32> = summary.sites.iter().map(|s| s.chromosome).collect();
        assert_eq!(chr1, vec![1, 2]);
        assert_eq!(summary.sites[1].position, 502);
    }

    #[test]
    fn chromosome_range_limits_the_scan() {
        let (mut map, counts) = fixture();
        let config = DiscoveryConfig::default().with_chromosome_range(2..=2);
        let driver = ScanDriver::new(config, &counts, DepthRatioGenotyper::new(0.01)).unwrap();
        let summary = driver.scan(&mut map, &mut NullAudit).unwrap();
        assert_eq!(summary.chromosomes, 1);
        assert!(map.entry(3).unwrap().variants().iter().all(Option::is_none));
    }

    #[test]
    fn parallel_scan_matches_sequential() {
        let (mut sequential, counts) = fixture();
        let (mut parallel, _) = fixture();
        let a = driver(&counts).scan(&mut sequential, &mut NullAudit).unwrap();
        let config = DiscoveryConfig::default().with_parallel(true);
        let b = ScanDriver::new(config, &counts, DepthRatioGenotyper::new(0.01))
            .unwrap()
            .scan(&mut parallel, &mut NullAudit)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(sequential.entries(), parallel.entries());
    }

    #[test]
    fn progress_events_bracket_each_chromosome() {
        let (mut map, counts) = fixture();
        let (tx, rx) = mpsc::channel();
        driver(&counts)
            .with_progress(tx)
            .scan(&mut map, &mut NullAudit)
            .unwrap();
        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], ProgressEvent::ChromosomeStarted { chromosome: 1, tags: 3 });
        assert!(matches!(events[4], ProgressEvent::ScanFinished { chromosomes: 2, .. }));
    }

    #[test]
    fn progress_events_render_as_log_lines() {
        let started = ProgressEvent::ChromosomeStarted { chromosome: 3, tags: 12 };
        assert_eq!(started.to_string(), "chromosome 3: scanning 12 tags");
        let finished = ProgressEvent::ScanFinished { chromosomes: 2, commits: 7 };
        assert_eq!(finished.to_string(), "scanned 2 chromosomes, wrote 7 variant slots");
    }

    #[test]
    fn rescan_replaces_previous_slots() {
        let (mut map, counts) = fixture();
        map.set_variant(0, 3, 4, Some(Allele::G)).unwrap();
        map.set_variant(2, 0, 1, Some(Allele::A)).unwrap();
        let first = driver(&counts).scan(&mut map, &mut NullAudit).unwrap();
        assert_eq!(map.entry(0).unwrap().used_variant_slots(), 1);
        assert_eq!(
            map.entry(2).unwrap().variants(),
            &[Some(VariantSlot { offset: 2, allele: Some(Allele::C) }), None, None, None]
        );

        let snapshot = map.clone();
        let second = driver(&counts).scan(&mut map, &mut NullAudit).unwrap();
        assert_eq!(first, second);
        assert_eq!(map, snapshot);
    }

    #[test]
    fn audit_logs_receive_every_locus() {
        let (mut map, counts) = fixture();
        let mut logs = AuditLogs::new(Vec::new(), Vec::new()).unwrap();
        driver(&counts).scan(&mut map, &mut logs).unwrap();
        let (locus, site) = logs.finish().unwrap();
        assert_eq!(String::from_utf8(locus).unwrap().lines().count(), 3);
        assert_eq!(String::from_utf8(site).unwrap().lines().count(), 3);
    }
}
