//! Tab-delimited audit logs: one row per locus and one per evaluated site.

use std::fmt;
use std::io::{self, Write};

use super::allele::Allele;
use super::site_caller::SiteStatistics;
use super::tag_locus::LocusStats;

const LOCUS_HEADER: &str = "chromosome\tstart\tend\tstrand\ttotalBasePairs\ttagCount\treadCount\t\
taxaCovered\tminTaxaRequired\tstatus\tvariableSiteCount\tvariableSitePositions\tkeptSiteCount\t\
keptSitePositions\treferenceTagPresent\tmaxTagLength\tminTagLength\n";

const SITE_HEADER: &str = "chromosome\tposition\talleles\ttaxaCovered\tinbredTaxaCovered\t\
inbredCoverage\tpropHets\tinbredHetScore\tobservedF\tmaf\tminorCount\tstatus\tpass\n";

/// Disposition of a closed locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocusStatus {
    /// Fewer than two tags, or no variable columns.
    Invariant,
    /// Not enough taxa carry reads.
    TooFewTaxa,
    /// Sites were called.
    Accepted,
}

impl LocusStatus {
    /// Label used in the locus log.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocusStatus::Invariant => "invariant",
            LocusStatus::TooFewTaxa => "tooFewTaxa",
            LocusStatus::Accepted => "accepted",
        }
    }
}

impl fmt::Display for LocusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One locus-log row.
#[derive(Debug, Clone, PartialEq)]
pub struct LocusRecord {
    /// Chromosome of the locus.
    pub chromosome: i32,
    /// Span and count figures.
    pub stats: LocusStats,
    /// Covered taxa needed to call sites.
    pub min_taxa_required: usize,
    /// Disposition.
    pub status: LocusStatus,
    /// Genomic coordinates of variable columns.
    pub variable_site_positions: Vec<i32>,
    /// Genomic coordinates of every kept site, written or not.
    pub kept_site_positions: Vec<i32>,
    /// Whether a reference window was aligned with the locus.
    pub reference_tag_present: bool,
}

/// One site-log row.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    /// Chromosome of the site.
    pub chromosome: i32,
    /// Genomic coordinate.
    pub position: i32,
    /// Evaluation figures.
    pub statistics: SiteStatistics,
    /// `kept` or the rejection label.
    pub status: &'static str,
    /// Final pass flag.
    pub pass: bool,
}

/// Destination for audit rows emitted by a scan.
pub trait AuditSink {
    /// Record a closed locus.
    fn locus(&mut self, record: &LocusRecord) -> io::Result<()>;
    /// Record an evaluated site.
    fn site(&mut self, record: &SiteRecord) -> io::Result<()>;
}

/// Sink that discards every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn locus(&mut self, _record: &LocusRecord) -> io::Result<()> {
        Ok(())
    }

    fn site(&mut self, _record: &SiteRecord) -> io::Result<()> {
        Ok(())
    }
}

/// Locus and site logs written as tab-delimited text.
#[derive(Debug)]
pub struct AuditLogs<L: Write, S: Write> {
    locus: L,
    site: S,
}

impl<L: Write, S: Write> AuditLogs<L, S> {
    /// Wrap two writers and emit their header rows.
    pub fn new(mut locus: L, mut site: S) -> io::Result<Self> {
        locus.write_all(LOCUS_HEADER.as_bytes())?;
        site.write_all(SITE_HEADER.as_bytes())?;
        Ok(Self { locus, site })
    }

    /// Flush and return the writers.
    pub fn finish(mut self) -> io::Result<(L, S)> {
        self.locus.flush()?;
        self.site.flush()?;
        Ok((self.locus, self.site))
    }
}

impl<L: Write, S: Write> AuditSink for AuditLogs<L, S> {
    fn locus(&mut self, record: &LocusRecord) -> io::Result<()> {
        writeln!(self.locus, "{}", format_locus(record))
    }

    fn site(&mut self, record: &SiteRecord) -> io::Result<()> {
        writeln!(self.site, "{}", format_site(record))
    }
}

fn join_positions(positions: &[i32]) -> String {
    positions
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn join_alleles(alleles: &[Allele]) -> String {
    alleles
        .iter()
        .map(|a| a.as_char().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Render a locus-log row without the trailing newline.
pub fn format_locus(record: &LocusRecord) -> String {
    let stats = &record.stats;
    format!(
        "{chrom}\t{start}\t{end}\t{strand}\t{bp}\t{tags}\t{reads}\t{taxa}\t{min_taxa}\t{status}\t\
{var_count}\t{var_pos}\t{kept_count}\t{kept_pos}\t{reference}\t{max_len}\t{min_len}",
        chrom = record.chromosome,
        start = stats.start,
        end = stats.end,
        strand = stats.strand.as_char(),
        bp = stats.total_base_pairs,
        tags = stats.tag_count,
        reads = stats.read_count,
        taxa = stats.taxa_covered,
        min_taxa = record.min_taxa_required,
        status = record.status,
        var_count = record.variable_site_positions.len(),
        var_pos = join_positions(&record.variable_site_positions),
        kept_count = record.kept_site_positions.len(),
        kept_pos = join_positions(&record.kept_site_positions),
        reference = record.reference_tag_present,
        max_len = stats.max_tag_length,
        min_len = stats.min_tag_length,
    )
}

/// Render a site-log row without the trailing newline.
pub fn format_site(record: &SiteRecord) -> String {
    let s = &record.statistics;
    format!(
        "{chrom}\t{pos}\t{alleles}\t{taxa}\t{inbred}\t{cov:.4}\t{hets:.4}\t{score:.4}\t{f:.4}\t\
{maf:.4}\t{minor}\t{status}\t{pass}",
        chrom = record.chromosome,
        pos = record.position,
        alleles = join_alleles(&s.alleles),
        taxa = s.taxa_covered,
        inbred = s.inbred_taxa_covered,
        cov = s.inbred_coverage,
        hets = s.prop_hets,
        score = s.inbred_het_score,
        f = s.observed_f,
        maf = s.maf,
        minor = s.minor_count,
        status = record.status,
        pass = record.pass,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::Strand;

    fn stats() -> LocusStats {
        LocusStats {
            start: 1000,
            end: 1004,
            strand: Strand::Forward,
            total_base_pairs: 5,
            tag_count: 3,
            read_count: 3,
            taxa_covered: 1,
            max_tag_length: 5,
            min_tag_length: 5,
        }
    }

    #[test]
    fn writes_headers_and_rows() {
        let mut logs = AuditLogs::new(Vec::new(), Vec::new()).unwrap();
        logs.locus(&LocusRecord {
            chromosome: 1,
            stats: stats(),
            min_taxa_required: 0,
            status: LocusStatus::Accepted,
            variable_site_positions: vec![1002, 1003],
            kept_site_positions: vec![1002],
            reference_tag_present: false,
        })
        .unwrap();
        logs.site(&SiteRecord {
            chromosome: 1,
            position: 1002,
            statistics: SiteStatistics {
                alleles: vec![Allele::C, Allele::T],
                taxa_covered: 1,
                maf: 1.0 / 3.0,
                minor_count: 1,
                observed_f: 1.0,
                passes_f: true,
                ..SiteStatistics::default()
            },
            status: "kept",
            pass: true,
        })
        .unwrap();
        let (locus, site) = logs.finish().unwrap();
        let locus = String::from_utf8(locus).unwrap();
        let site = String::from_utf8(site).unwrap();

        assert_eq!(locus, format!("{LOCUS_HEADER}1\t1000\t1004\t+\t5\t3\t3\t1\t0\taccepted\t2\t1002,1003\t1\t1002\tfalse\t5\t5\n"));
        assert_eq!(site.lines().count(), 2);
        assert_eq!(
            site.lines().nth(1).unwrap(),
            "1\t1002\tC/T\t1\t0\t0.0000\t0.0000\t0.0000\t1.0000\t0.3333\t1\tkept\ttrue"
        );
        assert_eq!(LOCUS_HEADER.split('\t').count(), 17);
        assert_eq!(SITE_HEADER.split('\t').count(), 13);
    }
}
