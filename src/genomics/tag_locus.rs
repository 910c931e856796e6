//! Grouping of co-located tags and per-site allele depth tallies.
//!
//! Members are laid out by ungapped positional offset in the orientation of
//! the locus (the strand of its first tag). Columns are addressed by their
//! distance from the locus minimum start: `min_start + d` on the plus strand,
//! `min_start - d` on the minus strand.
//!
//! A reference genome contributes one extra member spanning the locus window.
//! It carries no reads, so it never makes a column variable on its own, but it
//! counts as a tag and supplies the reference allele of every site.

use bitvec::prelude::*;

use super::allele::{Allele, NUM_ALLELES};
use super::physical_map::{PlacedTag, Strand};
use super::reference::ReferenceGenome;

/// Rule deciding whether a tag joins the currently open locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocusPolicy {
    /// Same chromosome and identical start.
    Exact,
    /// Same chromosome and start within `border` bases past the anchor.
    ///
    /// The anchor moves to every accepted tag, so a locus can span more than
    /// `border` bases end to end.
    Fuzzy {
        /// Window width in bases.
        border: u32,
    },
}

impl LocusPolicy {
    /// `Exact` for a zero window, `Fuzzy` otherwise.
    pub fn from_window(window: u32) -> Self {
        if window == 0 {
            LocusPolicy::Exact
        } else {
            LocusPolicy::Fuzzy { border: window }
        }
    }
}

#[derive(Debug, Clone)]
struct LocusMember<'a> {
    tag: PlacedTag<'a>,
    counts: Option<&'a [u16]>,
}

impl LocusMember<'_> {
    fn reads(&self) -> u64 {
        self.counts
            .map(|c| c.iter().map(|&n| u64::from(n)).sum())
            .unwrap_or(0)
    }
}

/// Summary figures of a locus used by the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocusStats {
    /// Lowest genomic coordinate covered.
    pub start: i32,
    /// Highest genomic coordinate covered.
    pub end: i32,
    /// Locus orientation.
    pub strand: Strand,
    /// Number of aligned columns.
    pub total_base_pairs: usize,
    /// Member tag count.
    pub tag_count: usize,
    /// Reads summed over members and taxa.
    pub read_count: u64,
    /// Taxa with at least one read.
    pub taxa_covered: usize,
    /// Longest member tag.
    pub max_tag_length: usize,
    /// Shortest member tag.
    pub min_tag_length: usize,
}

/// Tags sharing (or nearly sharing) a start coordinate.
#[derive(Debug, Clone)]
pub struct TagLocus<'a> {
    policy: LocusPolicy,
    taxa: usize,
    chromosome: i32,
    strand: Strand,
    min_start: i32,
    anchor: i32,
    max_tag_length: usize,
    min_tag_length: usize,
    members: Vec<LocusMember<'a>>,
    reference: Option<ReferenceTag>,
}

/// Reference bases over the locus window, in locus orientation.
#[derive(Debug, Clone)]
struct ReferenceTag {
    first_distance: i32,
    bases: Vec<Option<Allele>>,
}

impl ReferenceTag {
    fn allele_at(&self, distance: i32) -> Option<Allele> {
        let idx = usize::try_from(distance - self.first_distance).ok()?;
        self.bases.get(idx).copied().flatten()
    }
}

impl<'a> TagLocus<'a> {
    /// Open a locus seeded by its first tag.
    pub fn open(
        policy: LocusPolicy,
        taxa: usize,
        first: PlacedTag<'a>,
        counts: Option<&'a [u16]>,
    ) -> Self {
        let len = first.sequence.len();
        Self {
            policy,
            taxa,
            chromosome: first.chromosome,
            strand: first.strand,
            min_start: first.start,
            anchor: first.start,
            max_tag_length: len,
            min_tag_length: len,
            members: vec![LocusMember { tag: first, counts }],
            reference: None,
        }
    }

    /// Whether `candidate` belongs to this locus under its policy.
    pub fn accepts(&self, candidate: &PlacedTag<'_>) -> bool {
        if candidate.chromosome != self.chromosome {
            return false;
        }
        match self.policy {
            LocusPolicy::Exact => candidate.start == self.min_start,
            LocusPolicy::Fuzzy { border } => {
                let delta = i64::from(candidate.start) - i64::from(self.anchor);
                (0..i64::from(border)).contains(&delta)
            }
        }
    }

    /// Add a member; under the fuzzy policy the anchor follows it.
    pub fn add_tag(&mut self, tag: PlacedTag<'a>, counts: Option<&'a [u16]>) {
        let len = tag.sequence.len();
        self.max_tag_length = self.max_tag_length.max(len);
        self.min_tag_length = self.min_tag_length.min(len);
        self.min_start = self.min_start.min(tag.start);
        if matches!(self.policy, LocusPolicy::Fuzzy { .. }) {
            self.anchor = tag.start;
        }
        self.members.push(LocusMember { tag, counts });
    }

    /// Chromosome of the locus.
    pub fn chromosome(&self) -> i32 {
        self.chromosome
    }

    /// Orientation of the locus.
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Smallest member start.
    pub fn min_start(&self) -> i32 {
        self.min_start
    }

    /// Number of member tags, the reference tag included.
    pub fn len(&self) -> usize {
        self.members.len() + usize::from(self.reference.is_some())
    }

    /// Always `false` for an opened locus.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Map entry indices of the members, in insertion order.
    ///
    /// The reference tag has no map entry and is not listed.
    pub fn member_entries(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().map(|m| m.tag.entry)
    }

    /// Add the reference tag covering the current locus window.
    ///
    /// Call once the locus is complete. Returns `false`, leaving the locus
    /// unchanged, when the genome has no known base inside the window.
    pub fn add_reference(&mut self, genome: &ReferenceGenome) -> bool {
        if !genome.contains(self.chromosome) {
            return false;
        }
        let (lo, hi) = self.distance_range();
        let bases: Vec<Option<Allele>> = (lo..=hi)
            .map(|d| genome.oriented_base(self.chromosome, self.genomic_position(d), self.strand))
            .collect();
        if bases.iter().all(Option::is_none) {
            return false;
        }
        self.reference = Some(ReferenceTag {
            first_distance: lo,
            bases,
        });
        true
    }

    /// Whether a reference tag joined the locus.
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Taxa with at least one read on any member.
    pub fn taxa_covered(&self) -> BitVec {
        let mut covered = bitvec![0; self.taxa];
        for counts in self.members.iter().filter_map(|m| m.counts) {
            for (taxon, &n) in counts.iter().enumerate().take(self.taxa) {
                if n > 0 {
                    covered.set(taxon, true);
                }
            }
        }
        covered
    }

    /// Genomic coordinate of a column distance.
    pub fn genomic_position(&self, distance: i32) -> i32 {
        self.min_start + distance * self.strand.sign()
    }

    /// Audit figures for the locus log.
    pub fn stats(&self) -> LocusStats {
        let (lo, hi) = self.distance_range();
        let a = self.genomic_position(lo);
        let b = self.genomic_position(hi);
        LocusStats {
            start: a.min(b),
            end: a.max(b),
            strand: self.strand,
            total_base_pairs: (hi - lo + 1) as usize,
            tag_count: self.len(),
            read_count: self.members.iter().map(LocusMember::reads).sum(),
            taxa_covered: self.taxa_covered().count_ones(),
            max_tag_length: self.max_tag_length,
            min_tag_length: self.min_tag_length,
        }
    }

    /// Distances of columns with at least two alleles carrying reads.
    pub fn positions_of_variable_sites(&self) -> Vec<i32> {
        let (lo, totals) = self.column_totals();
        variable_columns(&totals)
            .map(|col| lo + col as i32)
            .collect()
    }

    /// `(entry, tag offset, locus-oriented allele)` of every member reaching
    /// the column at `distance`.
    pub fn calls_at(&self, distance: i32) -> impl Iterator<Item = (usize, u8, Allele)> + '_ {
        let genomic = self.genomic_position(distance);
        self.members.iter().filter_map(move |member| {
            let offset = (genomic - member.tag.start) * member.tag.strand.sign();
            let offset = usize::try_from(offset).ok()?;
            if offset >= self.max_tag_length {
                return None;
            }
            let allele = self.member_allele(member, offset);
            Some((member.tag.entry, offset as u8, allele))
        })
    }

    /// Tally per-taxon allele depths over the variable columns.
    ///
    /// With a reference tag, each site also carries the reference allele.
    pub fn build_depth_matrix(&self) -> AlleleDepthMatrix {
        let (lo, totals) = self.column_totals();
        let columns: Vec<usize> = variable_columns(&totals).collect();

        let mut site_of_column = vec![None; totals.len()];
        for (site, &col) in columns.iter().enumerate() {
            site_of_column[col] = Some(site);
        }

        let sites = columns.len();
        let mut matrix = AlleleDepthMatrix {
            taxa: self.taxa,
            positions: columns.iter().map(|&col| lo + col as i32).collect(),
            depth: vec![0; NUM_ALLELES * sites * self.taxa],
            reference: None,
        };

        if sites > 0 {
            for member in &self.members {
                let Some(counts) = member.counts else { continue };
                for offset in 0..self.max_tag_length {
                    let (distance, allele) = self.placement(member, offset);
                    let Some(site) = site_of_column[(distance - lo) as usize] else {
                        continue;
                    };
                    for (taxon, &n) in counts.iter().enumerate().take(self.taxa) {
                        let idx = matrix.index(allele, site, taxon);
                        matrix.depth[idx] = matrix.depth[idx].saturating_add(n);
                    }
                }
            }
        }

        if let Some(reference) = &self.reference {
            matrix.reference = Some(
                matrix
                    .positions
                    .iter()
                    .map(|&d| reference.allele_at(d))
                    .collect(),
            );
        }

        matrix
    }

    fn member_allele(&self, member: &LocusMember<'_>, offset: usize) -> Allele {
        let allele = member
            .tag
            .sequence
            .base_at(offset)
            .and_then(|b| Allele::from_char(char::from(b)))
            .unwrap_or(Allele::Gap);
        if member.tag.strand == self.strand {
            allele
        } else {
            allele.complement()
        }
    }

    fn placement(&self, member: &LocusMember<'_>, offset: usize) -> (i32, Allele) {
        let genomic = member.tag.start + offset as i32 * member.tag.strand.sign();
        let distance = (genomic - self.min_start) * self.strand.sign();
        (distance, self.member_allele(member, offset))
    }

    fn distance_range(&self) -> (i32, i32) {
        let last = self.max_tag_length.saturating_sub(1);
        self.members
            .iter()
            .flat_map(|m| [self.placement(m, 0).0, self.placement(m, last).0])
            .fold((i32::MAX, i32::MIN), |(lo, hi), d| (lo.min(d), hi.max(d)))
    }

    fn column_totals(&self) -> (i32, Vec<[u64; NUM_ALLELES]>) {
        let (lo, hi) = self.distance_range();
        let mut totals = vec![[0u64; NUM_ALLELES]; (hi - lo + 1) as usize];
        for member in &self.members {
            let reads = member.reads();
            if reads == 0 {
                continue;
            }
            for offset in 0..self.max_tag_length {
                let (distance, allele) = self.placement(member, offset);
                totals[(distance - lo) as usize][allele.index()] += reads;
            }
        }
        (lo, totals)
    }
}

fn variable_columns(totals: &[[u64; NUM_ALLELES]]) -> impl Iterator<Item = usize> + '_ {
    totals
        .iter()
        .enumerate()
        .filter(|(_, column)| column.iter().filter(|&&n| n > 0).count() >= 2)
        .map(|(col, _)| col)
}

/// Read depth per allele, variable site and taxon for one locus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlleleDepthMatrix {
    taxa: usize,
    positions: Vec<i32>,
    depth: Vec<u16>,
    reference: Option<Vec<Option<Allele>>>,
}

impl AlleleDepthMatrix {
    /// Build directly from per-site, per-taxon depth rows.
    ///
    /// `rows[site][taxon]` holds depths indexed by [`Allele::index`].
    pub fn from_rows(positions: Vec<i32>, rows: &[Vec<[u16; NUM_ALLELES]>]) -> Self {
        let taxa = rows.first().map(Vec::len).unwrap_or(0);
        let mut matrix = Self {
            taxa,
            positions,
            depth: vec![0; NUM_ALLELES * rows.len() * taxa],
            reference: None,
        };
        for (site, row) in rows.iter().enumerate() {
            for (taxon, depths) in row.iter().enumerate() {
                for allele in Allele::ALL {
                    let idx = matrix.index(allele, site, taxon);
                    matrix.depth[idx] = depths[allele.index()];
                }
            }
        }
        matrix
    }

    fn index(&self, allele: Allele, site: usize, taxon: usize) -> usize {
        (allele.index() * self.positions.len() + site) * self.taxa + taxon
    }

    /// Number of variable sites.
    pub fn site_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of taxa.
    pub fn taxa_count(&self) -> usize {
        self.taxa
    }

    /// Distance from the locus minimum start of every site.
    pub fn positions(&self) -> &[i32] {
        &self.positions
    }

    /// Reads supporting `allele` at `site` in `taxon`.
    pub fn depth(&self, allele: Allele, site: usize, taxon: usize) -> u16 {
        self.depth[self.index(allele, site, taxon)]
    }

    /// All allele depths of one taxon at one site.
    pub fn site_depths(&self, site: usize, taxon: usize) -> [u16; NUM_ALLELES] {
        Allele::ALL.map(|allele| self.depth(allele, site, taxon))
    }

    /// Depth per allele summed over taxa.
    pub fn allele_totals(&self, site: usize) -> [u64; NUM_ALLELES] {
        Allele::ALL.map(|allele| {
            (0..self.taxa)
                .map(|taxon| u64::from(self.depth(allele, site, taxon)))
                .sum()
        })
    }

    /// Whether the locus carried a reference tag.
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Reference allele at `site` in locus orientation.
    pub fn reference_allele(&self, site: usize) -> Option<Allele> {
        self.reference.as_ref()?.get(site).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::PackedSequence;

    fn placed(entry: usize, seq: &PackedSequence, strand: Strand, start: i32) -> PlacedTag<'_> {
        PlacedTag {
            entry,
            sequence: seq,
            chromosome: 1,
            strand,
            start,
        }
    }

    fn seq(s: &str) -> PackedSequence {
        PackedSequence::encode(s.as_bytes(), 1).unwrap()
    }

    #[test]
    fn exact_policy_requires_same_start() {
        let a = seq("AACGT");
        let b = seq("AATGT");
        let locus = TagLocus::open(LocusPolicy::Exact, 1, placed(0, &a, Strand::Forward, 1000), None);
        assert!(locus.accepts(&placed(1, &b, Strand::Forward, 1000)));
        assert!(!locus.accepts(&placed(1, &b, Strand::Forward, 1001)));
        let mut other_chrom = placed(1, &b, Strand::Forward, 1000);
        other_chrom.chromosome = 2;
        assert!(!locus.accepts(&other_chrom));
    }

    #[test]
    fn fuzzy_anchor_slides_forward() {
        let a = seq("AACGT");
        let mut locus = TagLocus::open(
            LocusPolicy::Fuzzy { border: 3 },
            1,
            placed(0, &a, Strand::Forward, 100),
            None,
        );
        assert!(locus.accepts(&placed(1, &a, Strand::Forward, 102)));
        assert!(!locus.accepts(&placed(1, &a, Strand::Forward, 103)));
        locus.add_tag(placed(1, &a, Strand::Forward, 102), None);
        assert!(locus.accepts(&placed(2, &a, Strand::Forward, 104)));
        assert!(!locus.accepts(&placed(2, &a, Strand::Forward, 99)));
        assert_eq!(locus.min_start(), 100);
    }

    #[test]
    fn depth_matrix_keeps_only_variable_columns() {
        let a = seq("AACGT");
        let b = seq("AATGT");
        let counts_a = [2u16, 0];
        let counts_b = [1u16, 4];
        let mut locus = TagLocus::open(
            LocusPolicy::Exact,
            2,
            placed(0, &a, Strand::Forward, 1000),
            Some(&counts_a[..]),
        );
        locus.add_tag(placed(1, &b, Strand::Forward, 1000), Some(&counts_b[..]));

        assert_eq!(locus.positions_of_variable_sites(), vec![2]);
        let matrix = locus.build_depth_matrix();
        assert_eq!(matrix.site_count(), 1);
        assert_eq!(matrix.depth(Allele::C, 0, 0), 2);
        assert_eq!(matrix.depth(Allele::T, 0, 0), 1);
        assert_eq!(matrix.depth(Allele::T, 0, 1), 4);
        assert_eq!(matrix.allele_totals(0)[Allele::C.index()], 2);
        assert_eq!(locus.stats().taxa_covered, 2);
        assert_eq!(locus.stats().read_count, 7);
    }

    #[test]
    fn shorter_tag_contributes_gaps() {
        let long = seq("ACGTA");
        let short = seq("ACG");
        let counts = [3u16];
        let mut locus = TagLocus::open(
            LocusPolicy::Exact,
            1,
            placed(0, &long, Strand::Forward, 50),
            Some(&counts[..]),
        );
        locus.add_tag(placed(1, &short, Strand::Forward, 50), Some(&counts[..]));
        let matrix = locus.build_depth_matrix();
        assert_eq!(matrix.positions(), &[3, 4]);
        assert_eq!(matrix.depth(Allele::Gap, 0, 0), 3);
        assert_eq!(matrix.depth(Allele::T, 0, 0), 3);
    }

    #[test]
    fn minus_strand_positions_count_down() {
        let a = seq("AACGT");
        let b = seq("AATGT");
        let counts = [1u16];
        let mut locus = TagLocus::open(
            LocusPolicy::Exact,
            1,
            placed(0, &a, Strand::Reverse, 1000),
            Some(&counts[..]),
        );
        locus.add_tag(placed(1, &b, Strand::Reverse, 1000), Some(&counts[..]));
        let matrix = locus.build_depth_matrix();
        assert_eq!(matrix.positions(), &[2]);
        assert_eq!(locus.genomic_position(2), 998);
        let calls: Vec<_> = locus.calls_at(2).collect();
        assert_eq!(calls, vec![(0, 2, Allele::C), (1, 2, Allele::T)]);
        assert!(locus.calls_at(7).next().is_none());
        let stats = locus.stats();
        assert_eq!((stats.start, stats.end), (996, 1000));
    }

    #[test]
    fn reference_alleles_follow_locus_orientation() {
        let a = seq("AACGT");
        let b = seq("AATGT");
        let counts = [1u16];
        let mut genome = ReferenceGenome::new();
        genome.insert(1, "AACGTT");
        let mut locus = TagLocus::open(
            LocusPolicy::Exact,
            1,
            placed(0, &a, Strand::Forward, 1),
            Some(&counts[..]),
        );
        locus.add_tag(placed(1, &b, Strand::Forward, 1), Some(&counts[..]));
        assert!(locus.add_reference(&genome));
        assert_eq!(locus.len(), 3);
        assert_eq!(locus.member_entries().count(), 2);
        let matrix = locus.build_depth_matrix();
        assert!(matrix.has_reference());
        assert_eq!(matrix.positions(), &[2]);
        assert_eq!(matrix.reference_allele(0), Some(Allele::C));
    }

    #[test]
    fn reference_tag_counts_as_member_without_reads() {
        let a = seq("AACGT");
        let counts = [5u16];
        let mut genome = ReferenceGenome::new();
        genome.insert(1, "AATGT");
        let mut locus = TagLocus::open(
            LocusPolicy::Exact,
            1,
            placed(0, &a, Strand::Forward, 1),
            Some(&counts[..]),
        );
        assert!(locus.add_reference(&genome));
        assert_eq!(locus.stats().tag_count, 2);
        assert_eq!(locus.stats().read_count, 5);
        assert!(locus.positions_of_variable_sites().is_empty());
    }

    #[test]
    fn reference_outside_genome_is_not_added() {
        let a = seq("AACGT");
        let mut genome = ReferenceGenome::new();
        genome.insert(2, "AACGT");
        let mut locus = TagLocus::open(LocusPolicy::Exact, 1, placed(0, &a, Strand::Forward, 1), None);
        assert!(!locus.add_reference(&genome));
        genome.insert(1, "AC");
        let mut far = TagLocus::open(LocusPolicy::Exact, 1, placed(0, &a, Strand::Forward, 500), None);
        assert!(!far.add_reference(&genome));
        assert_eq!(far.len(), 1);
    }
}
