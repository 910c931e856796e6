#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tagsnp::genomics::{
    AuditLogs, DepthRatioGenotyper, MapEntry, PackedSequence, PhysicalMap, Strand, TagCountTable,
};
use tagsnp::{DiscoveryConfig, ScanDriver, ScanSummary};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("TAGSNP_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set TAGSNP_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// A placed tag for fixture maps.
pub struct FixtureTag<'a> {
    pub sequence: &'a str,
    pub chromosome: i32,
    pub strand: Strand,
    pub start: i32,
}

pub fn fwd(sequence: &str, chromosome: i32, start: i32) -> FixtureTag<'_> {
    FixtureTag {
        sequence,
        chromosome,
        strand: Strand::Forward,
        start,
    }
}

pub fn packed(sequence: &str) -> PackedSequence {
    PackedSequence::encode(sequence.as_bytes(), 1).expect("fixture tag packs")
}

/// One-word physical map with `max_variants` slots.
pub fn build_map(tags: &[FixtureTag<'_>], max_variants: usize) -> PhysicalMap {
    let mut map = PhysicalMap::new(1, max_variants);
    for tag in tags {
        map.push(MapEntry::placed(
            packed(tag.sequence),
            tag.chromosome,
            tag.strand,
            tag.start,
            max_variants,
        ))
        .expect("fixture entry fits");
    }
    map
}

/// Count table over `taxa`; each row is a distinct sequence.
pub fn build_counts(taxa: usize, rows: &[(&str, &[u32])]) -> TagCountTable {
    let names = (0..taxa).map(|i| format!("taxon{i}")).collect();
    let mut table = TagCountTable::new(names);
    for (sequence, counts) in rows {
        table
            .insert(packed(sequence), counts)
            .expect("fixture counts insert");
    }
    table
}

/// Scan with audit logs captured as text.
pub fn scan_with_logs(
    map: &mut PhysicalMap,
    counts: &TagCountTable,
    config: DiscoveryConfig,
) -> (ScanSummary, String, String) {
    let genotyper = DepthRatioGenotyper::new(config.average_sequencing_error_rate);
    let driver = ScanDriver::new(config, counts, genotyper).expect("valid config");
    let mut logs = AuditLogs::new(Vec::new(), Vec::new()).expect("log headers");
    let summary = driver.scan(map, &mut logs).expect("scan succeeds");
    let (locus, site) = logs.finish().expect("logs flush");
    (
        summary,
        String::from_utf8(locus).expect("utf8 locus log"),
        String::from_utf8(site).expect("utf8 site log"),
    )
}

/// Tab-split data rows of a log (header skipped).
pub fn rows(log: &str) -> Vec<Vec<String>> {
    log.lines()
        .skip(1)
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}
