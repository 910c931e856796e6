#[path = "common/mod.rs"]
mod common;

use std::collections::HashSet;

use blake3::Hasher;
use common::{build_counts, build_map, fwd, FixtureTag};
use tagsnp::genomics::{render_vcf, DepthRatioGenotyper, NullAudit, Strand, TagCountSource};
use tagsnp::{DiscoveryConfig, ScanDriver};

fn fixture_tags() -> Vec<FixtureTag<'static>> {
    let mut tags = vec![
        fwd("AACGTTGCA", 1, 100),
        fwd("AATGTTGCA", 1, 100),
        fwd("AACGTAGCA", 1, 100),
        fwd("CCGGTTAAC", 1, 400),
        fwd("CCGATTAAC", 1, 400),
        fwd("GGTACCATG", 2, 50),
        fwd("GGTACGATG", 2, 52),
        fwd("TTAGCCGAT", 3, 900),
        fwd("TTAGCTGAT", 3, 900),
    ];
    tags.push(FixtureTag {
        sequence: "ACGTTCAGG",
        chromosome: 3,
        strand: Strand::Reverse,
        start: 1200,
    });
    tags.push(FixtureTag {
        sequence: "ACGATCAGG",
        chromosome: 3,
        strand: Strand::Reverse,
        start: 1200,
    });
    tags
}

fn fingerprint(parallel: bool) -> blake3::Hash {
    let tags = fixture_tags();
    let mut map = build_map(&tags, 3);
    let counts = build_counts(
        4,
        &[
            ("AACGTTGCA", &[12, 0, 6, 3]),
            ("AATGTTGCA", &[0, 14, 6, 0]),
            ("AACGTAGCA", &[0, 0, 0, 11]),
            ("CCGGTTAAC", &[9, 9, 0, 2]),
            ("CCGATTAAC", &[0, 0, 15, 2]),
            ("GGTACCATG", &[7, 0, 7, 0]),
            ("GGTACGATG", &[0, 7, 0, 7]),
            ("TTAGCCGAT", &[20, 0, 0, 5]),
            ("TTAGCTGAT", &[0, 20, 5, 0]),
            ("ACGTTCAGG", &[6, 6, 0, 0]),
            ("ACGATCAGG", &[0, 0, 6, 6]),
        ],
    );
    let config = DiscoveryConfig::default()
        .with_fuzzy_locus_window(4)
        .with_parallel(parallel);
    let driver = ScanDriver::new(config, &counts, DepthRatioGenotyper::new(0.01))
        .expect("valid config");
    let summary = driver.scan(&mut map, &mut NullAudit).expect("scan succeeds");

    let mut bytes = Vec::new();
    map.write_binary(&mut bytes).expect("binary map serialises");
    let vcf = render_vcf(counts.taxa(), &summary.sites).expect("VCF renders");

    let mut hasher = Hasher::new();
    hasher.update(&bytes);
    hasher.update(vcf.as_bytes());
    hasher.finalize()
}

#[test]
fn repeated_scans_produce_identical_outputs() {
    let mut fingerprints = HashSet::new();
    for _ in 0..3 {
        fingerprints.insert(fingerprint(false));
        fingerprints.insert(fingerprint(true));
    }
    assert_eq!(fingerprints.len(), 1, "outputs diverged across runs");
}
