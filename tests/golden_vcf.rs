#[path = "common/mod.rs"]
mod common;
use common::assert_snapshot;
use tagsnp::genomics::{render_vcf, Allele, DiscoveredSite, Genotype};

#[test]
fn render_vcf_matches_golden() {
    let taxa: Vec<String> = ["B73", "Mo17", "W22"].iter().map(|s| s.to_string()).collect();
    let sites = vec![
        DiscoveredSite {
            chromosome: 1,
            position: 1002,
            reference: None,
            alleles: vec![Allele::C, Allele::T],
            genotypes: vec![
                Genotype::Heterozygous(Allele::C, Allele::T),
                Genotype::Homozygous(Allele::C),
                Genotype::Missing,
            ],
            pass: true,
        },
        DiscoveredSite {
            chromosome: 2,
            position: 57,
            reference: Some(Allele::G),
            alleles: vec![Allele::A, Allele::G],
            genotypes: vec![
                Genotype::Homozygous(Allele::A),
                Genotype::Heterozygous(Allele::A, Allele::G),
                Genotype::Homozygous(Allele::G),
            ],
            pass: false,
        },
        DiscoveredSite {
            chromosome: 2,
            position: 90,
            reference: None,
            alleles: vec![Allele::A, Allele::T, Allele::Gap],
            genotypes: vec![
                Genotype::Homozygous(Allele::Gap),
                Genotype::Homozygous(Allele::A),
                Genotype::Heterozygous(Allele::A, Allele::T),
            ],
            pass: true,
        },
    ];

    let actual = render_vcf(&taxa, &sites).expect("VCF rendering should succeed");
    assert_snapshot("vcf/discovered.vcf", &actual);
}

#[test]
fn empty_site_list_renders_header_only() {
    let taxa = vec!["B73".to_string()];
    let actual = render_vcf(&taxa, &[]).expect("VCF rendering should succeed");
    let last = actual.lines().last().expect("header present");
    assert_eq!(last, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tB73");
    assert_eq!(actual.lines().count(), 6);
}
