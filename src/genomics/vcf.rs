use anyhow::{anyhow, Result};
use std::io::Write;

use super::allele::{Allele, Genotype};

const HEADER: &str = "##fileformat=VCFv4.3\n##source=tagsnp\n\
##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Taxa with a called genotype\">\n\
##FILTER=<ID=lowF,Description=\"Observed inbreeding coefficient below minimum\">\n\
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n";

/// A kept site in forward-strand orientation, ready for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSite {
    /// Chromosome id.
    pub chromosome: i32,
    /// Genomic coordinate, 1-based.
    pub position: i32,
    /// Reference base when a reference genome was supplied.
    pub reference: Option<Allele>,
    /// Retained alleles, deepest first.
    pub alleles: Vec<Allele>,
    /// One call per taxon.
    pub genotypes: Vec<Genotype>,
    /// Whether the site passed the inbreeding test.
    pub pass: bool,
}

impl DiscoveredSite {
    /// Allele order used for REF/ALT: the reference base first when known.
    pub fn vcf_alleles(&self) -> Vec<Allele> {
        let mut ordered = Vec::with_capacity(self.alleles.len() + 1);
        if let Some(reference) = self.reference {
            ordered.push(reference);
        }
        for &allele in &self.alleles {
            if !ordered.contains(&allele) {
                ordered.push(allele);
            }
        }
        ordered
    }
}

fn ref_symbol(allele: Allele) -> char {
    match allele {
        Allele::Gap => 'N',
        other => other.as_char(),
    }
}

fn alt_symbol(allele: Allele) -> char {
    match allele {
        Allele::Gap => '*',
        other => other.as_char(),
    }
}

fn genotype_field(genotype: Genotype, ordered: &[Allele]) -> String {
    let index = |a: Allele| ordered.iter().position(|&o| o == a);
    match genotype {
        Genotype::Missing => "./.".to_string(),
        Genotype::Homozygous(a) => match index(a) {
            Some(i) => format!("{i}/{i}"),
            None => "./.".to_string(),
        },
        Genotype::Heterozygous(a, b) => match (index(a), index(b)) {
            (Some(i), Some(j)) => format!("{}/{}", i.min(j), i.max(j)),
            _ => "./.".to_string(),
        },
    }
}

/// Write discovered sites as VCF with one sample column per taxon.
pub fn write_vcf<W: Write>(writer: &mut W, taxa: &[String], sites: &[DiscoveredSite]) -> Result<()> {
    writer.write_all(HEADER.as_bytes())?;
    write!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
    for taxon in taxa {
        write!(writer, "\t{taxon}")?;
    }
    writeln!(writer)?;

    for site in sites {
        if site.genotypes.len() != taxa.len() {
            return Err(anyhow!(
                "site {}:{} has {} genotypes for {} taxa",
                site.chromosome,
                site.position,
                site.genotypes.len(),
                taxa.len()
            ));
        }
        let ordered = site.vcf_alleles();
        let Some((&reference, alternates)) = ordered.split_first() else {
            return Err(anyhow!("site {}:{} has no alleles", site.chromosome, site.position));
        };
        let alt: Vec<String> = alternates.iter().map(|&a| alt_symbol(a).to_string()).collect();
        let alt = if alt.is_empty() { ".".to_string() } else { alt.join(",") };
        let called = site.genotypes.iter().filter(|g| g.is_called()).count();

        write!(
            writer,
            "{chrom}\t{pos}\t.\t{ref_base}\t{alt}\t.\t{filter}\tNS={called}\tGT",
            chrom = site.chromosome,
            pos = site.position,
            ref_base = ref_symbol(reference),
            filter = if site.pass { "PASS" } else { "lowF" },
        )?;
        for &genotype in &site.genotypes {
            write!(writer, "\t{}", genotype_field(genotype, &ordered))?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// Render sites into a VCF string (useful for tests and snapshots).
pub fn render_vcf(taxa: &[String], sites: &[DiscoveredSite]) -> Result<String> {
    let mut buffer = Vec::new();
    write_vcf(&mut buffer, taxa, sites)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered VCF is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_base_leads_allele_order() {
        let site = DiscoveredSite {
            chromosome: 1,
            position: 10,
            reference: Some(Allele::G),
            alleles: vec![Allele::A, Allele::G],
            genotypes: vec![],
            pass: true,
        };
        assert_eq!(site.vcf_alleles(), vec![Allele::G, Allele::A]);
        assert_eq!(
            genotype_field(Genotype::Heterozygous(Allele::A, Allele::G), &site.vcf_alleles()),
            "0/1"
        );
    }

    #[test]
    fn genotype_count_must_match_taxa() {
        let site = DiscoveredSite {
            chromosome: 1,
            position: 10,
            reference: None,
            alleles: vec![Allele::A, Allele::G],
            genotypes: vec![Genotype::Missing],
            pass: true,
        };
        let taxa = vec!["a".to_string(), "b".to_string()];
        assert!(render_vcf(&taxa, &[site]).is_err());
    }
}
