use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tagsnp::genomics::{
    write_vcf, AuditLogs, DepthRatioGenotyper, FilterMode, NullAudit, Pedigree, PhysicalMap,
    ReferenceGenome, TagCountSource, TagCountTable,
};
use tagsnp::{DiscoveryConfig, ProgressEvent, ScanDriver};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagsnp", about = "SNP discovery from aligned sequence tags")]
struct Cli {
    /// Log debug output (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum MapFormat {
    Binary,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call SNPs at every locus and write them into the physical map.
    Discover {
        #[command(flatten)]
        paths: DiscoverPaths,
        #[command(flatten)]
        options: DiscoverOptions,
    },
    /// Rewrite a physical map in another layout.
    Convert {
        /// Input map.
        input: PathBuf,
        /// Output map.
        output: PathBuf,
        /// Output layout.
        #[arg(long, value_enum)]
        to: MapFormat,
    },
    /// Rewrite a physical map with entries in position order.
    Sort {
        /// Input map.
        input: PathBuf,
        /// Output map.
        output: PathBuf,
        /// Output layout.
        #[arg(long, value_enum, default_value_t = MapFormat::Binary)]
        format: MapFormat,
    },
}

#[derive(clap::Args, Debug)]
struct DiscoverPaths {
    /// Physical map (binary or legacy text).
    map: PathBuf,
    /// Taxa-by-tag count table.
    counts: PathBuf,
    /// Output physical map.
    out: PathBuf,
    /// Output layout for the physical map.
    #[arg(long, value_enum, default_value_t = MapFormat::Binary)]
    format: MapFormat,
    /// Pedigree with `Taxon` and `F` columns selecting inbred taxa.
    #[arg(long)]
    pedigree: Option<PathBuf>,
    /// Reference genome FASTA.
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Locus log output.
    #[arg(long)]
    locus_log: Option<PathBuf>,
    /// Site statistics log output.
    #[arg(long)]
    site_log: Option<PathBuf>,
    /// VCF output of written sites.
    #[arg(long)]
    vcf: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DiscoverOptions {
    /// Minimum minor allele frequency.
    #[arg(long, default_value_t = 0.01)]
    min_maf: f64,
    /// Minimum minor allele read count.
    #[arg(long, default_value_t = 10)]
    min_mac: u32,
    /// Minimum fraction of taxa covering a locus.
    #[arg(long, default_value_t = 0.1)]
    min_locus_coverage: f64,
    /// Minimum inbreeding coefficient; values at or below -1 disable the test.
    #[arg(long, default_value_t = -2.0, allow_hyphen_values = true)]
    minimum_f: f64,
    /// Average per-base sequencing error rate.
    #[arg(long, default_value_t = 0.01)]
    error_rate: f64,
    /// Keep every observed allele instead of the top two.
    #[arg(long)]
    include_rare_alleles: bool,
    /// Allow gaps among the called alleles.
    #[arg(long)]
    include_gaps: bool,
    /// Call the top two nucleotides plus a gap allele.
    #[arg(long, conflicts_with = "include_gaps")]
    biallelic_with_gap: bool,
    /// Fuzzy locus window in bases (0 groups tags by exact start).
    #[arg(long, default_value_t = 0)]
    fuzzy_window: u32,
    /// First chromosome to scan.
    #[arg(long, requires = "end_chromosome")]
    start_chromosome: Option<i32>,
    /// Last chromosome to scan.
    #[arg(long, requires = "start_chromosome")]
    end_chromosome: Option<i32>,
    /// Pedigree F at or above which a taxon counts as inbred.
    #[arg(long, default_value_t = 0.8)]
    inbred_threshold: f64,
    /// Record inbreeding failures in the site log instead of rejecting.
    #[arg(long)]
    defer_f_filter: bool,
    /// Scan chromosomes in parallel.
    #[arg(long)]
    parallel: bool,
}

impl DiscoverOptions {
    fn to_config(&self) -> DiscoveryConfig {
        let mut config = DiscoveryConfig {
            min_minor_allele_freq: self.min_maf,
            min_minor_allele_count: self.min_mac,
            min_locus_coverage: self.min_locus_coverage,
            minimum_f: self.minimum_f,
            average_sequencing_error_rate: self.error_rate,
            include_rare_alleles: self.include_rare_alleles,
            include_gaps: self.include_gaps,
            biallelic_with_gap: self.biallelic_with_gap,
            fuzzy_locus_window: self.fuzzy_window,
            inbred_threshold: self.inbred_threshold,
            parallel: self.parallel,
            ..DiscoveryConfig::default()
        };
        if let (Some(start), Some(end)) = (self.start_chromosome, self.end_chromosome) {
            config = config.with_chromosome_range(start..=end);
        }
        if self.defer_f_filter {
            config = config.with_filter_mode(FilterMode::Deferred);
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Discover { paths, options } => run_discover(paths, options.to_config())?,
        Commands::Convert { input, output, to } => {
            let map = load_map(&input)?;
            save_map(&map, &output, to)?;
        }
        Commands::Sort {
            input,
            output,
            format,
        } => run_sort(&input, &output, format)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_discover(paths: DiscoverPaths, config: DiscoveryConfig) -> Result<()> {
    let mut map = load_map(&paths.map)?;
    let counts = TagCountTable::load(&paths.counts, map.words_per_tag())
        .with_context(|| format!("failed to read tag counts from {}", paths.counts.display()))?;
    let pedigree = paths
        .pedigree
        .as_ref()
        .map(|p| Pedigree::load(p).with_context(|| format!("failed to read pedigree {}", p.display())))
        .transpose()?;
    let reference = paths
        .reference
        .as_ref()
        .map(|p| {
            ReferenceGenome::load(p).with_context(|| format!("failed to read reference {}", p.display()))
        })
        .transpose()?;

    let genotyper = DepthRatioGenotyper::new(config.average_sequencing_error_rate);
    let (tx, rx) = mpsc::channel();
    let mut driver = ScanDriver::new(config, &counts, genotyper)
        .context("invalid discovery options")?
        .with_progress(tx);
    if let Some(pedigree) = &pedigree {
        driver = driver.with_pedigree(pedigree);
    }
    if let Some(reference) = &reference {
        driver = driver.with_reference(reference);
    }

    let reporter = thread::spawn(move || report_progress(rx));

    let summary = if paths.locus_log.is_some() || paths.site_log.is_some() {
        let mut logs = AuditLogs::new(
            open_log(paths.locus_log.as_deref())?,
            open_log(paths.site_log.as_deref())?,
        )
        .context("failed to write log headers")?;
        let summary = driver.scan(&mut map, &mut logs)?;
        logs.finish().context("failed to flush logs")?;
        summary
    } else {
        driver.scan(&mut map, &mut NullAudit)?
    };
    drop(driver);
    if reporter.join().is_err() {
        bail!("progress reporter panicked");
    }

    save_map(&map, &paths.out, paths.format)?;

    if let Some(path) = &paths.vcf {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        );
        write_vcf(&mut writer, counts.taxa(), &summary.sites)
            .with_context(|| format!("failed to write VCF to {}", path.display()))?;
    }

    println!(
        "loci={} accepted={} invariant={} tooFewTaxa={} sites={} kept={} dropped={} slots={}",
        summary.loci,
        summary.accepted_loci,
        summary.invariant_loci,
        summary.too_few_taxa_loci,
        summary.evaluated_sites,
        summary.kept_sites,
        summary.dropped_sites,
        summary.commits
    );
    Ok(())
}

fn report_progress(rx: mpsc::Receiver<ProgressEvent>) {
    while let Ok(event) = rx.recv() {
        info!(target: "tagsnp::progress", "{event}");
    }
}

fn open_log(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::sink()),
    })
}

fn run_sort(input: &Path, output: &Path, format: MapFormat) -> Result<()> {
    let map = load_map(input)?;
    let index = map.sort_by_position();
    let mut sorted = PhysicalMap::new(map.words_per_tag(), map.max_variants());
    for &entry in index.order() {
        sorted.push(map.entries()[entry].clone())?;
    }
    save_map(&sorted, output, format)
}

fn load_map(path: &Path) -> Result<PhysicalMap> {
    PhysicalMap::load(path)
        .with_context(|| format!("failed to read physical map from {}", path.display()))
}

fn save_map(map: &PhysicalMap, path: &Path, format: MapFormat) -> Result<()> {
    match format {
        MapFormat::Binary => map.write_binary_file(path),
        MapFormat::Text => map.write_text_file(path),
    }
    .with_context(|| format!("failed to write physical map to {}", path.display()))
}
