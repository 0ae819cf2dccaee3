use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use eland_rs::align::AlignmentDriver;
use eland_rs::config::{AlignConfig, PairConfig};
use eland_rs::error::ElandError;
use eland_rs::index::squash::{GenomeIndex, SquashBuilder, SQUASH_SUFFIX};
use eland_rs::io::fasta::FastaReader;
use eland_rs::io::genome_size::GenomeSizes;
use eland_rs::io::reads::{load_reads, load_repeats, open_input};
use eland_rs::pair::{self, CircularReferences, MateInput};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const GENOME_SIZE_FILE: &str = "sequenceSizes.xml";

#[derive(Parser, Debug)]
#[command(name = "eland-rs", author, version, about = "ELAND-style short-read aligner and paired-fragment resolver", arg_required_else_help = true)]
struct Cli {
    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack FASTA references into 2-bit squash files plus sequenceSizes.xml
    Squash {
        /// Reference FASTA files (one squash file each)
        #[arg(required = true)]
        fasta: Vec<PathBuf>,
        /// Output genome directory
        #[arg(short, long)]
        output: PathBuf,
        /// References to mark as circular in sequenceSizes.xml
        #[arg(long, value_delimiter = ',')]
        circular: Vec<String>,
    },
    /// Align reads against a squashed genome, writing ELAND extended output
    Align(AlignArgs),
    /// Resolve read pairs from two ELAND extended files into export files
    Pair(PairArgs),
}

#[derive(Args, Debug)]
struct AlignArgs {
    /// Directory of .2bpb reference files
    #[arg(short = 'g', long = "genome-dir")]
    genome_dir: PathBuf,
    /// Reads (FASTA or FASTQ, optionally gzipped)
    reads: PathBuf,
    /// Output path (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
    #[arg(long = "oligo-length", default_value_t = 32)]
    oligo_len: usize,
    /// Per-class caps for 0, 1 and 2 mismatch matches
    #[arg(long = "max-matches", value_delimiter = ',', default_values_t = [10u32, 10, 10])]
    max_matches: Vec<u32>,
    /// Skip the multi-seed tier
    #[arg(long = "single-seed")]
    single_seed: bool,
    /// Send saturated reads to the multi-seed tier as well
    #[arg(long)]
    sensitive: bool,
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,
    /// Oligos to mask as repeats (one per line)
    #[arg(long)]
    repeats: Option<PathBuf>,
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,
    #[arg(long = "max-multi-hits", default_value_t = 10)]
    max_multi_hits: usize,
    #[arg(long = "seed-deviation", default_value_t = 5)]
    seed_deviation: u32,
    #[arg(long = "max-ns", default_value_t = 2)]
    max_ns: u32,
    #[arg(long = "max-hash-bits", default_value_t = 25)]
    max_hash_bits: u32,
    #[arg(long = "cache-size", default_value_t = 200)]
    cache_size: usize,
}

#[derive(Args, Debug)]
struct PairArgs {
    /// ELAND extended file of mate 1
    #[arg(long)]
    read1: PathBuf,
    /// ELAND extended file of mate 2
    #[arg(long)]
    read2: PathBuf,
    /// FASTQ with base qualities of mate 1
    #[arg(long)]
    fastq1: Option<PathBuf>,
    #[arg(long)]
    fastq2: Option<PathBuf>,
    /// sequenceSizes.xml (defaults to the one in --genome-dir)
    #[arg(long = "genome-size")]
    genome_size: Option<PathBuf>,
    /// Squashed genome, needed for --rescue
    #[arg(long = "genome-dir")]
    genome_dir: Option<PathBuf>,
    #[arg(long, value_delimiter = ',')]
    circular: Vec<String>,
    #[arg(long = "use-bases1")]
    use_bases1: Option<String>,
    #[arg(long = "use-bases2")]
    use_bases2: Option<String>,
    #[arg(long = "seed-length", default_value_t = 32)]
    seed_len: usize,
    #[arg(long = "min-mate-quality", default_value_t = 0)]
    min_mate_quality: i32,
    #[arg(long = "min-fragment-quality", default_value_t = 0)]
    min_fragment_quality: i32,
    #[arg(long = "min-fragment")]
    min_fragment: Option<u32>,
    #[arg(long = "max-fragment")]
    max_fragment: Option<u32>,
    /// Fragment window as median +/- n standard deviations
    #[arg(long = "std-count")]
    std_count: Option<f64>,
    #[arg(long = "confidence-interval", default_value_t = 0.9973)]
    confidence_interval: f64,
    #[arg(long = "min-unique-percent", default_value_t = 10.0)]
    min_unique_pair_percent: f64,
    #[arg(long = "min-consistent-percent", default_value_t = 70.0)]
    min_consistent_pair_percent: f64,
    #[arg(long = "min-samples", default_value_t = 20)]
    min_samples: usize,
    #[arg(long = "quality-offset", default_value_t = 33)]
    quality_offset: u8,
    /// Search unaligned mates of confident orphans inside the fragment window
    #[arg(long)]
    rescue: bool,
    #[arg(long = "max-rescue-mismatches", default_value_t = 4)]
    max_rescue_mismatches: u32,
    /// Output prefix; writes <prefix>_1_export.txt and <prefix>_2_export.txt
    #[arg(short, long, default_value = "out")]
    output: String,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();

    let result = match cli.command {
        Commands::Squash { fasta, output, circular } => run_squash(&fasta, &output, &circular),
        Commands::Align(args) => run_align(args),
        Commands::Pair(args) => run_pair(args),
    };
    if let Err(e) = result {
        eprintln!("[{}] ERROR: {:#}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), e);
        std::process::exit(1);
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).map_err(|e| ElandError::io(path, e))?;
    Ok(BufWriter::new(f))
}

fn run_squash(fastas: &[PathBuf], output: &Path, circular: &[String]) -> Result<()> {
    std::fs::create_dir_all(output).map_err(|e| ElandError::io(output, e))?;
    for path in fastas {
        let mut reader = FastaReader::new(open_input(path)?);
        let mut builder = SquashBuilder::new();
        let mut n_seqs = 0usize;
        while let Some(rec) = reader.next_record()? {
            builder.add_contig(&rec.id, &rec.seq)?;
            n_seqs += 1;
        }
        if n_seqs == 0 {
            anyhow::bail!("FASTA file '{}' contains no sequences", path.display());
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("reference");
        let out_path = output.join(format!("{}{}", file_name, SQUASH_SUFFIX));
        let header = builder
            .save_to_file(&out_path)
            .map_err(|e| anyhow::anyhow!("cannot write squash file '{}': {}", out_path.display(), e))?;
        log::info!("{}: {} contigs, {} bases", out_path.display(), header.contigs.len(), header.total_len);
    }

    let genome = GenomeIndex::open(output)?;
    let mut sizes = GenomeSizes::from_genome(&genome);
    for c in &mut sizes.chromosomes {
        c.is_circular = circular.iter().any(|n| *n == c.file_name || *n == c.contig_name);
    }
    let sizes_path = output.join(GENOME_SIZE_FILE);
    let mut out = create(&sizes_path)?;
    sizes.write(&mut out)?;
    out.flush()?;
    log::info!("genome size file saved: {}", sizes_path.display());
    Ok(())
}

fn run_align(args: AlignArgs) -> Result<()> {
    let mut max_matches = [10u32; 3];
    if args.max_matches.len() != 3 {
        return Err(ElandError::Config(format!("--max-matches needs 3 values, got {}", args.max_matches.len())).into());
    }
    max_matches.copy_from_slice(&args.max_matches);
    let config = AlignConfig {
        oligo_len: args.oligo_len,
        max_matches,
        max_hash_bits: args.max_hash_bits,
        sensitive: args.sensitive,
        single_seed_only: args.single_seed,
        max_multi_hits: args.max_multi_hits,
        seed_deviation: args.seed_deviation,
        max_ns: args.max_ns,
        cache_size: args.cache_size,
        threads: args.threads,
        scratch_dir: args.scratch_dir,
        ..AlignConfig::default()
    };
    config.validate()?;

    let genome = GenomeIndex::open(&args.genome_dir)?;
    log::info!("genome: {} files, {} bases", genome.files.len(), genome.total_len());
    let reads = load_reads(&args.reads)?;
    log::info!("loaded {} reads from {}", reads.len(), args.reads.display());
    let repeats = args.repeats.as_deref().map(|p| load_repeats(p, config.oligo_len)).transpose()?;

    let mut driver = AlignmentDriver::new(&config, &genome, reads, repeats.as_ref())?;
    driver.run()?;
    match &args.out {
        Some(path) => {
            let mut out = create(path)?;
            driver.write_eland_extended(&mut out)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            driver.write_eland_extended(&mut out)?;
        }
    }
    Ok(())
}

fn run_pair(args: PairArgs) -> Result<()> {
    let config = PairConfig {
        seed_len: args.seed_len,
        min_mate_quality: args.min_mate_quality,
        min_fragment_quality: args.min_fragment_quality,
        min_fragment: args.min_fragment,
        max_fragment: args.max_fragment,
        std_count: args.std_count,
        confidence_interval: args.confidence_interval,
        min_unique_pair_percent: args.min_unique_pair_percent,
        min_consistent_pair_percent: args.min_consistent_pair_percent,
        min_samples: args.min_samples,
        quality_offset: args.quality_offset,
        circular: args.circular,
        use_bases: [args.use_bases1, args.use_bases2],
        rescue: args.rescue,
        max_rescue_mismatches: args.max_rescue_mismatches,
    };
    config.validate()?;

    let genome = args.genome_dir.as_deref().map(GenomeIndex::open).transpose()?;
    let sizes_path = args.genome_size.clone().or_else(|| args.genome_dir.as_ref().map(|d| d.join(GENOME_SIZE_FILE)));
    let sizes = match (&sizes_path, &genome) {
        (Some(p), _) if p.exists() || args.genome_size.is_some() => {
            let f = File::open(p).map_err(|e| ElandError::io(p, e))?;
            GenomeSizes::read(BufReader::new(f))?
        }
        (_, Some(g)) => GenomeSizes::from_genome(g),
        _ => return Err(ElandError::Config("either --genome-size or --genome-dir is required".to_string()).into()),
    };
    let circular = CircularReferences::new(sizes, config.circular.clone());

    let inputs = [
        MateInput { eland: args.read1, fastq: args.fastq1 },
        MateInput { eland: args.read2, fastq: args.fastq2 },
    ];
    let strategy = pair::estimate_strategy(&config, &inputs, &circular)?;

    let path1 = PathBuf::from(format!("{}_1_export.txt", args.output));
    let path2 = PathBuf::from(format!("{}_2_export.txt", args.output));
    let mut out1 = create(&path1)?;
    let mut out2 = create(&path2)?;
    pair::resolve_pairs(&config, &inputs, strategy, circular, genome.as_ref(), &mut out1, &mut out2)?;
    out1.flush()?;
    out2.flush()?;
    log::info!("export files saved: {}, {}", path1.display(), path2.display());
    Ok(())
}
