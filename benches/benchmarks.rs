use criterion::{black_box, criterion_group, criterion_main, Criterion};

use eland_rs::align::sw::{glocal_sw, SwParams};
use eland_rs::align::AlignmentDriver;
use eland_rs::config::AlignConfig;
use eland_rs::index::oligo::Oligo;
use eland_rs::index::score::SuffixScoreTable;
use eland_rs::index::squash::{GenomeIndex, SquashBuilder};
use eland_rs::io::reads::ReadRecord;
use eland_rs::util::dna;

fn make_reference(len: usize) -> Vec<u8> {
    let bases = [b'A', b'C', b'G', b'T'];
    let mut seq = Vec::with_capacity(len);
    let mut x: u32 = 42;
    for _ in 0..len {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        seq.push(bases[(x >> 16) as usize % 4]);
    }
    seq
}

fn bench_oligo_encode(c: &mut Criterion) {
    let reference = make_reference(32);
    c.bench_function("oligo_encode_32bp", |b| {
        b.iter(|| {
            let (o, ns) = Oligo::encode(black_box(&reference));
            black_box((o.reverse_complement(), ns));
        })
    });
}

fn bench_score_table(c: &mut Criterion) {
    c.bench_function("suffix_score_table_8bp", |b| {
        b.iter(|| black_box(SuffixScoreTable::new(black_box(8))))
    });
}

fn bench_glocal_sw(c: &mut Criterion) {
    let reference = make_reference(400);
    let mut read = reference[150..250].to_vec();
    read[50] = dna::complement(read[50]);
    c.bench_function("glocal_sw_100bp_in_400bp", |b| {
        b.iter(|| black_box(glocal_sw(black_box(&read), black_box(&reference), SwParams::default())))
    });
}

fn bench_align_reads(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let reference = make_reference(200_000);
    let mut builder = SquashBuilder::new();
    builder.add_contig("bench", &reference).expect("add contig");
    builder.save_to_file(&dir.path().join("bench.2bpb")).expect("save");
    let genome = GenomeIndex::open(dir.path()).expect("open genome");

    let reads: Vec<ReadRecord> = (0..2_000)
        .map(|i| {
            let start = (i * 97) % (reference.len() - 32);
            let mut bases = reference[start..start + 32].to_vec();
            if i % 3 == 1 {
                bases[7] = dna::complement(bases[7]);
            }
            if i % 2 == 1 {
                bases = dna::revcomp(&bases);
            }
            ReadRecord { name: format!("r{}", i), bases, qualities: None }
        })
        .collect();
    let config = AlignConfig { single_seed_only: true, ..AlignConfig::default() };

    let mut group = c.benchmark_group("align");
    group.sample_size(10);
    group.bench_function("single_seed_2000_reads_200kb", |b| {
        b.iter(|| {
            let mut driver = AlignmentDriver::new(&config, &genome, reads.clone(), None).expect("driver");
            driver.run().expect("run");
            let mut out = Vec::new();
            black_box(driver.write_eland_extended(&mut out).expect("write"));
        })
    });
    group.finish();
}

criterion_group!(benches, bench_oligo_encode, bench_score_table, bench_glocal_sw, bench_align_reads);
criterion_main!(benches);
