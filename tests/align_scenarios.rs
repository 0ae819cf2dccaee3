use std::io::Cursor;
use std::path::Path;

use eland_rs::align::matches::MatchStatus;
use eland_rs::align::AlignmentDriver;
use eland_rs::config::AlignConfig;
use eland_rs::index::squash::{GenomeIndex, SquashBuilder};
use eland_rs::io::eland::{ElandReader, ElandRecord};
use eland_rs::io::reads::ReadRecord;
use proptest::prelude::*;

fn random_genome(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 62) as usize]
        })
        .collect()
}

fn squash(dir: &Path, name: &str, seq: &[u8]) -> GenomeIndex {
    let mut b = SquashBuilder::new();
    b.add_contig(name, seq).unwrap();
    b.save_to_file(&dir.join(format!("{}.2bpb", name))).unwrap();
    GenomeIndex::open(dir).unwrap()
}

fn align(genome: &GenomeIndex, reads: Vec<ReadRecord>, config: &AlignConfig) -> Vec<ElandRecord> {
    let mut driver = AlignmentDriver::new(config, genome, reads, None).unwrap();
    driver.run().unwrap();
    let mut out = Vec::new();
    driver.write_eland_extended(&mut out).unwrap();
    ElandReader::new(Cursor::new(out)).collect::<anyhow::Result<_>>().unwrap()
}

fn read(name: &str, bases: Vec<u8>) -> ReadRecord {
    ReadRecord { name: name.to_string(), bases, qualities: None }
}

fn substitute(b: u8) -> u8 {
    match b {
        b'A' => b'C',
        b'C' => b'G',
        b'G' => b'T',
        _ => b'A',
    }
}

#[test]
fn exact_read_in_small_contig() {
    let dir = tempfile::tempdir().unwrap();
    let seq = random_genome(100, 7);
    let genome = squash(dir.path(), "contig", &seq);
    let config = AlignConfig { single_seed_only: true, ..AlignConfig::default() };

    let recs = align(&genome, vec![read("r1", seq[50..82].to_vec())], &config);
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].status.to_string(), "1:0:0");
    let hit = &recs[0].hits[0];
    assert_eq!(format!("{}:{}{}{}", hit.reference, hit.position, if hit.reverse { 'R' } else { 'F' }, hit.descriptor), "contig:51F32");
}

#[test]
fn single_n_counts_as_one_error() {
    let dir = tempfile::tempdir().unwrap();
    let seq = random_genome(3000, 11);
    let genome = squash(dir.path(), "chrN", &seq);
    let mut bases = seq[1200..1232].to_vec();
    bases[13] = b'N';
    let recs = align(&genome, vec![read("n", bases)], &AlignConfig::default());
    assert!(matches!(recs[0].status, MatchStatus::Counts([0, 1, _])));
    assert_eq!(recs[0].hits[0].position, 1201);
}

#[test]
fn identical_reads_report_identical_matches() {
    let dir = tempfile::tempdir().unwrap();
    let seq = random_genome(3000, 13);
    let genome = squash(dir.path(), "chrR", &seq);
    let bases = seq[700..732].to_vec();
    let reads = (0..4).map(|i| read(&format!("dup{}", i), bases.clone())).collect();
    let recs = align(&genome, reads, &AlignConfig::default());
    for r in &recs[1..] {
        assert_eq!(r.status, recs[0].status);
        assert_eq!(r.hits, recs[0].hits);
    }
    assert_eq!(recs[0].hits[0].position, 701);
}

#[test]
fn empty_input_gives_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let genome = squash(dir.path(), "chrE", &random_genome(500, 17));
    assert!(align(&genome, Vec::new(), &AlignConfig::default()).is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn substitutions_up_to_two_are_found(
        start in 0usize..1900,
        offsets in proptest::sample::subsequence((0usize..32).collect::<Vec<_>>(), 0..=2),
        reverse in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let seq = random_genome(2000, 23);
        let genome = squash(dir.path(), "chrP", &seq);
        let mut bases = seq[start..start + 32].to_vec();
        for &o in &offsets {
            bases[o] = substitute(bases[o]);
        }
        if reverse {
            bases = eland_rs::util::dna::revcomp(&bases);
        }
        let config = AlignConfig { single_seed_only: true, ..AlignConfig::default() };
        let recs = align(&genome, vec![read("p", bases)], &config);
        let MatchStatus::Counts(r) = recs[0].status else {
            return Err(TestCaseError::fail(format!("read not aligned: {}", recs[0].status)));
        };
        prop_assert!(r[offsets.len()] >= 1);
        prop_assert!(recs[0].hits.iter().any(|h| h.position as usize == start + 1 && h.reverse == reverse));
    }
}
