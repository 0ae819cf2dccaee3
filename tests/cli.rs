use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use eland_rs::util::dna;

fn eland_rs(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_eland-rs")).args(args).current_dir(cwd).output().expect("spawn eland-rs")
}

fn random_genome(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            b"ACGT"[(x >> 11) as usize & 3]
        })
        .collect()
}

fn fastq(name: &str, seq: &[u8]) -> String {
    format!("@{}\n{}\n+\n{}\n", name, String::from_utf8_lossy(seq), "I".repeat(seq.len()))
}

#[test]
fn squash_align_pair_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let genome = random_genome(20_000);
    fs::write(root.join("ref.fa"), format!(">chr1\n{}\n", String::from_utf8_lossy(&genome))).unwrap();

    let (mut r1, mut r2) = (String::new(), String::new());
    for i in 0..40usize {
        let start = 200 + i * 450;
        let len = 200 + (i % 9) * 5;
        let m1 = &genome[start..start + 32];
        let m2 = dna::revcomp(&genome[start + len - 32..start + len]);
        r1.push_str(&fastq(&format!("frag{}/1", i), m1));
        r2.push_str(&fastq(&format!("frag{}/2", i), &m2));
    }
    fs::write(root.join("r1.fq"), r1).unwrap();
    fs::write(root.join("r2.fq"), r2).unwrap();

    let out = eland_rs(&["squash", "ref.fa", "-o", "genome"], root);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(root.join("genome/ref.fa.2bpb").exists());
    let xml = fs::read_to_string(root.join("genome/sequenceSizes.xml")).unwrap();
    assert!(xml.contains("totalBases=\"20000\""));

    for k in ["1", "2"] {
        let reads = format!("r{}.fq", k);
        let eland = format!("r{}.eland", k);
        let out = eland_rs(&["align", "-g", "genome", &reads, "-o", &eland], root);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    }
    let eland1 = fs::read_to_string(root.join("r1.eland")).unwrap();
    let first = eland1.lines().next().unwrap();
    assert!(first.ends_with("\t1:0:0\tref.fa:201F32"), "{}", first);

    let out = eland_rs(
        &[
            "pair", "--read1", "r1.eland", "--read2", "r2.eland", "--fastq1", "r1.fq", "--fastq2", "r2.fq",
            "--genome-dir", "genome", "-o", "s",
        ],
        root,
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let export1 = fs::read_to_string(root.join("s_1_export.txt")).unwrap();
    let export2 = fs::read_to_string(root.join("s_2_export.txt")).unwrap();
    assert_eq!(export1.lines().count(), 40);
    assert_eq!(export2.lines().count(), 40);

    let mut resolved = 0;
    for line in export1.lines() {
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 22);
        assert_eq!(cols[9], "I".repeat(32));
        if cols[20].parse::<i32>().is_ok_and(|q| q > 0) {
            resolved += 1;
        }
    }
    assert_eq!(resolved, 40);
    let first: Vec<&str> = export1.lines().next().unwrap().split('\t').collect();
    assert_eq!(first[18], (200 - 32).to_string());
}

#[test]
fn missing_input_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let out = eland_rs(&["pair", "--read1", "nope_1.txt", "--read2", "nope_2.txt", "--genome-size", "nope.xml"], dir.path());
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("ERROR"));

    let out = eland_rs(&["align", "-g", "genome", "reads.fq", "--oligo-length", "abc"], dir.path());
    assert!(!out.status.success());
}
