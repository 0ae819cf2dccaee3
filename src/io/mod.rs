pub mod eland;
pub mod export;
pub mod fasta;
pub mod fastq;
pub mod genome_size;
pub mod reads;
