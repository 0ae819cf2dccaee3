//! # eland-rs
//!
//! ELAND 风格的短 read 比对器与双端片段解析器。
//!
//! 本 crate 包括两部分：
//!
//! - **比对**：read 切成 oligo 后按 A/B/C/D 四段划分，三个 pass × 两个方向建立分区哈希表，
//!   一遍扫描参考即可找到全部至多 2 个错配的位置；单种子阶段未比对上的 read 再以
//!   4 个种子重新扫描，由多种子状态机拼出整条 read 的候选
//! - **片段解析**：从两个 mate 的 ELAND 扩展结果中估计片段长度分布与文库方向，
//!   对每一对 read 的候选组合评分，给出片段比对质量
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use eland_rs::align::AlignmentDriver;
//! use eland_rs::config::AlignConfig;
//! use eland_rs::index::squash::GenomeIndex;
//! use eland_rs::io::reads::load_reads;
//! use std::path::Path;
//!
//! let config = AlignConfig::default();
//! let genome = GenomeIndex::open(Path::new("genome_dir"))?;
//! let reads = load_reads(Path::new("reads.fastq"))?;
//!
//! let mut driver = AlignmentDriver::new(&config, &genome, reads, None)?;
//! driver.run()?;
//! let summary = driver.write_eland_extended(&mut std::io::stdout().lock())?;
//! println!("{} unique", summary.unique);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA / FASTQ、ELAND 扩展格式、export 格式、genome size XML
//! - [`index`] — oligo 编码、分区方案、哈希表与压缩参考
//! - [`align`] — 基因组扫描、匹配计数、多种子合并与延伸
//! - [`pair`] — 片段长度估计、比对质量与片段解析
//! - [`config`] / [`error`] — 运行参数与错误类型
//! - [`util`] — DNA 编码 / 反向互补等工具函数

pub mod align;
pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod pair;
pub mod util;
