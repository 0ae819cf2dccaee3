pub mod descriptor;
pub mod driver;
pub mod extend;
pub mod matches;
pub mod multiseed;
pub mod scan;
pub mod spill;
pub mod sw;

pub use driver::{AlignSummary, AlignmentDriver, Stage};
