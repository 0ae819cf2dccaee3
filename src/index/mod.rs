pub mod hash;
pub mod oligo;
pub mod partition;
pub mod record;
pub mod score;
pub mod squash;
