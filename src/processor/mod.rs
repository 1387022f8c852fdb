pub mod consolidator;
pub mod normalizer;
pub mod pricing;
pub mod vocab;

pub use consolidator::*;
pub use normalizer::*;
pub use vocab::{size_rank, sizes_for_age};
