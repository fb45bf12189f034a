pub mod materials;
pub mod space;
pub mod types;

pub use materials::Substrate;
pub use space::{CategoricalDecoding, FixedSet, NearestIndex, ParameterSpace, Partition};
pub use types::*;
