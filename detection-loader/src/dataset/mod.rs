//! Dataset abstractions and sample types.

mod dataset;
mod record;
mod sampler;

pub use dataset::*;
pub use record::*;
pub use sampler::*;
