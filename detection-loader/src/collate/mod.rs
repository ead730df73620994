//! Merging samples into batches.

mod collator;
mod default_collate;
mod schema;

pub use collator::*;
pub use default_collate::*;
pub use schema::*;

use crate::{
    common::*,
    dataset::{Batch, Sample},
};

/// The collation policy of a data loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateFn {
    /// Pad variable-length annotations with [Collator].
    Fast(Collator),
    /// Stack values as they are with [default_collate].
    Default,
}

impl CollateFn {
    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        match self {
            Self::Fast(collator) => collator.collate(samples),
            Self::Default => default_collate(samples),
        }
    }
}
