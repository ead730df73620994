//! Evaluation data loading for object detection models.
//!
//! A [Dataset](dataset::Dataset) of transformed samples is drawn in sampler
//! order, merged into batches by a collator and, when the prefetcher is
//! enabled, moved to the target device and normalized one batch ahead of the
//! consumer. The entry point is [create_loader](loader::create_loader).

mod common;

pub mod collate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod prefetch;
pub mod profiling;
pub mod stream;
pub mod transform;

pub use collate::{fast_collate, CollateFn, Collator, MAX_NUM_INSTANCES};
pub use config::{InputSize, Interpolation, LoaderConfig};
pub use dataset::{Annotation, Batch, Dataset, Sample, Sampler};
pub use loader::{create_loader, BatchLoader, Loader};
pub use prefetch::PrefetchLoader;
