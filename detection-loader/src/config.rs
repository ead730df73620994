//! Loader configuration format.

use crate::{collate::MAX_NUM_INSTANCES, common::*, error::LoaderError};

pub const IMAGENET_DEFAULT_MEAN: [f64; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_DEFAULT_STD: [f64; 3] = [0.229, 0.224, 0.225];

/// The loader construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// The input image size. Only the last two dimensions are used.
    pub input_size: InputSize,
    pub batch_size: NonZeroUsize,
    /// Request the training data path, which is not supported.
    #[serde(default)]
    pub is_training: bool,
    /// If set, batches are padded by the fast collator and normalized on device.
    /// Otherwise plain stacked host batches are produced.
    #[serde(default = "default_true")]
    pub use_prefetcher: bool,
    /// Passed to the transform builder.
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Per-channel mean in `[0, 1]` range.
    #[serde(default = "default_mean")]
    pub mean: [R64; 3],
    /// Per-channel standard deviation in `[0, 1]` range.
    #[serde(default = "default_std")]
    pub std: [R64; 3],
    /// Number of sample loading threads. Zero loads on the iterating thread.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// If set, host batches are copied to page-locked memory.
    #[serde(default)]
    pub pin_memory: bool,
    /// The device where prefetched batches are delivered.
    #[serde(with = "tch_serde::serde_device", default = "default_device")]
    pub device: Device,
    /// Convert prefetched images to half precision.
    #[serde(default)]
    pub fp16: bool,
    /// The capacity of the padded instance dimension.
    #[serde(default = "default_max_instances")]
    pub max_instances: NonZeroUsize,
    /// Drop the trailing incomplete batch.
    #[serde(default)]
    pub drop_last: bool,
}

impl LoaderConfig {
    pub fn new(input_size: InputSize, batch_size: NonZeroUsize) -> Self {
        Self {
            input_size,
            batch_size,
            is_training: false,
            use_prefetcher: default_true(),
            interpolation: Default::default(),
            mean: default_mean(),
            std: default_std(),
            num_workers: default_num_workers(),
            pin_memory: false,
            device: default_device(),
            fp16: false,
            max_instances: default_max_instances(),
            drop_last: false,
        }
    }

    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Self = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn mean(&self) -> [f64; 3] {
        self.mean.map(|value| value.raw())
    }

    pub fn std(&self) -> [f64; 3] {
        self.std.map(|value| value.raw())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.input_size.image_size()?;
        ensure!(
            self.std.iter().all(|value| value.raw() > 0.0),
            LoaderError::InvalidConfig {
                reason: format!("std values must be positive, but get {:?}", self.std())
            }
        );
        Ok(())
    }
}

/// The input size given either as a square side or as a shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSize {
    Square(NonZeroUsize),
    Shape(Vec<NonZeroUsize>),
}

impl InputSize {
    /// The `[height, width]` pair.
    pub fn image_size(&self) -> Result<[usize; 2]> {
        let size = match self {
            Self::Square(side) => [side.get(), side.get()],
            Self::Shape(shape) => match *shape.as_slice() {
                [.., height, width] => [height.get(), width.get()],
                _ => {
                    return Err(LoaderError::InvalidConfig {
                        reason: format!(
                            "input size must have at least two dimensions, but get {:?}",
                            shape
                        ),
                    }
                    .into())
                }
            },
        };
        Ok(size)
    }
}

/// Image interpolation policy name passed to the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Random,
}

impl Default for Interpolation {
    fn default() -> Self {
        Self::Bilinear
    }
}

fn default_true() -> bool {
    true
}

fn default_mean() -> [R64; 3] {
    IMAGENET_DEFAULT_MEAN.map(r64)
}

fn default_std() -> [R64; 3] {
    IMAGENET_DEFAULT_STD.map(r64)
}

fn default_num_workers() -> usize {
    1
}

fn default_device() -> Device {
    Device::Cpu
}

fn default_max_instances() -> NonZeroUsize {
    NonZeroUsize::new(MAX_NUM_INSTANCES).unwrap()
}
