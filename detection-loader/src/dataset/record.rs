use crate::common::*;

/// A per-sample annotation value.
#[derive(Debug)]
pub enum Annotation {
    /// A float scalar, collated into a `[batch]` float tensor.
    Float(f64),
    /// An integer scalar such as an image id, collated into a `[batch]` int64 tensor.
    Int(i64),
    /// A numeric value of the same shape on every sample, such as the original image size.
    Fixed(Tensor),
    /// A variable number of instances along the first dimension, such as boxes or classes.
    Instances(Tensor),
}

impl Annotation {
    pub fn shallow_clone(&self) -> Self {
        match self {
            Self::Float(value) => Self::Float(*value),
            Self::Int(value) => Self::Int(*value),
            Self::Fixed(tensor) => Self::Fixed(tensor.shallow_clone()),
            Self::Instances(tensor) => Self::Instances(tensor.shallow_clone()),
        }
    }
}

impl From<f64> for Annotation {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Annotation {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<i64> for Annotation {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Annotation {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

/// One dataset element: an image and its annotation map.
#[derive(Debug)]
pub struct Sample {
    /// The image in `[channels, height, width]` layout with `Uint8` kind.
    pub image: Tensor,
    pub annotations: IndexMap<String, Annotation>,
}

impl Sample {
    pub fn new(image: Tensor) -> Self {
        Self {
            image,
            annotations: IndexMap::new(),
        }
    }

    pub fn with_annotation(mut self, name: impl Into<String>, value: impl Into<Annotation>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    pub fn shallow_clone(&self) -> Self {
        Self {
            image: self.image.shallow_clone(),
            annotations: self
                .annotations
                .iter()
                .map(|(name, value)| (name.clone(), value.shallow_clone()))
                .collect(),
        }
    }
}

/// A group of samples stacked into dense tensors.
#[derive(Debug)]
pub struct Batch {
    /// Images in `[batch, channels, height, width]` layout.
    ///
    /// It has `Uint8` kind on host and `Float` kind after device normalization.
    pub images: Tensor,
    /// Annotation field name to the collated tensor.
    pub annotations: IndexMap<String, Tensor>,
    /// Number of valid leading instances per sample for each variable-length field.
    ///
    /// Padded instance slots are zero, so a consumer can tell padding apart
    /// from zero-valued instances only through these counts.
    pub num_instances: IndexMap<String, Tensor>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.images.size().first().cloned().unwrap_or(0) as usize
    }

    pub fn device(&self) -> Device {
        self.images.device()
    }

    /// Apply a fallible tensor mapping to every tensor in the batch.
    pub fn try_map_tensors<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(Tensor) -> Result<Tensor>,
    {
        let Self {
            images,
            annotations,
            num_instances,
        } = self;

        let images = f(images)?;
        let annotations: IndexMap<_, _> = annotations
            .into_iter()
            .map(|(name, tensor)| Fallible::Ok((name, f(tensor)?)))
            .collect::<Result<_>>()?;
        let num_instances: IndexMap<_, _> = num_instances
            .into_iter()
            .map(|(name, tensor)| Fallible::Ok((name, f(tensor)?)))
            .collect::<Result<_>>()?;

        Ok(Self {
            images,
            annotations,
            num_instances,
        })
    }

    /// Copy the batch into page-locked host memory.
    ///
    /// It is a no-op if CUDA is not available.
    pub fn pin_memory(self) -> Result<Self> {
        if !tch::Cuda::is_available() {
            return Ok(self);
        }
        self.try_map_tensors(|tensor| Ok(tensor.f_pin_memory(Device::Cuda(0))?))
    }
}
