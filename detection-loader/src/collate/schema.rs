use crate::{
    common::*,
    dataset::{Annotation, Sample},
    error::CollateError,
};

/// The collated layout of one annotation field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    ScalarFloat,
    ScalarInt,
    FixedArray { shape: Vec<i64> },
    VariableArray { instance_shape: Vec<i64> },
}

impl FieldKind {
    pub fn of(value: &Annotation) -> Self {
        match value {
            Annotation::Float(_) => Self::ScalarFloat,
            Annotation::Int(_) => Self::ScalarInt,
            Annotation::Fixed(tensor) | Annotation::Instances(tensor) if tensor.dim() == 0 => {
                Self::ScalarFloat
            }
            Annotation::Fixed(tensor) => Self::FixedArray {
                shape: tensor.size(),
            },
            Annotation::Instances(tensor) => Self::VariableArray {
                instance_shape: tensor.size()[1..].to_vec(),
            },
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::VariableArray { .. })
    }

    /// The shape of the padded output tensor.
    pub fn output_shape(&self, batch_size: i64, max_instances: i64) -> Vec<i64> {
        match self {
            Self::ScalarFloat | Self::ScalarInt => vec![batch_size],
            Self::FixedArray { shape } => iter::once(batch_size).chain(shape.iter().cloned()).collect(),
            Self::VariableArray { instance_shape } => [batch_size, max_instances]
                .iter()
                .chain(instance_shape)
                .cloned()
                .collect(),
        }
    }

    pub fn output_kind(&self) -> Kind {
        match self {
            Self::ScalarInt => Kind::Int64,
            _ => Kind::Float,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScalarFloat => write!(f, "float scalar"),
            Self::ScalarInt => write!(f, "integer scalar"),
            Self::FixedArray { shape } => write!(f, "fixed array of shape {:?}", shape),
            Self::VariableArray { instance_shape } => {
                write!(f, "instance array of per-instance shape {:?}", instance_shape)
            }
        }
    }
}

/// The image shape and annotation layout shared by every sample of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSchema {
    image_shape: Vec<i64>,
    fields: IndexMap<String, FieldKind>,
}

impl BatchSchema {
    /// Derive the schema from a reference sample.
    pub fn infer(sample: &Sample) -> Self {
        let fields = sample
            .annotations
            .iter()
            .map(|(name, value)| (name.clone(), FieldKind::of(value)))
            .collect();

        Self {
            image_shape: sample.image.size(),
            fields,
        }
    }

    pub fn image_shape(&self) -> &[i64] {
        &self.image_shape
    }

    pub fn fields(&self) -> &IndexMap<String, FieldKind> {
        &self.fields
    }

    /// Check that the sample at position `index` conforms to the schema.
    pub fn validate(&self, index: usize, sample: &Sample) -> Result<(), CollateError> {
        let image_shape = sample.image.size();
        let image_kind = sample.image.kind();
        if image_shape != self.image_shape || image_kind != Kind::Uint8 {
            return Err(CollateError::ImageShapeMismatch {
                index,
                expected: self.image_shape.clone(),
                found: image_shape,
                found_kind: image_kind,
            });
        }

        let mismatch = |field: &str, expected: String, found: String| CollateError::SchemaMismatch {
            index,
            field: field.to_owned(),
            expected,
            found,
        };

        for (name, expected) in &self.fields {
            let found = sample
                .annotations
                .get(name)
                .map(FieldKind::of)
                .ok_or_else(|| mismatch(name, expected.to_string(), "missing field".into()))?;

            if &found != expected {
                return Err(mismatch(name, expected.to_string(), found.to_string()));
            }
        }

        if let Some(extra) = sample
            .annotations
            .keys()
            .find(|name| !self.fields.contains_key(name.as_str()))
        {
            return Err(mismatch(extra, "no such field".into(), "unexpected field".into()));
        }

        Ok(())
    }
}
