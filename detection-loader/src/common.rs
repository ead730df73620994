pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use approx::{abs_diff_eq, assert_abs_diff_eq};
pub use derivative::Derivative;
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::{izip, Itertools as _};
pub use lazy_static::lazy_static;
pub use log::{debug, error, info, warn};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use serde::{Deserialize, Deserializer, Serialize, Serializer};
pub use std::{
    borrow::Borrow,
    collections::HashSet,
    fmt,
    fmt::Debug,
    iter,
    mem,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
pub use tch::{Device, IndexOp, Kind, Tensor};

pub type Fallible<T> = Result<T, Error>;
