//! Per-stage timing of the loading pipeline, compiled in with the `profiling` feature.
//!
//! Reports go to the `debug` log level. Set `DETLOADER_PROFILING_WHITELIST` to
//! a comma-separated list of stage names to restrict which stages report.

use crate::common::*;

#[cfg(feature = "profiling")]
use dashmap::DashSet;

#[cfg(feature = "profiling")]
lazy_static! {
    static ref PROFILING_CONFIG: ProfilingConfig = envy::prefixed("DETLOADER_")
        .from_env()
        .unwrap_or_else(|err| {
            warn!("ignore invalid profiling environment variables: {}", err);
            ProfilingConfig::default()
        });
    static ref SEEN_STAGES: DashSet<&'static str> = DashSet::new();
}

/// Selects the pipeline stages that report their timings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub profiling_whitelist: Option<HashSet<String>>,
}

impl ProfilingConfig {
    pub fn is_enabled(&self, stage: &str) -> bool {
        self.profiling_whitelist
            .as_ref()
            .map_or(true, |whitelist| whitelist.contains(stage))
    }
}

/// Elapsed time between the checkpoints of one pipeline stage run.
#[cfg(feature = "profiling")]
#[derive(Debug)]
pub struct Timing {
    stage: &'static str,
    start: Instant,
    last: Instant,
    steps: Vec<(&'static str, Duration)>,
}

#[cfg(not(feature = "profiling"))]
#[derive(Debug)]
pub struct Timing;

impl Timing {
    pub fn new(stage: &'static str) -> Self {
        #[cfg(feature = "profiling")]
        {
            if SEEN_STAGES.insert(stage) {
                debug!("timing stage '{}'", stage);
            }

            let now = Instant::now();
            Self {
                stage,
                start: now,
                last: now,
                steps: vec![],
            }
        }

        #[cfg(not(feature = "profiling"))]
        {
            let _ = stage;
            Self
        }
    }

    /// Close the current step under `step`.
    pub fn set_record(&mut self, step: &'static str) {
        #[cfg(feature = "profiling")]
        {
            let now = Instant::now();
            self.steps.push((step, now - self.last));
            self.last = now;
        }

        #[cfg(not(feature = "profiling"))]
        let _ = step;
    }

    pub fn report(&self) {
        #[cfg(feature = "profiling")]
        {
            if PROFILING_CONFIG.is_enabled(self.stage) {
                debug!("{}", self.summary());
            }
        }
    }

    #[cfg(feature = "profiling")]
    fn summary(&self) -> String {
        let steps = self
            .steps
            .iter()
            .map(|(step, elapsed)| format!("{} {:?}", step, elapsed))
            .join(", ");
        format!(
            "{}: {} (total {:?})",
            self.stage,
            steps,
            self.last - self.start
        )
    }
}
