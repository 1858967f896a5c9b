//! Configuration management.
//!
//! All runtime tuning knobs (worker count, debug timings, overtrigger
//! tolerance) are explicit fields of [`Settings`], constructed once at
//! startup and passed into the dispatcher and worker-pool constructors.
//! There are no process-wide globals.

use crate::error::{InspectError, InspectResult};
use config::Config;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Hard upper bound on the worker pool size. The pool is fixed for the
/// duration of a run; slot buffers are preallocated up to this count.
pub const MAX_WORKERS: usize = 4;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Log filter passed to the tracing subscriber, e.g. "info" or
    /// "seam_inspect=debug".
    pub log_level: String,

    /// Number of parallel worker threads (1..=MAX_WORKERS).
    pub worker_count: usize,

    /// Extra slack allowed on top of the expected trigger interval before a
    /// frame counts as overtriggered.
    #[serde(with = "humantime_serde")]
    pub overtrigger_tolerance: Duration,

    /// If set, a frame classified `Critical` is pre-emptively skipped to
    /// protect the next one instead of being attempted.
    pub conservative_overtriggering: bool,

    /// Emit per-frame timing results and verbose scheduling logs.
    pub debug_timings: bool,

    /// Run graph workers under the realtime scheduling class during
    /// automatic inspection.
    pub realtime_processing: bool,

    /// Optional CPU cores to pin the worker threads to, one entry per
    /// worker slot. Empty means no pinning.
    pub worker_cpus: Vec<usize>,

    /// Simulation stations replay recorded data; image-number gap and
    /// overtrigger classification are bypassed there.
    pub simulation_station: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            worker_count: 2,
            overtrigger_tolerance: Duration::from_micros(200),
            conservative_overtriggering: false,
            debug_timings: false,
            realtime_processing: false,
            worker_cpus: Vec::new(),
            simulation_station: false,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file, with `SEAM_INSPECT_*` environment
    /// variables taking precedence over file values.
    pub fn load(path: &Path) -> InspectResult<Self> {
        let s = Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("SEAM_INSPECT"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks semantic constraints that parsing alone cannot catch.
    pub fn validate(&self) -> InspectResult<()> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(InspectError::Configuration(format!(
                "worker_count must be in 1..={MAX_WORKERS}, got {}",
                self.worker_count
            )));
        }
        if !self.worker_cpus.is_empty() && self.worker_cpus.len() < self.worker_count {
            return Err(InspectError::Configuration(format!(
                "worker_cpus lists {} cores for {} workers",
                self.worker_cpus.len(),
                self.worker_count
            )));
        }
        if self.overtrigger_tolerance.is_zero() {
            return Err(InspectError::Configuration(
                "overtrigger_tolerance must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inspect.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
worker_count = 4
overtrigger_tolerance = "500us"
conservative_overtriggering = true
"#
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.worker_count, 4);
        assert_eq!(settings.overtrigger_tolerance, Duration::from_micros(500));
        assert!(settings.conservative_overtriggering);
        // untouched fields fall back to defaults
        assert!(!settings.debug_timings);
    }

    #[test]
    fn zero_workers_rejected() {
        let settings = Settings {
            worker_count: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(InspectError::Configuration(_))
        ));
    }

    #[test]
    fn too_many_workers_rejected() {
        let settings = Settings {
            worker_count: MAX_WORKERS + 1,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn short_cpu_list_rejected() {
        let settings = Settings {
            worker_count: 2,
            worker_cpus: vec![3],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
