//! The graph-execution boundary.
//!
//! Filter graphs (segmentation, geometry fitting, pore classification, ...)
//! are external collaborators. The core only needs three things from a
//! graph: which sensors it consumes, an opaque synchronous `run` over one
//! frame, and the results/overlays that come out. Workers run the active
//! graph concurrently on different frames, so implementations must be
//! `Sync`; any per-run state belongs in the [`ExecutionContext`].

use crate::frame::{ImageFrame, OverlayCanvas, SampleFrame};
use crate::results::InspectionResult;
use crate::trigger::ImageContext;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Sensor ids a graph consumes, split by channel kind. Computed once per
/// graph activation, not per frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorRequirements {
    pub image_sensors: BTreeSet<i32>,
    pub sample_sensors: BTreeSet<i32>,
}

impl SensorRequirements {
    pub fn image_only(sensor_id: i32) -> Self {
        Self {
            image_sensors: BTreeSet::from([sensor_id]),
            sample_sensors: BTreeSet::new(),
        }
    }

    pub fn with_samples(sensor_id: i32, sample_sensors: impl IntoIterator<Item = i32>) -> Self {
        Self {
            image_sensors: BTreeSet::from([sensor_id]),
            sample_sensors: sample_sensors.into_iter().collect(),
        }
    }

    /// A graph driven purely by scalar sensor channels, no camera.
    pub fn samples_only(sample_sensors: impl IntoIterator<Item = i32>) -> Self {
        Self {
            image_sensors: BTreeSet::new(),
            sample_sensors: sample_sensors.into_iter().collect(),
        }
    }
}

/// Everything one graph run may read or paint into.
pub struct ExecutionContext<'a> {
    pub context: ImageContext,
    /// The image for this trigger; `None` for sample-only graphs.
    pub image: Option<&'a ImageFrame>,
    /// Sensor id the image was acquired from; `None` for sample-only
    /// frames.
    pub image_sensor_id: Option<i32>,
    /// One sample per required sample sensor, keyed by sensor id.
    pub samples: &'a HashMap<i32, SampleFrame>,
    pub canvas: &'a mut OverlayCanvas,
}

/// What came out of one graph run.
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub results: Vec<InspectionResult>,
}

/// One processing graph, executed synchronously inside a worker thread.
/// Possibly slow; the dispatcher's backpressure is built around that.
pub trait GraphExecutor: Send + Sync {
    fn id(&self) -> Uuid;

    fn requirements(&self) -> SensorRequirements;

    fn run(&self, ctx: ExecutionContext<'_>) -> ExecutionOutcome;
}

/// Test/demo graph with a configurable run time. Records which image
/// numbers it executed so tests can assert scheduling decisions without
/// touching real filters.
pub struct MockGraph {
    id: Uuid,
    requirements: SensorRequirements,
    run_time: Duration,
    executed: Mutex<Vec<i32>>,
    image_sensors_seen: Mutex<Vec<i32>>,
}

impl MockGraph {
    pub fn new(requirements: SensorRequirements) -> Self {
        Self {
            id: Uuid::new_v4(),
            requirements,
            run_time: Duration::ZERO,
            executed: Mutex::new(Vec::new()),
            image_sensors_seen: Mutex::new(Vec::new()),
        }
    }

    /// Makes every run block for `run_time`, simulating a slow graph.
    pub fn with_run_time(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }

    /// Image numbers in execution order.
    pub fn executed(&self) -> Vec<i32> {
        self.executed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sensor ids of the images seen, in execution order.
    pub fn image_sensors_seen(&self) -> Vec<i32> {
        self.image_sensors_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl GraphExecutor for MockGraph {
    fn id(&self) -> Uuid {
        self.id
    }

    fn requirements(&self) -> SensorRequirements {
        self.requirements.clone()
    }

    fn run(&self, ctx: ExecutionContext<'_>) -> ExecutionOutcome {
        if !self.run_time.is_zero() {
            std::thread::sleep(self.run_time);
        }
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ctx.context.image_number);
        if let Some(sensor_id) = ctx.image_sensor_id {
            self.image_sensors_seen
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(sensor_id);
        }

        ExecutionOutcome {
            results: vec![InspectionResult::scalar(
                crate::results::ResultType::AnalysisOk,
                ctx.context,
                f64::from(ctx.context.image_number),
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::OverlayCanvas;

    #[test]
    fn mock_graph_records_executions() {
        let graph = MockGraph::new(SensorRequirements::image_only(1));
        let samples = HashMap::new();
        let mut canvas = OverlayCanvas::default();
        let ctx = ExecutionContext {
            context: ImageContext {
                image_number: 5,
                ..Default::default()
            },
            image: None,
            image_sensor_id: None,
            samples: &samples,
            canvas: &mut canvas,
        };
        let outcome = graph.run(ctx);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(graph.executed(), vec![5]);
    }

    #[test]
    fn requirements_distinguish_channels() {
        let req = SensorRequirements::with_samples(1, [20, 21]);
        assert!(req.image_sensors.contains(&1));
        assert_eq!(req.sample_sensors.len(), 2);
        assert!(SensorRequirements::image_only(1).sample_sensors.is_empty());
        assert!(SensorRequirements::samples_only([20]).image_sensors.is_empty());
    }
}
