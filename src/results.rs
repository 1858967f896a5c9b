//! Result types and the proxies the core dispatches into.
//!
//! The dispatcher never interprets inspection results itself; it routes them
//! first through the sum-error handling collaborator ([`ResultHandler`]) and
//! then to the result proxy ([`ResultProxy`]). Delivery order across results
//! is not guaranteed to match trigger order, since workers complete
//! independently, which is why every result carries its own [`ImageContext`].

use crate::frame::{Image, OverlayCanvas};
use crate::trigger::ImageContext;
use std::sync::Mutex;

/// Discriminates the results the core itself emits, next to whatever typed
/// results the active graph produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    /// Ordinary analysis result produced by a graph filter.
    AnalysisOk,
    /// Numeric encoding of the per-frame processing mode
    /// (0 = Normal .. 3 = OutOfOrderImage).
    ImageProcessingMode,
    /// Last measured graph processing time, debug-timings only.
    ProcessTime,
    /// Last measured dispatcher time, debug-timings only.
    DispatcherTime,
}

/// A typed scalar/array result tagged with an NIO flag and image context.
#[derive(Debug, Clone)]
pub struct InspectionResult {
    pub result_type: ResultType,
    pub context: ImageContext,
    pub values: Vec<f64>,
    /// "Not in order": the industrial-QA failure flag.
    pub nio: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InspectionResult {
    pub fn new(result_type: ResultType, context: ImageContext, values: Vec<f64>, nio: bool) -> Self {
        Self {
            result_type,
            context,
            values,
            nio,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Scalar convenience constructor.
    pub fn scalar(result_type: ResultType, context: ImageContext, value: f64) -> Self {
        Self::new(result_type, context, vec![value], false)
    }
}

/// Sum-error / result-handling collaborator. Sees every result before the
/// proxy does, so NIO aggregation can act on synthetic mode results too.
pub trait ResultHandler: Send + Sync {
    fn send_result(&self, result: &InspectionResult);
}

/// Forwards results downstream (host, fieldbus, plotter).
pub trait ResultProxy: Send + Sync {
    fn result(&self, result: InspectionResult);
}

/// Receives image and overlay for the GUI. Skipped for frames the graph
/// never ran on.
pub trait RecorderProxy: Send + Sync {
    fn frame_processed(&self, context: ImageContext, image: &Image, canvas: &OverlayCanvas);
}

/// Periodic state snapshot for the GUI side.
#[derive(Debug, Clone, Default)]
pub struct ProductInfo {
    pub product_name: String,
    pub seam_series: i32,
    pub seam: i32,
    pub seam_label: String,
    /// Rolling average graph processing time in microseconds.
    pub processing_time_us: u64,
}

/// Publishes inspection state to the GUI.
pub trait SystemStatusProxy: Send + Sync {
    fn signal_product_info(&self, info: ProductInfo);
}

/// Video recorder boundary; receives seam start/end markers so recordings
/// line up with the seam structure.
pub trait VideoRecorderProxy: Send + Sync {
    fn seam_start(&self, seam_series: i32, seam: i32, label: &str);
    fn seam_end(&self);
}

/// No-op proxies for tests and for stations without a GUI attached.
#[derive(Debug, Default)]
pub struct NullProxies;

impl ResultHandler for NullProxies {
    fn send_result(&self, _result: &InspectionResult) {}
}

impl ResultProxy for NullProxies {
    fn result(&self, _result: InspectionResult) {}
}

impl RecorderProxy for NullProxies {
    fn frame_processed(&self, _context: ImageContext, _image: &Image, _canvas: &OverlayCanvas) {}
}

impl SystemStatusProxy for NullProxies {
    fn signal_product_info(&self, _info: ProductInfo) {}
}

impl VideoRecorderProxy for NullProxies {
    fn seam_start(&self, _seam_series: i32, _seam: i32, _label: &str) {}
    fn seam_end(&self) {}
}

/// Collects everything it receives; the workhorse of the dispatcher tests.
#[derive(Debug, Default)]
pub struct CollectingProxy {
    results: Mutex<Vec<InspectionResult>>,
    recorded_frames: Mutex<Vec<ImageContext>>,
    seam_starts: Mutex<Vec<String>>,
}

impl CollectingProxy {
    pub fn results(&self) -> Vec<InspectionResult> {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn recorded_frames(&self) -> Vec<ImageContext> {
        self.recorded_frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Labels passed to `seam_start`, in call order.
    pub fn seam_start_labels(&self) -> Vec<String> {
        self.seam_starts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Mode values (0..=3) of the synthetic processing-mode results, in
    /// delivery order.
    pub fn mode_values(&self) -> Vec<f64> {
        self.results()
            .iter()
            .filter(|r| r.result_type == ResultType::ImageProcessingMode)
            .filter_map(|r| r.values.first().copied())
            .collect()
    }
}

impl ResultHandler for CollectingProxy {
    fn send_result(&self, _result: &InspectionResult) {}
}

impl ResultProxy for CollectingProxy {
    fn result(&self, result: InspectionResult) {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }
}

impl RecorderProxy for CollectingProxy {
    fn frame_processed(&self, context: ImageContext, _image: &Image, _canvas: &OverlayCanvas) {
        self.recorded_frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(context);
    }
}

impl SystemStatusProxy for CollectingProxy {
    fn signal_product_info(&self, _info: ProductInfo) {}
}

impl VideoRecorderProxy for CollectingProxy {
    fn seam_start(&self, _seam_series: i32, _seam: i32, label: &str) {
        self.seam_starts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(label.to_string());
    }
    fn seam_end(&self) {}
}
