//! The dispatcher: routes incoming sensor data through the active graph.
//!
//! [`InspectManager`] is the single authority that decides, for each
//! incoming image or sample callback, whether and how to execute the active
//! processing graph. It classifies every frame with a [`ProcessingMode`],
//! selects the worker slot `image_number % worker_count`, assembles the
//! execution context from the slot's reusable buffers and hands it to the
//! slot's [`ProcessingThread`] with a deadline of one trigger interval.
//!
//! All dispatch state lives behind one mutex, so the sensor driver may
//! deliver from any thread it likes; delivery is serialized here. The two
//! exceptions are the [`InspectTimer`] accumulators (own mutex) and the
//! joined-frames counter (atomic), both fed from worker completion paths.
//!
//! Lifecycle: `change_product` → `activate_seam_series` → `start_inspect`
//! → frames → `stop_inspect`. Stopping joins every worker before any seam
//! state is torn down; that barrier is what makes the non-owning active
//! graph reference sound.

use crate::config::Settings;
use crate::error::{InspectError, InspectResult};
use crate::frame::{Image, ImageFrame, OverlayCanvas, Sample, SampleFrame};
use crate::graph::{ExecutionContext, GraphExecutor};
use crate::product::Product;
use crate::results::{
    InspectionResult, ProductInfo, RecorderProxy, ResultHandler, ResultProxy, ResultType,
    SystemStatusProxy, VideoRecorderProxy,
};
use crate::sync::{FrameSyncQueues, PendingFrame};
use crate::timer::{InspectTimer, OvertriggeringResult};
use crate::trigger::{ImageContext, TriggerContext};
use crate::worker::{ProcessingThread, Work};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How a frame is handled, decided once before scheduling and never
/// reassigned after a worker has started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Normal processing.
    #[default]
    Normal,
    /// Trigger load exceeded the processing budget; the graph is skipped.
    Overtriggered,
    /// A gap in the trigger numbering; placeholder bookkeeping only.
    MissingImage,
    /// Image number at or behind the last processed one; discarded.
    OutOfOrderImage,
}

impl ProcessingMode {
    /// Numeric encoding used in the synthetic per-frame result.
    pub fn result_value(self) -> f64 {
        match self {
            ProcessingMode::Normal => 0.0,
            ProcessingMode::Overtriggered => 1.0,
            ProcessingMode::MissingImage => 2.0,
            ProcessingMode::OutOfOrderImage => 3.0,
        }
    }
}

/// The external receivers the dispatcher feeds.
#[derive(Clone)]
pub struct Proxies {
    /// Sum-error handling; sees every result before the result proxy.
    pub result_handler: Arc<dyn ResultHandler>,
    pub result_proxy: Arc<dyn ResultProxy>,
    pub recorder: Arc<dyn RecorderProxy>,
    pub system_status: Arc<dyn SystemStatusProxy>,
    pub video_recorder: Arc<dyn VideoRecorderProxy>,
}

impl Proxies {
    /// All-null proxies for tests and headless runs.
    pub fn null() -> Self {
        let null = Arc::new(crate::results::NullProxies);
        Self {
            result_handler: null.clone(),
            result_proxy: null.clone(),
            recorder: null.clone(),
            system_status: null.clone(),
            video_recorder: null,
        }
    }
}

/// Reusable per-slot buffers. At most one work item is in flight per slot;
/// a submission to a busy slot is rejected, never queued.
struct WorkerSlot {
    image: Option<ImageFrame>,
    image_sensor_id: Option<i32>,
    samples: HashMap<i32, SampleFrame>,
    trigger: TriggerContext,
    mode: ProcessingMode,
    canvas: Arc<Mutex<OverlayCanvas>>,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            image: None,
            image_sensor_id: None,
            samples: HashMap::new(),
            trigger: TriggerContext::default(),
            mode: ProcessingMode::Normal,
            canvas: Arc::new(Mutex::new(OverlayCanvas::default())),
        }
    }
}

/// The currently armed inspection target. Indices into the active product
/// instead of raw pointers; all cleared together on `stop_inspect`.
#[derive(Clone)]
struct ActiveInspection {
    series_idx: usize,
    seam_idx: usize,
    interval_idx: usize,
    series_number: i32,
    seam_number: i32,
    seam_label: String,
    graph: Arc<dyn GraphExecutor>,
    graph_needs_image: bool,
    trigger_interval: Duration,
    trigger_delta_um: i64,
}

struct DispatchState {
    product: Option<Arc<Product>>,
    active_series: Option<usize>,
    active: Option<ActiveInspection>,
    queues: FrameSyncQueues,
    slots: Vec<WorkerSlot>,
    current_pos_um: i64,
    last_processed_image: i32,
    last_skipped_image: i32,
    nb_seam_signaled: usize,
    images_skipped_from_sensor: usize,
    images_skipped_in_inspection: usize,
    trigger_cycle: u32,
}

/// Per-seam counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InspectionCounters {
    /// How often graph processing was invoked this seam.
    pub signaled: usize,
    /// How often graph processing finished this seam.
    pub joined: usize,
    pub skipped_from_sensor: usize,
    pub skipped_in_inspection: usize,
    pub last_processed_image: i32,
}

/// Manages inspection of image and sample data by means of processing
/// graphs respecting the product structure, and dispatches results to the
/// configured receivers.
pub struct InspectManager {
    settings: Settings,
    timer: Arc<InspectTimer>,
    workers: Vec<ProcessingThread>,
    nb_seam_joined: Arc<AtomicUsize>,
    proxies: Proxies,
    state: Mutex<DispatchState>,
}

impl InspectManager {
    /// Spawns the fixed worker pool and wires the completion callbacks.
    pub fn new(settings: Settings, proxies: Proxies) -> InspectResult<Self> {
        settings.validate()?;

        let nb_seam_joined = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(settings.worker_count);
        for index in 0..settings.worker_count {
            let worker = ProcessingThread::spawn(index)?;
            let joined = Arc::clone(&nb_seam_joined);
            worker.set_work_done_callback(Box::new(move || {
                joined.fetch_add(1, Ordering::SeqCst);
            }));
            if let Some(cpu) = settings.worker_cpus.get(index) {
                worker.pin_to_cpu(*cpu);
            }
            workers.push(worker);
        }

        let slots = (0..settings.worker_count).map(|_| WorkerSlot::new()).collect();

        Ok(Self {
            settings,
            timer: Arc::new(InspectTimer::new()),
            workers,
            nb_seam_joined,
            proxies,
            state: Mutex::new(DispatchState {
                product: None,
                active_series: None,
                active: None,
                queues: FrameSyncQueues::new(),
                slots,
                current_pos_um: 0,
                last_processed_image: -1,
                last_skipped_image: -1,
                nb_seam_signaled: 0,
                images_skipped_from_sensor: 0,
                images_skipped_in_inspection: 0,
                trigger_cycle: 0,
            }),
        })
    }

    /// Caches the product structure for the coming cycles. Stops any
    /// running inspection first.
    pub fn change_product(&self, product: Product) {
        let mut state = self.lock_state();
        if state.active.is_some() {
            self.stop_inspect_locked(&mut state);
        }
        info!(product = %product.name, product_nb = product.product_nb, "product changed");
        state.product = Some(Arc::new(product));
        state.active_series = None;
    }

    /// Activates and arms a seam series.
    pub fn activate_seam_series(&self, series_number: i32) -> InspectResult<()> {
        let mut state = self.lock_state();
        self.activate_seam_series_locked(&mut state, series_number)
    }

    /// Starts inspection of a seam. Resets per-seam counters and timers
    /// and advances the trigger cycle.
    pub fn start_inspect(&self, series_number: i32, seam_number: i32, label: &str) -> InspectResult<()> {
        let mut state = self.lock_state();

        if state.active_series.is_none() {
            // the seam-series signal did not occur before the seam signal;
            // acceptable for small applications with a single series
            warn!(
                seam = seam_number,
                "seam activated without seam-series signal, activating series 0"
            );
            self.activate_seam_series_locked(&mut state, 0)?;
        }

        let product = state.product.clone().ok_or(InspectError::NoActiveProduct)?;
        let series_idx = match state.active_series {
            Some(idx) => idx,
            None => return Err(InspectError::UnknownSeamSeries(series_number)),
        };
        let series = &product.series[series_idx];
        let (seam_idx, seam) = series.seam(seam_number).ok_or(InspectError::UnknownSeam {
            series: series_number,
            seam: seam_number,
        })?;
        if seam.intervals.is_empty() {
            return Err(InspectError::EmptySeam(seam_number));
        }

        // the host may start a seam without naming it; fall back to the
        // label configured in the product structure
        let seam_label = if label.is_empty() {
            seam.label.clone()
        } else {
            label.to_string()
        };

        info!(
            series = series_number,
            seam = seam_number,
            label = %seam_label,
            trigger_interval_us = seam.trigger_interval().as_micros() as u64,
            "inspection started"
        );

        let interval = &seam.intervals[0];
        let requirements = interval.graph.requirements();
        state.queues.clear();
        state
            .queues
            .set_required_samples(requirements.sample_sensors.clone());

        state.active = Some(ActiveInspection {
            series_idx,
            seam_idx,
            interval_idx: 0,
            series_number: series.number,
            seam_number: seam.number,
            seam_label: seam_label.clone(),
            graph: interval.graph.clone(),
            graph_needs_image: !requirements.image_sensors.is_empty(),
            trigger_interval: seam.trigger_interval(),
            trigger_delta_um: seam.trigger_delta_um,
        });

        state.current_pos_um = 0;
        state.last_processed_image = -1;
        state.last_skipped_image = -1;
        state.nb_seam_signaled = 0;
        state.images_skipped_from_sensor = 0;
        state.images_skipped_in_inspection = 0;
        state.trigger_cycle = state.trigger_cycle.wrapping_add(1);
        self.nb_seam_joined.store(0, Ordering::SeqCst);
        self.timer.reset_accumulated();

        if !self.settings.simulation_station {
            for worker in &self.workers {
                worker.set_rt_priority(self.settings.realtime_processing, 1);
            }
        }

        self.proxies
            .video_recorder
            .seam_start(series.number, seam.number, &seam_label);

        Ok(())
    }

    /// Stops inspection. Joins every worker to completion before releasing
    /// the active graph and clearing the queues, the mandatory barrier
    /// that keeps workers from touching torn-down state.
    pub fn stop_inspect(&self) {
        let mut state = self.lock_state();
        self.stop_inspect_locked(&mut state);
    }

    /// The inspection cycle the dispatcher currently expects; the driver
    /// stamps it into every `TriggerContext`.
    pub fn current_cycle(&self) -> u32 {
        self.lock_state().trigger_cycle
    }

    /// Current per-seam counters.
    pub fn counters(&self) -> InspectionCounters {
        let state = self.lock_state();
        InspectionCounters {
            signaled: state.nb_seam_signaled,
            joined: self.nb_seam_joined.load(Ordering::SeqCst),
            skipped_from_sensor: state.images_skipped_from_sensor,
            skipped_in_inspection: state.images_skipped_in_inspection,
            last_processed_image: state.last_processed_image,
        }
    }

    /// Shared timing accumulators.
    pub fn timer(&self) -> &InspectTimer {
        &self.timer
    }

    /// Image-frame entry point of the sensor driver. Returns whether a
    /// frame was dispatched to a worker.
    pub fn data_image(&self, sensor_id: i32, trigger: TriggerContext, image: Image) -> bool {
        let started = Instant::now();
        let mut state = self.lock_state();

        let Some(active) = state.active.clone() else {
            debug!(
                image_number = trigger.image_number(),
                "could not process image, inspection has been stopped"
            );
            return false;
        };
        if !self.settings.simulation_station && trigger.cycle_count() != state.trigger_cycle {
            debug!(
                image_number = trigger.image_number(),
                "could not process image, it is from a previous inspection cycle"
            );
            return false;
        }

        let image_number = trigger.image_number();
        let mut mode = ProcessingMode::Normal;

        if !self.settings.simulation_station {
            let expected = state.last_processed_image + 1;
            if image_number > expected {
                error!(
                    skipped = image_number - expected,
                    expected,
                    got = image_number,
                    "images skipped by the sensor"
                );
                self.synthesize_missing_images(&mut state, &active, expected, image_number);
            } else if image_number < expected {
                // image numbers only ever move forward outside simulation
                debug!(
                    image_number,
                    last_processed = state.last_processed_image,
                    "out-of-order image discarded"
                );
                self.emit_mode_result(&active, &trigger, ProcessingMode::OutOfOrderImage);
                self.timer
                    .update_dispatcher_time(started.elapsed(), false);
                return false;
            }
        }

        self.check_seam_interval_change(&mut state, image_number);
        // the active interval may have changed with the position
        let active = match state.active.clone() {
            Some(active) => active,
            None => return false,
        };

        if !self.settings.simulation_station {
            let verdict = self.timer.check_overtriggering(
                active.trigger_interval,
                image_number,
                self.settings.conservative_overtriggering,
                self.settings.overtrigger_tolerance,
            );
            let skip = match verdict {
                OvertriggeringResult::EverythingOk | OvertriggeringResult::Dangerous => false,
                OvertriggeringResult::Critical => self.settings.conservative_overtriggering,
                OvertriggeringResult::Overtriggered => true,
            };
            if skip {
                warn!(image_number, "image skipped in inspection");
                mode = ProcessingMode::Overtriggered;
                state.images_skipped_in_inspection += 1;
                state.last_skipped_image = image_number;
            }
        }

        let dispatched = self.process_image(&mut state, &active, sensor_id, trigger, image, mode);
        self.timer.update_dispatcher_time(started.elapsed(), dispatched);

        if dispatched && self.settings.debug_timings {
            self.send_last_time_result(&state, ResultType::DispatcherTime);
            self.send_last_time_result(&state, ResultType::ProcessTime);
        }
        if image_number % 10 == 0 {
            self.update_product_info(&state);
        }
        dispatched
    }

    /// Sample-frame entry point of the sensor driver. Returns whether a
    /// frame was dispatched to a worker.
    pub fn data_sample(&self, sensor_id: i32, trigger: TriggerContext, sample: Sample) -> bool {
        let started = Instant::now();
        let mut state = self.lock_state();

        let Some(active) = state.active.clone() else {
            debug!(
                sample_number = trigger.image_number(),
                "could not process sample, inspection has been stopped"
            );
            return false;
        };
        if !self.settings.simulation_station && trigger.cycle_count() != state.trigger_cycle {
            debug!(
                sample_number = trigger.image_number(),
                "could not process sample, it is from a previous inspection cycle"
            );
            return false;
        }

        self.check_seam_interval_change(&mut state, trigger.image_number());
        let active = match state.active.clone() {
            Some(active) => active,
            None => return false,
        };

        let dispatched = self.process_sample(&mut state, &active, sensor_id, trigger, sample);
        self.timer.update_dispatcher_time(started.elapsed(), dispatched);
        dispatched
    }

    // ----- internal ------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn activate_seam_series_locked(
        &self,
        state: &mut DispatchState,
        series_number: i32,
    ) -> InspectResult<()> {
        let product = state.product.clone().ok_or(InspectError::NoActiveProduct)?;
        let (idx, _) = product
            .series(series_number)
            .ok_or(InspectError::UnknownSeamSeries(series_number))?;
        debug!(series = series_number, "seam series activated");
        state.active_series = Some(idx);
        Ok(())
    }

    fn stop_inspect_locked(&self, state: &mut DispatchState) {
        // barrier: no worker may still be touching shared buffers once the
        // seam state is released
        self.join_workers();

        if state.active.is_none() {
            return;
        }

        info!(
            signaled = state.nb_seam_signaled,
            joined = self.nb_seam_joined.load(Ordering::SeqCst),
            skipped_from_sensor = state.images_skipped_from_sensor,
            skipped_in_inspection = state.images_skipped_in_inspection,
            "inspection stopped"
        );

        state.active = None;
        state.current_pos_um = 0;
        state.last_processed_image = -1;
        state.last_skipped_image = -1;
        state.nb_seam_signaled = 0;
        state.images_skipped_from_sensor = 0;
        state.images_skipped_in_inspection = 0;
        state.queues.clear();

        self.proxies.video_recorder.seam_end();
        self.timer.log_accumulated();
    }

    /// Blocks until every worker is idle.
    fn join_workers(&self) {
        for worker in &self.workers {
            worker.join();
        }
    }

    /// Updates the seam position and swaps the seam interval when the
    /// position crossed an interval boundary.
    fn check_seam_interval_change(&self, state: &mut DispatchState, image_number: i32) {
        let Some(active) = state.active.clone() else {
            return;
        };
        state.current_pos_um = active.trigger_delta_um * i64::from(image_number);

        let Some(product) = state.product.clone() else {
            return;
        };
        let seam = &product.series[active.series_idx].seams[active.seam_idx];
        let current = &seam.intervals[active.interval_idx];
        if current.contains(state.current_pos_um) {
            return;
        }
        let Some(new_idx) = seam.interval_index_at(state.current_pos_um) else {
            // past the configured seam length; keep the last interval armed
            return;
        };

        info!(
            from = seam.intervals[active.interval_idx].number,
            to = seam.intervals[new_idx].number,
            position_um = state.current_pos_um,
            "seam interval change"
        );

        // wait for work in progress before swapping the graph
        self.join_workers();

        let interval = &seam.intervals[new_idx];
        let requirements = interval.graph.requirements();
        state
            .queues
            .set_required_samples(requirements.sample_sensors.clone());
        if let Some(active) = state.active.as_mut() {
            active.interval_idx = new_idx;
            active.graph = interval.graph.clone();
            active.graph_needs_image = !requirements.image_sensors.is_empty();
        }

        self.update_product_info(state);
    }

    /// Emits one synthetic `MissingImage` result per skipped trigger
    /// number, counting each number exactly once.
    fn synthesize_missing_images(
        &self,
        state: &mut DispatchState,
        active: &ActiveInspection,
        from: i32,
        to: i32,
    ) {
        for missing in from..to {
            if missing <= state.last_skipped_image {
                continue;
            }
            state.images_skipped_from_sensor += 1;
            state.last_skipped_image = missing;
            let trigger = TriggerContext::new(
                missing,
                active.series_number,
                active.seam_number,
                state.trigger_cycle,
            );
            self.emit_mode_result(active, &trigger, ProcessingMode::MissingImage);
        }
    }

    /// Enqueues the image and dispatches it once all correlated samples
    /// are available.
    fn process_image(
        &self,
        state: &mut DispatchState,
        active: &ActiveInspection,
        sensor_id: i32,
        trigger: TriggerContext,
        image: Image,
        mode: ProcessingMode,
    ) -> bool {
        state.queues.queue_image(PendingFrame {
            sensor_id,
            frame: ImageFrame::new(trigger, image),
            mode,
        });

        if !state.queues.are_all_samples_queued() && state.queues.image_backlog() < 3 {
            // still waiting for samples; three parked images in a row mean
            // a mis-declared graph, then we proceed anyway
            return false;
        }

        let Some(pending) = state.queues.pop_image() else {
            return false;
        };
        let slot_idx = (pending.frame.trigger.image_number().max(0) as usize) % self.workers.len();
        let samples = state.queues.dequeue_samples();
        {
            let slot = &mut state.slots[slot_idx];
            slot.image_sensor_id = Some(pending.sensor_id);
            slot.trigger = pending.frame.trigger;
            slot.image = Some(pending.frame);
            slot.mode = pending.mode;
            slot.samples = samples;
        }

        if self.settings.debug_timings {
            debug!(
                worker = slot_idx,
                signaled = state.nb_seam_signaled,
                "image dispatch: starting worker"
            );
        }
        self.start_processing(state, active, slot_idx);
        true
    }

    /// Queues the sample and dispatches the matching frame when complete.
    fn process_sample(
        &self,
        state: &mut DispatchState,
        active: &ActiveInspection,
        sensor_id: i32,
        trigger: TriggerContext,
        sample: Sample,
    ) -> bool {
        state.queues.queue_sample(sensor_id, trigger, sample);

        if !state.queues.are_all_samples_queued() && !state.queues.sample_backlog_reached(3) {
            // still waiting for other sample channels; three samples deep on
            // one channel means a mis-declared graph, then we proceed anyway
            return false;
        }

        let slot_idx = (trigger.image_number().max(0) as usize) % self.workers.len();

        if let Some(pending) = state.queues.pop_image() {
            let slot = &mut state.slots[slot_idx];
            slot.image_sensor_id = Some(pending.sensor_id);
            slot.image = Some(pending.frame);
            slot.mode = pending.mode;
        } else {
            if active.graph_needs_image {
                // wait for the image, there is an image source in the graph
                return false;
            }
            let slot = &mut state.slots[slot_idx];
            slot.image = None;
            slot.image_sensor_id = None;
            slot.mode = ProcessingMode::Normal;
        }

        let samples = state.queues.dequeue_samples();
        {
            let slot = &mut state.slots[slot_idx];
            slot.samples = samples;
            slot.trigger = trigger;
        }

        if self.settings.debug_timings {
            debug!(
                worker = slot_idx,
                signaled = state.nb_seam_signaled,
                "sample dispatch: starting worker"
            );
        }
        self.start_processing(state, active, slot_idx);
        true
    }

    /// Assembles the execution context for one worker slot and hands it to
    /// the slot's thread with a deadline of one trigger interval.
    fn start_processing(&self, state: &mut DispatchState, active: &ActiveInspection, slot_idx: usize) {
        let (work, trigger, scheduled_mode) = {
            let slot = &mut state.slots[slot_idx];
            // stamp the authoritative seam coordinates
            slot.trigger = slot
                .trigger
                .with_seam(active.series_number, active.seam_number);

            let trigger = slot.trigger;
            let mode = slot.mode;
            let context = ImageContext::from_trigger(&trigger, active.trigger_delta_um);
            let image = slot.image.take();
            let image_sensor_id = slot.image_sensor_id.take();
            let samples = std::mem::take(&mut slot.samples);
            let canvas = Arc::clone(&slot.canvas);
            let graph = Arc::clone(&active.graph);
            let timer = Arc::clone(&self.timer);
            let proxies = self.proxies.clone();
            let is_sample_only = image.is_none();

            let work: Work = Box::new(move || {
                let started = Instant::now();
                let mut canvas = canvas.lock().unwrap_or_else(|e| e.into_inner());
                canvas.clear();

                if mode == ProcessingMode::Normal {
                    let outcome = graph.run(ExecutionContext {
                        context,
                        image: image.as_ref(),
                        image_sensor_id,
                        samples: &samples,
                        canvas: &mut canvas,
                    });
                    for result in outcome.results {
                        proxies.result_handler.send_result(&result);
                        proxies.result_proxy.result(result);
                    }
                    if let Some(frame) = image.as_ref() {
                        proxies
                            .recorder
                            .frame_processed(context, &frame.image, &canvas);
                    }
                }
                // placeholder modes keep the timers consistent without
                // running the graph or recording overlays
                if is_sample_only {
                    timer.update_sample_processing_time(started.elapsed());
                } else {
                    timer.update_processing_time(started.elapsed());
                }
            });
            (work, trigger, mode)
        };

        // the schedule deadline is the trigger interval itself: waiting any
        // longer would eat into the next frame's budget
        let wait_for = if active.trigger_interval.is_zero() {
            Duration::from_millis(1)
        } else {
            active.trigger_interval
        };

        let mut final_mode = scheduled_mode;
        match self.workers[slot_idx].schedule_work(work, wait_for) {
            Ok(()) => {
                state.last_processed_image = trigger.image_number();
                state.nb_seam_signaled += 1;
            }
            Err(_rejected) => {
                error!(
                    image_number = trigger.image_number(),
                    worker = slot_idx,
                    "worker still busy with previous frame, frame dropped"
                );
                final_mode = ProcessingMode::Overtriggered;
                if state.last_skipped_image < trigger.image_number() {
                    state.images_skipped_in_inspection += 1;
                    state.last_skipped_image = trigger.image_number();
                }
            }
        }

        // dispatched or rejected, the processing mode becomes visible to
        // downstream NIO logic as an ordinary result
        self.emit_mode_result(active, &trigger, final_mode);
    }

    fn emit_mode_result(
        &self,
        active: &ActiveInspection,
        trigger: &TriggerContext,
        mode: ProcessingMode,
    ) {
        let context = ImageContext::from_trigger(trigger, active.trigger_delta_um);
        let result = InspectionResult::scalar(
            ResultType::ImageProcessingMode,
            context,
            mode.result_value(),
        );
        self.proxies.result_handler.send_result(&result);
        self.proxies.result_proxy.result(result);
    }

    /// Emits the last measured time as an ordinary result, debug-timings
    /// only. An estimate: worker completions are not synchronized with
    /// this path, so a time may be missed or sent twice.
    fn send_last_time_result(&self, state: &DispatchState, result_type: ResultType) {
        let Some(active) = state.active.as_ref() else {
            return;
        };
        let measured = match result_type {
            ResultType::ProcessTime => self.timer.last_image_time_us(),
            ResultType::DispatcherTime => self.timer.last_dispatcher_time_us(),
            _ => None,
        };
        let Some((count, time_us)) = measured else {
            return;
        };
        if count == 0 {
            return;
        }
        let image_number = count as i32 - 1;
        let context = ImageContext {
            image_number,
            seam_series: active.series_number,
            seam: active.seam_number,
            position_um: active.trigger_delta_um * i64::from(image_number),
        };
        let result = InspectionResult::scalar(result_type, context, time_us);
        self.proxies.result_handler.send_result(&result);
    }

    fn update_product_info(&self, state: &DispatchState) {
        let (Some(product), Some(active)) = (state.product.as_ref(), state.active.as_ref()) else {
            return;
        };
        self.proxies.system_status.signal_product_info(ProductInfo {
            product_name: product.name.clone(),
            seam_series: active.series_number,
            seam: active.seam_number,
            seam_label: active.seam_label.clone(),
            processing_time_us: self.timer.processing_time_us(),
        });
    }
}

impl Drop for InspectManager {
    fn drop(&mut self) {
        self.join_workers();
    }
}
