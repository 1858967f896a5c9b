//! Image/sample correlation queues.
//!
//! An image frame and the sample frames sharing its trigger arrive on
//! independent sensor channels in no guaranteed order. These queues buffer
//! whichever side arrives first and decide when a frame is complete enough
//! to dispatch: every sample sensor the *active graph* consumes must have
//! at least one queued sample. The required-sensor set is computed once per
//! graph activation, never per frame.
//!
//! The queues never reorder across trigger numbers. An image waiting for
//! samples simply waits; the overtriggering detector deals with the fallout
//! on subsequent frames.

use crate::dispatcher::ProcessingMode;
use crate::frame::{ImageFrame, Sample, SampleFrame};
use crate::trigger::TriggerContext;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// An image held back until its correlated samples arrive.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub sensor_id: i32,
    pub frame: ImageFrame,
    pub mode: ProcessingMode,
}

/// Per-seam synchronization state for one dispatcher.
#[derive(Debug, Default)]
pub struct FrameSyncQueues {
    image_queue: VecDeque<PendingFrame>,
    sample_queues: BTreeMap<i32, VecDeque<SampleFrame>>,
    required_samples: BTreeSet<i32>,
}

impl FrameSyncQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the sample sensors the active graph consumes. Called on
    /// seam activation and on seam-interval change.
    pub fn set_required_samples(&mut self, sensors: BTreeSet<i32>) {
        self.required_samples = sensors;
    }

    pub fn queue_image(&mut self, pending: PendingFrame) {
        self.image_queue.push_back(pending);
    }

    pub fn pop_image(&mut self) -> Option<PendingFrame> {
        self.image_queue.pop_front()
    }

    /// Appends to the per-sensor FIFO. Multiple samples may queue ahead of
    /// their matching image.
    pub fn queue_sample(&mut self, sensor_id: i32, trigger: TriggerContext, sample: Sample) {
        self.sample_queues
            .entry(sensor_id)
            .or_default()
            .push_back(SampleFrame::new(sensor_id, trigger, sample));
    }

    /// True iff every required sample sensor has at least one queued
    /// sample. Holds vacuously for graphs without sample sources.
    pub fn are_all_samples_queued(&self) -> bool {
        self.required_samples.iter().all(|sensor_id| {
            self.sample_queues
                .get(sensor_id)
                .is_some_and(|q| !q.is_empty())
        })
    }

    /// Drains one sample per sensor id into a map to be attached to the
    /// about-to-be-dispatched frame. Partial state for other trigger
    /// numbers is preserved.
    pub fn dequeue_samples(&mut self) -> HashMap<i32, SampleFrame> {
        let mut samples = HashMap::new();
        for (sensor_id, queue) in &mut self.sample_queues {
            if let Some(frame) = queue.pop_front() {
                samples.insert(*sensor_id, frame);
            }
        }
        samples
    }

    /// Number of images parked while waiting for samples.
    pub fn image_backlog(&self) -> usize {
        self.image_queue.len()
    }

    /// True if any single sample channel has accumulated `threshold` or
    /// more entries, the sign of a graph that declared a sensor it never
    /// consumes, or a dead image channel.
    pub fn sample_backlog_reached(&self, threshold: usize) -> bool {
        self.sample_queues.values().any(|q| q.len() >= threshold)
    }

    /// Empties all queues. Called on `stop_inspect`.
    pub fn clear(&mut self) {
        self.image_queue.clear();
        self.sample_queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: i32) -> Sample {
        Sample::new(vec![v])
    }

    #[test]
    fn vacuous_truth_without_required_sensors() {
        let mut queues = FrameSyncQueues::new();
        assert!(queues.are_all_samples_queued());
        // contents of unrelated queues do not matter
        queues.queue_sample(42, TriggerContext::default(), sample(1));
        assert!(queues.are_all_samples_queued());
    }

    #[test]
    fn incomplete_until_every_required_sensor_queued() {
        let mut queues = FrameSyncQueues::new();
        queues.set_required_samples(BTreeSet::from([20, 21]));
        assert!(!queues.are_all_samples_queued());

        queues.queue_sample(20, TriggerContext::default(), sample(1));
        assert!(!queues.are_all_samples_queued());

        queues.queue_sample(21, TriggerContext::default(), sample(2));
        assert!(queues.are_all_samples_queued());
    }

    #[test]
    fn dequeue_drains_one_per_sensor() {
        let mut queues = FrameSyncQueues::new();
        queues.set_required_samples(BTreeSet::from([20]));
        queues.queue_sample(20, TriggerContext::new(0, 0, 0, 0), sample(1));
        queues.queue_sample(20, TriggerContext::new(1, 0, 0, 0), sample(2));

        let first = queues.dequeue_samples();
        assert_eq!(first[&20].trigger.image_number(), 0);
        // second entry preserved for the next frame
        assert!(queues.are_all_samples_queued());
        let second = queues.dequeue_samples();
        assert_eq!(second[&20].trigger.image_number(), 1);
        assert!(!queues.are_all_samples_queued());
    }

    #[test]
    fn samples_keep_fifo_order_per_sensor() {
        let mut queues = FrameSyncQueues::new();
        for n in 0..3 {
            queues.queue_sample(7, TriggerContext::new(n, 0, 0, 0), sample(n));
        }
        for n in 0..3 {
            let drained = queues.dequeue_samples();
            assert_eq!(drained[&7].trigger.image_number(), n);
        }
        assert!(queues.dequeue_samples().is_empty());
    }

    #[test]
    fn backlog_threshold() {
        let mut queues = FrameSyncQueues::new();
        queues.queue_sample(5, TriggerContext::default(), sample(0));
        queues.queue_sample(5, TriggerContext::default(), sample(1));
        assert!(!queues.sample_backlog_reached(3));
        queues.queue_sample(5, TriggerContext::default(), sample(2));
        assert!(queues.sample_backlog_reached(3));
    }
}
