//! Trigger and image context value types.
//!
//! A [`TriggerContext`] identifies one sensor acquisition event. It is
//! created by the sensor driver, immutable once created, and travels with
//! the frame through the synchronization queues into the worker. Results
//! carry an [`ImageContext`] derived from it, so downstream consumers stay
//! correct even when completion order differs from trigger order.

use serde::{Deserialize, Serialize};

/// Identifies one trigger event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Monotonically increasing image/sample sequence number within a seam,
    /// starting at 0.
    image_number: i32,
    /// Seam series number at capture time.
    seam_series: i32,
    /// Seam number at capture time.
    seam: i32,
    /// Inspection cycle the trigger belongs to. Frames from a previous
    /// cycle are stale and must be ignored.
    cycle_count: u32,
}

impl TriggerContext {
    pub fn new(image_number: i32, seam_series: i32, seam: i32, cycle_count: u32) -> Self {
        Self {
            image_number,
            seam_series,
            seam,
            cycle_count,
        }
    }

    pub fn image_number(&self) -> i32 {
        self.image_number
    }

    pub fn seam_series(&self) -> i32 {
        self.seam_series
    }

    pub fn seam(&self) -> i32 {
        self.seam
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    /// Returns a copy re-tagged with the currently active seam coordinates.
    /// The driver only knows the numbers it was armed with; the dispatcher
    /// stamps the authoritative ones just before scheduling.
    pub fn with_seam(&self, seam_series: i32, seam: i32) -> Self {
        Self {
            seam_series,
            seam,
            ..*self
        }
    }
}

/// Position-resolved context attached to every emitted result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContext {
    pub image_number: i32,
    pub seam_series: i32,
    pub seam: i32,
    /// Position along the seam in micrometers (trigger delta × image number).
    pub position_um: i64,
}

impl ImageContext {
    pub fn from_trigger(trigger: &TriggerContext, trigger_delta_um: i64) -> Self {
        Self {
            image_number: trigger.image_number(),
            seam_series: trigger.seam_series(),
            seam: trigger.seam(),
            position_um: trigger_delta_um * i64::from(trigger.image_number()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_follows_trigger_delta() {
        let trigger = TriggerContext::new(7, 1, 2, 1);
        let ctx = ImageContext::from_trigger(&trigger, 150);
        assert_eq!(ctx.position_um, 1050);
        assert_eq!(ctx.image_number, 7);
    }

    #[test]
    fn with_seam_keeps_number() {
        let trigger = TriggerContext::new(3, 0, 0, 9).with_seam(2, 5);
        assert_eq!(trigger.image_number(), 3);
        assert_eq!(trigger.seam_series(), 2);
        assert_eq!(trigger.seam(), 5);
        assert_eq!(trigger.cycle_count(), 9);
    }
}
