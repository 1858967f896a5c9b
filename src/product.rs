//! Product structure: seam series, seams and seam intervals.
//!
//! A product owns seam series, which own seams, which own seam intervals.
//! The seam interval is the finest unit carrying one graph; the seam
//! carries the trigger geometry (trigger delta, velocity, length) from
//! which the expected inter-trigger time is derived. The dispatcher never
//! owns this hierarchy; it holds indices into the active product, all
//! invalidated together on `stop_inspect`.

use crate::graph::GraphExecutor;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Finest inspection unit: a position range within the seam plus the graph
/// that inspects it.
#[derive(Clone)]
pub struct SeamInterval {
    pub number: i32,
    pub start_position_um: i64,
    pub end_position_um: i64,
    pub graph: Arc<dyn GraphExecutor>,
}

impl SeamInterval {
    pub fn contains(&self, position_um: i64) -> bool {
        position_um >= self.start_position_um && position_um <= self.end_position_um
    }
}

/// One weld seam.
#[derive(Clone)]
pub struct Seam {
    pub number: i32,
    pub label: String,
    /// Spatial distance between two triggers [µm].
    pub trigger_delta_um: i64,
    /// Welding velocity [µm/s].
    pub velocity_um_per_s: i64,
    pub length_um: i64,
    pub intervals: Vec<SeamInterval>,
}

impl Seam {
    /// Convenience constructor for a seam inspected by a single graph over
    /// its full length.
    pub fn single_interval(
        number: i32,
        trigger_delta_um: i64,
        velocity_um_per_s: i64,
        length_um: i64,
        graph: Arc<dyn GraphExecutor>,
    ) -> Self {
        Self {
            number,
            label: String::new(),
            trigger_delta_um,
            velocity_um_per_s,
            length_um,
            intervals: vec![SeamInterval {
                number: 0,
                start_position_um: 0,
                end_position_um: length_um,
                graph,
            }],
        }
    }

    /// Expected time between two triggers, derived from trigger distance
    /// and velocity.
    pub fn trigger_interval(&self) -> Duration {
        if self.velocity_um_per_s <= 0 || self.trigger_delta_um <= 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.trigger_delta_um as f64 / self.velocity_um_per_s as f64)
    }

    /// Number of triggers needed to cover the seam.
    pub fn nb_triggers(&self) -> i64 {
        if self.trigger_delta_um <= 0 {
            return 0;
        }
        self.length_um / self.trigger_delta_um
    }

    /// Index of the interval covering `position_um`, if any.
    pub fn interval_index_at(&self, position_um: i64) -> Option<usize> {
        self.intervals.iter().position(|i| i.contains(position_um))
    }
}

#[derive(Clone)]
pub struct SeamSeries {
    pub number: i32,
    pub seams: Vec<Seam>,
}

impl SeamSeries {
    pub fn seam(&self, number: i32) -> Option<(usize, &Seam)> {
        self.seams
            .iter()
            .enumerate()
            .find(|(_, s)| s.number == number)
    }
}

/// Top-level configuration entity, built once per product change.
#[derive(Clone)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub product_nb: i32,
    pub series: Vec<SeamSeries>,
}

impl Product {
    pub fn new(name: impl Into<String>, product_nb: i32, series: Vec<SeamSeries>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            product_nb,
            series,
        }
    }

    pub fn series(&self, number: i32) -> Option<(usize, &SeamSeries)> {
        self.series
            .iter()
            .enumerate()
            .find(|(_, s)| s.number == number)
    }
}
