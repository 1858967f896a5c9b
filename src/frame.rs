//! Sensor payloads and per-slot frame buffers.
//!
//! An [`Image`] is a grayscale pixel buffer from the camera, a [`Sample`] a
//! short burst of scalar readings from a 1-D sensor channel. Pixel data is
//! shared via `Arc` so that storing a frame into a worker slot and handing
//! it to the worker never copies the payload; the slot buffers themselves
//! are reused ring-buffer style, indexed by `image_number % worker_count`.

use crate::trigger::TriggerContext;
use std::sync::Arc;

/// Grayscale image as delivered by the camera driver.
#[derive(Debug, Clone, Default)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl Image {
    /// Builds an image from raw pixel data. Returns `None` when the buffer
    /// length does not match the dimensions.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Scalar sample burst from a lower-rate sensor channel (plasma, back
/// reflection, analog input, ...).
#[derive(Debug, Clone, Default)]
pub struct Sample {
    values: Arc<[i32]>,
}

impl Sample {
    pub fn new(values: Vec<i32>) -> Self {
        Self {
            values: values.into(),
        }
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One image plus the trigger it belongs to.
#[derive(Debug, Clone, Default)]
pub struct ImageFrame {
    pub trigger: TriggerContext,
    pub image: Image,
}

impl ImageFrame {
    pub fn new(trigger: TriggerContext, image: Image) -> Self {
        Self { trigger, image }
    }
}

/// One sample burst plus its originating sensor and trigger.
#[derive(Debug, Clone, Default)]
pub struct SampleFrame {
    pub sensor_id: i32,
    pub trigger: TriggerContext,
    pub sample: Sample,
}

impl SampleFrame {
    pub fn new(sensor_id: i32, trigger: TriggerContext, sample: Sample) -> Self {
        Self {
            sensor_id,
            trigger,
            sample,
        }
    }
}

/// Overlay primitive painted by the graph while processing a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayShape {
    Point { x: i32, y: i32 },
    Rect { x: i32, y: i32, w: u32, h: u32 },
    Text { x: i32, y: i32, text: String },
}

/// Reusable canvas the active graph paints overlay primitives into. One
/// canvas per worker slot; cleared before each dispatch.
#[derive(Debug, Clone, Default)]
pub struct OverlayCanvas {
    shapes: Vec<OverlayShape>,
}

impl OverlayCanvas {
    pub fn push(&mut self, shape: OverlayShape) {
        self.shapes.push(shape);
    }

    pub fn shapes(&self) -> &[OverlayShape] {
        &self.shapes
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
