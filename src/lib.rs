//! # Seam Inspection Core Library
//!
//! This crate implements the frame dispatch and multi-worker scheduling core
//! of a laser-weld seam inspection system. Camera images and scalar sensor
//! samples arrive as trigger-numbered frames at kilohertz rates; the core
//! correlates them, classifies each frame against the real-time budget and
//! hands complete frames to a fixed pool of worker threads that run the
//! active processing graph. Results, overlays and status snapshots flow out
//! through proxy traits, so the same core serves production hardware,
//! simulation stations and tests.
//!
//! ## Crate Structure
//!
//! - **`config`**: Runtime settings loaded from TOML with environment
//!   overrides. See `config::Settings`.
//! - **`dispatcher`**: The `InspectManager`, the central decision point for
//!   every incoming frame, plus the per-frame `ProcessingMode`.
//! - **`error`**: The custom `InspectError` enum for centralized error
//!   handling across the crate.
//! - **`frame`**: Sensor payloads (`Image`, `Sample`) and the overlay canvas
//!   graphs paint into.
//! - **`graph`**: The `GraphExecutor` boundary towards the filter graphs,
//!   including a mock implementation for tests and demos.
//! - **`product`**: The product / seam-series / seam / seam-interval
//!   hierarchy and the trigger geometry derived from it.
//! - **`results`**: Result types and the proxy traits the core dispatches
//!   into (results, recorder, system status, video recorder).
//! - **`sync`**: Image/sample correlation queues deciding when a frame is
//!   complete enough to dispatch.
//! - **`timer`**: Timing accumulators and the overtriggering classifier.
//! - **`trigger`**: The `TriggerContext` / `ImageContext` value types that
//!   travel with every frame and result.
//! - **`worker`**: The `ProcessingThread` worker primitive with its one-slot
//!   mailbox and scheduling-class control.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod graph;
pub mod product;
pub mod results;
pub mod sync;
pub mod timer;
pub mod trigger;
pub mod worker;
