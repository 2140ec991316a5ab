//! Gesture volume control: webcam frames in, system volume and a live
//! preview out.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing and validation.
//! - `pipeline`: The acquire → detect → actuate → publish loop and `serve` wiring.
//! - `metric`: Pinch distance to volume, gesture label and accuracy.
//! - `actuator`: System volume backends.
//! - `state` / `history`: Live metrics and the bounded telemetry buffer.
//! - `report`: CSV session export.
//! - `annotation` / `encoding`: Preview overlay and JPEG/multipart framing.
//! - `server`: Actix Web routes.
//! - `telemetry`: Tracing and Prometheus setup.
//! - `runtime`: CUDA runtime loader glue.

pub use config::{AppConfig, ServeArgs, VolumeArgs};
pub use pipeline::run;

pub mod actuator;
pub mod annotation;
pub mod config;
pub mod data;
pub mod encoding;
pub mod history;
pub mod metric;
pub mod pipeline;
pub mod report;
#[cfg(feature = "with-tch")]
pub mod runtime;
pub mod server;
pub mod state;
pub mod telemetry;
