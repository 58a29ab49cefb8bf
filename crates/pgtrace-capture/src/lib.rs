//! # pgtrace-capture
//!
//! The capture sink: one CSV-like line per decoded frame, appended to a
//! file shared by every session in the process.
//!
//! Line format: `dir,[from,to,]tag[,detail]`. The socket pair is included
//! only when `output_sockets` is configured; `detail` only when the
//! parser produced a field summary. The format needs stability, not
//! extensibility — consumers are humans and offline scripts.

pub mod error;
pub mod sink;

pub use error::CaptureError;
pub use sink::CaptureSink;
