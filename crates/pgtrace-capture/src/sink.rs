//! The shared capture file sink.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use pgtrace_core::config::CaptureConfig;
use pgtrace_wire::{EventSink, WireEvent};

use crate::error::CaptureError;

/// Append-mode capture file shared by every session.
///
/// The lock serializes whole lines so output from concurrent sessions
/// never interleaves mid-line; it makes no promise about temporal order
/// between sessions. Each line is flushed immediately.
pub struct CaptureSink {
    file: Mutex<File>,
    output_sockets: bool,
}

impl CaptureSink {
    /// Open the capture file in append mode for the process lifetime.
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.output)
            .map_err(|source| CaptureError::OpenFailed {
                path: config.output.clone(),
                source,
            })?;

        Ok(Self {
            file: Mutex::new(file),
            output_sockets: config.output_sockets,
        })
    }

    fn format_line(&self, event: &WireEvent) -> String {
        let mut line = event.direction.to_string();
        if self.output_sockets {
            line.push_str(&format!(",{},{}", event.from, event.to));
        }
        line.push_str(&format!(",{}", event.tag));
        if let Some(detail) = &event.detail {
            line.push(',');
            line.push_str(detail);
        }
        line
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: WireEvent) {
        let line = self.format_line(&event);

        // A sink failure degrades the capture, never the relay.
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
            tracing::warn!(error = %e, "failed to write capture line");
        }
    }
}
