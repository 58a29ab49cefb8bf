//! Per-session traffic dumps.
//!
//! When `save_traffic` is configured, every relayed chunk is appended as a
//! hex dump to one file per session and direction, for offline analysis
//! next to the capture file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use pgtrace_wire::Direction;

/// Hex dump files for one session.
pub struct TrafficDump {
    client: File,
    server: File,
}

impl TrafficDump {
    /// Create `<id>-client.dump` and `<id>-server.dump` in the configured
    /// directory.
    pub fn new(dir: &Path, session_id: u64) -> std::io::Result<Self> {
        let open = |name: String| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(name))
        };
        Ok(Self {
            client: open(format!("{session_id}-client.dump"))?,
            server: open(format!("{session_id}-server.dump"))?,
        })
    }

    /// Append one chunk. Dump failures degrade the dump, never the relay.
    pub fn record(&mut self, direction: Direction, data: &[u8]) {
        let file = match direction {
            Direction::Client => &mut self.client,
            Direction::Server => &mut self.server,
        };
        if let Err(e) = write!(file, "{}", hex_dump(data)) {
            tracing::warn!(error = %e, direction = %direction, "failed to write traffic dump");
        }
    }
}

/// Classic offset / hex / ASCII rendering, 16 bytes per line.
fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<47}  |{}|\n", i * 16, hex.join(" "), ascii));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_format() {
        let dump = hex_dump(b"Q\x00\x00\x00\x0dSELECT 1\x00");
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("00000000  51 00 00 00 0d 53 45 4c"));
        assert!(lines[0].ends_with("|Q....SELECT 1.|"));
    }

    #[test]
    fn test_hex_dump_wraps_lines() {
        let data: Vec<u8> = (0..40u8).collect();
        let dump = hex_dump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("00000010"));
        assert!(lines[2].starts_with("00000020"));
    }

    #[test]
    fn test_record_writes_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let mut dump = TrafficDump::new(dir.path(), 7).unwrap();

        dump.record(Direction::Client, b"ping");
        dump.record(Direction::Server, b"pong");

        let client = std::fs::read_to_string(dir.path().join("7-client.dump")).unwrap();
        let server = std::fs::read_to_string(dir.path().join("7-server.dump")).unwrap();
        assert!(client.contains("|ping|"));
        assert!(server.contains("|pong|"));
    }
}
