//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Checking hardware test prerequisites (privileges, interface)
//! - Scripted frame sources
//! - Parsing the output log

#![allow(dead_code)] // Not every helper is used by every test module

use hwts_common::TimestampRecord;
use hwts_pipeline::{Ancillary, FrameSource, TimestampSet, LOG_HEADER};
use std::collections::VecDeque;
use std::io;
use std::path::Path;

/// Check if running as root (required for raw sockets and interface ioctls).
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Interface for hardware tests, if configured and present.
pub fn test_interface() -> Option<String> {
    let iface = std::env::var("HWTS_TEST_IFACE").ok()?;
    Path::new("/sys/class/net").join(&iface).exists().then_some(iface)
}

/// Check all prerequisites for hardware tests.
pub fn check_hw_prerequisites() -> Result<String, String> {
    if !is_root() {
        return Err("Not running as root - raw capture will fail".into());
    }
    test_interface().ok_or_else(|| "HWTS_TEST_IFACE not set or interface missing".into())
}

/// Shorthand for a valid record.
pub fn ts(seconds: u64, nanoseconds: u32) -> TimestampRecord {
    TimestampRecord::new(seconds, nanoseconds).unwrap()
}

/// One scripted receive.
#[derive(Debug)]
pub enum Frame {
    /// A frame carrying these raw hardware timestamps.
    Stamped(Vec<TimestampRecord>),
    /// A frame with only unrelated control messages.
    Unstamped,
    /// A failed receive.
    Error,
}

/// Frame source replaying a script, then reporting "would block".
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Frame>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FrameSource for ScriptedSource {
    fn recv(&mut self, _buf: &mut [u8], ancillary: &mut Vec<Ancillary>) -> io::Result<usize> {
        ancillary.clear();
        match self.script.pop_front() {
            Some(Frame::Stamped(stamps)) => {
                ancillary.extend(stamps.into_iter().map(|raw| {
                    Ancillary::Timestamping(TimestampSet {
                        hw_raw: raw,
                        ..TimestampSet::default()
                    })
                }));
                Ok(60)
            }
            Some(Frame::Unstamped) => {
                // SOL_SOCKET / SCM_TIMESTAMPNS on Linux
                ancillary.push(Ancillary::Other { level: 1, kind: 35 });
                Ok(60)
            }
            Some(Frame::Error) => Err(io::Error::new(io::ErrorKind::Other, "scripted failure")),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Parse an output log into `(sequence, nanoseconds)` rows, checking the header.
pub fn read_log(path: &Path) -> Vec<(u64, u64)> {
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.ends_with('\n'), "log must be newline-terminated");

    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(LOG_HEADER));
    lines
        .map(|line| {
            let (seq, nanos) = line
                .split_once(';')
                .unwrap_or_else(|| panic!("malformed row {line:?}"));
            (seq.parse().unwrap(), nanos.parse().unwrap())
        })
        .collect()
}
