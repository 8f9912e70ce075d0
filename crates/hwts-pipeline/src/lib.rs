#![doc = "Capture-to-log pipeline: SPSC timestamp channel, capture worker, and log worker."]

pub mod affinity;
pub mod capture;
pub mod channel;
pub mod log_writer;
pub mod shutdown;
pub mod stats;
pub mod wait;

pub use affinity::*;
pub use capture::*;
pub use channel::*;
pub use log_writer::*;
pub use shutdown::*;
pub use stats::*;
pub use wait::*;
