//! Integration tests for hw-timestamper acceptance testing.
//!
//! - `channel_test`: ordering and capacity of the timestamp channel
//! - `pipeline_test`: threaded capture → log flow and shutdown
//! - `hardware_test`: capture on a real interface (ignored by default)

mod channel_test;
mod common;
mod hardware_test;
mod pipeline_test;
