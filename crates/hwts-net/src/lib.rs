//! Raw packet capture with NIC hardware receive timestamps.
//!
//! [`CaptureSocket`] opens an `AF_PACKET` socket bound to one interface,
//! asks the driver to timestamp every received frame, and implements the
//! pipeline's [`FrameSource`](hwts_pipeline::FrameSource) by translating
//! the kernel's control messages into typed ancillary entries.
//!
//! Linux only. On other platforms the crate is empty.

#[cfg(target_os = "linux")]
mod ioctl;
#[cfg(target_os = "linux")]
pub mod socket;

#[cfg(target_os = "linux")]
pub use socket::*;
