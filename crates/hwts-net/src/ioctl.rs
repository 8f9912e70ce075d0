//! Interface ioctls not wrapped by nix.

use nix::{ioctl_readwrite_bad, libc};

/// `SIOCSHWTSTAMP` from `linux/sockios.h`.
pub const SIOCSHWTSTAMP: libc::c_ulong = 0x89b0;

/// `HWTSTAMP_TX_OFF` from `linux/net_tstamp.h`.
pub const HWTSTAMP_TX_OFF: libc::c_int = 0;

/// `HWTSTAMP_FILTER_NONE`.
pub const HWTSTAMP_FILTER_NONE: libc::c_int = 0;

/// `HWTSTAMP_FILTER_ALL`: timestamp every incoming packet.
pub const HWTSTAMP_FILTER_ALL: libc::c_int = 1;

/// `struct hwtstamp_config`, passed through `ifreq.ifr_data`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct HwTstampConfig {
    pub flags: libc::c_int,
    pub tx_type: libc::c_int,
    pub rx_filter: libc::c_int,
}

ioctl_readwrite_bad!(get_if_flags, libc::SIOCGIFFLAGS, libc::ifreq);
ioctl_readwrite_bad!(set_if_flags, libc::SIOCSIFFLAGS, libc::ifreq);
ioctl_readwrite_bad!(set_hw_tstamp, SIOCSHWTSTAMP, libc::ifreq);
