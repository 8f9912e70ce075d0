//! `AF_PACKET` capture socket with hardware receive timestamping.
//!
//! # Setup sequence
//!
//! 1. `socket(AF_PACKET, SOCK_RAW, ETH_P_ALL)`
//! 2. `bind` to the interface's link-layer address
//! 3. `SO_BINDTODEVICE`
//! 4. optional promiscuous mode (`SIOCGIFFLAGS` / `SIOCSIFFLAGS`)
//! 5. `SIOCSHWTSTAMP`: receive filter "all packets", transmit stamping off
//! 6. `SO_TIMESTAMPING`: report raw hardware receive timestamps
//!
//! Every failing step except promiscuous mode aborts setup with
//! [`HwtsError::Socket`] naming the step.
//!
//! # Requirements
//!
//! - `CAP_NET_RAW` (or root) for the packet socket
//! - `CAP_NET_ADMIN` (or root) for the interface ioctls
//! - a NIC and driver that support hardware receive timestamps

use crate::ioctl::{
    get_if_flags, set_hw_tstamp, set_if_flags, HwTstampConfig, HWTSTAMP_FILTER_ALL,
    HWTSTAMP_FILTER_NONE, HWTSTAMP_TX_OFF,
};
use hwts_common::{HwtsError, HwtsResult, TimestampRecord};
use hwts_pipeline::{Ancillary, FrameSource, TimestampSet};
use nix::cmsg_space;
use nix::libc;
use nix::sys::socket::{
    bind, recvmsg, setsockopt, socket, sockopt, AddressFamily, ControlMessageOwned, LinkAddr,
    MsgFlags, SockFlag, SockProtocol, SockType, SockaddrLike, TimestampingFlag,
};
use nix::sys::time::TimeSpec;
use std::ffi::OsString;
use std::fs;
use std::io::{self, IoSliceMut};
use std::mem;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::ptr;
use tracing::{debug, info, warn};

/// Linux capability bit for `CAP_NET_RAW`.
const CAP_NET_RAW_BIT: u32 = 13;

/// Control buffer size. Leaves room for the timestamping entry plus any
/// other control messages the kernel attaches to a frame.
const CMSG_BUFFER_SIZE: usize = 4096;

/// Rate limit for truncated control data warnings.
const WARN_EVERY: u64 = 1000;

/// Capture socket options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Interface to capture on (e.g. `enp5s0`).
    pub interface: String,
    /// Enable promiscuous mode on the interface.
    pub promiscuous: bool,
}

impl SocketConfig {
    /// Capture on `interface` with promiscuous mode enabled.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            promiscuous: true,
        }
    }

    /// Enable or disable promiscuous mode.
    #[must_use]
    pub fn with_promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }
}

/// Map nix errors to [`HwtsError::Socket`] naming the setup step.
trait SetupStep<T> {
    fn step(self, op: &'static str) -> HwtsResult<T>;
}

impl<T> SetupStep<T> for nix::Result<T> {
    fn step(self, op: &'static str) -> HwtsResult<T> {
        self.map_err(|errno| HwtsError::Socket {
            op,
            source: errno.into(),
        })
    }
}

/// A bound `AF_PACKET` socket delivering hardware-timestamped frames.
///
/// Receives never block. The socket is closed on drop; the interface's
/// promiscuous flag is only cleared by [`CaptureSocket::restore_promiscuous`].
#[derive(Debug)]
pub struct CaptureSocket {
    fd: OwnedFd,
    interface: String,
    ifindex: u32,
    /// True if this socket turned promiscuous mode on.
    promisc_enabled: bool,
    /// Receive filter the driver actually applied.
    rx_filter: libc::c_int,
    cmsg_buf: Vec<u8>,
    /// Frames whose control data did not fit `cmsg_buf`.
    truncated: u64,
}

impl CaptureSocket {
    /// Run the full setup sequence for `config.interface`.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::Config`] for an invalid or missing interface and
    /// [`HwtsError::Socket`] if a setup step fails.
    pub fn open(config: &SocketConfig) -> HwtsResult<Self> {
        let interface = config.interface.as_str();
        check_interface_exists(interface)?;
        check_raw_socket_privilege();

        let fd = socket(
            AddressFamily::Packet,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::EthAll,
        )
        .step("socket(AF_PACKET, SOCK_RAW)")?;

        let ifindex = nix::net::if_::if_nametoindex(interface).step("if_nametoindex")?;
        let addr = link_addr(ifindex)?;
        bind(fd.as_raw_fd(), &addr).step("bind")?;

        setsockopt(&fd, sockopt::BindToDevice, &OsString::from(interface))
            .step("setsockopt(SO_BINDTODEVICE)")?;

        let mut socket = Self::from_fd(fd, interface, ifindex);

        if config.promiscuous {
            // Not fatal: timestamps still arrive for frames addressed to us
            match socket.set_promiscuous(true) {
                Ok(changed) => socket.promisc_enabled = changed,
                Err(e) => warn!(interface, error = %e, "Could not enable promiscuous mode"),
            }
        }

        socket.enable_hw_timestamps()?;

        setsockopt(
            &socket.fd,
            sockopt::Timestamping,
            &(TimestampingFlag::SOF_TIMESTAMPING_RX_HARDWARE
                | TimestampingFlag::SOF_TIMESTAMPING_RAW_HARDWARE),
        )
        .step("setsockopt(SO_TIMESTAMPING)")?;

        info!(
            interface,
            ifindex,
            promiscuous = socket.promisc_enabled,
            rx_filter = socket.rx_filter,
            "Capture socket ready"
        );
        Ok(socket)
    }

    fn from_fd(fd: OwnedFd, interface: &str, ifindex: u32) -> Self {
        // recvmsg hands the kernel the full capacity, not the length
        let mut cmsg_buf = cmsg_space!([TimeSpec; 3]);
        cmsg_buf.reserve(CMSG_BUFFER_SIZE);
        Self {
            fd,
            interface: interface.to_owned(),
            ifindex,
            promisc_enabled: false,
            rx_filter: HWTSTAMP_FILTER_NONE,
            cmsg_buf,
            truncated: 0,
        }
    }

    /// Interface name.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Kernel interface index.
    #[must_use]
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// True if this socket switched the interface into promiscuous mode.
    #[must_use]
    pub fn promiscuous_enabled(&self) -> bool {
        self.promisc_enabled
    }

    /// Clear the interface's promiscuous flag if this socket set it.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::Socket`] if the interface flags cannot be
    /// read or written.
    pub fn restore_promiscuous(&mut self) -> HwtsResult<()> {
        if !self.promisc_enabled {
            debug!(interface = %self.interface, "Promiscuous mode not set by us, leaving flags");
            return Ok(());
        }
        self.set_promiscuous(false)?;
        self.promisc_enabled = false;
        info!(interface = %self.interface, "Promiscuous mode disabled");
        Ok(())
    }

    /// Set or clear `IFF_PROMISC`. Returns true if the flag changed.
    fn set_promiscuous(&self, on: bool) -> HwtsResult<bool> {
        let mut ifr = ifreq_for(&self.interface)?;
        let raw = self.fd.as_raw_fd();

        // SAFETY: ifr is a valid, NUL-terminated ifreq for the duration of the call
        unsafe { get_if_flags(raw, &mut ifr) }.step("ioctl(SIOCGIFFLAGS)")?;

        // SAFETY: SIOCGIFFLAGS filled the flags member of the union
        let flags = unsafe { ifr.ifr_ifru.ifru_flags };
        #[allow(clippy::cast_possible_truncation)]
        let promisc = libc::IFF_PROMISC as libc::c_short;
        let updated = if on { flags | promisc } else { flags & !promisc };
        if updated == flags {
            return Ok(false);
        }

        ifr.ifr_ifru.ifru_flags = updated;
        // SAFETY: as above
        unsafe { set_if_flags(raw, &mut ifr) }.step("ioctl(SIOCSIFFLAGS)")?;
        Ok(true)
    }

    /// Ask the driver to timestamp every received packet.
    fn enable_hw_timestamps(&mut self) -> HwtsResult<()> {
        let mut config = HwTstampConfig {
            flags: 0,
            tx_type: HWTSTAMP_TX_OFF,
            rx_filter: HWTSTAMP_FILTER_ALL,
        };
        let mut ifr = ifreq_for(&self.interface)?;
        ifr.ifr_ifru.ifru_data = ptr::addr_of_mut!(config).cast::<libc::c_char>();

        // SAFETY: ifr_data points at `config`, which outlives the call
        unsafe { set_hw_tstamp(self.fd.as_raw_fd(), &mut ifr) }.step("ioctl(SIOCSHWTSTAMP)")?;

        // Drivers may widen or narrow the requested filter
        self.rx_filter = config.rx_filter;
        if config.rx_filter != HWTSTAMP_FILTER_ALL {
            warn!(
                interface = %self.interface,
                rx_filter = config.rx_filter,
                "Driver did not apply the all-packets receive filter"
            );
        }
        Ok(())
    }
}

impl FrameSource for CaptureSocket {
    fn recv(&mut self, buf: &mut [u8], ancillary: &mut Vec<Ancillary>) -> io::Result<usize> {
        ancillary.clear();

        let mut iov = [IoSliceMut::new(buf)];
        let msg = recvmsg::<LinkAddr>(
            self.fd.as_raw_fd(),
            &mut iov,
            Some(&mut self.cmsg_buf),
            MsgFlags::MSG_DONTWAIT,
        )?;

        match msg.cmsgs() {
            Ok(cmsgs) => ancillary.extend(cmsgs.map(|cmsg| to_ancillary(&cmsg))),
            // The frame itself is intact; only its control data is unreadable
            Err(_) => {
                self.truncated += 1;
                if self.truncated == 1 || self.truncated % WARN_EVERY == 0 {
                    warn!(
                        interface = %self.interface,
                        total = self.truncated,
                        "Control data truncated, frame has no timestamp"
                    );
                }
            }
        }
        Ok(msg.bytes)
    }
}

/// Translate one control message into a typed entry.
fn to_ancillary(cmsg: &ControlMessageOwned) -> Ancillary {
    match cmsg {
        ControlMessageOwned::ScmTimestampsns(ts) => Ancillary::Timestamping(TimestampSet {
            software: record_from(&ts.system),
            hw_transformed: record_from(&ts.hw_trans),
            hw_raw: record_from(&ts.hw_raw),
        }),
        ControlMessageOwned::ScmTimestampns(_) => Ancillary::Other {
            level: libc::SOL_SOCKET,
            kind: libc::SCM_TIMESTAMPNS,
        },
        ControlMessageOwned::ScmTimestamp(_) => Ancillary::Other {
            level: libc::SOL_SOCKET,
            kind: libc::SCM_TIMESTAMP,
        },
        ControlMessageOwned::ScmRights(_) => Ancillary::Other {
            level: libc::SOL_SOCKET,
            kind: libc::SCM_RIGHTS,
        },
        ControlMessageOwned::Ipv4PacketInfo(_) => Ancillary::Other {
            level: libc::IPPROTO_IP,
            kind: libc::IP_PKTINFO,
        },
        other => {
            debug!(cmsg = ?other, "Unrecognised control message");
            Ancillary::Other { level: -1, kind: -1 }
        }
    }
}

/// Kernel timespec to record; unrepresentable values count as absent.
fn record_from(ts: &TimeSpec) -> TimestampRecord {
    #[allow(clippy::useless_conversion)]
    let (sec, nsec) = (i64::from(ts.tv_sec()), i64::from(ts.tv_nsec()));
    TimestampRecord::from_timespec(sec, nsec).unwrap_or(TimestampRecord::ZERO)
}

/// `ifreq` carrying only the interface name.
fn ifreq_for(interface: &str) -> HwtsResult<libc::ifreq> {
    let name = interface.as_bytes();
    if name.is_empty() || name.len() >= libc::IFNAMSIZ || name.contains(&0) {
        return Err(HwtsError::Config(format!(
            "invalid interface name '{interface}' (1 to {} bytes, no NUL)",
            libc::IFNAMSIZ - 1
        )));
    }

    // SAFETY: ifreq is plain old data; all-zero is a valid value
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name) {
        *dst = libc::c_char::from_ne_bytes([*src]);
    }
    Ok(ifr)
}

/// Link-layer address receiving all protocols on `ifindex`.
fn link_addr(ifindex: u32) -> HwtsResult<LinkAddr> {
    let ifindex = libc::c_int::try_from(ifindex)
        .map_err(|_| HwtsError::Config(format!("interface index {ifindex} out of range")))?;

    // SAFETY: sockaddr_ll is plain old data; all-zero is a valid value
    let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
    sll.sll_family = libc::AF_PACKET as libc::c_ushort;
    sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
    sll.sll_ifindex = ifindex;

    #[allow(clippy::cast_possible_truncation)]
    let len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
    // SAFETY: the pointer and length describe the sockaddr_ll above
    unsafe { LinkAddr::from_raw(ptr::addr_of!(sll).cast::<libc::sockaddr>(), Some(len)) }
        .ok_or_else(|| HwtsError::Config("could not build link-layer address".into()))
}

fn check_interface_exists(interface: &str) -> HwtsResult<()> {
    ifreq_for(interface)?;
    let path = format!("/sys/class/net/{interface}");
    if !Path::new(&path).exists() {
        return Err(HwtsError::Config(format!(
            "interface '{interface}' not found (expected {path})"
        )));
    }
    Ok(())
}

fn has_cap_net_raw() -> bool {
    let Ok(status) = fs::read_to_string("/proc/self/status") else {
        return false;
    };

    for line in status.lines() {
        if let Some(value) = line.strip_prefix("CapEff:\t") {
            if let Ok(bits) = u64::from_str_radix(value.trim(), 16) {
                return (bits & (1u64 << CAP_NET_RAW_BIT)) != 0;
            }
            break;
        }
    }
    false
}

/// Warn early when the socket call is going to fail with `EPERM`.
fn check_raw_socket_privilege() {
    // SAFETY: geteuid has no preconditions
    let is_root = unsafe { libc::geteuid() == 0 };
    if !is_root && !has_cap_net_raw() {
        warn!("Raw packet capture requires CAP_NET_RAW (or root)");
    }
}
