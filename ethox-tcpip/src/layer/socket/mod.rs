//! The socket registry.
//!
//! Sockets live in four fixed tables, one *page* for each combination of transport protocol and
//! address family. A [`SocketId`] names the page and the slot within it, so every lookup is a
//! plain index operation. Unused slots are chained into a free list of the page and recycled
//! LIFO. Slots bound to the wildcard address are additionally chained into a second list, as they
//! conflict with every other binding of the same port.
//!
//! The registry handles the generic part of each operation: validating the id and the local
//! address, choosing ephemeral ports and the slot states. Anything specific to a protocol is
//! dispatched on the protocol of the slot. Stream sockets own a tcp
//! [`ControlBlock`] and forward to the transmission engine, datagram sockets only keep their IP
//! parameters.
//!
//! ## Lifecycle
//!
//! ```text
//!   acquire      bind         listen
//! Unused -> Used -> Bound ---------> Listen
//!                    |
//!                    +-- connect --> Active -- close --> (FIN acknowledged) --> Unused
//! ```
//!
//! A closed datagram socket returns to `Unused` immediately. A stream socket that is closed while
//! not yet connected, aborted, or whose interface went down also returns to `Unused` at once, any
//! data it buffered is released to the memory pool.
//!
//! [`SocketId`]: struct.SocketId.html
//! [`ControlBlock`]: ../tcp/struct.ControlBlock.html
use core::fmt;

use crate::layer::ip::AddrId;
use crate::wire::IpFamily;

mod page;
mod param;
mod registry;


pub use param::ParameterId;
pub use registry::Registry;

/// Bits of a socket id that hold the slot index.
const INDEX_BITS: u32 = 14;

/// Identifies one socket of the registry.
///
/// The upper bits select the page, the lower 14 bits the slot within the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(pub u32);

/// A table of sockets of one protocol and address family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageId {
    /// Datagram sockets over IPv4.
    UdpIpv4 = 0,
    /// Datagram sockets over IPv6.
    UdpIpv6 = 1,
    /// Stream sockets over IPv4.
    TcpIpv4 = 2,
    /// Stream sockets over IPv6.
    TcpIpv6 = 3,
}

/// The transport protocol of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Datagrams.
    Udp,
    /// A byte stream.
    Tcp,
}

/// The upper layer a socket belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Owner(pub u8);

/// The local address a socket is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalBinding {
    /// All local addresses of the family of the socket.
    Any,
    /// One configured address.
    Addr(AddrId),
}

/// Whether a socket could send right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// The interface is online and the neighbour is resolved.
    Ready,
    /// The link layer address of the remote is still being resolved.
    Pending,
    /// The socket is in the wrong state or its interface is offline.
    NotReady,
}

/// The state of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// On the free list.
    Unused,
    /// Acquired but without a local address.
    Used,
    /// Local address and port are assigned.
    Bound,
    /// Waiting for connection requests.
    Listen,
    /// A connection is open or being opened.
    Active,
}

impl SocketId {
    /// The largest number of slots a page may have.
    pub const MAX_SLOTS: usize = 1 << INDEX_BITS;

    pub(crate) fn new(page: PageId, index: usize) -> Self {
        debug_assert!(index < Self::MAX_SLOTS);
        SocketId((page as u32) << INDEX_BITS | index as u32)
    }

    /// The page of the socket, `None` if the id is malformed.
    pub fn page(self) -> Option<PageId> {
        PageId::from_raw(self.0 >> INDEX_BITS)
    }

    /// The slot index within the page.
    pub fn index(self) -> usize {
        self.0 as usize & (Self::MAX_SLOTS - 1)
    }
}

impl PageId {
    /// All pages, in the order of their ids.
    pub const ALL: [PageId; 4] = [
        PageId::UdpIpv4,
        PageId::UdpIpv6,
        PageId::TcpIpv4,
        PageId::TcpIpv6,
    ];

    /// The page holding sockets of a protocol and family.
    pub fn new(family: IpFamily, protocol: Protocol) -> Self {
        match (protocol, family) {
            (Protocol::Udp, IpFamily::Ipv4) => PageId::UdpIpv4,
            (Protocol::Udp, IpFamily::Ipv6) => PageId::UdpIpv6,
            (Protocol::Tcp, IpFamily::Ipv4) => PageId::TcpIpv4,
            (Protocol::Tcp, IpFamily::Ipv6) => PageId::TcpIpv6,
        }
    }

    /// The address family of the sockets of this page.
    pub fn family(self) -> IpFamily {
        match self {
            PageId::UdpIpv4 | PageId::TcpIpv4 => IpFamily::Ipv4,
            PageId::UdpIpv6 | PageId::TcpIpv6 => IpFamily::Ipv6,
        }
    }

    /// The transport protocol of the sockets of this page.
    pub fn protocol(self) -> Protocol {
        match self {
            PageId::UdpIpv4 | PageId::UdpIpv6 => Protocol::Udp,
            PageId::TcpIpv4 | PageId::TcpIpv6 => Protocol::Tcp,
        }
    }

    fn from_raw(raw: u32) -> Option<Self> {
        PageId::ALL.get(raw as usize).cloned()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.page() {
            Some(page) => write!(f, "{:?}#{}", page, self.index()),
            None => write!(f, "invalid#{}", self.0),
        }
    }
}
