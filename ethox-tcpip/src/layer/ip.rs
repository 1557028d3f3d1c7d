//! Interfaces to the surrounding stack.
//!
//! The registry and the tcp engine do not own interfaces or frames. They are handed an
//! [`AddrManager`], which knows which local addresses exist and whether they may currently be
//! used, and an [`IpTransmit`], which frames and sends a single segment.
//!
//! Every transmission path first takes the interface lock through an [`Online`] guard. The lock
//! is non-exclusive, it only keeps the address manager from tearing the interface down while a
//! segment is being prepared, and it is released when the guard goes out of scope.
//!
//! [`AddrManager`]: trait.AddrManager.html
//! [`IpTransmit`]: trait.IpTransmit.html
//! [`Online`]: struct.Online.html
use crate::layer::TxResult;
use crate::wire::{IpAddress, IpProtocol};

/// Identifies a configured local address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddrId(pub u8);

/// Knows about local addresses and the state of their interfaces.
pub trait AddrManager {
    /// The address behind an id, `None` if the id is not configured.
    fn local_addr(&self, id: AddrId) -> Option<IpAddress>;

    /// Whether the interface of the address is online and the address is assigned.
    fn is_online(&self, id: AddrId) -> bool;

    /// Take a shared lock if the address is online.
    fn lock_if_online(&self, id: AddrId) -> bool;

    /// Take a shared lock if the address is online or currently shutting down.
    ///
    /// Used for segments that tear connections down and must still go out while the interface
    /// is being deactivated.
    fn lock_if_online_shutdown(&self, id: AddrId) -> bool;

    /// Release a lock taken by one of the locking methods.
    fn unlock(&self, id: AddrId);

    /// Choose the local address to reach `remote` from.
    fn route(&self, remote: &IpAddress) -> Option<AddrId>;

    /// Whether the link layer address of `remote` is already resolved.
    fn neighbor_known(&self, id: AddrId, remote: &IpAddress) -> bool;
}

/// A shared interface lock, released on drop.
pub struct Online<'a> {
    addrm: &'a dyn AddrManager,
    id: AddrId,
}

impl<'a> Online<'a> {
    /// Lock the interface if the address is online.
    pub fn lock(addrm: &'a dyn AddrManager, id: AddrId) -> Option<Self> {
        if addrm.lock_if_online(id) {
            Some(Online { addrm, id })
        } else {
            None
        }
    }

    /// Lock the interface if the address is online or shutting down.
    pub fn lock_or_shutdown(addrm: &'a dyn AddrManager, id: AddrId) -> Option<Self> {
        if addrm.lock_if_online_shutdown(id) {
            Some(Online { addrm, id })
        } else {
            None
        }
    }

    /// The address that was locked.
    pub fn id(&self) -> AddrId {
        self.id
    }
}

impl Drop for Online<'_> {
    fn drop(&mut self) {
        self.addrm.unlock(self.id)
    }
}

/// Per-socket parameters of the IP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IpParams {
    /// Time to live, or hop limit.
    pub ttl: u8,
    /// Differentiated services code point.
    pub dscp: u8,
    /// IPv6 flow label, 20 bits.
    pub flow_label: u32,
    /// Link layer frame priority, 3 bits.
    pub frame_prio: u8,
    /// The transport protocol of the payload.
    pub protocol: IpProtocol,
    /// Whether the IP layer may fragment the datagram.
    pub may_fragment: bool,
    /// Whether the IP layer must provide the checksum sum over pseudo header and payload.
    pub calculate_checksum: bool,
}

/// One segment handed to the IP layer.
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    /// Header parameters.
    pub params: &'a IpParams,
    /// The local address to send from.
    pub local: AddrId,
    /// The destination.
    pub remote: IpAddress,
    /// Bytes to reserve for the transport header.
    pub header_len: usize,
    /// Bytes of transport payload.
    pub payload_len: usize,
}

/// Callback copying `dest.len()` payload bytes, starting at the given payload offset.
pub type CopyFn<'a> = dyn FnMut(&mut [u8], usize) + 'a;

/// Callback rendering the transport header.
///
/// Receives the header buffer and, when the checksum is to be calculated, the partial sum over
/// the pseudo header and the payload.
pub type HeaderFn<'a> = dyn FnMut(&mut [u8], Option<u16>) + 'a;

/// The IP layer, sending single transport segments.
pub trait IpTransmit {
    /// Frame and send one segment.
    ///
    /// The implementation reserves `header_len + payload_len` bytes, fills the payload through
    /// `copy` (possibly in several parts) and then lets `header` render the transport header.
    fn transmit(
        &mut self,
        request: Request,
        copy: &mut CopyFn,
        header: &mut HeaderFn,
    ) -> TxResult;
}

impl IpParams {
    /// Parameters of a tcp socket.
    pub fn tcp(ttl: u8, checksum_offload: bool) -> Self {
        IpParams {
            ttl,
            dscp: 0,
            flow_label: 0,
            frame_prio: 0,
            protocol: IpProtocol::Tcp,
            may_fragment: true,
            calculate_checksum: !checksum_offload,
        }
    }

    /// Parameters of a udp socket.
    pub fn udp(ttl: u8) -> Self {
        IpParams {
            protocol: IpProtocol::Udp,
            ..IpParams::tcp(ttl, false)
        }
    }
}
