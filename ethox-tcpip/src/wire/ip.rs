//! Internet protocol addresses and the internet checksum.
use core::fmt;

enum_with_unknown! {
    /// Internet protocol number, as carried in the pseudo header.
    pub doc enum Protocol(u8) {
        /// Transmission control protocol.
        Tcp = 0x06,
        /// User datagram protocol.
        Udp = 0x11,
    }
}

/// An address family.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Family {
    /// Internet protocol version 4.
    Ipv4,
    /// Internet protocol version 6.
    Ipv6,
}

/// An internetworking address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Address {
    /// An IPv4 address.
    Ipv4([u8; 4]),

    /// An IPv6 address.
    Ipv6([u8; 16]),
}

/// An address together with a transport layer port.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct SocketAddress {
    /// The internet address.
    pub addr: Address,
    /// The port number, in host byte order.
    pub port: u16,
}

impl Address {
    /// The unspecified IPv4 address.
    pub const UNSPECIFIED_V4: Address = Address::Ipv4([0; 4]);

    /// The unspecified IPv6 address.
    pub const UNSPECIFIED_V6: Address = Address::Ipv6([0; 16]);

    /// Create an address wrapping an IPv4 address with the given octets.
    pub const fn v4(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address::Ipv4([a0, a1, a2, a3])
    }

    /// Return an address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Ipv4(addr) => &addr[..],
            Address::Ipv6(addr) => &addr[..],
        }
    }

    /// The address family of this address.
    pub fn family(&self) -> Family {
        match self {
            Address::Ipv4(_) => Family::Ipv4,
            Address::Ipv6(_) => Family::Ipv6,
        }
    }

    /// Query whether the address is a multicast address.
    pub fn is_multicast(&self) -> bool {
        match self {
            Address::Ipv4(addr) => addr[0] & 0xf0 == 224,
            Address::Ipv6(addr) => addr[0] == 0xff,
        }
    }

    /// Query whether the address falls into the "unspecified" range.
    pub fn is_unspecified(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }
}

impl Family {
    /// The unspecified address of this family.
    pub fn unspecified(self) -> Address {
        match self {
            Family::Ipv4 => Address::UNSPECIFIED_V4,
            Family::Ipv6 => Address::UNSPECIFIED_V6,
        }
    }
}

impl SocketAddress {
    /// Combine an address and a port.
    pub fn new(addr: Address, port: u16) -> Self {
        SocketAddress { addr, port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Ipv4(a) => write!(f, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Address::Ipv6(a) => {
                for (i, pair) in a.chunks(2).enumerate() {
                    if i != 0 {
                        write!(f, ":")?;
                    }
                    write!(f, "{:x}", u16::from_be_bytes([pair[0], pair[1]]))?;
                }
                Ok(())
            },
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            Address::Ipv4(_) => write!(f, "{}:{}", self.addr, self.port),
            Address::Ipv6(_) => write!(f, "[{}]:{}", self.addr, self.port),
        }
    }
}

/// The internet checksum, RFC 1071.
///
/// All sums are returned *without* the final complement so that partial sums over separate
/// buffers can be combined in any order.
pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::{Address, Protocol};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        // For each 32-byte chunk...
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            // ... take by 2 bytes and sum them.
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        // Sum the rest that does not fit the last 32-byte chunk,
        // taking by 2 bytes.
        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // Add the last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute an IP pseudo header checksum.
    ///
    /// Returns `None` when the two addresses belong to different families.
    pub fn pseudo_header(src_addr: &Address, dst_addr: &Address,
                         protocol: Protocol, length: u32) -> Option<u16> {
        match (src_addr, dst_addr) {
            (Address::Ipv4(src_addr), Address::Ipv4(dst_addr)) => {
                let mut proto_len = [0u8; 4];
                proto_len[1] = protocol.into();
                NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

                Some(combine(&[
                    data(&src_addr[..]),
                    data(&dst_addr[..]),
                    data(&proto_len[..])
                ]))
            },

            (Address::Ipv6(src_addr), Address::Ipv6(dst_addr)) => {
                let mut proto_len = [0u8; 8];
                proto_len[7] = protocol.into();
                NetworkEndian::write_u32(&mut proto_len[0..4], length);
                Some(combine(&[
                    data(&src_addr[..]),
                    data(&dst_addr[..]),
                    data(&proto_len[..])
                ]))
            },

            _ => None,
        }
    }
}
