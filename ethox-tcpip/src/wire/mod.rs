/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides functions to extract fields
from sequences of octets, and to insert fields into sequences of octets. This happens in the
lowercase structures, e.g. [`tcp_header`], which wrap a plain byte slice and do not own any of
their data.

Header construction in this crate is a *rendering* step: the transmission engine is asked to fill
in a buffer prepared by the IP layer at the moment a frame is sent. There is therefore no owning
packet type, only the byte wrappers and a few small value types ([`SeqNumber`], [`TcpFlags`],
[`IpAddress`]) shared with the layers.

The `packet` family of data structures guarantees that, if the `check_len()` method returned
`Ok(())`, then no field accessor or setter method will panic. When emitting output it is *correct*
to use the unchecked constructor on a buffer of [`tcp_header::header_len`] bytes.

[`tcp_header`]: struct.tcp_header.html
[`tcp_header::header_len`]: struct.tcp_header.html#method.header_len
[`SeqNumber`]: struct.SeqNumber.html
[`TcpFlags`]: struct.TcpFlags.html
[`IpAddress`]: enum.IpAddress.html
*/

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod error;
pub mod ip;
pub mod tcp;

pub use self::error::{Error, Result};

pub use self::ip::{
    Address as IpAddress,
    Family as IpFamily,
    Protocol as IpProtocol,
    SocketAddress};

pub use self::tcp::{
    tcp as tcp_header,
    Flags as TcpFlags,
    MssOption as TcpMssOption,
    SeqNumber};
