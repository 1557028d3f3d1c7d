//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! The header logic is contained in `wire` and the processing part in this module. The
//! [`socket`] registry owns all per-socket state and forwards stream sockets to the [`tcp`]
//! engine. Both talk to the rest of the stack only through the interfaces in [`ip`]: an address
//! manager deciding whether an interface may be used, and an IP layer that frames and sends
//! segments.
//!
//! ## Sending
//!
//! Data is never handed to the IP layer as a finished buffer. Instead, the IP layer reserves a
//! frame and calls back twice: once to copy a slice of the payload out of the memory pool, and
//! once to render the header after it has summed the payload for the checksum. The callbacks
//! capture a snapshot of the control block by value, so they stay valid even if the IP layer
//! decides to fragment and calls the payload copy several times.
//!
//! ## Errors
//!
//! Operations on the registry return a [`Result`] and reject bad arguments immediately. The
//! transmission helpers instead use the tri-state [`TxResult`]: an interface that is offline or a
//! lower layer without free frames is not an error but *dropped*, to be retried by the main
//! function.
//!
//! [`socket`]: socket/index.html
//! [`tcp`]: tcp/index.html
//! [`ip`]: ip/index.html
//! [`Result`]: type.Result.html
//! [`TxResult`]: enum.TxResult.html
use core::fmt;

pub mod ip;
pub mod socket;
pub mod tcp;

#[cfg(test)]
mod mock;

/// The result type of registry operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors of the socket registry and the tcp engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The combination of address family and protocol has no configured page.
    NoProtocolSupport,

    /// The socket owner is not one of the configured upper layers.
    InvalidOwner,

    /// The socket id does not refer to an allocated socket.
    InvalidSocket,

    /// An argument was out of range.
    InvalidArgument,

    /// The local address and port are already bound by another socket.
    ///
    /// Also returned if no ephemeral port is left.
    AddressInUse,

    /// The local address is not configured, offline, of the wrong family, or not usable for the
    /// protocol of the socket.
    AddressNotAvailable,

    /// The memory pool could not provide enough room for the data.
    OutOfMemory,

    /// The operation requires an established connection.
    NotConnected,

    /// The operation was not permitted.
    ///
    /// Returned when the socket is in a state or of a protocol that does not implement the
    /// operation.
    Illegal,

    /// There were not enough resources, e.g. no free slot on a page.
    ///
    /// The main difference towards `Illegal` is that it would have been legal with more
    /// resources.
    Exhausted,
}

/// Outcome of an internal transmission step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "a dropped transmission needs to be retried"]
pub enum TxResult {
    /// All requested segments were handed to the IP layer, or nothing needed to be sent.
    Ok,

    /// Temporarily impossible, try again on a later tick.
    ///
    /// The interface was offline or the IP layer had no frame available.
    Dropped,

    /// The IP layer refused the segment for good, e.g. no route or no neighbour.
    Error,
}

impl TxResult {
    /// Query whether the result was `Ok`.
    pub fn is_ok(self) -> bool {
        self == TxResult::Ok
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoProtocolSupport   => write!(f, "protocol not supported"),
            Error::InvalidOwner        => write!(f, "invalid socket owner"),
            Error::InvalidSocket       => write!(f, "invalid socket"),
            Error::InvalidArgument     => write!(f, "invalid argument"),
            Error::AddressInUse        => write!(f, "address in use"),
            Error::AddressNotAvailable => write!(f, "address not available"),
            Error::OutOfMemory         => write!(f, "out of memory"),
            Error::NotConnected        => write!(f, "not connected"),
            Error::Illegal             => write!(f, "operation not permitted"),
            Error::Exhausted           => write!(f, "resources exhausted"),
        }
    }
}

/// Can convert from a wire error.
///
/// This indicates some layer tried to operate on a header but failed.
impl From<crate::wire::Error> for Error {
    fn from(_: crate::wire::Error) -> Self {
        Error::InvalidArgument
    }
}
