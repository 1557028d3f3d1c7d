//! The tcp transmission engine.
//!
//! A [`ControlBlock`] holds the send side state of a connection: sequence numbers, the window of
//! the peer, a view into its buffer in the [`MemoryPool`] and the retransmission timers. The
//! connection states (SYN-SENT, ESTABLISHED, ...) are tracked by the caller. This module only
//! provides operations that keep the send side consistent no matter in which order they are
//! invoked, retransmitting with nothing buffered is simply a no-op.
//!
//! ## Sending
//!
//! Data is first copied into the send buffer with [`ControlBlock::buffer`] and then cut into
//! segments by [`ControlBlock::transmit`]. The segment size follows the window of the peer, its
//! maximum segment size and, if enabled, Nagle's algorithm. A closed window is probed with a
//! single byte once per window-closed period.
//!
//! ## Collaborators
//!
//! The operations do not own the memory pool, interfaces or the IP layer. They are instead given
//! an [`Io`] bundling all three for the duration of the call. Every transmission first locks the
//! interface of the connection through an [`Online`] guard. An offline interface silently turns
//! the operation into a no-op or reports [`TxResult::Dropped`] to be retried on a later tick.
//!
//! [`ControlBlock`]: struct.ControlBlock.html
//! [`ControlBlock::buffer`]: struct.ControlBlock.html#method.buffer
//! [`ControlBlock::transmit`]: struct.ControlBlock.html#method.transmit
//! [`MemoryPool`]: ../../managed/trait.MemoryPool.html
//! [`Io`]: struct.Io.html
//! [`Online`]: ../ip/struct.Online.html
//! [`TxResult::Dropped`]: ../enum.TxResult.html#variant.Dropped
use crate::managed::MemoryPool;
use super::ip::{AddrManager, IpTransmit};

mod control;
mod segment;
mod timer;
mod tx;

#[cfg(test)]
mod tests;

pub use control::{
    Acknowledged,
    Connection,
    ConnectionFlags,
    ControlBlock,
    KeepAlive};

pub use segment::Segment;
pub use timer::Tick;
pub use tx::{send_rst, send_rst_ack, send_syn_ack_stateless, Source};

/// Length of a header without options.
pub const HEADER_SIZE: usize = 20;

/// The largest amount of data handed to the segmenting loop at once.
pub const MAX_WINDOW: usize = 0xFFFF;

/// The collaborators of one engine operation.
///
/// The fields are borrowed separately so that the payload copy can read the memory pool while
/// the IP layer is being called.
pub struct Io<'a> {
    /// Pool holding the send buffers of all connections.
    pub memory: &'a mut dyn MemoryPool,
    /// The state of local addresses and their interfaces.
    pub addrm: &'a dyn AddrManager,
    /// The IP layer.
    pub ip: &'a mut dyn IpTransmit,
}
