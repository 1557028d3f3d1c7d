//! Rendering of outgoing headers.
//!
//! A [`Segment`] is a copy of all header fields, taken from the control block when the segment is
//! handed to the IP layer. It is rendered only later, when the IP layer has reserved a frame and
//! summed the payload, so it must not borrow the control block.
//!
//! [`Segment`]: struct.Segment.html
use crate::wire::{tcp_header, SeqNumber, TcpFlags, TcpMssOption};
use crate::wire::ip::checksum;

use super::control::{ConnectionFlags, ControlBlock, Connection};

/// The header fields of one outgoing segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Segment {
    /// The local port.
    pub src_port: u16,
    /// The remote port.
    pub dst_port: u16,
    /// Sequence number of the first payload octet, or of the SYN/FIN.
    pub seq: SeqNumber,
    /// The next sequence number expected from the peer.
    pub ack: SeqNumber,
    /// Control flags.
    pub flags: TcpFlags,
    /// The receive window.
    pub window: u16,
    /// The receive segment size to announce, if the option is to be included.
    pub mss: Option<u16>,
}

impl Segment {
    /// The length of the header, options included.
    pub fn header_len(&self) -> usize {
        match self.mss {
            Some(_) => tcp_header::MIN_LEN + TcpMssOption::LEN,
            None => tcp_header::MIN_LEN,
        }
    }

    /// Write the header into `buffer`.
    ///
    /// With a `payload_sum`, the partial checksum over pseudo header and payload, the checksum
    /// field is completed. Without one, the field is left zero for a lower layer to fill in.
    ///
    /// # Panics
    /// This function panics if `buffer` is shorter than [`header_len`](#method.header_len).
    pub fn render(&self, buffer: &mut [u8], payload_sum: Option<u16>) {
        let header_len = self.header_len();
        let buffer = &mut buffer[..header_len];
        let header = tcp_header::new_unchecked_mut(buffer);

        header.set_src_port(self.src_port);
        header.set_dst_port(self.dst_port);
        header.set_seq_number(self.seq);
        header.set_ack_number(self.ack);
        header.set_header_len(header_len);
        header.set_flags(self.flags);
        header.set_window_len(self.window);
        header.set_checksum(0);
        header.set_urgent_at(0);

        if let Some(mss) = self.mss {
            TcpMssOption(mss).emit(header.options_mut());
        }

        if let Some(sum) = payload_sum {
            let value = !checksum::combine(&[sum, checksum::data(header.as_bytes())]);
            header.set_checksum(value);
        }
    }
}

impl ControlBlock {
    /// Snapshot the header of a segment starting `index` bytes after `send_una`.
    pub(crate) fn segment(&self, conn: &Connection, index: usize, flags: TcpFlags) -> Segment {
        Segment {
            src_port: conn.local_port,
            dst_port: conn.remote.port,
            seq: self.send_una + index,
            ack: self.recv_nxt,
            flags,
            window: self.recv_wnd,
            mss: if self.flags.contains(ConnectionFlags::MSS_OPT) {
                Some(self.recv_mss)
            } else {
                None
            },
        }
    }
}
