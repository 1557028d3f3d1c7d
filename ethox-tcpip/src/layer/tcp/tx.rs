//! Buffering and segmenting of outgoing data.
use crate::layer::{Error, Result, TxResult};
use crate::layer::ip::{IpParams, Online, Request};
use crate::managed::{Handle, MemoryPool};
use crate::wire::{SeqNumber, TcpFlags};

use super::{Io, MAX_WINDOW};
use super::control::{Connection, ConnectionFlags, ControlBlock};
use super::segment::Segment;

/// Where buffered data comes from.
pub enum Source<'d> {
    /// Bytes supplied by the caller, accepted as a whole or not at all.
    Slice(&'d [u8]),

    /// Bytes pulled from the upper layer.
    ///
    /// The callback is invoked with consecutive chunks of the send buffer and must fill each of
    /// them completely. Returning `false` stops the copy, only the chunks filled before count as
    /// buffered.
    Callback {
        /// Bytes the upper layer has available.
        len: usize,
        /// Fills one chunk.
        copy: &'d mut dyn FnMut(&mut [u8]) -> bool,
    },
}

impl Source<'_> {
    /// The number of bytes offered.
    pub fn len(&self) -> usize {
        match self {
            Source::Slice(data) => data.len(),
            Source::Callback { len, .. } => *len,
        }
    }

    /// Whether nothing is offered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ControlBlock {
    /// Append data to the send buffer.
    ///
    /// When pulling from a callback without `force`, the amount is limited by what the peer
    /// currently accepts and by the memory the pool grants. If the window is closed and nothing
    /// was sent yet, a single byte is fetched to probe it. Otherwise all offered bytes must fit or
    /// nothing is buffered and `OutOfMemory` is returned.
    ///
    /// Returns the number of bytes appended.
    pub fn buffer(
        &mut self,
        memory: &mut dyn MemoryPool,
        source: Source,
        force: bool,
    ) -> Result<usize> {
        self.shared.lock().copy_ongoing = true;
        let result = self.buffer_data(memory, source, force);
        self.end_copy(memory);
        result
    }

    fn buffer_data(
        &mut self,
        memory: &mut dyn MemoryPool,
        mut source: Source,
        force: bool,
    ) -> Result<usize> {
        let decides = !force && matches!(source, Source::Callback { .. });
        let mut len = source.len();

        if decides {
            let window = self.send_wnd.saturating_sub(self.send_buff);
            len = if window != 0 {
                len.min(window)
            } else if self.send_buff == 0 {
                len.min(1)
            } else {
                0
            };
        }

        if len == 0 {
            return Ok(0);
        }

        let mut free = self.avail_buff - self.used_buff;
        if free < len {
            self.avail_buff = self.grow(memory, len - free);
            free = self.avail_buff - self.used_buff;
        }

        if self.avail_buff == 0 || (free < len && !decides) {
            net_warn!("tcp: no memory to buffer {} bytes", len);
            return Err(Error::OutOfMemory);
        }

        let len = len.min(free);
        let handle = match self.memory {
            Some(handle) => handle,
            None => return Err(Error::OutOfMemory),
        };

        let mut copied = 0;
        while copied < len {
            let chunk = memory.linear_mut(handle, self.used_buff + copied);
            if chunk.is_empty() {
                break;
            }
            let count = chunk.len().min(len - copied);
            let chunk = &mut chunk[..count];
            match &mut source {
                Source::Slice(data) => chunk.copy_from_slice(&data[copied..copied + count]),
                Source::Callback { copy, .. } => if !copy(chunk) {
                    break;
                },
            }
            copied += count;
        }

        self.used_buff += copied;
        Ok(copied)
    }

    /// Reserve `extra` more bytes, returning the new capacity.
    fn grow(&mut self, memory: &mut dyn MemoryPool, extra: usize) -> usize {
        match self.memory {
            Some(handle) => memory.increase(handle, extra),
            None => match memory.allocate(extra) {
                Some((handle, granted)) => {
                    self.memory = Some(handle);
                    granted
                },
                None => 0,
            },
        }
    }

    /// Send all buffered data that was not yet put on the wire.
    ///
    /// Does nothing if the interface is offline. A segment dropped by the IP layer marks the
    /// connection for a retry on the next tick.
    pub fn transmit(&mut self, io: &mut Io) -> TxResult {
        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Ok,
        };
        let _online = match Online::lock(io.addrm, conn.local) {
            Some(online) => online,
            None => return TxResult::Ok,
        };

        if self.flags.contains(ConnectionFlags::KEEP_ALIVE) {
            // Not idle while data is in flight.
            self.keep_alive.timer = None;
        }
        self.flags.remove(ConnectionFlags::TRANSMIT);

        let index = self.curr_buff;
        let unsent = (self.used_buff - index).min(MAX_WINDOW);
        if unsent == 0 {
            return TxResult::Ok;
        }

        if !self.rtx_timer_running() {
            self.start_rtx_timer();
        }

        let result = self.send_carrying_ack(io, &conn, unsent, index);
        if result == TxResult::Dropped {
            self.flags.insert(ConnectionFlags::RETRY);
        }
        result
    }

    /// Run the segmenting loop, cancelling a pending acknowledgment if a segment carried it.
    ///
    /// Data held back by Nagle's algorithm or the window leaves the acknowledgment due.
    fn send_carrying_ack(
        &mut self,
        io: &mut Io,
        conn: &Connection,
        len: usize,
        index: usize,
    ) -> TxResult {
        let before = self.send_nxt;
        let result = self.send(io, conn, len, index);
        if self.send_nxt != before {
            self.stop_ack_retransmit();
        }
        result
    }

    /// Retransmit everything from the oldest unacknowledged byte.
    ///
    /// Called when the retransmission timer expired. With Nagle's algorithm only the data that
    /// was already sent is repeated.
    pub fn retransmit(&mut self, io: &mut Io) -> TxResult {
        self.rtx_timer = Some(0);
        self.num_rtx = self.num_rtx.saturating_add(1);

        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Ok,
        };
        let _online = match Online::lock_or_shutdown(io.addrm, conn.local) {
            Some(online) => online,
            None => return TxResult::Ok,
        };

        let len = if self.flags.contains(ConnectionFlags::NAGLE) {
            self.send_buff
        } else {
            self.used_buff.min(MAX_WINDOW)
        };

        self.curr_buff = 0;
        self.zwp_sent = false;
        self.send(io, &conn, len, 0)
    }

    /// Send the data that was queued but never placed on the wire.
    ///
    /// Returns `Dropped` if the interface is not usable.
    pub fn retransmit_unsent(&mut self, io: &mut Io) -> TxResult {
        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Dropped,
        };
        let _online = match Online::lock_or_shutdown(io.addrm, conn.local) {
            Some(online) => online,
            None => return TxResult::Dropped,
        };

        let index = self.curr_buff;
        let len = if self.flags.contains(ConnectionFlags::NAGLE) && index != self.send_buff {
            // A retransmission is ongoing, only repeat what was already sent.
            self.send_buff - index
        } else {
            (self.used_buff - index).min(MAX_WINDOW)
        };

        self.send(io, &conn, len, index)
    }

    /// Send a SYN, or a SYN-ACK when answering a connection request.
    ///
    /// The segment announces our maximum segment size. Returns `Dropped` if the interface is
    /// offline.
    pub fn send_syn(&mut self, io: &mut Io, ack: bool) -> TxResult {
        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Error,
        };
        let _online = match Online::lock(io.addrm, conn.local) {
            Some(online) => online,
            None => return TxResult::Dropped,
        };

        let mut flags = TcpFlags::SYN;
        if ack {
            flags |= TcpFlags::ACK;
        }

        self.flags.insert(ConnectionFlags::MSS_OPT);
        self.shared.lock().ctrl_flags |= flags;
        self.start_rtx_timer();
        self.send(io, &conn, 0, 0)
    }

    /// Send a FIN after all data that is still unsent.
    ///
    /// The FIN is set on the last data segment, so buffered bytes and the FIN leave in the same
    /// pass.
    pub fn send_fin(&mut self, io: &mut Io) -> TxResult {
        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Error,
        };

        let index = self.curr_buff;
        let unsent = (self.used_buff - index).min(MAX_WINDOW);

        self.shared.lock().ctrl_flags = TcpFlags::FIN | TcpFlags::ACK;
        if !self.rtx_timer_running() {
            self.start_rtx_timer();
        }

        let result = match Online::lock_or_shutdown(io.addrm, conn.local) {
            Some(_online) => self.send_carrying_ack(io, &conn, unsent, index),
            None => TxResult::Dropped,
        };
        if result == TxResult::Dropped {
            self.flags.insert(ConnectionFlags::RETRY);
        }
        result
    }

    /// Send a bare acknowledgment.
    ///
    /// A segment that can not be sent because the interface is offline is treated as sent, the
    /// peer will retransmit.
    pub fn send_ack(&mut self, io: &mut Io) -> TxResult {
        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Ok,
        };
        let _online = match Online::lock_or_shutdown(io.addrm, conn.local) {
            Some(online) => online,
            None => return TxResult::Ok,
        };

        let index = self.send_nxt - self.send_una;
        let segment = self.segment(&conn, index, TcpFlags::ACK);
        let result = emit(io, &self.ip, &conn, segment, None, 0);

        if result.is_ok() {
            self.stop_ack_retransmit();
            self.shared.lock().num_unack = 0;
        }
        result
    }

    /// Send a keep-alive probe.
    ///
    /// The probe repeats the sequence number before `send_una`, which the peer must answer with
    /// an acknowledgment.
    pub fn send_keep_alive(&mut self, io: &mut Io) -> TxResult {
        let conn = match self.conn {
            Some(conn) => conn,
            None => return TxResult::Ok,
        };
        let _online = match Online::lock(io.addrm, conn.local) {
            Some(online) => online,
            None => return TxResult::Ok,
        };

        let segment = Segment {
            src_port: conn.local_port,
            dst_port: conn.remote.port,
            seq: self.send_una - 1,
            ack: self.recv_nxt,
            flags: TcpFlags::ACK,
            window: self.recv_wnd,
            mss: None,
        };
        emit(io, &self.ip, &conn, segment, None, 0)
    }

    /// The segmenting loop.
    ///
    /// Sends `len` bytes starting `index` bytes after `send_una`. A window that does not accept
    /// more data ends the loop successfully. Sequence numbers and counters of segments that were
    /// sent stay committed when a later one fails.
    pub(crate) fn send(
        &mut self,
        io: &mut Io,
        conn: &Connection,
        len: usize,
        index: usize,
    ) -> TxResult {
        let mut remaining = len;
        let mut index = index;

        loop {
            let mut seg_len = 0;
            let flags;

            if remaining != 0 {
                seg_len = self.evaluate_data_length(remaining);
                if seg_len == 0 {
                    return TxResult::Ok;
                }

                let mut data_flags = TcpFlags::ACK;
                if remaining == seg_len {
                    data_flags |= TcpFlags::PSH;
                    if self.shared.lock().ctrl_flags.fin() {
                        data_flags |= TcpFlags::FIN;
                    }
                }
                flags = data_flags;
            } else {
                flags = self.shared.lock().ctrl_flags;
                if flags.is_empty() {
                    return TxResult::Ok;
                }
            }

            let segment = self.segment(conn, index, flags);
            let payload = self.memory.map(|handle| (handle, index));
            let result = emit(io, &self.ip, conn, segment, payload, seg_len);
            if !result.is_ok() {
                return result;
            }

            let sent = self.send_nxt - self.send_una;
            self.send_nxt += evaluate_send_next(sent, seg_len, index, flags);
            self.curr_buff += seg_len;
            self.send_buff = self.send_buff.max(self.curr_buff);

            remaining -= seg_len;
            index += seg_len;

            if seg_len == 1 && self.send_wnd == 0 {
                // The probe stays unsent so it is part of the next transmission.
                self.curr_buff -= seg_len;
                self.zwp_sent = true;
            }

            if remaining == 0 || self.zwp_sent {
                return TxResult::Ok;
            }
        }
    }

    /// The payload of the next segment out of `len` remaining bytes.
    pub(crate) fn evaluate_data_length(&self, len: usize) -> usize {
        // The peer may have shrunk its window below what is in flight.
        let window = self.send_wnd.saturating_sub(self.curr_buff);

        if window > 0 {
            if self.flags.contains(ConnectionFlags::NAGLE) {
                self.nagle(window, len)
            } else {
                len.min(self.send_mss).min(window)
            }
        } else if self.curr_buff == 0 && !self.zwp_sent {
            1
        } else {
            0
        }
    }

    /// Nagle's algorithm.
    ///
    /// Full segments are always sent. Smaller ones only when nothing is in flight, otherwise they
    /// are held back to be coalesced with later data.
    pub(crate) fn nagle(&self, window: usize, len: usize) -> usize {
        if window >= self.send_mss && len >= self.send_mss {
            self.send_mss
        } else if self.curr_buff != 0 {
            0
        } else {
            len.min(window)
        }
    }

    fn stop_ack_retransmit(&mut self) {
        self.flags.remove(ConnectionFlags::WAIT_CONF);
        self.shared.lock().ack_timer = None;
    }
}

/// How far a segment advances `send_nxt`.
///
/// `sent` is the distance from `send_una` to `send_nxt`, the segment carries `len` bytes from
/// `index`. Only bytes beyond `sent` are new. A SYN or FIN counts only when the segment ends
/// exactly at the new frontier: a segment straddling the frontier with index 50, length 60 and
/// 100 bytes sent advances by 10, its FIN is not counted.
pub(crate) fn evaluate_send_next(sent: usize, len: usize, index: usize, flags: TcpFlags) -> usize {
    let mut new = len;
    let mut seq = sent;

    if index < seq {
        seq -= index;
        new = len.saturating_sub(seq);
    }

    if index + len == seq + new {
        new += flags.sequence_len();
    }

    new
}

/// Send a reset in answer to a segment.
///
/// Does not need a control block, the numbers are taken from the offending segment: `ack_num`
/// and `seq_num` are its acknowledgment and sequence number, `seg_len` its length and `flags` its
/// control flags.
pub fn send_rst(
    io: &mut Io,
    params: &IpParams,
    conn: &Connection,
    ack_num: SeqNumber,
    seq_num: SeqNumber,
    seg_len: usize,
    flags: TcpFlags,
) -> TxResult {
    let _online = match Online::lock_or_shutdown(io.addrm, conn.local) {
        Some(online) => online,
        None => return TxResult::Dropped,
    };

    let (seq, ack, flags) = if flags.ack() {
        (ack_num, SeqNumber(0), TcpFlags::RST)
    } else {
        (SeqNumber(0), seq_num + seg_len, TcpFlags::RST | TcpFlags::ACK)
    };

    let segment = Segment {
        src_port: conn.local_port,
        dst_port: conn.remote.port,
        seq,
        ack,
        flags,
        window: 0,
        mss: None,
    };
    emit(io, params, conn, segment, None, 0)
}

/// Reset a connection whose peer expects `ack_num` next.
pub fn send_rst_ack(
    io: &mut Io,
    params: &IpParams,
    conn: &Connection,
    ack_num: SeqNumber,
) -> TxResult {
    send_rst(io, params, conn, ack_num, SeqNumber(0), 0, TcpFlags::ACK)
}

/// Answer a connection request without allocating a control block.
///
/// Sends a SYN-ACK with sequence number `seq`, acknowledging `ack`.
pub fn send_syn_ack_stateless(
    io: &mut Io,
    params: &IpParams,
    conn: &Connection,
    seq: SeqNumber,
    ack: SeqNumber,
    window: u16,
    mss: u16,
) -> TxResult {
    let _online = match Online::lock(io.addrm, conn.local) {
        Some(online) => online,
        None => return TxResult::Dropped,
    };

    let segment = Segment {
        src_port: conn.local_port,
        dst_port: conn.remote.port,
        seq,
        ack,
        flags: TcpFlags::SYN | TcpFlags::ACK,
        window,
        mss: Some(mss),
    };
    emit(io, params, conn, segment, None, 0)
}

/// Hand one segment to the IP layer.
///
/// The payload is `len` bytes of the buffer `payload`, starting at the given offset.
fn emit(
    io: &mut Io,
    params: &IpParams,
    conn: &Connection,
    segment: Segment,
    payload: Option<(Handle, usize)>,
    len: usize,
) -> TxResult {
    let memory: &dyn MemoryPool = &*io.memory;
    let mut copy = |dest: &mut [u8], offset: usize| {
        if let Some((handle, start)) = payload {
            memory.get(handle, dest, start + offset);
        }
    };
    let mut header = |buffer: &mut [u8], sum: Option<u16>| segment.render(buffer, sum);

    let request = Request {
        params,
        local: conn.local,
        remote: conn.remote.addr,
        header_len: segment.header_len(),
        payload_len: len,
    };

    let result = io.ip.transmit(request, &mut copy, &mut header);
    net_trace!("tcp: {} -> {} [{}] seq={} len={} {:?}",
        conn.local_port, conn.remote, segment.flags, segment.seq, len, result);
    result
}
