use bitflags::bitflags;
use spin::Mutex;

use crate::config::TcpConfig;
use crate::layer::ip::{AddrId, IpParams};
use crate::managed::{Handle, MemoryPool};
use crate::wire::{SeqNumber, SocketAddress, TcpFlags};

bitflags! {
    /// Persistent options and state bits of a connection.
    ///
    /// In contrast to the control flags of a segment these stay set across many segments.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ConnectionFlags: u8 {
        /// The MSS option is included in emitted segments until the SYN is acknowledged.
        const MSS_OPT = 0x01;
        /// An acknowledgment could not be sent and is being retried.
        const WAIT_CONF = 0x02;
        /// The application requested a graceful close.
        const CLOSE = 0x04;
        /// Nagle's algorithm is enabled.
        const NAGLE = 0x08;
        /// The control block belongs to an open socket.
        const ACTIVE = 0x10;
        /// Buffered data waits for the next transmission pass.
        const TRANSMIT = 0x20;
        /// Keep-alive probing is enabled.
        const KEEP_ALIVE = 0x40;
        /// The last segment was dropped by the lower layer and must be retried.
        const RETRY = 0x80;
    }
}

/// The addressing of an open connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    /// The local address the connection is sent from.
    pub local: AddrId,
    /// The local port.
    pub local_port: u16,
    /// The remote endpoint.
    pub remote: SocketAddress,
}

/// Keep-alive settings and progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeepAlive {
    pub(crate) time: u32,
    pub(crate) interval: u32,
    pub(crate) probes_max: u16,
    /// Ticks left until the next probe, counting down.
    pub(crate) timer: Option<u32>,
    pub(crate) probes: u16,
}

/// State shared with asynchronous contexts, only touched inside the exclusive section.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    /// Buffer() is copying into the memory of the connection.
    pub(crate) copy_ongoing: bool,
    /// Acknowledged bytes whose release waits for the copy to finish.
    pub(crate) data_to_free: usize,
    /// The whole memory is to be released once the copy finished.
    pub(crate) release_pending: bool,
    /// Control flags to emit, kept for retransmission until acknowledged.
    pub(crate) ctrl_flags: TcpFlags,
    /// Ticks since an acknowledgment became due, `None` if none is due.
    pub(crate) ack_timer: Option<u16>,
    /// Received segments not yet acknowledged.
    pub(crate) num_unack: u8,
}

/// The send side state of one connection.
///
/// All byte counts are offsets into the send buffer, which starts at the oldest unacknowledged
/// byte `send_una`:
///
/// ```text
///   send_una         send_nxt
///   |                |
///   [ in flight      | queued        | free         ]
///   0                curr_buff       used_buff      avail_buff
/// ```
///
/// The invariant `curr_buff <= used_buff <= avail_buff` holds between all operations, as does
/// `send_buff >= curr_buff` where `send_buff` marks the furthest byte ever put on the wire.
#[derive(Debug)]
pub struct ControlBlock {
    pub(crate) conn: Option<Connection>,
    pub(crate) ip: IpParams,

    pub(crate) send_una: SeqNumber,
    pub(crate) send_nxt: SeqNumber,
    /// Window advertised by the peer.
    pub(crate) send_wnd: usize,
    /// Largest segment the peer accepts.
    pub(crate) send_mss: usize,

    pub(crate) avail_buff: usize,
    pub(crate) used_buff: usize,
    pub(crate) send_buff: usize,
    pub(crate) curr_buff: usize,
    pub(crate) memory: Option<Handle>,

    pub(crate) recv_nxt: SeqNumber,
    pub(crate) recv_wnd: u16,
    pub(crate) recv_wnd_max: u16,
    pub(crate) recv_mss: u16,

    /// Ticks since the retransmission timer was armed.
    pub(crate) rtx_timer: Option<u32>,
    pub(crate) num_rtx: u8,
    pub(crate) num_retry: u8,
    pub(crate) keep_alive: KeepAlive,

    pub(crate) flags: ConnectionFlags,
    pub(crate) zwp_sent: bool,

    pub(crate) shared: Mutex<Shared>,
}

/// The outcome of an acknowledgment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Acknowledged {
    /// Bytes of application data that were confirmed by the peer.
    pub confirmed: usize,
    /// The FIN of a requested close was acknowledged.
    pub fin_acked: bool,
}

impl ControlBlock {
    /// A control block with the defaults of the configuration.
    pub fn new(config: &TcpConfig, iss: SeqNumber) -> Self {
        let mut flags = ConnectionFlags::ACTIVE;
        flags.set(ConnectionFlags::NAGLE, config.nagle);
        flags.set(ConnectionFlags::KEEP_ALIVE, config.keep_alive);

        ControlBlock {
            conn: None,
            ip: IpParams::tcp(config.ttl, config.checksum_offload),
            send_una: iss,
            send_nxt: iss,
            send_wnd: usize::from(config.max_rx_window),
            send_mss: 0,
            avail_buff: 0,
            used_buff: 0,
            send_buff: 0,
            curr_buff: 0,
            memory: None,
            recv_nxt: SeqNumber::default(),
            recv_wnd: config.max_rx_window,
            recv_wnd_max: config.max_rx_window,
            recv_mss: config.rx_mss,
            rtx_timer: None,
            num_rtx: 0,
            num_retry: 0,
            keep_alive: KeepAlive {
                time: config.keep_alive_time,
                interval: config.keep_alive_interval,
                probes_max: config.keep_alive_probes_max,
                timer: None,
                probes: 0,
            },
            flags,
            zwp_sent: false,
            shared: Mutex::new(Shared::default()),
        }
    }

    /// The addressing of the connection, if it was opened.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// The persistent flags.
    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    /// The oldest unacknowledged sequence number.
    pub fn send_una(&self) -> SeqNumber {
        self.send_una
    }

    /// The next sequence number to be sent.
    pub fn send_nxt(&self) -> SeqNumber {
        self.send_nxt
    }

    /// The window advertised by the peer.
    pub fn send_wnd(&self) -> usize {
        self.send_wnd
    }

    /// Bytes handed over by the application and not yet acknowledged.
    pub fn used_buff(&self) -> usize {
        self.used_buff
    }

    /// Bytes placed on the wire and not yet acknowledged.
    pub fn curr_buff(&self) -> usize {
        self.curr_buff
    }

    /// Capacity reserved from the memory pool.
    pub fn avail_buff(&self) -> usize {
        self.avail_buff
    }

    /// Whether a zero window probe was sent since the window closed.
    pub fn zero_window_probe_sent(&self) -> bool {
        self.zwp_sent
    }

    /// Whether the retransmission timer is armed.
    pub fn rtx_timer_running(&self) -> bool {
        self.rtx_timer.is_some()
    }

    /// The number of retransmission timeouts of the current data.
    pub fn retransmissions(&self) -> u8 {
        self.num_rtx
    }

    /// Enable or disable Nagle's algorithm.
    pub fn set_nagle(&mut self, enabled: bool) {
        self.flags.set(ConnectionFlags::NAGLE, enabled);
    }

    /// Record that the SYN exchange completed.
    ///
    /// Called by the connection state handling once the peer's SYN was received and, for an
    /// active open, our SYN was acknowledged. `recv_nxt` is the sequence number following the
    /// peer's SYN, `window` and `mss` what the peer announced.
    pub fn establish(&mut self, recv_nxt: SeqNumber, window: u16, mss: u16) {
        self.recv_nxt = recv_nxt;
        self.send_wnd = usize::from(window);
        self.send_mss = usize::from(mss);
        self.restart_keep_alive();
    }

    /// Enable or disable keep-alive probing.
    pub fn set_keep_alive(&mut self, enabled: bool) {
        self.flags.set(ConnectionFlags::KEEP_ALIVE, enabled);
        self.restart_keep_alive();
    }

    /// Open the connection towards `conn`.
    ///
    /// Resets the send side to the initial sequence number `iss`, keeping configured tunables.
    pub(crate) fn open(&mut self, conn: Connection, iss: SeqNumber) {
        self.conn = Some(conn);
        self.send_una = iss;
        self.send_nxt = iss;
        self.curr_buff = 0;
        self.send_buff = 0;
        self.zwp_sent = false;
        self.flags.insert(ConnectionFlags::ACTIVE);
    }

    /// Arm the retransmission timer, starting a new retry budget.
    pub(crate) fn start_rtx_timer(&mut self) {
        self.rtx_timer = Some(0);
        self.num_rtx = 0;
    }

    pub(crate) fn stop_rtx_timer(&mut self) {
        self.rtx_timer = None;
        self.num_rtx = 0;
    }

    pub(crate) fn stop_retry(&mut self) {
        self.flags.remove(ConnectionFlags::RETRY);
        self.num_retry = 0;
    }

    /// Restart the keep-alive countdown after activity on the connection.
    pub(crate) fn restart_keep_alive(&mut self) {
        if self.flags.contains(ConnectionFlags::KEEP_ALIVE) {
            self.keep_alive.timer = Some(self.keep_alive.time);
            self.keep_alive.probes = 0;
        } else {
            self.keep_alive.timer = None;
        }
    }

    /// Request an acknowledgment for a received segment.
    ///
    /// The acknowledgment is delayed until the timer expires, or piggy-backed on the next data
    /// segment.
    pub fn ack_due(&mut self) {
        let mut shared = self.shared.lock();
        shared.num_unack = shared.num_unack.saturating_add(1);
        if shared.ack_timer.is_none() {
            shared.ack_timer = Some(0);
        }
    }

    /// Process an acknowledgment and window update of the peer.
    ///
    /// Acknowledged data is released from the memory pool, unless Buffer() is currently copying
    /// into the same memory, in which case the release is deferred until the copy is done.
    /// Acknowledgments of unsent data and old acknowledgments are ignored.
    pub fn acknowledge(
        &mut self,
        memory: &mut dyn MemoryPool,
        ack: SeqNumber,
        window: u16,
    ) -> Acknowledged {
        let acked = match ack.checked_distance(self.send_una) {
            Some(acked) => acked,
            None => return Acknowledged::default(),
        };
        if ack > self.send_nxt {
            return Acknowledged::default();
        }

        if self.send_wnd == 0 && window != 0 {
            self.zwp_sent = false;
        }
        self.send_wnd = usize::from(window);
        self.restart_keep_alive();

        if acked == 0 {
            // Duplicate, a probe into a closed window restarts the timer.
            if self.send_wnd == 0 && self.rtx_timer_running() {
                self.start_rtx_timer();
            }
            self.schedule_unsent();
            return Acknowledged::default();
        }

        let mut result = Acknowledged::default();
        let all_acked;
        {
            let mut shared = self.shared.lock();
            let outstanding = self.used_buff - shared.data_to_free;
            // Only a FIN that was put on the wire occupies the byte after the data.
            let fin_covered = shared.ctrl_flags.fin() && acked > outstanding;
            if self.used_buff != 0 {
                // The FIN occupies sequence space but no buffer.
                let to_free = acked.min(self.used_buff);
                if shared.copy_ongoing {
                    shared.data_to_free += to_free;
                } else {
                    Self::free_data(
                        memory,
                        &mut self.memory,
                        &mut self.avail_buff,
                        &mut self.used_buff,
                        &mut self.send_buff,
                        &mut self.curr_buff,
                        to_free);
                }
                result.confirmed = to_free;
            }

            result.fin_acked = ack == self.send_nxt && fin_covered;
            all_acked = ack == self.send_nxt && self.used_buff == shared.data_to_free;
            if all_acked {
                shared.ctrl_flags = TcpFlags::empty();
            }
        }

        self.send_una = ack;
        if all_acked {
            self.stop_rtx_timer();
            self.flags.remove(ConnectionFlags::MSS_OPT);
        } else {
            self.start_rtx_timer();
        }
        self.stop_retry();
        self.schedule_unsent();

        net_trace!("tcp: ack {} confirmed {} window {}", ack, result.confirmed, window);
        result
    }

    /// Mark data that is buffered but not on the wire for the next transmission pass.
    ///
    /// Data held back by Nagle's algorithm or a closed window may be sendable after any
    /// acknowledgment or window update.
    fn schedule_unsent(&mut self) {
        if self.used_buff > self.curr_buff {
            self.flags.insert(ConnectionFlags::TRANSMIT);
        }
    }

    /// Whether a requested FIN occupies sequence space, sent but not yet acknowledged.
    pub fn fin_in_flight(&self) -> bool {
        let shared = self.shared.lock();
        let outstanding = self.used_buff - shared.data_to_free;
        shared.ctrl_flags.fin() && self.send_nxt - self.send_una > outstanding
    }

    /// Release the memory of acknowledged bytes.
    ///
    /// Takes the fields apart so that it can be called while the shared section is held.
    fn free_data(
        memory: &mut dyn MemoryPool,
        handle: &mut Option<Handle>,
        avail_buff: &mut usize,
        used_buff: &mut usize,
        send_buff: &mut usize,
        curr_buff: &mut usize,
        amount: usize,
    ) {
        debug_assert!(amount <= *used_buff);
        if amount == 0 {
            return;
        }
        if let Some(id) = *handle {
            // Release everything once nothing remains buffered.
            let release = if *used_buff == amount { *avail_buff } else { amount };
            *avail_buff = memory.decrease(id, release);
            if *avail_buff == 0 {
                *handle = None;
            }
        }
        *used_buff -= amount;
        *send_buff = send_buff.saturating_sub(amount);
        // An old segment may acknowledge more than was retransmitted.
        *curr_buff = curr_buff.saturating_sub(amount);
    }

    /// Finish a copy into the send buffer, performing deferred releases.
    pub(crate) fn end_copy(&mut self, memory: &mut dyn MemoryPool) {
        let mut shared = self.shared.lock();
        shared.copy_ongoing = false;
        if shared.release_pending {
            shared.release_pending = false;
            shared.data_to_free = 0;
            drop(shared);
            self.release(memory);
            return;
        }
        let to_free = core::mem::replace(&mut shared.data_to_free, 0);
        Self::free_data(
            memory,
            &mut self.memory,
            &mut self.avail_buff,
            &mut self.used_buff,
            &mut self.send_buff,
            &mut self.curr_buff,
            to_free);
    }

    /// Discard all buffered data and return the memory to the pool.
    ///
    /// If Buffer() is still copying into the memory, the release happens when it finishes.
    pub fn release(&mut self, memory: &mut dyn MemoryPool) {
        {
            let mut shared = self.shared.lock();
            if shared.copy_ongoing {
                shared.release_pending = true;
                return;
            }
            shared.data_to_free = 0;
        }

        if let Some(handle) = self.memory.take() {
            memory.decrease(handle, self.avail_buff);
        }
        self.avail_buff = 0;
        self.used_buff = 0;
        self.send_buff = 0;
        self.curr_buff = 0;
    }
}
