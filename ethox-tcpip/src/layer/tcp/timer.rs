//! Periodic processing of a connection.
use crate::config::TcpConfig;
use crate::layer::TxResult;

use super::Io;
use super::control::{ConnectionFlags, ControlBlock};

/// The outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tick {
    /// The connection continues.
    Alive,

    /// A retry budget ran out, the connection must be aborted.
    Abort,
}

impl ControlBlock {
    /// Advance all timers of the connection by one tick.
    ///
    /// In this order: a requested close whose FIN is not yet on the wire is flushed, or else data
    /// marked for transmission is sent, a segment dropped by the IP layer is retried, the
    /// retransmission timer, the delayed acknowledgment and the keep-alive countdown are
    /// processed.
    pub fn tick(&mut self, io: &mut Io, config: &TcpConfig) -> Tick {
        if self.flags.contains(ConnectionFlags::CLOSE) {
            // The FIN follows the last byte, which may still wait for Nagle or the window.
            self.flags.remove(ConnectionFlags::TRANSMIT);
            if !self.flags.contains(ConnectionFlags::RETRY) && !self.fin_in_flight() {
                let _ = self.send_fin(io);
            }
        } else if self.flags.contains(ConnectionFlags::TRANSMIT) {
            // A dropped segment is picked up by the retry below on the next tick.
            let _ = self.transmit(io);
        }

        if self.retransmission_tick(io, config) == Tick::Abort
            || self.ack_tick(io, config) == Tick::Abort
            || self.keep_alive_tick(io) == Tick::Abort
        {
            return Tick::Abort;
        }

        Tick::Alive
    }

    fn retransmission_tick(&mut self, io: &mut Io, config: &TcpConfig) -> Tick {
        if self.flags.contains(ConnectionFlags::RETRY) {
            self.num_retry = self.num_retry.saturating_add(1);
            if self.retransmit_unsent(io).is_ok() {
                self.stop_retry();
            } else if self.num_retry >= config.transmit_retry_num {
                net_warn!("tcp: giving up after {} transmission attempts", self.num_retry);
                return Tick::Abort;
            }
            return Tick::Alive;
        }

        let elapsed = match self.rtx_timer {
            Some(elapsed) => elapsed + 1,
            None => return Tick::Alive,
        };
        self.rtx_timer = Some(elapsed);

        if elapsed >= config.retransmit_timeout {
            if self.num_rtx >= config.max_retransmissions {
                net_warn!("tcp: giving up after {} retransmissions", self.num_rtx);
                return Tick::Abort;
            }

            net_debug!("tcp: retransmission timeout at {}", self.send_una);
            if self.retransmit(io) != TxResult::Ok {
                self.flags.insert(ConnectionFlags::RETRY);
            }
        }

        Tick::Alive
    }

    fn ack_tick(&mut self, io: &mut Io, config: &TcpConfig) -> Tick {
        let mut give_up = false;
        {
            let mut shared = self.shared.lock();
            let elapsed = match shared.ack_timer {
                Some(elapsed) => elapsed.saturating_add(1),
                None => return Tick::Alive,
            };

            if self.flags.contains(ConnectionFlags::WAIT_CONF) {
                // Retrying a failed acknowledgment each tick.
                shared.ack_timer = Some(elapsed);
                give_up = elapsed >= u16::from(config.transmit_retry_num);
            } else if elapsed >= config.delayed_ack_timeout {
                shared.ack_timer = None;
            } else {
                shared.ack_timer = Some(elapsed);
                return Tick::Alive;
            }
        }

        if self.send_ack(io).is_ok() {
            return Tick::Alive;
        }

        if give_up {
            net_warn!("tcp: acknowledgment could not be sent");
            return Tick::Abort;
        }

        let mut shared = self.shared.lock();
        if shared.ack_timer.is_none() {
            self.flags.insert(ConnectionFlags::WAIT_CONF);
            shared.ack_timer = Some(0);
        }
        Tick::Alive
    }

    fn keep_alive_tick(&mut self, io: &mut Io) -> Tick {
        let remaining = match self.keep_alive.timer {
            Some(remaining) => remaining.saturating_sub(1),
            None => return Tick::Alive,
        };

        if remaining > 0 {
            self.keep_alive.timer = Some(remaining);
            return Tick::Alive;
        }

        if self.keep_alive.probes >= self.keep_alive.probes_max {
            net_warn!("tcp: peer did not answer {} keep-alive probes", self.keep_alive.probes);
            return Tick::Abort;
        }

        self.keep_alive.probes += 1;
        self.keep_alive.timer = Some(self.keep_alive.interval);
        // An unanswered probe is covered by the next one.
        let _ = self.send_keep_alive(io);
        Tick::Alive
    }
}
