use crate::layer::{Error, Result};

use super::SlotState;
use super::page::{Slot, SocketKind};

enum_with_unknown! {
    /// Per-socket tunables of `Registry::change_parameter`.
    pub doc enum ParameterId(u8) {
        /// Link layer priority of emitted frames, 0 to 7.
        FramePrio = 0,
        /// Time to live or hop limit, not zero.
        Ttl = 1,
        /// IPv6 flow label, 20 bits.
        FlowLabel = 2,
        /// Differentiated services code point, 6 bits.
        Dscp = 3,
        /// Nagle's algorithm, 0 or 1.
        Nagle = 4,
        /// Keep-alive probing, 0 or 1.
        KeepAlive = 5,
        /// Idle ticks before the first keep-alive probe, not zero.
        KeepAliveTime = 6,
        /// Ticks between keep-alive probes, not zero.
        KeepAliveInterval = 7,
        /// Unanswered probes before the connection is dropped, not zero.
        KeepAliveProbesMax = 8,
        /// Receive window and its ceiling, 16 bits.
        RxWndMax = 9,
    }
}

impl ParameterId {
    /// Whether the parameter only exists for stream sockets.
    pub fn is_tcp(self) -> bool {
        match self {
            ParameterId::Nagle
            | ParameterId::KeepAlive
            | ParameterId::KeepAliveTime
            | ParameterId::KeepAliveInterval
            | ParameterId::KeepAliveProbesMax
            | ParameterId::RxWndMax => true,
            _ => false,
        }
    }
}

fn flag(value: u32) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidArgument),
    }
}

fn non_zero(value: u32) -> Result<u32> {
    if value == 0 {
        Err(Error::InvalidArgument)
    } else {
        Ok(value)
    }
}

fn at_most(value: u32, max: u32) -> Result<u32> {
    if value > max {
        Err(Error::InvalidArgument)
    } else {
        Ok(value)
    }
}

impl Slot {
    /// Validate and apply a parameter.
    pub(crate) fn change_parameter(&mut self, param: ParameterId, value: u32) -> Result<()> {
        if let ParameterId::Unknown(_) = param {
            return Err(Error::InvalidArgument);
        }

        if !param.is_tcp() {
            let ip = self.kind.ip_mut();
            match param {
                ParameterId::FramePrio => ip.frame_prio = at_most(value, 7)? as u8,
                ParameterId::Ttl => ip.ttl = at_most(non_zero(value)?, 0xFF)? as u8,
                ParameterId::FlowLabel => ip.flow_label = at_most(value, 0xF_FFFF)?,
                ParameterId::Dscp => ip.dscp = at_most(value, 0x3F)? as u8,
                _ => return Err(Error::InvalidArgument),
            }
            return Ok(());
        }

        let active = self.state == SlotState::Active;
        let tcb = match &mut self.kind {
            SocketKind::Tcp(tcb) => tcb,
            SocketKind::Udp(_) => return Err(Error::Illegal),
        };

        // Only Nagle's algorithm may be switched on an open connection.
        if active && param != ParameterId::Nagle {
            return Err(Error::Illegal);
        }

        match param {
            ParameterId::Nagle => tcb.set_nagle(flag(value)?),
            ParameterId::KeepAlive => tcb.set_keep_alive(flag(value)?),
            ParameterId::KeepAliveTime => tcb.keep_alive.time = non_zero(value)?,
            ParameterId::KeepAliveInterval => tcb.keep_alive.interval = non_zero(value)?,
            ParameterId::KeepAliveProbesMax => {
                tcb.keep_alive.probes_max = at_most(non_zero(value)?, 0xFFFF)? as u16;
            },
            ParameterId::RxWndMax => {
                let window = at_most(value, 0xFFFF)? as u16;
                tcb.recv_wnd = window;
                tcb.recv_wnd_max = window;
            },
            _ => return Err(Error::InvalidArgument),
        }

        net_debug!("socket: {:?} set to {}", param, value);
        Ok(())
    }
}
