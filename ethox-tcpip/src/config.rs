//! Static configuration of the socket registry and the tcp engine.
//!
//! All values are fixed when the [`Registry`] is constructed. Per-socket tunables that may change
//! later, such as the time to live or the Nagle switch, start from the values configured here and
//! are then adjusted through [`Registry::change_parameter`].
//!
//! Durations are measured in ticks of [`Registry::main_function`].
//!
//! [`Registry`]: ../layer/socket/struct.Registry.html
//! [`Registry::change_parameter`]: ../layer/socket/struct.Registry.html#method.change_parameter
//! [`Registry::main_function`]: ../layer/socket/struct.Registry.html#method.main_function
use core::ops::RangeInclusive;

use crate::layer::{Error, Result};

/// Configuration of the whole registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of UDP sockets for IPv4, zero if the page is not supported.
    pub udp_ipv4: usize,
    /// Number of UDP sockets for IPv6.
    pub udp_ipv6: usize,
    /// Number of TCP sockets for IPv4.
    pub tcp_ipv4: usize,
    /// Number of TCP sockets for IPv6.
    pub tcp_ipv6: usize,
    /// Number of upper layers that may own sockets.
    pub owners: u8,
    /// Ports handed out when binding to port zero.
    pub ephemeral_ports: RangeInclusive<u16>,
    /// Parameters of the tcp engine.
    pub tcp: TcpConfig,
}

/// Configuration of the tcp engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpConfig {
    /// Default time to live of emitted segments.
    pub ttl: u8,
    /// The receive window advertised initially and its default ceiling.
    pub max_rx_window: u16,
    /// The receive segment size announced in SYN segments.
    pub rx_mss: u16,
    /// Whether Nagle's algorithm is enabled for new connections.
    pub nagle: bool,
    /// Whether keep-alive probing is enabled for new connections.
    pub keep_alive: bool,
    /// Idle ticks before the first keep-alive probe.
    pub keep_alive_time: u32,
    /// Ticks between unanswered keep-alive probes.
    pub keep_alive_interval: u32,
    /// Unanswered keep-alive probes before the connection is dropped.
    pub keep_alive_probes_max: u16,
    /// Ticks until unacknowledged data is retransmitted.
    pub retransmit_timeout: u32,
    /// Retransmissions of the same data before the connection is dropped.
    pub max_retransmissions: u8,
    /// Attempts to hand a segment to a congested lower layer before the connection is dropped.
    pub transmit_retry_num: u8,
    /// Ticks an acknowledgment may be delayed.
    pub delayed_ack_timeout: u16,
    /// Leave the checksum to the lower layer.
    pub checksum_offload: bool,
    /// Seed of the initial send sequence numbers.
    pub initial_sequence: u32,
}

impl Config {
    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.ephemeral_ports.is_empty() || *self.ephemeral_ports.start() == 0 {
            return Err(Error::InvalidArgument);
        }
        if self.owners == 0 {
            return Err(Error::InvalidArgument);
        }
        // Slot indices are packed into the low bits of a socket id.
        let max = crate::layer::socket::SocketId::MAX_SLOTS;
        if [self.udp_ipv4, self.udp_ipv6, self.tcp_ipv4, self.tcp_ipv6].iter().any(|&n| n > max) {
            return Err(Error::InvalidArgument);
        }
        self.tcp.validate()
    }
}

impl TcpConfig {
    /// Check that all timers can expire.
    pub fn validate(&self) -> Result<()> {
        if self.ttl == 0
            || self.retransmit_timeout == 0
            || self.keep_alive_time == 0
            || self.keep_alive_interval == 0
            || self.keep_alive_probes_max == 0
            || self.delayed_ack_timeout == 0
            || self.rx_mss == 0
        {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            udp_ipv4: 4,
            udp_ipv6: 0,
            tcp_ipv4: 4,
            tcp_ipv6: 0,
            owners: 1,
            ephemeral_ports: 49152..=65535,
            tcp: TcpConfig::default(),
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            ttl: 64,
            max_rx_window: 0x4000,
            rx_mss: 1460,
            nagle: false,
            keep_alive: false,
            keep_alive_time: 7200,
            keep_alive_interval: 75,
            keep_alive_probes_max: 9,
            retransmit_timeout: 10,
            max_retransmissions: 5,
            transmit_retry_num: 3,
            delayed_ack_timeout: 2,
            checksum_offload: false,
            initial_sequence: 0x1f2e_3d4c,
        }
    }
}
