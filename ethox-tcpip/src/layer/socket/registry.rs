use crate::config::Config;
use crate::layer::{Error, Result, TxResult};
use crate::layer::ip::{AddrId, AddrManager, IpParams};
use crate::layer::tcp::{self, Connection, ConnectionFlags, ControlBlock, Io, Source, Tick};
use crate::managed::MemoryPool;
use crate::wire::{tcp_header, IpAddress, IpFamily, SeqNumber, SocketAddress};

use super::{LocalBinding, Owner, PageId, Protocol, Readiness, SlotState, SocketId};
use super::page::{Page, Slot, SocketKind};
use super::param::ParameterId;

/// Distance between the initial sequence numbers of consecutive connections.
const ISS_STEP: i32 = 64_000;

/// Segment size assumed when the peer announces none.
const DEFAULT_MSS: u16 = 536;

/// Owns all sockets.
///
/// All tables are allocated by [`new`] and never grow. Operations that transmit take the
/// collaborators as an [`Io`] for the duration of the call.
///
/// [`new`]: #method.new
/// [`Io`]: ../tcp/struct.Io.html
#[derive(Debug)]
pub struct Registry {
    config: Config,
    pages: [Option<Page>; 4],
    iss: SeqNumber,
}

impl Registry {
    /// Allocate the socket tables of a configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let page = |id: PageId, count: usize| if count == 0 {
            None
        } else {
            Some(Page::new(id, count, &config))
        };

        let pages = [
            page(PageId::UdpIpv4, config.udp_ipv4),
            page(PageId::UdpIpv6, config.udp_ipv6),
            page(PageId::TcpIpv4, config.tcp_ipv4),
            page(PageId::TcpIpv6, config.tcp_ipv6),
        ];

        let iss = SeqNumber(config.tcp.initial_sequence as i32);
        Ok(Registry { config, pages, iss })
    }

    /// The configuration the registry was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The number of free slots of a page, `None` if it is not configured.
    pub fn free_slots(&self, page: PageId) -> Option<usize> {
        self.pages[page as usize].as_ref().map(Page::free_slots)
    }

    /// Take a free socket of a family and protocol.
    pub fn acquire(
        &mut self,
        family: IpFamily,
        protocol: Protocol,
        owner: Owner,
    ) -> Result<SocketId> {
        let id = PageId::new(family, protocol);
        if self.pages[id as usize].is_none() {
            return Err(Error::NoProtocolSupport);
        }
        if owner.0 >= self.config.owners {
            return Err(Error::InvalidOwner);
        }

        let kind = SocketKind::new(protocol, &self.config);
        let page = self.page_mut(id)?;
        let idx = match page.take(owner, kind) {
            Some(idx) => idx,
            None => {
                net_debug!("socket: no free slot on {:?}", id);
                return Err(Error::Exhausted);
            },
        };

        let socket = SocketId::new(id, idx);
        net_debug!("socket: acquired {} for owner {}", socket, owner.0);
        Ok(socket)
    }

    /// Assign the local address and port.
    ///
    /// A port of zero selects the next free ephemeral port. Returns the port that was bound.
    pub fn bind(
        &mut self,
        id: SocketId,
        local: LocalBinding,
        port: u16,
        addrm: &dyn AddrManager,
    ) -> Result<u16> {
        let ephemeral = self.config.ephemeral_ports.clone();
        let (page, idx) = self.lookup_mut(id)?;
        check_local_addr(page.id, local, addrm)?;

        if page.slots[idx].state != SlotState::Used {
            return Err(Error::Illegal);
        }
        if let LocalBinding::Addr(addr) = local {
            if !addrm.is_online(addr) {
                return Err(Error::AddressNotAvailable);
            }
        }

        let port = if port == 0 {
            match page.next_ephemeral(&ephemeral, local) {
                Some(port) => port,
                None => {
                    net_debug!("socket: ephemeral ports of {:?} exhausted", page.id);
                    return Err(Error::AddressInUse);
                },
            }
        } else if page.is_port_used(port, local) {
            return Err(Error::AddressInUse);
        } else {
            port
        };

        page.bind(idx, local, port);
        net_debug!("socket: bound {} to {:?} port {}", id, local, port);
        Ok(port)
    }

    /// Wait for connection requests on a bound stream socket.
    pub fn listen(&mut self, id: SocketId) -> Result<()> {
        let slot = self.slot_mut(id)?;
        if slot.tcp().is_none() || slot.state != SlotState::Bound {
            return Err(Error::Illegal);
        }
        slot.state = SlotState::Listen;
        net_debug!("socket: {} listening on port {}", id, slot.port);
        Ok(())
    }

    /// Open a connection from a bound stream socket, sending the SYN.
    pub fn connect(&mut self, id: SocketId, remote: SocketAddress, io: &mut Io) -> Result<()> {
        let iss = self.iss;
        let (page, idx) = self.lookup_mut(id)?;
        if remote.addr.family() != page.id.family()
            || remote.addr.is_unspecified()
            || remote.port == 0
        {
            return Err(Error::InvalidArgument);
        }

        let slot = &mut page.slots[idx];
        if slot.tcp().is_none() || slot.state != SlotState::Bound {
            return Err(Error::Illegal);
        }

        let local = match slot.local {
            LocalBinding::Addr(addr) => addr,
            LocalBinding::Any => io.addrm.route(&remote.addr).ok_or(Error::AddressNotAvailable)?,
        };
        if !io.addrm.is_online(local) {
            return Err(Error::AddressNotAvailable);
        }

        let conn = Connection {
            local,
            local_port: slot.port,
            remote,
        };
        slot.state = SlotState::Active;
        let tcb = match slot.tcp_mut() {
            Some(tcb) => tcb,
            None => return Err(Error::Illegal),
        };
        tcb.open(conn, iss);
        if tcb.send_syn(io, false) == TxResult::Dropped {
            tcb.flags.insert(ConnectionFlags::RETRY);
        }

        self.iss = iss + ISS_STEP as usize;
        net_debug!("socket: {} connecting to {} with iss {}", id, remote, iss);
        Ok(())
    }

    /// Queue data on a connected stream socket.
    ///
    /// The data is sent by the next [`main_function`]. Returns the number of bytes that were
    /// accepted, see [`ControlBlock::buffer`].
    ///
    /// [`main_function`]: #method.main_function
    /// [`ControlBlock::buffer`]: ../tcp/struct.ControlBlock.html#method.buffer
    pub fn send(
        &mut self,
        id: SocketId,
        source: Source,
        force: bool,
        memory: &mut dyn MemoryPool,
    ) -> Result<usize> {
        let tcb = self.connection_mut(id)?;
        if tcb.flags.contains(ConnectionFlags::CLOSE) {
            return Err(Error::Illegal);
        }

        let len = tcb.buffer(memory, source, force)?;
        if len != 0 {
            tcb.flags.insert(ConnectionFlags::TRANSMIT);
        }
        Ok(len)
    }

    /// Close a socket.
    ///
    /// Datagram sockets and stream sockets without connection are freed at once. A connection is
    /// either reset (`abort`) or closed gracefully by sending a FIN after the buffered data, the
    /// slot is then freed once the FIN is acknowledged.
    pub fn close(&mut self, id: SocketId, abort: bool, io: &mut Io) -> Result<()> {
        let (page, idx) = self.lookup_mut(id)?;
        let slot = &mut page.slots[idx];

        let active = slot.state == SlotState::Active;
        let tcb = match &mut slot.kind {
            SocketKind::Tcp(tcb) => tcb,
            SocketKind::Udp(_) => {
                page.give_back(idx);
                net_debug!("socket: closed {}", id);
                return Ok(());
            },
        };

        if !active || abort {
            abort_connection(page, idx, io);
            net_debug!("socket: aborted {}", id);
            return Ok(());
        }

        if tcb.flags.contains(ConnectionFlags::CLOSE) {
            return Ok(());
        }

        tcb.flags.insert(ConnectionFlags::CLOSE);
        tcb.flags.remove(ConnectionFlags::TRANSMIT);
        // A dropped FIN is retried by the main function.
        let _ = tcb.send_fin(io);
        net_debug!("socket: closing {}", id);
        Ok(())
    }

    /// Change a per-socket tunable.
    pub fn change_parameter(&mut self, id: SocketId, param: ParameterId, value: u32) -> Result<()> {
        self.slot_mut(id)?.change_parameter(param, value)
    }

    /// Query whether a socket could send to `remote` right now.
    ///
    /// Stream sockets send to their connected peer and ignore `remote`. Datagram sockets must
    /// name it.
    pub fn is_connection_ready(
        &self,
        id: SocketId,
        remote: Option<IpAddress>,
        addrm: &dyn AddrManager,
    ) -> Result<Readiness> {
        let (page, idx) = self.lookup(id)?;
        let slot = &page.slots[idx];

        let (local, remote) = match &slot.kind {
            SocketKind::Tcp(tcb) => {
                if let Some(remote) = remote {
                    if remote.family() != page.id.family() {
                        return Err(Error::InvalidArgument);
                    }
                }
                match (slot.state, tcb.connection()) {
                    (SlotState::Active, Some(conn)) => (conn.local, conn.remote.addr),
                    _ => return Ok(Readiness::NotReady),
                }
            },
            SocketKind::Udp(_) => {
                let remote = remote.ok_or(Error::InvalidArgument)?;
                if remote.family() != page.id.family() {
                    return Err(Error::InvalidArgument);
                }
                if slot.state != SlotState::Bound {
                    return Ok(Readiness::NotReady);
                }
                let local = match slot.local {
                    LocalBinding::Addr(addr) => Some(addr),
                    LocalBinding::Any => addrm.route(&remote),
                };
                match local {
                    Some(local) => (local, remote),
                    None => return Ok(Readiness::NotReady),
                }
            },
        };

        if !addrm.is_online(local) {
            Ok(Readiness::NotReady)
        } else if addrm.neighbor_known(local, &remote) {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Pending)
        }
    }

    /// Record that the SYN exchange of a connection completed.
    pub fn establish(
        &mut self,
        id: SocketId,
        recv_nxt: SeqNumber,
        window: u16,
        mss: u16,
    ) -> Result<()> {
        if mss == 0 {
            return Err(Error::InvalidArgument);
        }
        self.connection_mut(id)?.establish(recv_nxt, window, mss);
        net_debug!("socket: {} established, window {} mss {}", id, window, mss);
        Ok(())
    }

    /// Complete the SYN exchange from the received SYN-ACK segment.
    ///
    /// Takes the receive sequence, window and segment size from the header and processes the
    /// acknowledgment of our SYN.
    pub fn establish_from_segment(
        &mut self,
        id: SocketId,
        segment: &[u8],
        memory: &mut dyn MemoryPool,
    ) -> Result<()> {
        let header = tcp_header::new_checked(segment)?;
        let flags = header.flags();
        if !flags.syn() || !flags.ack() {
            return Err(Error::InvalidArgument);
        }
        let mss = header.mss_option()?.map(|option| option.0).unwrap_or(DEFAULT_MSS);

        self.establish(id, header.seq_number() + 1, header.window_len(), mss)?;
        self.acknowledge(id, header.ack_number(), header.window_len(), memory)?;
        Ok(())
    }

    /// Process an acknowledgment of the peer.
    ///
    /// Returns the number of data bytes it confirmed. A connection that was closed gracefully is
    /// freed once its FIN is acknowledged.
    pub fn acknowledge(
        &mut self,
        id: SocketId,
        ack: SeqNumber,
        window: u16,
        memory: &mut dyn MemoryPool,
    ) -> Result<usize> {
        let (page, idx) = self.lookup_mut(id)?;
        let slot = &mut page.slots[idx];
        if slot.state != SlotState::Active {
            return Err(Error::NotConnected);
        }
        let tcb = slot.tcp_mut().ok_or(Error::Illegal)?;

        let acked = tcb.acknowledge(memory, ack, window);
        if acked.fin_acked && tcb.flags.contains(ConnectionFlags::CLOSE) {
            tcb.release(memory);
            page.give_back(idx);
            net_debug!("socket: {} closed", id);
        }
        Ok(acked.confirmed)
    }

    /// Advance the timers of all connections by one tick.
    ///
    /// Sends data queued with [`send`], retries dropped segments, retransmits, and emits delayed
    /// acknowledgments and keep-alive probes. Connections whose retry budget ran out are reset
    /// and freed.
    ///
    /// [`send`]: #method.send
    pub fn main_function(&mut self, io: &mut Io) {
        let config = &self.config.tcp;
        for page in self.pages.iter_mut().filter_map(Option::as_mut) {
            if page.id.protocol() != Protocol::Tcp {
                continue;
            }

            for idx in 0..page.slots.len() {
                let slot = &mut page.slots[idx];
                if slot.state != SlotState::Active {
                    continue;
                }
                let tick = match slot.tcp_mut() {
                    Some(tcb) => tcb.tick(io, config),
                    None => continue,
                };
                if tick == Tick::Abort {
                    abort_connection(page, idx, io);
                    net_warn!("socket: dropped {}", SocketId::new(page.id, idx));
                }
            }
        }
    }

    /// Terminate all sockets using an address whose interface went down.
    ///
    /// With `last` set, no interface remains and sockets bound to the wildcard address are
    /// terminated as well. Buffered data is discarded. Returns the number of terminated sockets.
    pub fn interface_down(
        &mut self,
        addr: AddrId,
        last: bool,
        memory: &mut dyn MemoryPool,
    ) -> usize {
        let mut count = 0;
        for page in self.pages.iter_mut().filter_map(Option::as_mut) {
            for idx in 0..page.slots.len() {
                let slot = &mut page.slots[idx];
                if !slot.is_bound() {
                    continue;
                }

                let connected = slot.tcp()
                    .and_then(ControlBlock::connection)
                    .map(|conn| conn.local == addr);
                let affected = match (connected, slot.local) {
                    (Some(on_addr), _) => on_addr || last,
                    (None, LocalBinding::Addr(bound)) => bound == addr,
                    (None, LocalBinding::Any) => last,
                };
                if !affected {
                    continue;
                }

                if let Some(tcb) = slot.tcp_mut() {
                    tcb.release(memory);
                }
                page.give_back(idx);
                count += 1;
                net_debug!("socket: {} terminated, interface down", SocketId::new(page.id, idx));
            }
        }
        count
    }

    /// The state of a socket.
    pub fn state(&self, id: SocketId) -> Result<SlotState> {
        let (page, idx) = self.lookup(id)?;
        Ok(page.slots[idx].state)
    }

    /// The owner of a socket.
    pub fn owner(&self, id: SocketId) -> Result<Owner> {
        let (page, idx) = self.lookup(id)?;
        Ok(page.slots[idx].owner)
    }

    /// The local binding and port of a bound socket.
    pub fn local(&self, id: SocketId) -> Result<(LocalBinding, u16)> {
        let (page, idx) = self.lookup(id)?;
        let slot = &page.slots[idx];
        if !slot.is_bound() {
            return Err(Error::Illegal);
        }
        Ok((slot.local, slot.port))
    }

    /// The IP parameters of a socket.
    pub fn ip_params(&self, id: SocketId) -> Result<IpParams> {
        let (page, idx) = self.lookup(id)?;
        Ok(match &page.slots[idx].kind {
            SocketKind::Udp(udp) => udp.ip,
            SocketKind::Tcp(tcb) => tcb.ip,
        })
    }

    /// The control block of a stream socket.
    pub fn tcp(&self, id: SocketId) -> Result<&ControlBlock> {
        let (page, idx) = self.lookup(id)?;
        page.slots[idx].tcp().ok_or(Error::Illegal)
    }

    /// The control block of a stream socket, for the connection state handling.
    pub fn tcp_mut(&mut self, id: SocketId) -> Result<&mut ControlBlock> {
        self.slot_mut(id)?.tcp_mut().ok_or(Error::Illegal)
    }

    fn page_mut(&mut self, id: PageId) -> Result<&mut Page> {
        self.pages[id as usize].as_mut().ok_or(Error::NoProtocolSupport)
    }

    fn lookup(&self, id: SocketId) -> Result<(&Page, usize)> {
        let page = id.page().ok_or(Error::InvalidSocket)?;
        let page = self.pages[page as usize].as_ref().ok_or(Error::InvalidSocket)?;
        let idx = id.index();
        match page.slots.get(idx) {
            Some(slot) if slot.state != SlotState::Unused => Ok((page, idx)),
            _ => Err(Error::InvalidSocket),
        }
    }

    fn lookup_mut(&mut self, id: SocketId) -> Result<(&mut Page, usize)> {
        let page = id.page().ok_or(Error::InvalidSocket)?;
        let page = self.pages[page as usize].as_mut().ok_or(Error::InvalidSocket)?;
        let idx = id.index();
        match page.slots.get(idx) {
            Some(slot) if slot.state != SlotState::Unused => Ok((page, idx)),
            _ => Err(Error::InvalidSocket),
        }
    }

    fn slot_mut(&mut self, id: SocketId) -> Result<&mut Slot> {
        let (page, idx) = self.lookup_mut(id)?;
        Ok(&mut page.slots[idx])
    }

    fn connection_mut(&mut self, id: SocketId) -> Result<&mut ControlBlock> {
        let slot = self.slot_mut(id)?;
        if slot.tcp().is_none() {
            return Err(Error::Illegal);
        }
        if slot.state != SlotState::Active {
            return Err(Error::NotConnected);
        }
        slot.tcp_mut().ok_or(Error::Illegal)
    }
}

/// Validate a local address for a socket of a page.
fn check_local_addr(page: PageId, local: LocalBinding, addrm: &dyn AddrManager) -> Result<()> {
    let id = match local {
        LocalBinding::Any => return Ok(()),
        LocalBinding::Addr(id) => id,
    };

    let addr = addrm.local_addr(id).ok_or(Error::AddressNotAvailable)?;
    if addr.family() != page.family() {
        return Err(Error::AddressNotAvailable);
    }
    if page.protocol() == Protocol::Tcp && addr.is_multicast() {
        return Err(Error::AddressNotAvailable);
    }
    Ok(())
}

/// Reset a connection and free its slot.
fn abort_connection(page: &mut Page, idx: usize, io: &mut Io) {
    if let Some(tcb) = page.slots[idx].tcp_mut() {
        if let Some(conn) = tcb.connection().cloned() {
            // Without an interface the peer times out on its own.
            let _ = tcp::send_rst_ack(io, &tcb.ip, &conn, tcb.send_nxt());
        }
        tcb.release(io.memory);
    }
    page.give_back(idx);
}
