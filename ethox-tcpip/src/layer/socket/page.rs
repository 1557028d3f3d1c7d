use alloc::vec::Vec;
use core::ops::RangeInclusive;

use crate::config::Config;
use crate::layer::ip::IpParams;
use crate::layer::tcp::ControlBlock;
use crate::managed::{IndexList, Link};
use crate::wire::SeqNumber;

use super::{LocalBinding, Owner, PageId, Protocol, SlotState};

/// One entry of a page.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) state: SlotState,
    pub(crate) owner: Owner,
    pub(crate) local: LocalBinding,
    pub(crate) port: u16,
    pub(crate) kind: SocketKind,
}

/// The protocol specific part of a socket.
#[derive(Debug)]
pub(crate) enum SocketKind {
    Udp(UdpSocket),
    Tcp(ControlBlock),
}

/// A datagram socket, the data path is not handled here.
#[derive(Debug)]
pub(crate) struct UdpSocket {
    pub(crate) ip: IpParams,
}

/// The sockets of one protocol and address family.
#[derive(Debug)]
pub(crate) struct Page {
    pub(crate) id: PageId,
    pub(crate) slots: Vec<Slot>,
    links: Vec<Link>,
    free: IndexList,
    any: IndexList,
    next_port: u16,
}

impl SocketKind {
    /// The state of a freshly acquired socket.
    pub(crate) fn new(protocol: Protocol, config: &Config) -> Self {
        match protocol {
            Protocol::Udp => SocketKind::Udp(UdpSocket { ip: IpParams::udp(config.tcp.ttl) }),
            Protocol::Tcp => SocketKind::Tcp(ControlBlock::new(&config.tcp, SeqNumber(0))),
        }
    }

    pub(crate) fn ip_mut(&mut self) -> &mut IpParams {
        match self {
            SocketKind::Udp(udp) => &mut udp.ip,
            SocketKind::Tcp(tcb) => &mut tcb.ip,
        }
    }
}

impl Slot {
    fn unused(kind: SocketKind) -> Self {
        Slot {
            state: SlotState::Unused,
            owner: Owner(0),
            local: LocalBinding::Any,
            port: 0,
            kind,
        }
    }

    /// Whether the slot holds a local port.
    pub(crate) fn is_bound(&self) -> bool {
        match self.state {
            SlotState::Bound | SlotState::Listen | SlotState::Active => true,
            SlotState::Unused | SlotState::Used => false,
        }
    }

    pub(crate) fn tcp(&self) -> Option<&ControlBlock> {
        match &self.kind {
            SocketKind::Tcp(tcb) => Some(tcb),
            SocketKind::Udp(_) => None,
        }
    }

    pub(crate) fn tcp_mut(&mut self) -> Option<&mut ControlBlock> {
        match &mut self.kind {
            SocketKind::Tcp(tcb) => Some(tcb),
            SocketKind::Udp(_) => None,
        }
    }
}

impl Page {
    pub(crate) fn new(id: PageId, count: usize, config: &Config) -> Self {
        let mut slots = Vec::with_capacity(count);
        slots.extend((0..count).map(|_| Slot::unused(SocketKind::new(id.protocol(), config))));

        let mut links = Vec::new();
        links.resize(count, Link::default());

        // Pushed in reverse so that the lowest index is handed out first.
        let mut free = IndexList::new();
        for idx in (0..count).rev() {
            free.push(&mut links, idx);
        }

        Page {
            id,
            slots,
            links,
            free,
            any: IndexList::new(),
            next_port: *config.ephemeral_ports.start(),
        }
    }

    /// Take a slot from the free list and mark it used.
    pub(crate) fn take(&mut self, owner: Owner, kind: SocketKind) -> Option<usize> {
        let idx = self.free.pop(&mut self.links)?;
        let slot = &mut self.slots[idx];
        debug_assert_eq!(slot.state, SlotState::Unused);
        *slot = Slot {
            state: SlotState::Used,
            owner,
            local: LocalBinding::Any,
            port: 0,
            kind,
        };
        Some(idx)
    }

    /// Return a slot to the free list.
    ///
    /// Does not touch the memory of a control block, it must have been released before.
    pub(crate) fn give_back(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if slot.state == SlotState::Unused {
            return;
        }
        slot.state = SlotState::Unused;
        slot.port = 0;
        self.any.remove(&mut self.links, idx);
        self.free.push(&mut self.links, idx);
    }

    /// Record the local address and port of a slot.
    pub(crate) fn bind(&mut self, idx: usize, local: LocalBinding, port: u16) {
        let slot = &mut self.slots[idx];
        slot.local = local;
        slot.port = port;
        slot.state = SlotState::Bound;
        if local == LocalBinding::Any {
            self.any.push(&mut self.links, idx);
        }
    }

    /// The number of free slots.
    pub(crate) fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// The number of slots bound to the wildcard address.
    pub(crate) fn wildcard_slots(&self) -> usize {
        self.any.len()
    }

    /// Whether `port` is bound on an address overlapping `local`.
    pub(crate) fn is_port_used(&self, port: u16, local: LocalBinding) -> bool {
        // Wildcard bindings overlap with everything.
        let wildcard = self.any.iter(&self.links)
            .any(|idx| self.slots[idx].port == port);
        if wildcard {
            return true;
        }

        self.slots.iter()
            .filter(|slot| slot.is_bound() && slot.port == port)
            .any(|slot| match (local, slot.local) {
                (LocalBinding::Any, _) | (_, LocalBinding::Any) => true,
                (LocalBinding::Addr(a), LocalBinding::Addr(b)) => a == b,
            })
    }

    /// Find an unused ephemeral port for `local`, advancing the cursor.
    ///
    /// Probes each port of the range at most once.
    pub(crate) fn next_ephemeral(
        &mut self,
        range: &RangeInclusive<u16>,
        local: LocalBinding,
    ) -> Option<u16> {
        let (start, end) = (*range.start(), *range.end());
        let size = usize::from(end - start) + 1;

        for _ in 0..size {
            let port = if range.contains(&self.next_port) { self.next_port } else { start };
            self.next_port = if port == end { start } else { port + 1 };

            if !self.is_port_used(port, local) {
                return Some(port);
            }
        }

        None
    }
}
