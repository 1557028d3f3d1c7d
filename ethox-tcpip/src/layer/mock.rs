//! Test doubles of the collaborators.
use core::cell::Cell;
use std::vec::Vec;

use crate::layer::TxResult;
use crate::layer::ip::{AddrId, AddrManager, CopyFn, HeaderFn, IpTransmit, Request};
use crate::wire::{tcp_header, IpAddress, SeqNumber, TcpFlags};
use crate::wire::ip::checksum;

/// The state of the interface behind an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Link {
    Online,
    Shutdown,
    Offline,
}

/// An address manager with a fixed table of addresses.
pub(crate) struct Addresses {
    pub(crate) table: Vec<(IpAddress, Link)>,
    pub(crate) neighbors: Vec<IpAddress>,
    pub(crate) locks: Cell<isize>,
}

impl Addresses {
    pub(crate) fn new(table: &[IpAddress]) -> Self {
        Addresses {
            table: table.iter().map(|&addr| (addr, Link::Online)).collect(),
            neighbors: Vec::new(),
            locks: Cell::new(0),
        }
    }

    pub(crate) fn set_link(&mut self, id: AddrId, link: Link) {
        self.table[usize::from(id.0)].1 = link;
    }

    fn link(&self, id: AddrId) -> Option<Link> {
        self.table.get(usize::from(id.0)).map(|&(_, link)| link)
    }

    fn lock(&self) -> bool {
        self.locks.set(self.locks.get() + 1);
        true
    }
}

impl AddrManager for Addresses {
    fn local_addr(&self, id: AddrId) -> Option<IpAddress> {
        self.table.get(usize::from(id.0)).map(|&(addr, _)| addr)
    }

    fn is_online(&self, id: AddrId) -> bool {
        self.link(id) == Some(Link::Online)
    }

    fn lock_if_online(&self, id: AddrId) -> bool {
        self.is_online(id) && self.lock()
    }

    fn lock_if_online_shutdown(&self, id: AddrId) -> bool {
        match self.link(id) {
            Some(Link::Online) | Some(Link::Shutdown) => self.lock(),
            _ => false,
        }
    }

    fn unlock(&self, _: AddrId) {
        self.locks.set(self.locks.get() - 1);
    }

    fn route(&self, remote: &IpAddress) -> Option<AddrId> {
        self.table.iter()
            .position(|&(addr, link)| link == Link::Online && addr.family() == remote.family())
            .map(|idx| AddrId(idx as u8))
    }

    fn neighbor_known(&self, _: AddrId, remote: &IpAddress) -> bool {
        self.neighbors.contains(remote)
    }
}

/// A segment as it was framed by the recording IP layer.
pub(crate) struct Sent {
    pub(crate) local: AddrId,
    pub(crate) remote: IpAddress,
    pub(crate) header: Vec<u8>,
    pub(crate) payload: Vec<u8>,
    /// Checksum over pseudo header, header and payload, `0xffff` when correct.
    pub(crate) verify: Option<u16>,
}

impl Sent {
    pub(crate) fn tcp(&self) -> &tcp_header {
        tcp_header::new_unchecked(&self.header)
    }

    pub(crate) fn flags(&self) -> TcpFlags {
        self.tcp().flags()
    }

    pub(crate) fn seq(&self) -> SeqNumber {
        self.tcp().seq_number()
    }
}

/// An IP layer recording every segment.
pub(crate) struct Recorder {
    pub(crate) source: IpAddress,
    pub(crate) sent: Vec<Sent>,
    /// Segments accepted before `failure` is returned.
    pub(crate) budget: Option<usize>,
    pub(crate) failure: TxResult,
}

impl Recorder {
    pub(crate) fn new(source: IpAddress) -> Self {
        Recorder {
            source,
            sent: Vec::new(),
            budget: None,
            failure: TxResult::Dropped,
        }
    }

    /// Payload lengths of all segments.
    pub(crate) fn lengths(&self) -> Vec<usize> {
        self.sent.iter().map(|sent| sent.payload.len()).collect()
    }
}

impl IpTransmit for Recorder {
    fn transmit(
        &mut self,
        request: Request,
        copy: &mut CopyFn,
        header: &mut HeaderFn,
    ) -> TxResult {
        if let Some(budget) = self.budget.as_mut() {
            if *budget == 0 {
                return self.failure;
            }
            *budget -= 1;
        }

        // Copy in two parts, like a fragmenting layer would.
        let mut payload = vec![0; request.payload_len];
        let half = payload.len() / 2;
        copy(&mut payload[..half], 0);
        copy(&mut payload[half..], half);

        let total = (request.header_len + request.payload_len) as u32;
        let pseudo = checksum::pseudo_header(
            &self.source, &request.remote, request.params.protocol, total);
        let sum = if request.params.calculate_checksum {
            pseudo.map(|pseudo| checksum::combine(&[pseudo, checksum::data(&payload)]))
        } else {
            None
        };

        let mut buffer = vec![0; request.header_len];
        header(&mut buffer, sum);

        let verify = pseudo.map(|pseudo| checksum::combine(&[
            pseudo,
            checksum::data(&buffer),
            checksum::data(&payload),
        ]));

        self.sent.push(Sent {
            local: request.local,
            remote: request.remote,
            header: buffer,
            payload,
            verify,
        });
        TxResult::Ok
    }
}
