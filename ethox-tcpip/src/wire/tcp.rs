//! The transmission control protocol header.
use core::{i32, ops, cmp, fmt};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>.
/// Sequence numbers do not have a discontiguity when compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        if rhs > i32::MAX as usize {
            panic!("attempt to add to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        if rhs > i32::MAX as usize {
            panic!("attempt to subtract to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        if result < 0 {
            panic!("attempt to subtract sequence numbers with underflow")
        }
        result as usize
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

impl SeqNumber {
    /// Distance from `earlier` to `self`, or `None` if `self` precedes `earlier`.
    pub fn checked_distance(self, earlier: SeqNumber) -> Option<usize> {
        let result = self.0.wrapping_sub(earlier.0);
        if result < 0 {
            None
        } else {
            Some(result as usize)
        }
    }
}

/// A set of tcp control flags.
///
/// Only the six classic control bits are represented, the congestion notification bits are
/// always emitted as zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u8);

byte_wrapper! {
    /// A byte sequence representing a TCP header, options included.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const DATA_OFF: usize = 12;
    pub(crate) const FLAGS:    usize = 13;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;
    pub(crate) const OPTIONS:  Rest  = 20..;

    pub(crate) const OPT_END: u8 = 0x00;
    pub(crate) const OPT_NOP: u8 = 0x01;
    pub(crate) const OPT_MSS: u8 = 0x02;
}

impl Flags {
    /// No more data from sender.
    pub const FIN: Flags = Flags(0x01);
    /// Synchronize sequence numbers.
    pub const SYN: Flags = Flags(0x02);
    /// Reset the connection.
    pub const RST: Flags = Flags(0x04);
    /// Push function.
    pub const PSH: Flags = Flags(0x08);
    /// Acknowledgment field significant.
    pub const ACK: Flags = Flags(0x10);
    /// Urgent pointer field significant.
    pub const URG: Flags = Flags(0x20);

    const MASK: u8 = 0x3f;

    /// The empty flag set.
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Test if all flags in `other` are also set in `self`.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Test if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Remove all flags in `other`.
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    /// Add all flags in `other`.
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Query the fin flag.
    pub fn fin(self) -> bool {
        self.contains(Flags::FIN)
    }

    /// Query the syn flag.
    pub fn syn(self) -> bool {
        self.contains(Flags::SYN)
    }

    /// Query the rst flag.
    pub fn rst(self) -> bool {
        self.contains(Flags::RST)
    }

    /// Query the psh flag.
    pub fn psh(self) -> bool {
        self.contains(Flags::PSH)
    }

    /// Query the ack flag.
    pub fn ack(self) -> bool {
        self.contains(Flags::ACK)
    }

    /// The sequence space occupied by the control flags alone.
    ///
    /// SYN, FIN and RST each count as a single octet.
    pub fn sequence_len(self) -> usize {
        usize::from(self.syn()) + usize::from(self.fin()) + usize::from(self.rst())
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Flags, &str); 6] = [
            (Flags::SYN, "SYN"), (Flags::ACK, "ACK"), (Flags::PSH, "PSH"),
            (Flags::FIN, "FIN"), (Flags::RST, "RST"), (Flags::URG, "URG"),
        ];
        let mut first = true;
        for &(flag, name) in NAMES.iter() {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// The maximum segment size option.
///
/// The only option this stack emits. It is sent in SYN segments to announce the largest segment
/// the local side is willing to receive.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MssOption(pub u16);

impl MssOption {
    /// The encoded length of the option, kind and length octets included.
    pub const LEN: usize = 4;

    /// Parse the option from the start of an options buffer.
    ///
    /// Returns `Ok(None)` if the buffer starts with a different option.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        match data.first() {
            None => Err(Error::Truncated),
            Some(&field::OPT_MSS) => {
                if data.len() < Self::LEN {
                    return Err(Error::Truncated);
                }
                if usize::from(data[1]) != Self::LEN {
                    return Err(Error::Malformed);
                }
                Ok(Some(MssOption(NetworkEndian::read_u16(&data[2..4]))))
            },
            Some(_) => Ok(None),
        }
    }

    /// Write the option into the start of `data`.
    ///
    /// # Panics
    /// This function panics if `data` is shorter than [`LEN`](#associatedconstant.LEN).
    pub fn emit(&self, data: &mut [u8]) {
        data[0] = field::OPT_MSS;
        data[1] = Self::LEN as u8;
        NetworkEndian::write_u16(&mut data[2..4], self.0);
    }
}

impl tcp {
    /// The length of a header without options.
    pub const MIN_LEN: usize = field::OPTIONS.start;

    /// Imbue a raw octet buffer with TCP header structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with TCP header structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    /// Unwrap the header as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    /// Returns `Err(Error::Malformed)` if the data offset field has a value smaller than the
    /// minimal header length.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < Self::MIN_LEN {
            Err(Error::Truncated)
        } else {
            let header_len = self.header_len();
            if header_len < Self::MIN_LEN {
                Err(Error::Malformed)
            } else if len < header_len {
                Err(Error::Truncated)
            } else {
                Ok(())
            }
        }
    }

    /// Return the source port field.
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::ACK_NUM]))
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> usize {
        usize::from(self.0[field::DATA_OFF] >> 4) * 4
    }

    /// Read all control flags at once.
    pub fn flags(&self) -> Flags {
        Flags(self.0[field::FLAGS] & Flags::MASK)
    }

    /// Return the window size field.
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Return the options, as delimited by the data offset.
    pub fn options(&self) -> &[u8] {
        &self.0[field::OPTIONS.start..self.header_len()]
    }

    /// Find the maximum segment size option, skipping padding.
    pub fn mss_option(&self) -> Result<Option<MssOption>> {
        let mut options = self.options();
        while let Some(&kind) = options.first() {
            match kind {
                field::OPT_END => break,
                field::OPT_NOP => options = &options[1..],
                field::OPT_MSS => return MssOption::parse(options),
                _ => {
                    let len = usize::from(*options.get(1).ok_or(Error::Truncated)?);
                    if len < 2 {
                        return Err(Error::Malformed);
                    }
                    options = options.get(len..).ok_or(Error::Truncated)?;
                },
            }
        }
        Ok(None)
    }

    /// Set the source port field.
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set the header length, in octets.
    ///
    /// The reserved bits of the octet are cleared.
    pub fn set_header_len(&mut self, value: usize) {
        self.0[field::DATA_OFF] = ((value / 4) as u8) << 4;
    }

    /// Set a combination of flags, clearing all others.
    pub fn set_flags(&mut self, Flags(flags): Flags) {
        self.0[field::FLAGS] = flags & Flags::MASK;
    }

    /// Set the window size field.
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Return the options area following the fixed header as a mutable slice.
    pub fn options_mut(&mut self) -> &mut [u8] {
        &mut self.0[field::OPTIONS]
    }
}

impl AsRef<[u8]> for tcp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for tcp {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}
