use core::fmt;

/// The error type for parsing of headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A header could not be parsed because it was shorter than assumed.
    ///
    /// The buffer may be shorter than the minimum length specified or a length field may point
    /// out of bounds of the provided data. For options, the option length may exceed the data
    /// offset of the segment.
    Truncated,

    /// A header was recognized but was self-contradictory.
    ///
    /// Examples: a TCP header whose data offset is smaller than the fixed header; an MSS option
    /// whose length octet is not four.
    Malformed,

    /// A value could not be recognized.
    ///
    /// E.g. an unknown option kind that can not be skipped. This may be due to an outdated
    /// implementation of the standard or registry which defines identifiers in packets.
    Unrecognized,
}

/// The result type for header access.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated    => write!(f, "truncated header"),
            Error::Malformed    => write!(f, "malformed header"),
            Error::Unrecognized => write!(f, "unrecognized value"),
        }
    }
}
