use std::fmt::{Debug, Formatter};
use bytes::{Buf, BufMut, BytesMut};
use crate::error::{CoapError, CoapResult};
use crate::util::safe_converter::{PrecheckedCast, SafeCast};

/// Option numbers are carried on the wire as deltas against the previous option, so unknown
///  numbers must survive a parse / serialize cycle. Hence a newtype rather than an enum.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OptionNumber(pub u16);
impl Debug for OptionNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            Self::IF_MATCH => "If-Match",
            Self::URI_HOST => "Uri-Host",
            Self::E_TAG => "ETag",
            Self::IF_NONE_MATCH => "If-None-Match",
            Self::OBSERVE => "Observe",
            Self::URI_PORT => "Uri-Port",
            Self::LOCATION_PATH => "Location-Path",
            Self::URI_PATH => "Uri-Path",
            Self::CONTENT_FORMAT => "Content-Format",
            Self::MAX_AGE => "Max-Age",
            Self::URI_QUERY => "Uri-Query",
            Self::ACCEPT => "Accept",
            Self::LOCATION_QUERY => "Location-Query",
            Self::BLOCK2 => "Block2",
            Self::BLOCK1 => "Block1",
            Self::SIZE2 => "Size2",
            Self::PROXY_URI => "Proxy-Uri",
            Self::PROXY_SCHEME => "Proxy-Scheme",
            Self::SIZE1 => "Size1",
            OptionNumber(n) => return write!(f, "Option({})", n),
        };
        write!(f, "{}", name)
    }
}

impl OptionNumber {
    pub const IF_MATCH: OptionNumber = OptionNumber(1);
    pub const URI_HOST: OptionNumber = OptionNumber(3);
    pub const E_TAG: OptionNumber = OptionNumber(4);
    pub const IF_NONE_MATCH: OptionNumber = OptionNumber(5);
    pub const OBSERVE: OptionNumber = OptionNumber(6);
    pub const URI_PORT: OptionNumber = OptionNumber(7);
    pub const LOCATION_PATH: OptionNumber = OptionNumber(8);
    pub const URI_PATH: OptionNumber = OptionNumber(11);
    pub const CONTENT_FORMAT: OptionNumber = OptionNumber(12);
    pub const MAX_AGE: OptionNumber = OptionNumber(14);
    pub const URI_QUERY: OptionNumber = OptionNumber(15);
    pub const ACCEPT: OptionNumber = OptionNumber(17);
    pub const LOCATION_QUERY: OptionNumber = OptionNumber(20);
    pub const BLOCK2: OptionNumber = OptionNumber(23);
    pub const BLOCK1: OptionNumber = OptionNumber(27);
    pub const SIZE2: OptionNumber = OptionNumber(28);
    pub const PROXY_URI: OptionNumber = OptionNumber(35);
    pub const PROXY_SCHEME: OptionNumber = OptionNumber(39);
    pub const SIZE1: OptionNumber = OptionNumber(60);
}

/// A single option as seen by the [OptionIterator], borrowing its value from the message
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct CoapOption<'a> {
    pub number: OptionNumber,
    pub value: &'a [u8],
}
impl Debug for CoapOption<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}={:02x?}", self.number, self.value)
    }
}

impl CoapOption<'_> {
    /// Interprets the value as a big-endian unsigned integer. Leading zero bytes are permitted,
    ///  an empty value is zero.
    pub fn uint_value(&self) -> CoapResult<u64> {
        if self.value.len() > size_of::<u64>() {
            return Err(CoapError::Parse);
        }
        Ok(self.value.iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}

const EXTENDED_1_BYTE: u8 = 13;
const EXTENDED_2_BYTES: u8 = 14;
const RESERVED: u8 = 15;

const EXTENDED_1_BYTE_OFFSET: usize = 13;
const EXTENDED_2_BYTES_OFFSET: usize = 269;

pub const MAX_OPTION_LENGTH: usize = u16::MAX as usize + EXTENDED_2_BYTES_OFFSET;

pub const PAYLOAD_MARKER: u8 = 0xff;

fn nibble_for(value: usize) -> u8 {
    if value < EXTENDED_1_BYTE_OFFSET {
        value.prechecked_cast()
    }
    else if value < EXTENDED_2_BYTES_OFFSET {
        EXTENDED_1_BYTE
    }
    else {
        EXTENDED_2_BYTES
    }
}

fn put_extension(buf: &mut BytesMut, value: usize) {
    if value >= EXTENDED_2_BYTES_OFFSET {
        buf.put_u16((value - EXTENDED_2_BYTES_OFFSET).prechecked_cast());
    }
    else if value >= EXTENDED_1_BYTE_OFFSET {
        buf.put_u8((value - EXTENDED_1_BYTE_OFFSET).prechecked_cast());
    }
}

/// number of bytes an option with the given delta and value length occupies on the wire
pub fn encoded_len(delta: u16, value_len: usize) -> usize {
    fn extension_len(value: usize) -> usize {
        if value >= EXTENDED_2_BYTES_OFFSET { 2 }
        else if value >= EXTENDED_1_BYTE_OFFSET { 1 }
        else { 0 }
    }
    1 + extension_len(delta.safe_cast()) + extension_len(value_len) + value_len
}

/// Appends a single option in wire format, with its number encoded as `delta` relative to the
///  previously written option.
pub fn encode_option(buf: &mut BytesMut, delta: u16, value: &[u8]) -> CoapResult<()> {
    if value.len() > MAX_OPTION_LENGTH {
        return Err(CoapError::InvalidArgs);
    }

    let delta: usize = delta.safe_cast();
    buf.put_u8((nibble_for(delta) << 4) | nibble_for(value.len()));
    put_extension(buf, delta);
    put_extension(buf, value.len());
    buf.put_slice(value);
    Ok(())
}

fn decode_extension(nibble: u8, buf: &mut &[u8]) -> CoapResult<usize> {
    match nibble {
        EXTENDED_1_BYTE => {
            if buf.remaining() < 1 {
                return Err(CoapError::Parse);
            }
            Ok(buf.get_u8() as usize + EXTENDED_1_BYTE_OFFSET)
        }
        EXTENDED_2_BYTES => {
            if buf.remaining() < 2 {
                return Err(CoapError::Parse);
            }
            Ok(buf.get_u16() as usize + EXTENDED_2_BYTES_OFFSET)
        }
        RESERVED => Err(CoapError::Parse),
        n => Ok(n as usize),
    }
}

/// Forward-only iteration over a serialized option sequence. Iteration ends at the end of the
///  buffer or at a payload marker; a malformed option yields a single `Err(Parse)` after which
///  the iterator is exhausted.
///
/// Iteration is restartable from any option boundary by creating a new iterator over
///  [OptionIterator::remaining] together with the [OptionIterator::last_number] reached so far.
pub struct OptionIterator<'a> {
    buf: &'a [u8],
    last_number: u16,
    done: bool,
}
impl<'a> OptionIterator<'a> {
    pub fn new(buf: &'a [u8]) -> OptionIterator<'a> {
        Self::resume(buf, OptionNumber(0))
    }

    pub fn resume(buf: &'a [u8], last_number: OptionNumber) -> OptionIterator<'a> {
        OptionIterator {
            buf,
            last_number: last_number.0,
            done: false,
        }
    }

    /// the unread bytes, starting at the next option header (or the payload marker)
    pub fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    pub fn last_number(&self) -> OptionNumber {
        OptionNumber(self.last_number)
    }

    fn try_next(&mut self) -> CoapResult<CoapOption<'a>> {
        let mut buf = self.buf;
        let header = buf.get_u8();

        let delta = decode_extension(header >> 4, &mut buf)?;
        let len = decode_extension(header & 0xf, &mut buf)?;

        let number = usize::from(self.last_number) + delta;
        let number: u16 = number.try_into()
            .map_err(|_| CoapError::Parse)?;

        if buf.len() < len {
            return Err(CoapError::Parse);
        }
        let (value, rest) = buf.split_at(len);

        self.buf = rest;
        self.last_number = number;
        Ok(CoapOption {
            number: OptionNumber(number),
            value,
        })
    }
}

impl<'a> Iterator for OptionIterator<'a> {
    type Item = CoapResult<CoapOption<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.is_empty() || self.buf[0] == PAYLOAD_MARKER {
            return None;
        }

        let result = self.try_next();
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}
