use std::fmt::{Debug, Formatter};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::error::{CoapError, CoapResult};
use crate::message::option::OptionNumber;
use crate::util::safe_converter::PrecheckedCast;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BlockType {
    /// request payload, client to server
    Block1,
    /// response payload, server to client
    Block2,
}
impl BlockType {
    pub fn option_number(&self) -> OptionNumber {
        match self {
            BlockType::Block1 => OptionNumber::BLOCK1,
            BlockType::Block2 => OptionNumber::BLOCK2,
        }
    }
}

/// Block size class, encoded as the exponent `szx` with a block length of `2^(szx+4)` bytes
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BlockSize {
    B16 = 0,
    B32 = 1,
    B64 = 2,
    B128 = 3,
    B256 = 4,
    B512 = 5,
    B1024 = 6,
}
impl BlockSize {
    pub fn len(&self) -> usize {
        16 << (*self as u8)
    }

    pub fn szx(&self) -> u8 {
        (*self).into()
    }

    /// the size class for exactly `len` bytes, if there is one
    pub fn from_len(len: usize) -> Option<BlockSize> {
        if !len.is_power_of_two() || !(16..=1024).contains(&len) {
            return None;
        }
        let szx: u8 = (len.trailing_zeros() - 4).try_into().ok()?;
        BlockSize::try_from(szx).ok()
    }
}

/// Decoded value of a Block1 / Block2 option.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct BlockOption {
    pub num: u32,
    pub more: bool,
    pub size: BlockSize,
}
impl Debug for BlockOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.num, if self.more { 1 } else { 0 }, self.size.len())
    }
}

impl BlockOption {
    /// block numbers are limited to 20 bits by the three byte encoding
    pub const MAX_NUM: u32 = (1 << 20) - 1;

    pub fn new(num: u32, more: bool, size: BlockSize) -> BlockOption {
        BlockOption { num, more, size }
    }

    /// byte offset of this block's first byte in the complete body
    pub fn offset(&self) -> usize {
        self.num as usize * self.size.len()
    }

    fn value(&self) -> u32 {
        (self.num << 4) | (if self.more { 1 << 3 } else { 0 }) | self.size.szx() as u32
    }

    /// Encodes the option value in one to three bytes depending on the block number. Numbers
    ///  beyond [BlockOption::MAX_NUM] can not be represented.
    pub fn ser(&self) -> CoapResult<Vec<u8>> {
        if self.num > Self::MAX_NUM {
            return Err(CoapError::InvalidArgs);
        }

        let bytes = self.value().to_be_bytes();
        let len = if self.num < 1 << 4 {
            1
        }
        else if self.num < 1 << 12 {
            2
        }
        else {
            3
        };
        Ok(bytes[bytes.len() - len..].to_vec())
    }

    pub fn deser(value: &[u8]) -> CoapResult<BlockOption> {
        if value.len() > 3 {
            return Err(CoapError::Parse);
        }
        let raw = value.iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);

        let szx: u8 = (raw & 0x7).prechecked_cast();
        let size = BlockSize::try_from(szx)
            .map_err(|_| CoapError::Parse)?;

        Ok(BlockOption {
            num: raw >> 4,
            more: raw & 0x8 != 0,
            size,
        })
    }
}
