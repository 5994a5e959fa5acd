pub mod block;
pub mod option;

use std::fmt::{Debug, Formatter};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::trace;

use crate::error::{CoapError, CoapResult};
use crate::message::block::{BlockOption, BlockType};
use crate::message::option::{encode_option, encoded_len, CoapOption, OptionIterator, OptionNumber, PAYLOAD_MARKER};
use crate::util::random::Random;
use crate::util::safe_converter::PrecheckedCast;


#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Ack = 2,
    Reset = 3,
}

/// Request method or response code, `class.detail` packed into one byte as `ccc ddddd`
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Code(pub u8);
impl Debug for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl Code {
    pub const EMPTY: Code = Code(0x00);

    pub const GET: Code = Code(0x01);
    pub const POST: Code = Code(0x02);
    pub const PUT: Code = Code(0x03);
    pub const DELETE: Code = Code(0x04);

    pub const CREATED: Code = Code(0x41);
    pub const DELETED: Code = Code(0x42);
    pub const VALID: Code = Code(0x43);
    pub const CHANGED: Code = Code(0x44);
    pub const CONTENT: Code = Code(0x45);
    pub const CONTINUE: Code = Code(0x5f);

    pub const BAD_REQUEST: Code = Code(0x80);
    pub const UNAUTHORIZED: Code = Code(0x81);
    pub const BAD_OPTION: Code = Code(0x82);
    pub const FORBIDDEN: Code = Code(0x83);
    pub const NOT_FOUND: Code = Code(0x84);
    pub const METHOD_NOT_ALLOWED: Code = Code(0x85);
    pub const NOT_ACCEPTABLE: Code = Code(0x86);
    pub const REQUEST_INCOMPLETE: Code = Code(0x88);
    pub const PRECONDITION_FAILED: Code = Code(0x8c);
    pub const REQUEST_TOO_LARGE: Code = Code(0x8d);
    pub const UNSUPPORTED_FORMAT: Code = Code(0x8f);

    pub const INTERNAL_ERROR: Code = Code(0xa0);
    pub const NOT_IMPLEMENTED: Code = Code(0xa1);
    pub const BAD_GATEWAY: Code = Code(0xa2);
    pub const SERVICE_UNAVAILABLE: Code = Code(0xa3);
    pub const GATEWAY_TIMEOUT: Code = Code(0xa4);
    pub const PROXY_NOT_SUPPORTED: Code = Code(0xa5);

    pub fn class(&self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(&self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_request(&self) -> bool {
        self.class() == 0 && self.0 != 0
    }

    pub fn is_response(&self) -> bool {
        self.class() >= 2
    }

    /// 4.xx and 5.xx
    pub fn is_error(&self) -> bool {
        *self >= Code::BAD_REQUEST
    }
}

/// Hint for the transport's queueing. Network management traffic uses [Priority::Net].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Net,
}

#[derive(Clone, Copy, Eq, PartialEq, Default)]
pub struct Token {
    len: u8,
    bytes: [u8; Token::MAX_LENGTH],
}
impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02x?}", self.as_slice())
    }
}

impl Token {
    pub const MAX_LENGTH: usize = 8;
    pub const DEFAULT_LENGTH: usize = 2;

    pub fn new(token: &[u8]) -> CoapResult<Token> {
        if token.len() > Self::MAX_LENGTH {
            return Err(CoapError::InvalidArgs);
        }
        let mut bytes = [0u8; Self::MAX_LENGTH];
        bytes[..token.len()].copy_from_slice(token);
        Ok(Token {
            len: token.len().prechecked_cast(),
            bytes,
        })
    }

    pub fn random(len: usize, random: &mut dyn Random) -> CoapResult<Token> {
        if len > Self::MAX_LENGTH {
            return Err(CoapError::InvalidArgs);
        }
        let mut bytes = [0u8; Self::MAX_LENGTH];
        random.fill_bytes(&mut bytes[..len]);
        Ok(Token {
            len: len.prechecked_cast(),
            bytes,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Header fields as far as they can be read from a datagram that failed to parse completely
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RawHeader {
    pub msg_type: MessageType,
    pub message_id: u16,
}


/// A protocol message. Header fields are kept decoded while options are held in wire format,
///  so appending options and iterating over them never needs to re-encode the whole sequence.
///
/// Every [Message] is independently owned: `clone()` produces a deep copy. Appending beyond
///  [Message::max_length] fails with `NoBufs` and leaves the message unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: MessageType,
    code: Code,
    message_id: u16,
    token: Token,
    options: BytesMut,
    last_option_number: OptionNumber,
    payload: BytesMut,
    priority: Priority,
    max_length: usize,
}
impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {:?} mid={} token={:?} options=[", self.msg_type, self.code, self.message_id, self.token)?;
        for (i, option) in self.options().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", option)?;
        }
        write!(f, "] payload={}b", self.payload.len())
    }
}

impl Message {
    pub const VERSION: u8 = 1;
    pub const HEADER_LEN: usize = 4;

    /// IPv6 minimum MTU minus IPv6 and UDP headers
    pub const DEFAULT_MAX_LENGTH: usize = 1280 - 40 - 8;

    pub fn new(msg_type: MessageType, code: Code) -> Message {
        Message {
            msg_type,
            code,
            message_id: 0,
            token: Token::default(),
            options: BytesMut::new(),
            last_option_number: OptionNumber(0),
            payload: BytesMut::new(),
            priority: Priority::default(),
            max_length: Self::DEFAULT_MAX_LENGTH,
        }
    }

    /// Creates a message with Uri-Path options for each `/` separated segment of `uri_path`
    pub fn init(msg_type: MessageType, code: Code, uri_path: &str) -> CoapResult<Message> {
        let mut result = Message::new(msg_type, code);
        result.append_uri_path_options(uri_path)?;
        Ok(result)
    }

    pub fn with_max_length(mut self, max_length: usize) -> Message {
        self.max_length = max_length;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Message {
        self.priority = priority;
        self
    }

    /// Turns this message into the default response for `request`: piggybacked ACK with
    ///  2.04 Changed, echoing message id and token.
    pub fn set_default_response_header(&mut self, request: &Message) {
        self.msg_type = MessageType::Ack;
        self.code = Code::CHANGED;
        self.message_id = request.message_id;
        self.token = request.token;
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn set_type(&mut self, msg_type: MessageType) {
        self.msg_type = msg_type;
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn set_code(&mut self, code: Code) {
        self.code = code;
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn set_message_id(&mut self, message_id: u16) {
        self.message_id = message_id;
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn set_token(&mut self, token: &[u8]) -> CoapResult<()> {
        let token = Token::new(token)?;
        self.check_len(self.len() - self.token.len() + token.len())?;
        self.token = token;
        Ok(())
    }

    pub fn generate_token(&mut self, len: usize, random: &mut dyn Random) -> CoapResult<()> {
        let token = Token::random(len, random)?;
        self.check_len(self.len() - self.token.len() + token.len())?;
        self.token = token;
        Ok(())
    }

    pub fn set_token_from(&mut self, other: &Message) -> CoapResult<()> {
        self.set_token(other.token.as_slice())
    }

    pub fn is_token_equal(&self, other: &Message) -> bool {
        self.token == other.token
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn is_confirmable(&self) -> bool {
        self.msg_type == MessageType::Confirmable
    }

    pub fn is_non_confirmable(&self) -> bool {
        self.msg_type == MessageType::NonConfirmable
    }

    pub fn is_ack(&self) -> bool {
        self.msg_type == MessageType::Ack
    }

    pub fn is_reset(&self) -> bool {
        self.msg_type == MessageType::Reset
    }

    pub fn is_empty(&self) -> bool {
        self.code == Code::EMPTY
    }

    pub fn is_request(&self) -> bool {
        self.code.is_request()
    }

    pub fn is_response(&self) -> bool {
        self.code.is_response()
    }

    pub fn is_get_request(&self) -> bool {
        self.code == Code::GET
    }

    /// serialized length including the payload marker
    pub fn len(&self) -> usize {
        Self::HEADER_LEN + self.token.len() + self.options.len() + self.payload_len_on_wire(self.payload.len())
    }

    fn payload_len_on_wire(&self, payload_len: usize) -> usize {
        if payload_len == 0 { 0 } else { payload_len + 1 }
    }

    fn check_len(&self, new_len: usize) -> CoapResult<()> {
        if new_len > self.max_length {
            return Err(CoapError::NoBufs);
        }
        Ok(())
    }

    /// Options must be appended in non-decreasing order of their numbers.
    pub fn append_option(&mut self, number: OptionNumber, value: &[u8]) -> CoapResult<()> {
        if number < self.last_option_number {
            return Err(CoapError::InvalidArgs);
        }
        let delta = number.0 - self.last_option_number.0;
        self.check_len(self.len() + encoded_len(delta, value.len()))?;

        encode_option(&mut self.options, delta, value)?;
        self.last_option_number = number;
        Ok(())
    }

    /// unsigned integer in its shortest big-endian form, zero as an empty value
    pub fn append_uint_option(&mut self, number: OptionNumber, value: u64) -> CoapResult<()> {
        let bytes = value.to_be_bytes();
        let leading_zeros = (value.leading_zeros() / 8) as usize;
        self.append_option(number, &bytes[leading_zeros..])
    }

    pub fn append_uri_path_options(&mut self, uri_path: &str) -> CoapResult<()> {
        for segment in uri_path.split('/').filter(|s| !s.is_empty()) {
            self.append_option(OptionNumber::URI_PATH, segment.as_bytes())?;
        }
        Ok(())
    }

    pub fn append_block_option(&mut self, block_type: BlockType, block: BlockOption) -> CoapResult<()> {
        self.append_option(block_type.option_number(), &block.ser()?)
    }

    pub fn append_observe_option(&mut self, observe: u32) -> CoapResult<()> {
        self.append_uint_option(OptionNumber::OBSERVE, observe.into())
    }

    /// Options as stored in the message. Options are validated when a message is parsed or
    ///  built, so iteration does not fail.
    pub fn options(&self) -> impl Iterator<Item = CoapOption<'_>> {
        OptionIterator::new(&self.options)
            .map_while(Result::ok)
    }

    pub fn find_option(&self, number: OptionNumber) -> Option<CoapOption<'_>> {
        self.options()
            .find(|o| o.number == number)
    }

    pub fn has_option(&self, number: OptionNumber) -> bool {
        self.find_option(number).is_some()
    }

    pub fn read_uint_option(&self, number: OptionNumber) -> CoapResult<Option<u64>> {
        self.find_option(number)
            .map(|o| o.uint_value())
            .transpose()
    }

    pub fn observe(&self) -> CoapResult<Option<u64>> {
        self.read_uint_option(OptionNumber::OBSERVE)
    }

    pub fn block_option(&self, block_type: BlockType) -> CoapResult<Option<BlockOption>> {
        self.find_option(block_type.option_number())
            .map(|o| BlockOption::deser(o.value))
            .transpose()
    }

    /// Joins all Uri-Path options with `/`. Paths longer than `max_len` bytes are rejected.
    pub fn uri_path(&self, max_len: usize) -> CoapResult<String> {
        let mut result = String::new();
        for option in self.options().filter(|o| o.number == OptionNumber::URI_PATH) {
            let segment = std::str::from_utf8(option.value)
                .map_err(|_| CoapError::Parse)?;

            let separator_len = if result.is_empty() { 0 } else { 1 };
            if result.len() + separator_len + segment.len() > max_len {
                return Err(CoapError::Parse);
            }

            if !result.is_empty() {
                result.push('/');
            }
            result.push_str(segment);
        }
        Ok(result)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn append_payload(&mut self, data: &[u8]) -> CoapResult<()> {
        let new_payload_len = self.payload.len() + data.len();
        self.check_len(self.len() - self.payload_len_on_wire(self.payload.len()) + self.payload_len_on_wire(new_payload_len))?;
        self.payload.put_slice(data);
        Ok(())
    }

    /// A copy with header and token only, without options and payload
    pub fn header_copy(&self) -> Message {
        Message {
            options: BytesMut::new(),
            last_option_number: OptionNumber(0),
            payload: BytesMut::new(),
            ..self.clone()
        }
    }

    pub fn ser(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        let msg_type: u8 = self.msg_type.into();
        let token_len: u8 = self.token.len().prechecked_cast();
        buf.put_u8((Self::VERSION << 6) | (msg_type << 4) | token_len);
        buf.put_u8(self.code.0);
        buf.put_u16(self.message_id);
        buf.put_slice(self.token.as_slice());
        buf.put_slice(&self.options);
        if !self.payload.is_empty() {
            buf.put_u8(PAYLOAD_MARKER);
            buf.put_slice(&self.payload);
        }
        buf.freeze()
    }

    /// Reads type and message id from a datagram, regardless of whether the rest of it is
    ///  well-formed
    pub fn peek_header(buf: &[u8]) -> Option<RawHeader> {
        if buf.len() < Self::HEADER_LEN {
            return None;
        }
        Some(RawHeader {
            msg_type: MessageType::try_from((buf[0] >> 4) & 0x3).ok()?,
            message_id: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    pub fn deser(mut buf: &[u8]) -> CoapResult<Message> {
        let total_len = buf.len();
        if buf.remaining() < Self::HEADER_LEN {
            return Err(CoapError::Parse);
        }

        let first = buf.get_u8();
        if first >> 6 != Self::VERSION {
            return Err(CoapError::Parse);
        }
        let msg_type = MessageType::try_from((first >> 4) & 0x3)
            .map_err(|_| CoapError::Parse)?;
        let token_len = (first & 0xf) as usize;
        if token_len > Token::MAX_LENGTH {
            return Err(CoapError::Parse);
        }

        let code = Code(buf.get_u8());
        let message_id = buf.get_u16();

        if buf.remaining() < token_len {
            return Err(CoapError::Parse);
        }
        let token = Token::new(&buf[..token_len])?;
        buf.advance(token_len);

        let mut iter = OptionIterator::new(buf);
        for option in iter.by_ref() {
            option?;
        }
        let last_option_number = iter.last_number();
        let rest = iter.remaining();
        let options = &buf[..buf.len() - rest.len()];

        let payload = match rest.split_first() {
            None => &[][..],
            Some((_marker, payload)) => {
                if payload.is_empty() {
                    // a payload marker must be followed by a non-empty payload
                    return Err(CoapError::Parse);
                }
                payload
            }
        };

        let result = Message {
            msg_type,
            code,
            message_id,
            token,
            options: BytesMut::from(options),
            last_option_number,
            payload: BytesMut::from(payload),
            priority: Priority::default(),
            max_length: total_len.max(Self::DEFAULT_MAX_LENGTH),
        };
        trace!("parsed {:?}", result);
        Ok(result)
    }
}
