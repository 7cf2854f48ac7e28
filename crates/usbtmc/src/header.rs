//! USBTMC bulk transfer framing
//!
//! Every device-dependent message on the bulk-out pipe starts with a 12-byte
//! header; the whole frame is zero-padded to the next 4-byte boundary:
//!
//! ```text
//! byte 0      MsgID
//! byte 1      bTag (1..=255, never 0)
//! byte 2      bTagInverse (bitwise complement of bTag)
//! byte 3      reserved, zero
//! bytes 4-7   TransferSize, little-endian u32
//! byte 8      bmTransferAttributes (bit 0 = End-Of-Message)
//! byte 9      TermChar (unused, zero)
//! bytes 10-11 reserved, zero
//! ```
//!
//! Bulk-in responses open with the same header; continuation transfers of
//! the same message carry no header.

use crate::error::{FramingError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

/// Header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Frames are zero-padded to this boundary
pub const FRAME_ALIGNMENT: usize = 4;

/// End-Of-Message bit in bmTransferAttributes
pub const ATTR_EOM: u8 = 0x01;

/// Bulk message IDs
///
/// The IN and OUT message-ID spaces overlap: `DEV_DEP_MSG_IN` (a response)
/// shares the numeric value of `REQUEST_DEV_DEP_MSG_IN` (the request that
/// solicited it).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgId {
    /// Device-dependent command message, host to device
    DevDepMsgOut = 1,
    /// Request for a device-dependent response / the response itself
    RequestDevDepMsgIn = 2,
}

/// The per-transaction sequence tag
///
/// Increments by one per bulk-out transaction and never takes the value
/// zero; the device echoes it (plus its complement) in the response header
/// so requests and responses can be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTag(u8);

impl BTag {
    /// First tag of a fresh session
    pub const INITIAL: BTag = BTag(1);

    /// Wrap a raw tag value; zero is not a valid tag
    pub fn new(value: u8) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The next tag in sequence, skipping zero on wrap
    pub fn next(self) -> Self {
        let n = self.0.wrapping_add(1);
        Self(if n == 0 { 1 } else { n })
    }
}

/// Encode a DEV_DEP_MSG_OUT frame
///
/// `eom` marks this as the final (or only) fragment of the message.
pub fn encode_dev_dep_out(tag: BTag, payload: &[u8], eom: bool) -> Vec<u8> {
    let mut frame = encode_header(
        MsgId::DevDepMsgOut,
        tag,
        payload.len() as u32,
        if eom { ATTR_EOM } else { 0 },
    );
    frame.write_all(payload).expect("vec write is infallible");
    pad_frame(&mut frame);
    frame
}

/// Encode a REQUEST_DEV_DEP_MSG_IN frame
///
/// Asks the device for a response of at most `max_transfer_size` bytes.
/// Carries no payload; the bare header is already 4-byte aligned.
pub fn encode_request_in(tag: BTag, max_transfer_size: u32) -> Vec<u8> {
    encode_header(MsgId::RequestDevDepMsgIn, tag, max_transfer_size, 0)
}

fn encode_header(msg_id: MsgId, tag: BTag, transfer_size: u32, attributes: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE);
    frame.push(msg_id as u8);
    frame.push(tag.get());
    frame.push(!tag.get());
    frame.push(0); // reserved
    frame
        .write_u32::<LittleEndian>(transfer_size)
        .expect("vec write is infallible");
    frame.push(attributes);
    frame.push(0); // TermChar, unused
    frame.push(0); // reserved
    frame.push(0); // reserved
    debug_assert_eq!(frame.len(), HEADER_SIZE);
    frame
}

/// Zero-pad a frame to the next 4-byte boundary
fn pad_frame(frame: &mut Vec<u8>) {
    while frame.len() % FRAME_ALIGNMENT != 0 {
        frame.push(0);
    }
}

/// A validated bulk-in response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Sequence tag echoed by the device
    pub tag: BTag,
    /// Message length the device declared (payload bytes, excluding header)
    pub declared_len: u32,
    /// End-Of-Message attribute bit
    pub eom: bool,
}

/// Decode and validate a DEV_DEP_MSG_IN header
///
/// Checks, in order: header length, message ID, tag/complement consistency,
/// and the echo of the tag we sent. Any mismatch is a framing error.
pub fn decode_response_header(frame: &[u8], expected: BTag) -> Result<ResponseHeader> {
    if frame.len() < HEADER_SIZE {
        return Err(FramingError::ShortHeader { len: frame.len() }.into());
    }

    let msg_id = frame[0];
    if msg_id != MsgId::RequestDevDepMsgIn as u8 {
        return Err(FramingError::UnexpectedMsgId { got: msg_id }.into());
    }

    let tag = frame[1];
    let complement = frame[2];
    if complement != !tag {
        return Err(FramingError::BadTagComplement { tag, complement }.into());
    }
    if tag != expected.get() {
        return Err(FramingError::TagMismatch {
            expected: expected.get(),
            got: tag,
        }
        .into());
    }

    let mut size_bytes = &frame[4..8];
    let declared_len = size_bytes
        .read_u32::<LittleEndian>()
        .expect("slice is 4 bytes");
    let eom = frame[8] & ATTR_EOM != 0;

    Ok(ResponseHeader {
        tag: BTag::new(tag).expect("expected tag is nonzero, and tag == expected"),
        declared_len,
        eom,
    })
}
