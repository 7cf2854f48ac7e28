//! Bulk-in message reassembly
//!
//! A device response is one logical message: a 12-byte header declaring the
//! payload length, then payload spread over one or more bulk transfers.
//! Continuation transfers carry no header. The message is complete only when
//! every declared byte has been consumed and the header carried the
//! End-Of-Message attribute; a fully drained message without EOM means the
//! instrument is still sending and a fresh request-data cycle is due.

use crate::error::Result;
use crate::header::{BTag, HEADER_SIZE, decode_response_header};

/// Reassembly state for one in-progress response message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAssembly {
    /// Payload length the header declared
    declared_len: u32,
    /// Header + payload bytes consumed so far
    bytes_consumed: usize,
    /// Declared bytes not yet delivered by the device
    remaining: usize,
    /// End-Of-Message attribute from the header
    eom: bool,
}

impl ReadAssembly {
    /// Consume the first bulk transfer of a response
    ///
    /// Validates the header against the tag that was sent and returns the
    /// assembly state plus the payload bytes this transfer carried. Padding
    /// past the declared length is discarded.
    pub fn begin(transfer: &[u8], expected: BTag) -> Result<(Self, &[u8])> {
        let header = decode_response_header(transfer, expected)?;

        let total = header.declared_len as usize + HEADER_SIZE;
        let response_length = transfer.len().min(total);
        let payload = &transfer[HEADER_SIZE..response_length];

        Ok((
            Self {
                declared_len: header.declared_len,
                bytes_consumed: response_length,
                remaining: total - response_length,
                eom: header.eom,
            },
            payload,
        ))
    }

    /// Consume a continuation transfer (no header)
    ///
    /// Returns the payload bytes that belong to the message; trailing
    /// padding is discarded.
    pub fn push<'a>(&mut self, transfer: &'a [u8]) -> &'a [u8] {
        let take = transfer.len().min(self.remaining);
        self.bytes_consumed += take;
        self.remaining -= take;
        &transfer[..take]
    }

    /// Declared bytes still outstanding
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Header + payload bytes consumed so far
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    /// Payload length the header declared
    pub fn declared_len(&self) -> u32 {
        self.declared_len
    }

    /// Read-completion test: all declared bytes consumed and EOM was set
    pub fn is_complete(&self) -> bool {
        self.remaining == 0 && self.eom
    }

    /// Message drained but the instrument has more to send
    pub fn needs_new_request(&self) -> bool {
        self.remaining == 0 && !self.eom
    }
}
