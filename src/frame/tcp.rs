// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use byteorder::{BigEndian, ByteOrder as _};
use bytes::{BufMut as _, BytesMut};
use thiserror::Error;

use super::*;
use crate::slave::Slave;

pub type TransactionId = u16;

/// Offset of the length field.
const LENGTH_OFFSET: usize = 4;

/// The MBAP header fields of a received Modbus/TCP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: TransactionId,
    pub protocol_id: u16,
    /// Number of bytes following the length field (unit id + PDU).
    pub length: u16,
    pub unit: Slave,
}

/// A received frame violates the MBAP framing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("frame of {len} bytes is shorter than the MBAP header")]
    TooShort { len: usize },

    #[error("frame of {len} bytes exceeds {MAX_FRAME_SIZE} bytes")]
    TooLong { len: usize },

    #[error("invalid protocol id: {0:#06X}")]
    ProtocolId(u16),

    #[error("length field {length} does not match frame of {frame_len} bytes")]
    LengthMismatch { length: u16, frame_len: usize },

    #[error("unit id {0} out of range")]
    UnitIdOutOfRange(Slave),
}

impl HeaderError {
    /// `true` for oversized or truncated frames, `false` for frames whose
    /// header contents are inconsistent.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::TooShort { .. } | Self::TooLong { .. })
    }
}

impl MbapHeader {
    /// Parse and check the MBAP header of a complete frame.
    ///
    /// The unit id range is not checked here, see [`Self::check_unit`].
    pub fn parse(frame: &[u8]) -> Result<Self, HeaderError> {
        let len = frame.len();
        if len > MAX_FRAME_SIZE {
            return Err(HeaderError::TooLong { len });
        }
        if len < PDU_OFFSET {
            return Err(HeaderError::TooShort { len });
        }

        let hdr = Self {
            transaction_id: BigEndian::read_u16(&frame[0..2]),
            protocol_id: BigEndian::read_u16(&frame[2..4]),
            length: BigEndian::read_u16(&frame[LENGTH_OFFSET..MBAP_PREFIX_SIZE]),
            unit: Slave(frame[MBAP_PREFIX_SIZE]),
        };

        if hdr.protocol_id != PROTOCOL_ID {
            return Err(HeaderError::ProtocolId(hdr.protocol_id));
        }
        if usize::from(hdr.length) + MBAP_PREFIX_SIZE != len {
            return Err(HeaderError::LengthMismatch {
                length: hdr.length,
                frame_len: len,
            });
        }
        Ok(hdr)
    }

    /// Reject unit ids that cannot be addressed on a serial line.
    pub fn check_unit(&self) -> Result<(), HeaderError> {
        if self.unit.is_reserved() {
            return Err(HeaderError::UnitIdOutOfRange(self.unit));
        }
        Ok(())
    }

    /// Length of the PDU that follows the unit id.
    #[must_use]
    pub fn pdu_len(&self) -> usize {
        usize::from(self.length).saturating_sub(1)
    }
}

/// Replace everything after the protocol id with `unit` and `pdu`.
///
/// Transaction id and protocol id of the request stay in place, so
/// the client can match the response.
pub(crate) fn write_response(frame: &mut BytesMut, unit: Slave, pdu: &[u8]) {
    debug_assert!(frame.len() >= LENGTH_OFFSET);
    debug_assert!(pdu.len() <= MAX_FRAME_SIZE - PDU_OFFSET);
    frame.truncate(LENGTH_OFFSET);
    frame.reserve(pdu.len() + 3);
    #[allow(clippy::cast_possible_truncation)]
    frame.put_u16(pdu.len() as u16 + 1);
    frame.put_u8(unit.into());
    frame.put_slice(pdu);
}
