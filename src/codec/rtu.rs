// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{Error, ErrorKind, Result};

use byteorder::{BigEndian, ByteOrder as _};
use bytes::BytesMut;
use smallvec::SmallVec;
use tokio_util::codec::Decoder;

use crate::{
    frame::{RtuFrame, MAX_PDU_SIZE},
    slave::Slave,
};

/// addr + function + crc
const MIN_ADU_LEN: usize = 1 + 1 + 2;

/// Largest RTU frame on the wire: address, PDU and CRC.
pub(crate) const MAX_ADU_SIZE: usize = 256;

pub(crate) type AduBuf = SmallVec<[u8; MAX_ADU_SIZE]>;

/// Number of bytes that follow the function code of a response,
/// `None` if not enough has been received to tell.
fn get_response_payload_len(buf: &BytesMut) -> Result<Option<usize>> {
    if buf.len() < 2 {
        // incomplete frame
        return Ok(None);
    }
    let byte_count = || buf.get(2).map(|count| 1 + usize::from(*count));
    let len = match buf[1] {
        0x01..=0x04 | 0x0C | 0x11 | 0x14 | 0x15 | 0x17 => byte_count(),
        0x05 | 0x06 | 0x08 | 0x0B | 0x0F | 0x10 => Some(4),
        0x07 => Some(1),
        0x16 => Some(6),
        0x18 => {
            if buf.len() > 3 {
                Some(2 + usize::from(BigEndian::read_u16(&buf[2..=3])))
            } else {
                // incomplete frame
                None
            }
        }
        0x81..=0xFF => Some(1),
        _ => {
            return Err(Error::new(ErrorKind::InvalidData, "invalid data length"));
        }
    };
    Ok(len)
}

pub(crate) fn calc_crc(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            let crc_odd = (crc & 0x0001) != 0;
            crc >>= 1;
            if crc_odd {
                crc ^= 0xA001;
            }
        }
    }
    crc.rotate_right(8)
}

/// Build the complete RTU frame for `pdu` addressed to `address`.
///
/// An empty PDU yields an address-only frame.
pub(crate) fn encode_adu(address: Slave, pdu: &[u8]) -> Result<AduBuf> {
    if pdu.len() > MAX_PDU_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("invalid PDU length: {}", pdu.len()),
        ));
    }
    let mut adu = AduBuf::new();
    adu.push(address.into());
    adu.extend_from_slice(pdu);
    let crc = calc_crc(&adu);
    adu.extend_from_slice(&crc.to_be_bytes());
    Ok(adu)
}

/// Decodes frames received from a server (slave) device.
///
/// A CRC mismatch is not a decoding error: the frame is consumed and
/// reported with [`RtuFrame::crc_valid`] unset.
#[derive(Debug, Default)]
pub(crate) struct ResponseDecoder;

impl Decoder for ResponseDecoder {
    type Item = RtuFrame;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtuFrame>> {
        let Some(payload_len) = get_response_payload_len(buf)? else {
            return Ok(None);
        };
        if 1 + payload_len > MAX_PDU_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("response PDU of {} bytes is too long", 1 + payload_len),
            ));
        }
        if buf.len() < MIN_ADU_LEN + payload_len {
            // incomplete frame
            return Ok(None);
        }

        let adu = buf.split_to(payload_len + 2);
        let crc = BigEndian::read_u16(&buf.split_to(2));
        let expected_crc = calc_crc(&adu);
        if crc != expected_crc {
            log::debug!("CRC is not correct: {crc:#06X} instead of {expected_crc:#06X}");
        }

        let mut adu = adu.freeze();
        let address = Slave(adu.split_to(1)[0]);
        Ok(Some(RtuFrame {
            address,
            pdu: adu,
            crc_valid: crc == expected_crc,
        }))
    }
}
