// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{Error, Result};

use byteorder::{BigEndian, ByteOrder as _};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{MAX_FRAME_SIZE, MBAP_PREFIX_SIZE, PDU_OFFSET, PROTOCOL_ID};

/// Splits a byte stream into Modbus/TCP frames by their length field.
///
/// A frame is only cut off once its end is confirmed: either the buffer
/// ends with it, or the bytes behind it start another plausible header.
/// Otherwise the bytes up to the next confirmed frame are handed over as
/// a single chunk. Its header check then fails, so a frame whose length
/// field disagrees with what was sent never reaches the bus, and the
/// requests behind it are still served.
///
/// Frames are handed over as raw bytes: validating the header is up to
/// the service, which rejects the request without closing the connection.
#[derive(Debug, Default)]
pub(crate) struct MbapCodec;

/// What the bytes at the start of a buffer look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    /// No frame starts here.
    Invalid,
    /// Too few bytes to tell.
    Undecided,
    /// Plausible header of a frame with the given length, not yet complete.
    Partial(usize),
    /// Complete frame of the given length.
    Frame(usize),
}

/// Frame length declared by a plausible header at the start of `buf`.
fn declared_frame_len(buf: &[u8]) -> Option<usize> {
    if BigEndian::read_u16(&buf[2..4]) != PROTOCOL_ID {
        return None;
    }
    // len = bytes of PDU + one byte (unit ID)
    let len = usize::from(BigEndian::read_u16(&buf[4..MBAP_PREFIX_SIZE]));
    let frame_len = MBAP_PREFIX_SIZE + len;
    (PDU_OFFSET..=MAX_FRAME_SIZE)
        .contains(&frame_len)
        .then_some(frame_len)
}

fn candidate(buf: &[u8]) -> Candidate {
    if buf.len() < MBAP_PREFIX_SIZE {
        return Candidate::Undecided;
    }
    let Some(frame_len) = declared_frame_len(buf) else {
        return Candidate::Invalid;
    };
    if buf.len() < frame_len {
        return Candidate::Partial(frame_len);
    }
    let rest = &buf[frame_len..];
    if rest.is_empty() {
        return Candidate::Frame(frame_len);
    }
    if rest.len() < MBAP_PREFIX_SIZE {
        return Candidate::Undecided;
    }
    match declared_frame_len(rest) {
        Some(_) => Candidate::Frame(frame_len),
        None => Candidate::Invalid,
    }
}

impl Decoder for MbapCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>> {
        match candidate(buf) {
            Candidate::Frame(frame_len) => return Ok(Some(buf.split_to(frame_len))),
            Candidate::Partial(frame_len) => {
                buf.reserve(frame_len - buf.len());
                return Ok(None);
            }
            Candidate::Undecided => return Ok(None),
            Candidate::Invalid => {}
        }

        for offset in 1..buf.len() {
            match candidate(&buf[offset..]) {
                Candidate::Invalid if offset <= MAX_FRAME_SIZE => {}
                Candidate::Invalid | Candidate::Frame(_) => {
                    log::debug!("Skipping {offset} bytes of malformed input");
                    return Ok(Some(buf.split_to(offset)));
                }
                // Wait until it is clear where the next frame starts.
                Candidate::Partial(_) | Candidate::Undecided => return Ok(None),
            }
        }
        Ok(None)
    }
}

impl Encoder<BytesMut> for MbapCodec {
    type Error = Error;

    fn encode(&mut self, frame: BytesMut, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&frame);
        Ok(())
    }
}
