// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::FutureExt as _;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio_util::codec::Decoder as _;

use super::{LinkEvent, RtuLink};
use crate::{
    codec::rtu::{encode_adu, ResponseDecoder, MAX_ADU_SIZE},
    frame::RtuFrame,
    slave::Slave,
};

/// [`RtuLink`] on top of a byte stream, e.g. a serial port.
///
/// Responses are framed by their function code, the CRC is checked
/// but a mismatch is only reported through [`RtuFrame::crc_valid`].
#[derive(Debug)]
pub struct SerialLink<T> {
    transport: T,
    read_buf: BytesMut,
    decoder: ResponseDecoder,
    received: Option<RtuFrame>,
}

impl<T> SerialLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            read_buf: BytesMut::with_capacity(MAX_ADU_SIZE),
            decoder: ResponseDecoder,
            received: None,
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(feature = "serial")]
impl SerialLink<tokio_serial::SerialStream> {
    /// Open the serial port at `path`.
    pub fn open<P: AsRef<std::path::Path>>(path: P, baud_rate: u32) -> io::Result<Self> {
        let builder = tokio_serial::new(path.as_ref().to_string_lossy(), baud_rate);
        let serial = tokio_serial::SerialStream::open(&builder)?;
        Ok(Self::new(serial))
    }
}

impl<T> SerialLink<T>
where
    T: AsyncRead + Unpin,
{
    /// Move everything that can be read without waiting into the read buffer.
    fn fill_read_buf(&mut self) -> io::Result<()> {
        while let Some(res) = self.transport.read_buf(&mut self.read_buf).now_or_never() {
            if res? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T> RtuLink for SerialLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, address: Slave, pdu: &[u8]) -> io::Result<()> {
        let adu = encode_adu(address, pdu)?;

        // Late responses to an earlier request must not be taken
        // for the response to this one.
        self.fill_read_buf()?;
        if !self.read_buf.is_empty() {
            log::debug!("Dropping {} stale bytes", self.read_buf.len());
            self.read_buf.clear();
        }
        self.received = None;

        log::trace!("Sending RTU frame {:02X?}", &adu[..]);
        self.transport.write_all(&adu).await?;
        self.transport.flush().await
    }

    async fn poll_event(&mut self) -> io::Result<Option<LinkEvent>> {
        self.fill_read_buf()?;
        if self.read_buf.is_empty() {
            return Ok(None);
        }
        match self.decoder.decode(&mut self.read_buf) {
            Ok(Some(frame)) => {
                log::trace!("Received RTU frame from {}: {:02X?}", frame.address, &frame.pdu[..]);
                self.received = Some(frame);
                Ok(Some(LinkEvent::FrameReceived))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                log::warn!("Discarding {} received bytes: {err}", self.read_buf.len());
                self.read_buf.clear();
                Ok(Some(LinkEvent::FrameDiscarded))
            }
        }
    }

    fn fetch_received(&mut self) -> Option<RtuFrame> {
        self.received.take()
    }
}
