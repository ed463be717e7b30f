// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to the serial Modbus/RTU line.

mod serial;

pub use self::serial::SerialLink;

use std::io;

use async_trait::async_trait;

use crate::{frame::RtuFrame, slave::Slave};

/// Something the serial line reported since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A complete frame is ready to be fetched.
    FrameReceived,

    /// Received bytes could not be framed and were dropped.
    FrameDiscarded,
}

/// A serial line that transmits and receives Modbus/RTU frames.
///
/// Implementations take care of the RTU wire encoding, i.e. the
/// address field and the CRC-16 trailer.
#[async_trait]
pub trait RtuLink: Send {
    /// Transmit `pdu` addressed to `address`.
    async fn send(&mut self, address: Slave, pdu: &[u8]) -> io::Result<()>;

    /// Check for a pending event without waiting for one.
    async fn poll_event(&mut self) -> io::Result<Option<LinkEvent>>;

    /// Take the most recently received frame.
    fn fetch_received(&mut self) -> Option<RtuFrame>;
}

#[async_trait]
impl<L> RtuLink for Box<L>
where
    L: RtuLink + ?Sized,
{
    async fn send(&mut self, address: Slave, pdu: &[u8]) -> io::Result<()> {
        (**self).send(address, pdu).await
    }

    async fn poll_event(&mut self) -> io::Result<Option<LinkEvent>> {
        (**self).poll_event().await
    }

    fn fetch_received(&mut self) -> Option<RtuFrame> {
        (**self).fetch_received()
    }
}
