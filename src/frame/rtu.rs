// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use bytes::Bytes;

use crate::slave::Slave;

/// A frame received on the serial line, CRC trailer stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    /// Address field, i.e. the responding device.
    pub address: Slave,
    /// Function code and data.
    pub pdu: Bytes,
    /// Whether the received CRC matched the one calculated over
    /// address and PDU.
    pub crc_valid: bool,
}

impl RtuFrame {
    #[must_use]
    pub fn new(address: Slave, pdu: impl Into<Bytes>) -> Self {
        Self {
            address,
            pdu: pdu.into(),
            crc_valid: true,
        }
    }

    /// Same frame, but marked as corrupted on the wire.
    #[must_use]
    pub fn corrupted(self) -> Self {
        Self {
            crc_valid: false,
            ..self
        }
    }
}
