// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// Raw unit identifier as carried in the MBAP header.
pub type SlaveId = u8;

/// Address of a device behind the gateway.
///
/// Taken from the unit identifier of the MBAP header and put
/// unchanged into the address field of the RTU frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Slave(pub SlaveId);

impl Slave {
    /// Address 0: every device on the line acts on the request and
    /// none of them answers.
    #[must_use]
    pub const fn broadcast() -> Self {
        Slave(0)
    }

    /// Lowest address a single serial device can have.
    #[must_use]
    pub const fn min_device() -> Self {
        Slave(1)
    }

    /// Highest address a single serial device can have.
    #[must_use]
    pub const fn max_device() -> Self {
        Slave(247)
    }

    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self == Self::broadcast()
    }

    #[must_use]
    pub fn is_single_device(self) -> bool {
        self >= Self::min_device() && self <= Self::max_device()
    }

    /// Addresses above [`Self::max_device()`] cannot be put on a serial line.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self > Self::max_device()
    }
}

impl From<SlaveId> for Slave {
    fn from(from: SlaveId) -> Self {
        Slave(from)
    }
}

impl From<Slave> for SlaveId {
    fn from(from: Slave) -> Self {
        from.0
    }
}

impl fmt::Display for Slave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0>2X}", self.0)
    }
}
