// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

pub(crate) mod rtu;
pub(crate) mod tcp;

use std::{error, fmt};

pub use self::{
    rtu::RtuFrame,
    tcp::{HeaderError, MbapHeader},
};

/// Size of the MBAP prefix that precedes the unit identifier:
/// transaction id, protocol id and length field.
pub const MBAP_PREFIX_SIZE: usize = 6;

/// Offset of the function code, i.e. the first byte of the PDU.
pub const PDU_OFFSET: usize = MBAP_PREFIX_SIZE + 1;

/// Maximum PDU size.
///
/// As defined by the Modbus application protocol for both RTU and TCP.
pub const MAX_PDU_SIZE: usize = 253;

/// Largest Modbus/TCP frame accepted from a client (256 + 7 bytes).
pub const MAX_FRAME_SIZE: usize = 256 + PDU_OFFSET;

/// The only protocol identifier defined for Modbus.
pub const PROTOCOL_ID: u16 = 0x0000;

/// Bit that marks the function code of an exception response.
const EXCEPTION_FLAG: u8 = 0x80;

/// A Modbus function code.
///
/// The gateway forwards PDUs verbatim and never interprets them,
/// so only the raw value and the exception flag are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionCode(u8);

impl FunctionCode {
    /// 03 (0x03) Read Holding Registers
    pub const READ_HOLDING_REGISTERS: Self = Self(0x03);

    /// 04 (0x04) Read Input Registers
    pub const READ_INPUT_REGISTERS: Self = Self(0x04);

    /// 06 (0x06) Write Single Register
    pub const WRITE_SINGLE_REGISTER: Self = Self(0x06);

    /// 16 (0x10) Write Multiple Registers
    pub const WRITE_MULTIPLE_REGISTERS: Self = Self(0x10);

    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Gets the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// `true` if this is the function code of an exception response.
    #[must_use]
    pub const fn is_exception(self) -> bool {
        self.0 & EXCEPTION_FLAG != 0
    }

    /// The function code an exception response to this function carries.
    #[must_use]
    pub const fn to_exception(self) -> Self {
        Self(self.0 | EXCEPTION_FLAG)
    }
}

impl From<u8> for FunctionCode {
    fn from(from: u8) -> Self {
        Self::new(from)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    Custom(u8),
}

impl From<ExceptionCode> for u8 {
    fn from(from: ExceptionCode) -> Self {
        use ExceptionCode::*;
        match from {
            IllegalFunction => 0x01,
            IllegalDataAddress => 0x02,
            IllegalDataValue => 0x03,
            ServerDeviceFailure => 0x04,
            Acknowledge => 0x05,
            ServerDeviceBusy => 0x06,
            MemoryParityError => 0x08,
            GatewayPathUnavailable => 0x0A,
            GatewayTargetDevice => 0x0B,
            Custom(code) => code,
        }
    }
}

impl ExceptionCode {
    /// Create a new [`ExceptionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        use ExceptionCode::*;
        match value {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            other => Custom(other),
        }
    }

    fn description(&self) -> &str {
        use ExceptionCode::*;
        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
            Custom(_) => "Custom",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {}
