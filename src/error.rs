// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

use crate::{
    frame::{FunctionCode, HeaderError},
    link::LinkEvent,
    slave::Slave,
};

/// Why a request could not be forwarded to the serial line.
///
/// Each of these only fails the request at hand: the client connection
/// stays open and no response is sent for the failed request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The frame is truncated or longer than any Modbus/TCP frame.
    #[error("bad request: {0}")]
    BadRequest(HeaderError),

    /// The MBAP header contents are inconsistent.
    #[error("bad protocol: {0}")]
    BadProtocol(HeaderError),

    /// The RTU request could not be transmitted.
    #[error("failed to send RTU request: {0}")]
    SendFailure(#[source] io::Error),

    /// No usable RTU response arrived.
    #[error("failed to receive RTU response: {0}")]
    ReceiveFailure(#[from] ReceiveFailure),

    /// The RTU response arrived corrupted.
    #[error("RTU response from {address} failed the CRC check")]
    BadChecksum { address: Slave },
}

impl From<HeaderError> for GatewayError {
    fn from(from: HeaderError) -> Self {
        if from.is_malformed() {
            Self::BadRequest(from)
        } else {
            Self::BadProtocol(from)
        }
    }
}

impl GatewayError {
    /// `true` if the request was rejected before the serial line was touched.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::BadProtocol(_))
    }
}

/// Details of a [`GatewayError::ReceiveFailure`].
#[derive(Debug, Error)]
pub enum ReceiveFailure {
    #[error("no response after {attempts} polls")]
    Timeout { attempts: usize },

    #[error("unexpected link event {0:?}")]
    UnexpectedEvent(LinkEvent),

    #[error("no frame available")]
    NoFrame,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why the direct server did not answer a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bad request: {0}")]
    BadRequest(HeaderError),

    #[error("bad protocol: {0}")]
    BadProtocol(HeaderError),

    /// No handler is registered for the function code.
    #[error("unsupported function {0}")]
    UnsupportedFunction(FunctionCode),
}

impl From<HeaderError> for DispatchError {
    fn from(from: HeaderError) -> Self {
        if from.is_malformed() {
            Self::BadRequest(from)
        } else {
            Self::BadProtocol(from)
        }
    }
}
