// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer Modbus/TCP requests locally instead of forwarding them.

use std::{collections::HashMap, fmt, future, sync::Arc};

use bytes::{BufMut as _, Bytes, BytesMut};

use super::Service;
use crate::{
    error::DispatchError,
    frame::{tcp::write_response, ExceptionCode, FunctionCode, MbapHeader, MAX_PDU_SIZE, PDU_OFFSET},
    slave::Slave,
};

/// Implements a single Modbus function.
///
/// `data` is the request PDU without its function code. The returned
/// bytes become the response PDU after the function code.
pub trait Handler: Send + Sync {
    fn call(&self, unit: Slave, data: &[u8]) -> Result<Bytes, ExceptionCode>;
}

impl<F> Handler for F
where
    F: Fn(Slave, &[u8]) -> Result<Bytes, ExceptionCode> + Send + Sync,
{
    fn call(&self, unit: Slave, data: &[u8]) -> Result<Bytes, ExceptionCode> {
        self(unit, data)
    }
}

/// Routes requests to the [`Handler`] registered for their function code.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<FunctionCode, Arc<dyn Handler>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `function`, replacing any previous one.
    #[must_use]
    pub fn with_handler(mut self, function: FunctionCode, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(function, Arc::new(handler));
        self
    }

    #[must_use]
    pub fn supports(&self, function: FunctionCode) -> bool {
        self.handlers.contains_key(&function)
    }

    /// Handle the Modbus/TCP request in `frame`.
    ///
    /// Returns the response frame, or `None` for broadcast requests.
    pub fn handle(&self, mut frame: BytesMut) -> Result<Option<BytesMut>, DispatchError> {
        let hdr = MbapHeader::parse(&frame)?;
        let Some(&function) = frame.get(PDU_OFFSET) else {
            return Err(DispatchError::UnsupportedFunction(FunctionCode::new(0)));
        };
        let function = FunctionCode::new(function);
        let handler = self
            .handlers
            .get(&function)
            .ok_or(DispatchError::UnsupportedFunction(function))?;

        let result = handler.call(hdr.unit, &frame[PDU_OFFSET + 1..]);
        if hdr.unit.is_broadcast() {
            log::debug!("Broadcast request {} handled", hdr.transaction_id);
            return Ok(None);
        }

        let pdu = match result {
            Ok(data) if data.len() < MAX_PDU_SIZE => response_pdu(function, &data),
            Ok(data) => {
                log::warn!(
                    "Response of {} bytes to function {function} exceeds the PDU size",
                    data.len()
                );
                exception_pdu(function, ExceptionCode::ServerDeviceFailure)
            }
            Err(exception) => {
                log::debug!("Function {function} failed: {exception}");
                exception_pdu(function, exception)
            }
        };
        write_response(&mut frame, hdr.unit, &pdu);
        Ok(Some(frame))
    }
}

fn response_pdu(function: FunctionCode, data: &[u8]) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(1 + data.len());
    pdu.put_u8(function.value());
    pdu.put_slice(data);
    pdu
}

fn exception_pdu(function: FunctionCode, exception: ExceptionCode) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(2);
    pdu.put_u8(function.to_exception().value());
    pdu.put_u8(exception.into());
    pdu
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.handlers.keys().copied().collect();
        functions.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("functions", &functions)
            .finish()
    }
}

impl Service for Dispatcher {
    type Request = BytesMut;
    type Response = Option<BytesMut>;
    type Exception = DispatchError;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}
