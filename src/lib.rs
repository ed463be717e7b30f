// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) TCP to RTU gateway
//! based on [tokio](https://tokio.rs).
//!
//! Modbus/TCP clients connect to the gateway, which forwards each
//! request to the devices of a half-duplex Modbus/RTU serial line and
//! sends the response back. Only one request is on the line at a time.
//! The number of concurrently served connections is bounded by a
//! [`SlotPool`], connections exceeding it are closed immediately.
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tokio-modbus-gateway = "*"
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "serial")]
//! # async fn run() -> std::io::Result<()> {
//! use std::sync::Arc;
//!
//! use tokio_modbus_gateway::{server::tcp::{bind, Server}, Bus, Gateway, SerialLink};
//!
//! let link = SerialLink::open("/dev/ttyUSB0", 19200)?;
//! let gateway = Gateway::new(Arc::new(Bus::new(link)));
//! let server = Server::new(bind("0.0.0.0:502".parse().unwrap())?);
//! server.serve(gateway).await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod error;
pub mod gateway;
pub mod link;
pub mod pool;
pub mod server;
pub mod slave;

mod codec;
mod frame;

pub use self::{
    bus::{Bus, BusGuard},
    error::{DispatchError, GatewayError, ReceiveFailure},
    frame::{
        ExceptionCode, FunctionCode, HeaderError, MbapHeader, RtuFrame, MAX_FRAME_SIZE,
        MAX_PDU_SIZE, PDU_OFFSET,
    },
    gateway::{Config, Forwarded, Gateway},
    link::{LinkEvent, RtuLink, SerialLink},
    pool::{PoolSlot, SlotPool},
    slave::{Slave, SlaveId},
};
