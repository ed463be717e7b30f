// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus/TCP server skeleton

pub mod direct;
pub mod tcp;

mod service;

pub use self::service::Service;

/// Reason a server stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Terminated {
    /// The abort signal has been received.
    Aborted,
}
