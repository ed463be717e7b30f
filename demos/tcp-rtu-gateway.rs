// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP to RTU gateway example
//!
//! Forwards Modbus/TCP requests to the devices on a serial line.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example tcp-rtu-gateway -- /dev/ttyUSB0 19200 0.0.0.0:5502
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;

use tokio_modbus_gateway::{
    server::tcp::{bind, Server, DEFAULT_PORT},
    Bus, Gateway, SerialLink, SlotPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let tty_path = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_owned());
    let baud_rate: u32 = match args.next() {
        Some(arg) => arg.parse().context("invalid baud rate")?,
        None => 19200,
    };
    let socket_addr: SocketAddr = match args.next() {
        Some(arg) => arg.parse().context("invalid listen address")?,
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
    };

    let link = SerialLink::open(&tty_path, baud_rate)
        .with_context(|| format!("failed to open {tty_path}"))?;
    let gateway = Gateway::new(Arc::new(Bus::new(link)));

    let listener = bind(socket_addr).with_context(|| format!("failed to bind {socket_addr}"))?;
    let server = Server::with_pool(listener, Arc::new(SlotPool::default()));
    log::info!("Forwarding {socket_addr} to {tty_path} at {baud_rate} baud");

    let terminated = server
        .serve_until(gateway, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;
    log::info!("Gateway stopped: {terminated:?}");
    Ok(())
}
