// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP direct server example
//!
//! Answers "read holding registers" and "write single register"
//! requests from a local register table.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use bytes::{BufMut as _, Bytes, BytesMut};

use tokio_modbus_gateway::{
    server::{
        direct::Dispatcher,
        tcp::{bind, Server},
    },
    ExceptionCode, FunctionCode, Slave,
};

const REGISTER_COUNT: usize = 16;

type Registers = Arc<Mutex<[u16; REGISTER_COUNT]>>;

fn read_holding_registers(registers: &Registers, data: &[u8]) -> Result<Bytes, ExceptionCode> {
    let [a_hi, a_lo, c_hi, c_lo] = *data else {
        return Err(ExceptionCode::IllegalDataValue);
    };
    let addr = usize::from(u16::from_be_bytes([a_hi, a_lo]));
    let cnt = usize::from(u16::from_be_bytes([c_hi, c_lo]));
    let registers = registers.lock().unwrap();
    let values = registers
        .get(addr..addr + cnt)
        .ok_or(ExceptionCode::IllegalDataAddress)?;

    let mut rsp = BytesMut::with_capacity(1 + 2 * cnt);
    rsp.put_u8((2 * cnt) as u8);
    for value in values {
        rsp.put_u16(*value);
    }
    Ok(rsp.freeze())
}

fn write_single_register(registers: &Registers, data: &[u8]) -> Result<Bytes, ExceptionCode> {
    let [a_hi, a_lo, v_hi, v_lo] = *data else {
        return Err(ExceptionCode::IllegalDataValue);
    };
    let addr = usize::from(u16::from_be_bytes([a_hi, a_lo]));
    let mut registers = registers.lock().unwrap();
    let register = registers
        .get_mut(addr)
        .ok_or(ExceptionCode::IllegalDataAddress)?;
    *register = u16::from_be_bytes([v_hi, v_lo]);
    Ok(Bytes::copy_from_slice(data))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let registers = Registers::default();
    let dispatcher = Dispatcher::new()
        .with_handler(FunctionCode::READ_HOLDING_REGISTERS, {
            let registers = Arc::clone(&registers);
            move |_: Slave, data: &[u8]| read_holding_registers(&registers, data)
        })
        .with_handler(FunctionCode::WRITE_SINGLE_REGISTER, {
            let registers = Arc::clone(&registers);
            move |_: Slave, data: &[u8]| write_single_register(&registers, data)
        });

    let socket_addr: SocketAddr = "127.0.0.1:5502".parse()?;
    let server = Server::new(bind(socket_addr)?);
    log::info!("Serving {} registers on {socket_addr}", REGISTER_COUNT);
    server.serve(dispatcher).await;
    Ok(())
}
