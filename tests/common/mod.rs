// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
    time::timeout,
};

use tokio_modbus_gateway::{
    server::tcp::{bind, Server},
    Bus, Config, Gateway, LinkEvent, RtuFrame, RtuLink, Slave, SlotPool,
};

/// Address of a device that never answers.
pub const SILENT_DEVICE: u8 = 3;

/// What happened on the simulated serial line, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Sent(u8),
    Answered(u8),
}

pub type Journal = Arc<Mutex<Vec<Wire>>>;

type Responder = Box<dyn Fn(Slave, &[u8]) -> Option<RtuFrame> + Send>;

/// Serial line with devices simulated by a responder function.
pub struct MockLink {
    responder: Responder,
    pending: Option<RtuFrame>,
    received: Option<RtuFrame>,
    journal: Journal,
}

impl MockLink {
    pub fn new(
        responder: impl Fn(Slave, &[u8]) -> Option<RtuFrame> + Send + 'static,
    ) -> (Self, Journal) {
        let journal = Journal::default();
        let link = Self {
            responder: Box::new(responder),
            pending: None,
            received: None,
            journal: Arc::clone(&journal),
        };
        (link, journal)
    }
}

#[async_trait]
impl RtuLink for MockLink {
    async fn send(&mut self, address: Slave, pdu: &[u8]) -> io::Result<()> {
        self.journal.lock().unwrap().push(Wire::Sent(address.0));
        self.received = None;
        self.pending = if address.is_broadcast() {
            None
        } else {
            (self.responder)(address, pdu)
        };
        Ok(())
    }

    async fn poll_event(&mut self) -> io::Result<Option<LinkEvent>> {
        let Some(frame) = self.pending.take() else {
            return Ok(None);
        };
        self.journal
            .lock()
            .unwrap()
            .push(Wire::Answered(frame.address.0));
        self.received = Some(frame);
        Ok(Some(LinkEvent::FrameReceived))
    }

    fn fetch_received(&mut self) -> Option<RtuFrame> {
        self.received.take()
    }
}

/// Devices answer "read holding registers" with a single register
/// holding their own address, except for [`SILENT_DEVICE`].
pub fn register_devices(address: Slave, pdu: &[u8]) -> Option<RtuFrame> {
    if address.0 == SILENT_DEVICE || pdu.first() != Some(&0x03) {
        return None;
    }
    Some(RtuFrame::new(address, vec![0x03, 0x02, 0x00, address.0]))
}

pub fn fast_config() -> Config {
    Config::new()
        .with_poll_interval(Duration::from_millis(5))
        .with_poll_attempts(20)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub pool: Arc<SlotPool>,
    pub journal: Journal,
}

/// Serve a gateway in front of [`register_devices`] on a loopback port.
pub fn start_gateway(pool_capacity: usize) -> TestGateway {
    init_logging();
    let (link, journal) = MockLink::new(register_devices);
    let gateway = Gateway::with_config(Arc::new(Bus::new(link)), fast_config());

    let listener = bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let pool = Arc::new(SlotPool::new(pool_capacity));
    let server = Server::with_pool(listener, Arc::clone(&pool));
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.serve(gateway).await });

    TestGateway {
        addr,
        pool,
        journal,
    }
}

/// "Read holding registers" of one register at address 0.
pub fn read_request(transaction_id: u16, unit: u8) -> Vec<u8> {
    let [hi, lo] = transaction_id.to_be_bytes();
    vec![hi, lo, 0x00, 0x00, 0x00, 0x06, unit, 0x03, 0x00, 0x00, 0x00, 0x01]
}

/// The answer of [`register_devices`] to [`read_request`].
pub fn read_response(transaction_id: u16, unit: u8) -> Vec<u8> {
    let [hi, lo] = transaction_id.to_be_bytes();
    vec![hi, lo, 0x00, 0x00, 0x00, 0x05, unit, 0x03, 0x02, 0x00, unit]
}

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn read_frame(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    timeout(READ_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("response timed out")
        .unwrap();
    buf
}

pub async fn round_trip(stream: &mut TcpStream, transaction_id: u16, unit: u8) {
    stream
        .write_all(&read_request(transaction_id, unit))
        .await
        .unwrap();
    let rsp = read_frame(stream, 11).await;
    assert_eq!(rsp, read_response(transaction_id, unit));
}

/// `true` if the peer has closed the connection without sending anything.
pub async fn is_closed_by_peer(stream: &mut TcpStream) -> bool {
    let mut buf = [0; 16];
    match timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(0) | Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}

/// Wait until `pool` has `in_use` slots taken.
pub async fn wait_for_slots(pool: &SlotPool, in_use: usize) {
    timeout(READ_TIMEOUT, async {
        while pool.in_use() != in_use {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("slots not released in time");
}
