// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded number of served connections and server shutdown.

mod common;

use std::{sync::Arc, time::Duration};

use tokio::{net::TcpStream, time::timeout};

use tokio_modbus_gateway::{
    server::{
        tcp::{bind, Server},
        Terminated,
    },
    Bus, Gateway, SlotPool,
};

use common::{
    fast_config, init_logging, is_closed_by_peer, register_devices, round_trip, start_gateway,
    wait_for_slots, MockLink,
};

#[tokio::test]
async fn refuse_connections_beyond_capacity() {
    let gateway = start_gateway(2);

    let mut first = TcpStream::connect(gateway.addr).await.unwrap();
    let mut second = TcpStream::connect(gateway.addr).await.unwrap();
    round_trip(&mut first, 1, 1).await;
    round_trip(&mut second, 2, 1).await;
    assert_eq!(gateway.pool.in_use(), 2);

    let mut refused = TcpStream::connect(gateway.addr).await.unwrap();
    assert!(is_closed_by_peer(&mut refused).await);

    // Both admitted connections keep working.
    round_trip(&mut first, 3, 1).await;
    round_trip(&mut second, 4, 1).await;
}

#[tokio::test]
async fn closed_connection_frees_its_slot() {
    let gateway = start_gateway(1);

    let mut first = TcpStream::connect(gateway.addr).await.unwrap();
    round_trip(&mut first, 1, 2).await;
    drop(first);
    wait_for_slots(&gateway.pool, 0).await;

    let mut second = TcpStream::connect(gateway.addr).await.unwrap();
    round_trip(&mut second, 2, 2).await;
    assert_eq!(gateway.pool.in_use(), 1);
}

#[tokio::test]
async fn abort_closes_all_connections() {
    init_logging();
    let (link, _journal) = MockLink::new(register_devices);
    let gateway = Gateway::with_config(Arc::new(Bus::new(link)), fast_config());
    let pool = Arc::new(SlotPool::new(3));
    let server = Server::with_pool(
        bind("127.0.0.1:0".parse().unwrap()).unwrap(),
        Arc::clone(&pool),
    );
    let addr = server.local_addr().unwrap();

    let (abort_tx, abort_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        let abort_signal = async move {
            abort_rx.await.ok();
        };
        server.serve_until(gateway, abort_signal).await
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    round_trip(&mut client, 1, 5).await;
    assert_eq!(pool.in_use(), 1);

    abort_tx.send(()).unwrap();
    let terminated = timeout(Duration::from_secs(2), server_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(terminated, Terminated::Aborted);

    wait_for_slots(&pool, 0).await;
    assert!(is_closed_by_peer(&mut client).await);
    assert!(TcpStream::connect(addr).await.is_err());
}
