// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus/TCP server with a bounded number of connections

use std::{fmt, future::Future, io, net::SocketAddr, pin::Pin, sync::Arc, time::Duration};

use bytes::BytesMut;
use futures_util::{SinkExt as _, StreamExt as _};
use socket2::{Domain, Socket, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::codec::Framed;

use super::{Service, Terminated};
use crate::{codec::tcp::MbapCodec, pool::SlotPool};

/// Well-known Modbus/TCP port.
pub const DEFAULT_PORT: u16 = 502;

/// Pause before accepting again after a failed accept, e.g. when
/// running out of file descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts connections and serves each one in its own task, as long
/// as a slot of the [`SlotPool`] is available.
///
/// Connections that find the pool exhausted are closed right away.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    pool: Arc<SlotPool>,
}

impl Server {
    /// Serve connections from `listener` with the default pool capacity.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self::with_pool(listener, Arc::new(SlotPool::default()))
    }

    #[must_use]
    pub fn with_pool(listener: TcpListener, pool: Arc<SlotPool>) -> Self {
        Self { listener, pool }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<SlotPool> {
        &self.pool
    }

    /// Serve connections until the task is dropped.
    pub async fn serve<S>(&self, service: S) -> Terminated
    where
        S: Service<Request = BytesMut, Response = Option<BytesMut>> + Send + Sync + 'static,
        S::Exception: fmt::Display + Send,
    {
        self.serve_until(service, std::future::pending())
            .await
    }

    /// Serve connections until `abort_signal` resolves.
    ///
    /// All open connections are closed on return.
    pub async fn serve_until<S, X>(&self, service: S, abort_signal: X) -> Terminated
    where
        S: Service<Request = BytesMut, Response = Option<BytesMut>> + Send + Sync + 'static,
        S::Exception: fmt::Display + Send,
        X: Future<Output = ()>,
    {
        let service = Arc::new(service);
        let mut connections = JoinSet::new();
        tokio::pin!(abort_signal);

        loop {
            tokio::select! {
                res = self.listener.accept() => match res {
                    Ok((stream, peer)) => self.admit(&mut connections, stream, peer, &service),
                    Err(err) => {
                        log::error!("Failed to accept connection: {err}");
                        if !accept_backoff(abort_signal.as_mut()).await {
                            log::trace!("Shutdown signal received");
                            return Terminated::Aborted;
                        }
                    }
                },
                Some(res) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = res {
                        log::error!("Connection task failed: {err}");
                    }
                }
                () = &mut abort_signal => {
                    log::trace!("Shutdown signal received");
                    // Dropping the set aborts all connection tasks.
                    return Terminated::Aborted;
                }
            }
        }
    }

    fn admit<S>(
        &self,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        service: &Arc<S>,
    ) where
        S: Service<Request = BytesMut, Response = Option<BytesMut>> + Send + Sync + 'static,
        S::Exception: fmt::Display + Send,
    {
        let Some(slot) = self.pool.acquire() else {
            log::warn!(
                "Refusing connection from {peer}: all {} slots in use",
                self.pool.capacity()
            );
            drop(stream);
            return;
        };
        log::debug!("Accepted connection from {peer} in slot {}", slot.index());

        if let Err(err) = stream.set_nodelay(true) {
            log::debug!("Failed to disable Nagle for {peer}: {err}");
        }
        let framed = Framed::new(stream, MbapCodec);
        let service = Arc::clone(service);
        connections.spawn(async move {
            if let Err(err) = process(framed, service, peer).await {
                log::warn!("Connection from {peer} failed: {err}");
            }
            log::debug!("Connection from {peer} closed, releasing slot {}", slot.index());
            slot.release();
        });
    }
}

/// Wait before accepting again. Returns `false` if `abort_signal`
/// resolves first.
async fn accept_backoff<X>(abort_signal: Pin<&mut X>) -> bool
where
    X: Future<Output = ()>,
{
    tokio::select! {
        () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
        () = abort_signal => false,
    }
}

/// The request-response loop of a single connection.
///
/// Returns when the peer closes the connection. Failed requests are
/// dropped without a response and the loop continues.
async fn process<S, T>(
    mut framed: Framed<T, MbapCodec>,
    service: Arc<S>,
    peer: SocketAddr,
) -> io::Result<()>
where
    S: Service<Request = BytesMut, Response = Option<BytesMut>>,
    S::Exception: fmt::Display,
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(request) = framed.next().await else {
            // tcp socket closed
            break;
        };
        let request = request?;

        match service.call(request).await {
            Ok(Some(response)) => framed.send(response).await?,
            Ok(None) => log::debug!("No response for request from {peer}"),
            Err(err) => log::warn!("Dropped request from {peer}: {err}"),
        }
    }
    Ok(())
}

/// Open a listening socket on `addr`.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => Socket::new(Domain::IPV4, Type::STREAM, None)?,
        SocketAddr::V6(_) => Socket::new(Domain::IPV6, Type::STREAM, None)?,
    };
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}
