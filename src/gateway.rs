// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding of Modbus/TCP requests to a Modbus/RTU line.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use bytes::BytesMut;

use crate::{
    bus::Bus,
    error::{GatewayError, ReceiveFailure},
    frame::{tcp::write_response, MbapHeader, PDU_OFFSET},
    link::{LinkEvent, RtuLink},
    server::Service,
};

/// Delay between two checks for an RTU response.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Checks for an RTU response before giving up.
pub const DEFAULT_POLL_ATTEMPTS: usize = 20;

/// Timing of the wait for RTU responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    poll_interval: Duration,
    poll_attempts: usize,
}

impl Config {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub const fn with_poll_attempts(mut self, poll_attempts: usize) -> Self {
        self.poll_attempts = poll_attempts;
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn poll_attempts(&self) -> usize {
        self.poll_attempts
    }

    /// Worst-case time a response is waited for.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.poll_interval
            .saturating_mul(u32::try_from(self.poll_attempts).unwrap_or(u32::MAX))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a successfully forwarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    /// The frame now holds the response for the client.
    Response,

    /// Broadcast request, nothing to send back.
    Broadcast,
}

/// Translates Modbus/TCP requests into Modbus/RTU requests and the
/// RTU responses back into Modbus/TCP responses.
///
/// Clones share the same [`Bus`].
#[derive(Debug)]
pub struct Gateway<L> {
    bus: Arc<Bus<L>>,
    config: Config,
}

impl<L> Clone for Gateway<L> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            config: self.config,
        }
    }
}

impl<L> Gateway<L> {
    pub fn new(bus: Arc<Bus<L>>) -> Self {
        Self::with_config(bus, Config::default())
    }

    pub fn with_config(bus: Arc<Bus<L>>, config: Config) -> Self {
        Self { bus, config }
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<Bus<L>> {
        &self.bus
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl<L> Gateway<L>
where
    L: RtuLink,
{
    /// Forward the Modbus/TCP request in `frame` and wait for the response.
    ///
    /// On [`Forwarded::Response`] the response has been written over the
    /// request, keeping its transaction id. Requests failing validation
    /// are rejected without acquiring the bus.
    pub async fn forward(&self, frame: &mut BytesMut) -> Result<Forwarded, GatewayError> {
        let hdr = MbapHeader::parse(frame)?;
        hdr.check_unit()?;

        let mut link = self.bus.acquire().await;
        let res = exchange(&mut *link, &hdr, frame, &self.config).await;
        link.release();
        res
    }
}

async fn exchange<L>(
    link: &mut L,
    hdr: &MbapHeader,
    frame: &mut BytesMut,
    config: &Config,
) -> Result<Forwarded, GatewayError>
where
    L: RtuLink,
{
    let pdu = &frame[PDU_OFFSET..];
    debug_assert_eq!(pdu.len(), hdr.pdu_len());
    link.send(hdr.unit, pdu)
        .await
        .map_err(GatewayError::SendFailure)?;

    if hdr.unit.is_broadcast() {
        log::debug!("Broadcast request {} sent", hdr.transaction_id);
        return Ok(Forwarded::Broadcast);
    }

    wait_for_response(link, config).await?;

    let response = link.fetch_received().ok_or(ReceiveFailure::NoFrame)?;
    if !response.crc_valid {
        return Err(GatewayError::BadChecksum {
            address: response.address,
        });
    }
    write_response(frame, response.address, &response.pdu);
    Ok(Forwarded::Response)
}

async fn wait_for_response<L>(link: &mut L, config: &Config) -> Result<(), ReceiveFailure>
where
    L: RtuLink,
{
    for _ in 0..config.poll_attempts {
        tokio::time::sleep(config.poll_interval).await;
        match link.poll_event().await? {
            Some(LinkEvent::FrameReceived) => return Ok(()),
            Some(event) => return Err(ReceiveFailure::UnexpectedEvent(event)),
            None => {}
        }
    }
    Err(ReceiveFailure::Timeout {
        attempts: config.poll_attempts,
    })
}

impl<L> Service for Gateway<L>
where
    L: RtuLink + 'static,
{
    type Request = BytesMut;
    type Response = Option<BytesMut>;
    type Exception = GatewayError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Exception>> + Send>>;

    fn call(&self, mut req: Self::Request) -> Self::Future {
        let gateway = self.clone();
        Box::pin(async move {
            match gateway.forward(&mut req).await? {
                Forwarded::Response => Ok(Some(req)),
                Forwarded::Broadcast => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::{frame::RtuFrame, slave::Slave};

    /// Answers every request after `delay_polls` empty polls.
    #[derive(Debug, Default)]
    struct ScriptedLink {
        sent: Vec<(Slave, Vec<u8>)>,
        response: Option<RtuFrame>,
        delay_polls: usize,
        polls: usize,
        fail_send: bool,
        event: Option<LinkEvent>,
    }

    impl ScriptedLink {
        fn answering(response: RtuFrame) -> Self {
            Self {
                response: Some(response),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl RtuLink for ScriptedLink {
        async fn send(&mut self, address: Slave, pdu: &[u8]) -> io::Result<()> {
            if self.fail_send {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "line down"));
            }
            self.sent.push((address, pdu.to_vec()));
            self.polls = 0;
            Ok(())
        }

        async fn poll_event(&mut self) -> io::Result<Option<LinkEvent>> {
            self.polls += 1;
            if let Some(event) = self.event {
                return Ok(Some(event));
            }
            if self.response.is_some() && self.polls > self.delay_polls {
                return Ok(Some(LinkEvent::FrameReceived));
            }
            Ok(None)
        }

        fn fetch_received(&mut self) -> Option<RtuFrame> {
            self.response.clone()
        }
    }

    fn request(unit: u8) -> BytesMut {
        BytesMut::from(
            &[
                0x00, 0x2A, 0x00, 0x00, 0x00, 0x06, unit, 0x03, 0x00, 0x00, 0x00, 0x02,
            ][..],
        )
    }

    fn read_registers_response(address: u8) -> RtuFrame {
        RtuFrame::new(
            Slave(address),
            Bytes::from_static(&[0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B]),
        )
    }

    fn gateway(link: ScriptedLink) -> Gateway<ScriptedLink> {
        Gateway::new(Arc::new(Bus::new(link)))
    }

    fn into_link(gateway: Gateway<ScriptedLink>) -> ScriptedLink {
        Arc::try_unwrap(gateway.bus).unwrap().into_inner()
    }

    #[tokio::test(start_paused = true)]
    async fn forward_read_request() {
        // Given
        let gateway = gateway(ScriptedLink::answering(read_registers_response(5)));
        let mut frame = request(5);

        // When
        let res = gateway.forward(&mut frame).await;

        // Then
        assert_eq!(res.unwrap(), Forwarded::Response);
        assert_eq!(
            &frame[..],
            &[0x00, 0x2A, 0x00, 0x00, 0x00, 0x07, 0x05, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B]
        );
        let link = into_link(gateway);
        assert_eq!(link.sent, vec![(Slave(5), vec![0x03, 0x00, 0x00, 0x00, 0x02])]);
    }

    #[tokio::test(start_paused = true)]
    async fn forward_request_without_pdu() {
        let gateway = gateway(ScriptedLink::answering(read_registers_response(5)));
        let mut frame = request(5);
        frame.truncate(7);
        frame[5] = 0x01;

        assert_eq!(gateway.forward(&mut frame).await.unwrap(), Forwarded::Response);
        let link = into_link(gateway);
        assert_eq!(link.sent, vec![(Slave(5), Vec::<u8>::new())]);
    }

    #[tokio::test(start_paused = true)]
    async fn response_unit_id_is_rtu_address() {
        let gateway = gateway(ScriptedLink::answering(read_registers_response(9)));
        let mut frame = request(5);
        gateway.forward(&mut frame).await.unwrap();
        assert_eq!(frame[6], 9);
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_is_not_answered() {
        let gateway = gateway(ScriptedLink::answering(read_registers_response(1)));
        let mut frame = request(0);

        let start = tokio::time::Instant::now();
        let res = gateway.forward(&mut frame).await;

        assert_eq!(res.unwrap(), Forwarded::Broadcast);
        assert!(start.elapsed() < DEFAULT_POLL_INTERVAL);
        let link = into_link(gateway);
        assert_eq!(link.sent.len(), 1);
        assert_eq!(link.polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_invalid_requests_without_bus_access() {
        let gateway = gateway(ScriptedLink::default());
        let _guard = gateway.bus().acquire().await;

        // The bus is held, so any attempt to acquire it would hang.
        let mut frame = request(1);
        frame[2] = 0x01;
        assert!(matches!(
            gateway.forward(&mut frame).await,
            Err(GatewayError::BadProtocol(_))
        ));

        let mut frame = request(248);
        assert!(matches!(
            gateway.forward(&mut frame).await,
            Err(GatewayError::BadProtocol(_))
        ));

        let mut frame = request(1);
        frame.truncate(6);
        assert!(matches!(
            gateway.forward(&mut frame).await,
            Err(GatewayError::BadRequest(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn time_out_without_response() {
        let gateway = gateway(ScriptedLink::default());
        let mut frame = request(3);

        let start = tokio::time::Instant::now();
        let err = gateway.forward(&mut frame).await.unwrap_err();

        assert!(matches!(
            err,
            GatewayError::ReceiveFailure(ReceiveFailure::Timeout { attempts: 20 })
        ));
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1050));
        assert!(gateway.bus().try_acquire().is_some());
        assert_eq!(into_link(gateway).polls, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_response_on_last_attempt() {
        let mut link = ScriptedLink::answering(read_registers_response(3));
        link.delay_polls = 19;
        let gateway = gateway(link);
        let mut frame = request(3);
        assert_eq!(
            gateway.forward(&mut frame).await.unwrap(),
            Forwarded::Response
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fail_on_unexpected_event() {
        let mut link = ScriptedLink::answering(read_registers_response(3));
        link.event = Some(LinkEvent::FrameDiscarded);
        let gateway = gateway(link);
        let err = gateway.forward(&mut request(3)).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ReceiveFailure(ReceiveFailure::UnexpectedEvent(
                LinkEvent::FrameDiscarded
            ))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_on_send_error() {
        let link = ScriptedLink {
            fail_send: true,
            ..Default::default()
        };
        let gateway = gateway(link);
        let err = gateway.forward(&mut request(3)).await.unwrap_err();
        assert!(matches!(err, GatewayError::SendFailure(_)));
        assert!(gateway.bus().try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn fail_on_corrupted_response() {
        let gateway = gateway(ScriptedLink::answering(
            read_registers_response(3).corrupted(),
        ));
        let mut frame = request(3);
        let err = gateway.forward(&mut frame).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::BadChecksum { address: Slave(3) }
        ));
        assert_eq!(frame, request(3));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_poll_budget() {
        let config = Config::new()
            .with_poll_interval(Duration::from_millis(10))
            .with_poll_attempts(3);
        assert_eq!(config.response_timeout(), Duration::from_millis(30));
        let gateway = Gateway::with_config(Arc::new(Bus::new(ScriptedLink::default())), config);

        let start = tokio::time::Instant::now();
        assert!(gateway.forward(&mut request(1)).await.is_err());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn serve_as_service() {
        let gateway = gateway(ScriptedLink::answering(read_registers_response(5)));
        let rsp = gateway.call(request(5)).await.unwrap().unwrap();
        assert_eq!(rsp[5], 0x07);
        assert!(gateway.call(request(0)).await.unwrap().is_none());
    }
}
