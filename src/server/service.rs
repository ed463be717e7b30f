// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{future::Future, ops::Deref};

/// Turns the frames received on a connection into the frames sent back.
///
/// The acceptor shares one service between all of its connections.
pub trait Service {
    /// A frame as cut from the stream.
    type Request;

    /// What goes back to the client, if anything.
    type Response;

    /// Why a request was dropped. Only logged, never sent.
    type Exception;

    type Future: Future<Output = Result<Self::Response, Self::Exception>> + Send;

    fn call(&self, req: Self::Request) -> Self::Future;
}

/// Lets the acceptor call a service behind an `Arc`.
impl<D> Service for D
where
    D: Deref + ?Sized,
    D::Target: Service,
{
    type Request = <D::Target as Service>::Request;
    type Response = <D::Target as Service>::Response;
    type Exception = <D::Target as Service>::Exception;
    type Future = <D::Target as Service>::Future;

    fn call(&self, req: Self::Request) -> Self::Future {
        self.deref().call(req)
    }
}
