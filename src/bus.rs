// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exclusive access to the shared serial line.

use std::ops::{Deref, DerefMut};

use tokio::sync::{Mutex, MutexGuard};

/// Serializes all exchanges on a half-duplex serial line.
///
/// Only one request may be on the wire at a time, otherwise responses
/// could not be told apart. Waiting callers are served in FIFO order.
#[derive(Debug)]
pub struct Bus<L> {
    link: Mutex<L>,
}

impl<L> Bus<L> {
    pub fn new(link: L) -> Self {
        Self {
            link: Mutex::new(link),
        }
    }

    /// Wait until the line is free and hold it.
    pub async fn acquire(&self) -> BusGuard<'_, L> {
        let link = self.link.lock().await;
        log::trace!("Bus acquired");
        BusGuard { link }
    }

    /// Hold the line if it is free right now.
    pub fn try_acquire(&self) -> Option<BusGuard<'_, L>> {
        self.link.try_lock().ok().map(|link| BusGuard { link })
    }

    pub fn into_inner(self) -> L {
        self.link.into_inner()
    }
}

/// Exclusive access to the link of a [`Bus`], released on drop.
#[derive(Debug)]
pub struct BusGuard<'a, L> {
    link: MutexGuard<'a, L>,
}

impl<L> BusGuard<'_, L> {
    /// Hand the line back, same as dropping the guard.
    pub fn release(self) {}
}

impl<L> Deref for BusGuard<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.link
    }
}

impl<L> DerefMut for BusGuard<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L> Drop for BusGuard<'_, L> {
    fn drop(&mut self) {
        log::trace!("Bus released");
    }
}
