// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded set of connection slots.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Number of connections served concurrently by default.
pub const DEFAULT_POOL_CAPACITY: usize = 5;

/// Upper bound of [`SlotPool::capacity()`], one bit per slot.
pub const MAX_POOL_CAPACITY: usize = u64::BITS as usize;

/// A fixed number of slots, each of which admits one connection.
///
/// Allocation never blocks: when every slot is taken the caller is
/// expected to turn the connection down.
#[derive(Debug)]
pub struct SlotPool {
    capacity: usize,
    // Bit `i` is set while slot `i` is in use.
    bitmap: Mutex<u64>,
}

impl SlotPool {
    /// Create a pool with `capacity` free slots.
    ///
    /// # Panics
    ///
    /// If `capacity` is `0` or exceeds [`MAX_POOL_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        assert!(capacity <= MAX_POOL_CAPACITY);
        Self {
            capacity,
            bitmap: Mutex::new(0),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently in use.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.lock().count_ones() as usize
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.in_use()
    }

    /// Claim the lowest-numbered free slot.
    ///
    /// Returns `None` if all slots are in use. The slot is released
    /// when the returned [`PoolSlot`] is dropped.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> Option<PoolSlot> {
        let mut bitmap = self.lock();
        let index = (!*bitmap).trailing_zeros() as usize;
        if index >= self.capacity {
            return None;
        }
        *bitmap |= 1 << index;
        drop(bitmap);
        Some(PoolSlot {
            pool: Arc::clone(self),
            index,
        })
    }

    fn release(&self, index: usize) {
        let mut bitmap = self.lock();
        debug_assert!(*bitmap & (1 << index) != 0, "slot {index} is not in use");
        *bitmap &= !(1 << index);
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // The bitmap is consistent after every single update.
        self.bitmap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// A claimed slot of a [`SlotPool`].
pub struct PoolSlot {
    pool: Arc<SlotPool>,
    index: usize,
}

impl PoolSlot {
    /// Position of this slot in the pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Hand the slot back to the pool, same as dropping it.
    pub fn release(self) {}
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl fmt::Debug for PoolSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSlot").field("index", &self.index).finish()
    }
}
