// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Thread-safe booking store.
//!
//! Committed bookings are immutable. The store hands out ids, indexes
//! bookings by id and keeps a commit-ordered log that readers can drain.

use crate::base::{BookingId, UserId};
use crate::booking::{Booking, NewBooking};
use crate::error::StorageError;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only store of committed bookings.
///
/// Combines a [`DashMap`] for lookup by id with a [`SegQueue`] recording
/// commit order. Ids come from an atomic counter and are never reused.
#[derive(Debug)]
pub struct BookingStore {
    bookings: DashMap<BookingId, Arc<Booking>>,
    committed: SegQueue<BookingId>,
    next_id: AtomicU64,
}

impl BookingStore {
    /// Creates an empty store whose first booking gets id 1.
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            committed: SegQueue::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Assigns an id to the draft and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CommitFailed`] if the id is already taken.
    pub fn insert(&self, draft: NewBooking) -> Result<BookingId, StorageError> {
        let id = BookingId(self.next_id.fetch_add(1, Ordering::Relaxed));

        // Entry API keeps check-and-insert atomic
        match self.bookings.entry(id) {
            Entry::Occupied(_) => Err(StorageError::CommitFailed(format!(
                "booking {id} already exists"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(draft.into_booking(id)));
                self.committed.push(id);
                Ok(id)
            }
        }
    }

    pub fn get(&self, id: &BookingId) -> Option<Arc<Booking>> {
        self.bookings.get(id).map(|b| Arc::clone(b.value()))
    }

    /// Bookings made by `user_id`, oldest first.
    pub fn for_user(&self, user_id: UserId) -> Vec<Arc<Booking>> {
        let mut bookings: Vec<Arc<Booking>> = self
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| Arc::clone(b.value()))
            .collect();
        bookings.sort_by_key(|b| b.id);
        bookings
    }

    /// Removes and returns the bookings committed since the last drain,
    /// in commit order.
    pub fn drain_committed(&self) -> Vec<Arc<Booking>> {
        let mut drained = Vec::with_capacity(self.committed.len());
        while let Some(id) = self.committed.pop() {
            if let Some(booking) = self.get(&id) {
                drained.push(booking);
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}
